//! End-to-end simulations through the public `World` API.

use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;

use approx::assert_relative_eq;
use rigid2d::{
    BodyDef, BodyHandle, Chain, Circle, Contact, ContactListener, DistanceJointDef, Edge, Filter, FixtureDef,
    PhysicsError, Polygon, RevoluteJointDef, Settings, Vec2, World,
};

const DT: f64 = 1.0 / 60.0;

fn gravity() -> Vec2 {
    Vec2::new(0.0, -10.0)
}

/// Static 20 x 2 box whose top face is at y = -1.
fn add_ground(world: &mut World) -> BodyHandle {
    let ground = world.create_body(&BodyDef::static_body().with_position(Vec2::new(0.0, -2.0)));
    world
        .create_fixture(ground, FixtureDef::new(Polygon::new_box(10.0, 1.0)))
        .unwrap();
    ground
}

fn add_ball(world: &mut World, position: Vec2, radius: f64) -> BodyHandle {
    let ball = world.create_body(&BodyDef::dynamic().with_position(position));
    world
        .create_fixture(ball, FixtureDef::new(Circle::new(radius)).with_density(1.0))
        .unwrap();
    ball
}

fn run(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT).unwrap();
    }
}

#[derive(Default)]
struct Events {
    begin: usize,
    end: usize,
}

struct EventLog(Rc<RefCell<Events>>);

impl ContactListener for EventLog {
    fn begin_contact(&mut self, _contact: &Contact) {
        self.0.borrow_mut().begin += 1;
    }

    fn end_contact(&mut self, _contact: &Contact) {
        self.0.borrow_mut().end += 1;
    }
}

fn log_events(world: &mut World) -> Rc<RefCell<Events>> {
    let events = Rc::new(RefCell::new(Events::default()));
    world.set_contact_listener(Box::new(EventLog(Rc::clone(&events))));
    events
}

#[test]
fn test_ball_comes_to_rest_on_ground() {
    let mut world = World::new(gravity());
    add_ground(&mut world);
    let ball = add_ball(&mut world, Vec2::new(0.0, 2.0), 0.5);

    run(&mut world, 300);

    // Resting height: ground top + skin + radius - slop.
    let body = world.body(ball).unwrap();
    assert_relative_eq!(body.position().y, -0.495, epsilon = 0.01);
    assert_relative_eq!(body.position().x, 0.0, epsilon = 1e-6);
    assert!(body.linear_velocity().magnitude() < 0.05);
}

#[test]
fn test_side_by_side_boxes_get_two_point_manifold() {
    let mut world = World::new(Vec2::ZERO);
    let left = world.create_body(&BodyDef::static_body());
    world
        .create_fixture(left, FixtureDef::new(Polygon::new_box(1.0, 1.0)))
        .unwrap();
    let right = world.create_body(&BodyDef::dynamic().with_position(Vec2::new(1.9, 0.0)));
    world
        .create_fixture(right, FixtureDef::new(Polygon::new_box(1.0, 1.0)).with_density(1.0))
        .unwrap();

    let stats = world.step(DT).unwrap();
    assert_eq!(stats.contact_count, 1);

    let (handle, contact) = world.contacts().next().unwrap();
    assert!(contact.is_touching());
    assert_eq!(contact.manifold().point_count, 2);

    let manifold = world.world_manifold(handle).unwrap();
    assert_relative_eq!(manifold.normal.x.abs(), 1.0, epsilon = 1e-6);
    assert_relative_eq!(manifold.normal.y, 0.0, epsilon = 1e-6);

    // The overlap pushes the dynamic box to the right.
    assert!(world.body(right).unwrap().position().x > 1.9);
}

/// Thin circle moving fast enough to cross a ground edge within one step.
fn fast_ball_world(continuous: bool) -> (World, BodyHandle) {
    let settings = Settings::default().with_continuous_physics(continuous);
    let mut world = World::with_settings(Vec2::ZERO, settings).unwrap();
    let ground = world.create_body(&BodyDef::static_body());
    world
        .create_fixture(ground, FixtureDef::new(Edge::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0))))
        .unwrap();
    let ball = world.create_body(
        &BodyDef::dynamic()
            .with_position(Vec2::new(0.0, 1.0))
            .with_linear_velocity(Vec2::new(0.0, -100.0)),
    );
    world
        .create_fixture(ball, FixtureDef::new(Circle::new(0.1)).with_density(1.0))
        .unwrap();
    (world, ball)
}

#[test]
fn test_fast_ball_stopped_by_time_of_impact() {
    let (mut world, ball) = fast_ball_world(true);

    let stats = world.step(DT).unwrap();
    assert!(stats.toi_events >= 1);

    let body = world.body(ball).unwrap();
    assert!(body.position().y > 0.05, "ball tunneled to {:?}", body.position());
    assert!(body.linear_velocity().y > -1.0);
}

#[test]
fn test_grazing_fast_ball_stopped_by_time_of_impact() {
    // Travels 2 m along a long edge per step while sinking 0.1 m toward it.
    let mut world = World::new(Vec2::ZERO);
    let ground = world.create_body(&BodyDef::static_body());
    world
        .create_fixture(ground, FixtureDef::new(Edge::new(Vec2::new(-50.0, 0.0), Vec2::new(50.0, 0.0))))
        .unwrap();
    let ball = world.create_body(
        &BodyDef::dynamic()
            .with_position(Vec2::new(0.0, 0.08))
            .with_linear_velocity(Vec2::new(120.0, -6.0)),
    );
    world
        .create_fixture(ball, FixtureDef::new(Circle::new(0.05)).with_density(1.0))
        .unwrap();

    let stats = world.step(DT).unwrap();
    assert!(stats.toi_events >= 1);
    assert!(world.body(ball).unwrap().position().y > 0.0);

    run(&mut world, 10);

    let body = world.body(ball).unwrap();
    assert!(body.position().y > 0.0, "ball tunneled to {:?}", body.position());
    assert!(body.linear_velocity().y > -1.0);
}

#[test]
fn test_fast_ball_tunnels_without_continuous_physics() {
    let (mut world, ball) = fast_ball_world(false);

    let stats = world.step(DT).unwrap();
    assert_eq!(stats.toi_events, 0);
    world.step(DT).unwrap();

    assert!(world.body(ball).unwrap().position().y < -1.0);
}

#[test]
fn test_resting_body_falls_asleep_and_wakes() {
    let mut world = World::new(gravity());
    add_ground(&mut world);
    let ball = add_ball(&mut world, Vec2::new(0.0, -0.495), 0.5);

    let mut asleep_at = None;
    for i in 0..180 {
        let stats = world.step(DT).unwrap();
        if !world.body(ball).unwrap().is_awake() {
            assert_eq!(stats.island_count, 1, "the island that slept was still solved");
            asleep_at = Some(i);
            break;
        }
    }
    assert!(asleep_at.is_some());

    let stats = world.step(DT).unwrap();
    assert_eq!(stats.island_count, 0);
    assert_eq!(world.body(ball).unwrap().linear_velocity(), Vec2::ZERO);

    let body = world.body_mut(ball).unwrap();
    body.apply_linear_impulse(Vec2::new(0.0, 5.0), body.world_center());
    assert!(body.is_awake());
    let stats = world.step(DT).unwrap();
    assert_eq!(stats.island_count, 1);
    assert!(world.body(ball).unwrap().position().y > -0.495);
}

#[test]
fn test_warm_started_box_carries_its_weight() {
    let settings = Settings::default().with_sleep(false);
    let mut world = World::with_settings(gravity(), settings).unwrap();
    add_ground(&mut world);
    let crate_box = world.create_body(&BodyDef::dynamic().with_position(Vec2::new(0.0, -0.48)));
    world
        .create_fixture(crate_box, FixtureDef::new(Polygon::new_box(0.5, 0.5)).with_density(1.0))
        .unwrap();
    assert_relative_eq!(world.body(crate_box).unwrap().mass(), 1.0, epsilon = 1e-12);

    run(&mut world, 120);

    let (_, contact) = world.contacts().next().unwrap();
    let manifold = contact.manifold();
    assert_eq!(manifold.point_count, 2);
    let total: f64 = manifold.points().iter().map(|p| p.normal_impulse).sum();
    // Impulse needed to cancel one step of gravity: m * g * dt.
    assert_relative_eq!(total, 10.0 * DT, max_relative = 0.01);
    // Symmetric stance shares the load.
    let p = manifold.points();
    assert_relative_eq!(p[0].normal_impulse, p[1].normal_impulse, max_relative = 0.05);
}

#[test]
fn test_mass_follows_density_and_area() {
    let mut world = World::default();
    let ball = world.create_body(&BodyDef::dynamic());
    world
        .create_fixture(ball, FixtureDef::new(Circle::new(0.5)).with_density(2.0))
        .unwrap();
    let body = world.body(ball).unwrap();
    assert_relative_eq!(body.mass(), 2.0 * PI * 0.25, epsilon = 1e-12);
    // Solid disc about its center: m r^2 / 2.
    assert_relative_eq!(body.inertia(), 0.5 * body.mass() * 0.25, epsilon = 1e-12);
}

#[test]
fn test_revolute_pendulum_keeps_its_length() {
    let mut world = World::new(gravity());
    let pivot = world.create_body(&BodyDef::static_body());
    let bob = add_ball(&mut world, Vec2::new(1.0, 0.0), 0.1);
    let def = RevoluteJointDef::initialize(
        pivot,
        world.body(pivot).unwrap(),
        bob,
        world.body(bob).unwrap(),
        Vec2::ZERO,
    );
    let joint = world.create_joint(def).unwrap();

    // About a quarter period: the bob is near the bottom of its swing.
    for _ in 0..30 {
        world.step(DT).unwrap();
        let p = world.body(bob).unwrap().position();
        assert_relative_eq!(p.magnitude(), 1.0, epsilon = 0.01);
    }
    assert!(world.body(bob).unwrap().position().y < -0.5);

    // The pin carries the bob's weight and the centripetal load.
    let force = world.joint(joint).unwrap().reaction_force(1.0 / DT);
    assert!(force.y > 0.0);
}

#[test]
fn test_distance_pendulum_keeps_its_length() {
    let mut world = World::new(gravity());
    let pivot = world.create_body(&BodyDef::static_body().with_position(Vec2::new(0.0, 5.0)));
    let bob = add_ball(&mut world, Vec2::new(2.0, 5.0), 0.1);
    let def = DistanceJointDef::initialize(
        pivot,
        world.body(pivot).unwrap(),
        bob,
        world.body(bob).unwrap(),
        Vec2::new(0.0, 5.0),
        Vec2::new(2.0, 5.0),
    );
    world.create_joint(def).unwrap();

    run(&mut world, 45);

    let p = world.body(bob).unwrap().position();
    assert_relative_eq!(p.distance(Vec2::new(0.0, 5.0)), 2.0, epsilon = 0.02);
    assert!(p.y < 4.0);
}

#[test]
fn test_listener_sees_begin_and_end() {
    let mut world = World::new(gravity());
    let events = log_events(&mut world);
    add_ground(&mut world);
    let ball = add_ball(&mut world, Vec2::new(0.0, 0.0), 0.5);

    run(&mut world, 60);
    assert_eq!(events.borrow().begin, 1);
    assert_eq!(events.borrow().end, 0);

    // Teleporting does not wake a sleeping body; resting pairs are not re-checked.
    world.set_transform(ball, Vec2::new(0.0, 10.0), 0.0).unwrap();
    world.body_mut(ball).unwrap().set_awake(true);
    world.step(DT).unwrap();
    assert_eq!(events.borrow().end, 1);
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn test_sensor_reports_overlap_without_response() {
    let mut world = World::new(gravity());
    let events = log_events(&mut world);
    let zone = world.create_body(&BodyDef::static_body());
    world
        .create_fixture(zone, FixtureDef::new(Polygon::new_box(1.0, 1.0)).sensor())
        .unwrap();
    let ball = add_ball(&mut world, Vec2::new(0.0, 3.0), 0.25);

    run(&mut world, 120);

    assert!(world.body(ball).unwrap().position().y < -5.0);
    assert_eq!(events.borrow().begin, 1);
    assert_eq!(events.borrow().end, 1);
}

#[test]
fn test_negative_group_never_collides() {
    let mut world = World::new(Vec2::ZERO);
    let filter = Filter {
        group_index: -1,
        ..Filter::default()
    };
    for x in [0.0, 0.5] {
        let body = world.create_body(&BodyDef::dynamic().with_position(Vec2::new(x, 0.0)));
        world
            .create_fixture(body, FixtureDef::new(Circle::new(0.5)).with_density(1.0).with_filter(filter))
            .unwrap();
    }
    let stats = world.step(DT).unwrap();
    assert_eq!(stats.contact_count, 0);
}

#[test]
fn test_ball_rolls_along_chain() {
    let mut world = World::new(gravity());
    let ground = world.create_body(&BodyDef::static_body());
    let chain = Chain::new(vec![
        Vec2::new(-10.0, 0.0),
        Vec2::new(-2.0, 0.0),
        Vec2::new(2.0, 0.0),
        Vec2::new(10.0, 0.0),
    ]);
    world.create_fixture(ground, FixtureDef::new(chain)).unwrap();

    let ball = world.create_body(
        &BodyDef::dynamic()
            .with_position(Vec2::new(-3.0, 0.6))
            .with_linear_velocity(Vec2::new(3.0, 0.0)),
    );
    world
        .create_fixture(ball, FixtureDef::new(Circle::new(0.5)).with_density(1.0))
        .unwrap();

    run(&mut world, 120);

    // Crossed the interior vertex at x = -2 without catching on it.
    let p = world.body(ball).unwrap().position();
    assert!(p.x > -1.0);
    assert_relative_eq!(p.y, 0.505, epsilon = 0.02);
}

#[test]
fn test_invalid_time_step_is_rejected() {
    let mut world = World::default();
    add_ball(&mut world, Vec2::ZERO, 0.5);
    assert!(matches!(world.step(f64::NAN), Err(PhysicsError::InvalidTimeStep(_))));
    assert!(matches!(
        world.step(f64::NEG_INFINITY),
        Err(PhysicsError::InvalidTimeStep(_))
    ));
    assert!(world.step(DT).is_ok());
}
