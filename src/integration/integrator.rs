use super::{Position, Velocity};
use crate::common::Settings;
use crate::math::Vec2;
use crate::objects::Body;

/// First-order approximation of `exp(-damping * h)`, clamped to [0, 1].
///
/// `dv/dt + c * v = 0` has the solution `v(t + h) = v(t) * exp(-c * h)`; the Taylor
/// expansion `1 - c * h` is cheaper and stays stable once clamped.
pub fn damping_factor(damping: f64, h: f64) -> f64 {
    (1.0 - h * damping).clamp(0.0, 1.0)
}

/// Semi-implicit Euler velocity update of a dynamic body.
///
/// Adds gravity (unless the body ignores it) and the accumulated force and torque,
/// then applies damping. Non-dynamic bodies keep their velocity.
pub fn integrate_velocity(velocity: Velocity, body: &Body, gravity: Vec2, h: f64) -> Velocity {
    if !body.is_dynamic() {
        return velocity;
    }

    let acceleration = if body.ignore_gravity {
        body.force * body.inv_mass
    } else {
        gravity + body.force * body.inv_mass
    };

    let mut v = velocity.v + acceleration * h;
    let mut w = velocity.w + h * body.inv_i * body.torque;

    v *= damping_factor(body.linear_damping, h);
    w *= damping_factor(body.angular_damping, h);

    Velocity { v, w }
}

/// Advances a position by `h`, first scaling the velocity down so that no body moves
/// more than `max_translation` or turns more than `max_rotation` in one step.
pub fn integrate_position(position: &mut Position, velocity: &mut Velocity, h: f64, settings: &Settings) {
    let translation = velocity.v * h;
    if translation.magnitude_squared() > settings.max_translation_squared() {
        let ratio = settings.max_translation / translation.magnitude();
        velocity.v *= ratio;
    }

    let rotation = h * velocity.w;
    if rotation * rotation > settings.max_rotation_squared() {
        let ratio = settings.max_rotation / rotation.abs();
        velocity.w *= ratio;
    }

    position.c += velocity.v * h;
    position.a += h * velocity.w;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{BodyDef, BodyType};
    use approx::assert_relative_eq;

    fn dynamic_body() -> Body {
        let mut body = Body::new(&BodyDef::dynamic());
        // Unit mass and inertia without fixtures.
        body.inv_mass = 1.0;
        body.inv_i = 1.0;
        body
    }

    #[test]
    fn test_gravity_and_force() {
        let mut body = dynamic_body();
        body.inv_mass = 0.5;
        body.force = Vec2::new(10.0, 0.0);
        let v = integrate_velocity(Velocity::default(), &body, Vec2::new(0.0, 9.8), 0.1);
        assert_relative_eq!(v.v.x, 0.5);
        assert_relative_eq!(v.v.y, 0.98);
    }

    #[test]
    fn test_ignore_gravity() {
        let mut body = dynamic_body();
        body.ignore_gravity = true;
        body.torque = 5.0;
        let v = integrate_velocity(Velocity::default(), &body, Vec2::new(0.0, 9.8), 0.1);
        assert_eq!(v.v, Vec2::ZERO);
        assert_relative_eq!(v.w, 0.5);
    }

    #[test]
    fn test_damping() {
        let mut body = dynamic_body();
        body.linear_damping = 2.0;
        body.angular_damping = 100.0;
        let start = Velocity {
            v: Vec2::new(10.0, 0.0),
            w: 3.0,
        };
        let v = integrate_velocity(start, &body, Vec2::ZERO, 0.1);
        assert_relative_eq!(v.v.x, 8.0);
        // Over-damped factor clamps to zero rather than reversing.
        assert_eq!(v.w, 0.0);
    }

    #[test]
    fn test_static_body_untouched() {
        let body = Body::new(&BodyDef::new(BodyType::Static));
        let start = Velocity {
            v: Vec2::new(1.0, 1.0),
            w: 1.0,
        };
        let v = integrate_velocity(start, &body, Vec2::new(0.0, 9.8), 0.1);
        assert_eq!(v, start);
    }

    #[test]
    fn test_position_without_clamp() {
        let settings = Settings::default();
        let mut p = Position::default();
        let mut v = Velocity {
            v: Vec2::new(10.0, -5.0),
            w: 1.0,
        };
        integrate_position(&mut p, &mut v, 0.1, &settings);
        assert_relative_eq!(p.c.x, 1.0);
        assert_relative_eq!(p.c.y, -0.5);
        assert_relative_eq!(p.a, 0.1);
        assert_eq!(v.v, Vec2::new(10.0, -5.0));
    }

    #[test]
    fn test_position_clamps_large_velocities() {
        let settings = Settings::default();
        let mut p = Position::default();
        let mut v = Velocity {
            v: Vec2::new(0.0, 600.0),
            w: 300.0,
        };
        let h = 1.0 / 60.0;
        integrate_position(&mut p, &mut v, h, &settings);
        assert_relative_eq!(p.c.y, settings.max_translation, epsilon = 1e-12);
        assert_relative_eq!(p.a, settings.max_rotation, epsilon = 1e-12);
        assert_relative_eq!(v.v.y, settings.max_translation / h, epsilon = 1e-9);
    }
}
