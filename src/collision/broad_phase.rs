//! Broad-phase pair finding.
//!
//! The contact manager only talks to the [`BroadPhase`] trait, so any structure that
//! can store fattened boxes and report overlapping pairs can be plugged in. The
//! default is a sparse uniform grid.

use std::collections::HashMap;

use super::AABB;
use crate::common::settings::{AABB_EXTENSION, AABB_MULTIPLIER};
use crate::math::Vec2;

/// Stable identifier of a proxy inside a broad phase.
pub type ProxyId = usize;

/// Proxy storage and overlapping-pair reporting.
///
/// Each proxy stores a fattened box so that small motions do not touch the structure.
/// Proxies created, moved beyond their fat box, or touched are buffered and
/// [`update_pairs`](BroadPhase::update_pairs) reports every pair involving at least one
/// of them.
pub trait BroadPhase<T: Copy> {
    fn create_proxy(&mut self, aabb: AABB, data: T) -> ProxyId;

    fn destroy_proxy(&mut self, id: ProxyId);

    /// Re-fits a proxy if `aabb` escaped its fat box. Returns true when re-fitted.
    fn move_proxy(&mut self, id: ProxyId, aabb: AABB, displacement: Vec2) -> bool;

    /// Re-reports the pairs of a proxy on the next update.
    fn touch_proxy(&mut self, id: ProxyId);

    fn fat_aabb(&self, id: ProxyId) -> AABB;

    fn user_data(&self, id: ProxyId) -> T;

    fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.fat_aabb(a).overlaps(&self.fat_aabb(b))
    }

    /// Reports each new candidate pair once, in a deterministic order.
    fn update_pairs(&mut self, callback: &mut dyn FnMut(T, T));

    /// Visits proxies whose fat box overlaps `aabb`. Return false to stop.
    fn query(&self, aabb: &AABB, callback: &mut dyn FnMut(ProxyId) -> bool);

    fn proxy_count(&self) -> usize;
}

/// Proxies covering more cells than this go to a separate list that every query scans.
const MAX_CELLS_PER_PROXY: i64 = 64;

type CellKey = (i32, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Cells {
        min: CellKey,
        max: CellKey,
    },
    Oversized,
}

#[derive(Debug, Clone)]
struct GridProxy<T> {
    fat_aabb: AABB,
    data: T,
    placement: Placement,
}

/// Sparse uniform grid keyed by integer cell coordinates.
#[derive(Debug, Clone)]
pub struct GridBroadPhase<T> {
    inv_cell_size: f64,
    cells: HashMap<CellKey, Vec<ProxyId>>,
    oversized: Vec<ProxyId>,
    proxies: Vec<Option<GridProxy<T>>>,
    free: Vec<ProxyId>,
    move_buffer: Vec<ProxyId>,
    proxy_count: usize,
    // Working memory for `update_pairs`.
    pair_buffer: Vec<(ProxyId, ProxyId)>,
    query_buffer: Vec<ProxyId>,
}

impl<T: Copy> GridBroadPhase<T> {
    /// Creates a grid with square cells of `cell_size` meters.
    pub fn new(cell_size: f64) -> Self {
        assert!(cell_size > 0.0, "Cell size must be positive");
        Self {
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::new(),
            oversized: Vec::new(),
            proxies: Vec::new(),
            free: Vec::new(),
            move_buffer: Vec::new(),
            proxy_count: 0,
            pair_buffer: Vec::new(),
            query_buffer: Vec::new(),
        }
    }

    #[inline]
    fn cell_of(&self, point: Vec2) -> CellKey {
        (
            (point.x * self.inv_cell_size).floor() as i32,
            (point.y * self.inv_cell_size).floor() as i32,
        )
    }

    fn placement_for(&self, aabb: &AABB) -> Placement {
        let min = self.cell_of(aabb.min);
        let max = self.cell_of(aabb.max);
        let count = (i64::from(max.0) - i64::from(min.0) + 1) * (i64::from(max.1) - i64::from(min.1) + 1);
        if count > MAX_CELLS_PER_PROXY {
            Placement::Oversized
        } else {
            Placement::Cells { min, max }
        }
    }

    fn insert(&mut self, id: ProxyId, placement: Placement) {
        match placement {
            Placement::Cells { min, max } => {
                for row in min.1..=max.1 {
                    for col in min.0..=max.0 {
                        self.cells.entry((col, row)).or_default().push(id);
                    }
                }
            }
            Placement::Oversized => self.oversized.push(id),
        }
    }

    fn remove(&mut self, id: ProxyId, placement: Placement) {
        match placement {
            Placement::Cells { min, max } => {
                for row in min.1..=max.1 {
                    for col in min.0..=max.0 {
                        if let Some(cell) = self.cells.get_mut(&(col, row)) {
                            cell.retain(|&other| other != id);
                            if cell.is_empty() {
                                self.cells.remove(&(col, row));
                            }
                        }
                    }
                }
            }
            Placement::Oversized => self.oversized.retain(|&other| other != id),
        }
    }

    fn proxy(&self, id: ProxyId) -> &GridProxy<T> {
        match self.proxies.get(id) {
            Some(Some(proxy)) => proxy,
            _ => panic!("invalid proxy id {id}"),
        }
    }

    /// Sorted, de-duplicated candidates whose fat box overlaps `aabb`.
    /// Replaces the contents of `found` with the proxies whose fat box overlaps `aabb`,
    /// sorted by id.
    fn candidates(&self, aabb: &AABB, found: &mut Vec<ProxyId>) {
        found.clear();
        match self.placement_for(aabb) {
            Placement::Cells { min, max } => {
                for row in min.1..=max.1 {
                    for col in min.0..=max.0 {
                        if let Some(cell) = self.cells.get(&(col, row)) {
                            found.extend_from_slice(cell);
                        }
                    }
                }
                found.extend_from_slice(&self.oversized);
            }
            // A huge query box would walk too many cells; scan every proxy instead.
            Placement::Oversized => found.extend(
                self.proxies
                    .iter()
                    .enumerate()
                    .filter_map(|(id, p)| p.as_ref().map(|_| id)),
            ),
        }
        found.sort_unstable();
        found.dedup();
        found.retain(|&id| self.proxy(id).fat_aabb.overlaps(aabb));
    }
}

impl<T: Copy> BroadPhase<T> for GridBroadPhase<T> {
    fn create_proxy(&mut self, aabb: AABB, data: T) -> ProxyId {
        let fat_aabb = aabb.expanded(AABB_EXTENSION);
        let placement = self.placement_for(&fat_aabb);
        let proxy = GridProxy {
            fat_aabb,
            data,
            placement,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.proxies[id] = Some(proxy);
                id
            }
            None => {
                self.proxies.push(Some(proxy));
                self.proxies.len() - 1
            }
        };
        self.insert(id, placement);
        self.move_buffer.push(id);
        self.proxy_count += 1;
        id
    }

    fn destroy_proxy(&mut self, id: ProxyId) {
        let Some(proxy) = self.proxies.get_mut(id).and_then(Option::take) else {
            return;
        };
        self.remove(id, proxy.placement);
        self.move_buffer.retain(|&moved| moved != id);
        self.free.push(id);
        self.proxy_count -= 1;
    }

    fn move_proxy(&mut self, id: ProxyId, aabb: AABB, displacement: Vec2) -> bool {
        let old = self.proxy(id);
        if old.fat_aabb.contains(&aabb) {
            return false;
        }
        let old_placement = old.placement;

        // Extend the box in the direction of motion.
        let mut fat_aabb = aabb.expanded(AABB_EXTENSION);
        let d = displacement * AABB_MULTIPLIER;
        if d.x < 0.0 {
            fat_aabb.min.x += d.x;
        } else {
            fat_aabb.max.x += d.x;
        }
        if d.y < 0.0 {
            fat_aabb.min.y += d.y;
        } else {
            fat_aabb.max.y += d.y;
        }

        let placement = self.placement_for(&fat_aabb);
        self.remove(id, old_placement);
        self.insert(id, placement);
        if let Some(Some(proxy)) = self.proxies.get_mut(id) {
            proxy.fat_aabb = fat_aabb;
            proxy.placement = placement;
        }
        self.move_buffer.push(id);
        true
    }

    fn touch_proxy(&mut self, id: ProxyId) {
        self.move_buffer.push(id);
    }

    fn fat_aabb(&self, id: ProxyId) -> AABB {
        self.proxy(id).fat_aabb
    }

    fn user_data(&self, id: ProxyId) -> T {
        self.proxy(id).data
    }

    fn update_pairs(&mut self, callback: &mut dyn FnMut(T, T)) {
        let mut pairs = std::mem::take(&mut self.pair_buffer);
        let mut found = std::mem::take(&mut self.query_buffer);
        let mut moved = std::mem::take(&mut self.move_buffer);
        pairs.clear();

        for &query_id in &moved {
            let Some(Some(query)) = self.proxies.get(query_id) else {
                continue;
            };
            let fat_aabb = query.fat_aabb;
            self.candidates(&fat_aabb, &mut found);
            for &other in &found {
                if other != query_id {
                    pairs.push((query_id.min(other), query_id.max(other)));
                }
            }
        }

        pairs.sort_unstable();
        pairs.dedup();

        for &(a, b) in &pairs {
            callback(self.user_data(a), self.user_data(b));
        }

        moved.clear();
        self.move_buffer = moved;
        self.pair_buffer = pairs;
        self.query_buffer = found;
    }

    fn query(&self, aabb: &AABB, callback: &mut dyn FnMut(ProxyId) -> bool) {
        let mut found = Vec::new();
        self.candidates(aabb, &mut found);
        for id in found {
            if !callback(id) {
                return;
            }
        }
    }

    fn proxy_count(&self) -> usize {
        self.proxy_count
    }
}
