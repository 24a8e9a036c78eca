//! Sort and sweep broadphase over the three world axes.
//!
//! Each axis keeps a sorted list of interval end points bracketed by two
//! sentinels. Moving a proxy re-sorts only its own end points with insertion
//! sort, adding a pair when a crossing starts an overlap on this axis and the
//! other two axes already overlap, and removing it when a crossing ends one.
//! On equal values a min end point sorts before a max end point, so touching
//! intervals overlap exactly as they do in `Aabb::intersects`.

use log::{trace, warn};

use crate::collision::{BroadPhase, BroadphaseProxy, CollisionFilter, OverlappingPairCache, ProxyHandle};
use crate::core::BodyHandle;
use crate::error::PhysicsError;
use crate::math::Aabb;
use crate::Result;

#[derive(Debug, Clone, Copy)]
struct Edge {
    pos: f32,
    handle: u32,
    is_max: bool,
}

impl Edge {
    /// Sort order along an axis
    #[inline]
    fn precedes(&self, other: &Edge) -> bool {
        self.pos < other.pos || (self.pos == other.pos && !self.is_max && other.is_max)
    }
}

#[derive(Debug, Clone)]
struct Handle {
    proxy: Option<BroadphaseProxy>,
    min_edges: [usize; 3],
    max_edges: [usize; 3],
}

impl Handle {
    fn free() -> Self {
        Self {
            proxy: None,
            min_edges: [0; 3],
            max_edges: [0; 3],
        }
    }
}

/// Incremental three axis sort and sweep broadphase with a fixed capacity
#[derive(Debug)]
pub struct AxisSweep3 {
    /// Maximum number of live proxies
    max_handles: u32,

    /// Handle slots; slot 0 owns the sentinels
    handles: Vec<Handle>,

    /// Free handle slots
    free: Vec<u32>,

    /// Number of live proxies
    num_handles: u32,

    /// Sorted end points per axis
    edges: [Vec<Edge>; 3],

    /// Pairs maintained by the sweep
    pairs: OverlappingPairCache,
}

impl AxisSweep3 {
    /// Creates a sweep broadphase that accepts at most `max_handles` proxies
    pub fn new(max_handles: u32) -> Self {
        let sentinel = Handle {
            proxy: None,
            min_edges: [0; 3],
            max_edges: [1; 3],
        };
        let axis_edges = || {
            let mut edges = Vec::with_capacity(2 * max_handles as usize + 2);
            edges.push(Edge { pos: f32::NEG_INFINITY, handle: 0, is_max: false });
            edges.push(Edge { pos: f32::INFINITY, handle: 0, is_max: true });
            edges
        };

        Self {
            max_handles,
            handles: vec![sentinel],
            free: Vec::new(),
            num_handles: 0,
            edges: [axis_edges(), axis_edges(), axis_edges()],
            pairs: OverlappingPairCache::new(),
        }
    }

    /// Proxy capacity given at construction
    pub fn capacity(&self) -> u32 {
        self.max_handles
    }

    fn alloc_handle(&mut self) -> usize {
        match self.free.pop() {
            Some(index) => index as usize,
            None => {
                self.handles.push(Handle::free());
                self.handles.len() - 1
            }
        }
    }

    fn is_live(&self, handle: usize) -> bool {
        handle != 0 && self.handles.get(handle).is_some_and(|h| h.proxy.is_some())
    }

    /// Overlap test on the two axes other than `ignore_axis`, using end point order
    fn test_overlap(&self, ignore_axis: usize, a: usize, b: usize) -> bool {
        let ha = &self.handles[a];
        let hb = &self.handles[b];
        (0..3).filter(|&axis| axis != ignore_axis).all(|axis| {
            !(ha.max_edges[axis] < hb.min_edges[axis] || hb.max_edges[axis] < ha.min_edges[axis])
        })
    }

    fn add_pair(&mut self, a: usize, b: usize) {
        if a == 0 || b == 0 {
            return;
        }
        let (Some(pa), Some(pb)) = (&self.handles[a].proxy, &self.handles[b].proxy) else {
            return;
        };
        if pa.filter.should_collide(&pb.filter) {
            self.pairs.add_pair((ProxyHandle(a as u32), pa.owner), (ProxyHandle(b as u32), pb.owner));
        }
    }

    fn remove_pair(&mut self, a: usize, b: usize) {
        self.pairs.remove_pair(ProxyHandle(a as u32), ProxyHandle(b as u32));
    }

    fn sort_min_down(&mut self, axis: usize, mut index: usize, update_overlaps: bool) {
        let handle = self.edges[axis][index].handle as usize;
        while index > 0 {
            let prev = self.edges[axis][index - 1];
            if !self.edges[axis][index].precedes(&prev) {
                break;
            }
            let prev_handle = prev.handle as usize;
            if prev.is_max {
                // our min passes their max from above: overlap starts on this axis
                if update_overlaps && self.test_overlap(axis, handle, prev_handle) {
                    self.add_pair(handle, prev_handle);
                }
                self.handles[prev_handle].max_edges[axis] += 1;
            } else {
                self.handles[prev_handle].min_edges[axis] += 1;
            }
            self.handles[handle].min_edges[axis] -= 1;
            self.edges[axis].swap(index, index - 1);
            index -= 1;
        }
    }

    fn sort_min_up(&mut self, axis: usize, mut index: usize, update_overlaps: bool) {
        let handle = self.edges[axis][index].handle as usize;
        while index + 1 < self.edges[axis].len() {
            let next = self.edges[axis][index + 1];
            if !next.precedes(&self.edges[axis][index]) {
                break;
            }
            let next_handle = next.handle as usize;
            if next.is_max {
                // our min passes their max from below: overlap ends
                if update_overlaps {
                    self.remove_pair(handle, next_handle);
                }
                self.handles[next_handle].max_edges[axis] -= 1;
            } else {
                self.handles[next_handle].min_edges[axis] -= 1;
            }
            self.handles[handle].min_edges[axis] += 1;
            self.edges[axis].swap(index, index + 1);
            index += 1;
        }
    }

    fn sort_max_down(&mut self, axis: usize, mut index: usize, update_overlaps: bool) {
        let handle = self.edges[axis][index].handle as usize;
        while index > 0 {
            let prev = self.edges[axis][index - 1];
            if !self.edges[axis][index].precedes(&prev) {
                break;
            }
            let prev_handle = prev.handle as usize;
            if !prev.is_max {
                // our max passes their min from above: overlap ends
                if update_overlaps {
                    self.remove_pair(handle, prev_handle);
                }
                self.handles[prev_handle].min_edges[axis] += 1;
            } else {
                self.handles[prev_handle].max_edges[axis] += 1;
            }
            self.handles[handle].max_edges[axis] -= 1;
            self.edges[axis].swap(index, index - 1);
            index -= 1;
        }
    }

    fn sort_max_up(&mut self, axis: usize, mut index: usize, update_overlaps: bool) {
        let handle = self.edges[axis][index].handle as usize;
        while index + 1 < self.edges[axis].len() {
            let next = self.edges[axis][index + 1];
            if !next.precedes(&self.edges[axis][index]) {
                break;
            }
            let next_handle = next.handle as usize;
            if !next.is_max {
                // our max passes their min from below: overlap starts on this axis
                if update_overlaps && self.test_overlap(axis, handle, next_handle) {
                    self.add_pair(handle, next_handle);
                }
                self.handles[next_handle].min_edges[axis] -= 1;
            } else {
                self.handles[next_handle].max_edges[axis] -= 1;
            }
            self.handles[handle].max_edges[axis] += 1;
            self.edges[axis].swap(index, index + 1);
            index += 1;
        }
    }

    #[cfg(test)]
    fn is_sorted(&self) -> bool {
        self.edges.iter().all(|edges| edges.windows(2).all(|w| !w[1].precedes(&w[0])))
    }
}

impl BroadPhase for AxisSweep3 {
    fn add_proxy(&mut self, aabb: Aabb, owner: BodyHandle, filter: CollisionFilter) -> Result<ProxyHandle> {
        if self.num_handles >= self.max_handles {
            warn!("axis sweep broadphase is full ({} proxies)", self.max_handles);
            return Err(PhysicsError::CapacityExceeded { capacity: self.max_handles });
        }
        if !aabb.is_valid() {
            return Err(PhysicsError::InvalidParameter(format!("invalid proxy bounds {:?}", aabb)));
        }

        let handle = self.alloc_handle();
        self.handles[handle].proxy = Some(BroadphaseProxy::new(aabb, owner, filter));

        // Insert the new end points just below the max sentinel.
        for axis in 0..3 {
            let edges = &mut self.edges[axis];
            let limit = edges.len() - 1;
            let sentinel = edges[limit];
            edges[limit] = Edge { pos: aabb.min[axis], handle: handle as u32, is_max: false };
            edges.push(Edge { pos: aabb.max[axis], handle: handle as u32, is_max: true });
            edges.push(sentinel);

            self.handles[0].max_edges[axis] = limit + 2;
            self.handles[handle].min_edges[axis] = limit;
            self.handles[handle].max_edges[axis] = limit + 1;
        }
        self.num_handles += 1;

        // Only the last axis reports overlaps; the first two are fully sorted by then.
        for axis in 0..3 {
            let update = axis == 2;
            let min_edge = self.handles[handle].min_edges[axis];
            self.sort_min_down(axis, min_edge, update);
            let max_edge = self.handles[handle].max_edges[axis];
            self.sort_max_down(axis, max_edge, update);
        }

        Ok(ProxyHandle(handle as u32))
    }

    fn remove_proxy(&mut self, proxy: ProxyHandle) {
        let handle = proxy.0 as usize;
        if !self.is_live(handle) {
            return;
        }

        self.pairs.remove_pairs_containing(proxy);

        // Push both end points up against the max sentinel, then drop them.
        for axis in 0..3 {
            let max_edge = self.handles[handle].max_edges[axis];
            self.edges[axis][max_edge].pos = f32::INFINITY;
            self.sort_max_up(axis, max_edge, false);

            let min_edge = self.handles[handle].min_edges[axis];
            self.edges[axis][min_edge].pos = f32::INFINITY;
            self.sort_min_up(axis, min_edge, false);

            let edges = &mut self.edges[axis];
            let sentinel = edges[edges.len() - 1];
            edges.truncate(edges.len() - 3);
            edges.push(sentinel);
            self.handles[0].max_edges[axis] = edges.len() - 1;
        }

        self.handles[handle] = Handle::free();
        self.free.push(handle as u32);
        self.num_handles -= 1;
    }

    fn set_aabb(&mut self, proxy: ProxyHandle, aabb: Aabb) {
        let handle = proxy.0 as usize;
        if !self.is_live(handle) {
            return;
        }
        if !aabb.is_valid() {
            warn!("ignoring invalid bounds {:?} for proxy {}", aabb, handle);
            return;
        }
        if let Some(p) = self.handles[handle].proxy.as_mut() {
            p.aabb = aabb;
        }

        for axis in 0..3 {
            let min_edge = self.handles[handle].min_edges[axis];
            let max_edge = self.handles[handle].max_edges[axis];
            let dmin = aabb.min[axis] - self.edges[axis][min_edge].pos;
            let dmax = aabb.max[axis] - self.edges[axis][max_edge].pos;
            self.edges[axis][min_edge].pos = aabb.min[axis];
            self.edges[axis][max_edge].pos = aabb.max[axis];

            // expand first (only adds pairs), then shrink (only removes)
            if dmin < 0.0 {
                self.sort_min_down(axis, self.handles[handle].min_edges[axis], true);
            }
            if dmax > 0.0 {
                self.sort_max_up(axis, self.handles[handle].max_edges[axis], true);
            }
            if dmin > 0.0 {
                self.sort_min_up(axis, self.handles[handle].min_edges[axis], true);
            }
            if dmax < 0.0 {
                self.sort_max_down(axis, self.handles[handle].max_edges[axis], true);
            }
        }
    }

    fn calculate_overlapping_pairs(&mut self) {
        // pairs are maintained while sorting in set_aabb
        trace!("axis sweep: {} proxies, {} pairs", self.num_handles, self.pairs.len());
    }

    fn proxy(&self, proxy: ProxyHandle) -> Option<&BroadphaseProxy> {
        if proxy.0 == 0 {
            return None;
        }
        self.handles.get(proxy.0 as usize).and_then(|h| h.proxy.as_ref())
    }

    fn proxy_count(&self) -> usize {
        self.num_handles as usize
    }

    fn query_aabb(&self, aabb: &Aabb) -> Vec<ProxyHandle> {
        // A proxy overlapping on x starts at or before max.x and ends at or
        // after min.x. Walk whichever side of the sorted x edges is shorter.
        let edges = &self.edges[0];
        let starts_before_max = edges.partition_point(|e| e.pos <= aabb.max.x);
        let ends_after_min = edges.partition_point(|e| e.pos < aabb.min.x);
        let (range, want_max) = if starts_before_max <= edges.len() - ends_after_min {
            (0..starts_before_max, false)
        } else {
            (ends_after_min..edges.len(), true)
        };

        let mut found: Vec<ProxyHandle> = edges[range]
            .iter()
            .filter(|e| e.is_max == want_max && e.handle != 0)
            .filter_map(|e| match &self.handles[e.handle as usize].proxy {
                Some(p) if p.aabb.intersects(aabb) => Some(ProxyHandle(e.handle)),
                _ => None,
            })
            .collect();
        found.sort_unstable();
        found
    }

    fn pair_cache(&self) -> &OverlappingPairCache {
        &self.pairs
    }

    fn pair_cache_mut(&mut self) -> &mut OverlappingPairCache {
        &mut self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;

    fn cube(center: Vector3) -> Aabb {
        Aabb::from_center_half_extents(center, Vector3::repeat(1.0))
    }

    fn owner(i: u32) -> BodyHandle {
        BodyHandle::new(i, 0)
    }

    #[test]
    fn reports_overlap_on_all_axes_only() {
        let mut sweep = AxisSweep3::new(8);
        let a = sweep.add_proxy(cube(Vector3::zeros()), owner(0), CollisionFilter::dynamic()).unwrap();
        let b = sweep.add_proxy(cube(Vector3::new(1.5, 0.0, 0.0)), owner(1), CollisionFilter::dynamic()).unwrap();
        let c = sweep.add_proxy(cube(Vector3::new(1.5, 5.0, 0.0)), owner(2), CollisionFilter::dynamic()).unwrap();
        sweep.calculate_overlapping_pairs();

        assert!(sweep.pair_cache().contains_pair(a, b));
        assert!(!sweep.pair_cache().contains_pair(a, c));
        assert!(!sweep.pair_cache().contains_pair(b, c));
        assert!(sweep.is_sorted());
    }

    #[test]
    fn touching_intervals_overlap() {
        let mut sweep = AxisSweep3::new(8);
        let a = sweep.add_proxy(cube(Vector3::zeros()), owner(0), CollisionFilter::dynamic()).unwrap();
        let b = sweep.add_proxy(cube(Vector3::new(2.0, 0.0, 0.0)), owner(1), CollisionFilter::dynamic()).unwrap();
        assert!(sweep.pair_cache().contains_pair(a, b));
    }

    #[test]
    fn moving_apart_and_back_updates_pairs() {
        let mut sweep = AxisSweep3::new(8);
        let a = sweep.add_proxy(cube(Vector3::zeros()), owner(0), CollisionFilter::dynamic()).unwrap();
        let b = sweep.add_proxy(cube(Vector3::new(1.0, 1.0, 0.0)), owner(1), CollisionFilter::dynamic()).unwrap();
        assert!(sweep.pair_cache().contains_pair(a, b));

        sweep.set_aabb(b, cube(Vector3::new(10.0, 1.0, 0.0)));
        assert!(!sweep.pair_cache().contains_pair(a, b));

        sweep.set_aabb(b, cube(Vector3::new(-1.0, -1.5, 0.5)));
        assert!(sweep.pair_cache().contains_pair(a, b));
        assert!(sweep.is_sorted());
    }

    #[test]
    fn capacity_is_enforced() {
        let mut sweep = AxisSweep3::new(2);
        sweep.add_proxy(cube(Vector3::zeros()), owner(0), CollisionFilter::dynamic()).unwrap();
        sweep.add_proxy(cube(Vector3::zeros()), owner(1), CollisionFilter::dynamic()).unwrap();
        let err = sweep.add_proxy(cube(Vector3::zeros()), owner(2), CollisionFilter::dynamic());
        assert!(matches!(err, Err(PhysicsError::CapacityExceeded { capacity: 2 })));
        assert!(sweep.is_sorted());
    }

    #[test]
    fn removal_frees_slot_and_keeps_order() {
        let mut sweep = AxisSweep3::new(2);
        let a = sweep.add_proxy(cube(Vector3::zeros()), owner(0), CollisionFilter::dynamic()).unwrap();
        let b = sweep.add_proxy(cube(Vector3::new(0.5, 0.0, 0.0)), owner(1), CollisionFilter::dynamic()).unwrap();
        sweep.remove_proxy(a);
        assert!(sweep.pair_cache().is_empty());
        assert_eq!(sweep.proxy_count(), 1);
        assert!(sweep.is_sorted());

        let c = sweep.add_proxy(cube(Vector3::new(0.2, 0.0, 0.0)), owner(2), CollisionFilter::dynamic()).unwrap();
        assert!(sweep.pair_cache().contains_pair(b, c));
        assert_eq!(sweep.edges[0].len(), 2 * 2 + 2);
    }

    #[test]
    fn query_walks_sorted_edges() {
        let mut sweep = AxisSweep3::new(16);
        let mut handles = Vec::new();
        for i in 0..10 {
            let center = Vector3::new(i as f32 * 3.0, 0.0, 0.0);
            handles.push(sweep.add_proxy(cube(center), owner(i), CollisionFilter::dynamic()).unwrap());
        }
        // spans the whole row on x but not on y
        let wide = sweep
            .add_proxy(
                Aabb::new(Vector3::new(-10.0, 0.5, -1.0), Vector3::new(40.0, 3.0, 1.0)),
                owner(10),
                CollisionFilter::dynamic(),
            )
            .unwrap();

        // left side of the row
        let query = Aabb::new(Vector3::new(2.5, -0.5, -0.5), Vector3::new(3.5, 0.5, 0.5));
        assert_eq!(sweep.query_aabb(&query), vec![handles[1], wide]);

        // right side of the row
        let query = Aabb::new(Vector3::new(22.0, -0.5, -0.5), Vector3::new(23.5, 0.2, 0.5));
        assert_eq!(sweep.query_aabb(&query), vec![handles[7], handles[8]]);

        // nothing out on x
        let query = Aabb::new(Vector3::new(50.0, -0.5, -0.5), Vector3::new(51.0, 0.5, 0.5));
        assert!(sweep.query_aabb(&query).is_empty());
    }
}
