use log::{trace, warn};

use crate::collision::{BroadPhase, BroadphaseProxy, CollisionFilter, OverlappingPairCache, ProxyHandle};
use crate::core::BodyHandle;
use crate::error::PhysicsError;
use crate::math::Aabb;
use crate::Result;

/// Brute force broadphase: tests every proxy pair on each update
#[derive(Debug, Default)]
pub struct SimpleBroadphase {
    /// Proxy slots, `None` when free
    proxies: Vec<Option<BroadphaseProxy>>,

    /// Free slot indices, reused last-in first-out
    free: Vec<u32>,

    /// Pairs found by the last update
    pairs: OverlappingPairCache,
}

impl SimpleBroadphase {
    /// Creates a new, empty broadphase
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadPhase for SimpleBroadphase {
    fn add_proxy(&mut self, aabb: Aabb, owner: BodyHandle, filter: CollisionFilter) -> Result<ProxyHandle> {
        if !aabb.is_valid() {
            return Err(PhysicsError::InvalidParameter(format!("invalid proxy bounds {:?}", aabb)));
        }

        let proxy = BroadphaseProxy::new(aabb, owner, filter);
        let index = match self.free.pop() {
            Some(index) => {
                self.proxies[index as usize] = Some(proxy);
                index
            }
            None => {
                self.proxies.push(Some(proxy));
                (self.proxies.len() - 1) as u32
            }
        };
        Ok(ProxyHandle(index))
    }

    fn remove_proxy(&mut self, proxy: ProxyHandle) {
        let Some(slot) = self.proxies.get_mut(proxy.0 as usize) else {
            return;
        };
        if slot.take().is_some() {
            self.pairs.remove_pairs_containing(proxy);
            self.free.push(proxy.0);
        }
    }

    fn set_aabb(&mut self, proxy: ProxyHandle, aabb: Aabb) {
        if !aabb.is_valid() {
            warn!("ignoring invalid bounds {:?} for proxy {}", aabb, proxy.0);
            return;
        }
        if let Some(Some(p)) = self.proxies.get_mut(proxy.0 as usize) {
            p.aabb = aabb;
        }
    }

    fn calculate_overlapping_pairs(&mut self) {
        for i in 0..self.proxies.len() {
            let Some(a) = &self.proxies[i] else { continue };
            for j in (i + 1)..self.proxies.len() {
                let Some(b) = &self.proxies[j] else { continue };

                let handle_a = ProxyHandle(i as u32);
                let handle_b = ProxyHandle(j as u32);
                if a.filter.should_collide(&b.filter) && a.aabb.intersects(&b.aabb) {
                    self.pairs.add_pair((handle_a, a.owner), (handle_b, b.owner));
                } else {
                    self.pairs.remove_pair(handle_a, handle_b);
                }
            }
        }
        trace!("simple broadphase: {} pairs", self.pairs.len());
    }

    fn proxy(&self, proxy: ProxyHandle) -> Option<&BroadphaseProxy> {
        self.proxies.get(proxy.0 as usize).and_then(|p| p.as_ref())
    }

    fn proxy_count(&self) -> usize {
        self.proxies.len() - self.free.len()
    }

    fn query_aabb(&self, aabb: &Aabb) -> Vec<ProxyHandle> {
        self.proxies
            .iter()
            .enumerate()
            .filter_map(|(i, p)| match p {
                Some(p) if p.aabb.intersects(aabb) => Some(ProxyHandle(i as u32)),
                _ => None,
            })
            .collect()
    }

    fn pair_cache(&self) -> &OverlappingPairCache {
        &self.pairs
    }

    fn pair_cache_mut(&mut self) -> &mut OverlappingPairCache {
        &mut self.pairs
    }
}
