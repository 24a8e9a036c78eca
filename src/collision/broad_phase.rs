use std::collections::BTreeMap;

use crate::collision::{AxisSweep3, CollisionAlgorithm, CollisionFilter, PersistentManifold, SimpleBroadphase};
use crate::core::BodyHandle;
use crate::math::Aabb;
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Stable identity of a broadphase proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyHandle(pub(crate) u32);

impl ProxyHandle {
    /// Index of the proxy slot
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Per-body broadphase bookkeeping
#[derive(Debug, Clone)]
pub struct BroadphaseProxy {
    /// Current world space bounds
    pub aabb: Aabb,

    /// Body this proxy belongs to
    pub owner: BodyHandle,

    /// Collision group and mask
    pub filter: CollisionFilter,
}

impl BroadphaseProxy {
    pub(crate) fn new(aabb: Aabb, owner: BodyHandle, filter: CollisionFilter) -> Self {
        Self { aabb, owner, filter }
    }
}

/// Which broadphase implementation a world uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum BroadphaseType {
    /// Brute force O(n^2) pair test without a capacity bound
    Simple,

    /// Incremental sort and sweep over three axes with a fixed proxy capacity
    AxisSweep { max_proxies: u32 },
}

impl Default for BroadphaseType {
    fn default() -> Self {
        BroadphaseType::AxisSweep { max_proxies: 16384 }
    }
}

/// Creates the broadphase selected by `kind`
pub fn create_broadphase(kind: BroadphaseType) -> Box<dyn BroadPhase> {
    match kind {
        BroadphaseType::Simple => Box::new(SimpleBroadphase::new()),
        BroadphaseType::AxisSweep { max_proxies } => Box::new(AxisSweep3::new(max_proxies)),
    }
}

/// Two proxies whose bounds overlap, with the lazily created narrow phase state
#[derive(Debug)]
pub struct OverlappingPair {
    proxy_a: ProxyHandle,
    proxy_b: ProxyHandle,
    owner_a: BodyHandle,
    owner_b: BodyHandle,
    pub(crate) algorithm: Option<CollisionAlgorithm>,
    pub(crate) manifold: Option<PersistentManifold>,
}

impl OverlappingPair {
    fn new(a: (ProxyHandle, BodyHandle), b: (ProxyHandle, BodyHandle)) -> Self {
        Self {
            proxy_a: a.0,
            proxy_b: b.0,
            owner_a: a.1,
            owner_b: b.1,
            algorithm: None,
            manifold: None,
        }
    }

    /// The two proxies, lower handle first
    pub fn proxies(&self) -> (ProxyHandle, ProxyHandle) {
        (self.proxy_a, self.proxy_b)
    }

    /// Bodies owning the two proxies, in proxy order
    pub fn owners(&self) -> (BodyHandle, BodyHandle) {
        (self.owner_a, self.owner_b)
    }

    /// Returns true if either side is `proxy`
    pub fn contains(&self, proxy: ProxyHandle) -> bool {
        self.proxy_a == proxy || self.proxy_b == proxy
    }

    /// Persistent contact manifold, once the narrow phase has run
    pub fn manifold(&self) -> Option<&PersistentManifold> {
        self.manifold.as_ref()
    }

    /// Narrow phase algorithm selected for this pair
    pub fn algorithm(&self) -> Option<&CollisionAlgorithm> {
        self.algorithm.as_ref()
    }

    /// Number of contact points currently cached
    pub fn contact_count(&self) -> usize {
        self.manifold.as_ref().map_or(0, |m| m.num_contacts())
    }

    /// Drops the algorithm and manifold so they are rebuilt on the next step
    pub(crate) fn clear_cache(&mut self) {
        self.algorithm = None;
        self.manifold = None;
    }
}

/// Ordered set of overlapping pairs keyed by proxy handles.
///
/// Iteration order is the handle order, which keeps the narrow phase and
/// the solver deterministic.
#[derive(Debug, Default)]
pub struct OverlappingPairCache {
    pairs: BTreeMap<(ProxyHandle, ProxyHandle), OverlappingPair>,
}

#[inline]
fn ordered(a: ProxyHandle, b: ProxyHandle) -> (ProxyHandle, ProxyHandle) {
    if a <= b { (a, b) } else { (b, a) }
}

impl OverlappingPairCache {
    /// Creates an empty pair cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pair unless it already exists. Returns true if it was added.
    pub fn add_pair(&mut self, a: (ProxyHandle, BodyHandle), b: (ProxyHandle, BodyHandle)) -> bool {
        if a.0 == b.0 {
            return false;
        }
        let (first, second) = if a.0 < b.0 { (a, b) } else { (b, a) };
        let key = (first.0, second.0);
        if self.pairs.contains_key(&key) {
            return false;
        }
        self.pairs.insert(key, OverlappingPair::new(first, second));
        true
    }

    /// Removes a pair together with its narrow phase state. Returns true if it existed.
    pub fn remove_pair(&mut self, a: ProxyHandle, b: ProxyHandle) -> bool {
        self.pairs.remove(&ordered(a, b)).is_some()
    }

    /// Returns true if the pair is cached
    pub fn contains_pair(&self, a: ProxyHandle, b: ProxyHandle) -> bool {
        self.pairs.contains_key(&ordered(a, b))
    }

    /// Looks up a pair
    pub fn find_pair(&self, a: ProxyHandle, b: ProxyHandle) -> Option<&OverlappingPair> {
        self.pairs.get(&ordered(a, b))
    }

    /// Removes every pair that references `proxy`
    pub fn remove_pairs_containing(&mut self, proxy: ProxyHandle) {
        self.pairs.retain(|_, pair| !pair.contains(proxy));
    }

    /// Discards the cached algorithm and manifold of every pair that references `proxy`
    pub fn clean_proxy_from_pairs(&mut self, proxy: ProxyHandle) {
        for pair in self.pairs.values_mut().filter(|p| p.contains(proxy)) {
            pair.clear_cache();
        }
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if there are no pairs
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs in handle order
    pub fn iter(&self) -> impl Iterator<Item = &OverlappingPair> {
        self.pairs.values()
    }

    /// Mutable pairs in handle order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut OverlappingPair> {
        self.pairs.values_mut()
    }

    /// Handles of every pair, in order
    pub fn pair_keys(&self) -> Vec<(ProxyHandle, ProxyHandle)> {
        self.pairs.keys().copied().collect()
    }

    /// Removes every pair
    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

/// Broadphase interface shared by the brute force and sweep implementations
pub trait BroadPhase: Send {
    /// Inserts a proxy for `owner` with the given bounds
    fn add_proxy(&mut self, aabb: Aabb, owner: BodyHandle, filter: CollisionFilter) -> Result<ProxyHandle>;

    /// Removes a proxy and every pair that references it. Unknown handles are ignored.
    fn remove_proxy(&mut self, proxy: ProxyHandle);

    /// Updates the bounds of a proxy
    fn set_aabb(&mut self, proxy: ProxyHandle, aabb: Aabb);

    /// Brings the pair cache up to date with the current bounds
    fn calculate_overlapping_pairs(&mut self);

    /// Looks up a proxy
    fn proxy(&self, proxy: ProxyHandle) -> Option<&BroadphaseProxy>;

    /// Number of live proxies
    fn proxy_count(&self) -> usize;

    /// Proxies whose bounds overlap `aabb`, in handle order
    fn query_aabb(&self, aabb: &Aabb) -> Vec<ProxyHandle>;

    /// The overlapping pair cache
    fn pair_cache(&self) -> &OverlappingPairCache;

    /// Mutable access to the overlapping pair cache
    fn pair_cache_mut(&mut self) -> &mut OverlappingPairCache;

    /// Discards cached narrow phase state for pairs with `proxy`
    fn clean_proxy_from_pairs(&mut self, proxy: ProxyHandle) {
        self.pair_cache_mut().clean_proxy_from_pairs(proxy);
    }

    /// Current pair set as ordered handle pairs
    fn overlapping_pairs(&self) -> Vec<(ProxyHandle, ProxyHandle)> {
        self.pair_cache().pair_keys()
    }
}
