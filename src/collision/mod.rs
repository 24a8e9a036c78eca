mod filter;
mod broad_phase;
mod simple_broadphase;
mod axis_sweep;
mod simplex_solver;
mod gjk;
mod penetration;
pub mod ray_cast;
mod contact_manifold;
mod dispatcher;

pub use self::filter::{CollisionFilter, CollisionGroups};
pub use self::broad_phase::{
    create_broadphase, BroadPhase, BroadphaseProxy, BroadphaseType, OverlappingPair, OverlappingPairCache,
    ProxyHandle,
};
pub use self::simple_broadphase::SimpleBroadphase;
pub use self::axis_sweep::AxisSweep3;
pub use self::simplex_solver::{VoronoiSimplexSolver, DEFAULT_DEGENERATE_TOLERANCE};
pub use self::gjk::{
    closest_points, ClosestPointInput, ClosestPointResult, GjkConfig, GjkMethod, GjkPairDetector,
    DEFAULT_EPA_ITERATIONS,
};
pub use self::penetration::{calc_penetration_depth, PenetrationResult};
pub use self::ray_cast::RayCastResult;
pub use self::contact_manifold::{
    ManifoldPoint, PersistentManifold, DEFAULT_CONTACT_BREAKING_THRESHOLD, DEFAULT_CONTACT_STALENESS_THRESHOLD,
    MAX_CONTACT_POINTS,
};
pub use self::dispatcher::{
    AlgorithmKind, CollisionAlgorithm, CollisionDispatcher, CollisionObject, ConvexConvexAlgorithm, DispatcherInfo,
};
