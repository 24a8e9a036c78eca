use ccd_physics::collision::{ClosestPointInput, GjkPairDetector};
use ccd_physics::math::Matrix3;
use ccd_physics::{CollisionShape, Transform, Vector3};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // two boxes with almost parallel faces, a configuration that produces
    // a nearly flat tetrahedron inside GJK
    #[rustfmt::skip]
    let basis_a = Matrix3::new(
        0.99999958, 0.00022980258, 0.00090992288,
        -0.00029313788, 0.99753088, 0.070228584,
        -0.00089153741, -0.070228823, 0.99753052,
    );
    #[rustfmt::skip]
    let basis_b = Matrix3::new(
        1.0, 4.4865553e-18, -4.4410586e-17,
        4.4865495e-18, 0.97979438, 0.20000751,
        4.4410586e-17, -0.20000751, 0.97979438,
    );
    let tr_a = Transform::from_basis(Vector3::new(0.001332825, 8.1363249, 7.039084), &basis_a);
    let tr_b = Transform::from_basis(Vector3::new(0.0, 9.1262732, 2.034318), &basis_b);

    let box_a = CollisionShape::new_box(Vector3::new(1.0000005, 1.0000005, 1.0000001))?;
    let box_b = CollisionShape::new_box(Vector3::new(3.2836332, 3.2836332, 3.283632))?;

    let mut detector = GjkPairDetector::default();
    detector.set_cached_separating_axis(Vector3::new(0.0, 0.059727669, 0.29259586));

    let input = ClosestPointInput::new(&box_a, tr_a, &box_b, tr_b);
    let result = detector.get_closest_points(&input);

    println!("method: {:?} after {} iterations", detector.last_method(), detector.last_iterations());
    println!("degenerate simplex fallbacks: {}", detector.degenerate_fallbacks());
    if result.has_result {
        println!("distance: {:.6}", result.distance);
        println!("point on A: {:?}", result.point_on_a.as_slice());
        println!("point on B: {:?}", result.point_on_b.as_slice());
        println!("normal on B: {:?}", result.normal_on_b.as_slice());
    } else {
        println!("no result");
    }

    // the same query again starts from the axis found above
    let again = detector.get_closest_points(&input);
    println!("warm query: distance {:.6} in {} iterations", again.distance, detector.last_iterations());

    Ok(())
}
