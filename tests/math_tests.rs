use ccd_physics::math::{plane_space, Aabb, Matrix3, Quaternion, Ray, Transform, Vector3};
use std::f32::consts::PI;
use approx::assert_relative_eq;

#[test]
fn test_transform_round_trip() {
    let transform = Transform::new(
        Vector3::new(1.0, -2.0, 3.0),
        Quaternion::from_axis_angle(&Vector3::y_axis(), PI / 3.0),
    );
    let point = Vector3::new(0.5, 4.0, -1.0);

    let world = transform.transform_point(&point);
    assert_relative_eq!(transform.inverse_transform_point(&world), point, epsilon = 1e-5);

    let inverse = transform.inverse();
    assert_relative_eq!(inverse.transform_point(&world), point, epsilon = 1e-5);
    assert_relative_eq!(
        transform.multiply(&inverse).position,
        Vector3::zeros(),
        epsilon = 1e-5
    );
}

#[test]
fn test_transform_directions_ignore_translation() {
    let transform = Transform::new(
        Vector3::new(10.0, 10.0, 10.0),
        Quaternion::from_axis_angle(&Vector3::z_axis(), PI / 2.0),
    );
    assert_relative_eq!(transform.transform_direction(&Vector3::x()), Vector3::y(), epsilon = 1e-6);
    assert_relative_eq!(
        transform.inverse_transform_direction(&Vector3::y()),
        Vector3::x(),
        epsilon = 1e-6
    );
}

#[test]
fn test_transform_from_basis_rows() {
    // rows of a quarter turn about z
    let basis = Matrix3::new(
        0.0, -1.0, 0.0,
        1.0, 0.0, 0.0,
        0.0, 0.0, 1.0,
    );
    let transform = Transform::from_basis(Vector3::new(0.0, 0.0, 1.0), &basis);
    assert_relative_eq!(transform.basis(), basis, epsilon = 1e-5);
    assert_relative_eq!(
        transform.transform_point(&Vector3::x()),
        Vector3::new(0.0, 1.0, 1.0),
        epsilon = 1e-5
    );
    assert!(transform.is_finite());
}

#[test]
fn test_aabb_operations() {
    let a = Aabb::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0));
    let b = Aabb::from_center_half_extents(Vector3::new(2.0, 0.0, 0.0), Vector3::repeat(1.0));
    let c = Aabb::from_center_half_extents(Vector3::new(5.0, 0.0, 0.0), Vector3::repeat(1.0));

    // touching counts as overlapping
    assert!(a.intersects(&b));
    assert!(!a.intersects(&c));

    let union = a.union(&c);
    assert_relative_eq!(union.min, Vector3::new(-1.0, -1.0, -1.0));
    assert_relative_eq!(union.max, Vector3::new(6.0, 1.0, 1.0));
    assert_relative_eq!(union.center(), Vector3::new(2.5, 0.0, 0.0));

    let grown = a.expand(0.5);
    assert_relative_eq!(grown.half_extents(), Vector3::repeat(1.5));
    assert!(grown.contains_point(&Vector3::new(1.4, 0.0, 0.0)));
    assert!(!a.contains_point(&Vector3::new(1.4, 0.0, 0.0)));

    let segment = Aabb::from_segment(&Vector3::new(3.0, -1.0, 0.0), &Vector3::new(-3.0, 2.0, 1.0));
    assert_relative_eq!(segment.min, Vector3::new(-3.0, -1.0, 0.0));
    assert_relative_eq!(segment.max, Vector3::new(3.0, 2.0, 1.0));
    assert!(segment.is_valid());
    assert!(!Aabb::new(Vector3::repeat(1.0), Vector3::zeros()).is_valid());
}

#[test]
fn test_aabb_ray_slab() {
    let aabb = Aabb::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0));
    let ray = Ray::from_points(Vector3::new(-5.0, 0.0, 0.0), Vector3::new(5.0, 0.0, 0.0));
    let (enter, exit) = aabb.intersects_ray(&ray, 0.0, 1.0).unwrap();
    assert_relative_eq!(enter, 0.4, epsilon = 1e-6);
    assert_relative_eq!(exit, 0.6, epsilon = 1e-6);
    assert_relative_eq!(ray.point_at(enter), Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-5);

    let miss = Ray::from_points(Vector3::new(-5.0, 3.0, 0.0), Vector3::new(5.0, 3.0, 0.0));
    assert!(aabb.intersects_ray(&miss, 0.0, 1.0).is_none());
}

#[test]
fn test_plane_space_for_contact_normals() {
    let normal = Vector3::new(0.0, 1.0, 0.0);
    let (t0, t1) = plane_space(&normal);
    assert_relative_eq!(t0.cross(&t1).dot(&normal).abs(), 1.0, epsilon = 1e-6);
}
