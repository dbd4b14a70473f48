//! Skinning against the fixture skeleton
//!
//! The pyramid's `body` joint is turned a quarter around z and raised 10 units, `head`
//! sits 20 units up, and `origin` is the identity.

use glam::{DQuat, DVec3};
use md5model::md5::{
    bind_shape_vertex_position, compress_orientation, joint_groups, joint_membership,
    joint_transform, mesh_positions, reconstruct_w, Joint, JointTransformCache, Md5Mesh,
    Md5Record,
};
use rstest::{fixture, rstest};
use std::fs;

#[fixture]
fn pyramid() -> Md5Mesh {
    let source =
        fs::read_to_string("tests/fixtures/pyramid.md5mesh").expect("Failed to read fixture");
    Md5Mesh::parse(&source).expect("fixture to parse")
}

#[rstest]
#[case(0, DVec3::new(-1.0, -1.0, 0.0))]
#[case(1, DVec3::new(1.0, -1.0, 0.0))]
#[case(2, DVec3::new(0.0, 0.0, 10.0))]
#[case(3, DVec3::new(0.0, 1.0, 10.0))]
fn test_bind_pose_positions(pyramid: Md5Mesh, #[case] vert: usize, #[case] expected: DVec3) {
    let mesh = &pyramid.meshes[0];
    let position = bind_shape_vertex_position(&mesh.verts[vert], mesh, &pyramid.joints).unwrap();
    assert!(
        position.abs_diff_eq(expected, 1e-9),
        "vert {}: {:?}",
        vert,
        position
    );
}

#[rstest]
fn test_cached_positions_match(pyramid: Md5Mesh) {
    let mut cache = JointTransformCache::new(2);
    for mesh in &pyramid.meshes {
        let positions = mesh_positions(mesh, &pyramid.joints, &mut cache).unwrap();
        for (vert, cached) in mesh.verts.iter().zip(positions) {
            let direct = bind_shape_vertex_position(vert, mesh, &pyramid.joints).unwrap();
            assert!(cached.abs_diff_eq(direct, 1e-12));
        }
    }
    assert!(cache.len() <= 2);
    assert!(cache.hits() > 0);
}

#[rstest]
fn test_eye_sits_on_head(pyramid: Md5Mesh) {
    let mut cache = JointTransformCache::default();
    let eye = mesh_positions(&pyramid.meshes[1], &pyramid.joints, &mut cache).unwrap();
    assert_eq!(eye.len(), 3);
    assert!(eye[0].abs_diff_eq(DVec3::new(0.0, 0.0, 21.0), 1e-12));
    assert!(eye[1].abs_diff_eq(DVec3::new(1.0, 0.0, 21.0), 1e-12));
}

#[rstest]
fn test_membership_and_groups(pyramid: Md5Mesh) {
    let mesh = &pyramid.meshes[0];
    assert!(joint_membership(&mesh.verts[2], mesh, 1));
    assert!(joint_membership(&mesh.verts[2], mesh, 2));
    assert!(!joint_membership(&mesh.verts[2], mesh, 0));

    let groups = joint_groups(mesh, &pyramid.joints);
    let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, vec!["origin", "body", "head"]);
    let body: Vec<usize> = groups[1].members.iter().map(|m| m.vert).collect();
    assert_eq!(body, vec![2, 3]);

    let eye_groups = joint_groups(&pyramid.meshes[1], &pyramid.joints);
    assert_eq!(eye_groups.len(), 1);
    assert_eq!(eye_groups[0].members.len(), 3);
}

#[test]
fn test_reconstruct_w_scenario() {
    assert!((reconstruct_w(0.0, 0.0, -0.7071067812) + 0.7071067812).abs() < 1e-9);
    assert_eq!(reconstruct_w(0.8, 0.8, 0.0), 0.0);
}

#[test]
fn test_rest_transform_round_trip() {
    let rotation = DQuat::from_euler(glam::EulerRot::XYZ, 0.3, -1.1, 2.0);
    let translation = DVec3::new(4.0, -2.0, 7.5);
    let joint = Joint::from_rest_transform("wrist", 3, translation, rotation, " forearm");

    let matrix = joint_transform(&joint.position, &joint.orientation);
    let expected = glam::DMat4::from_rotation_translation(rotation, translation);
    assert!(matrix.abs_diff_eq(expected, 1e-9));
    assert_eq!(
        Joint::parse(&joint.serialize()).unwrap().parent_index,
        3
    );
}

#[test]
fn test_compress_orientation_prefers_positive_w() {
    let rotation = DQuat::from_rotation_x(1.0);
    assert_eq!(compress_orientation(rotation), compress_orientation(-rotation));
}
