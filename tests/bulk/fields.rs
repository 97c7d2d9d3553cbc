//! Field data seen through the mesh

use stratamesh_foundation::{EntityRank, FieldOrdinal};

use crate::common::{Fixture, element, fixture, nodes};

fn second_state(f: &Fixture) -> FieldOrdinal {
    f.mesh
        .meta_data()
        .field(f.temperature)
        .and_then(|field| field.state_ordinal(1))
        .unwrap()
}

#[test]
fn fields_exist_where_restricted() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, 1..=4);
    let inside = element(&mut f.mesh, 1, &[f.block], &n);
    let outside = element(&mut f.mesh, 2, &[], &n);

    let old = second_state(&f);
    assert_eq!(f.mesh.field_data::<f64>(f.temperature, n[0]), Some(&[300.0][..]));
    assert_eq!(f.mesh.field_data::<f64>(old, n[0]), Some(&[300.0][..]));
    assert_eq!(f.mesh.field_data::<f64>(f.pressure, inside), Some(&[0.0][..]));

    assert_eq!(f.mesh.field_data::<f64>(f.pressure, outside), None);
    assert_eq!(f.mesh.field_bytes_per_entity(f.pressure, outside), 0);
    assert_eq!(f.mesh.field_bytes_per_entity(f.pressure, inside), 8);
    assert_eq!(f.mesh.field_data::<f64>(f.pressure, n[0]), None);
    assert_eq!(f.mesh.field_data::<f32>(f.temperature, n[0]), None);
}

#[test]
fn values_follow_part_changes() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, 1..=4);
    let elem = element(&mut f.mesh, 1, &[f.block], &n);
    f.mesh.field_data_mut::<f64>(f.pressure, elem).unwrap()[0] = 7.5;
    f.mesh.field_data_mut::<f64>(f.temperature, n[0]).unwrap()[0] = 412.0;

    f.mesh.change_entity_parts(elem, &[f.boundary], &[]).unwrap();
    assert_eq!(f.mesh.field_data::<f64>(f.pressure, elem), Some(&[7.5][..]));

    // Node 1 moves bucket when it gains the boundary part.
    f.mesh.change_entity_parts(n[0], &[f.boundary], &[]).unwrap();
    assert_eq!(f.mesh.field_data::<f64>(f.temperature, n[0]), Some(&[412.0][..]));

    f.mesh.change_entity_parts(elem, &[], &[f.block]).unwrap();
    assert_eq!(f.mesh.field_data::<f64>(f.pressure, elem), None);
    f.mesh.change_entity_parts(elem, &[f.block], &[]).unwrap();
    assert_eq!(f.mesh.field_data::<f64>(f.pressure, elem), Some(&[0.0][..]));
}

#[test]
fn recycled_entities_start_from_initial_values() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, [1, 2]);
    for &node in &n {
        f.mesh.field_data_mut::<f64>(f.temperature, node).unwrap()[0] = 500.0;
    }
    f.mesh.destroy_entity(n[0]).unwrap();
    assert_eq!(f.mesh.field_data::<f64>(f.temperature, n[1]), Some(&[500.0][..]));
    f.mesh.modification_end().unwrap();

    f.mesh.modification_begin().unwrap();
    let fresh = nodes(&mut f.mesh, [3])[0];
    assert_eq!(fresh, n[0]);
    assert_eq!(f.mesh.field_data::<f64>(f.temperature, fresh), Some(&[300.0][..]));
}

#[test]
fn bucket_values_are_in_bucket_order() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let n = nodes(&mut f.mesh, 1..=3);
    for (value, &node) in n.iter().enumerate() {
        f.mesh.field_data_mut::<f64>(f.temperature, node).unwrap()[0] = value as f64;
    }

    let bucket = f.mesh.bucket(n[0]).unwrap();
    assert_eq!(bucket.size(), 3);
    assert_eq!(
        f.mesh.bucket_field_data::<f64>(f.temperature, bucket),
        Some(&[0.0, 1.0, 2.0][..])
    );
    assert_eq!(f.mesh.bucket_field_data::<f64>(f.pressure, bucket), None);
}

#[test]
fn state_rotation_swaps_two_states() {
    let mut f = fixture();
    f.mesh.modification_begin().unwrap();
    let node = nodes(&mut f.mesh, [1])[0];
    let old = second_state(&f);
    f.mesh.field_data_mut::<f64>(f.temperature, node).unwrap()[0] = 1.0;
    f.mesh.field_data_mut::<f64>(old, node).unwrap()[0] = 2.0;

    f.mesh.update_field_data_states();
    assert_eq!(f.mesh.field_data::<f64>(f.temperature, node), Some(&[2.0][..]));
    assert_eq!(f.mesh.field_data::<f64>(old, node), Some(&[1.0][..]));

    f.mesh.update_field_data_states_of(f.temperature).unwrap();
    assert_eq!(f.mesh.field_data::<f64>(f.temperature, node), Some(&[1.0][..]));

    // Single-state fields are left alone.
    f.mesh.update_field_data_states_of(f.pressure).unwrap();
}

#[test]
fn footprints_track_allocated_buckets() {
    let mut f = fixture();
    assert_eq!(f.mesh.total_field_data_footprint(EntityRank::NODE), 0);

    f.mesh.modification_begin().unwrap();
    nodes(&mut f.mesh, 1..=2);
    let old = second_state(&f);
    let temperature = f.mesh.field_data_footprint(f.temperature);
    assert!(temperature > 0);
    assert_eq!(f.mesh.field_data_footprint(old), temperature);
    assert_eq!(f.mesh.field_data_footprint(f.pressure), 0);
    assert_eq!(
        f.mesh.total_field_data_footprint(EntityRank::NODE),
        2 * temperature
    );
}
