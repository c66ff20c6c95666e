//! Tests for geographic primitives

use super::*;

#[test]
fn test_sector_new_valid() {
    let sector = Sector::new(10.0, 20.0, -30.0, -10.0).unwrap();
    assert_eq!(sector.delta_lat(), 10.0);
    assert_eq!(sector.delta_lon(), 20.0);
    assert_eq!(sector.centroid(), LatLon::new(15.0, -20.0));
}

#[test]
fn test_sector_rejects_inverted_axis() {
    let result = Sector::new(20.0, 10.0, 0.0, 1.0);
    assert!(matches!(
        result,
        Err(GeoError::InvertedSector {
            axis: "latitude",
            ..
        })
    ));

    let result = Sector::new(0.0, 1.0, 5.0, 4.0);
    assert!(matches!(
        result,
        Err(GeoError::InvertedSector {
            axis: "longitude",
            ..
        })
    ));
}

#[test]
fn test_sector_rejects_out_of_range() {
    assert_eq!(
        Sector::new(-91.0, 0.0, 0.0, 1.0),
        Err(GeoError::InvalidLatitude(-91.0))
    );
    assert_eq!(
        Sector::new(0.0, 1.0, 0.0, 181.0),
        Err(GeoError::InvalidLongitude(181.0))
    );
}

#[test]
fn test_empty_sector_constant() {
    assert!(Sector::EMPTY.is_empty());
    assert!(!Sector::FULL_SPHERE.is_empty());
    assert_eq!(Sector::FULL_SPHERE.delta_lon(), 360.0);
}

#[test]
fn test_contains_is_edge_inclusive() {
    let sector = Sector::new(0.0, 10.0, 0.0, 10.0).unwrap();
    assert!(sector.contains(0.0, 0.0));
    assert!(sector.contains(10.0, 10.0));
    assert!(!sector.contains(10.0001, 5.0));
}

#[test]
fn test_intersection() {
    let a = Sector::new(0.0, 10.0, 0.0, 10.0).unwrap();
    let b = Sector::new(5.0, 15.0, -5.0, 5.0).unwrap();

    let overlap = a.intersection(&b).unwrap();
    assert_eq!(overlap, Sector::new(5.0, 10.0, 0.0, 5.0).unwrap());

    let far = Sector::new(20.0, 30.0, 20.0, 30.0).unwrap();
    assert!(a.intersection(&far).is_none());
    assert!(!a.intersects(&far));
}

#[test]
fn test_union_and_bounding() {
    let a = Sector::new(0.0, 1.0, 0.0, 1.0).unwrap();
    let b = Sector::new(2.0, 3.0, -1.0, 0.5).unwrap();
    assert_eq!(a.union(&b), Sector::new(0.0, 3.0, -1.0, 1.0).unwrap());

    let points = [LatLon::new(1.0, 2.0), LatLon::new(-1.0, 5.0)];
    let bounds = Sector::bounding(&points).unwrap();
    assert_eq!(bounds, Sector::new(-1.0, 1.0, 2.0, 5.0).unwrap());
    assert!(Sector::bounding(&[]).is_none());
}

#[test]
fn test_sector_hash_matches_equality() {
    use std::collections::HashSet;

    let mut set = HashSet::new();
    set.insert(Sector::new(0.0, 1.0, 0.0, 1.0).unwrap());
    assert!(set.contains(&Sector::new(0.0, 1.0, 0.0, 1.0).unwrap()));
}

#[test]
fn test_normalize_longitude() {
    assert_eq!(normalize_longitude(190.0), -170.0);
    assert_eq!(normalize_longitude(-190.0), 170.0);
    assert_eq!(normalize_longitude(45.0), 45.0);
    assert_eq!(normalize_longitude(540.0), 180.0);
}
