//! Geometry → topology pipeline tests
//!
//! Drives the geo side end to end without an event store: UGC features in
//! a temporary sled datastore, per-event union + simplification, GeoJSON
//! assembly, shared-arc encoding, and the msgpack payload, including the
//! byte-identical-output property the change-detection cache relies on.

use siren::geo::engine::{compute_geometry, feature_collection};
use siren::geo::topology::Topology;
use siren::geo::{UgcFeature, UgcRecord, UgcStore};

fn square(x0: f64, y0: f64) -> Vec<[f64; 2]> {
    vec![[x0, y0], [x0 + 1.0, y0], [x0 + 1.0, y0 + 1.0], [x0, y0 + 1.0]]
}

fn record(ugc: &str, name: &str, feature: UgcFeature) -> UgcRecord {
    UgcRecord {
        ugc: ugc.to_string(),
        lat: 39.0,
        lon: -95.7,
        name: name.to_string(),
        state: "KS".to_string(),
        feature,
    }
}

fn seeded_store() -> (tempfile::TempDir, UgcStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = UgcStore::open(dir.path().join("county.db"), dir.path().join("zone.db"))
        .expect("open stores");
    store
        .insert(&record("KSC001", "Shawnee", UgcFeature::Polygon(square(0.0, 0.0))))
        .expect("insert county");
    store
        .insert(&record(
            "KSC003",
            "Jackson",
            UgcFeature::MultiPolygon(vec![square(1.0, 0.0)]),
        ))
        .expect("insert county");
    store
        .insert(&record("KSZ024", "South Central", UgcFeature::Polygon(square(5.0, 5.0))))
        .expect("insert zone");
    (dir, store)
}

#[test]
fn county_and_zone_features_flow_into_one_payload() {
    let (_dir, store) = seeded_store();

    let tornado = compute_geometry(
        &store,
        &["KSC001".to_string(), "KSC003".to_string()],
        "TOW-KTOP-12-2025",
    )
    .expect("tornado geometry");
    // Adjacent counties dissolve into one polygon.
    assert_eq!(tornado.geometry.0.len(), 1);

    let winter = compute_geometry(&store, &["KSZ024".to_string()], "WSW-KTOP-7-2025")
        .expect("winter geometry");

    let collection = feature_collection(&[tornado, winter]);
    assert_eq!(collection.features.len(), 2);

    let topology = Topology::from_features(&collection);
    assert_eq!(topology.objects.alerts.geometries.len(), 2);
    assert_eq!(topology.objects.alerts.geometries[0].properties.color, "#FF0000");
    assert_eq!(topology.objects.alerts.geometries[1].properties.color, "#FF69B4");

    let payload = topology.to_msgpack().expect("payload");
    assert!(!payload.is_empty());
}

#[test]
fn unchanged_inputs_produce_identical_payload_bytes() {
    let (_dir, store) = seeded_store();
    let build = || {
        let geometry = compute_geometry(
            &store,
            &["KSC001".to_string(), "KSC003".to_string()],
            "TOW-KTOP-12-2025",
        )
        .expect("geometry");
        Topology::from_features(&feature_collection(&[geometry]))
            .to_msgpack()
            .expect("payload")
    };
    assert_eq!(build(), build());
}

#[test]
fn unknown_areas_degrade_gracefully() {
    let (_dir, store) = seeded_store();
    let geometry = compute_geometry(
        &store,
        &["KSC001".to_string(), "NEC999".to_string()],
        "SVW-KGLD-3-2025",
    )
    .expect("geometry despite a miss");
    assert_eq!(geometry.geometry.0.len(), 1);
}
