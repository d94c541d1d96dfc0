//! Geometry engine
//!
//! Derives one multi-polygon per event from the UGC codes it covers: load
//! each subdivision's feature, union everything with robust polygon
//! clipping, then simplify with a Visvalingam area threshold so statewide
//! unions stay light enough to ship to browsers.

use geo::{BooleanOps, LineString, MultiPolygon, Polygon, SimplifyVw};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use thiserror::Error;
use tracing::{debug, warn};

use crate::geo::colors::color_for;
use crate::geo::store::{GeoStoreError, UgcFeature, UgcStore};

/// Visvalingam area threshold, in squared degrees.
pub const SIMPLIFY_TOLERANCE: f64 = 0.0005;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("no areas given")]
    NoAreas,
    #[error("no UGC features found")]
    NoFeatures,
    #[error("polygon union produced no geometry")]
    EmptyUnion,
    #[error("simplification produced no geometry")]
    EmptySimplification,
}

/// One event's derived geometry, ready to become a GeoJSON feature.
#[derive(Debug, Clone)]
pub struct EventGeometry {
    pub identifier: String,
    pub color: &'static str,
    pub geometry: MultiPolygon<f64>,
}

/// Compute the rendered geometry for one event.
pub fn compute_geometry(
    store: &UgcStore,
    areas: &[String],
    identifier: &str,
) -> Result<EventGeometry, GeometryError> {
    if areas.is_empty() {
        return Err(GeometryError::NoAreas);
    }

    let mut features = Vec::with_capacity(areas.len());
    for ugc in areas {
        match store.get(ugc) {
            Ok(record) => features.push(record.feature),
            Err(GeoStoreError::NotFound(_)) => {
                debug!(%ugc, event = identifier, "no stored geometry for UGC");
            }
            Err(err) => {
                warn!(%ugc, event = identifier, %err, "failed to load UGC geometry");
            }
        }
    }
    if features.is_empty() {
        return Err(GeometryError::NoFeatures);
    }

    let unioned = union_features(&features)?;
    let simplified = simplify(&unioned)?;

    Ok(EventGeometry {
        identifier: identifier.to_string(),
        color: color_for(identifier),
        geometry: simplified,
    })
}

/// Union a batch of stored features into one multi-polygon.
pub fn union_features(features: &[UgcFeature]) -> Result<MultiPolygon<f64>, GeometryError> {
    let mut union: Option<MultiPolygon<f64>> = None;
    for feature in features {
        let multi = to_multi_polygon(feature);
        if multi.0.is_empty() {
            continue;
        }
        union = Some(match union {
            None => multi,
            Some(acc) => acc.union(&multi),
        });
    }
    union.filter(|multi| !multi.0.is_empty()).ok_or(GeometryError::EmptyUnion)
}

/// Visvalingam simplification at the fixed tolerance.
pub fn simplify(multi: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    let simplified = multi.simplify_vw(&SIMPLIFY_TOLERANCE);
    if simplified.0.is_empty() {
        return Err(GeometryError::EmptySimplification);
    }
    Ok(simplified)
}

/// Normalize a stored feature to multi-polygon form. Degenerate rings
/// (fewer than three points) are dropped; open rings are closed by the
/// polygon constructor.
fn to_multi_polygon(feature: &UgcFeature) -> MultiPolygon<f64> {
    let rings: Vec<&Vec<[f64; 2]>> = match feature {
        UgcFeature::Polygon(ring) => vec![ring],
        UgcFeature::MultiPolygon(rings) => rings.iter().collect(),
    };
    let polygons: Vec<Polygon<f64>> = rings
        .into_iter()
        .filter(|ring| ring.len() >= 3)
        .map(|ring| {
            let exterior: LineString<f64> =
                ring.iter().map(|point| (point[0], point[1])).collect();
            Polygon::new(exterior, Vec::new())
        })
        .collect();
    MultiPolygon(polygons)
}

/// Assemble derived geometries into a GeoJSON feature collection tagged
/// with identifier and display color.
pub fn feature_collection(geometries: &[EventGeometry]) -> FeatureCollection {
    let features = geometries
        .iter()
        .map(|event| {
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), JsonValue::from(event.identifier.clone()));
            properties.insert("color".to_string(), JsonValue::from(event.color));
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&event.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    FeatureCollection { bbox: None, features, foreign_members: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::store::UgcRecord;
    use geo::Area;

    fn square(x0: f64, y0: f64) -> Vec<[f64; 2]> {
        // Deliberately open; the constructor closes it.
        vec![[x0, y0], [x0 + 1.0, y0], [x0 + 1.0, y0 + 1.0], [x0, y0 + 1.0]]
    }

    fn store_with(records: &[UgcRecord]) -> (tempfile::TempDir, UgcStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UgcStore::open(dir.path().join("county.db"), dir.path().join("zone.db"))
            .expect("open stores");
        for record in records {
            store.insert(record).expect("insert");
        }
        (dir, store)
    }

    fn record(ugc: &str, feature: UgcFeature) -> UgcRecord {
        UgcRecord {
            ugc: ugc.to_string(),
            lat: 0.0,
            lon: 0.0,
            name: String::new(),
            state: "KS".to_string(),
            feature,
        }
    }

    #[test]
    fn adjacent_squares_union_into_one_polygon() {
        let features = [
            UgcFeature::Polygon(square(0.0, 0.0)),
            UgcFeature::Polygon(square(1.0, 0.0)),
        ];
        let union = union_features(&features).expect("union");
        assert_eq!(union.0.len(), 1);
        assert!((union.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_squares_stay_separate() {
        let features = [
            UgcFeature::Polygon(square(0.0, 0.0)),
            UgcFeature::Polygon(square(5.0, 0.0)),
        ];
        let union = union_features(&features).expect("union");
        assert_eq!(union.0.len(), 2);
    }

    #[test]
    fn degenerate_rings_produce_empty_union() {
        let features = [UgcFeature::Polygon(vec![[0.0, 0.0], [1.0, 1.0]])];
        assert!(matches!(union_features(&features), Err(GeometryError::EmptyUnion)));
    }

    #[test]
    fn computes_geometry_with_color() {
        let (_dir, store) = store_with(&[
            record("KSC001", UgcFeature::Polygon(square(0.0, 0.0))),
            record("KSC003", UgcFeature::MultiPolygon(vec![square(1.0, 0.0)])),
        ]);
        let geometry = compute_geometry(
            &store,
            &["KSC001".to_string(), "KSC003".to_string()],
            "TOW-KTOP-12-2025",
        )
        .expect("geometry");
        assert_eq!(geometry.color, "#FF0000");
        assert_eq!(geometry.geometry.0.len(), 1);
        assert!((geometry.geometry.unsigned_area() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn missing_ugcs_are_skipped() {
        let (_dir, store) =
            store_with(&[record("KSC001", UgcFeature::Polygon(square(0.0, 0.0)))]);
        let geometry = compute_geometry(
            &store,
            &["KSC001".to_string(), "KSC999".to_string()],
            "SVW-KGLD-3-2025",
        )
        .expect("geometry");
        assert_eq!(geometry.geometry.0.len(), 1);
    }

    #[test]
    fn all_misses_surface_no_features() {
        let (_dir, store) = store_with(&[]);
        let result = compute_geometry(&store, &["KSC001".to_string()], "TOW-KTOP-12-2025");
        assert!(matches!(result, Err(GeometryError::NoFeatures)));
    }

    #[test]
    fn empty_input_surfaces_no_areas() {
        let (_dir, store) = store_with(&[]);
        let result = compute_geometry(&store, &[], "TOW-KTOP-12-2025");
        assert!(matches!(result, Err(GeometryError::NoAreas)));
    }

    #[test]
    fn feature_collection_carries_id_and_color() {
        let geometry = EventGeometry {
            identifier: "TOW-KTOP-12-2025".to_string(),
            color: "#FF0000",
            geometry: MultiPolygon(vec![Polygon::new(
                square(0.0, 0.0).iter().map(|p| (p[0], p[1])).collect::<LineString<f64>>(),
                Vec::new(),
            )]),
        };
        let collection = feature_collection(&[geometry]);
        assert_eq!(collection.features.len(), 1);
        let properties = collection.features[0].properties.as_ref().expect("properties");
        assert_eq!(properties["id"], "TOW-KTOP-12-2025");
        assert_eq!(properties["color"], "#FF0000");
    }
}
