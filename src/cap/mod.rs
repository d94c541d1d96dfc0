//! CAP (Common Alerting Protocol) bulletin model
//!
//! The structured form of one NWS bulletin. The XML→struct conversion is a
//! collaborator concern: bulletins arrive on the `tracking` queue already
//! converted and msgpack-encoded, and the same struct round-trips through
//! BSON into the `alerts` collection. Field naming therefore follows the
//! upstream camelCase wire form exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One CAP bulletin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub identifier: String,
    pub sender: String,
    pub sent: DateTime<Utc>,
    pub status: String,
    pub msg_type: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    pub info: Info,
}

/// A sender/identifier/sent triple pointing at an earlier bulletin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub sender: String,
    pub identifier: String,
    pub sent: DateTime<Utc>,
}

/// The single `info` block of a bulletin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub event_code: EventCode,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub urgency: String,
    #[serde(default)]
    pub certainty: String,
    pub effective: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset: Option<DateTime<Utc>>,
    pub expires: DateTime<Utc>,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    pub area: Area,
}

/// SAME and NWS forms of the event code (e.g. `TOR` / `TOW`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct EventCode {
    #[serde(default)]
    pub same: String,
    #[serde(default)]
    pub nws: String,
}

/// `info.parameters`: only the fields the tracker consumes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default, rename = "AWIPSidentifier")]
    pub awips_identifier: String,
    #[serde(default, rename = "WMOidentifier")]
    pub wmo_identifier: String,
    #[serde(default, rename = "NWSheadline")]
    pub nws_headline: String,
    #[serde(default, rename = "VTEC")]
    pub vtec: String,
    /// Raw expired-reference strings: whitespace-separated
    /// `sender,identifier,sent` comma-triples. Absent means empty.
    #[serde(default, rename = "expiredReferences")]
    pub expired_references: Vec<String>,
}

/// `info.area`: human description plus geocoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    #[serde(default)]
    pub description: String,
    /// Present when the bulletin ships its own polygon; such events are not
    /// re-derived from UGC geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<AreaPolygon>,
    #[serde(default)]
    pub geocodes: Geocodes,
}

/// A GeoJSON-shaped polygon embedded in a bulletin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaPolygon {
    /// Always `Polygon`.
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct Geocodes {
    #[serde(default)]
    pub ugc: Vec<String>,
    #[serde(default)]
    pub same: Vec<String>,
}

impl Alert {
    /// UGC codes this bulletin applies to.
    pub fn ugc_codes(&self) -> &[String] {
        &self.info.area.geocodes.ugc
    }

    /// Identifiers of every bulletin referenced by this one, current and
    /// expired alike.
    pub fn referenced_identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> =
            self.references.iter().map(|r| r.identifier.clone()).collect();
        if let Some(params) = &self.info.parameters {
            ids.extend(parse_reference_triples(&params.expired_references));
        }
        ids
    }

    /// Shortened identifier for log lines, derived from the WMO heading
    /// (`TTAAii CCCC YYGGgg`). Falls back to the full CAP identifier when
    /// the heading is missing or has fewer than three tokens.
    pub fn short_id(&self) -> String {
        if let Some(params) = &self.info.parameters {
            let tokens: Vec<&str> = params.wmo_identifier.split_whitespace().collect();
            if tokens.len() >= 3 {
                return format!("{} {}", tokens[1], tokens[2]);
            }
        }
        self.identifier.clone()
    }
}

/// Extract bulletin identifiers from raw expired-reference strings.
///
/// Each string holds whitespace-separated `sender,identifier,sent` triples;
/// tokens without three comma-separated parts are skipped.
pub fn parse_reference_triples(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|entry| entry.split_whitespace())
        .filter_map(|triple| {
            let mut parts = triple.split(',');
            let _sender = parts.next()?;
            let identifier = parts.next()?;
            let _sent = parts.next()?;
            Some(identifier.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_alert() -> Alert {
        Alert {
            identifier: "urn:oid:2.49.0.1.840.0.123".to_string(),
            sender: "w-nws.webmaster@noaa.gov".to_string(),
            sent: Utc.with_ymd_and_hms(2025, 4, 1, 19, 58, 0).single().expect("valid"),
            status: "Actual".to_string(),
            msg_type: "Alert".to_string(),
            scope: "Public".to_string(),
            references: vec![],
            info: Info {
                language: "en-US".to_string(),
                event: "Tornado Warning".to_string(),
                event_code: EventCode { same: "TOR".to_string(), nws: "TOW".to_string() },
                severity: "Extreme".to_string(),
                urgency: "Immediate".to_string(),
                certainty: "Observed".to_string(),
                effective: Utc.with_ymd_and_hms(2025, 4, 1, 19, 58, 0).single().expect("valid"),
                onset: None,
                expires: Utc.with_ymd_and_hms(2025, 4, 1, 21, 0, 0).single().expect("valid"),
                headline: String::new(),
                description: String::new(),
                instruction: String::new(),
                parameters: Some(Parameters {
                    awips_identifier: "TORTOP".to_string(),
                    wmo_identifier: "WFUS53 KTOP 011958".to_string(),
                    vtec: "/O.NEW.KTOP.TO.W.0012.250401T2000Z-250401T2100Z/".to_string(),
                    ..Parameters::default()
                }),
                area: Area {
                    description: "Shawnee; Jackson".to_string(),
                    polygon: None,
                    geocodes: Geocodes {
                        ugc: vec!["KSC001".to_string(), "KSC003".to_string()],
                        same: vec!["020001".to_string()],
                    },
                },
            },
        }
    }

    #[test]
    fn msgpack_round_trip() {
        let alert = sample_alert();
        let bytes = rmp_serde::to_vec_named(&alert).expect("encode");
        let decoded: Alert = rmp_serde::from_slice(&bytes).expect("decode");
        assert_eq!(alert, decoded);
    }

    #[test]
    fn short_id_uses_wmo_heading() {
        let alert = sample_alert();
        assert_eq!(alert.short_id(), "KTOP 011958");
    }

    #[test]
    fn short_id_falls_back_to_identifier() {
        let mut alert = sample_alert();
        if let Some(params) = alert.info.parameters.as_mut() {
            params.wmo_identifier = "WFUS53".to_string();
        }
        assert_eq!(alert.short_id(), alert.identifier);
    }

    #[test]
    fn parses_reference_triples() {
        let raw = vec![
            "w-nws@noaa.gov,urn:oid:2.49.0.1.840.0.aaa,2025-04-01T19:00:00-00:00 \
             w-nws@noaa.gov,urn:oid:2.49.0.1.840.0.bbb,2025-04-01T18:00:00-00:00"
                .to_string(),
            "w-nws@noaa.gov,urn:oid:2.49.0.1.840.0.ccc,2025-04-01T17:00:00-00:00".to_string(),
        ];
        assert_eq!(
            parse_reference_triples(&raw),
            vec![
                "urn:oid:2.49.0.1.840.0.aaa",
                "urn:oid:2.49.0.1.840.0.bbb",
                "urn:oid:2.49.0.1.840.0.ccc",
            ]
        );
    }

    #[test]
    fn malformed_triples_are_skipped() {
        let raw = vec!["nonsense not,enough".to_string()];
        assert!(parse_reference_triples(&raw).is_empty());
    }

    #[test]
    fn json_decodes_with_missing_optionals() {
        let json = serde_json::json!({
            "identifier": "urn:oid:x",
            "sender": "nws",
            "sent": "2025-04-01T19:58:00Z",
            "status": "Actual",
            "msgType": "Alert",
            "info": {
                "effective": "2025-04-01T19:58:00Z",
                "expires": "2025-04-01T21:00:00Z",
                "area": { "description": "Somewhere" }
            }
        });
        let alert: Alert = serde_json::from_value(json).expect("decode");
        assert!(alert.info.parameters.is_none());
        assert!(alert.ugc_codes().is_empty());
        assert!(alert.referenced_identifiers().is_empty());
    }
}
