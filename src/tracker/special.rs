//! Special alerts without a VTEC
//!
//! Products like special weather statements carry no VTEC, so their
//! identity is synthesized from the event code, the issuing office (taken
//! from the AWIPS identifier), and the sent timestamp. Their lifecycle is
//! simplified: first sight is recorded as "Issued", later sights append
//! "Updated" entries, the state stays `Active`, and areas accumulate.

use chrono::Utc;

use crate::cap::Alert;
use crate::store::{EventStore, StoreError};
use crate::tracker::event::{EventState, HistoryEntry, TrackedEvent};
use crate::tracker::locks::LockRegistry;
use crate::vtec::Action;

const UNKNOWN: &str = "UNK";

/// Synthesized identity:
/// `SPECIAL-{eventCode|UNK}-{officeFromAWIPS}-{sentYYYYMMDDThhmmss}`.
///
/// The AWIPS identifier is `{product}{office}` (e.g. `SPSTOP`); the office
/// is everything past the 3-character product code.
pub fn special_identifier(alert: &Alert) -> String {
    let event_code = match alert.info.event_code.nws.as_str() {
        "" => UNKNOWN,
        code => code,
    };
    let office = alert
        .info
        .parameters
        .as_ref()
        .and_then(|params| params.awips_identifier.get(3..))
        .filter(|office| !office.is_empty())
        .unwrap_or(UNKNOWN);
    format!("SPECIAL-{}-{}-{}", event_code, office, alert.sent.format("%Y%m%dT%H%M%S"))
}

/// Track one VTEC-less bulletin under its synthesized identity.
pub async fn track(
    store: &EventStore,
    locks: &LockRegistry,
    alert: &Alert,
) -> Result<String, StoreError> {
    let event_id = special_identifier(alert);
    let lock = locks.get(&event_id);
    let _guard = lock.lock().await;
    let now = Utc::now();

    let mut event = match store.get_event(&event_id).await? {
        Some(existing) => existing,
        None => TrackedEvent::new(&event_id, now),
    };

    let first_sight = event.history.is_empty();
    let (action, description) =
        if first_sight { (Action::New, "Issued") } else { (Action::Con, "Updated") };
    event.history.insert(
        0,
        HistoryEntry {
            received_at: now,
            vtec_action: action,
            vtec_action_description: description.to_string(),
            applies_to: alert.ugc_codes().to_vec(),
            cap_id: alert.identifier.clone(),
        },
    );
    event.sort_history();
    event.recompute_areas();
    event.state = EventState::Active;
    event.touch(alert, now);

    store.upsert_event(&event).await?;
    store.insert_alert_if_absent(alert).await?;
    Ok(event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::{Area, EventCode, Geocodes, Info, Parameters};
    use chrono::{Duration, TimeZone};

    fn special_alert(nws_code: &str, awips: &str) -> Alert {
        let sent = Utc.with_ymd_and_hms(2025, 4, 1, 19, 58, 30).single().expect("valid");
        Alert {
            identifier: "urn:oid:2.49.0.1.840.0.sps".to_string(),
            sender: "w-nws.webmaster@noaa.gov".to_string(),
            sent,
            status: "Actual".to_string(),
            msg_type: "Alert".to_string(),
            scope: "Public".to_string(),
            references: vec![],
            info: Info {
                language: "en-US".to_string(),
                event: "Special Weather Statement".to_string(),
                event_code: EventCode { same: String::new(), nws: nws_code.to_string() },
                severity: "Moderate".to_string(),
                urgency: "Expected".to_string(),
                certainty: "Observed".to_string(),
                effective: sent,
                onset: None,
                expires: sent + Duration::hours(2),
                headline: String::new(),
                description: String::new(),
                instruction: String::new(),
                parameters: Some(Parameters {
                    awips_identifier: awips.to_string(),
                    ..Parameters::default()
                }),
                area: Area {
                    description: String::new(),
                    polygon: None,
                    geocodes: Geocodes { ugc: vec!["KSZ024".to_string()], same: vec![] },
                },
            },
        }
    }

    #[test]
    fn identifier_combines_code_office_and_sent() {
        let alert = special_alert("SPS", "SPSTOP");
        assert_eq!(special_identifier(&alert), "SPECIAL-SPS-TOP-20250401T195830");
    }

    #[test]
    fn missing_pieces_fall_back_to_unk() {
        let alert = special_alert("", "");
        assert_eq!(special_identifier(&alert), "SPECIAL-UNK-UNK-20250401T195830");

        let mut alert = special_alert("SPS", "SPSTOP");
        alert.info.parameters = None;
        assert_eq!(special_identifier(&alert), "SPECIAL-SPS-UNK-20250401T195830");
    }
}
