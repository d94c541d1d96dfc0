//! Reference walker
//!
//! A CAP bulletin that continues or modifies an event lists the bulletins
//! it supersedes. When the tracker has never seen those (service restart,
//! dropped message), it reconstructs the missing history by walking the
//! reference chain through the upstream alerts API, depth-first, keeping
//! only bulletins whose VTEC resolves to the same canonical event.
//!
//! The walk never fails: any fetch or parse problem on a branch abandons
//! that branch and moves on to its siblings. The shared visited set makes
//! the traversal terminate even on cyclic reference graphs and avoids
//! re-fetching bulletins reachable through multiple branches.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::cap::parse_reference_triples;
use crate::nws::AlertFetcher;
use crate::vtec::Vtec;

/// The slice of an upstream bulletin the tracker needs to replay history.
#[derive(Debug, Clone)]
pub struct MiniCap {
    pub cap_id: String,
    pub vtec: Vtec,
    pub areas: Vec<String>,
    pub references: Vec<String>,
    pub expired_references: Vec<String>,
    pub sent: DateTime<Utc>,
}

/// Walk `references` (and, transitively, everything they reference) and
/// return every bulletin belonging to `target_event_id` that has not been
/// visited yet.
///
/// `visited` is shared across the whole walk; callers seed it with the CAP
/// identifiers already present in the event's history. Ordering of the
/// result is unspecified; callers sort explicitly.
pub async fn walk(
    fetcher: &dyn AlertFetcher,
    references: &[String],
    target_event_id: &str,
    visited: &mut HashSet<String>,
) -> Vec<MiniCap> {
    let mut found = Vec::new();
    walk_branch(fetcher, references.to_vec(), target_event_id, visited, &mut found).await;
    found
}

/// Recursion through an async fn needs a boxed future.
fn walk_branch<'a>(
    fetcher: &'a dyn AlertFetcher,
    references: Vec<String>,
    target_event_id: &'a str,
    visited: &'a mut HashSet<String>,
    found: &'a mut Vec<MiniCap>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        for cap_id in references {
            if !visited.insert(cap_id.clone()) {
                continue;
            }

            let props = match fetcher.fetch_alert(&cap_id).await {
                Ok(props) => props,
                Err(err) => {
                    debug!(%cap_id, %err, "reference fetch failed, abandoning branch");
                    continue;
                }
            };

            let Some(vtec_str) = props.parameters.vtec.first() else {
                debug!(%cap_id, "referenced bulletin carries no VTEC, abandoning branch");
                continue;
            };
            let vtec = match Vtec::parse(vtec_str) {
                Ok(vtec) => vtec,
                Err(err) => {
                    debug!(%cap_id, %err, "referenced VTEC unparseable, abandoning branch");
                    continue;
                }
            };

            if vtec.canonical_event_id() != target_event_id {
                debug!(
                    %cap_id,
                    found = %vtec.canonical_event_id(),
                    want = target_event_id,
                    "reference belongs to a different event"
                );
                continue;
            }

            let references: Vec<String> =
                props.references.iter().map(|r| r.identifier.clone()).collect();
            let expired_references = parse_reference_triples(&props.parameters.expired_references);

            let mut next = references.clone();
            next.extend(expired_references.iter().cloned());

            found.push(MiniCap {
                cap_id: props.id.clone(),
                vtec,
                areas: props.geocode.ugc.clone(),
                references,
                expired_references,
                sent: props.sent,
            });

            walk_branch(fetcher, next, target_event_id, visited, found).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nws::{AlertProperties, ApiParameters, ApiReference, FetchError, Geocode};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;

    /// Canned upstream: a map of CAP id → properties.
    struct StubFetcher {
        alerts: HashMap<String, AlertProperties>,
    }

    #[async_trait]
    impl AlertFetcher for StubFetcher {
        async fn fetch_alert(&self, cap_id: &str) -> Result<AlertProperties, FetchError> {
            self.alerts.get(cap_id).cloned().ok_or_else(|| {
                FetchError::Status(reqwest::StatusCode::NOT_FOUND, cap_id.to_string())
            })
        }
    }

    fn props(
        id: &str,
        vtec: &str,
        ugcs: &[&str],
        refs: &[&str],
        expired: &[&str],
        minute: u32,
    ) -> AlertProperties {
        AlertProperties {
            id: id.to_string(),
            geocode: Geocode {
                same: vec![],
                ugc: ugcs.iter().map(ToString::to_string).collect(),
            },
            parameters: ApiParameters {
                vtec: if vtec.is_empty() { vec![] } else { vec![vtec.to_string()] },
                expired_references: expired
                    .iter()
                    .map(|id| format!("w-nws@noaa.gov,{id},2025-04-01T19:00:00-00:00"))
                    .collect(),
            },
            sent: Utc
                .with_ymd_and_hms(2025, 4, 1, 19, minute, 0)
                .single()
                .expect("valid time"),
            expires: None,
            effective: None,
            references: refs
                .iter()
                .map(|id| ApiReference {
                    sender: "nws".to_string(),
                    identifier: (*id).to_string(),
                    sent: None,
                })
                .collect(),
        }
    }

    const EVENT: &str = "TOW-KTOP-12-2025";
    const VTEC_NEW: &str = "/O.NEW.KTOP.TO.W.0012.250401T2000Z-250401T2100Z/";
    const VTEC_CON: &str = "/O.CON.KTOP.TO.W.0012.250401T2000Z-250401T2100Z/";
    const VTEC_OTHER: &str = "/O.NEW.KGLD.SV.W.0003.250401T2000Z-250401T2100Z/";

    fn fetcher(entries: Vec<AlertProperties>) -> StubFetcher {
        StubFetcher {
            alerts: entries.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    #[tokio::test]
    async fn reconstructs_chain_through_references() {
        let stub = fetcher(vec![
            props("cap-con", VTEC_CON, &["KSC001"], &["cap-new"], &[], 30),
            props("cap-new", VTEC_NEW, &["KSC001", "KSC003"], &[], &[], 0),
        ]);
        let mut visited = HashSet::new();
        let found = walk(&stub, &["cap-con".to_string()], EVENT, &mut visited).await;

        let ids: Vec<&str> = found.iter().map(|m| m.cap_id.as_str()).collect();
        assert_eq!(ids, vec!["cap-con", "cap-new"]);
        assert!(visited.contains("cap-con") && visited.contains("cap-new"));
    }

    #[tokio::test]
    async fn follows_expired_references() {
        let stub = fetcher(vec![
            props("cap-con", VTEC_CON, &["KSC001"], &[], &["cap-old"], 30),
            props("cap-old", VTEC_NEW, &["KSC001"], &[], &[], 0),
        ]);
        let mut visited = HashSet::new();
        let found = walk(&stub, &["cap-con".to_string()], EVENT, &mut visited).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].expired_references, vec!["cap-old"]);
    }

    #[tokio::test]
    async fn terminates_on_cycles() {
        let stub = fetcher(vec![
            props("cap-a", VTEC_CON, &["KSC001"], &["cap-b"], &[], 30),
            props("cap-b", VTEC_CON, &["KSC001"], &["cap-a"], &[], 20),
        ]);
        let mut visited = HashSet::new();
        let found = walk(&stub, &["cap-a".to_string()], EVENT, &mut visited).await;
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn filters_foreign_events() {
        let stub = fetcher(vec![
            props("cap-con", VTEC_CON, &["KSC001"], &["cap-other"], &[], 30),
            // Belongs to a different canonical event; its subtree is pruned.
            props("cap-other", VTEC_OTHER, &["KSC099"], &["cap-new"], &[], 10),
            props("cap-new", VTEC_NEW, &["KSC001"], &[], &[], 0),
        ]);
        let mut visited = HashSet::new();
        let found = walk(&stub, &["cap-con".to_string()], EVENT, &mut visited).await;
        let ids: Vec<&str> = found.iter().map(|m| m.cap_id.as_str()).collect();
        assert_eq!(ids, vec!["cap-con"]);
    }

    #[tokio::test]
    async fn missing_and_vtecless_branches_abort_silently() {
        let stub = fetcher(vec![
            props("cap-con", VTEC_CON, &["KSC001"], &["cap-gone", "cap-mute", "cap-new"], &[], 30),
            props("cap-mute", "", &["KSC001"], &["cap-unreachable"], &[], 10),
            props("cap-new", VTEC_NEW, &["KSC001"], &[], &[], 0),
        ]);
        let mut visited = HashSet::new();
        let found = walk(&stub, &["cap-con".to_string()], EVENT, &mut visited).await;
        let ids: Vec<&str> = found.iter().map(|m| m.cap_id.as_str()).collect();
        assert_eq!(ids, vec!["cap-con", "cap-new"]);
    }

    #[tokio::test]
    async fn visited_entries_are_not_refetched() {
        let stub = fetcher(vec![
            props("cap-con", VTEC_CON, &["KSC001"], &["cap-new"], &[], 30),
            props("cap-new", VTEC_NEW, &["KSC001"], &[], &[], 0),
        ]);
        let mut visited = HashSet::from(["cap-new".to_string()]);
        let found = walk(&stub, &["cap-con".to_string()], EVENT, &mut visited).await;
        let ids: Vec<&str> = found.iter().map(|m| m.cap_id.as_str()).collect();
        assert_eq!(ids, vec!["cap-con"]);
    }
}
