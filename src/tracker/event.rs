//! Per-event lifecycle state
//!
//! One `TrackedEvent` document exists per canonical event identifier and
//! records every CAP bulletin observed (or reconstructed) for that event.
//! The transition logic here is pure: the tracker performs I/O around it,
//! and the tests drive it directly with synthetic bulletins.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cap::Alert;
use crate::tracker::walker::MiniCap;
use crate::vtec::Action;

/// Whether an event still has uncovered area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventState {
    Active,
    Inactive,
}

/// One CAP bulletin's contribution to an event's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub received_at: DateTime<Utc>,
    pub vtec_action: Action,
    pub vtec_action_description: String,
    #[serde(default)]
    pub applies_to: Vec<String>,
    #[serde(rename = "capID")]
    pub cap_id: String,
}

impl HistoryEntry {
    pub fn new(
        received_at: DateTime<Utc>,
        action: Action,
        applies_to: Vec<String>,
        cap_id: String,
    ) -> Self {
        Self {
            received_at,
            vtec_action: action,
            vtec_action_description: action.long_state_name().to_string(),
            applies_to,
            cap_id,
        }
    }
}

/// The lifecycle document for one logical weather event.
///
/// `history` is kept sorted newest-first; `areas` is the deduplicated union
/// of every UGC any history entry applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEvent {
    pub identifier: String,
    #[serde(rename = "mostRecentCAP", default)]
    pub most_recent_cap: String,
    pub state: EventState,
    pub expires: DateTime<Utc>,
    pub most_recent_sent_time: DateTime<Utc>,
    pub last_updated_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgraded_to: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub areas: Vec<String>,
}

impl TrackedEvent {
    /// An empty document, ready to have history replayed into it.
    pub fn new(identifier: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.into(),
            most_recent_cap: String::new(),
            state: EventState::Active,
            expires: now,
            // Zero time: any real bulletin's sent time moves this forward.
            most_recent_sent_time: DateTime::<Utc>::MIN_UTC,
            last_updated_time: now,
            upgraded_to: None,
            history: Vec::new(),
            areas: Vec::new(),
        }
    }

    /// Build the document for a first-observation (`NEW`) bulletin.
    pub fn from_new_bulletin(
        identifier: impl Into<String>,
        alert: &Alert,
        action: Action,
        now: DateTime<Utc>,
    ) -> Self {
        let mut event = Self::new(identifier, now);
        event.apply_bulletin(alert, action, Vec::new(), now);
        event
    }

    /// Full transition for one observed bulletin: prepend its history
    /// entry, merge reconstructed history, then re-derive the ordering,
    /// area union, active state, and most-recent bookkeeping.
    pub fn apply_bulletin(
        &mut self,
        alert: &Alert,
        action: Action,
        walked: Vec<MiniCap>,
        now: DateTime<Utc>,
    ) {
        self.history.insert(
            0,
            HistoryEntry::new(now, action, alert.ugc_codes().to_vec(), alert.identifier.clone()),
        );
        self.merge_walked(walked);
        self.sort_history();
        self.recompute_areas();
        self.recompute_state(alert.ugc_codes());
        self.touch(alert, now);
    }

    /// Append history entries reconstructed by the reference walker. Each
    /// entry is dated by the upstream `sent` time of its bulletin.
    pub fn merge_walked(&mut self, walked: Vec<MiniCap>) {
        for mini in walked {
            let entry =
                HistoryEntry::new(mini.sent, mini.vtec.action, mini.areas, mini.cap_id);
            self.history.push(entry);
        }
    }

    /// Newest first, strictly descending by `received_at`.
    pub fn sort_history(&mut self) {
        self.history.sort_by(|a, b| b.received_at.cmp(&a.received_at));
    }

    /// `areas` = deduplicated union of every entry's `applies_to`.
    pub fn recompute_areas(&mut self) {
        let mut seen = HashSet::new();
        let mut areas = Vec::new();
        for entry in &self.history {
            for ugc in &entry.applies_to {
                if seen.insert(ugc.clone()) {
                    areas.push(ugc.clone());
                }
            }
        }
        self.areas = areas;
    }

    /// An event goes `Inactive` once every UGC named by the most recent
    /// bulletin has been covered by a terminal (UPG/CAN/EXP) entry. A
    /// bulletin with no UGC codes leaves the event `Active`: nothing is
    /// listed that terminal actions could have covered.
    pub fn recompute_state(&mut self, current_ugcs: &[String]) {
        if current_ugcs.is_empty() {
            self.state = EventState::Active;
            return;
        }
        let covered: HashSet<&str> = self
            .history
            .iter()
            .filter(|entry| entry.vtec_action.is_terminal())
            .flat_map(|entry| entry.applies_to.iter().map(String::as_str))
            .collect();
        let all_covered = current_ugcs.iter().all(|ugc| covered.contains(ugc.as_str()));
        self.state = if all_covered { EventState::Inactive } else { EventState::Active };
    }

    /// Most-recent bookkeeping. `most_recent_sent_time` only moves
    /// forward; a bulletin sent out of order updates everything else but
    /// does not regress it.
    pub fn touch(&mut self, alert: &Alert, now: DateTime<Utc>) {
        self.most_recent_cap = alert.identifier.clone();
        if alert.sent > self.most_recent_sent_time {
            self.most_recent_sent_time = alert.sent;
        }
        self.expires = alert.info.expires;
        self.last_updated_time = now;
    }

    /// Every CAP identifier currently present in history.
    pub fn history_cap_ids(&self) -> HashSet<String> {
        self.history.iter().map(|entry| entry.cap_id.clone()).collect()
    }
}
