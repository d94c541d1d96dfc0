//! P-VTEC (Valid Time Event Code) parsing
//!
//! Every NWS warning product embeds a VTEC string such as
//! `/O.NEW.KTOP.TO.W.0012.250401T2000Z-250401T2100Z/` identifying the
//! issuing office, phenomena, significance, tracking number, action and
//! valid time window. All lifecycle tracking keys off these fields, so the
//! grammar here is bit-exact and the parser rejects anything it does not
//! fully understand.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The canonical VTEC grammar. Exported so other components (e.g. free-text
/// bulletin scanners) can reuse it without re-deriving the field layout.
pub const VTEC_PATTERN: &str = r"^/?([OTEX])\.(NEW|CON|EXT|EXA|EXB|UPG|CAN|EXP|COR|ROU)\.([A-Z0-9]{4})\.([A-Z]{2})\.([A-Z])\.(\d{4})\.(\d{6}T\d{4}Z)-(\d{6}T\d{4}Z)/?$";

/// VTEC date layout, e.g. `250401T2000Z`.
const TIME_LAYOUT: &str = "%y%m%dT%H%MZ";

/// Sentinel meaning "time unset" in either position of the window.
const UNSET_TIME: &str = "000000T0000Z";

fn vtec_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The pattern is a compile-time constant, so construction cannot fail.
    RE.get_or_init(|| Regex::new(VTEC_PATTERN).unwrap_or_else(|e| panic!("VTEC_PATTERN: {e}")))
}

/// VTEC parse failures, one variant per field that can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VtecError {
    #[error("invalid VTEC string format: {0}")]
    Format(String),
    #[error("invalid product class: {0}")]
    ProductClass(String),
    #[error("invalid action code: {0}")]
    Action(String),
    #[error("invalid event tracking number: {0}")]
    TrackingNumber(String),
    #[error("invalid start date/time: {0}")]
    StartTime(String),
    #[error("invalid end date/time: {0}")]
    EndTime(String),
}

/// VTEC product class ("k" field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductClass {
    /// `O`, operational product
    Operational,
    /// `T`, test product
    Test,
    /// `E`, experimental product
    Experimental,
    /// `X`, experimental product in operations
    ExperimentalInOperation,
}

impl ProductClass {
    pub const fn code(self) -> char {
        match self {
            Self::Operational => 'O',
            Self::Test => 'T',
            Self::Experimental => 'E',
            Self::ExperimentalInOperation => 'X',
        }
    }
}

impl FromStr for ProductClass {
    type Err = VtecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "O" => Ok(Self::Operational),
            "T" => Ok(Self::Test),
            "E" => Ok(Self::Experimental),
            "X" => Ok(Self::ExperimentalInOperation),
            other => Err(VtecError::ProductClass(other.to_string())),
        }
    }
}

/// VTEC action code ("aaa" field). Serialized by code so stored history
/// entries read naturally (`"CAN"`, `"EXP"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    New,
    Con,
    Ext,
    Exa,
    Exb,
    Upg,
    Can,
    Exp,
    Cor,
    Rou,
}

impl Action {
    pub const fn code(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Con => "CON",
            Self::Ext => "EXT",
            Self::Exa => "EXA",
            Self::Exb => "EXB",
            Self::Upg => "UPG",
            Self::Can => "CAN",
            Self::Exp => "EXP",
            Self::Cor => "COR",
            Self::Rou => "ROU",
        }
    }

    /// Human-readable phrase for the action, as shown in event history.
    pub const fn long_state_name(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Con => "Continued",
            Self::Ext => "Extended in Time",
            Self::Exa => "Extended in Area",
            Self::Exb => "Extended in Time + Area",
            Self::Upg => "Upgraded",
            Self::Can => "Cancelled",
            Self::Exp => "Expired",
            Self::Cor => "Corrected",
            Self::Rou => "Routine",
        }
    }

    /// Terminal actions remove areas from active coverage.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Upg | Self::Can | Self::Exp)
    }
}

impl FromStr for Action {
    type Err = VtecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "CON" => Ok(Self::Con),
            "EXT" => Ok(Self::Ext),
            "EXA" => Ok(Self::Exa),
            "EXB" => Ok(Self::Exb),
            "UPG" => Ok(Self::Upg),
            "CAN" => Ok(Self::Can),
            "EXP" => Ok(Self::Exp),
            "COR" => Ok(Self::Cor),
            "ROU" => Ok(Self::Rou),
            other => Err(VtecError::Action(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A parsed VTEC string.
///
/// `start` / `end` are `None` when the corresponding field carried the
/// `000000T0000Z` sentinel; the sentinel is never interpreted as a real
/// date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vtec {
    pub product_class: ProductClass,
    pub action: Action,
    /// 4-character issuing office, e.g. `KTOP`.
    pub office_id: String,
    /// 2-character phenomena, e.g. `TO` (tornado).
    pub phenomena: String,
    /// 1-character significance, e.g. `W` (warning).
    pub significance: String,
    pub event_tracking_number: u32,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Vtec {
    /// Parse a VTEC string against the canonical grammar.
    pub fn parse(vtec: &str) -> Result<Self, VtecError> {
        let caps = vtec_regex()
            .captures(vtec)
            .ok_or_else(|| VtecError::Format(vtec.to_string()))?;

        let product_class: ProductClass = caps[1].parse()?;
        let action: Action = caps[2].parse()?;
        let office_id = caps[3].to_string();
        let phenomena = caps[4].to_string();
        let significance = caps[5].to_string();
        let event_tracking_number: u32 = caps[6]
            .parse()
            .map_err(|_| VtecError::TrackingNumber(caps[6].to_string()))?;

        let start = parse_vtec_time(&caps[7]).map_err(VtecError::StartTime)?;
        let end = parse_vtec_time(&caps[8]).map_err(VtecError::EndTime)?;

        Ok(Self {
            product_class,
            action,
            office_id,
            phenomena,
            significance,
            event_tracking_number,
            start,
            end,
        })
    }

    /// Canonical event identifier: `{pp}{s}-{office}-{etn}-{endYear}`.
    ///
    /// Stable across every action code, this key groups all CAP messages
    /// that are moments in one event's lifecycle. Uses the end-date year;
    /// an unset end time yields year 1, mirroring a zero time.
    pub fn canonical_event_id(&self) -> String {
        let end_year = self.end.map_or(1, |t| t.year());
        format!(
            "{}{}-{}-{}-{:04}",
            self.phenomena, self.significance, self.office_id, self.event_tracking_number, end_year
        )
    }
}

impl fmt::Display for Vtec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}.{}.{}.{}.{}.{:04}.{}-{}/",
            self.product_class.code(),
            self.action,
            self.office_id,
            self.phenomena,
            self.significance,
            self.event_tracking_number,
            format_vtec_time(self.start),
            format_vtec_time(self.end),
        )
    }
}

fn parse_vtec_time(field: &str) -> Result<Option<DateTime<Utc>>, String> {
    if field == UNSET_TIME {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(field, TIME_LAYOUT)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| field.to_string())
}

fn format_vtec_time(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(|| UNSET_TIME.to_string(), |t| t.format(TIME_LAYOUT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_tornado_warning() {
        let vtec = Vtec::parse("/O.NEW.KTOP.TO.W.0012.250401T2000Z-250401T2100Z/")
            .expect("valid VTEC");
        assert_eq!(vtec.product_class, ProductClass::Operational);
        assert_eq!(vtec.action, Action::New);
        assert_eq!(vtec.office_id, "KTOP");
        assert_eq!(vtec.phenomena, "TO");
        assert_eq!(vtec.significance, "W");
        assert_eq!(vtec.event_tracking_number, 12);
        assert_eq!(
            vtec.start,
            Some(Utc.with_ymd_and_hms(2025, 4, 1, 20, 0, 0).single().expect("valid"))
        );
        assert_eq!(
            vtec.end,
            Some(Utc.with_ymd_and_hms(2025, 4, 1, 21, 0, 0).single().expect("valid"))
        );
    }

    #[test]
    fn parses_without_surrounding_slashes() {
        let vtec =
            Vtec::parse("O.CON.KGLD.SV.W.0101.000000T0000Z-250615T0300Z").expect("valid VTEC");
        assert_eq!(vtec.action, Action::Con);
        assert_eq!(vtec.start, None);
    }

    #[test]
    fn sentinel_times_parse_to_none() {
        let vtec = Vtec::parse("/O.EXP.KTOP.TO.W.0012.000000T0000Z-000000T0000Z/")
            .expect("valid VTEC");
        assert_eq!(vtec.start, None);
        assert_eq!(vtec.end, None);
    }

    #[test]
    fn rejects_malformed_strings() {
        for bad in [
            "",
            "not a vtec",
            "/O.NEW.KTOP.TO.W.12.250401T2000Z-250401T2100Z/",
            "/O.NOP.KTOP.TO.W.0012.250401T2000Z-250401T2100Z/",
            "/Q.NEW.KTOP.TO.W.0012.250401T2000Z-250401T2100Z/",
            "/O.NEW.KTOP.TOR.W.0012.250401T2000Z-250401T2100Z/",
            "/O.NEW.KTOP.TO.W.0012.250401T2000Z/",
        ] {
            assert!(
                matches!(Vtec::parse(bad), Err(VtecError::Format(_))),
                "expected format error for {bad:?}"
            );
        }
    }

    #[test]
    fn rejects_impossible_dates() {
        // Matches the grammar but is not a real calendar date.
        let result = Vtec::parse("/O.NEW.KTOP.TO.W.0012.251301T2000Z-250401T2100Z/");
        assert!(matches!(result, Err(VtecError::StartTime(_))));
        let result = Vtec::parse("/O.NEW.KTOP.TO.W.0012.250401T2000Z-250441T2100Z/");
        assert!(matches!(result, Err(VtecError::EndTime(_))));
    }

    #[test]
    fn round_trips_every_action_and_class() {
        for class in ["O", "T", "E", "X"] {
            for action in
                ["NEW", "CON", "EXT", "EXA", "EXB", "UPG", "CAN", "EXP", "COR", "ROU"]
            {
                let raw = format!("/{class}.{action}.KGLD.SV.W.0101.250614T2200Z-250615T0300Z/");
                let parsed = Vtec::parse(&raw).expect("valid VTEC");
                assert_eq!(parsed.to_string(), raw, "display should round-trip {raw}");
                let reparsed = Vtec::parse(&parsed.to_string()).expect("round-trip parse");
                assert_eq!(parsed, reparsed);
            }
        }
    }

    #[test]
    fn sentinel_round_trips_as_sentinel() {
        let raw = "/O.CAN.KTOP.TO.W.0012.000000T0000Z-250401T2100Z/";
        let parsed = Vtec::parse(raw).expect("valid VTEC");
        assert_eq!(parsed.to_string(), raw);
    }

    #[test]
    fn canonical_id_uses_end_year_and_unpadded_etn() {
        let vtec = Vtec::parse("/O.NEW.KTOP.TO.W.0012.250401T2000Z-250401T2100Z/")
            .expect("valid VTEC");
        assert_eq!(vtec.canonical_event_id(), "TOW-KTOP-12-2025");
    }

    #[test]
    fn canonical_id_ignores_action_and_times_within_same_year() {
        let base = Vtec::parse("/O.NEW.KTOP.TO.W.0012.250401T2000Z-250401T2100Z/")
            .expect("valid VTEC");
        for action in ["CON", "EXT", "EXA", "EXB", "UPG", "CAN", "EXP", "COR", "ROU"] {
            let other = Vtec::parse(&format!(
                "/O.{action}.KTOP.TO.W.0012.250401T2030Z-251231T2100Z/"
            ))
            .expect("valid VTEC");
            assert_eq!(other.canonical_event_id(), base.canonical_event_id());
        }
    }

    #[test]
    fn long_state_names() {
        assert_eq!(Action::New.long_state_name(), "New");
        assert_eq!(Action::Exb.long_state_name(), "Extended in Time + Area");
        assert_eq!(Action::Can.long_state_name(), "Cancelled");
        assert_eq!(Action::Rou.long_state_name(), "Routine");
    }

    #[test]
    fn terminal_actions() {
        for action in [Action::Upg, Action::Can, Action::Exp] {
            assert!(action.is_terminal());
        }
        for action in [Action::New, Action::Con, Action::Ext, Action::Exa, Action::Exb, Action::Cor, Action::Rou] {
            assert!(!action.is_terminal());
        }
    }
}
