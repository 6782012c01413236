// Page naming, relation roles and page id helpers

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::TrackerError;
use crate::model::RunClass;
use crate::timestamp::yymmdd;

pub const DEFAULT_PAGE_URL_PREFIX: &str = "https://www.notion.so/";

/// Cryostat systems with mirror databases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FridgeSystem {
    Bluefors,
    IceOxford,
}

impl FridgeSystem {
    /// Match a substep label (`Bluefors (2)`, `ICEOxford`, ...)
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.to_lowercase();
        if label.contains("ice") {
            Some(FridgeSystem::IceOxford)
        } else if label.contains("blue") {
            Some(FridgeSystem::Bluefors)
        } else {
            None
        }
    }

    /// `BF260202` / `IO[260202]`, bare prefix when the anchor has no date
    pub fn display_name(self, anchor: &str) -> String {
        match (self, yymmdd(anchor)) {
            (FridgeSystem::Bluefors, Some(date)) => format!("BF{date}"),
            (FridgeSystem::Bluefors, None) => "BF".to_string(),
            (FridgeSystem::IceOxford, Some(date)) => format!("IO[{date}]"),
            (FridgeSystem::IceOxford, None) => "IO".to_string(),
        }
    }
}

impl fmt::Display for FridgeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FridgeSystem::Bluefors => f.write_str("Bluefors"),
            FridgeSystem::IceOxford => f.write_str("ICEOxford"),
        }
    }
}

/// Relation property linking a fridge page to its run's fab page
pub fn relation_property(system_label: &str, class: &RunClass) -> Result<&'static str, TrackerError> {
    let unknown = || TrackerError::UnknownRelationRole {
        system: system_label.to_string(),
        classification: class.to_string(),
    };
    FridgeSystem::from_label(system_label).ok_or_else(unknown)?;
    match class {
        RunClass::Main => Ok("Fab run"),
        RunClass::Test => Ok("Test run"),
        RunClass::Other(_) => Err(unknown()),
    }
}

/// Dashed 8-4-4-4-12 form for 32 hex digit ids; anything else is returned trimmed
pub fn normalize_page_id(raw: &str) -> String {
    let compact: String = raw.trim().chars().filter(|c| *c != '-').collect();
    if compact.len() == 32 && compact.chars().all(|c| c.is_ascii_hexdigit()) {
        let compact = compact.to_lowercase();
        format!(
            "{}-{}-{}-{}-{}",
            &compact[0..8],
            &compact[8..12],
            &compact[12..16],
            &compact[16..20],
            &compact[20..32]
        )
    } else {
        raw.trim().to_string()
    }
}

fn notion_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)([0-9a-f]{8}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{4}-?[0-9a-f]{12})/?$").ok())
        .as_ref()
}

/// Pull the page/database id out of a share URL or a bare id
pub fn extract_notion_id(url_or_id: &str) -> Option<String> {
    let without_query = url_or_id.trim().split(['?', '#']).next().unwrap_or_default();
    let captures = notion_id_pattern()?.captures(without_query)?;
    Some(normalize_page_id(captures.get(1)?.as_str()))
}

/// Deterministic page URL: prefix + id without separators
pub fn page_url(prefix: &str, page_id: &str) -> String {
    format!("{}{}", prefix, page_id.trim().replace('-', ""))
}
