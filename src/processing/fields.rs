//! Parsing of the structured-field block returned by the model.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::prompts::{FIELDS_HEADING, NOT_MENTIONED, STRUCTURED_FIELDS};

/// Values that mean "nothing found" and are stored as empty strings.
const EMPTY_MARKERS: &[&str] = &[
    NOT_MENTIONED,
    "non mentionnée",
    "non mentionne",
    "non mentionnee",
    "non précisé",
    "non precise",
    "non précisée",
    "n/a",
    "na",
    "-",
    "…",
    "...",
];

/// Form pre-fill derived from the structured fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Prefill {
    /// Operation title.
    pub intitule: String,
    /// Lot title.
    pub lot: String,
    /// Contracting authority (maître d'ouvrage).
    pub moa: String,
    /// Site address.
    pub adresse: String,
}

/// Structured fields keyed by [`STRUCTURED_FIELDS`] key; every key is present.
pub type StructuredFields = BTreeMap<String, String>;

/// Normalize a raw field value; placeholders for missing data become empty.
pub fn normalize_value(raw: &str) -> String {
    let value = raw.trim().trim_matches('*').trim();
    let lowered = value.to_lowercase();
    let bare = lowered.trim_end_matches('.').trim();
    if bare.is_empty() || EMPTY_MARKERS.contains(&bare) {
        String::new()
    } else {
        value.to_string()
    }
}

fn field_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*[-*]\s*\*{0,2}([a-z_]+)\*{0,2}\s*[:：]\s*(.*)$")
            .expect("structured field pattern is a valid regex")
    })
}

fn known_key(key: &str) -> bool {
    STRUCTURED_FIELDS.iter().any(|(known, _)| *known == key)
}

/// Split `markdown` into structured fields and the remaining summary.
///
/// Lines of the form `- **key** : value` with a known key are consumed, as is the
/// [`FIELDS_HEADING`] line. When a key appears several times the first non-empty value wins.
pub fn split_structured_fields(markdown: &str) -> (StructuredFields, String) {
    let mut fields: StructuredFields = STRUCTURED_FIELDS
        .iter()
        .map(|(key, _)| (key.to_string(), String::new()))
        .collect();
    let mut remaining = Vec::new();

    for line in markdown.lines() {
        if line.trim() == FIELDS_HEADING {
            continue;
        }
        match field_line().captures(line) {
            Some(captures) if known_key(&captures[1]) => {
                let value = normalize_value(&captures[2]);
                if let Some(slot) = fields.get_mut(&captures[1]) {
                    if slot.is_empty() {
                        *slot = value;
                    }
                }
            }
            _ => remaining.push(line),
        }
    }

    (fields, remaining.join("\n").trim().to_string())
}

/// Derive the form pre-fill from parsed fields.
pub fn prefill(fields: &StructuredFields) -> Prefill {
    let get = |key: &str| fields.get(key).cloned().unwrap_or_default();
    Prefill {
        intitule: get("intitule_operation"),
        lot: get("intitule_lot"),
        moa: get("maitre_ouvrage"),
        adresse: get("adresse_chantier"),
    }
}
