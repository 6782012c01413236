// Declared metadata keys per stage

use crate::model::{EXTERNAL_PAGE_ID, EXTERNAL_URL};

/// How a declared field is validated and coerced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Local `YYYY-MM-DD HH:MM:SS` (or a bare date)
    Timestamp,
    Text,
    /// Literal status token such as `delivery#2`
    Token,
    /// External page pointers, written only by the sync engine
    Linkage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaScope {
    Design,
    Fab,
    Chip,
    Fridge,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub kind: FieldKind,
}

const fn field(key: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { key, kind }
}

use FieldKind::{Linkage, Text, Timestamp, Token};

const DESIGN_FIELDS: &[FieldSpec] = &[
    field("name", Text),
    field("creator", Text),
    field("verifier", Text),
    field("completed", Timestamp),
    field("spec", Text),
    field("chip_size", Text),
    field("file", Text),
    field("notes", Text),
    field(EXTERNAL_URL, Linkage),
    field(EXTERNAL_PAGE_ID, Linkage),
];

const FAB_FIELDS: &[FieldSpec] = &[
    field("lot_id", Text),
    field("pic", Text),
    field("type", Text),
    field("fabin", Timestamp),
    field("fabout", Timestamp),
    field("process", Text),
    field("substrate", Text),
    field("notes", Text),
    field(EXTERNAL_URL, Linkage),
    field(EXTERNAL_PAGE_ID, Linkage),
];

const CHIP_FIELDS: &[FieldSpec] = &[
    field("pcb_ready", Timestamp),
    field("bond_date", Timestamp),
    field("delivery", Token),
    field("delivery_time", Timestamp),
    field("pcb_type", Text),
    field("pcb_pic", Text),
    field("bond_pic", Text),
    field("notes", Text),
    field(EXTERNAL_URL, Linkage),
    field(EXTERNAL_PAGE_ID, Linkage),
];

const FRIDGE_FIELDS: &[FieldSpec] = &[
    field("cooldown_start", Timestamp),
    field("cooldown_end", Timestamp),
    field("measure_start", Timestamp),
    field("measure_end", Timestamp),
    field("warmup_start", Timestamp),
    field("warmup_end", Timestamp),
    field("storage", Token),
    field("storage_time", Timestamp),
    field("owner", Text),
    field("chip_uid", Text),
    field("cell_type", Text),
    field("notes", Text),
    field(EXTERNAL_URL, Linkage),
    field(EXTERNAL_PAGE_ID, Linkage),
];

impl MetaScope {
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            MetaScope::Design => DESIGN_FIELDS,
            MetaScope::Fab => FAB_FIELDS,
            MetaScope::Chip => CHIP_FIELDS,
            MetaScope::Fridge => FRIDGE_FIELDS,
        }
    }

    pub fn kind_of(self, key: &str) -> Option<FieldKind> {
        self.fields()
            .iter()
            .find(|spec| spec.key == key)
            .map(|spec| spec.kind)
    }

    pub fn keys(self) -> impl Iterator<Item = &'static str> {
        self.fields().iter().map(|spec| spec.key)
    }

    pub fn name(self) -> &'static str {
        match self {
            MetaScope::Design => "design",
            MetaScope::Fab => "fab",
            MetaScope::Chip => "chip",
            MetaScope::Fridge => "fridge",
        }
    }
}

/// Normalize a user or legacy key: `"Lot ID"` → `lot_id`, `"PIC*"` → `pic`.
///
/// Legacy `notion` / `notion_page_id` keys map onto the linkage fields.
pub fn normalize_key(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            if pending_separator && !normalized.is_empty() {
                normalized.push('_');
            }
            pending_separator = false;
            normalized.extend(c.to_lowercase());
        } else if c == '#' {
            // "# of chips" keeps its meaning
            if !normalized.is_empty() {
                normalized.push('_');
            }
            normalized.push('n');
            pending_separator = true;
        } else {
            pending_separator = true;
        }
    }

    match normalized.as_str() {
        "notion" | "notion_url" => EXTERNAL_URL.to_string(),
        "notion_page_id" | "notion_id" => EXTERNAL_PAGE_ID.to_string(),
        "lotid" => "lot_id".to_string(),
        "pic_fab" => "pic".to_string(),
        _ => normalized,
    }
}
