// Dotted field paths with back-quoted segments

use std::collections::BTreeMap;
use std::fmt;

use super::value::{Document, FieldValue};
use super::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

fn is_plain_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote(segment: &str) -> String {
    if is_plain_identifier(segment) {
        segment.to_string()
    } else {
        let escaped = segment.replace('\\', "\\\\").replace('`', "\\`");
        format!("`{escaped}`")
    }
}

impl FieldPath {
    pub fn from_segments<I, S>(segments: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(StoreError::InvalidPath(segments.join(".")));
        }
        Ok(Self(segments))
    }

    /// Parse `a.b.\`odd-key\`.c`
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidPath(raw.to_string());
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = raw.chars().peekable();
        let mut quoted_segment = false;

        while let Some(c) = chars.next() {
            match c {
                '`' if current.is_empty() && !quoted_segment => {
                    loop {
                        match chars.next() {
                            Some('\\') => current.push(chars.next().ok_or_else(invalid)?),
                            Some('`') => break,
                            Some(other) => current.push(other),
                            None => return Err(invalid()),
                        }
                    }
                    quoted_segment = true;
                    if !matches!(chars.peek(), None | Some('.')) {
                        return Err(invalid());
                    }
                }
                '.' => {
                    if current.is_empty() {
                        return Err(invalid());
                    }
                    segments.push(std::mem::take(&mut current));
                    quoted_segment = false;
                }
                other if !quoted_segment => current.push(other),
                _ => return Err(invalid()),
            }
        }
        if current.is_empty() {
            return Err(invalid());
        }
        segments.push(current);
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn root(&self) -> &str {
        &self.0[0]
    }

    /// Wrap `value` in maps so it sits at this path below the root field
    pub fn nest_value(&self, value: FieldValue) -> FieldValue {
        self.0[1..].iter().rev().fold(value, |inner, segment| {
            let mut map = BTreeMap::new();
            map.insert(segment.clone(), inner);
            FieldValue::Map(map)
        })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.0.iter().map(|s| quote(s)).collect();
        f.write_str(&quoted.join("."))
    }
}

/// Deep-merge write of `value` at `path`; siblings along the way are kept and
/// non-map intermediates are replaced by maps.
pub fn set_path(document: &mut Document, path: &FieldPath, value: FieldValue) {
    let segments = path.segments();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return,
    };

    let mut fields: &mut BTreeMap<String, FieldValue> = document;
    for segment in parents {
        let slot = fields
            .entry(segment.clone())
            .or_insert_with(|| FieldValue::Map(BTreeMap::new()));
        if !matches!(slot, FieldValue::Map(_)) {
            *slot = FieldValue::Map(BTreeMap::new());
        }
        let FieldValue::Map(inner) = slot else {
            return;
        };
        fields = inner;
    }
    fields.insert(last.clone(), value);
}

pub fn get_path<'a>(document: &'a Document, path: &FieldPath) -> Option<&'a FieldValue> {
    let (first, rest) = path.segments().split_first()?;
    rest.iter()
        .try_fold(document.get(first)?, |current, segment| current.as_map()?.get(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_non_identifiers() {
        let path = FieldPath::from_segments(["metadata", "measure", "fridges", "fridge-01", "notes"]).unwrap();
        assert_eq!(path.to_string(), "metadata.measure.fridges.`fridge-01`.notes");

        let odd = FieldPath::from_segments(["a", "we`ird"]).unwrap();
        assert_eq!(odd.to_string(), "a.`we\\`ird`");
    }

    #[test]
    fn test_parse_round_trips_display() {
        for raw in ["metadata.fab.fabin", "metadata.`9lives`.x", "a.`we\\`ird`"] {
            let parsed = FieldPath::parse(raw).unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
        assert_eq!(FieldPath::parse("a.`b.c`").unwrap().segments(), ["a", "b.c"]);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "a..b", ".a", "a.", "a.`open", "a.`b`c"] {
            assert!(FieldPath::parse(raw).is_err(), "{raw} should be rejected");
        }
        assert!(FieldPath::from_segments(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_set_path_merges_deeply() {
        let mut document = Document::new();
        let url = FieldPath::parse("metadata.measure.fridges.f1.external_url").unwrap();
        let notes = FieldPath::parse("metadata.measure.fridges.f2.notes").unwrap();

        set_path(&mut document, &url, FieldValue::from("https://x"));
        set_path(&mut document, &notes, FieldValue::from("cold"));
        set_path(&mut document, &FieldPath::parse("run_no").unwrap(), FieldValue::from("001"));

        assert_eq!(get_path(&document, &url), Some(&FieldValue::from("https://x")));
        assert_eq!(get_path(&document, &notes), Some(&FieldValue::from("cold")));
        assert_eq!(document["run_no"], FieldValue::from("001"));
    }

    #[test]
    fn test_nest_value_builds_maps_below_root() {
        let path = FieldPath::parse("metadata.fab.fabin").unwrap();
        let nested = path.nest_value(FieldValue::from("2026-01-05"));
        assert_eq!(path.root(), "metadata");
        assert_eq!(nested.to_json(), serde_json::json!({"fab": {"fabin": "2026-01-05"}}));
    }
}
