// Anchor-field edge detection between the loaded and the saved state

use super::snapshot::{PostSnapshot, PreSnapshot, Subject};
use crate::model::EXTERNAL_PAGE_ID;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// Anchor set and no page yet, whatever the anchor was before
    Create,
    /// Anchor `value -> other value` with a page
    Rename,
    /// Anchor `value -> ""` with a page
    Reset,
    /// A bound date field other than the anchor changed while a page exists
    Secondary { property: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub kind: EdgeKind,
    pub subject: Subject,
    pub field: String,
    pub old: String,
    pub new: String,
}

/// Compare two snapshots and list what the mirror has to hear about.
///
/// Pure: subjects are visited in order (fab first) and each subject yields at
/// most one anchor edge followed by its secondary edges.
pub fn detect_edges(pre: &PreSnapshot, post: &PostSnapshot) -> Vec<Edge> {
    let mut edges = Vec::new();

    for (subject, state) in post.subjects() {
        let anchor_key = subject.anchor_key();
        let old_anchor = pre.field(subject, anchor_key).trim();
        let new_anchor = state.anchor(subject);
        let has_page = !state.fields.get(EXTERNAL_PAGE_ID).trim().is_empty();

        let anchor_edge = match (old_anchor.is_empty(), new_anchor.is_empty()) {
            (_, false) if !has_page => Some(EdgeKind::Create),
            (false, false) if old_anchor != new_anchor => Some(EdgeKind::Rename),
            (false, true) if has_page => Some(EdgeKind::Reset),
            _ => None,
        };
        let resetting = anchor_edge == Some(EdgeKind::Reset);

        if let Some(kind) = anchor_edge {
            edges.push(Edge {
                kind,
                subject: subject.clone(),
                field: anchor_key.to_string(),
                old: old_anchor.to_string(),
                new: new_anchor.to_string(),
            });
        }

        if !has_page || resetting || new_anchor.is_empty() {
            continue;
        }

        for binding in subject.bindings() {
            let changed = [binding.start, binding.end]
                .into_iter()
                .filter(|key| *key != anchor_key)
                .find(|key| pre.field(subject, key) != state.fields.get(key));
            if let Some(key) = changed {
                edges.push(Edge {
                    kind: EdgeKind::Secondary {
                        property: binding.property,
                    },
                    subject: subject.clone(),
                    field: key.to_string(),
                    old: pre.field(subject, key).to_string(),
                    new: state.fields.get(key).to_string(),
                });
            }
        }
    }

    edges
}
