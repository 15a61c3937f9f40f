use serde_json::{Map, Value};
use std::fmt;

/// Where in a document a removable field lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// The document object itself
    TopLevel,
    /// The document's `meta` object
    Meta,
    /// Every object in the document's `entries` array
    Entry,
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::TopLevel => write!(f, "top-level"),
            Container::Meta => write!(f, "meta"),
            Container::Entry => write!(f, "entry"),
        }
    }
}

/// A single (container, field) pair that a migration step deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalRule {
    pub container: Container,
    pub field: &'static str,
}

impl RemovalRule {
    pub const fn new(container: Container, field: &'static str) -> Self {
        Self { container, field }
    }
}

/// Fields dropped when moving from 1.1.x to the slim-core 1.2.0 layout.
///
/// Order matters: it is the order removals are recorded in reports.
pub const SLIM_CORE_REMOVALS: &[RemovalRule] = &[
    RemovalRule::new(Container::TopLevel, "signature"),
    // 1.1.1 documents should no longer carry it
    RemovalRule::new(Container::TopLevel, "timestamp"),
    RemovalRule::new(Container::Meta, "x_utc_offset_minutes"),
    RemovalRule::new(Container::Meta, "x_processed_by"),
    RemovalRule::new(Container::Meta, "x_ai_processing"),
    RemovalRule::new(Container::Meta, "x_statistics"),
    RemovalRule::new(Container::Meta, "x_migration"),
    RemovalRule::new(Container::Meta, "x_encryption"),
    RemovalRule::new(Container::Meta, "x_merged_from"),
    RemovalRule::new(Container::Entry, "summary"),
    RemovalRule::new(Container::Entry, "moods"),
    RemovalRule::new(Container::Entry, "tags"),
    RemovalRule::new(Container::Entry, "entities"),
    RemovalRule::new(Container::Entry, "end_date"),
    RemovalRule::new(Container::Entry, "created_at"),
    RemovalRule::new(Container::Entry, "x_relations"),
    RemovalRule::new(Container::Entry, "x_due_date"),
];

/// Remove every field `rules` name for `container` from `target`.
///
/// Returns the names that were actually present, in rule order.
pub fn apply_removals(
    target: &mut Map<String, Value>,
    rules: &[RemovalRule],
    container: Container,
) -> Vec<String> {
    rules
        .iter()
        .filter(|rule| rule.container == container)
        .filter_map(|rule| {
            target.shift_remove(rule.field).map(|_| {
                tracing::debug!(container = %container, field = rule.field, "removed field");
                rule.field.to_string()
            })
        })
        .collect()
}
