//! Header reconciliation between a live sheet and the current schema.
//!
//! Reconciliation is strictly additive: labels already in the sheet are never
//! removed, renamed or moved. A renamed field therefore shows up as a new
//! trailing column, and historical data stays under the label it was written
//! with.
//!
//! # Algorithm
//!
//! 1. Collect the labels already present in the sheet
//! 2. Walk the freshly computed header list in order
//! 3. Keep every label not yet present, once
//! 4. No kept labels: no-op; otherwise append them in that order
//!
//! Because the live header order can differ from the schema's column order,
//! rows are positioned with a [`RowLayout`] built from the live headers.
//!
//! A column written under its qualified label (`Email (email-1)`) while its
//! label was shared keeps writing there after the other field goes away, so
//! a bare `Email` column holding another field's history is never reused.

use crate::schema::FlattenedColumn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// What has to change in a sheet's header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action", content = "labels")]
pub enum HeaderAction {
    /// Every fresh label is already present
    NoOp,
    /// Labels to append after the existing ones, in order
    Append(Vec<String>),
}

impl HeaderAction {
    pub fn is_noop(&self) -> bool {
        matches!(self, HeaderAction::NoOp)
    }

    /// Header row after applying this action to `current`.
    pub fn apply(&self, current: &[String]) -> Vec<String> {
        let mut headers = current.to_vec();
        if let HeaderAction::Append(labels) = self {
            headers.extend(labels.iter().cloned());
        }
        headers
    }
}

/// Reconciles freshly computed headers against a sheet's live header row.
#[derive(Debug, Clone)]
pub struct HeaderReconciler<'a> {
    current: &'a [String],
    present: HashSet<&'a str>,
}

impl<'a> HeaderReconciler<'a> {
    /// Create a reconciler for the given live header row.
    pub fn new(current: &'a [String]) -> Self {
        Self {
            current,
            present: current.iter().map(String::as_str).collect(),
        }
    }

    /// The live header row this reconciler compares against.
    pub fn current(&self) -> &'a [String] {
        self.current
    }

    /// Header labels the given columns write to in this sheet: a column's
    /// qualified label when the sheet already has it, else its label.
    pub fn targets(&self, columns: &[FlattenedColumn]) -> Vec<String> {
        columns
            .iter()
            .map(|column| {
                let qualified = column.qualified_label();
                if self.present.contains(qualified.as_str()) {
                    qualified
                } else {
                    column.label.clone()
                }
            })
            .collect()
    }

    /// Compute the additive change that makes `fresh` a subset of the sheet.
    pub fn reconcile(&self, fresh: &[String]) -> HeaderAction {
        let mut seen: HashSet<&str> = HashSet::new();
        let missing: Vec<String> = fresh
            .iter()
            .filter(|label| !self.present.contains(label.as_str()))
            .filter(|label| seen.insert(label.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            HeaderAction::NoOp
        } else {
            HeaderAction::Append(missing)
        }
    }
}

/// Shorthand for `HeaderReconciler::new(current).reconcile(fresh)`.
pub fn reconcile_headers(current: &[String], fresh: &[String]) -> HeaderAction {
    HeaderReconciler::new(current).reconcile(fresh)
}

/// Maps sheet header positions to schema columns.
///
/// Built from the sheet's live header row, so a row resolved in schema column
/// order can be rearranged to line up with the sheet. Headers that match no
/// column (fields removed from the schema) get empty cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    /// For each sheet position, the index of the schema column filling it
    slots: Vec<Option<usize>>,
}

impl RowLayout {
    /// Build the layout of `columns` under the live `headers`.
    ///
    /// A column goes under its qualified label when the sheet has one, else
    /// under the first header equal to its label. Each header takes at most
    /// one column.
    pub fn new(headers: &[String], columns: &[FlattenedColumn]) -> Self {
        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(headers.len());
        for (position, header) in headers.iter().enumerate() {
            positions.entry(header.as_str()).or_insert(position);
        }

        let mut slots = vec![None; headers.len()];
        for (index, column) in columns.iter().enumerate() {
            let position = positions
                .get(column.qualified_label().as_str())
                .or_else(|| positions.get(column.label.as_str()))
                .copied();

            if let Some(slot) = position.and_then(|p| slots.get_mut(p)) {
                if slot.is_none() {
                    *slot = Some(index);
                }
            }
        }

        Self { slots }
    }

    /// Number of cells in an arranged row.
    pub fn width(&self) -> usize {
        self.slots.len()
    }

    /// Rearrange a row resolved in column order into sheet order.
    pub fn arrange(&self, resolved: &[String]) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| {
                slot.and_then(|index| resolved.get(index))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{flatten, header_row, FieldDefinition};
    use pretty_assertions::assert_eq;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn new_label_is_appended() {
        let action = reconcile_headers(&labels(&["A", "B"]), &labels(&["A", "B", "C"]));
        assert_eq!(action, HeaderAction::Append(labels(&["C"])));
    }

    #[test]
    fn removed_label_is_kept() {
        let action = reconcile_headers(&labels(&["A", "B", "C"]), &labels(&["A", "B"]));
        assert!(action.is_noop());
    }

    #[test]
    fn appended_labels_follow_fresh_order_without_duplicates() {
        let current = labels(&["B", "X"]);
        let fresh = labels(&["D", "A", "B", "D", "C"]);

        let action = reconcile_headers(&current, &fresh);

        assert_eq!(action, HeaderAction::Append(labels(&["D", "A", "C"])));
        assert_eq!(action.apply(&current), labels(&["B", "X", "D", "A", "C"]));
    }

    #[test]
    fn empty_sheet_gets_every_header() {
        let fresh = labels(&["Entry ID", "Date"]);
        assert_eq!(
            reconcile_headers(&[], &fresh),
            HeaderAction::Append(fresh.clone())
        );
    }

    #[test]
    fn reconciled_headers_contain_fresh_headers() {
        let current = labels(&["Z", "A"]);
        let fresh = labels(&["A", "B", "C"]);

        let merged = reconcile_headers(&current, &fresh).apply(&current);

        assert!(fresh.iter().all(|label| merged.contains(label)));
        assert_eq!(&merged[..2], &current[..]);
        assert!(reconcile_headers(&merged, &fresh).is_noop());
    }

    #[test]
    fn layout_follows_live_header_order() {
        let columns = flatten(&[
            FieldDefinition::new("text-1", "text").with_label("Company"),
            FieldDefinition::new("email-1", "email").with_label("Email"),
        ]);
        let resolved: Vec<String> = header_row(&columns)
            .iter()
            .map(|label| format!("v:{}", label))
            .collect();

        // Sheet was created before Company existed and kept a retired column.
        let live = labels(&[
            "Entry ID",
            "Date",
            "Time",
            "IP Address",
            "User Agent",
            "Email",
            "Retired",
            "Company",
        ]);
        let layout = RowLayout::new(&live, &columns);
        let row = layout.arrange(&resolved);

        assert_eq!(layout.width(), 8);
        assert_eq!(row[5], "v:Email");
        assert_eq!(row[6], "");
        assert_eq!(row[7], "v:Company");
    }

    #[test]
    fn duplicate_live_header_is_filled_once() {
        let columns = flatten(&[FieldDefinition::new("text-1", "text").with_label("Company")]);
        let resolved = vec!["1".to_string(); columns.len()];
        let live = labels(&["Company", "Company"]);

        let row = RowLayout::new(&live, &columns).arrange(&resolved);

        assert_eq!(row, labels(&["1", ""]));
    }

    #[test]
    fn qualified_header_wins_over_bare_label() {
        let columns = flatten(&[FieldDefinition::new("email-1", "email").with_label("Email")]);
        let resolved: Vec<String> = columns.iter().map(|c| format!("v:{}", c.key)).collect();
        let mut live = header_row(&columns);
        live.push("Email (email-1)".to_string());

        let reconciler = HeaderReconciler::new(&live);
        let targets = reconciler.targets(&columns);
        let row = RowLayout::new(&live, &columns).arrange(&resolved);

        assert_eq!(targets[5], "Email (email-1)");
        assert!(reconciler.reconcile(&targets).is_noop());
        assert_eq!(row[5], "");
        assert_eq!(row[6], "v:email-1");
    }

    #[test]
    fn targets_fall_back_to_labels() {
        let columns = flatten(&[FieldDefinition::new("text-1", "text").with_label("Company")]);
        let live = labels(&["Entry ID"]);

        assert_eq!(
            HeaderReconciler::new(&live).targets(&columns),
            header_row(&columns)
        );
    }

    #[test]
    fn header_action_serialization() {
        let action = HeaderAction::Append(labels(&["C"]));
        let json = serde_json::to_value(&action).unwrap();

        assert_eq!(json, serde_json::json!({"action": "append", "labels": ["C"]}));
        let parsed: HeaderAction = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, action);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_headers() -> impl Strategy<Value = Vec<String>> {
            prop::collection::vec("[A-E]", 0..8)
        }

        proptest! {
            #[test]
            fn prop_reconcile_only_appends(current in arb_headers(), fresh in arb_headers()) {
                let updated = reconcile_headers(&current, &fresh).apply(&current);

                prop_assert_eq!(&updated[..current.len()], &current[..]);
                for label in &fresh {
                    prop_assert!(updated.contains(label));
                }
            }

            #[test]
            fn prop_reconcile_is_idempotent(current in arb_headers(), fresh in arb_headers()) {
                let updated = reconcile_headers(&current, &fresh).apply(&current);
                prop_assert!(reconcile_headers(&updated, &fresh).is_noop());
            }

            #[test]
            fn prop_layout_width_matches_headers(headers in arb_headers()) {
                let fields: Vec<FieldDefinition> = ["A", "B", "C"]
                    .iter()
                    .map(|id| FieldDefinition::new(*id, "text").with_label(*id))
                    .collect();
                let columns = flatten(&fields);
                let resolved = vec!["x".to_string(); columns.len()];

                let layout = RowLayout::new(&headers, &columns);
                prop_assert_eq!(layout.width(), headers.len());
                prop_assert_eq!(layout.arrange(&resolved).len(), headers.len());
            }
        }
    }
}
