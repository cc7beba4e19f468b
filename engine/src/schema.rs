//! Field definitions and schema flattening.
//!
//! A form schema is an ordered list of [`FieldDefinition`]s, some of which are
//! compound (a name split into parts, a six-part address). Flattening turns
//! that list into the ordered, fixed set of [`FlattenedColumn`]s a sheet can
//! hold: standard columns first, then one column per field or per enabled
//! field part.
//!
//! Flattening is deterministic: the same definitions always produce the same
//! columns in the same order, so re-deriving headers never reorders columns
//! that were seen before.

use crate::{FieldId, FormId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Settings keys consulted, in order, when a field has no explicit label.
const LABEL_ATTRIBUTES: &[&str] = &["field_label", "main_label", "title", "placeholder"];

/// One field of a form schema, as reported by the schema provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Stable field identifier, e.g. `name-1`
    pub id: FieldId,
    /// Declared type as reported by the schema provider, e.g. `address`
    #[serde(rename = "type")]
    pub field_type: String,
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Type-specific configuration (sub-part flags, alternate labels)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,
}

impl FieldDefinition {
    /// Create a field definition with no label or settings.
    pub fn new(id: impl Into<FieldId>, field_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field_type: field_type.into(),
            label: None,
            settings: Map::new(),
        }
    }

    /// Builder-style method to set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Builder-style method to set one settings entry.
    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Classify the declared type.
    pub fn kind(&self) -> FieldKind {
        FieldKind::classify(&self.field_type)
    }

    /// Human-readable label: the explicit label, then the label-bearing
    /// settings in priority order, then the humanized field id.
    pub fn display_label(&self) -> String {
        if let Some(label) = self.label.as_deref().map(str::trim) {
            if !label.is_empty() {
                return label.to_string();
            }
        }

        LABEL_ATTRIBUTES
            .iter()
            .filter_map(|attr| self.setting_str(attr))
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| humanize(&self.id))
    }

    /// A non-empty string setting.
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// A boolean setting. Accepts JSON booleans and the usual string and
    /// numeric spellings; anything else reads as unset.
    pub fn setting_flag(&self, key: &str) -> Option<bool> {
        match self.settings.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// How a declared field type flattens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Carries no end-user data (layout, consent, payment, captcha)
    NonData,
    /// Name split into prefix / first / middle / last parts
    Name,
    /// Fixed six-part postal address
    Address,
    /// Hours and minutes
    Time,
    /// Embedded post with title, body and summary
    LinkedContent,
    /// Repeating group; variable cardinality kept in one structured column
    Repeater,
    /// Everything else: one column
    Simple,
}

impl FieldKind {
    /// Classify a declared field type string.
    pub fn classify(field_type: &str) -> Self {
        match field_type.trim().to_ascii_lowercase().as_str() {
            "section" | "html" | "page-break" | "gdprcheckbox" | "consent" | "stripe"
            | "paypal" | "captcha" => FieldKind::NonData,
            "name" => FieldKind::Name,
            "address" => FieldKind::Address,
            "time" => FieldKind::Time,
            "postdata" => FieldKind::LinkedContent,
            "group" | "repeater" => FieldKind::Repeater,
            _ => FieldKind::Simple,
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::NonData => write!(f, "NonData"),
            FieldKind::Name => write!(f, "Name"),
            FieldKind::Address => write!(f, "Address"),
            FieldKind::Time => write!(f, "Time"),
            FieldKind::LinkedContent => write!(f, "LinkedContent"),
            FieldKind::Repeater => write!(f, "Repeater"),
            FieldKind::Simple => write!(f, "Simple"),
        }
    }
}

/// A sub-part of a compound field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    /// Key appended to the field id, e.g. `first-name`
    pub key: &'static str,
    /// Default header suffix
    pub label: &'static str,
    /// Settings flag that enables the part (name fields only)
    pub flag: Option<&'static str>,
    /// Whether the part is enabled when the flag is absent
    pub enabled_by_default: bool,
}

const fn part(key: &'static str, label: &'static str) -> PartSpec {
    PartSpec {
        key,
        label,
        flag: None,
        enabled_by_default: true,
    }
}

const fn flagged(
    key: &'static str,
    label: &'static str,
    flag: &'static str,
    enabled_by_default: bool,
) -> PartSpec {
    PartSpec {
        key,
        label,
        flag: Some(flag),
        enabled_by_default,
    }
}

/// Name parts in column order. Given and family names are on by default.
pub const NAME_PARTS: &[PartSpec] = &[
    flagged("prefix", "Prefix", "prefix", false),
    flagged("first-name", "First Name", "fname", true),
    flagged("middle-name", "Middle Name", "mname", false),
    flagged("last-name", "Last Name", "lname", true),
];

/// Address parts; always all six.
pub const ADDRESS_PARTS: &[PartSpec] = &[
    part("street-address", "Street Address"),
    part("address-line", "Address Line 2"),
    part("city", "City"),
    part("state", "State/Province"),
    part("zip", "ZIP / Postal Code"),
    part("country", "Country"),
];

pub const TIME_PARTS: &[PartSpec] = &[part("hours", "Hours"), part("minutes", "Minutes")];

pub const LINKED_CONTENT_PARTS: &[PartSpec] = &[
    part("post-title", "Post Title"),
    part("post-content", "Post Content"),
    part("post-excerpt", "Post Excerpt"),
];

/// Columns every sheet starts with, filled from the submission itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StandardColumn {
    EntryId,
    Date,
    Time,
    IpAddress,
    UserAgent,
}

impl StandardColumn {
    /// All standard columns in sheet order.
    pub const ALL: [StandardColumn; 5] = [
        StandardColumn::EntryId,
        StandardColumn::Date,
        StandardColumn::Time,
        StandardColumn::IpAddress,
        StandardColumn::UserAgent,
    ];

    /// Reserved column key. The leading underscore keeps it clear of field ids.
    pub fn key(&self) -> &'static str {
        match self {
            StandardColumn::EntryId => "_entry_id",
            StandardColumn::Date => "_date",
            StandardColumn::Time => "_time",
            StandardColumn::IpAddress => "_ip_address",
            StandardColumn::UserAgent => "_user_agent",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StandardColumn::EntryId => "Entry ID",
            StandardColumn::Date => "Date",
            StandardColumn::Time => "Time",
            StandardColumn::IpAddress => "IP Address",
            StandardColumn::UserAgent => "User Agent",
        }
    }
}

/// Where a column's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnKind {
    /// Filled from submission metadata
    Standard(StandardColumn),
    /// One simple field
    Simple,
    /// One part of a compound field
    CompoundPart,
    /// A repeating group rendered as structured text
    Structured,
}

/// One atomic sheet column derived from a field or a field part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlattenedColumn {
    /// Unique key within the form
    pub key: String,
    /// Header label
    pub label: String,
    /// Originating field id (the reserved key for standard columns)
    pub field_id: FieldId,
    /// Sub-part key for compound fields, e.g. `first-name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,
    pub kind: ColumnKind,
}

impl FlattenedColumn {
    pub fn is_standard(&self) -> bool {
        matches!(self.kind, ColumnKind::Standard(_))
    }

    /// The label carrying the column key, as used when fields share a label.
    pub fn qualified_label(&self) -> String {
        let suffix = format!(" ({})", self.key);
        if self.label.ends_with(&suffix) {
            self.label.clone()
        } else {
            format!("{}{}", self.label, suffix)
        }
    }

    fn standard(column: StandardColumn) -> Self {
        Self {
            key: column.key().to_string(),
            label: column.label().to_string(),
            field_id: column.key().to_string(),
            part: None,
            kind: ColumnKind::Standard(column),
        }
    }

    fn simple(field: &FieldDefinition, label: String, kind: ColumnKind) -> Self {
        Self {
            key: field.id.clone(),
            label,
            field_id: field.id.clone(),
            part: None,
            kind,
        }
    }

    fn part(field: &FieldDefinition, field_label: &str, part_label: &str, part_key: &str) -> Self {
        Self {
            key: compound_key(&field.id, part_key),
            label: format!("{} - {}", field_label, part_label),
            field_id: field.id.clone(),
            part: Some(part_key.to_string()),
            kind: ColumnKind::CompoundPart,
        }
    }
}

/// Column key of a compound part: `{field_id}-{part_key}`.
pub fn compound_key(field_id: &str, part_key: &str) -> String {
    format!("{}-{}", field_id, part_key)
}

/// Flatten field definitions using each field's own label chain.
pub fn flatten(fields: &[FieldDefinition]) -> Vec<FlattenedColumn> {
    flatten_with(fields, FieldDefinition::display_label)
}

/// Flatten field definitions with labels supplied by `label_of`.
///
/// Never fails. Fields without an id and keys that collide with an earlier
/// column are skipped. Field columns sharing a label all get their column key
/// appended, so every header in a sheet is distinct and a label never depends
/// on field order.
pub fn flatten_with<L>(fields: &[FieldDefinition], label_of: L) -> Vec<FlattenedColumn>
where
    L: Fn(&FieldDefinition) -> String,
{
    let mut columns: Vec<FlattenedColumn> = StandardColumn::ALL
        .iter()
        .map(|c| FlattenedColumn::standard(*c))
        .collect();

    for field in fields {
        if field.id.trim().is_empty() {
            tracing::debug!(field_type = %field.field_type, "skipping field without id");
            continue;
        }

        let kind = field.kind();
        let derived = match kind {
            FieldKind::NonData => continue,
            FieldKind::Name => compound_columns(field, &label_of(field), NAME_PARTS),
            FieldKind::Address => compound_columns(field, &label_of(field), ADDRESS_PARTS),
            FieldKind::Time => compound_columns(field, &label_of(field), TIME_PARTS),
            FieldKind::LinkedContent => {
                compound_columns(field, &label_of(field), LINKED_CONTENT_PARTS)
            }
            FieldKind::Repeater => vec![FlattenedColumn::simple(
                field,
                label_of(field),
                ColumnKind::Structured,
            )],
            FieldKind::Simple => vec![FlattenedColumn::simple(
                field,
                label_of(field),
                ColumnKind::Simple,
            )],
        };
        columns.extend(derived);
    }

    dedupe(columns)
}

fn compound_columns(
    field: &FieldDefinition,
    field_label: &str,
    parts: &[PartSpec],
) -> Vec<FlattenedColumn> {
    parts
        .iter()
        .filter(|p| part_enabled(field, p))
        .map(|p| {
            let sub_label = p
                .flag
                .and_then(|flag| field.setting_str(&format!("{}_label", flag)))
                .unwrap_or(p.label);
            FlattenedColumn::part(field, field_label, sub_label, p.key)
        })
        .collect()
}

fn part_enabled(field: &FieldDefinition, part: &PartSpec) -> bool {
    match part.flag {
        Some(flag) => field
            .setting_flag(flag)
            .unwrap_or(part.enabled_by_default),
        None => true,
    }
}

fn dedupe(columns: Vec<FlattenedColumn>) -> Vec<FlattenedColumn> {
    let mut keys = HashSet::with_capacity(columns.len());
    let mut unique = Vec::with_capacity(columns.len());
    for column in columns {
        if !keys.insert(column.key.clone()) {
            tracing::debug!(key = %column.key, "skipping duplicate column key");
            continue;
        }
        unique.push(column);
    }

    // Every field sharing a label is qualified, whatever its position, so a
    // field added ahead of an existing one cannot take over its column.
    let mut counts: HashMap<String, usize> = HashMap::with_capacity(unique.len());
    for column in &unique {
        *counts.entry(column.label.clone()).or_default() += 1;
    }
    for column in unique.iter_mut() {
        if !column.is_standard() && counts.get(&column.label).is_some_and(|n| *n > 1) {
            column.label = column.qualified_label();
        }
    }

    let mut labels = HashSet::with_capacity(unique.len());
    for column in unique.iter_mut() {
        while !labels.insert(column.label.clone()) {
            column.label = format!("{} ({})", column.label, column.key);
        }
    }

    unique
}

/// Header labels of a column list, in order.
pub fn header_row(columns: &[FlattenedColumn]) -> Vec<String> {
    columns.iter().map(|c| c.label.clone()).collect()
}

/// Turn an identifier like `text-area_2` into `Text Area 2`.
pub fn humanize(id: &str) -> String {
    id.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Form as listed by the schema provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDescriptor {
    pub id: FormId,
    pub title: String,
}

impl FormDescriptor {
    pub fn new(id: impl Into<FormId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn keys(columns: &[FlattenedColumn]) -> Vec<&str> {
        columns.iter().map(|c| c.key.as_str()).collect()
    }

    fn field_keys(columns: &[FlattenedColumn]) -> Vec<&str> {
        columns
            .iter()
            .filter(|c| !matches!(c.kind, ColumnKind::Standard(_)))
            .map(|c| c.key.as_str())
            .collect()
    }

    #[test]
    fn standard_columns_come_first() {
        let columns = flatten(&[FieldDefinition::new("text-1", "text")]);
        assert_eq!(
            keys(&columns),
            vec!["_entry_id", "_date", "_time", "_ip_address", "_user_agent", "text-1"]
        );
        assert_eq!(columns[0].label, "Entry ID");
    }

    #[test]
    fn name_field_defaults_to_first_and_last() {
        let fields = vec![FieldDefinition::new("name-1", "name").with_label("Name")];

        let first = flatten(&fields);
        let second = flatten(&fields);

        assert_eq!(field_keys(&first), vec!["name-1-first-name", "name-1-last-name"]);
        assert_eq!(first, second);
        assert_eq!(first[5].label, "Name - First Name");
        assert_eq!(first[5].part.as_deref(), Some("first-name"));
        assert_eq!(first[5].field_id, "name-1");
    }

    #[test]
    fn name_field_honours_flags_and_sub_labels() {
        let field = FieldDefinition::new("name-1", "name")
            .with_label("Name")
            .with_setting("prefix", json!(true))
            .with_setting("mname", json!("true"))
            .with_setting("lname", json!(false))
            .with_setting("fname_label", json!("Given"));

        let columns = flatten(&[field]);

        assert_eq!(
            field_keys(&columns),
            vec!["name-1-prefix", "name-1-first-name", "name-1-middle-name"]
        );
        assert_eq!(columns[6].label, "Name - Given");
    }

    #[test]
    fn address_always_has_six_parts() {
        let plain = FieldDefinition::new("address-1", "address");
        let configured = FieldDefinition::new("address-2", "address")
            .with_setting("city", json!(false))
            .with_setting("zip", json!(false));

        let columns = flatten(&[plain, configured]);
        let address_1: Vec<_> = columns.iter().filter(|c| c.field_id == "address-1").collect();
        let address_2: Vec<_> = columns.iter().filter(|c| c.field_id == "address-2").collect();

        assert_eq!(address_1.len(), 6);
        assert_eq!(address_2.len(), 6);
        assert_eq!(address_1[0].key, "address-1-street-address");
        assert_eq!(address_1[5].key, "address-1-country");
    }

    #[test]
    fn time_and_linked_content_parts() {
        let columns = flatten(&[
            FieldDefinition::new("time-1", "time"),
            FieldDefinition::new("postdata-1", "postdata"),
        ]);

        assert_eq!(
            field_keys(&columns),
            vec![
                "time-1-hours",
                "time-1-minutes",
                "postdata-1-post-title",
                "postdata-1-post-content",
                "postdata-1-post-excerpt",
            ]
        );
    }

    #[test]
    fn repeater_is_one_structured_column() {
        let columns = flatten(&[FieldDefinition::new("group-1", "group").with_label("Guests")]);
        let last = columns.last().unwrap();

        assert_eq!(last.key, "group-1");
        assert_eq!(last.kind, ColumnKind::Structured);
    }

    #[test]
    fn non_data_fields_are_dropped() {
        let types = [
            "section",
            "html",
            "page-break",
            "gdprcheckbox",
            "stripe",
            "paypal",
            "captcha",
        ];
        let fields: Vec<_> = types
            .iter()
            .enumerate()
            .map(|(i, t)| FieldDefinition::new(format!("{}-{}", t, i), *t))
            .collect();

        assert_eq!(flatten(&fields).len(), StandardColumn::ALL.len());
    }

    #[test]
    fn fields_without_id_are_skipped() {
        let columns = flatten(&[
            FieldDefinition::new("  ", "text"),
            FieldDefinition::new("email-1", "email"),
        ]);
        assert_eq!(field_keys(&columns), vec!["email-1"]);
    }

    #[test]
    fn label_falls_back_through_settings_then_id() {
        let explicit = FieldDefinition::new("text-1", "text").with_label("Company");
        let from_settings = FieldDefinition::new("text-2", "text")
            .with_label("  ")
            .with_setting("placeholder", json!("Type here"))
            .with_setting("field_label", json!("Nickname"));
        let from_id = FieldDefinition::new("text_area-3", "textarea");

        assert_eq!(explicit.display_label(), "Company");
        assert_eq!(from_settings.display_label(), "Nickname");
        assert_eq!(from_id.display_label(), "Text Area 3");
    }

    #[test]
    fn duplicate_keys_are_skipped_and_labels_disambiguated() {
        let columns = flatten(&[
            FieldDefinition::new("email-1", "email").with_label("Email"),
            FieldDefinition::new("email-1", "email").with_label("Other"),
            FieldDefinition::new("email-2", "email").with_label("Email"),
        ]);

        assert_eq!(field_keys(&columns), vec!["email-1", "email-2"]);
        assert_eq!(columns[5].label, "Email (email-1)");
        assert_eq!(columns[6].label, "Email (email-2)");
    }

    #[test]
    fn shared_labels_do_not_depend_on_field_order() {
        let a = FieldDefinition::new("email-1", "email").with_label("Email");
        let b = FieldDefinition::new("email-2", "email").with_label("Email");

        let forward = header_row(&flatten(&[a.clone(), b.clone()]));
        let mut backward = header_row(&flatten(&[b, a]));
        backward.swap(5, 6);

        assert_eq!(forward, backward);
    }

    #[test]
    fn field_sharing_a_standard_label_is_qualified() {
        let columns = flatten(&[FieldDefinition::new("text-1", "text").with_label("Date")]);

        assert_eq!(columns[1].label, "Date");
        assert_eq!(columns[5].label, "Date (text-1)");
        assert_eq!(columns[5].qualified_label(), "Date (text-1)");
    }

    #[test]
    fn custom_label_source_is_used() {
        let columns = flatten_with(&[FieldDefinition::new("text-1", "text")], |f| {
            format!("Custom {}", f.id)
        });
        assert_eq!(columns.last().unwrap().label, "Custom text-1");
    }

    #[test]
    fn field_kind_classification() {
        assert_eq!(FieldKind::classify("Name"), FieldKind::Name);
        assert_eq!(FieldKind::classify("repeater"), FieldKind::Repeater);
        assert_eq!(FieldKind::classify("select"), FieldKind::Simple);
        assert_eq!(FieldKind::Address.to_string(), "Address");
    }

    #[test]
    fn definition_serialization() {
        let field: FieldDefinition = serde_json::from_value(json!({
            "id": "name-1",
            "type": "name",
            "label": "Full name",
            "settings": {"mname": true}
        }))
        .unwrap();

        assert_eq!(field.kind(), FieldKind::Name);
        assert_eq!(field.setting_flag("mname"), Some(true));

        let back: FieldDefinition =
            serde_json::from_str(&serde_json::to_string(&field).unwrap()).unwrap();
        assert_eq!(back, field);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_field() -> impl Strategy<Value = FieldDefinition> {
            let types = prop_oneof![
                Just("text"),
                Just("name"),
                Just("address"),
                Just("time"),
                Just("section"),
                Just("checkbox"),
                Just("repeater"),
            ];
            ("[a-c]{1,3}-[1-3]", types, proptest::option::of("[A-C]{1,2}"), any::<bool>())
                .prop_map(|(id, field_type, label, mname)| {
                    let mut field = FieldDefinition::new(id, field_type)
                        .with_setting("mname", json!(mname));
                    field.label = label;
                    field
                })
        }

        proptest! {
            #[test]
            fn prop_flatten_is_deterministic(fields in prop::collection::vec(arb_field(), 0..10)) {
                prop_assert_eq!(flatten(&fields), flatten(&fields));
            }

            #[test]
            fn prop_flatten_keys_and_labels_are_unique(
                fields in prop::collection::vec(arb_field(), 0..10)
            ) {
                let columns = flatten(&fields);
                let keys: HashSet<&str> = columns.iter().map(|c| c.key.as_str()).collect();
                let labels: HashSet<&str> = columns.iter().map(|c| c.label.as_str()).collect();

                prop_assert_eq!(keys.len(), columns.len());
                prop_assert_eq!(labels.len(), columns.len());
                prop_assert_eq!(&columns[0].key, "_entry_id");
            }
        }
    }
}
