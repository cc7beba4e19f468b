//! Resolving submitted values into sheet cells.
//!
//! Submission payloads are not consistent about shape: a name part may arrive
//! under its own column key (`name-1-first-name`) or nested inside the owning
//! field (`{"name-1": {"first_name": "John"}}`). Resolution tries, in order:
//!
//! 1. the column key itself;
//! 2. the [`COMPOUND_RULES`] table: when the key ends in a known part suffix,
//!    the remaining prefix is taken as the owning field id and the part is
//!    looked up inside that field's nested object;
//! 3. nothing found: an empty cell.
//!
//! A missing value and an empty answer both resolve to `""`. Resolution never
//! fails.

use crate::schema::{ColumnKind, FlattenedColumn, StandardColumn};
use crate::{FieldId, SubmissionRecord};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::LazyLock;

/// Option code → display label for one choice field.
pub type OptionLabels = HashMap<String, String>;

/// Option tables of a form, keyed by field id.
pub type OptionsMap = HashMap<FieldId, OptionLabels>;

/// How a part is found inside the owning field's nested object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubKeyLookup {
    /// The part key, spelled with hyphens and with underscores
    Spellings,
    /// As [`SubKeyLookup::Spellings`], then each alias under both spellings
    WithAliases(&'static [&'static str]),
}

/// One entry of the compound-key matching table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompoundRule {
    /// Part suffix of a column key, without the joining hyphen
    pub suffix: &'static str,
    pub lookup: SubKeyLookup,
}

const fn rule(suffix: &'static str) -> CompoundRule {
    CompoundRule {
        suffix,
        lookup: SubKeyLookup::Spellings,
    }
}

const fn aliased(suffix: &'static str, aliases: &'static [&'static str]) -> CompoundRule {
    CompoundRule {
        suffix,
        lookup: SubKeyLookup::WithAliases(aliases),
    }
}

/// Known compound part suffixes, tried in order. Supporting a new compound
/// field type means adding its parts here.
pub const COMPOUND_RULES: &[CompoundRule] = &[
    rule("first-name"),
    rule("last-name"),
    rule("middle-name"),
    rule("prefix"),
    rule("street-address"),
    aliased("address-line", &["address-line-2", "address-line2"]),
    rule("city"),
    aliased("state", &["province", "region"]),
    aliased("zip", &["postal-code", "postcode"]),
    rule("country"),
    aliased("hours", &["hour"]),
    aliased("minutes", &["minute"]),
    aliased("post-title", &["title"]),
    aliased("post-content", &["content"]),
    aliased("post-excerpt", &["excerpt"]),
];

impl CompoundRule {
    /// Owning field id of `key`, if `key` is `{base}-{suffix}`.
    pub fn base_of<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_suffix(self.suffix)?
            .strip_suffix('-')
            .filter(|base| !base.is_empty())
    }

    /// Keys to try inside the nested object, in order.
    pub fn candidates(&self) -> Vec<String> {
        let aliases: &[&str] = match self.lookup {
            SubKeyLookup::Spellings => &[],
            SubKeyLookup::WithAliases(aliases) => aliases,
        };

        let mut keys: Vec<String> = Vec::with_capacity(2 + aliases.len() * 2);
        for name in std::iter::once(&self.suffix).chain(aliases.iter()) {
            for spelling in [name.replace('_', "-"), name.replace('-', "_")] {
                if !keys.contains(&spelling) {
                    keys.push(spelling);
                }
            }
        }
        keys
    }

    fn find<'v>(&self, nested: &'v Map<String, Value>) -> Option<&'v Value> {
        self.candidates().iter().find_map(|k| nested.get(k))
    }
}

/// Find the raw value of a column key. Returns the field id the value belongs
/// to (used for option translation) along with the value.
pub fn lookup<'k, 'v>(
    key: &'k str,
    values: &'v Map<String, Value>,
) -> Option<(&'k str, &'v Value)> {
    if let Some(value) = values.get(key) {
        return Some((key, value));
    }

    COMPOUND_RULES.iter().find_map(|rule| {
        let base = rule.base_of(key)?;
        let nested = values.get(base)?.as_object()?;
        rule.find(nested).map(|value| (base, value))
    })
}

/// Resolves column values of submissions.
#[derive(Debug, Clone)]
pub struct ValueResolver<'a> {
    options: &'a OptionsMap,
    date_format: &'a str,
    time_format: &'a str,
}

impl<'a> ValueResolver<'a> {
    /// Create a resolver using the given option tables.
    pub fn new(options: &'a OptionsMap) -> Self {
        Self {
            options,
            date_format: "%Y-%m-%d",
            time_format: "%H:%M:%S",
        }
    }

    /// Builder-style method to set the chrono formats of the Date and Time
    /// standard columns.
    pub fn with_formats(mut self, date_format: &'a str, time_format: &'a str) -> Self {
        self.date_format = date_format;
        self.time_format = time_format;
        self
    }

    /// Resolve one column key against a value map.
    pub fn resolve(&self, key: &str, values: &Map<String, Value>) -> String {
        match lookup(key, values) {
            Some((field_id, raw)) => format_value(&self.translate(field_id, raw)),
            None => String::new(),
        }
    }

    /// Resolve one column of a submission, including standard columns.
    pub fn resolve_column(&self, column: &FlattenedColumn, record: &SubmissionRecord) -> String {
        match column.kind {
            ColumnKind::Standard(standard) => self.standard_value(standard, record),
            ColumnKind::Structured => match lookup(&column.key, &record.values) {
                Some((field_id, raw)) => format_structured(&self.translate(field_id, raw)),
                None => String::new(),
            },
            ColumnKind::Simple | ColumnKind::CompoundPart => {
                self.resolve(&column.key, &record.values)
            }
        }
    }

    /// Resolve every column of a submission, in column order.
    pub fn resolve_row(
        &self,
        columns: &[FlattenedColumn],
        record: &SubmissionRecord,
    ) -> Vec<String> {
        columns
            .iter()
            .map(|column| self.resolve_column(column, record))
            .collect()
    }

    fn standard_value(&self, column: StandardColumn, record: &SubmissionRecord) -> String {
        match column {
            StandardColumn::EntryId => record.id.clone(),
            StandardColumn::Date => format_timestamp(&record.submitted_at, self.date_format),
            StandardColumn::Time => format_timestamp(&record.submitted_at, self.time_format),
            StandardColumn::IpAddress => record.meta.ip_address.clone().unwrap_or_default(),
            StandardColumn::UserAgent => record.meta.user_agent.clone().unwrap_or_default(),
        }
    }

    /// Replace option codes with their labels. Unmapped codes pass through.
    fn translate<'v>(&self, field_id: &str, raw: &'v Value) -> Cow<'v, Value> {
        let Some(labels) = self.options.get(field_id).filter(|l| !l.is_empty()) else {
            return Cow::Borrowed(raw);
        };

        match raw {
            Value::Array(items) => Cow::Owned(Value::Array(
                items.iter().map(|item| translate_code(labels, item)).collect(),
            )),
            other => Cow::Owned(translate_code(labels, other)),
        }
    }
}

fn translate_code(labels: &OptionLabels, value: &Value) -> Value {
    let code = match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        _ => return value.clone(),
    };

    match labels.get(code.as_ref()) {
        Some(label) => Value::String(label.clone()),
        None => value.clone(),
    }
}

fn format_timestamp(at: &DateTime<Utc>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", at.format(format)).is_err() {
        tracing::debug!(format, "invalid timestamp format");
        out.clear();
    }
    out
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Render a raw value as cell text.
///
/// Scalars are cleaned of markup and entities. A list of scalars becomes a
/// comma-joined string with null and empty elements dropped; a list holding
/// any nested value, and any object, becomes compact JSON so nothing is lost.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Array(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(format_scalar)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Array(_) | Value::Object(_) => to_json(value),
        scalar => format_scalar(scalar),
    }
}

/// Render a repeating-group value: any list or object is JSON.
pub fn format_structured(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Object(_) => to_json(value),
        scalar => format_scalar(scalar),
    }
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => clean_text(s),
        other => to_json(other),
    }
}

fn to_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Markup stripper that keeps no tags at all. Script and style bodies are
/// dropped with their tags.
static MARKUP: LazyLock<ammonia::Builder<'static>> = LazyLock::new(|| {
    let mut builder = ammonia::Builder::empty();
    builder.clean_content_tags(HashSet::from(["script", "style"]));
    builder
});

/// Strip markup, decode entities and trim.
///
/// The cleaner re-escapes text on output, so the entity decode runs exactly
/// once over what was submitted: `&amp;lt;` comes out as `&lt;`.
pub fn clean_text(input: &str) -> String {
    if !input.contains(['<', '&']) {
        return input.trim().to_string();
    }

    let stripped = MARKUP.clean(input).to_string();
    html_escape::decode_html_entities(&stripped)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{flatten, FieldDefinition};
    use crate::SubmissionMeta;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn values(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn no_options() -> OptionsMap {
        OptionsMap::new()
    }

    #[test]
    fn exact_key_wins() {
        let options = no_options();
        let resolver = ValueResolver::new(&options);
        let map = values(json!({"email-1": "jane@example.com"}));

        assert_eq!(resolver.resolve("email-1", &map), "jane@example.com");
    }

    #[test]
    fn nested_compound_part_is_found() {
        let options = no_options();
        let resolver = ValueResolver::new(&options);
        let map = values(json!({"name-1": {"first-name": "John"}}));

        assert_eq!(resolver.resolve("name-1-first-name", &map), "John");
    }

    #[test]
    fn nested_part_with_underscore_spelling() {
        let options = no_options();
        let resolver = ValueResolver::new(&options);
        let map = values(json!({
            "address-1": {"street_address": "1 Main St", "zip": "12345"},
            "name-2": {"last_name": "Doe"}
        }));

        assert_eq!(resolver.resolve("address-1-street-address", &map), "1 Main St");
        assert_eq!(resolver.resolve("address-1-zip", &map), "12345");
        assert_eq!(resolver.resolve("name-2-last-name", &map), "Doe");
    }

    #[test]
    fn nested_part_via_alias() {
        let options = no_options();
        let resolver = ValueResolver::new(&options);
        let map = values(json!({"time-1": {"hour": 9, "minute": "05"}}));

        assert_eq!(resolver.resolve("time-1-hours", &map), "9");
        assert_eq!(resolver.resolve("time-1-minutes", &map), "05");
    }

    #[test]
    fn base_that_is_not_an_object_resolves_empty() {
        let options = no_options();
        let resolver = ValueResolver::new(&options);
        let map = values(json!({"name-1": "John Doe"}));

        assert_eq!(resolver.resolve("name-1-first-name", &map), "");
    }

    #[test]
    fn missing_data_is_an_empty_string() {
        let options = no_options();
        let resolver = ValueResolver::new(&options);
        let map = values(json!({"other": "x"}));

        assert_eq!(resolver.resolve("text-1", &map), "");
        assert_eq!(resolver.resolve("name-1-first-name", &map), "");
        assert_eq!(resolver.resolve("-city", &map), "");
    }

    #[test]
    fn scalar_list_is_comma_joined() {
        assert_eq!(format_value(&json!(["red", "blue"])), "red, blue");
        assert_eq!(format_value(&json!(["red", null, "", 3])), "red, 3");
    }

    #[test]
    fn nested_list_is_json() {
        let formatted = format_value(&json!([{"street": "1 Main St", "city": "Springfield"}]));
        let parsed: Value = serde_json::from_str(&formatted).unwrap();

        assert_eq!(parsed[0]["street"], "1 Main St");
        assert_eq!(parsed[0]["city"], "Springfield");
    }

    #[test]
    fn object_is_json() {
        let formatted = format_value(&json!({"street": "1 Main St", "city": "Springfield"}));
        let parsed: Value = serde_json::from_str(&formatted).unwrap();

        assert_eq!(parsed, json!({"street": "1 Main St", "city": "Springfield"}));
        assert!(!formatted.contains('\n'));
    }

    #[test]
    fn option_codes_become_labels() {
        let mut options = OptionsMap::new();
        options.insert(
            "select-1".into(),
            [("a", "Easy"), ("b", "Hard")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        let resolver = ValueResolver::new(&options);

        assert_eq!(resolver.resolve("select-1", &values(json!({"select-1": "a"}))), "Easy");
        assert_eq!(resolver.resolve("select-1", &values(json!({"select-1": "z"}))), "z");
        assert_eq!(
            resolver.resolve("select-1", &values(json!({"select-1": ["a", "b", "z"]}))),
            "Easy, Hard, z"
        );
    }

    #[test]
    fn numeric_option_codes_are_translated() {
        let mut options = OptionsMap::new();
        options.insert(
            "rating".into(),
            [("1".to_string(), "Poor".to_string())].into_iter().collect(),
        );
        let resolver = ValueResolver::new(&options);

        assert_eq!(resolver.resolve("rating", &values(json!({"rating": 1}))), "Poor");
    }

    #[test]
    fn markup_is_stripped_and_entities_decoded() {
        assert_eq!(clean_text("<p>Tom &amp; Jerry</p>"), "Tom & Jerry");
        assert_eq!(clean_text("  a < b &lt;3 "), "a < b <3");
        assert_eq!(clean_text("caf&#233; &#x2713;"), "caf\u{e9} \u{2713}");
        assert_eq!(clean_text("&eacute;t&eacute; &hearts;"), "\u{e9}t\u{e9} \u{2665}");
        assert_eq!(clean_text("AT&T; &unknown;"), "AT&T; &unknown;");
        assert_eq!(clean_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn script_and_style_bodies_are_dropped() {
        assert_eq!(clean_text("<script>alert(1)</script>Hi"), "Hi");
        assert_eq!(clean_text("<style>p { color: red }</style><b>Bold</b>"), "Bold");
        assert_eq!(clean_text("  plain text  "), "plain text");
    }

    #[test]
    fn compound_rule_candidates() {
        let zip = COMPOUND_RULES.iter().find(|r| r.suffix == "zip").unwrap();
        assert_eq!(
            zip.candidates(),
            vec!["zip", "postal-code", "postal_code", "postcode"]
        );
        assert_eq!(zip.base_of("address-1-zip"), Some("address-1"));
        assert_eq!(zip.base_of("zip"), None);
    }

    #[test]
    fn full_row_with_standard_columns() {
        let fields = vec![
            FieldDefinition::new("name-1", "name"),
            FieldDefinition::new("checkbox-1", "checkbox"),
            FieldDefinition::new("group-1", "group"),
        ];
        let columns = flatten(&fields);
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 14, 3, 9).unwrap();
        let record = SubmissionRecord::with_values(
            "101",
            at,
            json!({
                "name-1": {"first-name": "Ada", "last_name": "Lovelace"},
                "checkbox-1": ["one", "two"],
                "group-1": ["x", "y"]
            }),
        )
        .with_meta(SubmissionMeta {
            ip_address: Some("10.0.0.1".into()),
            user_agent: None,
        });

        let options = no_options();
        let row = ValueResolver::new(&options).resolve_row(&columns, &record);

        assert_eq!(
            row,
            vec![
                "101",
                "2024-05-17",
                "14:03:09",
                "10.0.0.1",
                "",
                "Ada",
                "Lovelace",
                "one, two",
                r#"["x","y"]"#,
            ]
        );
    }

    #[test]
    fn custom_and_invalid_timestamp_formats() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 14, 3, 9).unwrap();
        let record = SubmissionRecord::new("1", at);
        let columns = flatten(&[]);
        let options = no_options();

        let row = ValueResolver::new(&options)
            .with_formats("%d/%m/%Y", "%Q")
            .resolve_row(&columns, &record);

        assert_eq!(row[1], "17/05/2024");
        assert_eq!(row[2], "");
    }
}
