//! Purpose: Define the local row model and the single normalization path into it.
//! Exports: `RowId`, `Row`, `RowPatch`, `ColumnNames`, `RawRecord`, `TableColumns`,
//! `normalize_record`, `normalize_records`, `records_from_columns`.
//! Role: Shared by push ingestion and bulk-read refresh so both yield identical rows.
//! Invariants: `name` is always a string and `done` always a bool after normalization.
//! Invariants: Unknown upstream fields are dropped; normalization never fails.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// One record as delivered by the host in row-oriented form.
pub type RawRecord = Map<String, Value>;

/// Column-oriented bulk-read payload: field name to index-aligned values.
pub type TableColumns = BTreeMap<String, Vec<Value>>;

/// Host-assigned row identifier, kept exactly as the host sent it.
///
/// Integers order before tokens. Zero, the empty string, and a missing id all map to
/// `Int(0)`, which is falsy and never targets a row.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowId {
    Int(i64),
    /// Integers above `i64::MAX`.
    Wide(u64),
    Token(String),
}

impl RowId {
    pub fn is_falsy(&self) -> bool {
        match self {
            RowId::Int(id) => *id == 0,
            RowId::Wide(_) => false,
            RowId::Token(token) => token.is_empty(),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => RowId::default(),
            Value::Number(num) => {
                if let Some(id) = num.as_i64() {
                    RowId::Int(id)
                } else if let Some(id) = num.as_u64() {
                    RowId::Wide(id)
                } else {
                    match num.as_f64() {
                        Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                            RowId::Int(v as i64)
                        }
                        _ => RowId::Token(num.to_string()),
                    }
                }
            }
            Value::String(text) if text.is_empty() => RowId::default(),
            Value::String(text) => RowId::Token(text.clone()),
            other => RowId::Token(other.to_string()),
        }
    }

    /// Wire form: integers stay numbers, tokens stay strings.
    pub fn to_value(&self) -> Value {
        match self {
            RowId::Int(id) => Value::from(*id),
            RowId::Wide(id) => Value::from(*id),
            RowId::Token(token) => Value::from(token.clone()),
        }
    }

    /// Parse user input: decimal integers become numeric ids, anything else a token.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            RowId::default()
        } else if let Ok(id) = text.parse::<i64>() {
            RowId::Int(id)
        } else if let Ok(id) = text.parse::<u64>() {
            RowId::Wide(id)
        } else {
            RowId::Token(text.to_string())
        }
    }
}

impl Default for RowId {
    fn default() -> Self {
        RowId::Int(0)
    }
}

impl From<i64> for RowId {
    fn from(value: i64) -> Self {
        RowId::Int(value)
    }
}

impl From<&str> for RowId {
    fn from(value: &str) -> Self {
        RowId::from(value.to_string())
    }
}

impl From<String> for RowId {
    fn from(value: String) -> Self {
        if value.is_empty() {
            RowId::default()
        } else {
            RowId::Token(value)
        }
    }
}

impl FromStr for RowId {
    type Err = Infallible;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(RowId::parse(text))
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Int(id) => write!(f, "{id}"),
            RowId::Wide(id) => write!(f, "{id}"),
            RowId::Token(token) => f.write_str(token),
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub name: String,
    pub done: bool,
    pub created_at: Option<String>,
}

impl Row {
    /// Every field except `id`, keyed by the upstream column names.
    pub fn to_fields(&self, columns: &ColumnNames) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(columns.name.clone(), Value::from(self.name.clone()));
        fields.insert(columns.done.clone(), Value::from(self.done));
        fields.insert(
            columns.created_at.clone(),
            self.created_at.clone().map(Value::from).unwrap_or(Value::Null),
        );
        fields
    }
}

/// Partial field set for an update. `created_at: Some(None)` clears the timestamp.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RowPatch {
    pub name: Option<String>,
    pub done: Option<bool>,
    pub created_at: Option<Option<String>>,
}

impl RowPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn done(mut self, done: bool) -> Self {
        self.done = Some(done);
        self
    }

    pub fn created_at(mut self, created_at: Option<String>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.done.is_none() && self.created_at.is_none()
    }

    /// Exactly the fields present in the patch, keyed by upstream column names.
    pub fn to_fields(&self, columns: &ColumnNames) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(name) = &self.name {
            fields.insert(columns.name.clone(), Value::from(name.clone()));
        }
        if let Some(done) = self.done {
            fields.insert(columns.done.clone(), Value::from(done));
        }
        if let Some(created_at) = &self.created_at {
            fields.insert(
                columns.created_at.clone(),
                created_at.clone().map(Value::from).unwrap_or(Value::Null),
            );
        }
        fields
    }

    pub fn apply_to(&self, row: &mut Row) {
        if let Some(name) = &self.name {
            row.name = name.clone();
        }
        if let Some(done) = self.done {
            row.done = done;
        }
        if let Some(created_at) = &self.created_at {
            row.created_at = created_at.clone();
        }
    }
}

/// Upstream column names, plus the alternate spellings accepted on ingestion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnNames {
    pub id: String,
    pub name: String,
    pub done: String,
    pub created_at: String,
    pub name_alias: String,
    pub done_alias: String,
    pub created_at_alias: String,
}

impl ColumnNames {
    pub fn new() -> Self {
        Self {
            id: "id".to_string(),
            name: "Name".to_string(),
            done: "Done".to_string(),
            created_at: "CreatedAt".to_string(),
            name_alias: "name".to_string(),
            done_alias: "done".to_string(),
            created_at_alias: "created_at".to_string(),
        }
    }
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self::new()
    }
}

pub fn normalize_record(record: &RawRecord, columns: &ColumnNames) -> Row {
    let id = record
        .get(&columns.id)
        .map(RowId::from_value)
        .unwrap_or_default();
    let name = first_present(record, &columns.name, &columns.name_alias)
        .map(text_of)
        .unwrap_or_default();
    let done = first_present(record, &columns.done, &columns.done_alias)
        .map(is_truthy)
        .unwrap_or(false);
    let created_at = first_present(record, &columns.created_at, &columns.created_at_alias)
        .and_then(timestamp_of);
    Row {
        id,
        name,
        done,
        created_at,
    }
}

pub fn normalize_records(records: &[RawRecord], columns: &ColumnNames) -> Vec<Row> {
    records
        .iter()
        .map(|record| normalize_record(record, columns))
        .collect()
}

/// Reshape column-oriented data into row-oriented records, driven by the id column.
/// Short columns yield nulls for the missing positions.
pub fn records_from_columns(table: &TableColumns, columns: &ColumnNames) -> Vec<RawRecord> {
    let Some(ids) = table.get(&columns.id) else {
        return Vec::new();
    };
    (0..ids.len())
        .map(|index| {
            table
                .iter()
                .map(|(field, values)| {
                    let value = values.get(index).cloned().unwrap_or(Value::Null);
                    (field.clone(), value)
                })
                .collect::<RawRecord>()
        })
        .collect()
}

fn first_present<'a>(record: &'a RawRecord, primary: &str, alias: &str) -> Option<&'a Value> {
    record
        .get(primary)
        .filter(|value| !value.is_null())
        .or_else(|| record.get(alias).filter(|value| !value.is_null()))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(num) => num.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// Numeric timestamps are epoch seconds, as date columns arrive from the host.
fn timestamp_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(num) => {
            let nanos = (num.as_f64()? * 1_000_000_000.0) as i128;
            OffsetDateTime::from_unix_timestamp_nanos(nanos)
                .ok()?
                .format(&Rfc3339)
                .ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ColumnNames, RawRecord, Row, RowId, RowPatch, TableColumns, normalize_record,
        normalize_records, records_from_columns,
    };
    use serde_json::{Value, json};

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn missing_fields_default_to_empty_name_and_not_done() {
        let row = normalize_record(&record(json!({"id": 4})), &ColumnNames::new());
        assert_eq!(
            row,
            Row {
                id: RowId::Int(4),
                name: String::new(),
                done: false,
                created_at: None,
            }
        );
    }

    #[test]
    fn aliases_fill_in_when_primary_is_null_or_absent() {
        let columns = ColumnNames::new();
        let row = normalize_record(
            &record(json!({
                "id": 1,
                "Name": null,
                "name": "lower",
                "done": 1,
                "created_at": "2026-01-02T03:04:05Z",
                "Extra": "dropped"
            })),
            &columns,
        );
        assert_eq!(row.name, "lower");
        assert!(row.done);
        assert_eq!(row.created_at.as_deref(), Some("2026-01-02T03:04:05Z"));
    }

    #[test]
    fn primary_column_wins_over_alias() {
        let row = normalize_record(
            &record(json!({"id": 1, "Name": "Primary", "name": "alias", "Done": false, "done": true})),
            &ColumnNames::new(),
        );
        assert_eq!(row.name, "Primary");
        assert!(!row.done);
    }

    #[test]
    fn done_follows_truthiness() {
        let columns = ColumnNames::new();
        let cases = [
            (json!(0), false),
            (json!(""), false),
            (json!("no"), true),
            (json!(2.5), true),
            (json!([]), true),
            (json!(null), false),
        ];
        for (value, expected) in cases {
            let row = normalize_record(&record(json!({"id": 1, "Done": value})), &columns);
            assert_eq!(row.done, expected);
        }
    }

    #[test]
    fn non_string_names_are_stringified() {
        let row = normalize_record(&record(json!({"id": 1, "Name": 42})), &ColumnNames::new());
        assert_eq!(row.name, "42");
    }

    #[test]
    fn numeric_created_at_is_epoch_seconds() {
        let row = normalize_record(
            &record(json!({"id": 1, "CreatedAt": 0})),
            &ColumnNames::new(),
        );
        assert_eq!(row.created_at.as_deref(), Some("1970-01-01T00:00:00Z"));
    }

    #[test]
    fn ids_keep_their_upstream_identity() {
        assert_eq!(RowId::from_value(&json!(3.0)), RowId::Int(3));
        assert_eq!(RowId::from_value(&json!("12")), RowId::Token("12".to_string()));
        assert_eq!(
            RowId::from_value(&json!(9_223_372_036_854_775_808u64)),
            RowId::Wide(9_223_372_036_854_775_808)
        );
        assert_ne!(
            RowId::from_value(&json!(u64::MAX)),
            RowId::from_value(&json!(9_223_372_036_854_775_808u64))
        );
        assert_eq!(RowId::from_value(&json!(u64::MAX)).to_value(), json!(u64::MAX));
    }

    #[test]
    fn token_ids_stay_distinct_and_truthy() {
        let columns = ColumnNames::new();
        let rows = normalize_records(
            &[
                record(json!({"id": "rec_a", "Name": "x"})),
                record(json!({"id": "rec_b", "Name": "y"})),
            ],
            &columns,
        );
        assert_ne!(rows[0].id, rows[1].id);
        assert!(!rows[0].id.is_falsy());
        assert_eq!(rows[0].id.to_value(), json!("rec_a"));
    }

    #[test]
    fn only_zero_empty_and_missing_ids_are_falsy() {
        assert!(RowId::from_value(&json!(null)).is_falsy());
        assert!(RowId::from_value(&json!(0)).is_falsy());
        assert!(RowId::from_value(&json!("")).is_falsy());
        assert!(normalize_record(&record(json!({"Name": "x"})), &ColumnNames::new()).id.is_falsy());
        assert!(!RowId::from_value(&json!("0")).is_falsy());
        assert!(!RowId::from_value(&json!(-1)).is_falsy());
    }

    #[test]
    fn integers_order_before_tokens() {
        let mut ids = vec![
            RowId::Token("a".to_string()),
            RowId::Wide(u64::MAX),
            RowId::Int(2),
            RowId::Int(-1),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                RowId::Int(-1),
                RowId::Int(2),
                RowId::Wide(u64::MAX),
                RowId::Token("a".to_string()),
            ]
        );
    }

    #[test]
    fn parsed_input_prefers_integers() {
        assert_eq!(RowId::parse("42"), RowId::Int(42));
        assert_eq!(RowId::parse("18446744073709551615"), RowId::Wide(u64::MAX));
        assert_eq!(RowId::parse("rec_a"), RowId::Token("rec_a".to_string()));
    }

    #[test]
    fn column_reshape_matches_push_normalization() {
        let columns = ColumnNames::new();
        let mut table = TableColumns::new();
        table.insert("id".to_string(), vec![json!(1), json!(2)]);
        table.insert("Name".to_string(), vec![json!("B"), json!(null)]);
        table.insert("Done".to_string(), vec![json!(true)]);

        let pulled = normalize_records(&records_from_columns(&table, &columns), &columns);
        let pushed = normalize_records(
            &[
                record(json!({"id": 1, "Name": "B", "Done": true})),
                record(json!({"id": 2})),
            ],
            &columns,
        );
        assert_eq!(pulled, pushed);
    }

    #[test]
    fn reshape_without_id_column_is_empty() {
        let mut table = TableColumns::new();
        table.insert("Name".to_string(), vec![json!("x")]);
        assert!(records_from_columns(&table, &ColumnNames::new()).is_empty());
    }

    #[test]
    fn patch_fields_contain_only_present_keys() {
        let columns = ColumnNames::new();
        let fields = RowPatch::new().done(true).to_fields(&columns);
        assert_eq!(Value::Object(fields), json!({"Done": true}));

        let mut row = Row {
            id: RowId::Int(1),
            name: "keep".to_string(),
            done: false,
            created_at: Some("t".to_string()),
        };
        RowPatch::new().done(true).created_at(None).apply_to(&mut row);
        assert_eq!(row.name, "keep");
        assert!(row.done);
        assert_eq!(row.created_at, None);
    }
}
