//! Purpose: Provide an in-process host that stores tables as columns and applies user actions.
//! Exports: `MemoryHost`.
//! Role: Host adapter for the CLI (backed by a table file) and for tests.
//! Invariants: A batch applies atomically; any failing action leaves every table unchanged.
//! Invariants: New ids are `max(integer id) + 1`; token ids are kept but never generated.
//! Invariants: Every submitted batch, fetch, and cursor move is recorded, including failed ones.
#![allow(clippy::result_large_err)]

use super::host::DocHost;
use crate::core::action::UserAction;
use crate::core::error::{Error, ErrorKind};
use crate::core::row::{ColumnNames, RawRecord, RowId, TableColumns, records_from_columns};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug)]
pub struct MemoryHost {
    columns: ColumnNames,
    inner: Mutex<MemoryState>,
}

#[derive(Debug)]
struct MemoryState {
    tables: BTreeMap<String, TableColumns>,
    bulk_supported: bool,
    fail_next: usize,
    fail_next_fetch: usize,
    submitted: Vec<Vec<UserAction>>,
    cursor_moves: Vec<RowId>,
    fetches: usize,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            columns: ColumnNames::new(),
            inner: Mutex::new(MemoryState {
                tables: BTreeMap::new(),
                bulk_supported: true,
                fail_next: 0,
                fail_next_fetch: 0,
                submitted: Vec::new(),
                cursor_moves: Vec::new(),
                fetches: 0,
            }),
        }
    }

    /// Column names used to locate ids; set before adding tables.
    pub fn with_columns(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }

    /// Install a table. Short columns are padded with nulls; nothing is truncated.
    pub fn with_table(self, table_id: impl Into<String>, columns: TableColumns) -> Self {
        let mut columns = columns;
        columns.entry(self.columns.id.clone()).or_default();
        pad_columns(&mut columns);
        self.state().tables.insert(table_id.into(), columns);
        self
    }

    /// Build a table from row-oriented records; each record should carry an id.
    pub fn with_records(self, table_id: impl Into<String>, records: &[RawRecord]) -> Self {
        let mut columns = TableColumns::new();
        columns.insert(self.columns.id.clone(), Vec::new());
        for (index, record) in records.iter().enumerate() {
            for (field, value) in record {
                let column = columns.entry(field.clone()).or_default();
                column.resize(index, Value::Null);
                column.push(value.clone());
            }
            for column in columns.values_mut() {
                column.resize(index + 1, Value::Null);
            }
        }
        self.with_table(table_id, columns)
    }

    pub fn with_bulk_support(self, supported: bool) -> Self {
        self.state().bulk_supported = supported;
        self
    }

    /// Reject the next `count` submissions with `ErrorKind::Rejected`.
    pub fn fail_next(&self, count: usize) {
        self.state().fail_next = count;
    }

    /// Fail the next `count` table reads with `ErrorKind::Io`.
    pub fn fail_next_fetch(&self, count: usize) {
        self.state().fail_next_fetch = count;
    }

    pub fn table(&self, table_id: &str) -> Option<TableColumns> {
        self.state().tables.get(table_id).cloned()
    }

    /// Row-oriented view of a table, in the shape of a push snapshot.
    pub fn records(&self, table_id: &str) -> Vec<RawRecord> {
        self.table(table_id)
            .map(|columns| records_from_columns(&columns, &self.columns))
            .unwrap_or_default()
    }

    pub fn submitted(&self) -> Vec<Vec<UserAction>> {
        self.state().submitted.clone()
    }

    pub fn cursor_moves(&self) -> Vec<RowId> {
        self.state().cursor_moves.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state().fetches
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocHost for MemoryHost {
    async fn fetch_table(&self, table_id: &str) -> Result<TableColumns, Error> {
        let mut state = self.state();
        state.fetches += 1;
        if state.fail_next_fetch > 0 {
            state.fail_next_fetch -= 1;
            return Err(Error::new(ErrorKind::Io)
                .with_message("table read failed")
                .with_table(table_id));
        }
        state.tables.get(table_id).cloned().ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("unknown table")
                .with_table(table_id)
        })
    }

    async fn apply_user_actions(&self, actions: Vec<UserAction>) -> Result<(), Error> {
        let mut state = self.state();
        state.submitted.push(actions.clone());
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(Error::new(ErrorKind::Rejected).with_message("request rejected by host"));
        }

        let id_column = self.columns.id.as_str();
        let mut staged = state.tables.clone();
        for action in &actions {
            if matches!(action, UserAction::BulkUpdateRecord { .. }) && !state.bulk_supported {
                return Err(Error::new(ErrorKind::Unsupported)
                    .with_message("BulkUpdateRecord is not supported")
                    .with_table(action.table()));
            }
            let table = staged.get_mut(action.table()).ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message("unknown table")
                    .with_table(action.table())
            })?;
            apply_action(table, id_column, action)
                .map_err(|err| err.with_table(action.table()))?;
        }
        debug!(actions = actions.len(), "applied user actions");
        state.tables = staged;
        Ok(())
    }

    fn set_cursor_pos(&self, row_id: RowId) {
        self.state().cursor_moves.push(row_id);
    }
}

fn apply_action(
    table: &mut TableColumns,
    id_column: &str,
    action: &UserAction,
) -> Result<(), Error> {
    match action {
        UserAction::AddRecord { fields, .. } => {
            let id = next_id(table, id_column)?;
            let mut fields = fields.clone();
            fields.insert(id_column.to_string(), id.to_value());
            append_row(table, id_column, &fields);
        }
        UserAction::UpdateRecord { id, fields, .. } => {
            let index = row_index(table, id_column, id)?;
            set_fields(table, id_column, index, fields);
        }
        UserAction::BulkUpdateRecord { ids, fields, .. } => {
            for id in ids {
                let index = row_index(table, id_column, id)?;
                set_fields(table, id_column, index, fields);
            }
        }
        UserAction::RemoveRecord { id, .. } => {
            let index = row_index(table, id_column, id)?;
            for column in table.values_mut() {
                if index < column.len() {
                    column.remove(index);
                }
            }
        }
    }
    Ok(())
}

fn next_id(table: &TableColumns, id_column: &str) -> Result<RowId, Error> {
    let max = table
        .get(id_column)
        .into_iter()
        .flatten()
        .filter_map(|value| match RowId::from_value(value) {
            RowId::Int(id) => Some(i128::from(id)),
            RowId::Wide(id) => Some(i128::from(id)),
            RowId::Token(_) => None,
        })
        .max()
        .unwrap_or(0);
    let next = max.max(0) + 1;
    if let Ok(id) = i64::try_from(next) {
        return Ok(RowId::Int(id));
    }
    u64::try_from(next).map(RowId::Wide).map_err(|_| {
        Error::new(ErrorKind::Rejected).with_message("no integer ids left to assign")
    })
}

fn row_index(table: &TableColumns, id_column: &str, id: &RowId) -> Result<usize, Error> {
    table
        .get(id_column)
        .filter(|_| !id.is_falsy())
        .and_then(|ids| ids.iter().position(|value| RowId::from_value(value) == *id))
        .ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("unknown row")
                .with_row(id.clone())
        })
}

fn row_count(table: &TableColumns, id_column: &str) -> usize {
    table.get(id_column).map(Vec::len).unwrap_or(0)
}

fn append_row(table: &mut TableColumns, id_column: &str, fields: &Map<String, Value>) {
    let len = row_count(table, id_column);
    for (field, value) in fields {
        let column = table.entry(field.clone()).or_default();
        column.resize(len, Value::Null);
        column.push(value.clone());
    }
    for column in table.values_mut() {
        column.resize(len + 1, Value::Null);
    }
}

fn set_fields(
    table: &mut TableColumns,
    id_column: &str,
    index: usize,
    fields: &Map<String, Value>,
) {
    let len = row_count(table, id_column);
    for (field, value) in fields {
        if field == id_column {
            continue;
        }
        let column = table.entry(field.clone()).or_default();
        if column.len() < len {
            column.resize(len, Value::Null);
        }
        column[index] = value.clone();
    }
}

// Pads every column, the id column included, to the longest one.
fn pad_columns(table: &mut TableColumns) {
    let len = table.values().map(Vec::len).max().unwrap_or(0);
    for column in table.values_mut() {
        column.resize(len, Value::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryHost;
    use crate::api::host::DocHost;
    use crate::core::action::UserAction;
    use crate::core::error::ErrorKind;
    use crate::core::row::{ColumnNames, RawRecord, RowId, TableColumns};
    use serde_json::{Map, Value, json};

    fn records(value: Value) -> Vec<RawRecord> {
        serde_json::from_value(value).expect("records")
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn add_assigns_next_id_and_backfills_columns() {
        let host = MemoryHost::new().with_records(
            "Tasks",
            &records(json!([{"id": 1, "Name": "a"}, {"id": 4, "Name": "b", "Done": true}])),
        );
        host.apply_user_actions(vec![UserAction::AddRecord {
            table: "Tasks".to_string(),
            fields: fields(json!({"Name": "c", "CreatedAt": "t"})),
        }])
        .await
        .expect("add");

        let table = host.table("Tasks").expect("table");
        assert_eq!(table["id"], vec![json!(1), json!(4), json!(5)]);
        assert_eq!(table["Done"], vec![json!(null), json!(true), json!(null)]);
        assert_eq!(table["CreatedAt"], vec![json!(null), json!(null), json!("t")]);
    }

    #[tokio::test]
    async fn failing_batch_leaves_table_untouched() {
        let host = MemoryHost::new().with_records("Tasks", &records(json!([{"id": 1, "Done": false}])));
        let err = host
            .apply_user_actions(vec![
                UserAction::UpdateRecord {
                    table: "Tasks".to_string(),
                    id: RowId::Int(1),
                    fields: fields(json!({"Done": true})),
                },
                UserAction::RemoveRecord {
                    table: "Tasks".to_string(),
                    id: RowId::Int(99),
                },
            ])
            .await
            .expect_err("unknown row");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(host.table("Tasks").expect("table")["Done"], vec![json!(false)]);
        assert_eq!(host.submitted().len(), 1);
    }

    #[tokio::test]
    async fn bulk_update_can_be_disabled() {
        let host = MemoryHost::new()
            .with_records("Tasks", &records(json!([{"id": 1}, {"id": 2}])))
            .with_bulk_support(false);
        let err = host
            .apply_user_actions(vec![UserAction::BulkUpdateRecord {
                table: "Tasks".to_string(),
                ids: vec![RowId::Int(1), RowId::Int(2)],
                fields: fields(json!({"Done": true})),
            }])
            .await
            .expect_err("unsupported");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn remove_drops_the_row_from_every_column() {
        let host = MemoryHost::new().with_records(
            "Tasks",
            &records(json!([{"id": 1, "Name": "a"}, {"id": 2, "Name": "b"}])),
        );
        host.apply_user_actions(vec![UserAction::RemoveRecord {
            table: "Tasks".to_string(),
            id: RowId::Int(1),
        }])
        .await
        .expect("remove");
        let table = host.table("Tasks").expect("table");
        assert_eq!(table["id"], vec![json!(2)]);
        assert_eq!(table["Name"], vec![json!("b")]);
    }

    #[tokio::test]
    async fn fail_next_rejects_then_recovers() {
        let host = MemoryHost::new().with_records("Tasks", &records(json!([{"id": 1}])));
        host.fail_next(1);
        let remove = || {
            vec![UserAction::RemoveRecord {
                table: "Tasks".to_string(),
                id: RowId::Int(1),
            }]
        };
        let err = host.apply_user_actions(remove()).await.expect_err("rejected");
        assert_eq!(err.kind(), ErrorKind::Rejected);
        host.apply_user_actions(remove()).await.expect("second attempt");
        assert!(host.records("Tasks").is_empty());
    }

    #[tokio::test]
    async fn fetch_unknown_table_is_not_found() {
        let host = MemoryHost::new();
        let err = host.fetch_table("Nope").await.expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(host.fetch_count(), 1);
    }

    #[tokio::test]
    async fn token_ids_are_matched_exactly() {
        let host = MemoryHost::new().with_records(
            "Tasks",
            &records(json!([{"id": "rec_a", "Name": "a"}, {"id": "rec_b", "Name": "b"}])),
        );
        host.apply_user_actions(vec![UserAction::RemoveRecord {
            table: "Tasks".to_string(),
            id: RowId::from("rec_b"),
        }])
        .await
        .expect("remove");
        assert_eq!(host.table("Tasks").expect("table")["Name"], vec![json!("a")]);

        host.apply_user_actions(vec![UserAction::AddRecord {
            table: "Tasks".to_string(),
            fields: fields(json!({"Name": "c"})),
        }])
        .await
        .expect("add");
        assert_eq!(host.table("Tasks").expect("table")["id"], vec![json!("rec_a"), json!(1)]);
    }

    #[tokio::test]
    async fn next_id_continues_past_i64() {
        let host = MemoryHost::new()
            .with_records("Tasks", &records(json!([{"id": 9_223_372_036_854_775_807i64}])));
        host.apply_user_actions(vec![UserAction::AddRecord {
            table: "Tasks".to_string(),
            fields: Map::new(),
        }])
        .await
        .expect("add");
        assert_eq!(
            host.table("Tasks").expect("table")["id"][1],
            json!(9_223_372_036_854_775_808u64)
        );
    }

    #[tokio::test]
    async fn fail_next_fetch_fails_reads_only() {
        let host = MemoryHost::new().with_records("Tasks", &records(json!([{"id": 1}])));
        host.fail_next_fetch(1);
        let err = host.fetch_table("Tasks").await.expect_err("read failure");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.table(), Some("Tasks"));
        host.fetch_table("Tasks").await.expect("second read");
        assert_eq!(host.fetch_count(), 2);
        assert!(host.submitted().is_empty());
    }

    #[tokio::test]
    async fn custom_id_column_locates_rows() {
        let columns = ColumnNames {
            id: "RowKey".to_string(),
            ..ColumnNames::new()
        };
        let host = MemoryHost::new()
            .with_columns(columns)
            .with_records("Tasks", &records(json!([{"RowKey": 5, "Name": "a"}])));
        host.apply_user_actions(vec![UserAction::UpdateRecord {
            table: "Tasks".to_string(),
            id: RowId::Int(5),
            fields: fields(json!({"Name": "renamed"})),
        }])
        .await
        .expect("update");
        host.apply_user_actions(vec![UserAction::AddRecord {
            table: "Tasks".to_string(),
            fields: fields(json!({"Name": "b"})),
        }])
        .await
        .expect("add");

        let table = host.table("Tasks").expect("table");
        assert_eq!(table["RowKey"], vec![json!(5), json!(6)]);
        assert!(!table.contains_key("id"));
        assert_eq!(host.records("Tasks")[0]["Name"], json!("renamed"));
    }

    #[test]
    fn long_columns_are_padded_not_truncated() {
        let mut columns = TableColumns::new();
        columns.insert("id".to_string(), vec![json!(1)]);
        columns.insert("Name".to_string(), vec![json!("a"), json!("b")]);
        let host = MemoryHost::new().with_table("Tasks", columns);

        let table = host.table("Tasks").expect("table");
        assert_eq!(table["id"], vec![json!(1), json!(null)]);
        assert_eq!(table["Name"], vec![json!("a"), json!("b")]);
    }
}
