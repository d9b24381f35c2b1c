//! Purpose: Keep a local record list in sync with a host table and expose view, selection, and mutations.
//! Exports: `RecordListStore`, `StoreOptions`.
//! Role: Owns the row set and selection; ingests snapshots, projects views, and gates mutations.
//! Invariants: Every snapshot install (push or refresh) replaces rows and clears the multi-select.
//! Invariants: `save` patches in place and never refetches; add/duplicate/remove/bulk refresh.
//! Invariants: A failed host request leaves rows and selection untouched.
//! Invariants: State is locked only at completion points, never across an await.
#![allow(clippy::result_large_err)]

use super::host::{DocHost, Mappings};
use crate::core::action::UserAction;
use crate::core::error::{Error, ErrorKind};
use crate::core::row::{
    ColumnNames, RawRecord, Row, RowId, RowPatch, normalize_records, records_from_columns,
};
use crate::core::selection::{Selection, SelectionEvent};
use crate::core::view::project;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub columns: ColumnNames,
    pub bulk_fallback: bool,
    pub table_id: Option<String>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self {
            columns: ColumnNames::new(),
            bulk_fallback: true,
            table_id: None,
        }
    }

    pub fn with_columns(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_bulk_fallback(mut self, enabled: bool) -> Self {
        self.bulk_fallback = enabled;
        self
    }

    pub fn with_table(mut self, table_id: impl Into<String>) -> Self {
        self.table_id = Some(table_id.into());
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    table_id: Option<String>,
    rows: Vec<Row>,
    selection: Selection,
    filter: String,
    draft: String,
}

impl StoreState {
    fn install_rows(&mut self, rows: Vec<Row>) {
        self.rows = rows;
        self.selection.clear_multi_select();
    }
}

pub struct RecordListStore<H: DocHost> {
    host: Arc<H>,
    columns: ColumnNames,
    bulk_fallback: bool,
    state: Mutex<StoreState>,
}

impl<H: DocHost> RecordListStore<H> {
    pub fn new(host: Arc<H>, options: StoreOptions) -> Self {
        let state = StoreState {
            table_id: options.table_id,
            ..StoreState::default()
        };
        Self {
            host,
            columns: options.columns,
            bulk_fallback: options.bulk_fallback,
            state: Mutex::new(state),
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn table_id(&self) -> Option<String> {
        self.state().table_id.clone()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.state().rows.clone()
    }

    pub fn cursor_id(&self) -> Option<RowId> {
        self.state().selection.cursor_id()
    }

    pub fn selected_ids(&self) -> Vec<RowId> {
        self.state().selection.selected_ids()
    }

    pub fn filter(&self) -> String {
        self.state().filter.clone()
    }

    pub fn set_filter(&self, filter: impl Into<String>) {
        self.state().filter = filter.into();
    }

    pub fn draft(&self) -> String {
        self.state().draft.clone()
    }

    pub fn set_draft(&self, draft: impl Into<String>) {
        self.state().draft = draft.into();
    }

    // Snapshot ingestion

    /// Install a row-oriented snapshot; `table_binding` replaces the active table when present.
    pub fn ingest(&self, records: Option<&[RawRecord]>, table_binding: Option<&str>) {
        let rows = normalize_records(records.unwrap_or_default(), &self.columns);
        let mut state = self.state();
        if let Some(table) = table_binding {
            state.table_id = Some(table.to_string());
        }
        debug!(table = ?state.table_id, rows = rows.len(), "ingested pushed snapshot");
        state.install_rows(rows);
    }

    /// Host push callback.
    pub fn on_records(&self, records: Option<&[RawRecord]>, mappings: Option<&Mappings>) {
        let table = mappings.and_then(|mappings| mappings.table_id.as_deref());
        self.ingest(records, table);
    }

    // View

    pub fn view(&self) -> Vec<Row> {
        let state = self.state();
        project(&state.rows, &state.filter)
    }

    // Selection

    /// Host selection callback; the only writer of the cursor.
    pub fn on_selection(&self, event: Option<&SelectionEvent>) {
        let mut state = self.state();
        state.selection.on_external_selection_changed(event);
        debug!(cursor = ?state.selection.cursor_id(), "host selection changed");
    }

    pub fn toggle_select(&self, id: RowId, checked: bool) {
        self.state().selection.toggle_select(id, checked);
    }

    pub fn all_checked(&self) -> bool {
        let state = self.state();
        let view = project(&state.rows, &state.filter);
        state.selection.all_checked(&view)
    }

    pub fn toggle_all(&self, checked: bool) {
        let mut state = self.state();
        let view = project(&state.rows, &state.filter);
        state.selection.toggle_all(&view, checked);
    }

    pub fn request_cursor_move(&self, id: RowId) {
        if id.is_falsy() {
            return;
        }
        self.host.set_cursor_pos(id);
    }

    // Mutations

    pub async fn add_quick(&self, name: &str) -> ApiResult<()> {
        let Some(table) = self.bound_table("add") else {
            return Ok(());
        };
        let name = name.trim();
        if name.is_empty() {
            debug!(%table, "add skipped: blank name");
            return Ok(());
        }
        self.create_named(&table, name).await?;
        self.refresh_table(&table).await
    }

    /// Create a record from the draft text; the draft is cleared once creation succeeds.
    pub async fn add_draft(&self) -> ApiResult<()> {
        let Some(table) = self.bound_table("add") else {
            return Ok(());
        };
        let draft = self.draft();
        let name = draft.trim();
        if name.is_empty() {
            debug!(%table, "add skipped: blank draft");
            return Ok(());
        }
        self.create_named(&table, name).await?;
        {
            let mut state = self.state();
            if state.draft == draft {
                state.draft.clear();
            }
        }
        self.refresh_table(&table).await
    }

    pub async fn save(&self, id: RowId, patch: RowPatch) -> ApiResult<()> {
        let Some(table) = self.bound_table("save") else {
            return Ok(());
        };
        if id.is_falsy() {
            return Ok(());
        }
        self.submit(vec![UserAction::UpdateRecord {
            table: table.clone(),
            id: id.clone(),
            fields: patch.to_fields(&self.columns),
        }])
        .await?;

        let mut state = self.state();
        match state.rows.iter_mut().find(|row| row.id == id) {
            Some(row) => patch.apply_to(row),
            None => debug!(%table, row = %id, "saved row not in local set"),
        }
        Ok(())
    }

    pub async fn duplicate(&self, row: &Row) -> ApiResult<()> {
        let Some(table) = self.bound_table("duplicate") else {
            return Ok(());
        };
        self.submit(vec![UserAction::AddRecord {
            table: table.clone(),
            fields: row.to_fields(&self.columns),
        }])
        .await?;
        self.refresh_table(&table).await
    }

    pub async fn remove(&self, id: RowId) -> ApiResult<()> {
        let Some(table) = self.bound_table("remove") else {
            return Ok(());
        };
        if id.is_falsy() {
            return Ok(());
        }
        self.submit(vec![UserAction::RemoveRecord {
            table: table.clone(),
            id,
        }])
        .await?;
        self.refresh_table(&table).await
    }

    /// Set `done` on every selected row: one batched update, else one update per id.
    pub async fn bulk_toggle_done(&self, done: bool) -> ApiResult<()> {
        let Some(table) = self.bound_table("bulk update") else {
            return Ok(());
        };
        let ids = self.selected_ids();
        if ids.is_empty() {
            return Ok(());
        }
        let mut fields = Map::new();
        fields.insert(self.columns.done.clone(), Value::from(done));

        let batched = self
            .submit(vec![UserAction::BulkUpdateRecord {
                table: table.clone(),
                ids: ids.clone(),
                fields: fields.clone(),
            }])
            .await;
        if let Err(err) = batched {
            if !self.bulk_fallback {
                return Err(err);
            }
            warn!(
                %table,
                selected = ids.len(),
                error = %err,
                "batched update failed; updating rows one by one"
            );
            self.update_each(&table, &ids, &fields).await?;
        }
        self.refresh_table(&table).await
    }

    /// Re-read the bound table and install it as the current snapshot.
    pub async fn refresh(&self) -> ApiResult<()> {
        let Some(table) = self.bound_table("refresh") else {
            return Ok(());
        };
        self.refresh_table(&table).await
    }

    fn bound_table(&self, operation: &str) -> Option<String> {
        let table = self.table_id();
        if table.is_none() {
            debug!(operation, "skipped: no table binding");
        }
        table
    }

    async fn create_named(&self, table: &str, name: &str) -> ApiResult<()> {
        let mut fields = Map::new();
        fields.insert(self.columns.name.clone(), Value::from(name));
        fields.insert(self.columns.done.clone(), Value::from(false));
        fields.insert(self.columns.created_at.clone(), Value::from(timestamp_now()?));
        self.submit(vec![UserAction::AddRecord {
            table: table.to_string(),
            fields,
        }])
        .await
    }

    // Every request is attempted; the first failure is reported once all have settled.
    async fn update_each(
        &self,
        table: &str,
        ids: &[RowId],
        fields: &Map<String, Value>,
    ) -> ApiResult<()> {
        let mut first_err = None;
        for id in ids {
            let result = self
                .submit(vec![UserAction::UpdateRecord {
                    table: table.to_string(),
                    id: id.clone(),
                    fields: fields.clone(),
                }])
                .await;
            if let Err(err) = result {
                warn!(%table, row = %id, error = %err, "row update failed");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn submit(&self, actions: Vec<UserAction>) -> ApiResult<()> {
        let kinds: Vec<&'static str> = actions.iter().map(UserAction::kind).collect();
        debug!(?kinds, "submitting user actions");
        self.host.apply_user_actions(actions).await
    }

    async fn refresh_table(&self, table: &str) -> ApiResult<()> {
        let columns = self.host.fetch_table(table).await?;
        let rows = normalize_records(&records_from_columns(&columns, &self.columns), &self.columns);
        info!(%table, rows = rows.len(), "refreshed table");
        self.state().install_rows(rows);
        Ok(())
    }
}

fn timestamp_now() -> ApiResult<String> {
    let now = OffsetDateTime::now_utc();
    let now = now.replace_millisecond(now.millisecond()).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to truncate timestamp")
            .with_source(err)
    })?;
    now.format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to format timestamp")
            .with_source(err)
    })
}
