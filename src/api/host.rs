//! Purpose: Define the contract between the record-list store and its host data source.
//! Exports: `DocHost`, `Mappings`.
//! Role: Seam for host adapters; the store never talks to a host any other way.
//! Invariants: `apply_user_actions` is all-or-nothing per batch and fails on rejection.
//! Invariants: `fetch_table` returns index-aligned columns that include the id column.
//! Notes: Push and selection subscriptions are inverted: the host calls
//! `RecordListStore::on_records` and `RecordListStore::on_selection`.
use crate::core::action::UserAction;
use crate::core::error::Error;
use crate::core::row::{RowId, TableColumns};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait DocHost: Send + Sync {
    /// Bulk-read the full contents of `table_id` in column-oriented form.
    async fn fetch_table(&self, table_id: &str) -> Result<TableColumns, Error>;

    /// Submit an ordered batch of mutation commands.
    async fn apply_user_actions(&self, actions: Vec<UserAction>) -> Result<(), Error>;

    /// Move the host's selection cursor. Fire-and-forget.
    fn set_cursor_pos(&self, row_id: RowId);
}

/// Column mapping metadata delivered alongside push snapshots.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mappings {
    #[serde(default)]
    pub table_id: Option<String>,
}

impl Mappings {
    pub fn table(table_id: impl Into<String>) -> Self {
        Self {
            table_id: Some(table_id.into()),
        }
    }
}
