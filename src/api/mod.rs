//! Purpose: Define the public Rust API boundary for the record-list store.
//! Exports: Store, host contract, in-process host, row model, selection, and error types.
//! Role: Public, additive-only surface; hides internal core modules.
//! Invariants: This module is the only public path to core types.
//! Invariants: Internal modules remain private and are not directly exposed.

mod host;
mod memory;
mod store;

pub use crate::core::action::UserAction;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::row::{
    ColumnNames, RawRecord, Row, RowId, RowPatch, TableColumns, normalize_record,
    normalize_records, records_from_columns,
};
pub use crate::core::selection::{Selection, SelectionEvent};
pub use crate::core::view::{EMPTY_TIMESTAMP, format_created_at, project};
pub use host::{DocHost, Mappings};
pub use memory::MemoryHost;
pub use store::{RecordListStore, StoreOptions};
