//! Purpose: Model the mutation commands submitted to the host and their wire encoding.
//! Exports: `UserAction`.
//! Role: Vocabulary shared by the mutation gateway, host adapters, and the CLI.
//! Invariants: Wire form is a positional array `[kind, table, ...args]`.
//! Invariants: Field maps are forwarded verbatim; nothing is added or dropped here.
use super::row::RowId;
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq)]
pub enum UserAction {
    AddRecord {
        table: String,
        fields: Map<String, Value>,
    },
    UpdateRecord {
        table: String,
        id: RowId,
        fields: Map<String, Value>,
    },
    BulkUpdateRecord {
        table: String,
        ids: Vec<RowId>,
        fields: Map<String, Value>,
    },
    RemoveRecord {
        table: String,
        id: RowId,
    },
}

impl UserAction {
    pub fn kind(&self) -> &'static str {
        match self {
            UserAction::AddRecord { .. } => "AddRecord",
            UserAction::UpdateRecord { .. } => "UpdateRecord",
            UserAction::BulkUpdateRecord { .. } => "BulkUpdateRecord",
            UserAction::RemoveRecord { .. } => "RemoveRecord",
        }
    }

    pub fn table(&self) -> &str {
        match self {
            UserAction::AddRecord { table, .. }
            | UserAction::UpdateRecord { table, .. }
            | UserAction::BulkUpdateRecord { table, .. }
            | UserAction::RemoveRecord { table, .. } => table,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut parts = vec![Value::from(self.kind()), Value::from(self.table())];
        match self {
            UserAction::AddRecord { fields, .. } => {
                parts.push(Value::Object(fields.clone()));
            }
            UserAction::UpdateRecord { id, fields, .. } => {
                parts.push(id.to_value());
                parts.push(Value::Object(fields.clone()));
            }
            UserAction::BulkUpdateRecord { ids, fields, .. } => {
                parts.push(Value::Array(ids.iter().map(RowId::to_value).collect()));
                parts.push(Value::Object(fields.clone()));
            }
            UserAction::RemoveRecord { id, .. } => {
                parts.push(id.to_value());
            }
        }
        Value::Array(parts)
    }
}
