//! Purpose: Track the host-driven cursor row and the local multi-select set.
//! Exports: `Selection`, `SelectionEvent`.
//! Role: Selection state owned by the store; the two selections never write each other.
//! Invariants: Only host selection events write the cursor.
//! Invariants: Bulk checks and toggles only look at ids in the supplied view.
use super::row::{Row, RowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Host selection notification. Either field may be missing.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionEvent {
    #[serde(default)]
    pub row_id: Option<RowId>,
    #[serde(default)]
    pub row_ids: Option<Vec<RowId>>,
}

impl SelectionEvent {
    pub fn row(row_id: impl Into<RowId>) -> Self {
        Self {
            row_id: Some(row_id.into()),
            row_ids: None,
        }
    }

    pub fn rows(row_ids: impl IntoIterator<Item = RowId>) -> Self {
        Self {
            row_id: None,
            row_ids: Some(row_ids.into_iter().collect()),
        }
    }

    fn focused(&self) -> Option<RowId> {
        self.row_id.clone().or_else(|| {
            self.row_ids
                .as_ref()
                .and_then(|ids| ids.first().cloned())
        })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Selection {
    cursor_id: Option<RowId>,
    multi_select: BTreeSet<RowId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor_id(&self) -> Option<RowId> {
        self.cursor_id.clone()
    }

    pub fn selected_ids(&self) -> Vec<RowId> {
        self.multi_select.iter().cloned().collect()
    }

    pub fn is_selected(&self, id: &RowId) -> bool {
        self.multi_select.contains(id)
    }

    pub fn on_external_selection_changed(&mut self, event: Option<&SelectionEvent>) {
        self.cursor_id = event.and_then(SelectionEvent::focused);
    }

    pub fn toggle_select(&mut self, id: RowId, checked: bool) {
        if checked {
            self.multi_select.insert(id);
        } else {
            self.multi_select.remove(&id);
        }
    }

    pub fn all_checked(&self, view: &[Row]) -> bool {
        !view.is_empty() && view.iter().all(|row| self.multi_select.contains(&row.id))
    }

    pub fn toggle_all(&mut self, view: &[Row], checked: bool) {
        for row in view {
            self.toggle_select(row.id.clone(), checked);
        }
    }

    pub(crate) fn clear_multi_select(&mut self) {
        self.multi_select.clear();
    }
}
