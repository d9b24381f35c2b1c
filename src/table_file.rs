//! Purpose: Load and store the JSON table file the CLI uses as its host storage.
//! Exports: `TableFile`, `load`, `save`.
//! Role: Keep file handling out of command dispatch; the store never sees paths.
//! Invariants: File shape is `{"table": <id>, "columns": {<field>: [values...]}}`.
//! Invariants: Saves go through a sibling temp file and rename, so readers never see partial JSON.

use reclist::api::{Error, ErrorKind, TableColumns};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct TableFile {
    pub table: String,
    #[serde(default)]
    pub columns: TableColumns,
}

impl TableFile {
    pub(crate) fn empty(table: impl Into<String>) -> Self {
        let mut columns = TableColumns::new();
        for field in ["id", "Name", "Done", "CreatedAt"] {
            columns.insert(field.to_string(), Vec::<Value>::new());
        }
        Self {
            table: table.into(),
            columns,
        }
    }
}

pub(crate) fn load(path: &Path) -> Result<TableFile, Error> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        let not_found = err.kind() == std::io::ErrorKind::NotFound;
        let err = io_error(err, &format!("failed to read table file {}", path.display()));
        if not_found {
            err.with_hint("Create one with `reclist init <table>`.")
        } else {
            err
        }
    })?;
    let file: TableFile = serde_json::from_str(&text).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message(format!("table file {} is not valid", path.display()))
            .with_hint("Expected {\"table\": \"...\", \"columns\": {\"id\": [...], ...}}.")
            .with_source(err)
    })?;
    check_column_lengths(path, &file)?;
    Ok(file)
}

// Every column holds one value per row.
fn check_column_lengths(path: &Path, file: &TableFile) -> Result<(), Error> {
    let mut lengths = file.columns.iter().map(|(field, values)| (field, values.len()));
    let Some((first_field, expected)) = lengths.next() else {
        return Ok(());
    };
    match lengths.find(|(_, len)| *len != expected) {
        Some((field, len)) => Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!(
                "table file {} has ragged columns: {first_field} has {expected} values, \
                 {field} has {len}",
                path.display()
            ))
            .with_table(file.table.clone())
            .with_hint("Every column must hold one value per row.")),
        None => Ok(()),
    }
}

pub(crate) fn save(path: &Path, file: &TableFile) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(file).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode table file")
            .with_source(err)
    })?;
    let temp = path.with_extension("json.tmp");
    std::fs::write(&temp, json).map_err(|err| io_error(err, "failed to write table file"))?;
    std::fs::rename(&temp, path).map_err(|err| io_error(err, "failed to replace table file"))
}

fn io_error(err: std::io::Error, message: &str) -> Error {
    let kind = match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    };
    Error::new(kind).with_message(message).with_source(err)
}

#[cfg(test)]
mod tests {
    use super::{TableFile, load, save};
    use reclist::api::ErrorKind;
    use serde_json::json;

    #[test]
    fn save_then_load_preserves_columns() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("tasks.json");
        let mut file = TableFile::empty("Tasks");
        file.columns.insert("id".to_string(), vec![json!(1)]);
        file.columns.insert("Name".to_string(), vec![json!("a")]);

        save(&path, &file).expect("save");
        assert_eq!(load(&path).expect("load"), file);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_file_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load(&temp.path().join("absent.json")).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.hint().is_some());
    }

    #[test]
    fn ragged_columns_are_corrupt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ragged.json");
        std::fs::write(
            &path,
            r#"{"table": "Tasks", "columns": {"id": [1], "Name": ["a", "b"]}}"#,
        )
        .expect("write");
        let err = load(&path).expect_err("ragged");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.table(), Some("Tasks"));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_a_permission_error() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("locked.json");
        save(&path, &TableFile::empty("Tasks")).expect("save");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o000)).expect("chmod");
        // Privileged users can read regardless of mode bits.
        if std::fs::read(&path).is_ok() {
            return;
        }
        let err = load(&path).expect_err("locked");
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[test]
    fn malformed_file_is_corrupt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bad.json");
        std::fs::write(&path, "{\"columns\": 3}").expect("write");
        let err = load(&path).expect_err("bad");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }
}
