//! Purpose: Hold top-level CLI command dispatch for `reclist`.
//! Exports: `Context`, `dispatch_command`.
//! Role: Wire a table file to a `MemoryHost`, push it as a snapshot, run one store operation.
//! Invariants: The file is written back only after a mutation succeeded.
//! Invariants: Output is always the store's projected view after the operation.

use super::table_file::{self, TableFile};
use super::*;
use reclist::api::{
    Mappings, MemoryHost, RecordListStore, Row, RowId, RowPatch, StoreOptions, format_created_at,
};
use std::path::Path;
use std::sync::Arc;

pub(super) struct Context {
    pub table_file: PathBuf,
    pub table: Option<String>,
    pub no_bulk: bool,
}

pub(super) async fn dispatch_command(
    command: Command,
    context: Context,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::aot::generate(shell, &mut cmd, "reclist", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Init { table, force } => {
            if context.table_file.exists() && !force {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "table file {} already exists",
                        context.table_file.display()
                    ))
                    .with_hint("Pass --force to overwrite it."));
            }
            let file = TableFile::empty(table);
            table_file::save(&context.table_file, &file)?;
            emit_json(view_json(&file.table, "", &[]));
            Ok(RunOutcome::ok())
        }
        command => {
            let file = table_file::load(&context.table_file)?;
            let table = context.table.clone().unwrap_or(file.table);
            let host = Arc::new(
                MemoryHost::new()
                    .with_table(table.clone(), file.columns)
                    .with_bulk_support(!context.no_bulk),
            );
            let store = RecordListStore::new(host.clone(), StoreOptions::new());
            let snapshot = host.records(&table);
            store.on_records(Some(&snapshot), Some(&Mappings::table(table.clone())));

            let mutated = run_store_command(&store, command).await?;
            if mutated {
                persist(&context.table_file, &table, &host)?;
            }
            emit_json(view_json(&table, &store.filter(), &store.view()));
            Ok(RunOutcome::ok())
        }
    }
}

async fn run_store_command(
    store: &RecordListStore<MemoryHost>,
    command: Command,
) -> Result<bool, Error> {
    match command {
        Command::View { filter } => {
            store.set_filter(filter);
            Ok(false)
        }
        Command::Add { name } => {
            if name.trim().is_empty() {
                return Err(Error::new(ErrorKind::Usage).with_message("name must not be blank"));
            }
            store.add_quick(&name).await?;
            Ok(true)
        }
        Command::Set {
            id,
            name,
            done,
            clear_created,
        } => {
            let mut patch = RowPatch {
                name,
                done,
                created_at: None,
            };
            if clear_created {
                patch = patch.created_at(None);
            }
            if patch.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("nothing to set")
                    .with_hint("Pass --name, --done, or --clear-created."));
            }
            store.save(require_id(id)?, patch).await?;
            Ok(true)
        }
        Command::Dup { id } => {
            let row = find_row(store, &require_id(id)?)?;
            store.duplicate(&row).await?;
            Ok(true)
        }
        Command::Rm { id } => {
            store.remove(require_id(id)?).await?;
            Ok(true)
        }
        Command::BulkDone { ids, undo } => {
            for id in ids {
                store.toggle_select(find_row(store, &require_id(id)?)?.id, true);
            }
            store.bulk_toggle_done(!undo).await?;
            Ok(true)
        }
        Command::Init { .. } | Command::Completion { .. } => Ok(false),
    }
}

fn require_id(id: RowId) -> Result<RowId, Error> {
    if id.is_falsy() {
        return Err(Error::new(ErrorKind::Usage).with_message("row id must not be 0 or empty"));
    }
    Ok(id)
}

fn find_row(store: &RecordListStore<MemoryHost>, id: &RowId) -> Result<Row, Error> {
    store
        .rows()
        .into_iter()
        .find(|row| row.id == *id)
        .ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("unknown row")
                .with_row(id.clone())
        })
}

fn persist(path: &Path, table: &str, host: &MemoryHost) -> Result<(), Error> {
    let columns = host.table(table).ok_or_else(|| {
        Error::new(ErrorKind::Internal)
            .with_message("table vanished from host")
            .with_table(table)
    })?;
    table_file::save(
        path,
        &TableFile {
            table: table.to_string(),
            columns,
        },
    )
}

fn view_json(table: &str, filter: &str, rows: &[Row]) -> Value {
    let rows: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "id": row.id,
                "name": row.name,
                "done": row.done,
                "created_at": row.created_at,
                "created": format_created_at(row.created_at.as_deref()),
            })
        })
        .collect();
    json!({
        "table": table,
        "filter": filter,
        "count": rows.len(),
        "rows": rows,
    })
}
