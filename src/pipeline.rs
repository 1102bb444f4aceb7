use crate::attachments::{ImageConverter, Materializer, SipsConverter};
use crate::exporter::{self, AppendOutcome};
use crate::grouper;
use crate::importer;
use crate::utils::{ExportConfig, backup_database, open_db};
use eyre::Result;
use std::path::{Path, PathBuf};

/// What a run did to the note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub note_path: PathBuf,
    pub rows: usize,
    pub entries: usize,
    pub outcome: AppendOutcome,
}

/// The main entry point: snapshot the database, then export the configured day.
pub fn execute(config: &ExportConfig) -> Result<RunSummary> {
    config.validate()?;
    let snapshot = backup_database(&config.db_path)?;
    let converter = SipsConverter::new(&config.converter);
    run_internal(snapshot.path(), config, &converter)
}

/// Query, group, materialize and append against an already-opened snapshot.
pub fn run_internal(
    db_path: &Path,
    config: &ExportConfig,
    converter: &dyn ImageConverter,
) -> Result<RunSummary> {
    let conn = open_db(db_path)?;
    let rows = importer::fetch_day(&conn, &config.contact, config.date)?;
    drop(conn);

    let row_count = rows.len();
    tracing::info!(
        contact = %config.contact,
        date = %config.date,
        "Found {} message rows.",
        row_count
    );

    let mut materializer = Materializer::new(
        &config.attachments_root,
        &config.strip_prefix,
        &config.attachments_dir,
        config.date,
        converter,
    );
    let entries = grouper::group_rows(rows, &mut materializer);

    let note_path = config.note_path();
    let outcome = exporter::append_entries(&note_path, &entries, config.dedup)?;

    tracing::info!(
        "Done. {} appended, {} already present ({} bytes).",
        outcome.appended,
        outcome.skipped,
        outcome.bytes
    );

    Ok(RunSummary {
        note_path,
        rows: row_count,
        entries: entries.len(),
        outcome,
    })
}
