use chrono::NaiveDate;
use eyre::{Context, Result, eyre};
use rusqlite::{Connection, OpenFlags, backup::Backup};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

/// Prefix Messages writes in front of attachment paths stored in `chat.db`.
pub const DEFAULT_STRIP_PREFIX: &str = "~/Library/Messages/Attachments/";

/// Converter invoked for HEIC/HEIF attachments.
pub const DEFAULT_CONVERTER: &str = "sips";

/// How the note appender decides an entry was already recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DedupMode {
    /// Entry text appears anywhere in the note.
    #[default]
    Substring,
    /// Entry text appears at the start of the note or right after a newline.
    Strict,
}

/// Configuration required to run one daily export.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub db_path: PathBuf,
    pub attachments_root: PathBuf,
    pub notes_dir: PathBuf,
    pub attachments_dir: PathBuf,
    pub contact: String,
    pub strip_prefix: String,
    pub converter: PathBuf,
    pub date: NaiveDate,
    pub dedup: DedupMode,
}

impl ExportConfig {
    /// Fail fast on settings that would otherwise surface halfway through a run.
    pub fn validate(&self) -> Result<()> {
        let required: [(&str, &Path); 4] = [
            ("db_path", self.db_path.as_path()),
            ("attachments_root", self.attachments_root.as_path()),
            ("notes_dir", self.notes_dir.as_path()),
            ("attachments_dir", self.attachments_dir.as_path()),
        ];
        for (name, path) in required {
            if path.as_os_str().is_empty() {
                return Err(eyre!(
                    "`{}` is empty.\nSet it on the command line or in config.toml.",
                    name
                ));
            }
        }
        if self.contact.trim().is_empty() {
            return Err(eyre!(
                "`contact` is empty.\nUse --contact or set contact in config.toml."
            ));
        }
        if self.converter.as_os_str().is_empty() {
            return Err(eyre!("`converter` is empty."));
        }
        if !self.db_path.exists() {
            return Err(eyre!(
                "Database not found at: {}\nUse --db to specify the path manually.",
                self.db_path.display()
            ));
        }
        Ok(())
    }

    /// Note file for the configured day, e.g. `2024.01.01.md`.
    pub fn note_path(&self) -> PathBuf {
        self.notes_dir.join(format!("{}.md", note_stem(self.date)))
    }
}

/// `YYYY.MM.DD`, shared by the note filename and attachment names.
pub fn note_stem(date: NaiveDate) -> String {
    date.format("%Y.%m.%d").to_string()
}

/// Create a snapshot of the database in a temporary file.
///
/// Messages keeps `chat.db` open with a WAL; copying it through the online backup
/// API gives a consistent view without touching the original.
pub fn backup_database(db_path: &Path) -> Result<NamedTempFile> {
    let src = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .wrap_err_with(|| format!("Failed to open source database: {}", db_path.display()))?;

    let tmp = NamedTempFile::new().wrap_err("Failed to create temporary file")?;
    let mut dst =
        Connection::open(tmp.path()).wrap_err("Failed to open snapshot database connection")?;

    {
        let backup = Backup::new(&src, &mut dst).wrap_err("Failed to initialize backup")?;
        backup
            .run_to_completion(1000, Duration::from_millis(5), None)
            .wrap_err("Backup did not complete successfully")?;
    }

    drop(src);
    Ok(tmp)
}

/// Open a database read-only.
pub fn open_db(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .wrap_err_with(|| format!("Failed to open database: {}", path.display()))
}
