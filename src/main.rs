use chrono::{Local, NaiveDate};
use clap::Parser;
use eyre::{Context, Result, eyre};
use imsg_daily_note::utils::{DEFAULT_CONVERTER, DEFAULT_STRIP_PREFIX};
use imsg_daily_note::{DedupMode, ExportConfig, pipeline};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Append today's Messages conversation with one contact to an Obsidian daily note.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Phone number or email of the contact, as stored in Messages.
    #[arg(long, value_name = "HANDLE")]
    contact: Option<String>,

    /// Directory holding the daily notes (YYYY.MM.DD.md).
    #[arg(long, value_name = "DIR")]
    notes_dir: Option<PathBuf>,

    /// Directory receiving copied attachments.
    #[arg(long, value_name = "DIR")]
    attachments_dir: Option<PathBuf>,

    /// Path to the Messages database (chat.db).
    /// Defaults to ~/Library/Messages/chat.db.
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Root of the Messages attachment store.
    /// Defaults to ~/Library/Messages/Attachments.
    #[arg(long, value_name = "DIR")]
    attachments_root: Option<PathBuf>,

    /// Image converter executable (sips-compatible arguments).
    #[arg(long, value_name = "PROGRAM")]
    converter: Option<PathBuf>,

    /// Day to export (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_name = "DATE")]
    date: Option<NaiveDate>,

    /// Only treat a paragraph as recorded when it starts on its own line.
    #[arg(long)]
    strict_dedup: bool,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/imsg-daily-note/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log every row and attachment.
    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    db_path: Option<PathBuf>,
    attachments_root: Option<PathBuf>,
    notes_dir: Option<PathBuf>,
    attachments_dir: Option<PathBuf>,
    contact: Option<String>,
    strip_prefix: Option<String>,
    converter: Option<PathBuf>,
    strict_dedup: Option<bool>,
}

fn messages_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join("Library/Messages"))
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("imsg-daily-note/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "imsg_daily_note=debug"
    } else if quiet {
        "imsg_daily_note=warn"
    } else {
        "imsg_daily_note=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// CLI > config file > default, for every setting.
fn resolve(cli: Cli, file_cfg: FileConfig) -> Result<ExportConfig> {
    let db_path = cli
        .db
        .or(file_cfg.db_path)
        .or_else(|| messages_dir().map(|d| d.join("chat.db")))
        .ok_or_else(|| {
            eyre!("Could not determine database path.\nUse --db to specify manually, or set db_path in config.toml.")
        })?;

    let attachments_root = cli
        .attachments_root
        .or(file_cfg.attachments_root)
        .or_else(|| messages_dir().map(|d| d.join("Attachments")))
        .ok_or_else(|| {
            eyre!("Could not determine attachments root.\nUse --attachments-root, or set attachments_root in config.toml.")
        })?;

    let notes_dir = cli.notes_dir.or(file_cfg.notes_dir).ok_or_else(|| {
        eyre!("No notes directory.\nUse --notes-dir, or set notes_dir in config.toml.")
    })?;

    let attachments_dir = cli
        .attachments_dir
        .or(file_cfg.attachments_dir)
        .ok_or_else(|| {
            eyre!("No attachment directory.\nUse --attachments-dir, or set attachments_dir in config.toml.")
        })?;

    let contact = cli.contact.or(file_cfg.contact).ok_or_else(|| {
        eyre!("No contact.\nUse --contact, or set contact in config.toml.")
    })?;

    let strict = cli.strict_dedup || file_cfg.strict_dedup.unwrap_or(false);

    Ok(ExportConfig {
        db_path,
        attachments_root,
        notes_dir,
        attachments_dir,
        contact,
        strip_prefix: file_cfg
            .strip_prefix
            .unwrap_or_else(|| DEFAULT_STRIP_PREFIX.to_string()),
        converter: cli
            .converter
            .or(file_cfg.converter)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONVERTER)),
        date: cli.date.unwrap_or_else(|| Local::now().date_naive()),
        dedup: if strict {
            DedupMode::Strict
        } else {
            DedupMode::Substring
        },
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Merge CLI, config file and defaults
    let config = resolve(cli, file_cfg)?;

    // 3. Run the business logic
    let summary = pipeline::execute(&config)?;

    tracing::info!("Content added to: {}", summary.note_path.display());
    Ok(())
}
