//! # imsg-daily-note
//!
//! A CLI tool that appends one day of a Messages conversation to an
//! [Obsidian](https://obsidian.md) daily note.
//!
//! ## What it does
//!
//! macOS stores Messages history in a SQLite database (`~/Library/Messages/chat.db`)
//! and attachments under `~/Library/Messages/Attachments`. This tool snapshots that
//! database, reads the messages exchanged with one contact on one local calendar day,
//! and appends them to `<notes_dir>/YYYY.MM.DD.md`. Messages sent in the same second
//! form one paragraph.
//!
//! Attachments are copied to the vault's attachment folder as
//! `YYYY.MM.DD_screen_<n>.<ext>` and embedded as `![[name|300]]`. HEIC/HEIF photos
//! are converted to PNG with `sips` first, since most note apps cannot render them.
//!
//! The database is opened **read-only**; your data is never modified.
//!
//! ## Re-running
//!
//! Paragraphs already present in the note are skipped, so running the export
//! several times a day only adds what is new. Attachment numbering restarts at 1
//! on every run, so a rerun overwrites the day's earlier copies. Do not run two
//! exports for the same day at once.
//!
//! ## Usage
//!
//! ```sh
//! imsg-daily-note --contact +15555550100 \
//!     --notes-dir ~/vault/Journal --attachments-dir ~/vault/Attachments
//!
//! # A past day, refusing partial-text dedup matches
//! imsg-daily-note --date 2024-01-01 --strict-dedup
//! ```
//!
//! Preferences can be persisted in `~/.config/imsg-daily-note/config.toml`.
pub mod attachments;
pub mod exporter;
pub mod grouper;
pub mod importer;
pub mod pipeline;
pub mod utils;

pub use attachments::{ImageConverter, Materializer, SipsConverter};
pub use pipeline::{RunSummary, execute, run_internal};
pub use utils::{DedupMode, ExportConfig};
