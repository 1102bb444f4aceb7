use crate::importer::AttachmentRef;
use crate::utils::note_stem;
use chrono::NaiveDate;
use eyre::{Context, Result, eyre};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

/// Width hint appended to every embed.
pub const EMBED_WIDTH: u32 = 300;

/// Extensions converted to PNG before embedding.
const CONVERTIBLE: &[&str] = &["heic", "heif"];

/// Converts an image file into another format.
pub trait ImageConverter {
    fn convert(&self, source: &Path, format: &str, output: &Path) -> Result<()>;
}

/// macOS `sips` (or any program taking the same arguments).
pub struct SipsConverter {
    program: PathBuf,
}

impl SipsConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ImageConverter for SipsConverter {
    fn convert(&self, source: &Path, format: &str, output: &Path) -> Result<()> {
        let result = Command::new(&self.program)
            .arg("-s")
            .arg("format")
            .arg(format)
            .arg(source)
            .arg("--out")
            .arg(output)
            .output()
            .wrap_err_with(|| format!("Failed to run {}", self.program.display()))?;

        if !result.status.success() {
            return Err(eyre!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }
        if !output.exists() {
            return Err(eyre!(
                "{} reported success but wrote no {}",
                self.program.display(),
                output.display()
            ));
        }
        Ok(())
    }
}

/// Copies attachments into the note's attachment directory for one run.
///
/// Files are named `<YYYY.MM.DD>_screen_<n><ext>`; `n` starts at 1 and advances
/// only when an attachment is actually written.
pub struct Materializer<'a> {
    attachments_root: &'a Path,
    strip_prefix: &'a str,
    dest_dir: &'a Path,
    date: NaiveDate,
    converter: &'a dyn ImageConverter,
    counter: u32,
}

impl<'a> Materializer<'a> {
    pub fn new(
        attachments_root: &'a Path,
        strip_prefix: &'a str,
        dest_dir: &'a Path,
        date: NaiveDate,
        converter: &'a dyn ImageConverter,
    ) -> Self {
        Self {
            attachments_root,
            strip_prefix,
            dest_dir,
            date,
            converter,
            counter: 1,
        }
    }

    /// Number the next materialized attachment will get.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Absolute location of an attachment reference on disk.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let relative = raw.strip_prefix(self.strip_prefix).unwrap_or(raw);
        normalize_path(&self.attachments_root.join(relative))
    }

    /// Materialize one attachment and return the line to put in the note.
    ///
    /// Failures never escape: they come back as a bracketed placeholder line.
    pub fn materialize(&mut self, attachment: &AttachmentRef) -> String {
        let source = self.resolve(&attachment.path);
        if !source.exists() {
            tracing::warn!(path = %source.display(), "attachment not found");
            return format!("[Attachment not found: {}]", source.display());
        }

        match self.copy_and_convert(&source, attachment) {
            Ok(name) => {
                tracing::debug!(from = %source.display(), to = %name, "attachment copied");
                self.counter += 1;
                format!("![[{}|{}]]", name, EMBED_WIDTH)
            }
            Err(e) => {
                tracing::warn!(path = %source.display(), "attachment failed: {:#}", e);
                format!("[Image could not be copied or converted: {:#}]", e)
            }
        }
    }

    /// Returns the basename of the file the note should embed.
    fn copy_and_convert(&self, source: &Path, attachment: &AttachmentRef) -> Result<String> {
        let extension = source_extension(source, attachment.mime_type.as_deref());
        let stem = format!("{}_screen_{}", note_stem(self.date), self.counter);
        let copied_name = match &extension {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem.clone(),
        };

        fs::create_dir_all(self.dest_dir).wrap_err_with(|| {
            format!(
                "Failed to create attachment directory: {}",
                self.dest_dir.display()
            )
        })?;

        let copied = self.dest_dir.join(&copied_name);
        fs::copy(source, &copied)
            .wrap_err_with(|| format!("Failed to copy {}", source.display()))?;

        let convertible = extension
            .as_deref()
            .is_some_and(|ext| CONVERTIBLE.contains(&ext.to_ascii_lowercase().as_str()));
        if !convertible {
            return Ok(copied_name);
        }

        let png_name = format!("{}.png", stem);
        let png = self.dest_dir.join(&png_name);
        self.converter
            .convert(&copied, "png", &png)
            .wrap_err_with(|| format!("Failed to convert {}", copied.display()))?;
        fs::remove_file(&copied)
            .wrap_err_with(|| format!("Failed to remove {}", copied.display()))?;
        Ok(png_name)
    }
}

/// Extension without the dot, original case preserved.
///
/// Falls back to sniffing the file content, then to the MIME type recorded in the
/// database, when the path has none.
fn source_extension(source: &Path, mime_type: Option<&str>) -> Option<String> {
    if let Some(ext) = source.extension().and_then(|e| e.to_str())
        && !ext.is_empty()
    {
        return Some(ext.to_string());
    }
    if let Ok(Some(kind)) = infer::get_from_path(source) {
        return Some(kind.extension().to_string());
    }
    mime_type.and_then(extension_for_mime).map(str::to_string)
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime.to_ascii_lowercase().as_str() {
        "image/heic" => Some("heic"),
        "image/heif" => Some("heif"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "video/quicktime" => Some("mov"),
        "video/mp4" => Some("mp4"),
        "audio/x-m4a" | "audio/mp4" => Some("m4a"),
        "application/pdf" => Some("pdf"),
        _ => None,
    }
}

/// Lexically collapse `.`, `..` and repeated separators.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
