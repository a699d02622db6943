//! CSV serialization of a gesture's buffered frames and the file sink that stores it.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::{
    access::Owner,
    collector::FrameRecord,
    error::{Error, Result},
};

pub const CSV_HEADER: [&str; 9] = [
    "id",
    "timestamp",
    "gesture",
    "type",
    "index",
    "x",
    "y",
    "z",
    "visibility",
];

/// Destination for exported files. Saving is fire-and-forget from the session's point of view:
/// the returned path is only reported back to the user.
pub trait FileSink {
    fn save(&mut self, filename: &str, contents: &[u8]) -> Result<PathBuf>;
}

/// Writes exports into a directory, never overwriting an earlier file with the same name.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn available_path(&self, filename: &str) -> PathBuf {
        let candidate = self.dir.join(filename);
        if !candidate.exists() {
            return candidate;
        }

        let path = Path::new(filename);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);
        let ext = path.extension().and_then(|s| s.to_str());
        (1..)
            .map(|n| match ext {
                Some(ext) => self.dir.join(format!("{stem} ({n}).{ext}")),
                None => self.dir.join(format!("{stem} ({n})")),
            })
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

impl FileSink for DirectorySink {
    fn save(&mut self, filename: &str, contents: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let dest = self.available_path(filename);
        let tmp_path = dest.with_extension("partial");

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &dest)?;

        Ok(dest)
    }
}

/// `gesture-<owner>-<gesture>.csv`, lower-cased, with whitespace runs and characters that are
/// not allowed in file names collapsed to a single `_`.
pub fn export_filename(owner: &Owner, gesture: &str) -> String {
    format!(
        "gesture-{}-{}.csv",
        normalize_name(owner.as_str()),
        normalize_name(gesture)
    )
}

fn normalize_name(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_gap = false;
    for c in value.trim().chars() {
        if c.is_whitespace() || c.is_control() || is_reserved(c) {
            pending_gap = true;
            continue;
        }
        if pending_gap && !out.is_empty() {
            out.push('_');
        }
        pending_gap = false;
        out.extend(c.to_lowercase());
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

fn is_reserved(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}

/// Flattens `records` into one row per landmark point, preceded by the header row.
pub fn render_csv(owner: &Owner, gesture: &str, records: &[FrameRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for record in records {
        let timestamp = record.timestamp().to_string();
        for row in record.rows() {
            let visibility = row
                .point
                .visibility
                .map(|v| v.to_string())
                .unwrap_or_default();
            writer.write_record([
                owner.as_str(),
                timestamp.as_str(),
                gesture,
                row.tag,
                row.index.to_string().as_str(),
                row.point.x.to_string().as_str(),
                row.point.y.to_string().as_str(),
                row.point.z.to_string().as_str(),
                visibility.as_str(),
            ])?;
        }
    }

    writer
        .into_inner()
        .map_err(|err| Error::Io(err.into_error()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub frames: usize,
    pub rows: usize,
}

/// Drains a gesture's buffer into exactly one file.
///
/// Once an export succeeds every further call is a no-op until [`CsvExporter::reset`] is called
/// at the start of the next recording.
#[derive(Debug, Default)]
pub struct CsvExporter {
    saved: bool,
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn reset(&mut self) {
        self.saved = false;
    }

    /// Returns `Ok(None)` when this recording was already exported.
    ///
    /// The buffer is left untouched if writing fails, and cleared once the file is stored.
    pub fn export(
        &mut self,
        owner: &Owner,
        gesture: &str,
        buffer: &mut Vec<FrameRecord>,
        sink: &mut dyn FileSink,
    ) -> Result<Option<ExportReceipt>> {
        if self.saved {
            log::debug!("export for {gesture:?} already saved, ignoring");
            return Ok(None);
        }
        if buffer.is_empty() {
            return Err(Error::EmptyCapture {
                gesture: gesture.to_string(),
            });
        }

        let rows = buffer.iter().map(FrameRecord::row_count).sum();
        let contents = render_csv(owner, gesture, buffer)?;
        let path = sink.save(&export_filename(owner, gesture), &contents)?;
        self.saved = true;

        let frames = buffer.len();
        buffer.clear();
        log::info!(
            "saved {rows} rows from {frames} frames to {}",
            path.display()
        );

        Ok(Some(ExportReceipt { path, frames, rows }))
    }
}
