// # Atomic File Patcher
//
// Line-oriented, regex-driven rewriting of a text file in place.
//
// ## Crash Safety
//
// - Streaming: the source is read line by line into a temp file that lives
//   in the same directory, so the final rename never crosses filesystems
// - Backup: the old content is kept as `<file>.bak-<timestamp>`, created as a
//   hard link (or copy) before anything replaces the original
// - Swap: a single rename moves the new content over the original path
//
// The original path therefore always names either the complete old file or
// the complete new file. A crash before the swap leaves the original
// untouched; a crash after it leaves the new content plus the backup.
//
// ## Rules
//
// Every rule is applied to every line, in order, each one seeing the output
// of the previous one. Rules are not mutually exclusive. Lines are matched as
// raw bytes, so content that is not UTF-8 passes through unchanged.

use std::fs::{self, File};
use std::borrow::Cow;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use regex::bytes::Regex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Line terminator written by the patcher
#[cfg(windows)]
pub const NEWLINE: &str = "\r\n";
/// Line terminator written by the patcher
#[cfg(not(windows))]
pub const NEWLINE: &str = "\n";

/// One `(pattern, replacement)` rewrite
#[derive(Debug, Clone)]
pub struct PatchRule {
    pattern: Regex,
    replacement: String,
}

impl PatchRule {
    /// A rule whose replacement may reference capture groups (`$1`, `${name}`)
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::invalid_input(format!("bad pattern {:?}: {}", pattern, e)))?;
        Ok(Self {
            pattern,
            replacement: replacement.into(),
        })
    }

    /// A rule whose replacement is inserted verbatim
    ///
    /// maddy's `$(macro)` syntax would otherwise be read as a capture reference.
    pub fn literal(pattern: &str, replacement: &str) -> Result<Self> {
        Self::new(pattern, replacement.replace('$', "$$"))
    }

    /// Apply this rule to a single line, without its terminator
    pub fn apply<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]> {
        self.pattern.replace_all(line, self.replacement.as_bytes())
    }
}

/// Apply every rule, in order, to one line
pub fn apply_rules(line: &[u8], rules: &[PatchRule]) -> Vec<u8> {
    rules
        .iter()
        .fold(line.to_vec(), |acc, rule| rule.apply(&acc).into_owned())
}

/// Strip a trailing `\n` or `\r\n`
fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// What a successful patch did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Where the previous content was preserved
    pub backup: PathBuf,
    /// Lines whose content changed
    pub lines_changed: usize,
}

/// Rewrite `path` through `rules` with backup-and-swap semantics.
///
/// Blocking; see [`patch_file_async`] for use from async code. On
/// cancellation the original is left untouched and the partial temp file is
/// kept for inspection; its path is part of the error.
pub fn patch_file(path: &Path, rules: &[PatchRule], cancel: &CancellationToken) -> Result<PatchOutcome> {
    let source = File::open(path).map_err(|e| Error::fs("opening file for reading", path, e))?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::invalid_input(format!("not a file path: {}", path.display())))?
        .to_string_lossy()
        .into_owned();

    let temp = tempfile::Builder::new()
        .prefix(&format!("~update-{}-", file_name))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::fs("creating temp file in", dir, e))?;
    let temp_path = temp.path().to_path_buf();

    let mut lines_changed = 0;
    {
        let mut reader = BufReader::new(source);
        let mut writer = BufWriter::new(temp.as_file());
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| Error::fs("reading", path, e))?;
            if read == 0 {
                break;
            }

            if cancel.is_cancelled() {
                drop(writer);
                let kept = temp
                    .keep()
                    .map(|(_, p)| p)
                    .unwrap_or_else(|_| temp_path.clone());
                return Err(Error::cancelled(format!(
                    "patching {} interrupted, partial output left at {}",
                    path.display(),
                    kept.display()
                )));
            }

            let line = trim_line_end(&buf);
            let patched = apply_rules(line, rules);
            if patched != line {
                lines_changed += 1;
            }
            writer
                .write_all(&patched)
                .and_then(|_| writer.write_all(NEWLINE.as_bytes()))
                .map_err(|e| Error::fs("writing to temp file", &temp_path, e))?;
        }
        writer
            .flush()
            .map_err(|e| Error::fs("flushing temp file", &temp_path, e))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::fs("syncing temp file", &temp_path, e))?;

    // Keep the mode of the file being replaced
    let meta = fs::metadata(path).map_err(|e| Error::fs("reading permissions of", path, e))?;
    fs::set_permissions(&temp_path, meta.permissions())
        .map_err(|e| Error::fs("copying permissions to", &temp_path, e))?;

    let backup = backup_path(path);
    preserve(path, &backup)?;

    temp.persist(path)
        .map_err(|e| Error::fs("renaming temp file over", path, e.error))?;

    tracing::debug!(
        "patched {} ({} line(s) changed, backup {})",
        path.display(),
        lines_changed,
        backup.display()
    );
    Ok(PatchOutcome {
        backup,
        lines_changed,
    })
}

/// Run [`patch_file`] on the blocking pool
pub async fn patch_file_async(
    path: PathBuf,
    rules: Vec<PatchRule>,
    cancel: CancellationToken,
) -> Result<PatchOutcome> {
    tokio::task::spawn_blocking(move || patch_file(&path, &rules, &cancel))
        .await
        .map_err(|e| Error::cancelled(format!("patch task did not complete: {}", e)))?
}

/// `<file>.bak-<RFC3339 timestamp with nanoseconds>`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak-");
    name.push(timestamp());
    PathBuf::from(name)
}

/// Local time, RFC 3339 with nanosecond precision
pub fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Nanos, false)
}

/// Keep the current content of `path` reachable at `backup`
fn preserve(path: &Path, backup: &Path) -> Result<()> {
    if fs::hard_link(path, backup).is_ok() {
        return Ok(());
    }
    fs::copy(path, backup)
        .map(|_| ())
        .map_err(|e| Error::fs("backing up", path, e))
}
