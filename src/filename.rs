//! Destination file naming
//!
//! Picks a file name from the URL and finds a free path for it in the
//! destination directory, appending ` (n)` before the extension on conflict.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use url::Url;

use crate::error::DownResult;

/// Derives a file name from the last path segment of `url`.
///
/// Falls back to `download_<seq>` when the segment is empty or has no
/// extension.
pub fn candidate_file_name(url: &Url, seq: usize) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .filter(|name| is_usable_name(name))
        .unwrap_or_else(|| format!("download_{}", seq))
}

fn is_usable_name(name: &str) -> bool {
    !name.is_empty()
        && name.contains('.')
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

/// Splits `name` into stem and extension (including the dot).
///
/// Only the final extension counts, and a leading dot does not start one.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

/// Returns the `attempt`-th candidate path for `name` inside `dir`
fn numbered_path(dir: &Path, name: &str, attempt: u32) -> PathBuf {
    if attempt == 0 {
        return dir.join(name);
    }
    let (stem, extension) = split_extension(name);
    dir.join(format!("{} ({}){}", stem, attempt, extension))
}

/// Returns the first path among `name`, `name (1)`, `name (2)`, … that does not exist.
///
/// Another process may create the returned path before the caller does;
/// use [`create_destination`] when that matters.
pub fn resolve_destination(dir: &Path, name: &str) -> PathBuf {
    let mut attempt = 0;
    loop {
        let path = numbered_path(dir, name, attempt);
        if !path.exists() {
            trace!(path = %path.display(), attempt, "Resolved destination path");
            return path;
        }
        attempt += 1;
    }
}

/// Async form of [`resolve_destination`] that probes without blocking the runtime.
///
/// The same race applies: the path is only free at the time of the probe.
pub async fn probe_destination(dir: &Path, name: &str) -> DownResult<PathBuf> {
    let mut attempt = 0;
    loop {
        let path = numbered_path(dir, name, attempt);
        if !fs::try_exists(&path).await? {
            trace!(path = %path.display(), attempt, "Resolved destination path");
            return Ok(path);
        }
        attempt += 1;
    }
}

/// Finds a free path like [`resolve_destination`] and creates the file with
/// exclusive-create semantics, so the returned path belongs to the caller.
pub async fn create_destination(dir: &Path, name: &str) -> DownResult<(PathBuf, File)> {
    let mut attempt = 0;
    loop {
        let path = numbered_path(dir, name, attempt);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                debug!(path = %path.display(), attempt, "Created destination file");
                return Ok((path, file));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                trace!(path = %path.display(), "Destination taken, trying next name");
                attempt += 1;
            }
            Err(e) => {
                error!(error = %e, path = %path.display(), "Failed to create destination file");
                return Err(e.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_candidate_from_last_segment() {
        assert_eq!(
            candidate_file_name(&url("https://example.com/files/report.pdf"), 1),
            "report.pdf"
        );
        assert_eq!(
            candidate_file_name(&url("https://example.com/a/archive.tar.gz?token=abc"), 1),
            "archive.tar.gz"
        );
        assert_eq!(
            candidate_file_name(&url("https://example.com/my%20notes.txt"), 1),
            "my notes.txt"
        );
    }

    #[test]
    fn test_candidate_falls_back_to_generated_name() {
        assert_eq!(candidate_file_name(&url("https://example.com/"), 3), "download_3");
        assert_eq!(candidate_file_name(&url("https://example.com"), 1), "download_1");
        assert_eq!(
            candidate_file_name(&url("https://example.com/releases/latest"), 7),
            "download_7"
        );
        assert_eq!(candidate_file_name(&url("https://example.com/dir/"), 2), "download_2");
    }

    #[test]
    fn test_free_name_is_used_as_is() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            resolve_destination(dir.path(), "report.pdf"),
            dir.path().join("report.pdf")
        );
    }

    #[test]
    fn test_counter_goes_before_extension() {
        let dir = TempDir::new().unwrap();
        for n in 0..4 {
            let name = if n == 0 {
                "report.pdf".to_string()
            } else {
                format!("report ({}).pdf", n)
            };
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        assert_eq!(
            resolve_destination(dir.path(), "report.pdf"),
            dir.path().join("report (4).pdf")
        );
    }

    #[test]
    fn test_counter_appended_without_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("download_1"), b"x").unwrap();
        fs::write(dir.path().join(".bashrc"), b"x").unwrap();

        assert_eq!(
            resolve_destination(dir.path(), "download_1"),
            dir.path().join("download_1 (1)")
        );
        assert_eq!(
            resolve_destination(dir.path(), ".bashrc"),
            dir.path().join(".bashrc (1)")
        );
    }

    #[test]
    fn test_only_last_extension_is_split() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("archive.tar.gz"), b"x").unwrap();
        assert_eq!(
            resolve_destination(dir.path(), "archive.tar.gz"),
            dir.path().join("archive.tar (1).gz")
        );
    }

    #[tokio::test]
    async fn test_create_destination_claims_distinct_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("file.bin"), b"x").unwrap();

        let (first, _f1) = create_destination(dir.path(), "file.bin").await.unwrap();
        let (second, _f2) = create_destination(dir.path(), "file.bin").await.unwrap();

        assert_eq!(first, dir.path().join("file (1).bin"));
        assert_eq!(second, dir.path().join("file (2).bin"));
        assert!(second.exists());
    }

    #[tokio::test]
    async fn test_probe_destination_matches_sync_resolver() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("report.pdf"), b"x").unwrap();
        fs::write(dir.path().join("report (1).pdf"), b"x").unwrap();

        let probed = probe_destination(dir.path(), "report.pdf").await.unwrap();
        assert_eq!(probed, dir.path().join("report (2).pdf"));
        assert_eq!(probed, resolve_destination(dir.path(), "report.pdf"));
        assert!(!probed.exists());
    }

    #[tokio::test]
    async fn test_create_destination_reports_missing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(create_destination(&missing, "file.bin").await.is_err());
    }
}
