use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::Digest as _;

use crate::assets::manifest::{ManifestEntry, remove_if_exists};
use crate::assets::transport::Transport;
use crate::foundation::error::{VestureError, VestureResult};

const CHUNK: usize = 64 * 1024;

/// Snapshot of a multi-file download.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Overall completion in `[0, 1]`.
    pub fraction: f64,
    pub current_entry: Option<String>,
    /// Bytes of the current entry on disk, resumed bytes included.
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
    pub bytes_per_sec: f64,
    pub entries_done: usize,
    pub entries_total: usize,
}

/// Rolling transfer rate: bytes since the last sample divided by the time since it, resampled
/// once per interval.
#[derive(Clone, Debug)]
pub struct RateMeter {
    interval: Duration,
    last_sample: Instant,
    bytes_since: u64,
    rate: f64,
}

impl RateMeter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_sample: now,
            bytes_since: 0,
            rate: 0.0,
        }
    }

    /// Account for `bytes`; returns the new rate when a resample happened.
    pub fn record(&mut self, bytes: u64, now: Instant) -> Option<f64> {
        self.bytes_since += bytes;
        let elapsed = now.saturating_duration_since(self.last_sample);
        if elapsed < self.interval {
            return None;
        }
        self.rate = self.bytes_since as f64 / elapsed.as_secs_f64();
        self.bytes_since = 0;
        self.last_sample = now;
        Some(self.rate)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// Fetches single manifest entries into a model root.
///
/// Bytes land in `<path>.part` and are renamed into place only after size and digest checks pass,
/// so an interrupted transfer never looks complete. A leftover `.part` is resumed with a range
/// request.
pub struct Downloader<'a> {
    transport: &'a dyn Transport,
    root: &'a Path,
}

impl<'a> Downloader<'a> {
    pub fn new(transport: &'a dyn Transport, root: &'a Path) -> Self {
        Self { transport, root }
    }

    /// Download `entry`, calling `on_bytes(done, total)` as data arrives.
    #[tracing::instrument(skip_all, fields(entry = %entry.id))]
    pub fn fetch(
        &self,
        entry: &ManifestEntry,
        on_bytes: &mut dyn FnMut(u64, Option<u64>),
    ) -> VestureResult<PathBuf> {
        let dest = entry.local_path(self.root);
        let part = entry.partial_path(self.root);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VestureError::asset(format!("create '{}': {e}", parent.display()))
            })?;
        }

        let mut offset = std::fs::metadata(&part).map(|m| m.len()).unwrap_or(0);
        if let Some(expected) = entry.expected_size {
            if offset > expected {
                tracing::warn!(offset, expected, "partial file larger than expected; restarting");
                remove_if_exists(&part)?;
                offset = 0;
            } else if offset == expected && offset > 0 {
                on_bytes(offset, Some(expected));
                return self.finish(entry, &part, &dest);
            }
        }

        let stream = self.transport.open(&entry.url, offset)?;
        if !stream.is_success() {
            return Err(VestureError::http_status(stream.status, &entry.url));
        }
        if offset > 0 && !stream.is_partial() {
            tracing::debug!(offset, "server ignored range request; restarting from zero");
            offset = 0;
        }
        if offset > 0 {
            tracing::info!(offset, "resuming transfer");
        }

        let mut file = if offset > 0 {
            OpenOptions::new().append(true).open(&part)
        } else {
            File::create(&part)
        }
        .map_err(|e| VestureError::asset(format!("open '{}': {e}", part.display())))?;

        let total = stream
            .content_length
            .map(|len| len + offset)
            .or(entry.expected_size);
        let mut body = stream.body;
        let mut buf = vec![0u8; CHUNK];
        let mut done = offset;
        on_bytes(done, total);
        loop {
            let n = match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(VestureError::transport(format!(
                        "read body of {}: {e}",
                        entry.url
                    )));
                }
            };
            file.write_all(&buf[..n])
                .map_err(|e| VestureError::asset(format!("write '{}': {e}", part.display())))?;
            done += n as u64;
            on_bytes(done, total);
        }
        file.flush()
            .map_err(|e| VestureError::asset(format!("flush '{}': {e}", part.display())))?;
        drop(file);

        self.finish(entry, &part, &dest)
    }

    fn finish(&self, entry: &ManifestEntry, part: &Path, dest: &Path) -> VestureResult<PathBuf> {
        let len = std::fs::metadata(part)
            .map_err(|e| VestureError::asset(format!("stat '{}': {e}", part.display())))?
            .len();
        if len == 0 {
            remove_if_exists(part)?;
            return Err(VestureError::asset(format!("'{}' downloaded empty", entry.id)));
        }
        if let Some(expected) = entry.expected_size
            && len != expected
        {
            remove_if_exists(part)?;
            return Err(VestureError::asset(format!(
                "'{}' is {len} bytes, expected {expected}",
                entry.id
            )));
        }
        if let Some(want) = &entry.sha256 {
            let got = sha256_file(part)?;
            if !got.eq_ignore_ascii_case(want) {
                remove_if_exists(part)?;
                return Err(VestureError::asset(format!(
                    "'{}' checksum mismatch: expected {want}, got {got}",
                    entry.id
                )));
            }
        }
        std::fs::rename(part, dest).map_err(|e| {
            VestureError::asset(format!(
                "rename '{}' to '{}': {e}",
                part.display(),
                dest.display()
            ))
        })?;
        tracing::info!(entry = %entry.id, bytes = len, "download complete");
        Ok(dest.to_path_buf())
    }
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> VestureResult<String> {
    let f = File::open(path)
        .map_err(|e| VestureError::asset(format!("open '{}': {e}", path.display())))?;
    let mut reader = BufReader::new(f);
    let mut hasher = sha2::Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| VestureError::asset(format!("read '{}': {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/assets/download.rs"]
mod tests;
