use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{VestureError, VestureResult};

/// Suffix of in-progress transfers. A file with this suffix never counts as present.
pub const PARTIAL_SUFFIX: &str = "part";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    Zip,
}

/// One required model file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub url: String,
    /// Path below the model root, `/`-separated.
    pub relative_path: String,
    #[serde(default)]
    pub expected_size: Option<u64>,
    /// Lowercase hex SHA-256 of the finished file.
    #[serde(default)]
    pub sha256: Option<String>,
    /// Archives are unpacked next to themselves after download.
    #[serde(default)]
    pub archive: Option<ArchiveKind>,
}

impl ManifestEntry {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        relative_path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            relative_path: relative_path.into(),
            expected_size: None,
            sha256: None,
            archive: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn with_sha256(mut self, hex: impl Into<String>) -> Self {
        self.sha256 = Some(hex.into());
        self
    }

    pub fn with_archive(mut self, kind: ArchiveKind) -> Self {
        self.archive = Some(kind);
        self
    }

    pub fn local_path(&self, root: &Path) -> PathBuf {
        root.join(&self.relative_path)
    }

    pub fn partial_path(&self, root: &Path) -> PathBuf {
        let mut p = self.local_path(root).into_os_string();
        p.push(".");
        p.push(PARTIAL_SUFFIX);
        PathBuf::from(p)
    }

    /// Directory an archive entry is unpacked into: its path without the extension.
    pub fn extract_dir(&self, root: &Path) -> Option<PathBuf> {
        self.archive.map(|_| self.local_path(root).with_extension(""))
    }

    /// Present means the final file exists with a nonzero size.
    pub fn is_present(&self, root: &Path) -> bool {
        std::fs::metadata(self.local_path(root))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    fn validate(&self) -> VestureResult<()> {
        if self.id.trim().is_empty() {
            return Err(VestureError::validation("manifest entry id must be non-empty"));
        }
        if self.url.trim().is_empty() {
            return Err(VestureError::validation(format!(
                "manifest entry '{}' has an empty url",
                self.id
            )));
        }
        let rel = Path::new(&self.relative_path);
        let normal = rel.components().all(|c| matches!(c, Component::Normal(_)));
        if self.relative_path.is_empty() || !normal {
            return Err(VestureError::validation(format!(
                "manifest entry '{}' path '{}' must be relative without '..'",
                self.id, self.relative_path
            )));
        }
        if let Some(hex) = &self.sha256
            && (hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()))
        {
            return Err(VestureError::validation(format!(
                "manifest entry '{}' sha256 must be 64 hex digits",
                self.id
            )));
        }
        Ok(())
    }
}

/// Ordered list of files a model needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> VestureResult<Self> {
        let m = Self { entries };
        m.validate()?;
        Ok(m)
    }

    pub fn load(path: &Path) -> VestureResult<Self> {
        let f = File::open(path).with_context(|| format!("open manifest '{}'", path.display()))?;
        let m: Manifest = serde_json::from_reader(BufReader::new(f))?;
        m.validate()?;
        Ok(m)
    }

    /// The split stable-diffusion inpainting model served from `base_url`.
    pub fn stable_diffusion_inpaint(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let entry = |id: &str, rel: &str| ManifestEntry::new(id, format!("{base}/{rel}"), rel);
        Self {
            entries: vec![
                entry("text_encoder", "text_encoder/model.onnx"),
                entry("unet_part1", "unet/part1.onnx"),
                entry("unet_part2", "unet/part2.onnx"),
                entry("vae_encoder", "vae_encoder/model.onnx"),
                entry("vae_decoder", "vae_decoder/model.onnx"),
                entry("tokenizer", "tokenizer.zip").with_archive(ArchiveKind::Zip),
            ],
        }
    }

    pub fn validate(&self) -> VestureResult<()> {
        if self.entries.is_empty() {
            return Err(VestureError::validation("manifest must list at least one file"));
        }
        let mut ids = BTreeSet::new();
        let mut paths = BTreeSet::new();
        for e in &self.entries {
            e.validate()?;
            if !ids.insert(e.id.as_str()) {
                return Err(VestureError::validation(format!(
                    "duplicate manifest id '{}'",
                    e.id
                )));
            }
            if !paths.insert(e.relative_path.as_str()) {
                return Err(VestureError::validation(format!(
                    "duplicate manifest path '{}'",
                    e.relative_path
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn missing(&self, root: &Path) -> Vec<&ManifestEntry> {
        self.entries.iter().filter(|e| !e.is_present(root)).collect()
    }

    /// True iff every entry exists with nonzero size.
    pub fn is_complete(&self, root: &Path) -> bool {
        self.entries.iter().all(|e| e.is_present(root))
    }

    /// Share of overall progress each entry accounts for, summing to 1.
    ///
    /// Weights follow expected sizes when every entry declares one, and are equal otherwise.
    pub fn weights(&self) -> Vec<f64> {
        let n = self.entries.len().max(1) as f64;
        let sizes: Option<Vec<u64>> = self.entries.iter().map(|e| e.expected_size).collect();
        match sizes {
            Some(sizes) if sizes.iter().sum::<u64>() > 0 => {
                let total = sizes.iter().sum::<u64>() as f64;
                sizes.iter().map(|&s| s as f64 / total).collect()
            }
            _ => vec![1.0 / n; self.entries.len()],
        }
    }

    /// Delete every local file the manifest produces, partial transfers and unpacked archives
    /// included.
    pub fn clear(&self, root: &Path) -> VestureResult<()> {
        for e in &self.entries {
            remove_if_exists(&e.local_path(root))?;
            remove_if_exists(&e.partial_path(root))?;
            if let Some(dir) = e.extract_dir(root)
                && dir.is_dir()
            {
                std::fs::remove_dir_all(&dir)
                    .with_context(|| format!("remove '{}'", dir.display()))?;
            }
        }
        Ok(())
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> VestureResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(VestureError::asset(format!(
            "remove '{}': {e}",
            path.display()
        ))),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/manifest.rs"]
mod tests;
