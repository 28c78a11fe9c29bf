//! Append-only segment writer
//!
//! Claims are written as one canonical JSON record per line. Every physical
//! append, rotation and flush runs under the storage directory's file lock,
//! and the manifest is re-read under that lock so writers in other
//! processes are never overwritten.

use crate::canonical::canonicalize_serializable;
use crate::config::{CanonConfig, RotateStrategy};
use crate::error::{StorageError, StorageResult};
use crate::lock::{with_lock, LockOptions};
use crate::manifest::{load_manifest, save_manifest, SegmentEntry, SegmentManifest};
use crate::types::Claim;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lock file guarding the storage directory
pub const LOCK_FILE: &str = "canon.lock";

/// Physical position of a claim record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOffset {
    pub segment_id: String,

    /// Zero-based line within the segment file
    pub line_number: u64,
}

/// Writer limits and durability settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOptions {
    pub max_bytes: u64,
    pub max_claims: u64,
    pub strategy: RotateStrategy,
    pub sync_on_append: bool,
    pub lock: LockOptions,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self::from(&CanonConfig::default())
    }
}

impl From<&CanonConfig> for SegmentOptions {
    fn from(config: &CanonConfig) -> Self {
        Self {
            max_bytes: config.segment_max_bytes,
            max_claims: config.segment_max_claims,
            strategy: config.rotate_strategy,
            sync_on_append: config.sync_on_append,
            lock: config.lock_options(),
        }
    }
}

/// Append-only writer bound to one storage directory
#[derive(Debug)]
pub struct SegmentWriter {
    dir: PathBuf,
    options: SegmentOptions,
    manifest: SegmentManifest,
    closed: bool,
}

impl SegmentWriter {
    /// Open (creating if needed) the storage directory and its manifest
    pub fn open(dir: impl Into<PathBuf>, options: SegmentOptions) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let lock_path = dir.join(LOCK_FILE);
        let manifest = with_lock(&lock_path, options.lock, || -> StorageResult<SegmentManifest> {
            match load_manifest(&dir)? {
                Some(manifest) => Ok(manifest),
                None => {
                    let manifest = SegmentManifest::new();
                    save_manifest(&dir, &manifest)?;
                    Ok(manifest)
                }
            }
        })?;

        Ok(Self {
            dir,
            options,
            manifest,
            closed: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &SegmentManifest {
        &self.manifest
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Pick up appends made by other writers; true when the manifest changed
    pub fn reload_manifest(&mut self) -> StorageResult<bool> {
        match load_manifest(&self.dir)? {
            Some(latest) if latest != self.manifest => {
                self.manifest = latest;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Lock file serializing every writer of this directory
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    pub fn lock_options(&self) -> LockOptions {
        self.options.lock
    }

    fn should_rotate(&self, current: &SegmentEntry, record_bytes: u64) -> bool {
        match self.options.strategy {
            RotateStrategy::Size => {
                current.claim_count > 0 && current.byte_size + record_bytes > self.options.max_bytes
            }
            RotateStrategy::ClaimCount => current.claim_count >= self.options.max_claims.max(1),
            RotateStrategy::Never => false,
        }
    }

    /// Write one claim record, rotating first if the current segment is full
    pub fn append(&mut self, claim: &Claim) -> StorageResult<ClaimOffset> {
        let lock_path = self.lock_path();
        let lock = self.options.lock;
        with_lock(&lock_path, lock, || self.append_locked(claim))
    }

    /// [`append`](Self::append) for a caller that already holds the lock
    ///
    /// A failed append leaves both the segment file and the manifest as
    /// they were.
    pub fn append_locked(&mut self, claim: &Claim) -> StorageResult<ClaimOffset> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        let line = canonicalize_serializable(claim)?;
        if let Some(latest) = load_manifest(&self.dir)? {
            self.manifest = latest;
        }

        let before = self.manifest.clone();
        let mut written: Option<(PathBuf, u64)> = None;
        let result = self.write_record(claim, &line, &mut written);

        if result.is_err() {
            self.manifest = before;
            if let Some((path, len)) = written {
                if let Err(e) = truncate_segment(&path, len) {
                    tracing::error!(path = %path.display(), error = %e, "Failed to roll back segment");
                }
            }
        }
        result
    }

    fn write_record(
        &mut self,
        claim: &Claim,
        line: &str,
        written: &mut Option<(PathBuf, u64)>,
    ) -> StorageResult<ClaimOffset> {
        let record_bytes = line.len() as u64 + 1;
        let rotate = match self.manifest.current() {
            None => true,
            Some(current) => self.should_rotate(current, record_bytes),
        };
        if rotate {
            let sealed = self.manifest.current().map(|s| s.id.clone());
            let opened = self.manifest.rotate().id.clone();
            tracing::info!(sealed = ?sealed, opened = %opened, "Rotated segment");
        }

        let entry = self
            .manifest
            .current_mut()
            .ok_or_else(|| StorageError::Corrupt("no current segment".to_string()))?;

        let path = self.dir.join(&entry.path);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        *written = Some((path, file.metadata()?.len()));
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        if self.options.sync_on_append {
            file.sync_data()?;
        }

        let offset = ClaimOffset {
            segment_id: entry.id.clone(),
            line_number: entry.claim_count,
        };
        entry.record(&claim.id, line);
        self.manifest.refresh();
        save_manifest(&self.dir, &self.manifest)?;

        tracing::debug!(
            claim_id = %claim.id,
            segment = %offset.segment_id,
            line = offset.line_number,
            "Appended claim"
        );
        Ok(offset)
    }

    /// Durably persist the current segment and the manifest
    pub fn flush(&mut self) -> StorageResult<()> {
        if self.closed {
            return Ok(());
        }
        let lock_path = self.lock_path();
        let lock = self.options.lock;
        with_lock(&lock_path, lock, || {
            if let Some(latest) = load_manifest(&self.dir)? {
                self.manifest = latest;
            }
            if let Some(current) = self.manifest.current() {
                let path = self.dir.join(&current.path);
                if path.exists() {
                    fs::File::open(&path)?.sync_all()?;
                }
            }
            save_manifest(&self.dir, &self.manifest)
        })
    }

    /// Flush and stop accepting appends; safe to call twice
    pub fn close(&mut self) -> StorageResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Every claim in manifest order
    pub fn read_all(&self) -> StorageResult<Vec<(ClaimOffset, Claim)>> {
        let mut out = Vec::new();
        for entry in &self.manifest.segments {
            for (line_number, claim) in read_segment_claims(&self.dir, entry)?.into_iter().enumerate() {
                out.push((
                    ClaimOffset {
                        segment_id: entry.id.clone(),
                        line_number: line_number as u64,
                    },
                    claim,
                ));
            }
        }
        Ok(out)
    }
}

/// Cut a segment back to `len` bytes, removing it if it was new
fn truncate_segment(path: &Path, len: u64) -> std::io::Result<()> {
    if len == 0 {
        return fs::remove_file(path);
    }
    OpenOptions::new().write(true).open(path)?.set_len(len)
}

/// Parse every record of one segment file
pub fn read_segment_claims(dir: &Path, entry: &SegmentEntry) -> StorageResult<Vec<Claim>> {
    let path = dir.join(&entry.path);
    if !path.exists() {
        if entry.claim_count == 0 {
            return Ok(Vec::new());
        }
        return Err(StorageError::Corrupt(format!("segment file missing: {}", path.display())));
    }
    fs::read_to_string(&path)?
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Claim>(line).map_err(|e| {
                StorageError::Corrupt(format!("{} line {}: {}", entry.path, i, e))
            })
        })
        .collect()
}
