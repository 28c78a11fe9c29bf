//! Segment manifest
//!
//! Tracks every segment file in append order. The manifest hash covers all
//! entries; each entry's hash is a rolling digest of its records seeded with
//! the segment id, so it depends only on content.

use crate::canonical::{hash_serializable, sha256_hex};
use crate::error::{StorageError, StorageResult};
use crate::types::ClaimId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Manifest file name inside the storage directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// One segment file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentEntry {
    pub id: String,

    /// File name relative to the storage directory
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_claim_id: Option<ClaimId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_claim_id: Option<ClaimId>,

    pub claim_count: u64,
    pub byte_size: u64,

    /// Rolling content hash over the records written so far
    pub hash: String,

    /// Display only; not part of any content hash
    pub created_at: String,

    pub sealed: bool,
}

impl SegmentEntry {
    /// Fresh, empty, unsealed segment with sequence number `seq`
    pub fn new(seq: usize) -> Self {
        let id = format!("segment-{:06}", seq);
        Self {
            path: format!("{}.ndjson", id),
            hash: segment_seed_hash(&id),
            id,
            first_claim_id: None,
            last_claim_id: None,
            claim_count: 0,
            byte_size: 0,
            created_at: chrono::Utc::now().to_rfc3339(),
            sealed: false,
        }
    }

    /// Fold one record line (without newline) into the entry
    pub fn record(&mut self, claim_id: &ClaimId, line: &str) {
        if self.first_claim_id.is_none() {
            self.first_claim_id = Some(claim_id.clone());
        }
        self.last_claim_id = Some(claim_id.clone());
        self.claim_count += 1;
        self.byte_size += line.len() as u64 + 1;
        self.hash = roll_segment_hash(&self.hash, line);
    }
}

/// Starting hash of a segment
pub fn segment_seed_hash(segment_id: &str) -> String {
    sha256_hex(format!("segment:{}", segment_id).as_bytes())
}

/// Next rolling hash after appending `line`
pub fn roll_segment_hash(previous: &str, line: &str) -> String {
    let line_hash = sha256_hex(line.as_bytes());
    sha256_hex(format!("{}:{}", previous, line_hash).as_bytes())
}

/// Hash of a segment's full record content
pub fn compute_segment_hash<'a>(segment_id: &str, lines: impl IntoIterator<Item = &'a str>) -> String {
    lines
        .into_iter()
        .fold(segment_seed_hash(segment_id), |acc, line| roll_segment_hash(&acc, line))
}

/// All segments in append order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentManifest {
    pub version: u32,
    pub segments: Vec<SegmentEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_segment_id: Option<String>,

    pub total_claims: u64,
    pub total_bytes: u64,
    pub manifest_hash: String,
}

impl Default for SegmentManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentManifest {
    pub fn new() -> Self {
        let mut manifest = Self {
            version: MANIFEST_VERSION,
            segments: Vec::new(),
            current_segment_id: None,
            total_claims: 0,
            total_bytes: 0,
            manifest_hash: String::new(),
        };
        manifest.refresh();
        manifest
    }

    /// Hash over every entry
    pub fn compute_hash(&self) -> String {
        // entries hold only strings, integers and bools
        hash_serializable(&self.segments).unwrap_or_default()
    }

    /// Recompute totals and the manifest hash after entries changed
    pub fn refresh(&mut self) {
        self.total_claims = self.segments.iter().map(|s| s.claim_count).sum();
        self.total_bytes = self.segments.iter().map(|s| s.byte_size).sum();
        self.current_segment_id = self.segments.iter().find(|s| !s.sealed).map(|s| s.id.clone());
        self.manifest_hash = self.compute_hash();
    }

    pub fn current(&self) -> Option<&SegmentEntry> {
        self.segments.iter().rev().find(|s| !s.sealed)
    }

    pub fn current_mut(&mut self) -> Option<&mut SegmentEntry> {
        self.segments.iter_mut().rev().find(|s| !s.sealed)
    }

    pub fn get(&self, segment_id: &str) -> Option<&SegmentEntry> {
        self.segments.iter().find(|s| s.id == segment_id)
    }

    /// Seal the current segment and open the next one
    pub fn rotate(&mut self) -> &mut SegmentEntry {
        if let Some(current) = self.current_mut() {
            current.sealed = true;
        }
        self.segments.push(SegmentEntry::new(self.segments.len() + 1));
        self.refresh();
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    pub fn verify_hash(&self) -> bool {
        self.manifest_hash == self.compute_hash()
    }
}

/// Read `manifest.json`; `None` when absent
pub fn load_manifest(dir: &Path) -> StorageResult<Option<SegmentManifest>> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let manifest: SegmentManifest = serde_json::from_str(&fs::read_to_string(&path)?)?;
    if !manifest.verify_hash() {
        return Err(StorageError::Corrupt(format!(
            "manifest hash mismatch in {}",
            path.display()
        )));
    }
    Ok(Some(manifest))
}

/// Write `manifest.json` through a temp file and rename
pub fn save_manifest(dir: &Path, manifest: &SegmentManifest) -> StorageResult<()> {
    let path = dir.join(MANIFEST_FILE);
    let tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(serde_json::to_string_pretty(manifest)?.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, &path)?;
    Ok(())
}

pub fn load_or_create_manifest(dir: &Path) -> StorageResult<SegmentManifest> {
    Ok(load_manifest(dir)?.unwrap_or_default())
}

/// Result of checking a manifest against the files on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestVerification {
    pub valid: bool,
    pub manifest_hash_valid: bool,

    /// Segments whose content no longer matches their entry
    pub mismatched_segments: Vec<String>,
}

/// Recompute the manifest hash and every segment hash from disk
pub fn verify_manifest(dir: &Path, manifest: &SegmentManifest) -> StorageResult<ManifestVerification> {
    let manifest_hash_valid = manifest.verify_hash();
    let mut mismatched_segments = Vec::new();

    for entry in &manifest.segments {
        let path = dir.join(&entry.path);
        let content = if path.exists() {
            fs::read_to_string(&path)?
        } else {
            String::new()
        };
        let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).collect();
        let hash = compute_segment_hash(&entry.id, lines.iter().copied());
        if hash != entry.hash
            || lines.len() as u64 != entry.claim_count
            || content.len() as u64 != entry.byte_size
        {
            mismatched_segments.push(entry.id.clone());
        }
    }

    Ok(ManifestVerification {
        valid: manifest_hash_valid && mismatched_segments.is_empty(),
        manifest_hash_valid,
        mismatched_segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ClaimId {
        ClaimId::new(s).unwrap()
    }

    #[test]
    fn test_new_entry_shape() {
        let entry = SegmentEntry::new(1);
        assert_eq!(entry.id, "segment-000001");
        assert_eq!(entry.path, "segment-000001.ndjson");
        assert_eq!(entry.hash, segment_seed_hash("segment-000001"));
        assert!(!entry.sealed);
    }

    #[test]
    fn test_record_tracks_bounds() {
        let mut entry = SegmentEntry::new(1);
        entry.record(&id("CLM-1"), "{\"a\":1}");
        entry.record(&id("CLM-2"), "{\"a\":2}");
        assert_eq!(entry.first_claim_id, Some(id("CLM-1")));
        assert_eq!(entry.last_claim_id, Some(id("CLM-2")));
        assert_eq!(entry.claim_count, 2);
        assert_eq!(entry.byte_size, 16);
        assert_eq!(
            entry.hash,
            compute_segment_hash("segment-000001", ["{\"a\":1}", "{\"a\":2}"])
        );
    }

    #[test]
    fn test_segment_hash_ignores_created_at() {
        let mut a = SegmentEntry::new(3);
        let mut b = SegmentEntry::new(3);
        b.created_at = "1970-01-01T00:00:00+00:00".to_string();
        a.record(&id("CLM-1"), "x");
        b.record(&id("CLM-1"), "x");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_rotate_seals_current() {
        let mut manifest = SegmentManifest::new();
        manifest.rotate();
        manifest.rotate();
        assert_eq!(manifest.segments.len(), 2);
        assert!(manifest.segments[0].sealed);
        assert_eq!(manifest.current().unwrap().id, "segment-000002");
        assert_eq!(manifest.current_segment_id.as_deref(), Some("segment-000002"));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = SegmentManifest::new();
        manifest.rotate().record(&id("CLM-1"), "line");
        manifest.refresh();

        save_manifest(dir.path(), &manifest).unwrap();
        let loaded = load_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.manifest_hash, manifest.compute_hash());
        assert_eq!(loaded.total_claims, 1);
    }

    #[test]
    fn test_load_missing_and_tampered() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_manifest(dir.path()).unwrap().is_none());
        assert_eq!(load_or_create_manifest(dir.path()).unwrap().segments.len(), 0);

        let mut manifest = SegmentManifest::new();
        manifest.rotate();
        manifest.segments[0].claim_count = 7;
        save_manifest(dir.path(), &manifest).unwrap();
        assert!(matches!(load_manifest(dir.path()), Err(StorageError::Corrupt(_))));
    }
}
