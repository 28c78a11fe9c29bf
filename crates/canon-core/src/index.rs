//! Derived claim index
//!
//! Lookup maps from subject, predicate, status and object entity to claim
//! ids, plus the physical offset of every claim. The index is rebuilt from
//! claims at any time; its hash depends only on the set of claim ids.

use crate::canonical::sha256_hex;
use crate::error::{StorageError, StorageResult};
use crate::lock::{with_lock, LockOptions};
use crate::segment::{ClaimOffset, LOCK_FILE};
use crate::types::{Claim, ClaimId, ClaimStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Index file name inside the storage directory
pub const INDEX_FILE: &str = "index.json";

/// Ordered id lists keyed by a lookup term
pub type IdMap<K> = BTreeMap<K, Vec<ClaimId>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonIndex {
    pub by_subject: IdMap<String>,
    pub by_predicate: IdMap<String>,
    pub by_status: IdMap<ClaimStatus>,
    pub by_object_entity: IdMap<String>,
    pub claim_offsets: BTreeMap<ClaimId, ClaimOffset>,
    pub claim_count: u64,
    pub index_hash: String,

    /// Build time in nanoseconds, as a decimal string
    pub built_at: String,
}

/// Hash over a set of claim ids: sorted, comma-joined, SHA-256
pub fn compute_index_hash<'a>(ids: impl IntoIterator<Item = &'a ClaimId>) -> String {
    let mut sorted: Vec<&str> = ids.into_iter().map(ClaimId::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sha256_hex(sorted.join(",").as_bytes())
}

fn push_unique<K: Ord>(map: &mut IdMap<K>, key: K, id: &ClaimId) {
    let ids = map.entry(key).or_default();
    if !ids.contains(id) {
        ids.push(id.clone());
    }
}

fn merge_maps<K: Ord + Clone>(a: &IdMap<K>, b: &IdMap<K>) -> IdMap<K> {
    let mut out = a.clone();
    for (key, ids) in b {
        let target = out.entry(key.clone()).or_default();
        let mut seen: HashSet<ClaimId> = target.iter().cloned().collect();
        target.extend(ids.iter().filter(|id| seen.insert((*id).clone())).cloned());
    }
    out
}

/// Incremental index construction
#[derive(Debug, Default)]
pub struct IndexBuilder {
    index: CanonIndex,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, claim: &Claim, offset: ClaimOffset) -> &mut Self {
        self.index.add_entry(claim, offset);
        self
    }

    pub fn finish(mut self, built_at: u64) -> CanonIndex {
        self.index.seal(built_at);
        self.index
    }
}

impl Default for CanonIndex {
    fn default() -> Self {
        Self::empty(0)
    }
}

impl CanonIndex {
    /// Index over no claims
    pub fn empty(built_at: u64) -> Self {
        Self {
            by_subject: BTreeMap::new(),
            by_predicate: BTreeMap::new(),
            by_status: BTreeMap::new(),
            by_object_entity: BTreeMap::new(),
            claim_offsets: BTreeMap::new(),
            claim_count: 0,
            index_hash: compute_index_hash(std::iter::empty()),
            built_at: built_at.to_string(),
        }
    }

    fn add_entry(&mut self, claim: &Claim, offset: ClaimOffset) {
        push_unique(&mut self.by_subject, claim.subject.as_str().to_string(), &claim.id);
        push_unique(&mut self.by_predicate, claim.predicate.as_str().to_string(), &claim.id);
        push_unique(&mut self.by_status, claim.status, &claim.id);
        if let Some(entity) = claim.object_entity() {
            push_unique(&mut self.by_object_entity, entity.to_string(), &claim.id);
        }
        self.claim_offsets.insert(claim.id.clone(), offset);
    }

    /// Add one claim and reseal
    pub fn insert(&mut self, claim: &Claim, offset: ClaimOffset, built_at: u64) {
        self.add_entry(claim, offset);
        self.seal(built_at);
    }

    /// Move a claim to another status list; the hash is unaffected
    pub fn set_status(&mut self, id: &ClaimId, status: ClaimStatus) {
        for ids in self.by_status.values_mut() {
            ids.retain(|existing| existing != id);
        }
        self.by_status.retain(|_, ids| !ids.is_empty());
        push_unique(&mut self.by_status, status, id);
    }

    fn seal(&mut self, built_at: u64) {
        self.claim_count = self.claim_offsets.len() as u64;
        self.index_hash = compute_index_hash(self.claim_offsets.keys());
        self.built_at = built_at.to_string();
    }

    pub fn has_claim_id(&self, id: &ClaimId) -> bool {
        self.claim_offsets.contains_key(id)
    }

    pub fn claim_offset(&self, id: &ClaimId) -> Option<&ClaimOffset> {
        self.claim_offsets.get(id)
    }

    /// Every indexed id, sorted
    pub fn all_claim_ids(&self) -> Vec<ClaimId> {
        self.claim_offsets.keys().cloned().collect()
    }

    pub fn claim_ids_by_subject(&self, subject: &str) -> &[ClaimId] {
        self.by_subject.get(subject).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn claim_ids_by_predicate(&self, predicate: &str) -> &[ClaimId] {
        self.by_predicate.get(predicate).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn claim_ids_by_status(&self, status: ClaimStatus) -> &[ClaimId] {
        self.by_status.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn claim_ids_by_object_entity(&self, entity: &str) -> &[ClaimId] {
        self.by_object_entity.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids carrying both the subject and the predicate, in subject-list order
    pub fn claim_ids_by_subject_and_predicate(&self, subject: &str, predicate: &str) -> Vec<ClaimId> {
        let with_predicate: HashSet<&ClaimId> = self.claim_ids_by_predicate(predicate).iter().collect();
        self.claim_ids_by_subject(subject)
            .iter()
            .filter(|id| with_predicate.contains(id))
            .cloned()
            .collect()
    }
}

/// Index a run of claims stored consecutively in one segment
pub fn build_index(claims: &[Claim], segment_id: &str, built_at: u64) -> CanonIndex {
    let mut builder = IndexBuilder::new();
    for (line, claim) in claims.iter().enumerate() {
        builder.add(
            claim,
            ClaimOffset {
                segment_id: segment_id.to_string(),
                line_number: line as u64,
            },
        );
    }
    builder.finish(built_at)
}

/// Union of two indexes; the hash depends only on the union of ids
pub fn merge_indexes(a: &CanonIndex, b: &CanonIndex, built_at: u64) -> CanonIndex {
    let mut claim_offsets = a.claim_offsets.clone();
    for (id, offset) in &b.claim_offsets {
        claim_offsets.entry(id.clone()).or_insert_with(|| offset.clone());
    }
    let mut merged = CanonIndex {
        by_subject: merge_maps(&a.by_subject, &b.by_subject),
        by_predicate: merge_maps(&a.by_predicate, &b.by_predicate),
        by_status: merge_maps(&a.by_status, &b.by_status),
        by_object_entity: merge_maps(&a.by_object_entity, &b.by_object_entity),
        claim_offsets,
        claim_count: 0,
        index_hash: String::new(),
        built_at: String::new(),
    };
    merged.seal(built_at);
    merged
}

/// Whether the stored hash and count match the indexed ids
pub fn verify_index(index: &CanonIndex) -> bool {
    index.claim_count == index.claim_offsets.len() as u64
        && index.index_hash == compute_index_hash(index.claim_offsets.keys())
}

/// Write `index.json` under the storage lock
pub fn save_index(dir: &Path, index: &CanonIndex, lock: LockOptions) -> StorageResult<()> {
    with_lock(dir.join(LOCK_FILE), lock, || {
        let path = dir.join(INDEX_FILE);
        let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(index)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    })
}

/// Read `index.json`; `None` when absent
pub fn load_index(dir: &Path) -> StorageResult<Option<CanonIndex>> {
    let path = dir.join(INDEX_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let index: CanonIndex = serde_json::from_str(&fs::read_to_string(&path)?)
        .map_err(|e| StorageError::Corrupt(format!("{}: {}", path.display(), e)))?;
    Ok(Some(index))
}
