//! Deterministic claim queries
//!
//! Queries select ids from a [`CanonIndex`] and fetch claims through a
//! [`ClaimRetriever`], so query logic never touches storage directly.

use crate::canonical::sha256_hex;
use crate::error::{StorageError, StorageResult};
use crate::index::{load_index, CanonIndex};
use crate::manifest::{load_manifest, SegmentManifest};
use crate::segment::read_segment_claims;
use crate::types::{ChainHash, Claim, ClaimId, ClaimStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

/// Fetches claims by id or hash
pub trait ClaimRetriever {
    /// Claims for `ids` in the same order; unknown ids are skipped
    fn get_by_ids(&self, ids: &[ClaimId]) -> StorageResult<Vec<Claim>>;

    fn get_by_hash(&self, hash: &ChainHash) -> StorageResult<Option<Claim>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    Id,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDir {
    #[default]
    Asc,
    Desc,
}

/// Query filter; all set criteria must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryFilter {
    pub subject: Option<String>,
    pub predicate: Option<String>,
    pub status: Option<ClaimStatus>,
    pub object_entity: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub order_by: OrderBy,
    pub order_dir: OrderDir,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn status(mut self, status: ClaimStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn object_entity(mut self, entity: impl Into<String>) -> Self {
        self.object_entity = Some(entity.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn order(mut self, by: OrderBy, dir: OrderDir) -> Self {
        self.order_by = by;
        self.order_dir = dir;
        self
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub claims: Vec<Claim>,

    /// Matches before pagination
    pub total: usize,

    pub has_more: bool,

    /// Hash over the returned ids in order
    pub query_hash: String,
}

/// Hash of an ordered id list
pub fn compute_query_hash<'a>(ids: impl IntoIterator<Item = &'a ClaimId>) -> String {
    let joined: Vec<&str> = ids.into_iter().map(ClaimId::as_str).collect();
    sha256_hex(joined.join(",").as_bytes())
}

fn candidate_ids(index: &CanonIndex, filter: &QueryFilter) -> Vec<ClaimId> {
    let mut lists: Vec<&[ClaimId]> = Vec::new();
    if let Some(subject) = &filter.subject {
        lists.push(index.claim_ids_by_subject(subject));
    }
    if let Some(predicate) = &filter.predicate {
        lists.push(index.claim_ids_by_predicate(predicate));
    }
    if let Some(status) = filter.status {
        lists.push(index.claim_ids_by_status(status));
    }
    if let Some(entity) = &filter.object_entity {
        lists.push(index.claim_ids_by_object_entity(entity));
    }

    let Some((first, rest)) = lists.split_first() else {
        return index.all_claim_ids();
    };
    let others: Vec<HashSet<&ClaimId>> = rest.iter().map(|l| l.iter().collect()).collect();
    first
        .iter()
        .filter(|id| others.iter().all(|set| set.contains(id)))
        .cloned()
        .collect()
}

/// Run a filter against an index
pub fn query<R: ClaimRetriever + ?Sized>(
    index: &CanonIndex,
    retriever: &R,
    filter: &QueryFilter,
) -> StorageResult<QueryResult> {
    let mut ids = candidate_ids(index, filter);
    let total = ids.len();

    let ordered: Vec<ClaimId> = match filter.order_by {
        OrderBy::Id => {
            ids.sort();
            ids
        }
        OrderBy::Timestamp => {
            let mut claims = retriever.get_by_ids(&ids)?;
            claims.sort_by(|a, b| a.mono_ns.cmp(&b.mono_ns).then_with(|| a.id.cmp(&b.id)));
            claims.into_iter().map(|c| c.id).collect()
        }
    };

    let page: Vec<ClaimId> = {
        let iter: Box<dyn Iterator<Item = &ClaimId>> = match filter.order_dir {
            OrderDir::Asc => Box::new(ordered.iter()),
            OrderDir::Desc => Box::new(ordered.iter().rev()),
        };
        iter.skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    };

    let claims = retriever.get_by_ids(&page)?;
    let query_hash = compute_query_hash(claims.iter().map(|c| &c.id));

    Ok(QueryResult {
        has_more: filter.offset + page.len() < total,
        total,
        claims,
        query_hash,
    })
}

/// Single claim by id, if indexed
pub fn get_by_id<R: ClaimRetriever + ?Sized>(
    index: &CanonIndex,
    retriever: &R,
    id: &ClaimId,
) -> StorageResult<Option<Claim>> {
    if !index.has_claim_id(id) {
        return Ok(None);
    }
    Ok(retriever.get_by_ids(std::slice::from_ref(id))?.into_iter().next())
}

/// Claims held in memory, in insertion order
#[derive(Debug, Clone, Default)]
pub struct InMemoryClaimRetriever {
    claims: HashMap<ClaimId, Claim>,
    by_hash: HashMap<ChainHash, ClaimId>,
    order: Vec<ClaimId>,
}

impl InMemoryClaimRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a claim
    pub fn add_claim(&mut self, claim: Claim) {
        if !self.claims.contains_key(&claim.id) {
            self.order.push(claim.id.clone());
        }
        self.by_hash.insert(claim.hash.clone(), claim.id.clone());
        self.claims.insert(claim.id.clone(), claim);
    }

    pub fn all_claims(&self) -> Vec<Claim> {
        self.order.iter().filter_map(|id| self.claims.get(id)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<Claim> for InMemoryClaimRetriever {
    fn from_iter<I: IntoIterator<Item = Claim>>(iter: I) -> Self {
        let mut retriever = Self::new();
        for claim in iter {
            retriever.add_claim(claim);
        }
        retriever
    }
}

impl ClaimRetriever for InMemoryClaimRetriever {
    fn get_by_ids(&self, ids: &[ClaimId]) -> StorageResult<Vec<Claim>> {
        Ok(ids.iter().filter_map(|id| self.claims.get(id)).cloned().collect())
    }

    fn get_by_hash(&self, hash: &ChainHash) -> StorageResult<Option<Claim>> {
        Ok(self.by_hash.get(hash).and_then(|id| self.claims.get(id)).cloned())
    }
}

/// Reads claims straight from segment files using index offsets
///
/// Records are returned as written, so status reflects creation time.
#[derive(Debug, Clone)]
pub struct SegmentClaimRetriever {
    dir: PathBuf,
    manifest: SegmentManifest,
    index: CanonIndex,
}

impl SegmentClaimRetriever {
    pub fn new(dir: impl Into<PathBuf>, manifest: SegmentManifest, index: CanonIndex) -> Self {
        Self {
            dir: dir.into(),
            manifest,
            index,
        }
    }

    /// Load manifest and index from a storage directory
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        let manifest = load_manifest(&dir)?
            .ok_or_else(|| StorageError::Corrupt(format!("no manifest in {}", dir.display())))?;
        let index = load_index(&dir)?
            .ok_or_else(|| StorageError::Corrupt(format!("no index in {}", dir.display())))?;
        Ok(Self::new(dir, manifest, index))
    }

    pub fn index(&self) -> &CanonIndex {
        &self.index
    }

    fn read_segment(&self, segment_id: &str) -> StorageResult<Vec<Claim>> {
        let entry = self
            .manifest
            .get(segment_id)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown segment {}", segment_id)))?;
        read_segment_claims(&self.dir, entry)
    }
}

impl ClaimRetriever for SegmentClaimRetriever {
    fn get_by_ids(&self, ids: &[ClaimId]) -> StorageResult<Vec<Claim>> {
        let mut segments: BTreeMap<&str, Vec<Claim>> = BTreeMap::new();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(offset) = self.index.claim_offset(id) else {
                continue;
            };
            if !segments.contains_key(offset.segment_id.as_str()) {
                segments.insert(&offset.segment_id, self.read_segment(&offset.segment_id)?);
            }
            let claim = segments
                .get(offset.segment_id.as_str())
                .and_then(|claims| claims.get(offset.line_number as usize))
                .filter(|c| &c.id == id)
                .ok_or_else(|| {
                    StorageError::Corrupt(format!(
                        "claim {} not at {}:{}",
                        id, offset.segment_id, offset.line_number
                    ))
                })?;
            out.push(claim.clone());
        }
        Ok(out)
    }

    fn get_by_hash(&self, hash: &ChainHash) -> StorageResult<Option<Claim>> {
        for entry in &self.manifest.segments {
            if let Some(claim) = read_segment_claims(&self.dir, entry)?
                .into_iter()
                .find(|c| &c.hash == hash)
            {
                return Ok(Some(claim));
            }
        }
        Ok(None)
    }
}
