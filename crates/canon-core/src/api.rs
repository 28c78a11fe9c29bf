//! Canon API
//!
//! Single read/write surface over the guard, segment writer, index and
//! lineage. Claims are kept in memory exactly as written; supersession is
//! applied as an overlay when claims are read or indexed.

use crate::clock::{Clock, SystemClock};
use crate::config::CanonConfig;
use crate::error::{CanonError, CanonErrorCode, CanonResult, StorageResult};
use crate::guard::{CanonGuard, ClaimStore, ConflictResult};
use crate::index::{compute_index_hash, load_index, save_index, verify_index, CanonIndex, IndexBuilder};
use crate::lineage::{
    compute_prev_hash, genesis_hash, verify_all_claim_hashes, verify_lineage_chain, ChainVerification,
};
use crate::lock::with_lock;
use crate::manifest::{verify_manifest, ManifestVerification};
use crate::predicates::PredicateRegistry;
use crate::query::{self, ClaimRetriever, QueryFilter, QueryResult};
use crate::segment::{ClaimOffset, SegmentOptions, SegmentWriter};
use crate::types::{
    ChainHash, Claim, ClaimId, ClaimStatus, CreateClaimParams, EntityId, PredicateId,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const NOT_INITIALIZED: &str = "Canon API not initialized";

/// Storage statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonStats {
    pub claim_count: u64,
    pub segment_count: u64,
    pub total_bytes: u64,
    pub index_size: u64,

    /// `mono_ns` of the most recent claim
    pub last_claim_at: Option<u64>,

    pub chain_valid: bool,
}

/// Full re-verification of what is on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub valid: bool,
    pub chain: ChainVerification,

    /// First claim whose stored hash does not match its content
    pub hash_mismatch_at: Option<usize>,

    pub manifest: ManifestVerification,
    pub index_valid: bool,
}

struct CanonState {
    writer: SegmentWriter,

    /// As written, in chain order
    claims: Vec<Claim>,
    offsets: Vec<ClaimOffset>,
    positions: HashMap<ClaimId, usize>,
    by_hash: HashMap<ChainHash, usize>,
    superseded: HashSet<ClaimId>,
    index: CanonIndex,
}

impl CanonState {
    fn new(writer: SegmentWriter) -> Self {
        Self {
            writer,
            claims: Vec::new(),
            offsets: Vec::new(),
            positions: HashMap::new(),
            by_hash: HashMap::new(),
            superseded: HashSet::new(),
            index: CanonIndex::default(),
        }
    }

    /// Claim with supersession applied
    fn effective(&self, claim: &Claim) -> Claim {
        let mut claim = claim.clone();
        if self.superseded.contains(&claim.id) {
            claim.status = ClaimStatus::Superseded;
        }
        claim
    }

    fn claim_at(&self, position: usize) -> Option<Claim> {
        self.claims.get(position).map(|c| self.effective(c))
    }

    fn push(&mut self, claim: Claim, offset: ClaimOffset) {
        let position = self.claims.len();
        self.positions.insert(claim.id.clone(), position);
        self.by_hash.insert(claim.hash.clone(), position);
        if let Some(target) = &claim.supersedes {
            self.superseded.insert(target.clone());
        }
        self.claims.push(claim);
        self.offsets.push(offset);
    }

    /// Reload every claim from the segment files
    fn replay(&mut self) -> StorageResult<()> {
        self.claims.clear();
        self.offsets.clear();
        self.positions.clear();
        self.by_hash.clear();
        self.superseded.clear();
        for (offset, claim) in self.writer.read_all()? {
            self.push(claim, offset);
        }
        Ok(())
    }

    fn rebuild_index(&self, built_at: u64) -> CanonIndex {
        let mut builder = IndexBuilder::new();
        for (claim, offset) in self.claims.iter().zip(&self.offsets) {
            builder.add(&self.effective(claim), offset.clone());
        }
        builder.finish(built_at)
    }

    /// Use `index.json` when it verifies and covers exactly the replayed claims
    fn load_or_rebuild_index(&mut self, config: &CanonConfig, built_at: u64) -> StorageResult<()> {
        let expected_hash = compute_index_hash(self.positions.keys());
        match load_index(self.writer.dir()) {
            Ok(Some(index)) if verify_index(&index) && index.index_hash == expected_hash => {
                self.index = index;
                // statuses may lag if another process superseded claims
                for id in &self.superseded {
                    self.index.set_status(id, ClaimStatus::Superseded);
                }
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Discarding unreadable index"),
        }
        self.index = self.rebuild_index(built_at);
        save_index(self.writer.dir(), &self.index, config.lock_options())?;
        tracing::info!(claims = self.index.claim_count, "Rebuilt index");
        Ok(())
    }

    /// Catch up with claims appended by another process; the caller holds the lock
    fn sync_external(&mut self, clock: &dyn Clock) -> StorageResult<()> {
        if self.writer.reload_manifest()?
            && self.writer.manifest().total_claims != self.claims.len() as u64
        {
            self.replay()?;
            self.index = self.rebuild_index(clock.now_ns());
            tracing::info!(claims = self.claims.len(), "Synchronized with external writes");
        }
        Ok(())
    }
}

impl ClaimStore for CanonState {
    fn get_by_id(&self, id: &ClaimId) -> Option<Claim> {
        self.positions.get(id).and_then(|&p| self.claim_at(p))
    }

    fn get_by_subject_and_predicate(&self, subject: &str, predicate: &str) -> Vec<Claim> {
        self.index
            .claim_ids_by_subject_and_predicate(subject, predicate)
            .iter()
            .filter_map(|id| self.get_by_id(id))
            .collect()
    }

    fn all_entity_ids(&self) -> Vec<EntityId> {
        self.index
            .by_subject
            .keys()
            .filter_map(|s| EntityId::new(s.as_str()).ok())
            .collect()
    }
}

impl ClaimRetriever for CanonState {
    fn get_by_ids(&self, ids: &[ClaimId]) -> StorageResult<Vec<Claim>> {
        Ok(ids.iter().filter_map(|id| self.get_by_id(id)).collect())
    }

    fn get_by_hash(&self, hash: &ChainHash) -> StorageResult<Option<Claim>> {
        Ok(self.by_hash.get(hash).and_then(|&p| self.claim_at(p)))
    }
}

/// The Canon store
pub struct CanonApi {
    config: CanonConfig,
    clock: Arc<dyn Clock>,
    guard: CanonGuard,
    state: RwLock<Option<CanonState>>,
}

impl std::fmt::Debug for CanonApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonApi")
            .field("storage_dir", &self.config.storage_dir)
            .field("guard_enabled", &self.config.guard_enabled)
            .finish()
    }
}

impl CanonApi {
    /// Uninitialized store using the system clock and built-in catalog
    pub fn new(config: CanonConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock::new()),
            guard: CanonGuard::default(),
            state: RwLock::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_catalog(mut self, catalog: PredicateRegistry) -> Self {
        self.guard = CanonGuard::new(catalog);
        self
    }

    pub fn config(&self) -> &CanonConfig {
        &self.config
    }

    /// Shared predicate catalog handle
    pub fn catalog(&self) -> &PredicateRegistry {
        self.guard.catalog()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Option<CanonState>> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Option<CanonState>> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn with_state<T>(&self, f: impl FnOnce(&CanonState) -> T) -> T {
        let guard = self.read_state();
        match guard.as_ref() {
            Some(state) => f(state),
            None => panic!("{}", NOT_INITIALIZED),
        }
    }

    /// Open storage, replay segments and load or rebuild the index
    pub fn init(&self) -> CanonResult<()> {
        let mut slot = self.write_state();
        if slot.is_some() {
            return Ok(());
        }

        if let Some(catalog) = self
            .config
            .load_catalog()
            .map_err(|e| CanonError::storage(e.to_string()))?
        {
            self.catalog().load_catalog(catalog)?;
        }

        let writer = SegmentWriter::open(&self.config.storage_dir, SegmentOptions::from(&self.config))?;
        let mut state = CanonState::new(writer);
        let lock_path = state.writer.lock_path();
        with_lock(&lock_path, self.config.lock_options(), || -> StorageResult<()> {
            state.writer.reload_manifest()?;
            state.replay()
        })?;
        state.load_or_rebuild_index(&self.config, self.clock.now_ns())?;

        let chain = verify_lineage_chain(&state.claims);
        if !chain.valid {
            tracing::warn!(broken_at = ?chain.broken_at, "Canon chain is broken");
        }
        tracing::info!(
            storage_dir = %self.config.storage_dir.display(),
            claims = state.claims.len(),
            segments = state.writer.manifest().segments.len(),
            "Canon initialized"
        );

        *slot = Some(state);
        Ok(())
    }

    /// Persist index and manifest; later use requires `init` again
    pub fn close(&self) -> CanonResult<()> {
        let mut slot = self.write_state();
        let Some(mut state) = slot.take() else {
            return Ok(());
        };
        save_index(state.writer.dir(), &state.index, self.config.lock_options())?;
        state.writer.close()?;
        tracing::info!(claims = state.claims.len(), "Canon closed");
        Ok(())
    }

    /// Validate, guard, chain and append a new claim
    ///
    /// Nothing is written unless every check passes.
    pub fn create_claim(&self, params: CreateClaimParams) -> CanonResult<Claim> {
        let mut slot = self.write_state();
        let Some(state) = slot.as_mut() else {
            panic!("{}", NOT_INITIALIZED);
        };

        // resync, guard, chain link and append form one critical section
        // across every writer of the directory
        let lock_path = state.writer.lock_path();
        let lock = state.writer.lock_options();
        with_lock(&lock_path, lock, || self.create_claim_locked(state, params))
    }

    fn create_claim_locked(&self, state: &mut CanonState, params: CreateClaimParams) -> CanonResult<Claim> {
        state.sync_external(self.clock.as_ref())?;

        let report = self.guard.validate_claim_params(&params);
        if let Some(err) = report.first_error() {
            tracing::warn!(code = %err.code, "Claim rejected by validation");
            return Err(err.clone());
        }

        if self.config.guard_enabled {
            if let Some(err) = self.guard.check_direct_conflict(&params, &*state).to_error() {
                tracing::warn!(code = %err.code, subject = %params.subject, "Claim rejected by guard");
                return Err(err);
            }
        }

        let mono_ns = self.clock.now_ns();
        let id = ClaimId::generate(mono_ns);
        if state.positions.contains_key(&id) {
            return Err(CanonError::new(
                CanonErrorCode::DuplicateId,
                format!("claim id {} already exists", id),
            ));
        }

        if let Some(target) = &params.supersedes {
            if state.get_by_id(target).is_none() {
                return Err(CanonError::new(
                    CanonErrorCode::EntityNotFound,
                    format!("superseded claim {} does not exist", target),
                ));
            }
            let cycle = self.guard.check_supersession_loop(Some(&id), target, &*state);
            if let Some(err) = cycle.to_error() {
                tracing::warn!(code = %err.code, "Claim rejected by guard");
                return Err(err);
            }
        }

        let mut claim = Claim {
            prev_hash: compute_prev_hash(state.claims.last()),
            hash: genesis_hash(),
            id,
            subject: EntityId::new(params.subject)?,
            predicate: PredicateId::new(params.predicate)?,
            value: params.value,
            mono_ns,
            version: state.claims.len() as u64 + 1,
            lineage: params.lineage,
            evidence: params.evidence,
            supersedes: params.supersedes,
            status: params.status.unwrap_or(ClaimStatus::Active),
        };
        claim.hash = claim.compute_hash()?;

        let offset = state.writer.append_locked(&claim)?;
        state.index.insert(&claim, offset.clone(), mono_ns);
        if let Some(target) = &claim.supersedes {
            state.index.set_status(target, ClaimStatus::Superseded);
        }
        state.push(claim.clone(), offset);

        tracing::info!(
            claim_id = %claim.id,
            subject = %claim.subject,
            predicate = %claim.predicate,
            version = claim.version,
            "Claim created"
        );
        Ok(claim)
    }

    /// Direct-conflict check without writing
    pub fn check_conflicts(&self, params: &CreateClaimParams) -> ConflictResult {
        self.with_state(|state| self.guard.check_direct_conflict(params, state))
    }

    pub fn get_claim(&self, id: &ClaimId) -> Option<Claim> {
        self.with_state(|state| state.get_by_id(id))
    }

    pub fn get_claim_by_hash(&self, hash: &ChainHash) -> Option<Claim> {
        self.with_state(|state| state.by_hash.get(hash).and_then(|&p| state.claim_at(p)))
    }

    /// Every claim about `subject`, in append order
    pub fn get_claims_for_subject(&self, subject: &str) -> Vec<Claim> {
        self.with_state(|state| {
            state
                .index
                .claim_ids_by_subject(subject)
                .iter()
                .filter_map(|id| state.get_by_id(id))
                .collect()
        })
    }

    pub fn get_active_claims_by_subject_and_predicate(&self, subject: &str, predicate: &str) -> Vec<Claim> {
        self.with_state(|state| {
            state
                .get_by_subject_and_predicate(subject, predicate)
                .into_iter()
                .filter(Claim::is_active)
                .collect()
        })
    }

    /// Every claim in chain order
    pub fn get_all_claims(&self) -> Vec<Claim> {
        self.with_state(|state| state.claims.iter().map(|c| state.effective(c)).collect())
    }

    pub fn query(&self, filter: &QueryFilter) -> CanonResult<QueryResult> {
        self.with_state(|state| Ok(query::query(&state.index, state, filter)?))
    }

    /// Re-read every segment and re-verify chain, claim hashes, manifest and index
    pub fn verify_integrity(&self) -> CanonResult<IntegrityReport> {
        self.with_state(|state| {
            let on_disk: Vec<Claim> = state.writer.read_all()?.into_iter().map(|(_, c)| c).collect();
            let chain = verify_lineage_chain(&on_disk);
            let hash_mismatch_at = verify_all_claim_hashes(&on_disk);
            let manifest = verify_manifest(state.writer.dir(), state.writer.manifest())?;
            let index_valid = verify_index(&state.index);

            let valid = chain.valid && hash_mismatch_at.is_none() && manifest.valid && index_valid;
            if !valid {
                tracing::warn!(
                    chain_valid = chain.valid,
                    hash_mismatch_at = ?hash_mismatch_at,
                    mismatched_segments = ?manifest.mismatched_segments,
                    index_valid,
                    "Integrity check failed"
                );
            }
            Ok(IntegrityReport {
                valid,
                chain,
                hash_mismatch_at,
                manifest,
                index_valid,
            })
        })
    }

    pub fn get_stats(&self) -> CanonStats {
        self.with_state(|state| {
            let manifest = state.writer.manifest();
            CanonStats {
                claim_count: state.claims.len() as u64,
                segment_count: manifest.segments.len() as u64,
                total_bytes: manifest.total_bytes,
                index_size: state.index.claim_count,
                last_claim_at: state.claims.last().map(|c| c.mono_ns),
                chain_valid: verify_lineage_chain(&state.claims).valid,
            }
        })
    }
}
