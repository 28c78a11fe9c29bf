//! Canon
//!
//! Content-addressed, hash-chained claim store.
//!
//! # Design Principles
//! - Deterministic: canonical JSON and SHA-256 for every hash
//! - Append-only: claims are never edited, only superseded
//! - Fail-closed: a rejected write leaves storage untouched

pub mod api;
pub mod canonical;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod index;
pub mod lineage;
pub mod lock;
pub mod manifest;
pub mod predicates;
pub mod query;
pub mod segment;
pub mod types;
pub mod value;

pub use api::{CanonApi, CanonStats, IntegrityReport};
pub use canonical::{canonicalize, hash_canonical, sha256_hex};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CanonConfig, RotateStrategy};
pub use error::{CanonError, CanonErrorCode, CanonResult, CanonicalizeError, LockError, StorageError};
pub use guard::{CanonGuard, ClaimStore, ConflictResult, ConflictType};
pub use index::CanonIndex;
pub use lineage::{genesis_hash, ChainVerification};
pub use predicates::{PredicateCatalog, PredicateDefinition, PredicateRegistry, TermType};
pub use query::{ClaimRetriever, OrderBy, OrderDir, QueryFilter, QueryResult};
pub use types::{
    ChainHash, Claim, ClaimId, ClaimStatus, CreateClaimParams, EntityId, Evidence, Lineage,
    LineageSource, PredicateId,
};
pub use value::CanonValue;
