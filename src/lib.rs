//! Item co-occurrence, PMI scoring and embedding similarity.
//!
//! Two stages, run in sequence around an external matrix-factorization
//! trainer:
//!   - CooccurrenceEngine: (item, group) memberships → filtered co-occurrence
//!     counts → optional negative samples → PMI-weighted pair scores
//!   - similarity: trainer factor-weight export → dense vectors → per-item
//!     neighbors ranked by cosine similarity
//!
//! Modules:
//!   - filters: valid items / valid groups, one-pass intersection
//!   - membership_store: concurrent membership index (DashMap)
//!   - cooccurrence: pair counting as a rayon map-reduce
//!   - negative_sampler: top-N frequent item pairs, max-merge
//!   - pmi: pmi = log2(cooc) - log2(f1) - log2(f2) + log2(total), score = cooc * pmi
//!   - handoff: trainer options and training rows
//!   - embedding / similarity: dense vectors, cosine neighbors
//!
//! Build for Python: `maturin develop --release --features extension-module`
//! Usage in Python: `import fast_cooc`

pub mod config;
pub mod cooccurrence;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod filters;
pub mod handoff;
pub mod logging;
pub mod membership_store;
pub mod negative_sampler;
pub mod pmi;
pub mod similarity;

#[cfg(feature = "python")]
pub mod python;

pub use config::{PipelineConfig, ZeroNormPolicy};
pub use cooccurrence::{count_cooccurrences, CooccurrenceTable, PairOrigin};
pub use embedding::{build_embeddings, parse_factor_rows, EmbeddingTable, FactorRow, FactorWeight};
pub use engine::{CooccurrenceEngine, EmptyReason, PmiOutcome, PmiTable};
pub use error::{PipelineError, Result};
pub use filters::{FilterReport, ItemGroupMembership};
pub use handoff::{MatrixFactorizationOptions, TrainingRow};
pub use logging::init_tracing;
pub use membership_store::MembershipStore;
pub use pmi::ScoredPair;
pub use similarity::{cosine_similarity, rank_neighbors, Neighbor, NeighborList};
