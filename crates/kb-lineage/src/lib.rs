//! Lineage event log, drift runner, embedding-version guard, and
//! tenant-purge orchestration (spec §4.7). These are the keep-queries-
//! consistent components: everything else writes facts, this crate
//! watches for facts going stale or inconsistent.

mod drift;
mod embedding_guard;
mod purge;

pub use drift::{DriftOutcome, DriftRunner, StaleCampaignSla};
pub use embedding_guard::{EmbeddingGuard, EmbeddingGuardOutcome};
pub use purge::{PurgeOrchestrator, PurgeOutcome};
