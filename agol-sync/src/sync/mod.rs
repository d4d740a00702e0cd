//! Moteur de synchronisation: lots, reprise, rapprochement et orchestration

pub mod batch;
pub mod orchestrator;
pub mod retry;
pub mod upsert;

pub use batch::{Batch, BatchBuilder, DEFAULT_BATCH_SIZE};
pub use orchestrator::{preflight, SyncOrchestrator};
pub use retry::{
    match_message, AfterBackoff, Disposition, RetryClassifier, RetryReason, RollbackSignal,
};
pub use upsert::{where_clause, Resolution, UpsertMatcher, UpsertReport};
