//! Error types for pipeline passes.

use thiserror::Error;

use crate::extract::ExtractionError;
use crate::semantic::SemanticError;
use crate::store::StoreError;

/// Errors that stop a whole pass.
///
/// Per-record failures never surface here; they are counted in
/// [`PassStats`](super::PassStats) and logged.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Selection or a write failed at the database level.
    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    /// The extraction schema could not be generated.
    #[error("extraction schema unavailable: {0}")]
    Schema(#[source] ExtractionError),

    /// The semantic scorer cannot score anything.
    #[error("semantic scorer unavailable: {0}")]
    Scorer(#[from] SemanticError),
}
