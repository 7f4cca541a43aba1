pub mod cancel;
pub mod import;
pub mod fulladdress;
pub mod lexeme;
pub mod orchestrator;

pub use cancel::CancelFlag;
pub use orchestrator::{run_import, RunSummary};

use thiserror::Error;

use crate::config::ConfigError;
use crate::db::DatabaseError;
use import::ImportError;
use lexeme::IndexError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Lexeme indexing failed: {0}")]
    Index(#[from] IndexError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    Join(String),
}

impl PipelineError {
    /// True when the run stopped because of a cancel request rather than a fault.
    ///
    /// Walks the whole `source()` chain, so an interrupt wrapped by any stage
    /// error (an insert naming its table, a lexeme batch) still counts.
    pub fn is_cancellation(&self) -> bool {
        if matches!(self, Self::Cancelled) {
            return true;
        }
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = current {
            if is_cancel_marker(err) {
                return true;
            }
            current = err.source();
        }
        false
    }
}

fn is_cancel_marker(err: &(dyn std::error::Error + 'static)) -> bool {
    matches!(err.downcast_ref::<DatabaseError>(), Some(DatabaseError::Interrupted))
        || matches!(err.downcast_ref::<ImportError>(), Some(ImportError::Cancelled))
        || matches!(err.downcast_ref::<IndexError>(), Some(IndexError::Cancelled))
}

/// Render an error with its `source()` chain: `outer: inner: root`.
///
/// Messages already repeated by the outer error (the `{0}` style wrappers)
/// are not printed twice.
pub fn describe_error(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
