//! Search lexeme index over full addresses.
//!
//! Three pieces connected by a trait:
//! ```text
//! tokenizer (pure) → runner (batch convergence loop) → LexemeStore (fetch / write-back)
//! ```
//! The runner only ever targets rows still missing lexemes, so an aborted run
//! resumes where it stopped.

pub mod types;
pub mod tokenizer;
pub mod traits;
pub mod store;
pub mod runner;

pub use types::*;
pub use tokenizer::{expand_word, lexemes, tokenize};
pub use traits::LexemeStore;
pub use store::SqliteLexemeStore;
pub use runner::build_lexeme_index;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Lexeme indexing cancelled")]
    Cancelled,
}
