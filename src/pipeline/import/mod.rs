//! Ingestion: archive entries → XML elements → filtered field records → rows.

pub mod archive;
pub mod xml;
pub mod assembler;
pub mod importer;

pub use archive::*;
pub use xml::*;
pub use assembler::*;
pub use importer::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported archive format: {0}")]
    UnsupportedArchive(PathBuf),

    #[error("Malformed XML in {entry}: {source}")]
    Xml {
        entry: String,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to import table {table}: {source}")]
    Insert {
        table: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Import cancelled")]
    Cancelled,
}
