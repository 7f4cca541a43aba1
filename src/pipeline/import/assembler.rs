//! Record assembly and the address-table acceptance filter.
//!
//! Address objects are kept only when they are current in the dataset
//! (`actstatus = 1`) and in the legacy classifier (`currstatus = 0`).
//! Every other table is loaded as is.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::config::is_address_table;
use crate::models::FieldRecord;

/// Fields defaulted to `"0"` on address records when absent or blank.
pub const DEFAULTED_FIELDS: [&str; 2] = ["currstatus", "operstatus"];

/// Marker stored in `recstate` for rows written by the importer.
pub const RECSTATE_ACTIVE: &str = "1";

/// Strip apostrophes and map the typographic quotes « and » to `"`.
pub fn sanitize_value(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '\'')
        .map(|c| if c == '«' || c == '»' { '"' } else { c })
        .collect()
}

/// Build a record from raw attributes: names lower-cased, values sanitized.
pub fn assemble(attributes: &[(String, String)]) -> FieldRecord {
    let mut record = FieldRecord::new();
    for (name, value) in attributes {
        record.set(name.to_lowercase(), sanitize_value(value));
    }
    record
}

pub fn apply_defaults(record: &mut FieldRecord) {
    for field in DEFAULTED_FIELDS {
        if record.is_blank(field) {
            record.set(field, "0");
        }
    }
}

/// Why an address record was filtered out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingStatus(&'static str),
    InvalidStatus { field: &'static str, value: String },
    NotActual { actstatus: i64 },
    NotCurrent { currstatus: i64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStatus(field) => write!(f, "missing {field}"),
            Self::InvalidStatus { field, value } => write!(f, "non-numeric {field}={value:?}"),
            Self::NotActual { actstatus } => write!(f, "actstatus={actstatus}"),
            Self::NotCurrent { currstatus } => write!(f, "currstatus={currstatus}"),
        }
    }
}

/// Acceptance check for a defaulted address record.
pub fn check_address_status(record: &FieldRecord) -> Result<(), Rejection> {
    let actstatus = status(record, "actstatus")?;
    if actstatus != 1 {
        return Err(Rejection::NotActual { actstatus });
    }
    let currstatus = status(record, "currstatus")?;
    if currstatus != 0 {
        return Err(Rejection::NotCurrent { currstatus });
    }
    Ok(())
}

fn status(record: &FieldRecord, field: &'static str) -> Result<i64, Rejection> {
    let value = record.get(field).ok_or(Rejection::MissingStatus(field))?;
    value.trim().parse().map_err(|_| Rejection::InvalidStatus {
        field,
        value: value.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept(FieldRecord),
    Reject(Rejection),
}

/// Turns element attributes into accept/reject decisions for one table.
#[derive(Debug, Clone)]
pub struct RecordAssembler {
    address: bool,
}

impl RecordAssembler {
    pub fn new(logical_table: &str) -> Self {
        Self {
            address: is_address_table(logical_table),
        }
    }

    pub fn is_address(&self) -> bool {
        self.address
    }

    pub fn decide(&self, attributes: &[(String, String)]) -> Decision {
        let mut record = assemble(attributes);
        if self.address {
            apply_defaults(&mut record);
            if let Err(reason) = check_address_status(&record) {
                return Decision::Reject(reason);
            }
        }
        Decision::Accept(record)
    }
}

/// Add the bookkeeping fields of a freshly imported row.
pub fn finalize(record: &mut FieldRecord, now: DateTime<Utc>) {
    let stamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);
    record.set("recid", Uuid::new_v4().to_string());
    record.set("reccreated", stamp.clone());
    record.set("recupdated", stamp);
    record.set("recstate", RECSTATE_ACTIVE);
}
