use thiserror::Error;

use crate::BatchRow;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("row {line}: expected at least 2 fields (batch, customer), got {got}")]
    TooFewFields { line: usize, got: usize },

    #[error("row {line}: customer name is empty")]
    EmptyCustomer { line: usize },
}

impl BatchRow {
    /// Build a row from an already-decoded record. Field text is kept as
    /// given; `line` is only used for error reporting. Extra trailing fields
    /// are ignored.
    pub fn from_record<S: AsRef<str>>(record: &[S], line: usize) -> Result<Self, RowError> {
        if record.len() < 2 {
            return Err(RowError::TooFewFields { line, got: record.len() });
        }
        let customer = record[1].as_ref();
        if customer.trim().is_empty() {
            return Err(RowError::EmptyCustomer { line });
        }
        Ok(BatchRow::new(record[0].as_ref(), customer))
    }
}

/// Convert every record up front so a malformed file is rejected before a
/// single mission is written. With `has_header` the first record is skipped
/// and line numbers still count it.
pub fn rows_from_records<S: AsRef<str>>(records: &[Vec<S>], has_header: bool) -> Result<Vec<BatchRow>, RowError> {
    let skip = usize::from(has_header);
    records
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(i, rec)| BatchRow::from_record(rec, i + 1))
        .collect()
}
