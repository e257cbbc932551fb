//! The module contains the errors the report engine can return.
//!
//! The errors are:
//!
//! - [`NotFound`] thrown when a report code is unknown or inactive.
//! - [`Config`] thrown when stored report metadata is malformed.
//! - [`Query`] thrown when the data store fails to run a report query.
//! - [`Calculation`] thrown by a summary script. The pipeline never lets it
//!   escape: totals fall back to an empty mapping.
//! - [`Render`] thrown when the document writer fails.
//! - [`Timeout`] and [`Cancelled`] thrown when the caller aborts a request.
//! - [`Database`] thrown when the metadata store fails.
//!
//!  [`NotFound`]: EngineError::NotFound
//!  [`Config`]: EngineError::Config
//!  [`Query`]: EngineError::Query
//!  [`Calculation`]: EngineError::Calculation
//!  [`Render`]: EngineError::Render
//!  [`Database`]: EngineError::Database
//!  [`Timeout`]: EngineError::Timeout
//!  [`Cancelled`]: EngineError::Cancelled
use std::time::Duration;

use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" report not found!")]
    NotFound(String),
    #[error("Invalid report metadata: {0}")]
    Config(String),
    #[error("Report query failed: {0}")]
    Query(#[source] DbErr),
    #[error("Summary calculation failed: {0}")]
    Calculation(String),
    #[error("Export rendering failed: {0}")]
    Render(String),
    #[error("Report query timed out after {0:?}")]
    Timeout(Duration),
    #[error("Report request cancelled")]
    Cancelled,
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl From<rust_xlsxwriter::XlsxError> for EngineError {
    fn from(value: rust_xlsxwriter::XlsxError) -> Self {
        Self::Render(value.to_string())
    }
}

impl From<csv::Error> for EngineError {
    fn from(value: csv::Error) -> Self {
        Self::Render(value.to_string())
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::Config(a), Self::Config(b)) => a == b,
            (Self::Query(a), Self::Query(b)) => a.to_string() == b.to_string(),
            (Self::Calculation(a), Self::Calculation(b)) => a == b,
            (Self::Render(a), Self::Render(b)) => a == b,
            (Self::Timeout(a), Self::Timeout(b)) => a == b,
            (Self::Cancelled, Self::Cancelled) => true,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
