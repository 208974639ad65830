//! Defines the custom error types for the place-scout application.

use std::io;
use thiserror::Error;
use url::ParseError as UrlParseError;

/// The primary error type for the scraping and reconciliation process.
#[derive(Error, Debug)]
pub(crate) enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Error during JSON serialization or deserialization.
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a URL.
    #[error("URL Parsing Error: {0}")]
    UrlParse(#[from] UrlParseError),

    /// Error making HTTP requests via reqwest.
    #[error("HTTP Request Error: {0}")]
    Request(#[from] reqwest::Error),

    /// The places lookup service returned a non-success status.
    #[error("Places Service Error: {0}")]
    PlacesStatus(String),

    /// Error reading or writing the persisted store.
    #[error("Store Error: {0}")]
    Store(String),

    /// The persisted store changed between read and write.
    #[error("Store Conflict: {0}")]
    StoreConflict(String),

    /// Invalid or incomplete user input (e.g. map search without a center).
    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    /// The search was cancelled before completion.
    #[error("Search cancelled")]
    Cancelled,

    /// An underlying error that doesn't fit other categories, using anyhow.
    #[error("Generic Error: {0}")]
    Generic(#[from] anyhow::Error),
}

pub(crate) type Result<T> = std::result::Result<T, AppError>;
