// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Error types for the ledger, its caches and remote backends.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for remote backend operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Why a transaction draft was rejected before touching the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid amount '{0}', expected a decimal number")]
    InvalidAmount(String),

    #[error("amount must not be negative (got {0})")]
    NegativeAmount(Decimal),

    #[error("category is required")]
    MissingCategory,

    #[error("unknown {kind} category '{name}'")]
    UnknownCategory { kind: String, name: String },

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Errors reported by a remote sync backend.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
}

impl RemoteError {
    /// True when the failure means the backend could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            RemoteError::Unavailable(e.to_string())
        } else {
            RemoteError::Http(e)
        }
    }
}

/// Errors from the local durable cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cached document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors raised while wiring up a coordinator.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("the sync coordinator must be created inside a tokio runtime")]
    NoRuntime,
}
