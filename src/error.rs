//! Error taxonomy shared by every handler and session/cache operation.
//!
//! The dispatcher is the single place that converts a [`DaemonError`] into
//! the wire `{"error": "..."}` envelope; everywhere else propagates with
//! `?`.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::daemon::resolver::{AmbiguityResult, MatchInfo};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("LSP error: {message}")]
    LspResponse {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("{method} is not supported by {server}")]
    MethodNotSupported { method: String, server: String },

    #[error("no language server available for {language}")]
    LanguageServerNotFound {
        language: String,
        install_hint: Option<String>,
    },

    #[error("failed to start {server} for {language} in {root}: {cause}")]
    LanguageServerStartup {
        server: String,
        language: String,
        root: PathBuf,
        cause: String,
        log_tail: String,
        log_path: PathBuf,
        known_solution: Option<String>,
    },

    /// Ambiguous symbol resolution is a structured result, not a hard
    /// failure, but it still surfaces through the wire `error` envelope
    /// alongside its `matches`/`total_matches` fields rather than `result`
    /// (see SPEC_FULL.md §10.2 and spec.md's S2 scenario).
    #[error("symbol is ambiguous ({} matches)", .0.total_matches)]
    Ambiguous(AmbiguityResult),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub const fn is_method_not_found(&self) -> bool {
        matches!(self, Self::MethodNotSupported { .. })
    }
}

/// Wire envelope written back to the client: `{"result": ...}` or
/// `{"error": "..."}`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Ok { result: Value },
    Err { error: String },
    Ambiguous { error: String, matches: Vec<MatchInfo>, total_matches: usize },
}

impl ResponseEnvelope {
    pub fn ok(result: impl Serialize) -> Self {
        match serde_json::to_value(result) {
            Ok(result) => Self::Ok { result },
            Err(e) => Self::Err {
                error: format!("failed to serialize result: {e}"),
            },
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self::Err {
            error: message.into(),
        }
    }

    fn ambiguous(result: AmbiguityResult) -> Self {
        Self::Ambiguous {
            error: format!("Symbol '{}' is ambiguous ({} matches)", result.symbol_path, result.total_matches),
            matches: result.matches,
            total_matches: result.total_matches,
        }
    }
}

impl From<DaemonError> for ResponseEnvelope {
    fn from(err: DaemonError) -> Self {
        match err {
            DaemonError::Ambiguous(result) => Self::ambiguous(result),
            other => Self::err(other.to_string()),
        }
    }
}
