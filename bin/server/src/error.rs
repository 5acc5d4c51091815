//! Domain error types for server operations.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Failures that stop the server from starting.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// No usable credential could be obtained.
    Credential { details: String },
    /// The Gmail tool set could not be built.
    Toolkit { details: String },
    /// The model backend could not be built.
    Backend { details: String },
    /// The listener could not be bound.
    Bind { addr: String, details: String },
    /// The server stopped with an error.
    Serve { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "failed to load configuration: {details}"),
            Self::Credential { details } => {
                write!(f, "failed to obtain a mailbox credential: {details}")
            }
            Self::Toolkit { details } => write!(f, "failed to build Gmail tools: {details}"),
            Self::Backend { details } => write!(f, "failed to build model backend: {details}"),
            Self::Bind { addr, details } => write!(f, "failed to bind to {addr}: {details}"),
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

/// Errors returned by the HTTP API.
#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    /// The utterance was empty or whitespace.
    BlankUtterance,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlankUtterance => write!(f, "utterance must not be blank"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BlankUtterance => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
