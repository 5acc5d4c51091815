//! courier server.
//!
//! Serves a single conversational session over HTTP. Each turn runs through
//! the tool-calling dispatcher with Gmail tools bound to the user's
//! delegated credential.

pub mod config;
pub mod error;
pub mod routes;
pub mod startup;
