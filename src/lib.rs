//! Activation server: issues encrypted activation codes and verifies them
//! against per-license device limits.
//!
//! Codes carry the full license terms (authenticated encryption under a key
//! derived from the server secret); the SQLite store adds usage state and
//! device bindings on top.

pub mod activation;
pub mod codec;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod intake;
pub mod middleware;
pub mod models;
pub mod rate_limit;
