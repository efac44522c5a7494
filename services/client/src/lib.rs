//! services/client/src/lib.rs
//!
//! Client library for the document Q&A API: authenticated transport with
//! single-flight credential refresh, document polling, and chat sessions.

pub mod adapters;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;

#[cfg(test)]
mod test_support;
