//! Common library for the session auth workspace
//!
//! This crate provides the infrastructure shared by the services: the
//! session store contract and its backends, Redis and PostgreSQL
//! connectivity, and the matching error types.

pub mod cache;
pub mod database;
pub mod error;
pub mod store;

pub use store::{SessionStore, StoreError};
