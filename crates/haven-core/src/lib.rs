//! haven-core: Shared types, events, configuration, and error handling for the Haven platform.
//!
//! This crate provides the foundational types used across all Haven components:
//! - Domain entities (policies, access grants, alerts, tokens, rate windows)
//! - Identifier newtypes and the alert priority ladder
//! - Audit event records emitted by the decision core
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::HavenError;
