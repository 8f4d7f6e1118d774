//! Common types and utilities for the order book microservice
//!
//! This crate provides shared types and errors used across the
//! configuration, matching and storage crates.
//!
//! # Modules
//!
//! - [`error`] - Common error types
//! - [`types`] - Shared domain types (Side, OrderStatus)

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
