//! Core types and trait definitions for the Revline storefront.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod error;
pub mod fitment;
pub mod history;
pub mod identity;
pub mod record;
pub mod store;
pub mod vehicle;

pub use error::{Error, Result};
