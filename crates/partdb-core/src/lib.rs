//! Core types for the parts database.
//!
//! Entities, their validation rules, identity derivation, the default
//! configuration registry, and the [`store::PartStore`] trait. This crate
//! performs no I/O; storage backends and the bulk engine depend on it.

pub mod config;
pub mod defaults;
pub mod discovery;
pub mod error;
pub mod key;
pub mod part;
pub mod store;

pub use error::{Result, ValidationError};
