//! # justmount-common
//!
//! Shared types for the justmount CSI node plugin.
//!
//! This crate provides:
//! - The error taxonomy returned by every node operation
//! - Well-known paths and defaults (endpoint, mount table, helper directories)

#![warn(missing_docs)]

pub mod defaults;
pub mod error;

pub use error::{NodeError, NodeResult, StatusCode};
