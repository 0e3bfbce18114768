//! Common test utilities for engine integration tests.
//!
//! - [`harness`] - Test server wired to an in-memory backend
//! - [`fixtures`] - Seed resources and OperationDefinitions

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;
