//! Contracts for the managed services this application delegates to, plus
//! in-process implementations used for standalone runs and tests.

pub mod auth;
pub mod document;
pub mod memory;
pub mod mirror;
pub mod objects;
