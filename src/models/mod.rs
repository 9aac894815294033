// Core request/response models for Query Bridge

//! # Models Module
//!
//! Commands go in, results come out:
//!
//! - [`command`]: validated inputs (`DatabaseQueryCommand`, `ApiQueryCommand`)
//! - [`result`]: the `QueryResult` every invocation produces, success or not
//!
//! ## Rust Learning Notes:
//!
//! ### Validate at the edge
//! Commands keep their fields private and are only created through builders whose
//! `build()` returns `Result`. Code that holds a command can rely on it being valid
//! without re-checking.

// Contains DatabaseQueryCommand and ApiQueryCommand with their builders
pub mod command;

// Contains QueryStatus and QueryResult
pub mod result;

pub use command::{ApiQueryCommand, ApiQueryCommandBuilder, DatabaseQueryCommand, DatabaseQueryCommandBuilder};
pub use result::{QueryResult, QueryStatus};
