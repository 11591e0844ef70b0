//! The library module for patchbridge.
//!
//! patchbridge is intended to be used in binary form only, and this library
//! may exhibit breaking changes in any release. It exists so that the binary
//! and its test suite share one implementation.

pub mod code_host;
pub mod config;
pub mod cycle;
pub mod debug;
pub mod doc;
pub mod ext;
pub mod git;
pub mod http;
pub mod logs;
pub mod model;
pub mod notify;
pub mod reconciler;
pub mod router;
pub mod stats;
pub mod supervisor;
pub mod tracker;
pub mod worker;
