//! HTTP request handlers.
//!
//! - [`process`]: the upload boundary that forwards file batches to the reconciliation service

pub mod process;
