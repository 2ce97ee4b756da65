//! API request and response data models.
//!
//! - [`process`]: the result contract returned by `POST /api/process-files`

pub mod process;
