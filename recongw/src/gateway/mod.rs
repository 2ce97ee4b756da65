//! The upstream response normalization gateway.
//!
//! One request flows through the gateway in a single direction:
//!
//! ```text
//! FileBatch -> assemble -> Upstream::submit -> normalize -> ProcessResult
//!                                   \-> classify (transport failures) -/
//! ```
//!
//! No component holds state across requests. The only suspension point is the upstream call.

pub mod assembler;
pub mod batch;
pub mod classifier;
pub mod normalizer;
pub mod result;
pub mod upstream;

pub use assembler::{MultipartPart, MultipartPayload, assemble};
pub use batch::{BatchError, FileBatch, FileBuffer, FileRole};
pub use classifier::{TransportFailure, classify, endpoint_label};
pub use normalizer::{UpstreamResponse, normalize};
pub use result::{ErrorKind, Failure, ProcessResult};
pub use upstream::{ReqwestUpstream, Upstream};

use metrics::counter;
use tracing::{info, instrument, warn};

/// Run one batch through the full pipeline. Never fails: every outcome, including transport
/// errors and an empty batch, is a [`ProcessResult`].
#[instrument(skip_all, fields(
    pdf_files = batch.count(FileRole::Pdf),
    eml_files = batch.count(FileRole::Eml),
    xlsx_files = batch.count(FileRole::Xlsx),
    bytes = batch.total_bytes(),
))]
pub async fn process_batch(upstream: &dyn Upstream, batch: FileBatch) -> ProcessResult {
    let result = match assemble(batch) {
        Ok(payload) => match upstream.submit(payload).await {
            Ok(raw) => {
                info!(status = raw.status, content_type = ?raw.content_type, "Received upstream response");
                normalize(&raw)
            }
            Err(failure) => {
                warn!(detail = failure.detail(), "Upstream call failed");
                classify(&failure, upstream.endpoint()).into()
            }
        },
        Err(failure) => failure.into(),
    };

    match result.failure() {
        Some(failure) => warn!(kind = %failure.kind, message = %failure.message, "Processing failed"),
        None => info!(outcome = result.outcome(), "Processing succeeded"),
    }
    counter!("recongw_process_results_total", "outcome" => result.outcome()).increment(1);

    result
}
