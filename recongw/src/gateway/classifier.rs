//! Mapping of transport-level failures onto the closed [`ErrorKind`] taxonomy.

use std::error::Error as StdError;
use std::io;

use url::Url;

use super::result::{ErrorKind, Failure};

/// A failure that happened before a complete upstream reply was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// Connection refused, host or network unreachable, or name resolution failed
    Unreachable { detail: String },
    /// The peer's certificate could not be validated
    Certificate { detail: String },
    /// A reply arrived but its body could not be read
    UndecodableBody { detail: String },
    /// Everything else, timeouts included
    Other { detail: String },
}

impl TransportFailure {
    pub fn detail(&self) -> &str {
        match self {
            TransportFailure::Unreachable { detail }
            | TransportFailure::Certificate { detail }
            | TransportFailure::UndecodableBody { detail }
            | TransportFailure::Other { detail } => detail,
        }
    }
}

impl From<&reqwest::Error> for TransportFailure {
    fn from(err: &reqwest::Error) -> Self {
        let detail = root_cause_message(err);

        // TLS handshake failures surface as connect errors, so certificates are checked first
        if let Some(detail) = certificate_cause(err) {
            return TransportFailure::Certificate { detail };
        }
        if err.is_timeout() {
            return TransportFailure::Other { detail };
        }
        if err.is_connect() || has_unreachable_io_cause(err) {
            return TransportFailure::Unreachable { detail };
        }
        if err.is_decode() || err.is_body() {
            return TransportFailure::UndecodableBody { detail };
        }
        TransportFailure::Other { detail }
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        TransportFailure::from(&err)
    }
}

/// Map a transport failure to a user-facing [`Failure`]. Only the origin of `endpoint` ever
/// appears in the message.
pub fn classify(failure: &TransportFailure, endpoint: &Url) -> Failure {
    let origin = endpoint_label(endpoint);
    match failure {
        TransportFailure::Unreachable { .. } => Failure::new(
            ErrorKind::ServiceUnavailable,
            format!("Cannot connect to the document processing service at {origin}. Please make sure it is running."),
        ),
        TransportFailure::Certificate { .. } => Failure::new(
            ErrorKind::TlsConfigurationError,
            format!("The TLS certificate presented by {origin} could not be verified. Check the upstream TLS configuration."),
        ),
        TransportFailure::UndecodableBody { detail } => Failure::new(
            ErrorKind::MalformedResponse,
            format!("The document processing service returned a response that could not be read: {}", redact(detail, endpoint)),
        ),
        TransportFailure::Other { detail } => Failure::new(ErrorKind::UnknownTransportError, redact(detail, endpoint)),
    }
}

/// Scheme, host and port of the endpoint.
pub fn endpoint_label(endpoint: &Url) -> String {
    endpoint.origin().ascii_serialization()
}

fn chain<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

/// Message of the deepest error in the chain, which names the actual cause rather than the
/// request that failed.
fn root_cause_message(err: &reqwest::Error) -> String {
    chain(err)
        .last()
        .map(ToString::to_string)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| "Unknown transport error".to_string())
}

pub(crate) fn certificate_cause(err: &(dyn StdError + 'static)) -> Option<String> {
    for cause in chain(err) {
        if let Some(tls @ rustls::Error::InvalidCertificate(_)) = as_rustls_error(cause) {
            return Some(tls.to_string());
        }
    }

    // Fall back to the text in case the TLS error was flattened into a message
    chain(err).map(ToString::to_string).find(|message| {
        let lower = message.to_ascii_lowercase();
        lower.contains("certificate") || lower.contains("unknownissuer")
    })
}

/// `io::Error::source` skips its wrapped error, so look inside it explicitly.
fn as_rustls_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a rustls::Error> {
    err.downcast_ref::<rustls::Error>().or_else(|| {
        err.downcast_ref::<io::Error>()
            .and_then(io::Error::get_ref)
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    })
}

fn has_unreachable_io_cause(err: &(dyn StdError + 'static)) -> bool {
    chain(err).filter_map(|cause| cause.downcast_ref::<io::Error>()).any(|io_err| {
        matches!(
            io_err.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::HostUnreachable
                | io::ErrorKind::NetworkUnreachable
                | io::ErrorKind::AddrNotAvailable
        )
    })
}

/// Replace the full endpoint URL with its origin so paths and queries never leak.
fn redact(detail: &str, endpoint: &Url) -> String {
    let full = endpoint.as_str();
    if full.is_empty() {
        return detail.to_string();
    }
    detail.replace(full, &endpoint_label(endpoint))
}
