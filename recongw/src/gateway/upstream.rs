//! The seam to the external document-reconciliation service.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderName};
use tracing::{debug, instrument, warn};
use url::Url;

use super::assembler::MultipartPayload;
use super::classifier::TransportFailure;
use super::normalizer::UpstreamResponse;
use crate::config::UpstreamConfig;
use crate::errors::Error;

/// Sends an assembled payload to the processing endpoint and hands back the raw reply.
///
/// Implementations never interpret the reply; that is left to
/// [`normalize`](super::normalizer::normalize). See [`ReqwestUpstream`] for the HTTP
/// implementation.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// The processing endpoint requests are sent to
    fn endpoint(&self) -> &Url;

    async fn submit(&self, payload: MultipartPayload) -> Result<UpstreamResponse, TransportFailure>;
}

/// The concrete implementation of `Upstream`.
#[derive(Debug, Clone)]
pub struct ReqwestUpstream {
    client: Client,
    endpoint: Url,
}

impl ReqwestUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, Error> {
        let endpoint = config.endpoint()?;

        // reqwest is built without a default rustls provider
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        if config.accept_invalid_certs {
            warn!("Certificate validation is disabled for the upstream service at {}", endpoint.origin().ascii_serialization());
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            // A followed 3xx would be re-sent as a GET without the multipart body
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Configuration {
                message: format!("Failed to create upstream HTTP client: {e}"),
            })?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[instrument(skip_all, fields(parts = payload.len(), bytes = payload.total_bytes()))]
    async fn submit(&self, payload: MultipartPayload) -> Result<UpstreamResponse, TransportFailure> {
        let form = payload.into_form()?;

        let response = self.client.post(self.endpoint.clone()).multipart(form).send().await?;

        let status = response.status().as_u16();
        let content_type = header_string(response.headers(), CONTENT_TYPE);
        let content_disposition = header_string(response.headers(), CONTENT_DISPOSITION);
        debug!(status, content_type = ?content_type, "Upstream responded");

        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            content_type,
            content_disposition,
            body,
        })
    }
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::assembler::assemble;
    use crate::gateway::batch::{FileBatch, FileBuffer, FileRole};
    use crate::gateway::normalizer::normalize;
    use crate::gateway::result::ErrorKind;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(url: &str) -> UpstreamConfig {
        UpstreamConfig {
            url: Some(Url::parse(url).unwrap()),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn payload() -> MultipartPayload {
        let batch = FileBatch::new()
            .with_file(FileBuffer::new(FileRole::Pdf, "remittance.pdf", Some("application/pdf"), b"%PDF-1.7".to_vec()))
            .unwrap()
            .with_file(FileBuffer::new(FileRole::Xlsx, "ledger.xlsx", None, b"PK-ledger".to_vec()))
            .unwrap();
        assemble(batch).unwrap()
    }

    #[test]
    fn test_missing_url_is_configuration_error() {
        let err = ReqwestUpstream::new(&UpstreamConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_submit_posts_multipart_to_process_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .and(header_regex("content-type", "^multipart/form-data; boundary="))
            .and(body_string_contains("name=\"pdf\"; filename=\"remittance.pdf\""))
            .and(body_string_contains("name=\"xlsx\"; filename=\"ledger.xlsx\""))
            .and(body_string_contains("%PDF-1.7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"out.csv\"")
                    .set_body_raw("a,b\n1,2\n", "text/csv"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let upstream = ReqwestUpstream::new(&config_for(&server.uri())).unwrap();
        let response = upstream.submit(payload()).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("text/csv"));
        assert_eq!(response.content_disposition.as_deref(), Some("attachment; filename=\"out.csv\""));
        assert_eq!(response.body.as_ref(), b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let upstream = ReqwestUpstream::new(&config_for(&server.uri())).unwrap();
        let response = upstream.submit(payload()).await.unwrap();

        assert_eq!(response.status, 502);
        assert_eq!(response.body.as_ref(), b"Bad Gateway");
    }

    #[tokio::test]
    async fn test_redirects_are_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/elsewhere"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/elsewhere"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("a,b\n", "text/csv"))
            .expect(0)
            .mount(&server)
            .await;

        let upstream = ReqwestUpstream::new(&config_for(&server.uri())).unwrap();
        let response = upstream.submit(payload()).await.unwrap();

        assert_eq!(response.status, 302);
        let failure = normalize(&response).failure().cloned().unwrap();
        assert_eq!(failure.kind, ErrorKind::UpstreamRejected);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let upstream = ReqwestUpstream::new(&config_for(&format!("http://127.0.0.1:{port}"))).unwrap();

        let failure = upstream.submit(payload()).await.unwrap_err();
        assert!(matches!(failure, TransportFailure::Unreachable { .. }), "got {failure:?}");
    }
}
