//! OpenAPI documentation for the processing API.

use utoipa::OpenApi;

use crate::api;
use crate::gateway::{ErrorKind, FileRole};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "recongw",
        description = "Upload gateway for the document-reconciliation service. Accepts PDF, EML and XLSX files, \
        forwards them to the service and returns its result in one stable shape."
    ),
    servers((url = "/api")),
    paths(api::handlers::process::process_files),
    components(schemas(api::models::process::ProcessResponse, ErrorKind, FileRole)),
    tags((name = "processing", description = "File reconciliation"))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_documents_process_endpoint() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/process-files"));

        let schemas = &doc.components.as_ref().unwrap().schemas;
        assert!(schemas.contains_key("ProcessResponse"));
        assert!(schemas.contains_key("ErrorKind"));
    }
}
