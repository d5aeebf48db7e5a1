//! Per-request proxy logic: tenant resolution, artifact fetch, and
//! asynchronous analytics capture.
//!
//! The proxy step is synchronous on the request path; everything else —
//! geo lookup, analytics write — happens in a spawned task after the
//! response bytes are already decided, and its failures are swallowed.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::HOST;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use object_store::path::Path as StorePath;
use object_store::{Attribute, ObjectStore};
use tracing::{debug, warn};

use loft_core::artifacts::{content_type_for, object_key};
use loft_core::{AnalyticsRecord, epoch_millis};
use loft_state::StateStore;

use crate::error::ServeError;
use crate::geo::GeoService;

/// Maps inbound hosts to tenant artifacts and records access analytics.
pub struct ArtifactRouter {
    store: StateStore,
    artifacts: Arc<dyn ObjectStore>,
    artifact_prefix: String,
    geo: Arc<GeoService>,
}

impl ArtifactRouter {
    pub fn new(
        store: StateStore,
        artifacts: Arc<dyn ObjectStore>,
        artifact_prefix: String,
        geo: Arc<GeoService>,
    ) -> Self {
        Self {
            store,
            artifacts,
            artifact_prefix,
            geo,
        }
    }

    /// Handle one request. Never fails — every error becomes a response.
    pub async fn handle<B>(self: &Arc<Self>, req: Request<B>, peer_ip: IpAddr) -> Response<Full<Bytes>> {
        let started = Instant::now();

        let Some(tenant) = host_tenant(&req) else {
            return text_response(StatusCode::BAD_REQUEST, "missing host header");
        };
        let path = req.uri().path().to_string();
        let client_ip = client_ip(&req, peer_ip);

        // Root-path → index-document rewrite; everything else unchanged.
        let object_path = if path == "/" { "/index.html" } else { path.as_str() };

        let response = match self.serve(&tenant, object_path).await {
            Ok((body, content_type)) => Response::builder()
                .status(StatusCode::OK)
                .header("content-type", content_type)
                .body(Full::new(body))
                .unwrap(),
            Err(ServeError::UnknownTenant) => {
                debug!(%tenant, "unknown tenant");
                text_response(StatusCode::NOT_FOUND, "unknown tenant")
            }
            Err(ServeError::NotFound) => text_response(StatusCode::NOT_FOUND, "not found"),
            Err(ServeError::Unavailable(reason)) => {
                warn!(%tenant, %reason, "artifact store unavailable");
                text_response(StatusCode::BAD_GATEWAY, "upstream unavailable")
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let status_code = response.status().as_u16();
        let router = Arc::clone(self);
        // Analytics must never block or delay the response.
        tokio::spawn(async move {
            router
                .capture(tenant, path, status_code, elapsed_ms, client_ip)
                .await;
        });

        response
    }

    /// Fetch the artifact for a tenant path.
    async fn serve(&self, tenant: &str, path: &str) -> Result<(Bytes, String), ServeError> {
        let project = self
            .store
            .get_project(tenant)
            .map_err(|e| ServeError::Unavailable(e.to_string()))?;
        if project.is_none() {
            return Err(ServeError::UnknownTenant);
        }

        let key = object_key(&self.artifact_prefix, tenant, path);
        let result = match self.artifacts.get(&StorePath::from(key.clone())).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Err(ServeError::NotFound),
            Err(e) => return Err(ServeError::Unavailable(e.to_string())),
        };

        // Prefer the content type recorded at upload; fall back to the
        // extension table for objects written by older uploaders.
        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|v| v.as_ref().to_string())
            .unwrap_or_else(|| content_type_for(&key).to_string());
        let body = result
            .bytes()
            .await
            .map_err(|e| ServeError::Unavailable(e.to_string()))?;
        Ok((body, content_type))
    }

    async fn capture(
        &self,
        subdomain: String,
        path: String,
        status_code: u16,
        response_time_ms: u64,
        client_ip: IpAddr,
    ) {
        let location = self.geo.resolve(client_ip).await;
        let record = AnalyticsRecord {
            subdomain,
            path,
            status_code,
            response_time_ms,
            client_ip: client_ip.to_string(),
            country: location.country,
            city: location.city,
            timestamp: epoch_millis(),
        };
        // Best-effort: a failed capture is dropped, never retried.
        if let Err(e) = self.store.append_analytics(&record) {
            debug!(error = %e, "analytics capture dropped");
        }
    }
}

/// Tenant key: the host label before the first dot, port stripped.
fn host_tenant<B>(req: &Request<B>) -> Option<String> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().host())?;
    let without_port = host.split(':').next().unwrap_or(host);
    let label = without_port.split('.').next().unwrap_or(without_port);
    (!label.is_empty()).then(|| label.to_string())
}

/// Client address: first `x-forwarded-for` entry when present, else the
/// peer address of the connection.
fn client_ip<B>(req: &Request<B>, peer_ip: IpAddr) -> IpAddr {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(peer_ip)
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}
