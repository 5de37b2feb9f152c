//! HTTP API driven by the cluster controller

use crate::error::ProvisionError;
use crate::provisioner::{VolumeProvisioner, VolumeRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

/// One export as listed by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportInfo {
    /// Export id
    pub export_id: u16,
    /// Exported path
    pub path: String,
}

/// Response body of a volume delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Id of the removed export
    pub export_id: u16,
    /// Path the export pointed at
    pub path: String,
    /// Always `deleted`
    pub status: String,
}

/// Maps provisioner errors onto HTTP responses.
pub struct ApiError(ProvisionError);

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::warn!("Request rejected: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// HTTP front end for a [`VolumeProvisioner`].
#[derive(Clone)]
pub struct ProvisionerApi {
    provisioner: Arc<VolumeProvisioner>,
    bind_addr: SocketAddr,
}

impl ProvisionerApi {
    /// Creates the API, bound to `bind_addr` once served.
    pub fn new(provisioner: Arc<VolumeProvisioner>, bind_addr: SocketAddr) -> Self {
        Self {
            provisioner,
            bind_addr,
        }
    }

    /// Builds the router with all routes.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/v1/exports", get(exports_handler))
            .route("/api/v1/volumes", post(provision_handler))
            .route("/api/v1/volumes/:export_id", delete(delete_handler))
            .route("/api/v1/consistency", get(consistency_handler))
            .with_state(self)
    }

    /// Binds the listener and serves until the process exits.
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = self.bind_addr;
        let router = Arc::new(self).router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Provisioner API listening on {}", addr);

        axum::serve(listener, router.into_make_service()).await?;
        Ok(())
    }
}

async fn health_handler(State(state): State<Arc<ProvisionerApi>>) -> Json<serde_json::Value> {
    let exports = state.provisioner.registry().len().ok();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "exports": exports,
        "max_exports": state.provisioner.registry().max_exports(),
    }))
}

async fn exports_handler(
    State(state): State<Arc<ProvisionerApi>>,
) -> Result<Json<Vec<ExportInfo>>, ApiError> {
    let exports = state.provisioner.exports().await?;
    Ok(Json(
        exports
            .into_iter()
            .map(|(export_id, path)| ExportInfo { export_id, path })
            .collect(),
    ))
}

async fn provision_handler(
    State(state): State<Arc<ProvisionerApi>>,
    Json(request): Json<VolumeRequest>,
) -> Result<Response, ApiError> {
    let volume = state.provisioner.provision(request).await?;
    Ok((StatusCode::CREATED, Json(volume)).into_response())
}

async fn delete_handler(
    State(state): State<Arc<ProvisionerApi>>,
    Path(export_id): Path<u16>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let stanza = state.provisioner.delete(export_id).await?;
    Ok(Json(DeleteResponse {
        export_id: stanza.id,
        path: stanza.path,
        status: "deleted".to_string(),
    }))
}

async fn consistency_handler(
    State(state): State<Arc<ProvisionerApi>>,
) -> Result<Response, ApiError> {
    let report = state.provisioner.consistency().await?;
    let status = if report.is_clean() {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, Json(report)).into_response())
}
