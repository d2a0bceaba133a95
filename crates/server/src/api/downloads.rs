//! Serves output archives behind signed, expiring links.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metrics::DOWNLOADS_TOTAL;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub expires: i64,
    pub signature: String,
}

fn reject(status: StatusCode, outcome: &str) -> Response {
    DOWNLOADS_TOTAL.with_label_values(&[outcome]).inc();
    status.into_response()
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((bucket, object)): Path<(String, String)>,
    Query(params): Query<DownloadParams>,
) -> Response {
    let storage = state.downloads();
    if !storage.verify_download(&bucket, &object, params.expires, &params.signature) {
        warn!(bucket = %bucket, object = %object, "Rejected download with bad or expired signature");
        return reject(StatusCode::FORBIDDEN, "forbidden");
    }

    let path = match storage.object_path(&bucket, &object) {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "Rejected download path");
            return reject(StatusCode::BAD_REQUEST, "invalid");
        }
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Download target missing");
            return reject(StatusCode::NOT_FOUND, "missing");
        }
    };

    let filename = object.rsplit('/').next().unwrap_or(object.as_str()).to_string();
    DOWNLOADS_TOTAL.with_label_values(&["served"]).inc();
    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}
