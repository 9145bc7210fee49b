//! The operator-facing HTTP surface (spec.md §6 "HTTP server", §4.9): a
//! tarball route and a status-ring route, registered once by the
//! Supervisor at startup.
use crate::status_ring::StatusRing;
use crate::types::RepoName;
use crate::vca::Vca;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Everything one route handler needs for a single watched repository.
pub struct RepoHandle {
    pub vca: Vca,
    pub status: Arc<StatusRing>,
}

/// All repositories reachable from the HTTP surface, keyed by the name used
/// in the URL path (spec.md glossary, "Main repository" has the empty
/// name).
pub type RepoRegistry = Arc<HashMap<RepoName, Arc<RepoHandle>>>;

/// Builds the router described in spec.md §6: `/{repo}.tar.gz?rev=` and
/// `/debug/watcher/{repo}`, with `tower_http`'s `TraceLayer` for request
/// logging.
pub fn build_router(repos: RepoRegistry) -> Router {
    Router::new()
        .route("/:repo_with_ext", get(tarball))
        .route("/debug/watcher/:repo", get(status_page))
        .layer(TraceLayer::new_for_http())
        .with_state(repos)
}

async fn tarball(
    State(repos): State<RepoRegistry>,
    Path(repo_with_ext): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(repo_str) = repo_with_ext.strip_suffix(".tar.gz") else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Ok(repo) = RepoName::new(repo_str) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(handle) = repos.get(&repo) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(rev) = params.get("rev") else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match handle.vca.archive(rev).await {
        Ok(bytes) => (
            StatusCode::OK,
            [("Content-Type", "application/x-compressed")],
            Bytes::from(bytes),
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(repo = %repo, rev = %rev, error = %err, "archive failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn status_page(State(repos): State<RepoRegistry>, Path(repo): Path<String>) -> Response {
    let Ok(repo) = RepoName::new(&repo) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(handle) = repos.get(&repo) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    Html(handle.status.render_html(repo.as_str())).into_response()
}
