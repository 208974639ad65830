//! HTTP API server exposing the search pipeline.

use crate::error::AppError;
use crate::search::{App, SearchReport, SearchRequest};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::Semaphore;
use warp::{Filter, Rejection, Reply, http::StatusCode};

/// API response structure
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<SearchReport>,
}

/// Start the API server
pub(crate) async fn start_api_server(
    app: Arc<App>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app_filter = warp::any().map(move || app.clone());

    // Limit concurrent searches; each one holds the places client busy.
    let semaphore = Arc::new(Semaphore::new(4));
    let semaphore_filter = warp::any().map(move || semaphore.clone());

    // Health check endpoint
    let health = warp::path("health").and(warp::get()).map(|| {
        warp::reply::json(&ApiResponse {
            success: true,
            message: "place-scout API is running".to_string(),
            report: None,
        })
    });

    // Search endpoint: runs the full pipeline including reconciliation.
    let search = warp::path("search")
        .and(warp::post())
        .and(warp::body::json())
        .and(app_filter.clone())
        .and(semaphore_filter.clone())
        .and_then(handle_search);

    let routes = health.or(search).with(warp::cors().allow_any_origin());

    tracing::info!("Starting API server on port {}", port);
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;

    Ok(())
}

/// Handle one search request
async fn handle_search(
    request: SearchRequest,
    app: Arc<App>,
    semaphore: Arc<Semaphore>,
) -> Result<impl Reply, Rejection> {
    let _permit = semaphore.acquire().await;

    tracing::info!("Processing search request: {:?}", request.category);
    let cancel = Arc::new(AtomicBool::new(false));

    match app.execute(&request, &cancel).await {
        Ok(report) => {
            let message = if report.no_results {
                "No results found".to_string()
            } else if !report.persisted {
                "Results were NOT saved to the store; display only".to_string()
            } else {
                "Search completed".to_string()
            };
            Ok(warp::reply::with_status(
                warp::reply::json(&ApiResponse {
                    success: true,
                    message,
                    report: Some(report),
                }),
                StatusCode::OK,
            ))
        }
        Err(e) => {
            let status = match &e {
                AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::error!("Search request failed: {}", e);
            Ok(warp::reply::with_status(
                warp::reply::json(&ApiResponse {
                    success: false,
                    message: e.to_string(),
                    report: None,
                }),
                status,
            ))
        }
    }
}
