//! Client for the places lookup service: free-text and location-biased
//! search with pagination, grid fan-out with global dedup, and per-place
//! detail fetches.

use crate::config::{Config, get_random_sleep_duration};
use crate::error::{AppError, Result};
use crate::geo;
use crate::models::{PlaceDetails, PlaceSummary, PlacesPage};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::sleep;

/// Interface the core needs from the places lookup service.
#[async_trait]
pub(crate) trait PlacesApi: Send + Sync {
    async fn text_search(&self, query: &str, page_token: Option<&str>) -> Result<PlacesPage>;

    async fn nearby_search(
        &self,
        center: (f64, f64),
        radius_m: u32,
        keyword: &str,
        page_token: Option<&str>,
    ) -> Result<PlacesPage>;

    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails>;
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    status: Option<String>,
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<RawResult>,
    next_page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResult {
    place_id: Option<String>,
    name: Option<String>,
    geometry: Option<RawGeometry>,
}

#[derive(Deserialize, Debug)]
struct RawGeometry {
    location: Option<RawLocation>,
}

#[derive(Deserialize, Debug)]
struct RawLocation {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize, Debug)]
struct DetailsResponse {
    status: Option<String>,
    error_message: Option<String>,
    result: Option<PlaceDetails>,
}

impl RawResult {
    fn into_summary(self) -> PlaceSummary {
        PlaceSummary {
            place_id: self.place_id,
            name: self.name,
            location: self
                .geometry
                .and_then(|g| g.location)
                .map(|l| (l.lat, l.lng)),
        }
    }
}

fn status_ok(status: Option<&str>) -> bool {
    matches!(status, None | Some("OK") | Some("ZERO_RESULTS"))
}

/// HTTP implementation against a Google-style places endpoint.
pub(crate) struct HttpPlacesApi {
    http: Client,
    api_key: String,
    base_url: String,
}

impl HttpPlacesApi {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AppError::Config(
                "Places API key is not configured".to_string(),
            ));
        }
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::Generic(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.places_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn search(&self, url: String, params: Vec<(&str, String)>) -> Result<PlacesPage> {
        let response = self.http.get(url).query(&params).send().await?;
        let body: SearchResponse = response.json().await?;
        if !status_ok(body.status.as_deref()) {
            return Err(AppError::PlacesStatus(format!(
                "{} - {}",
                body.status.as_deref().unwrap_or("UNKNOWN"),
                body.error_message.as_deref().unwrap_or("no message")
            )));
        }
        Ok(PlacesPage {
            results: body.results.into_iter().map(RawResult::into_summary).collect(),
            next_page_token: body.next_page_token,
        })
    }
}

#[async_trait]
impl PlacesApi for HttpPlacesApi {
    async fn text_search(&self, query: &str, page_token: Option<&str>) -> Result<PlacesPage> {
        let mut params = vec![
            ("key", self.api_key.clone()),
            ("query", query.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pagetoken", token.to_string()));
        }
        self.search(format!("{}/textsearch/json", self.base_url), params)
            .await
    }

    async fn nearby_search(
        &self,
        center: (f64, f64),
        radius_m: u32,
        keyword: &str,
        page_token: Option<&str>,
    ) -> Result<PlacesPage> {
        let mut params = vec![
            ("key", self.api_key.clone()),
            ("keyword", keyword.to_string()),
            ("location", format!("{},{}", center.0, center.1)),
            ("radius", radius_m.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pagetoken", token.to_string()));
        }
        self.search(format!("{}/nearbysearch/json", self.base_url), params)
            .await
    }

    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails> {
        let params = vec![
            ("key", self.api_key.clone()),
            ("place_id", place_id.to_string()),
            (
                "fields",
                "name,formatted_address,formatted_phone_number,website".to_string(),
            ),
        ];
        let response = self
            .http
            .get(format!("{}/details/json", self.base_url))
            .query(&params)
            .send()
            .await?;
        let body: DetailsResponse = response.json().await?;
        if !status_ok(body.status.as_deref()) {
            return Err(AppError::PlacesStatus(format!(
                "Place Details failed: {} - {}",
                body.status.as_deref().unwrap_or("UNKNOWN"),
                body.error_message.as_deref().unwrap_or("no message")
            )));
        }
        Ok(body.result.unwrap_or_default())
    }
}

enum SearchKind<'a> {
    Text(&'a str),
    Nearby {
        center: (f64, f64),
        radius_m: u32,
        keyword: &'a str,
    },
}

/// Wraps a [`PlacesApi`] with the paging, dedup and politeness rules the
/// upstream imposes.
pub(crate) struct PlacesClient {
    api: Arc<dyn PlacesApi>,
    config: Arc<Config>,
}

impl PlacesClient {
    pub(crate) fn new(api: Arc<dyn PlacesApi>, config: Arc<Config>) -> Self {
        Self { api, config }
    }

    pub(crate) fn from_config(config: Arc<Config>) -> Result<Self> {
        let api = HttpPlacesApi::new(&config)?;
        Ok(Self::new(Arc::new(api), config))
    }

    /// Accumulates up to `max_pages` pages of one query, waiting the
    /// mandatory delay between page requests. A failed page is logged as
    /// a warning and ends the walk with whatever was accumulated.
    async fn search_paged(
        &self,
        kind: SearchKind<'_>,
        cancel: &AtomicBool,
    ) -> Result<Vec<PlaceSummary>> {
        let mut results = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages_checked = 0;

        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(AppError::Cancelled);
            }

            let page = match &kind {
                SearchKind::Text(query) => {
                    self.api.text_search(query, page_token.as_deref()).await
                }
                SearchKind::Nearby {
                    center,
                    radius_m,
                    keyword,
                } => {
                    self.api
                        .nearby_search(*center, *radius_m, keyword, page_token.as_deref())
                        .await
                }
            };

            match page {
                Ok(page) => {
                    results.extend(page.results);
                    page_token = page.next_page_token;
                    pages_checked += 1;
                    if page_token.is_none() || pages_checked >= self.config.max_pages {
                        break;
                    }
                    sleep(self.config.page_delay).await;
                }
                Err(e) => {
                    tracing::warn!(target: "places_task", "Places request failed: {}", e);
                    break;
                }
            }
        }

        Ok(results)
    }

    /// Free-text search, no location bias.
    pub(crate) async fn search_text(
        &self,
        query: &str,
        cancel: &AtomicBool,
    ) -> Result<Vec<PlaceSummary>> {
        tracing::info!(target: "places_task", "Text search: {}", query);
        self.search_paged(SearchKind::Text(query), cancel).await
    }

    /// Grid search: one paged nearby query per grid point, deduplicated
    /// globally by place identifier so overlapping cells don't multiply
    /// detail lookups. Results without an identifier are dropped.
    pub(crate) async fn search_grid(
        &self,
        keyword: &str,
        center: (f64, f64),
        radius_m: u32,
        cancel: &AtomicBool,
    ) -> Result<Vec<PlaceSummary>> {
        let step_m = geo::default_grid_step(radius_m);
        let grid = geo::generate_grid(center.0, center.1, radius_m, step_m);
        tracing::info!(
            target: "places_task",
            "Grid search: {} over {} cells (radius {} m, step {} m)",
            keyword, grid.len(), radius_m, step_m
        );

        let mut seen_place_ids: HashSet<String> = HashSet::new();
        let mut results = Vec::new();

        for point in grid {
            if cancel.load(Ordering::SeqCst) {
                return Err(AppError::Cancelled);
            }
            let batch = self
                .search_paged(
                    SearchKind::Nearby {
                        center: point,
                        radius_m,
                        keyword,
                    },
                    cancel,
                )
                .await?;
            for summary in batch {
                let Some(place_id) = summary.place_id.clone() else {
                    continue;
                };
                if seen_place_ids.insert(place_id) {
                    results.push(summary);
                }
            }
        }

        tracing::info!(
            target: "places_task",
            "Grid search found {} unique places", results.len()
        );
        Ok(results)
    }

    /// One detail call per unique identifier. Failures are warnings; the
    /// identifier maps to an empty detail set and the record survives
    /// with null fields.
    pub(crate) async fn fetch_details(
        &self,
        place_ids: &[String],
        cancel: &AtomicBool,
    ) -> Result<HashMap<String, PlaceDetails>> {
        let unique: Vec<&String> = {
            let mut seen = HashSet::new();
            place_ids.iter().filter(|id| seen.insert(*id)).collect()
        };

        let mut details = HashMap::new();
        for (i, place_id) in unique.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                return Err(AppError::Cancelled);
            }
            let fetched = match self.api.place_details(place_id.as_str()).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(target: "places_task", "Detail fetch failed for {}: {}", place_id, e);
                    PlaceDetails::default()
                }
            };
            details.insert((*place_id).clone(), fetched);
            if i + 1 < unique.len() {
                sleep(get_random_sleep_duration(&self.config)).await;
            }
        }
        Ok(details)
    }
}
