//! Orchestrates one search run: validate the request, fetch and filter
//! places, discover emails, assemble records, reconcile, export.

use crate::assembler;
use crate::config::Config;
use crate::emails::EmailFinder;
use crate::error::{AppError, Result};
use crate::export::{self, DisplayTable};
use crate::models::{Record, SearchContext, SearchMode};
use crate::places::PlacesClient;
use crate::reconcile::{self, ReconcileSummary};
use crate::store::{CsvStore, StoreClient};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// One search as requested by the user, before validation. The map
/// center is optional here because "no location selected yet" is a
/// legal UI state; `validate` turns it into a user input error before
/// any network call happens.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct SearchRequest {
    pub category: String,
    #[serde(flatten)]
    pub mode: RequestedMode,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub(crate) enum RequestedMode {
    Typed {
        place: String,
    },
    Map {
        latitude: Option<f64>,
        longitude: Option<f64>,
        #[serde(default = "default_radius")]
        radius_m: u32,
    },
}

fn default_radius() -> u32 {
    1000
}

impl SearchRequest {
    pub(crate) fn validate(&self) -> Result<SearchContext> {
        let category = self.category.trim();
        if category.is_empty() {
            return Err(AppError::InvalidInput("Category is required".to_string()));
        }
        match &self.mode {
            RequestedMode::Typed { place } => {
                let place = place.trim();
                if place.is_empty() {
                    return Err(AppError::InvalidInput(
                        "Place name is required for a typed search".to_string(),
                    ));
                }
                Ok(SearchContext::typed(category, place))
            }
            RequestedMode::Map {
                latitude,
                longitude,
                radius_m,
            } => match (latitude, longitude) {
                (Some(lat), Some(lon)) => Ok(SearchContext::map(category, *lat, *lon, *radius_m)),
                _ => Err(AppError::InvalidInput(
                    "Select a location on the map first".to_string(),
                )),
            },
        }
    }
}

/// Everything one run reports back to presentation: the projected
/// current batch, the classification summary, and whether the mutated
/// snapshot was actually saved.
#[derive(Serialize, Debug)]
pub(crate) struct SearchReport {
    pub input_context: String,
    pub filename: String,
    pub table: DisplayTable,
    pub summary: ReconcileSummary,
    pub persisted: bool,
    pub no_results: bool,
}

/// Fetches, filters and assembles the batch for one validated search.
pub(crate) async fn run_search(
    places: &PlacesClient,
    finder: &EmailFinder,
    context: &SearchContext,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<Record>> {
    let now = Local::now();

    let summaries = match &context.mode {
        SearchMode::Typed { place } => {
            let query = format!("{} in {}", context.category, place);
            places.search_text(&query, cancel).await?
        }
        SearchMode::Map {
            latitude,
            longitude,
            radius_m,
        } => {
            let center = (*latitude, *longitude);
            let raw = places
                .search_grid(&context.category, center, *radius_m, cancel)
                .await?;
            assembler::filter_by_radius(raw, center, *radius_m)
        }
    };

    if summaries.is_empty() {
        tracing::info!("No places found for '{}'", context.input_context);
        return Ok(Vec::new());
    }

    let place_ids: Vec<String> = summaries.iter().filter_map(|s| s.place_id.clone()).collect();
    let details = places.fetch_details(&place_ids, cancel).await?;

    let mut records = assembler::assemble_records(&summaries, &details, context, now);

    let websites = assembler::collect_websites(&records);
    if !websites.is_empty() {
        let emails = finder.fetch_emails(&websites, cancel).await;
        assembler::apply_emails(&mut records, &emails);
    }

    Ok(records)
}

/// Shared application state: config plus the clients every run needs.
/// Built once in main and handed to the CLI command or the API server.
pub(crate) struct App {
    pub config: Arc<Config>,
    places: PlacesClient,
    finder: EmailFinder,
    store: Arc<dyn StoreClient>,
}

impl App {
    pub(crate) fn new(config: Arc<Config>) -> Result<Self> {
        let places = PlacesClient::from_config(config.clone())?;
        let finder = EmailFinder::new(config.clone())?;
        let store: Arc<dyn StoreClient> = Arc::new(CsvStore::new(config.store_path.clone()));
        Ok(Self {
            config,
            places,
            finder,
            store,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_parts(
        config: Arc<Config>,
        places: PlacesClient,
        finder: EmailFinder,
        store: Arc<dyn StoreClient>,
    ) -> Self {
        Self {
            config,
            places,
            finder,
            store,
        }
    }

    /// The full pipeline for one request: search, reconcile against the
    /// persisted store, write the export artifact, report.
    pub(crate) async fn execute(
        &self,
        request: &SearchRequest,
        cancel: &Arc<AtomicBool>,
    ) -> Result<SearchReport> {
        let context = request.validate()?;
        tracing::info!("Starting search: {}", context.input_context);

        let batch = run_search(&self.places, &self.finder, &context, cancel).await?;
        let no_results = batch.is_empty();

        let outcome = reconcile::reconcile(self.store.as_ref(), batch, &context, Local::now()).await;

        let table = export::project(&outcome.records, &context);
        let filename = export::export_filename(&context);
        if !table.rows.is_empty() {
            export::write_export(&self.config.export_dir, &filename, &table)?;
        }

        Ok(SearchReport {
            input_context: context.input_context.clone(),
            filename,
            table,
            summary: outcome.summary,
            persisted: outcome.persisted,
            no_results,
        })
    }
}
