//! Best-effort contact-email discovery: probes each website domain's
//! common contact pages and homepage for a published address.

use crate::config::{Config, EMAIL_REGEX};
use crate::error::Result;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

static MAILTO_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href^='mailto:']").unwrap());

/// Extracts the network domain from a website URL, tolerating a missing
/// scheme. The domain keys the dedup map and the final email lookup.
pub(crate) fn domain_of(website: &str) -> Option<String> {
    let trimmed = website.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    let url = Url::parse(&with_scheme).ok()?;
    url.host_str().map(|h| h.to_lowercase())
}

/// Dedup by network domain; the first URL seen per domain wins as the
/// representative probed for that domain.
fn dedup_by_domain(websites: &[String]) -> Vec<(String, String)> {
    let mut order = Vec::new();
    let mut seen: HashMap<String, ()> = HashMap::new();
    for website in websites {
        let Some(domain) = domain_of(website) else {
            continue;
        };
        if seen.insert(domain.clone(), ()).is_none() {
            order.push((domain, website.clone()));
        }
    }
    order
}

/// Scans one page for an email address: a `mailto:` link target wins,
/// otherwise the first email-shaped token in the page text.
fn extract_email_from_html(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for element in document.select(&MAILTO_SELECTOR) {
        if let Some(href) = element.value().attr("href") {
            if let Some(email_part) = href.strip_prefix("mailto:") {
                let email = email_part.split('?').next().unwrap_or("").trim();
                if !email.is_empty() && EMAIL_REGEX.is_match(email) {
                    return Some(email.to_lowercase());
                }
            }
        }
    }

    let mut text_content = String::new();
    for fragment in document.root_element().text() {
        text_content.push_str(fragment.trim());
        text_content.push(' ');
    }
    EMAIL_REGEX
        .find(&text_content)
        .map(|m| m.as_str().to_lowercase())
}

/// Probes websites for contact emails with a bounded worker pool.
#[derive(Clone)]
pub(crate) struct EmailFinder {
    http: Client,
    config: Arc<Config>,
}

impl EmailFinder {
    pub(crate) fn new(config: Arc<Config>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.email_timeout)
            .build()
            .map_err(|e| {
                crate::error::AppError::Generic(anyhow::anyhow!(
                    "Failed to build HTTP client: {}",
                    e
                ))
            })?;
        Ok(Self { http, config })
    }

    /// Maps each website's domain to a discovered email, or `None` when
    /// every probe came up empty. Domains are probed concurrently up to
    /// the configured pool size; completions merge order-independently.
    pub(crate) async fn fetch_emails(
        &self,
        websites: &[String],
        cancel: &Arc<AtomicBool>,
    ) -> HashMap<String, Option<String>> {
        let targets = dedup_by_domain(websites);
        if targets.is_empty() {
            return HashMap::new();
        }
        tracing::info!(
            target: "email_task",
            "Probing {} unique domains for contact emails", targets.len()
        );

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.max_concurrency));
        let progress = if self.config.show_progress {
            let bar = indicatif::ProgressBar::new(targets.len() as u64);
            bar.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap()
                    .progress_chars("##-"),
            );
            Some(bar)
        } else {
            None
        };

        let mut tasks = Vec::with_capacity(targets.len());
        for (domain, website) in targets {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let progress = progress.clone();
            let finder = self.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;
                if cancel.load(Ordering::SeqCst) {
                    return None;
                }
                let email = finder.find_email_for_domain(&website).await;
                if let Some(bar) = &progress {
                    bar.inc(1);
                }
                Some((domain, email))
            }));
        }

        let mut results = HashMap::new();
        for outcome in futures::future::join_all(tasks).await {
            match outcome {
                Ok(Some((domain, email))) => {
                    results.insert(domain, email);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "email_task", "Email probe task failed: {}", e);
                }
            }
        }

        if let Some(bar) = progress {
            bar.finish_with_message("Email discovery complete");
        }
        results
    }

    /// Tries each common contact path in order, then the homepage. The
    /// first page yielding an email wins for the domain.
    async fn find_email_for_domain(&self, website: &str) -> Option<String> {
        let base = {
            let with_scheme = if website.starts_with("http://") || website.starts_with("https://") {
                website.to_string()
            } else {
                format!("https://{}", website)
            };
            let parsed = Url::parse(&with_scheme).ok()?;
            let host = parsed.host_str()?;
            Url::parse(&format!("{}://{}/", parsed.scheme(), host)).ok()?
        };

        for path in &self.config.common_paths {
            let Ok(url) = base.join(path) else {
                continue;
            };
            if let Some(email) = self.find_email_on_url(url).await {
                return Some(email);
            }
        }

        self.find_email_on_url(base).await
    }

    /// One page probe. Any network error, timeout, or non-200 response
    /// yields nothing so probing falls through to the next candidate.
    async fn find_email_on_url(&self, url: Url) -> Option<String> {
        let response = match self.http.get(url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(target: "email_task", "GET {} failed: {}", url, e);
                return None;
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            tracing::debug!(target: "email_task", "GET {} status: {}", url, response.status());
            return None;
        }
        let text = response.text().await.ok()?;
        extract_email_from_html(&text)
    }
}
