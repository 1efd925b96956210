mod client;
mod manifest;
mod worker;

use std::time::Duration;

use thiserror::Error;

use crate::config::ListingSettings;
use crate::http::{FetchError, RequestPolicy, get_text_with_retries};

pub(crate) use client::{
    ListingClient, ListingHealth, ListingSnapshot, refresh_delay_ms, refresh_time_after,
};
pub(crate) use manifest::{Manifest, parse_manifest, source_for_zoom};
pub(crate) use worker::ListingWorker;

const IN_CALL_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub(crate) enum ListingError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Manifest(#[from] manifest::ManifestError),
}

/// Where listing bodies come from.
pub(crate) trait ListingSource {
    fn fetch_listing(&self) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub(crate) struct HttpListingSource {
    endpoint: String,
    policy: RequestPolicy,
}

impl HttpListingSource {
    pub(crate) fn from_settings(settings: &ListingSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            policy: RequestPolicy {
                connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
                read_timeout: Duration::from_millis(settings.read_timeout_ms),
                attempts: settings.attempts,
                retry_delay: IN_CALL_RETRY_DELAY,
            },
        }
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ListingSource for HttpListingSource {
    fn fetch_listing(&self) -> Result<String, FetchError> {
        get_text_with_retries(&self.endpoint, &self.policy)
    }
}

/// Fetches and parses one listing without any scheduling.
pub(crate) fn fetch_manifest(source: &impl ListingSource) -> Result<Manifest, ListingError> {
    let raw = source.fetch_listing()?;
    Ok(parse_manifest(&raw)?)
}
