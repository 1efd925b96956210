use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ManifestError {
    #[error("listing is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("listing must be a JSON array")]
    NotAnArray,

    #[error("listing has no header entry")]
    MissingHeader,

    #[error("listing header is invalid: {0}")]
    InvalidHeader(&'static str),

    #[error("source list {list} is invalid: {reason}")]
    InvalidSource { list: usize, reason: String },
}

/// One parsed listing: the refresh header plus a frame-URL list per source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Manifest {
    next_refresh_epoch_secs: f64,
    frame_count: usize,
    sources: Vec<Vec<String>>,
}

impl Manifest {
    pub(crate) fn new(
        next_refresh_epoch_secs: f64,
        frame_count: usize,
        sources: Vec<Vec<String>>,
    ) -> Self {
        Self {
            next_refresh_epoch_secs,
            frame_count,
            sources,
        }
    }

    pub(crate) fn next_refresh_epoch_secs(&self) -> f64 {
        self.next_refresh_epoch_secs
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub(crate) fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub(crate) fn source_frames(&self, source: usize) -> Option<&[String]> {
        self.sources.get(source).map(Vec::as_slice)
    }

    pub(crate) fn frame_url(&self, source: usize, index: usize) -> Option<&str> {
        self.sources.get(source)?.get(index).map(String::as_str)
    }
}

/// Zoom level `z` shows source `z - 1`; anything outside the source range shows nothing.
pub(crate) fn source_for_zoom(zoom: i32, source_count: usize) -> Option<usize> {
    let source = usize::try_from(zoom).ok()?.checked_sub(1)?;
    (source < source_count).then_some(source)
}

pub(crate) fn parse_manifest(raw: &str) -> Result<Manifest, ManifestError> {
    let parsed: Value = serde_json::from_str(raw)?;
    let entries = parsed.as_array().ok_or(ManifestError::NotAnArray)?;
    let (header, source_entries) = entries.split_first().ok_or(ManifestError::MissingHeader)?;
    let (next_refresh_epoch_secs, frame_count) = parse_header(header)?;

    let mut sources = Vec::with_capacity(source_entries.len());
    for (offset, entry) in source_entries.iter().enumerate() {
        let source = offset + 1;
        let urls = entry
            .as_array()
            .ok_or_else(|| ManifestError::InvalidSource {
                list: source,
                reason: "expected an array of URLs".to_string(),
            })?;
        let mut frames = Vec::with_capacity(urls.len());
        for (position, url) in urls.iter().enumerate() {
            let url = url.as_str().ok_or_else(|| ManifestError::InvalidSource {
                list: source,
                reason: format!("entry {position} is not a string"),
            })?;
            frames.push(url.to_string());
        }
        if frames.len() < frame_count {
            tracing::warn!(
                source,
                frames = frames.len(),
                frame_count,
                "source lists fewer frames than the header announces"
            );
        }
        sources.push(frames);
    }

    Ok(Manifest::new(next_refresh_epoch_secs, frame_count, sources))
}

fn parse_header(header: &Value) -> Result<(f64, usize), ManifestError> {
    let fields = header
        .as_array()
        .ok_or(ManifestError::InvalidHeader("expected [refresh, frameCount]"))?;
    let [refresh, count, ..] = fields.as_slice() else {
        return Err(ManifestError::InvalidHeader("expected [refresh, frameCount]"));
    };

    let refresh = refresh
        .as_f64()
        .filter(|secs| secs.is_finite())
        .ok_or(ManifestError::InvalidHeader("refresh time is not a number"))?;
    if DateTime::<Utc>::from_timestamp_millis((refresh * 1000.0).round() as i64).is_none() {
        return Err(ManifestError::InvalidHeader("refresh time is out of range"));
    }
    let count = count
        .as_u64()
        .and_then(|count| usize::try_from(count).ok())
        .ok_or(ManifestError::InvalidHeader(
            "frame count is not a non-negative integer",
        ))?;
    Ok((refresh, count))
}
