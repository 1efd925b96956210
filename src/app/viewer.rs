use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};

use crate::config::{Settings, SourceLayers};

use super::listing::{ListingHealth, ListingSnapshot, Manifest, source_for_zoom};
use super::playback::{PlaybackController, SpeedTier, TierClock};

/// The three image layers drawn for the zoomed source, bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Composite<'a> {
    pub(crate) source: Option<usize>,
    pub(crate) name: Option<&'a str>,
    pub(crate) background: Option<&'a str>,
    pub(crate) overlay: Option<&'a str>,
    pub(crate) frame: Option<&'a str>,
}

/// State read by the terminal view: playback counters, the latest listing and
/// the static per-source layers.
pub(crate) struct Viewer {
    controller: PlaybackController,
    clock: TierClock,
    listing: ListingSnapshot,
    layers: Vec<SourceLayers>,
}

impl Viewer {
    pub(crate) fn new(settings: &Settings, now: Instant) -> Self {
        Self {
            controller: PlaybackController::new(
                settings.playback.initial_tier,
                settings.playback.initial_zoom,
            ),
            clock: TierClock::new(&settings.playback, now),
            listing: ListingSnapshot::pending(),
            layers: settings.sources.clone(),
        }
    }

    pub(crate) fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub(crate) fn listing(&self) -> &ListingSnapshot {
        &self.listing
    }

    pub(crate) fn manifest(&self) -> Option<&Manifest> {
        self.listing.manifest.as_deref()
    }

    pub(crate) fn layers(&self) -> &[SourceLayers] {
        &self.layers
    }

    pub(crate) fn apply_snapshot(&mut self, snapshot: ListingSnapshot) {
        self.controller.set_frame_count(snapshot.frame_count());
        self.listing = snapshot;
    }

    /// Marks the listing stale because nothing will refresh it anymore.
    ///
    /// The last manifest stays on screen. Returns `false` when already marked with `reason`.
    pub(crate) fn mark_listing_stopped(&mut self, reason: &str) -> bool {
        let consecutive_failures = match &self.listing.health {
            ListingHealth::Stale { error, .. } if error == reason => return false,
            ListingHealth::Stale {
                consecutive_failures,
                ..
            } => consecutive_failures.saturating_add(1),
            ListingHealth::Pending | ListingHealth::Live => 1,
        };
        self.listing.health = ListingHealth::Stale {
            error: reason.to_string(),
            consecutive_failures,
        };
        self.listing.next_refresh = None;
        true
    }

    pub(crate) fn advance(&mut self, now: Instant) -> usize {
        self.clock.advance(now, &mut self.controller)
    }

    pub(crate) fn until_next_tick(&self, now: Instant) -> Duration {
        self.clock.until_next(now)
    }

    pub(crate) fn tier_period(&self, tier: SpeedTier) -> Duration {
        self.clock.period(tier)
    }

    pub(crate) fn select_tier(&mut self, tier: SpeedTier) {
        self.controller.select_tier(tier);
    }

    pub(crate) fn set_zoom(&mut self, level: i32) {
        self.controller.set_zoom(level);
    }

    pub(crate) fn zoom_by(&mut self, step: i32) {
        let level = self.controller.zoom().saturating_add(step);
        self.controller.set_zoom(level);
    }

    fn source_count(&self) -> usize {
        let listed = self.manifest().map_or(0, Manifest::source_count);
        listed.max(self.layers.len())
    }

    /// URL of the current frame for `source`, if the listing has one.
    pub(crate) fn frame_url(&self, source: usize) -> Option<&str> {
        self.manifest()?
            .frame_url(source, self.controller.current_index())
    }

    pub(crate) fn composite(&self) -> Composite<'_> {
        let source = source_for_zoom(self.controller.zoom(), self.source_count());
        let layer = source.and_then(|source| self.layers.get(source));
        Composite {
            source,
            name: layer.map(|layer| layer.name.as_str()),
            background: layer.map(|layer| layer.background.as_str()),
            overlay: layer.map(|layer| layer.overlay.as_str()),
            frame: source.and_then(|source| self.frame_url(source)),
        }
    }
}

pub(crate) fn format_refresh_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}
