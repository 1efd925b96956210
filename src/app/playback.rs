use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::PlaybackSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedTier {
    Slow,
    Medium,
    Fast,
}

impl SpeedTier {
    pub(crate) const ALL: [SpeedTier; 3] = [Self::Slow, Self::Medium, Self::Fast];

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Slow => "SLOW",
            Self::Medium => "MEDIUM",
            Self::Fast => "FAST",
        }
    }

    pub(crate) fn faster(self) -> Self {
        match self {
            Self::Slow => Self::Medium,
            Self::Medium | Self::Fast => Self::Fast,
        }
    }

    pub(crate) fn slower(self) -> Self {
        match self {
            Self::Fast => Self::Medium,
            Self::Medium | Self::Slow => Self::Slow,
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Slow => 0,
            Self::Medium => 1,
            Self::Fast => 2,
        }
    }
}

/// Frame counters for the three speed tiers plus zoom.
///
/// Every tier keeps counting in the background; only the active tier is shown.
/// Switching tiers hands the visible index over to the incoming tier so the
/// picture never jumps.
#[derive(Debug, Clone)]
pub(crate) struct PlaybackController {
    indices: [usize; 3],
    active: SpeedTier,
    frame_count: usize,
    zoom: i32,
}

impl PlaybackController {
    pub(crate) fn new(active: SpeedTier, zoom: i32) -> Self {
        Self {
            indices: [0; 3],
            active,
            frame_count: 0,
            zoom,
        }
    }

    pub(crate) fn select_tier(&mut self, tier: SpeedTier) {
        if tier != self.active {
            self.indices[tier.slot()] = self.indices[self.active.slot()];
        }
        self.active = tier;
    }

    pub(crate) fn current_index(&self) -> usize {
        self.index_of(self.active)
    }

    pub(crate) fn index_of(&self, tier: SpeedTier) -> usize {
        self.indices[tier.slot()]
    }

    pub(crate) fn active_tier(&self) -> SpeedTier {
        self.active
    }

    pub(crate) fn set_zoom(&mut self, level: i32) {
        self.zoom = level;
    }

    pub(crate) fn zoom(&self) -> i32 {
        self.zoom
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Advances one tier. Without frames there is nothing to cycle, so the index stays put.
    pub(crate) fn tick(&mut self, tier: SpeedTier) {
        if self.frame_count == 0 {
            return;
        }
        let slot = &mut self.indices[tier.slot()];
        *slot = (*slot + 1) % self.frame_count;
    }

    pub(crate) fn set_frame_count(&mut self, frame_count: usize) {
        self.frame_count = frame_count;
        for index in &mut self.indices {
            *index = if frame_count == 0 {
                0
            } else {
                *index % frame_count
            };
        }
    }
}

/// Per-tier tick deadlines, polled from the event loop.
#[derive(Debug, Clone)]
pub(crate) struct TierClock {
    periods: [Duration; 3],
    next_due: [Instant; 3],
}

impl TierClock {
    pub(crate) fn new(settings: &PlaybackSettings, now: Instant) -> Self {
        let periods = SpeedTier::ALL.map(|tier| settings.period(tier));
        let next_due = periods.map(|period| now + period);
        Self { periods, next_due }
    }

    pub(crate) fn period(&self, tier: SpeedTier) -> Duration {
        self.periods[tier.slot()]
    }

    /// Ticks every tier whose deadline has passed. A tier that fell more than a
    /// period behind ticks once and restarts its schedule from `now`.
    pub(crate) fn advance(&mut self, now: Instant, controller: &mut PlaybackController) -> usize {
        let mut ticks = 0;
        for tier in SpeedTier::ALL {
            let slot = tier.slot();
            if now < self.next_due[slot] {
                continue;
            }
            controller.tick(tier);
            ticks += 1;

            let period = self.periods[slot];
            self.next_due[slot] += period;
            if self.next_due[slot] <= now {
                self.next_due[slot] = now + period;
            }
        }
        ticks
    }

    /// Time until the earliest pending tick.
    pub(crate) fn until_next(&self, now: Instant) -> Duration {
        self.next_due
            .iter()
            .map(|due| due.saturating_duration_since(now))
            .min()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_with_frames(frames: usize) -> PlaybackController {
        let mut controller = PlaybackController::new(SpeedTier::Medium, 2);
        controller.set_frame_count(frames);
        controller
    }

    #[test]
    fn exactly_one_tier_is_active_after_each_switch() {
        let mut controller = controller_with_frames(10);
        for tier in [
            SpeedTier::Fast,
            SpeedTier::Slow,
            SpeedTier::Slow,
            SpeedTier::Medium,
            SpeedTier::Fast,
        ] {
            controller.select_tier(tier);
            let active: Vec<_> = SpeedTier::ALL
                .into_iter()
                .filter(|candidate| *candidate == controller.active_tier())
                .collect();
            assert_eq!(active, vec![tier]);
        }
    }

    #[test]
    fn switch_carries_index_into_incoming_tier() {
        let mut controller = controller_with_frames(30);
        controller.select_tier(SpeedTier::Slow);
        for _ in 0..5 {
            controller.tick(SpeedTier::Slow);
        }
        controller.tick(SpeedTier::Fast);

        controller.select_tier(SpeedTier::Fast);

        assert_eq!(controller.current_index(), 5);
        assert_eq!(controller.index_of(SpeedTier::Fast), 5);
        assert_eq!(controller.index_of(SpeedTier::Slow), 5);
    }

    #[test]
    fn reselecting_active_tier_changes_nothing() {
        let mut controller = controller_with_frames(30);
        controller.tick(SpeedTier::Medium);
        controller.tick(SpeedTier::Slow);
        controller.select_tier(SpeedTier::Medium);
        assert_eq!(controller.active_tier(), SpeedTier::Medium);
        assert_eq!(controller.current_index(), 1);
        assert_eq!(controller.index_of(SpeedTier::Slow), 1);
    }

    #[test]
    fn medium_ticks_show_up_in_current_index() {
        let mut controller = controller_with_frames(30);
        controller.select_tier(SpeedTier::Medium);
        for _ in 0..3 {
            controller.tick(SpeedTier::Medium);
        }
        assert_eq!(controller.current_index(), 3);
    }

    #[test]
    fn background_tiers_advance_without_being_shown() {
        let mut controller = controller_with_frames(30);
        controller.tick(SpeedTier::Fast);
        controller.tick(SpeedTier::Fast);
        assert_eq!(controller.current_index(), 0);
        assert_eq!(controller.index_of(SpeedTier::Fast), 2);
    }

    #[test]
    fn ticks_cycle_through_every_frame_and_wrap() {
        for tier in SpeedTier::ALL {
            for frames in [1, 2, 7] {
                let mut controller = controller_with_frames(frames);
                let mut seen = Vec::new();
                for _ in 0..frames {
                    seen.push(controller.index_of(tier));
                    controller.tick(tier);
                }
                assert_eq!(seen, (0..frames).collect::<Vec<_>>());
                assert_eq!(controller.index_of(tier), 0, "wrap for {frames} frames");
            }
        }
    }

    #[test]
    fn tick_without_frames_keeps_index_at_zero() {
        let mut controller = PlaybackController::new(SpeedTier::Fast, 2);
        for tier in SpeedTier::ALL {
            controller.tick(tier);
        }
        assert_eq!(controller.frame_count(), 0);
        assert_eq!(controller.current_index(), 0);
    }

    #[test]
    fn shrinking_frame_count_wraps_indices_into_range() {
        let mut controller = controller_with_frames(10);
        for _ in 0..7 {
            controller.tick(SpeedTier::Medium);
        }
        controller.set_frame_count(4);
        assert_eq!(controller.current_index(), 3);

        controller.set_frame_count(0);
        assert_eq!(controller.current_index(), 0);
    }

    #[test]
    fn zoom_is_stored_without_bounds_checks() {
        let mut controller = controller_with_frames(3);
        controller.set_zoom(-4);
        assert_eq!(controller.zoom(), -4);
        controller.set_zoom(120);
        assert_eq!(controller.zoom(), 120);
    }

    #[test]
    fn tier_stepping_saturates_at_the_ends() {
        assert_eq!(SpeedTier::Fast.faster(), SpeedTier::Fast);
        assert_eq!(SpeedTier::Slow.slower(), SpeedTier::Slow);
        assert_eq!(SpeedTier::Slow.faster(), SpeedTier::Medium);
        assert_eq!(SpeedTier::Fast.slower(), SpeedTier::Medium);
    }

    #[test]
    fn clock_ticks_each_tier_on_its_own_period() {
        let settings = PlaybackSettings::default();
        let start = Instant::now();
        let mut clock = TierClock::new(&settings, start);
        let mut controller = controller_with_frames(100);

        // Step in 10ms increments for one second of simulated time.
        for step in 1..=100 {
            clock.advance(start + Duration::from_millis(step * 10), &mut controller);
        }

        assert_eq!(controller.index_of(SpeedTier::Slow), 2);
        assert_eq!(controller.index_of(SpeedTier::Medium), 5);
        assert_eq!(controller.index_of(SpeedTier::Fast), 12);
    }

    #[test]
    fn clock_does_not_replay_missed_ticks_after_a_stall() {
        let settings = PlaybackSettings::default();
        let start = Instant::now();
        let mut clock = TierClock::new(&settings, start);
        let mut controller = controller_with_frames(100);

        let ticks = clock.advance(start + Duration::from_secs(5), &mut controller);

        assert_eq!(ticks, 3);
        assert_eq!(controller.index_of(SpeedTier::Fast), 1);
        assert_eq!(
            clock.until_next(start + Duration::from_secs(5)),
            clock.period(SpeedTier::Fast)
        );
    }
}
