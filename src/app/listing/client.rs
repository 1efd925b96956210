use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::ListingSettings;

use super::{ListingSource, Manifest, fetch_manifest};

/// Milliseconds from `now_ms` until the server's refresh time plus `pad_ms`.
///
/// Negative when the server's timestamp is already behind us. Saturates instead of overflowing.
pub(crate) fn refresh_delay_ms(next_refresh_epoch_secs: f64, pad_ms: i64, now_ms: i64) -> i64 {
    let refresh_ms = (next_refresh_epoch_secs * 1000.0).round() as i64;
    refresh_ms.saturating_add(pad_ms).saturating_sub(now_ms)
}

/// `now` moved forward by `delay_ms`, pinned to the last representable instant.
pub(crate) fn refresh_time_after(now: DateTime<Utc>, delay_ms: i64) -> DateTime<Utc> {
    chrono::Duration::try_milliseconds(delay_ms)
        .and_then(|offset| now.checked_add_signed(offset))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListingHealth {
    Pending,
    Live,
    Stale {
        error: String,
        consecutive_failures: u32,
    },
}

impl ListingHealth {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Live => "LIVE",
            Self::Stale { .. } => "STALE",
        }
    }
}

/// Everything the viewer needs from one refresh, published as a unit.
#[derive(Debug, Clone)]
pub(crate) struct ListingSnapshot {
    pub(crate) manifest: Option<Arc<Manifest>>,
    pub(crate) health: ListingHealth,
    pub(crate) last_success: Option<DateTime<Utc>>,
    pub(crate) next_refresh: Option<DateTime<Utc>>,
}

impl ListingSnapshot {
    pub(crate) fn pending() -> Self {
        Self {
            manifest: None,
            health: ListingHealth::Pending,
            last_success: None,
            next_refresh: None,
        }
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.manifest.as_deref().map_or(0, Manifest::frame_count)
    }
}

#[derive(Debug, Clone)]
struct Backoff {
    initial: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            failures: 0,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let factor = 1_u32 << self.failures.min(16);
        self.failures = self.failures.saturating_add(1);
        self.initial.saturating_mul(factor).min(self.max)
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Owns the last good manifest and decides when the next refresh is due.
pub(crate) struct ListingClient<S> {
    source: S,
    refresh_pad_ms: i64,
    min_refresh_delay: Duration,
    backoff: Backoff,
    snapshot: ListingSnapshot,
}

impl<S: ListingSource> ListingClient<S> {
    pub(crate) fn new(source: S, settings: &ListingSettings) -> Self {
        Self {
            source,
            refresh_pad_ms: i64::try_from(settings.refresh_pad_ms).unwrap_or(i64::MAX),
            min_refresh_delay: Duration::from_millis(settings.min_refresh_delay_ms),
            backoff: Backoff::new(
                Duration::from_millis(settings.retry_initial_ms),
                Duration::from_millis(settings.retry_max_ms),
            ),
            snapshot: ListingSnapshot::pending(),
        }
    }

    pub(crate) fn snapshot(&self) -> &ListingSnapshot {
        &self.snapshot
    }

    /// Fetches the listing once and returns how long to wait before the next refresh.
    ///
    /// A failed fetch or a rejected payload leaves the previous manifest in place.
    pub(crate) fn refresh(&mut self, now: DateTime<Utc>) -> Duration {
        let delay = match fetch_manifest(&self.source) {
            Ok(manifest) => {
                let raw_delay = refresh_delay_ms(
                    manifest.next_refresh_epoch_secs(),
                    self.refresh_pad_ms,
                    now.timestamp_millis(),
                );
                let delay = Duration::from_millis(u64::try_from(raw_delay).unwrap_or(0))
                    .max(self.min_refresh_delay);
                tracing::info!(
                    frame_count = manifest.frame_count(),
                    sources = manifest.source_count(),
                    raw_delay_ms = raw_delay,
                    delay_ms = delay.as_millis() as u64,
                    "listing refreshed"
                );

                self.backoff.reset();
                self.snapshot.manifest = Some(Arc::new(manifest));
                self.snapshot.health = ListingHealth::Live;
                self.snapshot.last_success = Some(now);
                delay
            }
            Err(err) => {
                let delay = self.backoff.next_delay();
                let consecutive_failures = self.backoff.failures;
                tracing::warn!(
                    error = %err,
                    consecutive_failures,
                    retry_in_ms = delay.as_millis() as u64,
                    keeping_manifest = self.snapshot.manifest.is_some(),
                    "listing refresh failed"
                );
                self.snapshot.health = ListingHealth::Stale {
                    error: err.to_string(),
                    consecutive_failures,
                };
                delay
            }
        };

        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        self.snapshot.next_refresh = Some(refresh_time_after(now, delay_ms));
        delay
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use chrono::TimeZone;

    use super::*;
    use crate::http::FetchError;

    struct ScriptedSource {
        responses: RefCell<VecDeque<Result<String, FetchError>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<String, FetchError>>) -> Self {
            Self {
                responses: RefCell::new(VecDeque::from(responses)),
            }
        }
    }

    impl ListingSource for ScriptedSource {
        fn fetch_listing(&self) -> Result<String, FetchError> {
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Transport("script exhausted".to_string())))
        }
    }

    fn ok(body: &str) -> Result<String, FetchError> {
        Ok(body.to_string())
    }

    fn down() -> Result<String, FetchError> {
        Err(FetchError::Transport("connection refused".to_string()))
    }

    fn at_millis(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().expect("valid timestamp")
    }

    fn client(responses: Vec<Result<String, FetchError>>) -> ListingClient<ScriptedSource> {
        ListingClient::new(ScriptedSource::new(responses), &ListingSettings::default())
    }

    #[test]
    fn delay_counts_from_server_timestamp_plus_pad() {
        assert_eq!(refresh_delay_ms(1000.0, 5_000, 1_002_000), 3_000);
        assert_eq!(refresh_delay_ms(1000.0, 5_000, 1_010_000), -5_000);
        assert_eq!(refresh_delay_ms(1000.25, 0, 1_000_000), 250);
        assert_eq!(refresh_delay_ms(1e300, 5_000, 0), i64::MAX);
        assert_eq!(refresh_delay_ms(-1e300, 5_000, 1_000_000), i64::MIN);
    }

    #[test]
    fn refresh_time_stays_representable() {
        let now = at_millis(1_700_000_000_000);
        assert_eq!(refresh_time_after(now, 3_000), at_millis(1_700_000_003_000));
        assert_eq!(refresh_time_after(now, i64::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn out_of_range_refresh_time_is_rejected_and_retried() {
        let mut client = client(vec![
            ok(r#"[[1700000000, 2], ["a0", "a1"]]"#),
            ok(r#"[[1e13, 3], ["a0", "a1", "a2"]]"#),
        ]);
        let now = at_millis(1_700_000_000_000);
        client.refresh(now);

        let delay = client.refresh(now);

        assert_eq!(delay, Duration::from_millis(2_000));
        let snapshot = client.snapshot();
        assert_eq!(snapshot.frame_count(), 2);
        assert_eq!(snapshot.next_refresh, Some(at_millis(1_700_000_002_000)));
        match &snapshot.health {
            ListingHealth::Stale { error, .. } => {
                assert!(error.contains("out of range"), "unexpected error: {error}");
            }
            other => panic!("expected stale health, got {other:?}"),
        }
    }

    #[test]
    fn distant_but_valid_refresh_time_schedules_without_overflow() {
        // Close to the largest timestamp chrono can represent.
        let mut client = client(vec![ok(r#"[[8000000000000, 1], ["a0"]]"#)]);
        let now = at_millis(1_700_000_000_000);

        let delay = client.refresh(now);

        assert!(delay > Duration::from_secs(1_000_000_000));
        let snapshot = client.snapshot();
        assert_eq!(snapshot.health, ListingHealth::Live);
        assert!(snapshot.next_refresh.is_some_and(|at| at > now));
    }

    #[test]
    fn successful_refresh_replaces_manifest_and_schedules_from_header() {
        let mut client = client(vec![ok(r#"[[1000, 3], ["a0", "a1", "a2"]]"#)]);
        let now = at_millis(1_002_000);

        let delay = client.refresh(now);

        assert_eq!(delay, Duration::from_millis(3_000));
        let snapshot = client.snapshot();
        assert_eq!(snapshot.health, ListingHealth::Live);
        assert_eq!(snapshot.frame_count(), 3);
        assert_eq!(snapshot.last_success, Some(now));
        assert_eq!(snapshot.next_refresh, Some(at_millis(1_005_000)));
        let manifest = snapshot.manifest.as_deref().expect("manifest stored");
        assert_eq!(manifest.frame_url(0, 1), Some("a1"));
    }

    #[test]
    fn stale_server_timestamp_waits_the_minimum_delay() {
        let mut client = client(vec![ok(r#"[[1000, 3], ["a0", "a1", "a2"]]"#)]);

        let delay = client.refresh(at_millis(2_000_000));

        assert_eq!(delay, Duration::from_millis(1_000));
    }

    #[test]
    fn failure_keeps_last_good_manifest_and_marks_stale() {
        let mut client = client(vec![ok(r#"[[1000, 2], ["a0", "a1"]]"#), down()]);
        client.refresh(at_millis(1_000_000));

        let delay = client.refresh(at_millis(1_006_000));

        assert_eq!(delay, Duration::from_millis(2_000));
        let snapshot = client.snapshot();
        assert_eq!(snapshot.frame_count(), 2);
        assert_eq!(snapshot.last_success, Some(at_millis(1_000_000)));
        match &snapshot.health {
            ListingHealth::Stale {
                error,
                consecutive_failures,
            } => {
                assert!(error.contains("connection refused"), "unexpected error: {error}");
                assert_eq!(*consecutive_failures, 1);
            }
            other => panic!("expected stale health, got {other:?}"),
        }
    }

    #[test]
    fn malformed_listing_is_rejected_without_touching_manifest() {
        let mut client = client(vec![
            ok(r#"[[1000, 2], ["a0", "a1"]]"#),
            ok(r#"{"unexpected": true}"#),
        ]);
        client.refresh(at_millis(1_000_000));
        let before = client.snapshot().manifest.clone();

        client.refresh(at_millis(1_006_000));

        let snapshot = client.snapshot();
        assert_eq!(snapshot.health.label(), "STALE");
        assert_eq!(snapshot.manifest, before);
    }

    #[test]
    fn backoff_doubles_caps_and_resets_after_success() {
        let mut responses: Vec<_> = (0..7).map(|_| down()).collect();
        responses.push(ok("[[1000, 1], [\"a0\"]]"));
        responses.push(down());
        let mut client = client(responses);
        let now = at_millis(1_000_000);

        let delays: Vec<u128> = (0..7).map(|_| client.refresh(now).as_millis()).collect();
        assert_eq!(delays, vec![2_000, 4_000, 8_000, 16_000, 32_000, 60_000, 60_000]);

        client.refresh(now);
        assert_eq!(client.snapshot().health, ListingHealth::Live);
        assert_eq!(client.refresh(now), Duration::from_millis(2_000));
    }

    #[test]
    fn first_failure_leaves_no_manifest() {
        let mut client = client(vec![down()]);
        client.refresh(at_millis(1_000_000));
        let snapshot = client.snapshot();
        assert!(snapshot.manifest.is_none());
        assert_eq!(snapshot.frame_count(), 0);
        assert_eq!(snapshot.health.label(), "STALE");
        assert_eq!(snapshot.next_refresh, Some(at_millis(1_002_000)));
    }
}
