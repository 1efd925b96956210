mod listing;
mod playback;
mod tui;
mod viewer;


use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::cli::{Cli, Command};
use crate::config::Settings;
use crate::paths::config_file_path;

use self::listing::{HttpListingSource, fetch_manifest, refresh_delay_ms, refresh_time_after};
use self::viewer::format_refresh_time;

pub(crate) use self::playback::SpeedTier;

pub fn run(cli: Cli) -> Result<()> {
    let config_path = resolve_config_path(&cli)?;
    let settings = load_settings(&config_path, cli.endpoint.as_deref())?;

    match cli.command {
        Some(Command::Listing) => run_listing(&settings)?,
        Some(Command::Config) => run_config(&config_path, &settings)?,
        Some(Command::Watch) | None => tui::run_tui(&settings)?,
    }

    Ok(())
}

fn resolve_config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => config_file_path(),
    }
}

fn load_settings(path: &Path, endpoint_override: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(path)?;
    if let Some(endpoint) = endpoint_override {
        tracing::info!(endpoint, "listing endpoint overridden from command line");
        settings.listing.endpoint = endpoint.to_string();
        settings.validate()?;
    }
    Ok(settings)
}

fn run_listing(settings: &Settings) -> Result<()> {
    print!("{}", listing_report(settings, Utc::now())?);
    Ok(())
}

/// Fetches the listing once and renders what `radarloop listing` prints.
fn listing_report(settings: &Settings, now: DateTime<Utc>) -> Result<String> {
    let source = HttpListingSource::from_settings(&settings.listing);
    let manifest = fetch_manifest(&source)
        .with_context(|| format!("failed to fetch listing from {}", source.endpoint()))?;

    let pad_ms = i64::try_from(settings.listing.refresh_pad_ms).unwrap_or(i64::MAX);
    let delay_ms = refresh_delay_ms(
        manifest.next_refresh_epoch_secs(),
        pad_ms,
        now.timestamp_millis(),
    );
    let next_refresh = refresh_time_after(now, delay_ms);

    let mut out = String::new();
    writeln!(out, "Listing from {}", source.endpoint())?;
    writeln!(out, "  Frames per cycle: {}", manifest.frame_count())?;
    writeln!(
        out,
        "  Next refresh: {} ({})",
        format_refresh_time(next_refresh),
        describe_delay(delay_ms)
    )?;

    if manifest.source_count() == 0 {
        writeln!(out, "No sources listed.")?;
        return Ok(out);
    }

    writeln!(out)?;
    writeln!(
        out,
        "{:<4} {:<12} {:<8} {:<40}",
        "ZOOM", "SOURCE", "FRAMES", "LATEST FRAME"
    )?;
    for source in 0..manifest.source_count() {
        let frames = manifest.source_frames(source).unwrap_or_default();
        let name = settings
            .sources
            .get(source)
            .map_or("-", |layer| layer.name.as_str());
        writeln!(
            out,
            "{:<4} {:<12} {:<8} {:<40}",
            source + 1,
            name,
            frames.len(),
            frames.last().map_or("-", String::as_str)
        )?;
    }
    Ok(out)
}

fn run_config(path: &Path, settings: &Settings) -> Result<()> {
    let state = if path.exists() { "" } else { " (not created, showing defaults)" };
    println!("# {}{state}", path.display());
    print!("{}", settings.to_toml()?);
    Ok(())
}

pub(crate) fn describe_delay(delay_ms: i64) -> String {
    if delay_ms <= 0 {
        return "due now".to_string();
    }
    let secs = delay_ms / 1000;
    match secs {
        0 => format!("in {delay_ms}ms"),
        1..=59 => format!("in {secs}s"),
        _ => format!("in {}m {:02}s", secs / 60, secs % 60),
    }
}
