use std::sync::mpsc::{self, TryRecvError};

use crossterm::event::KeyCode;

use super::super::listing::{ListingHealth, ListingSnapshot};
use super::super::playback::SpeedTier;
use super::super::viewer::Viewer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ViewerCommand {
    Quit,
    Refresh,
    SelectTier(SpeedTier),
    Faster,
    Slower,
    ZoomBy(i32),
    SetZoom(i32),
}

pub(crate) fn command_for_key(code: KeyCode) -> Option<ViewerCommand> {
    let command = match code {
        KeyCode::Char('q') | KeyCode::Esc => ViewerCommand::Quit,
        KeyCode::Char('r') => ViewerCommand::Refresh,
        KeyCode::Char('s') => ViewerCommand::SelectTier(SpeedTier::Slow),
        KeyCode::Char('m') => ViewerCommand::SelectTier(SpeedTier::Medium),
        KeyCode::Char('f') => ViewerCommand::SelectTier(SpeedTier::Fast),
        KeyCode::Right => ViewerCommand::Faster,
        KeyCode::Left => ViewerCommand::Slower,
        KeyCode::Char('+') | KeyCode::Char('=') => ViewerCommand::ZoomBy(1),
        KeyCode::Char('-') => ViewerCommand::ZoomBy(-1),
        KeyCode::Char(digit @ '1'..='9') => {
            ViewerCommand::SetZoom(digit.to_digit(10).map_or(1, |level| level as i32))
        }
        _ => return None,
    };
    Some(command)
}

/// Applies a playback command and returns the status line to show.
///
/// `Quit` and `Refresh` are handled by the event loop and leave the viewer untouched.
pub(crate) fn apply_command(viewer: &mut Viewer, command: ViewerCommand) -> Option<String> {
    match command {
        ViewerCommand::Quit | ViewerCommand::Refresh => return None,
        ViewerCommand::SelectTier(tier) => viewer.select_tier(tier),
        ViewerCommand::Faster => {
            let tier = viewer.controller().active_tier().faster();
            viewer.select_tier(tier);
        }
        ViewerCommand::Slower => {
            let tier = viewer.controller().active_tier().slower();
            viewer.select_tier(tier);
        }
        ViewerCommand::ZoomBy(step) => viewer.zoom_by(step),
        ViewerCommand::SetZoom(level) => viewer.set_zoom(level),
    }

    let message = match command {
        ViewerCommand::SelectTier(_) | ViewerCommand::Faster | ViewerCommand::Slower => format!(
            "Speed {} at frame {}.",
            viewer.controller().active_tier().label(),
            viewer.controller().current_index() + 1
        ),
        _ => {
            let composite = viewer.composite();
            match composite.name {
                Some(name) => format!("Zoom {} ({name}).", viewer.controller().zoom()),
                None => format!("Zoom {}: no source at this level.", viewer.controller().zoom()),
            }
        }
    };
    Some(status_info(&message))
}

const WORKER_STOPPED: &str = "listing worker stopped";

/// Applies every snapshot the refresh worker has published since the last frame.
///
/// A closed channel means the worker is gone, so the listing is marked stale once.
pub(crate) fn drain_listing_snapshots(
    rx: &mpsc::Receiver<ListingSnapshot>,
    viewer: &mut Viewer,
) -> Option<String> {
    let mut status = None;
    loop {
        let snapshot = match rx.try_recv() {
            Ok(snapshot) => snapshot,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                if viewer.mark_listing_stopped(WORKER_STOPPED) {
                    tracing::error!("listing worker stopped, the listing will not refresh again");
                    status = Some(status_error(
                        "Listing worker stopped, showing the last listing. Restart to resume.",
                    ));
                }
                break;
            }
        };
        status = Some(match &snapshot.health {
            ListingHealth::Pending => status_info("Waiting for the first listing..."),
            ListingHealth::Live => status_info(&format!(
                "Listing refreshed: {} frames across {} sources.",
                snapshot.frame_count(),
                snapshot.manifest.as_ref().map_or(0, |manifest| manifest.source_count())
            )),
            ListingHealth::Stale { error, .. } if snapshot.manifest.is_some() => status_error(
                &format!("Listing refresh failed, showing last good listing: {error}"),
            ),
            ListingHealth::Stale { error, .. } => {
                status_error(&format!("Listing unavailable: {error}"))
            }
        });
        viewer.apply_snapshot(snapshot);
    }
    status
}

pub(crate) fn status_info(msg: &str) -> String {
    format!("INFO: {msg}")
}

pub(crate) fn status_error(msg: &str) -> String {
    format!("ERROR: {msg}")
}
