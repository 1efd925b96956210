mod actions;
mod render;
mod session;

use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::config::Settings;

use super::listing::{HttpListingSource, ListingClient, ListingWorker};
use super::viewer::Viewer;

#[cfg(test)]
pub(crate) use self::actions::{
    ViewerCommand, apply_command, command_for_key, drain_listing_snapshots,
};

use self::actions::status_info;
use self::render::draw_viewer;
use self::session::TuiSession;

const MAX_POLL: Duration = Duration::from_millis(50);

pub(crate) fn run_tui(settings: &Settings) -> Result<()> {
    let (snapshot_tx, snapshot_rx) = mpsc::channel();
    let source = HttpListingSource::from_settings(&settings.listing);
    tracing::info!(endpoint = source.endpoint(), "starting listing refresh chain");
    let client = ListingClient::new(source, &settings.listing);
    let mut worker = ListingWorker::spawn(client, snapshot_tx);

    let mut session = TuiSession::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to initialize terminal backend")?;
    terminal.clear()?;

    let mut viewer = Viewer::new(settings, Instant::now());
    let mut status = status_info("Waiting for the first listing...");

    loop {
        if let Some(update) = actions::drain_listing_snapshots(&snapshot_rx, &mut viewer) {
            status = update;
        }
        viewer.advance(Instant::now());
        terminal.draw(|frame| draw_viewer(frame, &viewer, &status))?;

        let wait = viewer.until_next_tick(Instant::now()).min(MAX_POLL);
        if !event::poll(wait)? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let Some(command) = actions::command_for_key(key.code) else {
            continue;
        };

        match command {
            actions::ViewerCommand::Quit => break,
            actions::ViewerCommand::Refresh => {
                worker.refresh_now();
                status = status_info("Refreshing listing...");
            }
            _ => {
                if let Some(update) = actions::apply_command(&mut viewer, command) {
                    status = update;
                }
            }
        }
    }

    worker.stop();
    terminal.show_cursor()?;
    session.leave()?;
    tracing::info!("viewer closed");
    Ok(())
}
