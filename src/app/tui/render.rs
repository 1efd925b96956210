use chrono::Utc;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Cell, Gauge, Paragraph, Row, Table, Wrap};

use super::super::describe_delay;
use super::super::listing::ListingHealth;
use super::super::playback::SpeedTier;
use super::super::viewer::{Viewer, format_refresh_time};

pub(super) fn draw_viewer(frame: &mut Frame, viewer: &Viewer, status: &str) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let controller = viewer.controller();
    let frame_count = controller.frame_count();
    let position_text = if frame_count == 0 {
        "no frames".to_string()
    } else {
        format!("frame {}/{}", controller.current_index() + 1, frame_count)
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "RADARLOOP",
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            controller.active_tier().label(),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            format!("zoom {}", controller.zoom()),
            Style::default().fg(Color::Rgb(185, 195, 210)),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(position_text, Style::default().fg(Color::Rgb(185, 195, 210))),
    ]))
    .alignment(Alignment::Center)
    .block(panel_block("Loop"));
    frame.render_widget(header, chunks[0]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(58), Constraint::Percentage(42)])
        .split(chunks[1]);
    let side_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(7), Constraint::Length(7)])
        .split(body_chunks[1]);

    draw_sources(frame, viewer, body_chunks[0]);
    draw_composite(frame, viewer, side_chunks[0]);
    draw_listing(frame, viewer, side_chunks[1]);

    let ratio = if frame_count == 0 {
        0.0
    } else {
        (controller.current_index() + 1) as f64 / frame_count as f64
    };
    let progress = Gauge::default()
        .block(panel_block("Cycle"))
        .gauge_style(
            Style::default()
                .fg(Color::Rgb(130, 190, 255))
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .label(if frame_count == 0 {
            "waiting for frames".to_string()
        } else {
            format!("{} / {}", controller.current_index() + 1, frame_count)
        })
        .ratio(ratio.clamp(0.0, 1.0));
    frame.render_widget(progress, chunks[2]);

    let command_bar = Paragraph::new(tier_selector_line(viewer))
        .alignment(Alignment::Center)
        .block(panel_block("Controls"));
    frame.render_widget(command_bar, chunks[3]);

    let status_widget = Paragraph::new(status.to_string())
        .style(status_style(status))
        .block(panel_block("Status"));
    frame.render_widget(status_widget, chunks[4]);
}

fn draw_sources(frame: &mut Frame, viewer: &Viewer, area: Rect) {
    let zoomed = viewer.composite().source;
    let source_count = viewer
        .manifest()
        .map_or(0, |manifest| manifest.source_count());

    let rows: Vec<Row> = (0..source_count)
        .map(|source| {
            let name = viewer
                .layers()
                .get(source)
                .map_or_else(|| format!("source {}", source + 1), |layer| layer.name.clone());
            let frames = viewer
                .manifest()
                .and_then(|manifest| manifest.source_frames(source))
                .map_or(0, <[String]>::len);
            let row = Row::new(vec![
                Cell::from((source + 1).to_string()),
                Cell::from(name),
                Cell::from(frames.to_string()),
                Cell::from(viewer.frame_url(source).unwrap_or("-").to_string()),
            ]);
            if zoomed == Some(source) {
                row.style(
                    Style::default()
                        .bg(Color::Rgb(110, 170, 255))
                        .fg(Color::Black)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                row
            }
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Length(12),
            Constraint::Length(7),
            Constraint::Min(20),
        ],
    )
    .header(
        Row::new(vec!["Zoom", "Source", "Frames", "Current Frame"]).style(
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(panel_block("Sources"));
    frame.render_widget(table, area);
}

fn draw_composite(frame: &mut Frame, viewer: &Viewer, area: Rect) {
    let composite = viewer.composite();
    let text = match composite.source {
        Some(_) => format!(
            "Source\n{}\n\nBackground\n{}\n\nOverlay\n{}\n\nFrame\n{}",
            composite.name.unwrap_or("-"),
            composite.background.unwrap_or("-"),
            composite.overlay.unwrap_or("-"),
            composite.frame.unwrap_or("(not listed yet)"),
        ),
        None => format!(
            "No source at zoom {}.\n\nUse +/- or 1-9 to pick a source.",
            viewer.controller().zoom()
        ),
    };
    let composite = Paragraph::new(text)
        .style(Style::default().fg(Color::Rgb(230, 230, 230)))
        .wrap(Wrap { trim: true })
        .block(panel_block("Composite"));
    frame.render_widget(composite, area);
}

fn draw_listing(frame: &mut Frame, viewer: &Viewer, area: Rect) {
    let listing = viewer.listing();
    let (health_text, health_style) = match &listing.health {
        ListingHealth::Live => (
            listing.health.label().to_string(),
            Style::default().fg(Color::Rgb(140, 220, 150)),
        ),
        ListingHealth::Pending => (
            listing.health.label().to_string(),
            Style::default().fg(Color::Rgb(185, 195, 210)),
        ),
        ListingHealth::Stale {
            consecutive_failures,
            ..
        } => (
            format!("{} ({consecutive_failures} failed)", listing.health.label()),
            Style::default()
                .fg(Color::Rgb(255, 145, 120))
                .add_modifier(Modifier::BOLD),
        ),
    };

    let last = listing
        .last_success
        .map_or_else(|| "never".to_string(), format_refresh_time);
    let next = listing.next_refresh.map_or_else(
        || "-".to_string(),
        |at| {
            let delay_ms = (at - Utc::now()).num_milliseconds();
            format!("{} ({})", format_refresh_time(at), describe_delay(delay_ms))
        },
    );

    let lines = vec![
        Line::from(vec![
            Span::raw("Health  "),
            Span::styled(health_text, health_style),
        ]),
        Line::from(format!("Last    {last}")),
        Line::from(format!("Next    {next}")),
    ];
    let widget = Paragraph::new(lines)
        .style(Style::default().fg(Color::Rgb(230, 230, 230)))
        .block(panel_block("Listing"));
    frame.render_widget(widget, area);
}

fn panel_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(125, 135, 150)))
        .title(title)
}

fn tier_pill_style(tier: SpeedTier, current: SpeedTier) -> Style {
    if tier == current {
        Style::default()
            .bg(Color::Rgb(110, 170, 255))
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
            .bg(Color::Rgb(72, 82, 96))
            .fg(Color::Rgb(230, 235, 242))
    }
}

fn tier_selector_line(viewer: &Viewer) -> Line<'static> {
    let current = viewer.controller().active_tier();
    let mut spans = Vec::new();
    for tier in SpeedTier::ALL {
        spans.push(Span::styled(
            format!(" {} {}ms ", tier.label(), viewer.tier_period(tier).as_millis()),
            tier_pill_style(tier, current),
        ));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(
        "  s/m/f speed  ←/→ step  +/- or 1-9 zoom  r refresh  q quit",
        Style::default().fg(Color::Rgb(185, 195, 210)),
    ));
    Line::from(spans)
}

fn status_style(status: &str) -> Style {
    if status.starts_with("ERROR:") {
        Style::default()
            .fg(Color::Rgb(255, 145, 120))
            .add_modifier(Modifier::BOLD)
    } else if status.starts_with("INFO:") {
        Style::default().fg(Color::Rgb(205, 165, 255))
    } else {
        Style::default().fg(Color::Rgb(230, 235, 242))
    }
}
