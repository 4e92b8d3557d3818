//! TUI layout and widget rendering.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::symbols;
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Line as Segment};
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, Paragraph};

use super::runtime::App;
use super::style;

/// Renders the full TUI frame.
pub fn render(frame: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Min(12),   // grid + chart
            Constraint::Length(8), // status panel
            Constraint::Length(1), // footer
        ])
        .split(frame.area());
    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);

    render_header(frame, app, rows[0]);
    render_grid(frame, app, middle[0]);
    render_chart(frame, app, middle[1]);
    render_status(frame, app, rows[2]);
    render_footer(frame, rows[3]);
}

/// Header bar: grid, chronics, replay progress, speed, replay state.
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let (state_icon, state_label) = if app.is_finished() {
        ("■", "DONE")
    } else if app.paused {
        ("‖", "PAUSED")
    } else {
        ("▶", "PLAYING")
    };
    let meta = app.data().meta();

    let header = Line::from(vec![
        Span::styled(
            " GRID-SIM ",
            Style::default()
                .fg(style::HEADER_FG)
                .bg(style::HEADER_BG)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(
            format!("{} / {}", meta.grid, meta.chronics_id),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            " │ {} │ t={}/{} │ {}ms │ {} {} ",
            meta.agent,
            app.step,
            app.total_steps(),
            app.tick_interval_ms(),
            state_icon,
            state_label,
        )),
    ]);
    frame.render_widget(Paragraph::new(header), area);
}

/// Substations and lines at the current step; disconnected lines in red.
fn render_grid(frame: &mut Frame, app: &App, area: Rect) {
    let grid = app.data().grid();
    let ((x0, x1), (y0, y1)) = app.layout.bounds();
    let pad_x = f64::from((x1 - x0).max(1.0)) * 0.1;
    let pad_y = f64::from((y1 - y0).max(1.0)) * 0.1;
    let status: Vec<bool> = app
        .observation()
        .map_or_else(|| vec![true; grid.n_line()], |o| o.line_status.clone());

    let canvas = Canvas::default()
        .block(
            Block::default()
                .title(format!(" {} ", grid.name()))
                .borders(Borders::ALL),
        )
        .marker(symbols::Marker::Braille)
        .x_bounds([f64::from(x0) - pad_x, f64::from(x1) + pad_x])
        .y_bounds([f64::from(y0) - pad_y, f64::from(y1) + pad_y])
        .paint(|ctx| {
            for line in 0..grid.n_line() {
                let (Some(a), Some(b)) = (
                    app.layout.position(grid.line_or_to_subid()[line]),
                    app.layout.position(grid.line_ex_to_subid()[line]),
                ) else {
                    continue;
                };
                let color = if status.get(line).copied().unwrap_or(true) {
                    style::LINE_ON
                } else {
                    style::LINE_OFF
                };
                ctx.draw(&Segment {
                    x1: f64::from(a.0),
                    y1: f64::from(a.1),
                    x2: f64::from(b.0),
                    y2: f64::from(b.1),
                    color,
                });
            }
            ctx.layer();
            for sub in 0..grid.n_sub() {
                if let Some((x, y)) = app.layout.position(sub) {
                    ctx.print(
                        f64::from(x),
                        f64::from(y),
                        Span::styled(sub.to_string(), Style::default().fg(style::SUB_COLOR)),
                    );
                }
            }
        });
    frame.render_widget(canvas, area);
}

/// Total load vs total generation over the replayed steps.
fn render_chart(frame: &mut Frame, app: &App, area: Rect) {
    let load_data: Vec<(f64, f64)> = app
        .history
        .iter()
        .map(|r| (r.step as f64, f64::from(r.load_mw)))
        .collect();
    let gen_data: Vec<(f64, f64)> = app
        .history
        .iter()
        .map(|r| (r.step as f64, f64::from(r.gen_mw)))
        .collect();

    let y_bounds = style::auto_bounds_y(&[load_data.as_slice(), gen_data.as_slice()]);
    let x_lo = load_data.first().map_or(0.0, |p| p.0);
    let x_hi = load_data.last().map_or(1.0, |p| p.0).max(x_lo + 1.0);

    let datasets = vec![
        Dataset::default()
            .name("Load")
            .marker(symbols::Marker::Braille)
            .style(Style::default().fg(style::LOAD_COLOR))
            .data(&load_data),
        Dataset::default()
            .name("Generation")
            .marker(symbols::Marker::Dot)
            .style(Style::default().fg(style::GEN_COLOR))
            .data(&gen_data),
    ];

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .title(" Load vs Generation ")
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title("step")
                .bounds([x_lo, x_hi])
                .labels(vec![format!("{}", x_lo as u32), format!("{}", x_hi as u32)]),
        )
        .y_axis(
            Axis::default()
                .title("MW")
                .bounds(y_bounds)
                .labels(vec![
                    format!("{:.1}", y_bounds[0]),
                    format!("{:.1}", y_bounds[1]),
                ]),
        );

    frame.render_widget(chart, area);
}

/// Last step flags and the first values of the selected quantity.
fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = match app.last_record() {
        Some(r) => vec![Line::from(Span::styled(
            format!(
                "  reward={:>7.3}  redispatch={:>6.2} MW  storage={:>6.2} MW  lines={}  \
                 ambiguous={} illegal={} game_over={}",
                r.reward,
                r.redispatch_mw,
                r.storage_mw,
                r.lines_connected,
                r.is_ambiguous,
                r.is_illegal,
                r.game_over,
            ),
            Style::default().fg(style::record_color(r)),
        ))],
        None => vec![Line::from("  Initial observation")],
    };
    if let Some(snapshot) = app.snapshot() {
        let shown = usize::from(area.height.saturating_sub(3));
        lines.extend(snapshot.to_string().lines().take(shown).map(|l| Line::from(format!("  {l}"))));
    }

    let block = Block::default().title(" Status ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Footer with keybinding hints.
fn render_footer(frame: &mut Frame, area: Rect) {
    let footer = Paragraph::new(Line::from(Span::styled(
        " q:Quit  Space:Pause  +/-:Speed  ←/→:Step  Tab:Quantity  r:Restart",
        Style::default().fg(style::FOOTER_FG),
    )));
    frame.render_widget(footer, area);
}
