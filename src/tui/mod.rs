//! Terminal replay of a logged episode.
//!
//! Feature-gated behind `tui`. Launch with `--tui <episode dir>` on the CLI.

mod controls;
mod layout;
/// Replay cursor and application state.
pub mod runtime;
mod style;

use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::io::EpisodeData;
use runtime::App;

/// Replays an episode until the user quits.
///
/// Sets up the terminal (raw mode, alternate screen), runs the event loop,
/// and restores the terminal on exit.
pub fn run(data: EpisodeData) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen) {
        let _ = disable_raw_mode();
        return Err(e);
    }
    let mut terminal = match Terminal::new(CrosstermBackend::new(stdout)) {
        Ok(t) => t,
        Err(e) => {
            let _ = disable_raw_mode();
            return Err(e);
        }
    };

    let mut app = App::new(data);
    let result = event_loop(&mut terminal, &mut app);

    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
    result
}

/// Core event loop: poll input, advance the replay, draw.
fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|frame| layout::render(frame, app))?;

        if app.quit {
            return Ok(());
        }

        let timeout = Duration::from_millis(app.tick_interval_ms());
        let deadline = app.last_tick + timeout;
        let poll_timeout = deadline.saturating_duration_since(Instant::now());

        if event::poll(poll_timeout)? {
            if let Event::Key(key) = event::read()? {
                controls::handle_key(app, key);
            }
        }

        if app.last_tick.elapsed() >= timeout && !app.paused && !app.is_finished() {
            app.tick();
            app.last_tick = Instant::now();
        }
    }
}
