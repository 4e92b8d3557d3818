//! Keyboard input handling for the TUI.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::runtime::App;

/// Maps a key event to an application action.
///
/// Guards on [`KeyEventKind::Press`] to avoid double-fire on some terminals.
pub fn handle_key(app: &mut App, key: KeyEvent) {
    if key.kind != KeyEventKind::Press {
        return;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit = true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => app.quit = true,
        KeyCode::Char(' ') => app.toggle_pause(),
        KeyCode::Char('+' | '=') | KeyCode::Up => app.speed_up(),
        KeyCode::Char('-') | KeyCode::Down => app.speed_down(),
        KeyCode::Right => app.step_forward(),
        KeyCode::Left => app.step_back(),
        KeyCode::Tab | KeyCode::Char('v') => app.next_quantity(),
        KeyCode::Char('r') => app.restart(),
        _ => {}
    }
}
