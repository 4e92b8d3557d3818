//! Color constants and auto-scaling helpers for the TUI.

use ratatui::style::Color;

use crate::sim::StepRecord;

pub const LOAD_COLOR: Color = Color::Cyan;
pub const GEN_COLOR: Color = Color::Yellow;
pub const LINE_ON: Color = Color::Gray;
pub const LINE_OFF: Color = Color::Red;
pub const SUB_COLOR: Color = Color::Green;
pub const HEADER_FG: Color = Color::White;
pub const HEADER_BG: Color = Color::DarkGray;
pub const FOOTER_FG: Color = Color::DarkGray;
/// Flags raised by the last step.
pub const ALERT: Color = Color::Magenta;

/// Color of the status line of a step: alert when the action was rejected
/// or the episode ended on a game over.
pub fn record_color(record: &StepRecord) -> Color {
    if record.game_over {
        LINE_OFF
    } else if record.is_ambiguous || record.is_illegal || record.is_dispatching_illegal {
        ALERT
    } else {
        HEADER_FG
    }
}

/// Computes Y-axis bounds from chart series with 10% padding.
pub fn auto_bounds_y(series: &[&[(f64, f64)]]) -> [f64; 2] {
    let all = series.iter().flat_map(|s| s.iter()).map(|&(_, y)| y);
    let min = all.clone().fold(f64::INFINITY, f64::min);
    let max = all.fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return [-1.0, 1.0];
    }
    let range = (max - min).max(0.1);
    let pad = range * 0.1;
    [min - pad, max + pad]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_pad_the_data() {
        let load = [(0.0, 100.0), (1.0, 200.0)];
        let gen_p = [(0.0, 150.0)];
        assert_eq!(auto_bounds_y(&[&load[..], &gen_p[..]]), [90.0, 210.0]);
        assert_eq!(auto_bounds_y(&[]), [-1.0, 1.0]);
    }
}
