pub mod client_wizard;
pub mod clients;
pub mod context_menu;

use std::time::Duration;

use tui::layout::{Constraint, Direction, Layout, Rect};
use tui::style::Color;

use crate::models::Category;

/// How long input handlers wait for a key before yielding to the app loop
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How many years ahead the year pickers offer
const YEARS_AHEAD: i32 = 5;

/// The current year and the following ones, plus `selected` if it falls outside
pub fn year_options(current: i32, selected: i32) -> Vec<i32> {
    let mut years: Vec<i32> = (current..current + YEARS_AHEAD).collect();
    if !years.contains(&selected) {
        years.push(selected);
        years.sort_unstable();
    }
    years
}

/// Year after `year` in `options`, wrapping around
pub fn cycle_year(options: &[i32], year: i32, forward: bool) -> i32 {
    let Some(position) = options.iter().position(|&option| option == year) else {
        return options.first().copied().unwrap_or(year);
    };

    let next = if forward {
        (position + 1) % options.len()
    } else {
        (position + options.len() - 1) % options.len()
    };
    options[next]
}

pub fn category_color(category: Category) -> Color {
    match category {
        Category::Deposit => Color::Yellow,
        Category::Building => Color::Green,
        Category::Completed => Color::Blue,
    }
}

// Helper function to create a centered rect
pub fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
