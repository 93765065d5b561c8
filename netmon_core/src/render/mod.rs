mod dashboard;
mod runner;

pub use dashboard::{bar_length, colors, format_bytes, osi_layer, protocol_color, Dashboard, CLEAR_SCREEN};
pub use runner::DashboardRunner;
