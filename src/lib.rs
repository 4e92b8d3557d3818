//! Power-grid environment for training and evaluating control agents.

/// Agent and environment actions on a grid.
pub mod action;
#[cfg(feature = "api")]
pub mod api;
pub mod chronics;
pub mod config;
pub mod grid;
pub mod io;
pub mod plot;
pub mod runner;
/// Environment, backend, redispatching, rewards and agents.
pub mod sim;
#[cfg(feature = "tui")]
pub mod tui;
