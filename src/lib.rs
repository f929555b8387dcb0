#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod data;
pub mod logging;
pub mod pane;
pub mod reddit;
pub mod refresh;
pub mod render;
pub mod session;
pub mod tree;
pub mod ui;
pub mod update;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
