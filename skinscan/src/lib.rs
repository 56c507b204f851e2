pub mod analysis;
pub mod app;
pub mod cli;
pub mod config;
pub mod detection;
pub mod flows;
pub mod history;

pub use app::start_app;
