//! HTTP surface of the shutter image-access router.

pub mod app;
pub mod bootstrap;
pub mod cli;
pub mod error;
pub mod handlers;
pub mod render;
pub mod state;

pub use app::App;
pub use cli::Cli;
pub use error::StartupError;
pub use state::AppState;
