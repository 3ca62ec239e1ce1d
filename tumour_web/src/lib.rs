mod page;
mod routes;
mod telemetry;

pub mod app;
pub mod config;
pub mod server;

pub use app::start_app;
