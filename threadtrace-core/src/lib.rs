pub mod config;
pub mod error;
pub mod http_client;
pub mod model;
pub mod profile;
pub mod provider;
pub mod providers;
pub mod session;
pub mod telemetry;
pub mod ticket;
