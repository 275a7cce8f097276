mod labels;
mod model_service;
mod ort_service;
mod preprocessing;
mod routes;
mod server;
mod telemetry;

pub mod config;

pub use server::start_server;
