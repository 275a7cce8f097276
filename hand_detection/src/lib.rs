mod cv_utils;
mod model_service;
mod ort_service;
mod routes;
mod server;
mod telemetry;

pub mod config;

pub use server::start_server;
