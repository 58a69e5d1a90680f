pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod forecast;
pub mod ml;
pub mod telemetry;
pub mod worker;

pub use error::{ForecastError, ForecastResult};
