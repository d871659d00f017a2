//! Prometheus metrics exporter for Shelly Gen2 devices.
//!
//! On every scrape the exporter calls the RPC API of each requested device,
//! renders the responses as Prometheus text lines, and appends statistics
//! about its own process.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Shelly devices │────>│    Exporter     │────>│   HTTP Server   │
//! │   (/rpc/...)    │     │ (fetch+render)  │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! shelly-exporter --default-targets 10.0.0.10,10.0.0.11
//! curl 'http://localhost:19991/metrics?target=10.0.0.10'
//! shelly-exporter --once --default-targets 10.0.0.10
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod process;
pub mod render;
pub mod scrape;

pub use client::ShellyClient;
pub use config::ExporterConfig;
pub use error::{DeviceError, TargetError};
pub use http::HttpServer;
pub use model::Target;
pub use scrape::{Exporter, ScrapeSummary};
