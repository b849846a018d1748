//! EcoCode - estimates the environmental footprint of application requests.
//!
//! # Overview
//!
//! Instrumented applications submit per-request resource-usage samples (CPU,
//! memory, duration, request count). Each sample is converted into an
//! estimated energy use and CO2 emission, classified into a carbon score from
//! `A` (best) to `E` (worst), and persisted for filtered, paginated retrieval
//! and aggregate reporting.
//!
//! The footprint formula is a fixed, documented heuristic. It is useful for
//! comparing endpoints against each other, not as a certified carbon figure.
//!
//! # Modules
//!
//! - [`model`]: Samples, records, projections and report types
//! - [`impact`]: The impact calculator and its tunable factors
//! - [`storage`]: SQLite storage layer
//! - [`report`]: Aggregate report composition
//! - [`store`]: The metric store, the single entry point for reads and writes
//! - [`error`]: Error taxonomy
//! - [`config`]: Environment-driven settings
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod config;
pub mod error;
pub mod impact;
pub mod model;
pub mod report;
pub mod storage;
pub mod store;
