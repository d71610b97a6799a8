//! Background Jobs Module
//!
//! Jobs here are registered with the job scheduler service, or run once by the
//! binary. Each takes a `JobContext` and reports a `JobResult`.
//!
//! # Available Jobs
//!
//! - `batch_forecast_job` - Forecasts the next close for every ticker and
//!   replaces the prediction table
//!
//! A run is idempotent over the same inputs: it rewrites the whole table rather
//! than appending to it.

pub mod batch_forecast_job;
