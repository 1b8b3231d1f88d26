//! Minimal client for the InfluxDB 1.x HTTP query API.
//!
//! Only what a backup needs: run a metadata query, and stream the raw body
//! of a data query into a file.

pub mod client;
pub mod query;
pub mod response;

pub use client::InfluxClient;
pub use query::{select_since, SHOW_MEASUREMENTS};
pub use response::{QueryResponse, QueryResult, Series};
