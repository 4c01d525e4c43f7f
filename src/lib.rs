//! Tidepool is a short-horizon metrics collector. It accepts OpenTelemetry
//! metrics over OTLP/HTTP JSON, keeps them in memory as fixed-width buckets
//! for a bounded retention window and answers range queries over them with
//! per-window aggregation and histogram quantile estimates.
//!
//! Why you might choose to use tidepool:
//!
//!  * You want to look at the last few minutes of a cluster's metrics without
//!    standing up a time series database.
//!  * You need latency quantiles merged from OTLP explicit-bucket histograms.
//!  * You want the whole thing in memory and gone on restart.
//!
//! The store is usable as a library without the HTTP surface; see `store`
//! and `query`.
#![allow(unknown_lints)]
#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]
#![warn(missing_docs)]
extern crate chrono;
extern crate clap;
#[macro_use]
extern crate serde_json;
extern crate tiny_http;
extern crate toml;
extern crate url;

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
extern crate tempdir;

pub mod api;
pub mod buckets;
pub mod config;
pub mod http;
pub mod metric;
pub mod protocols;
pub mod query;
pub mod store;
pub mod thread;
pub mod time;
