//! The input protocols that tidepool must parse.

pub mod otlp;
