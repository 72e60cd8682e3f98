//! Timestamp helpers.
//!
//! Rendering needs unix timestamps shown as local wall-clock time, parsing
//! needs to accept the several timestamp shapes found in page markup, and
//! events carry ISO 8601 stamps.

pub mod timestamps;

pub use timestamps::{
    format_local_time, format_time_in, iso_timestamp, parse_timestamp, Timestamp,
    TimestampError, UnixPrecision, LOCAL_TIME_FORMAT,
};
