//! Shared helpers for the hsesync benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
