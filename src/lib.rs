//! Probe one URL through a list of candidate addresses while presenting the
//! original hostname for TLS SNI and the `Host` header.

pub mod config;
pub mod http_probe;
pub mod output;
