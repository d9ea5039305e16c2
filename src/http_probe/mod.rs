pub mod artifact;
pub mod builder;
pub mod dispatch;
pub mod probe;
pub mod result;
pub mod tls;
pub mod transport;

#[cfg(test)]
pub mod test_support;

pub mod prelude {
    pub use super::dispatch::{dispatch, dispatch_with};
    pub use super::probe::{ProbeContext, probe_target};
    pub use super::result::{ProbeFailure, ProbeOutcome, ProbeSuccess, StatusLine, TransportStage};
}

use std::fmt::Write;

/// Flatten an error and its sources into one line. Sources whose text is
/// already part of the message are skipped.
fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let text = src.to_string();
        if !s.contains(&text) {
            let _ = write!(s, ": {}", text);
        }
        err = src;
    }
    s
}
