use std::fmt::Display;
use std::io::{self, Write};
use std::path::Path;

use unicode_truncate::UnicodeTruncateStr;

use crate::config::probe_config::{ProbeConfig, ProbeTarget};
use crate::http_probe::builder::Identity;
use crate::http_probe::prelude::*;

const SEPARATOR: &str = "----------------------------------";

fn to_fixed_width(input: &str, width: usize) -> String {
    let (truncated, _) = input.unicode_truncate(width);
    format!("{:<width$}", truncated, width = width)
}

/// Console rendering of a run, one line per outcome in arrival order.
pub struct Report<W: Write> {
    out: W,
    width: usize,
    succeeded: usize,
    failed: usize,
}

impl<W: Write> Report<W> {
    pub fn new(out: W, config: &ProbeConfig, targets: &[ProbeTarget]) -> Self {
        let baseline_width = if targets.iter().any(ProbeTarget::is_baseline) {
            Identity::parse(&config.base_url)
                .map(|identity| identity.authority.len())
                .unwrap_or(0)
        } else {
            0
        };
        let width = targets
            .iter()
            .map(|target| target.ip.len())
            .max()
            .unwrap_or(0)
            .max(baseline_width);

        Self {
            out,
            width,
            succeeded: 0,
            failed: 0,
        }
    }

    pub fn banner(&mut self, base_url: &str, candidates: usize, started: impl Display) -> io::Result<()> {
        writeln!(
            self.out,
            "Probing {base_url} through {candidates} candidate(s), started {started}"
        )?;
        writeln!(self.out, "{SEPARATOR}")
    }

    pub fn outcome(&mut self, outcome: &ProbeOutcome) -> io::Result<()> {
        let address = to_fixed_width(outcome.display_address(), self.width);
        match &outcome.result {
            Ok(success) => {
                self.succeeded += 1;
                writeln!(
                    self.out,
                    "[{address}] ✅ Status: {}, Elapsed: {:.2}s",
                    success.status,
                    success.elapsed.as_secs_f64()
                )
            }
            Err(failure) => {
                self.failed += 1;
                writeln!(self.out, "[{address}] ❌ Probe error: {failure}")
            }
        }
    }

    /// Totals, plus where the artifacts went when capture was on.
    pub fn finish(&mut self, artifacts: Option<&Path>) -> io::Result<()> {
        writeln!(self.out, "{SEPARATOR}")?;
        writeln!(self.out, "{} succeeded, {} failed", self.succeeded, self.failed)?;
        if let Some(dir) = artifacts {
            writeln!(self.out, "Raw headers and bodies are in {}", dir.display())?;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
