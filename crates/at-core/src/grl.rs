//! Good-run list: per-run tables of good luminosity-block intervals.
//!
//! Text format, one entry per line:
//!
//! ```text
//! 276262
//! 76,130
//! 133,185
//! 276329
//! 1,42
//! ```
//!
//! A bare integer opens a run; each following `start,end` line adds an
//! inclusive interval of luminosity blocks to that run.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::range::Range;

/// Good-run list.
#[derive(Debug, Clone, Default)]
pub struct Grl {
    good_runs: BTreeMap<i64, Vec<Range>>,
}

impl Grl {
    /// Parse the text format described in the module docs.
    pub fn parse(text: &str) -> Result<Self> {
        let mut good_runs: BTreeMap<i64, Vec<Range>> = BTreeMap::new();
        let mut run: Option<i64> = None;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once(',') {
                None => {
                    let r = parse_int(line, lineno)?;
                    if r <= 0 {
                        return Err(Error::Validation(format!(
                            "GRL line {}: run number must be positive, got {r}",
                            lineno + 1
                        )));
                    }
                    good_runs.entry(r).or_default();
                    run = Some(r);
                }
                Some((start, end)) => {
                    let Some(r) = run else {
                        return Err(Error::Validation(format!(
                            "GRL line {}: interval before any run number",
                            lineno + 1
                        )));
                    };
                    let start = parse_int(start.trim(), lineno)? as f64;
                    let end = parse_int(end.trim(), lineno)? as f64;
                    good_runs.entry(r).or_default().push(Range::new(start, end)?);
                }
            }
        }

        Ok(Self { good_runs })
    }

    /// Read and parse a GRL file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let grl = Self::parse(&text)?;
        log::debug!("loaded {} good runs from {}", grl.n_runs(), path.display());
        Ok(grl)
    }

    /// Whether luminosity block `lumi_block` of `run` is good.
    ///
    /// Negative runs (simulation) and unknown runs are never good.
    pub fn contains(&self, run: i64, lumi_block: i64) -> bool {
        if run < 0 {
            return false;
        }
        self.good_runs
            .get(&run)
            .is_some_and(|ranges| ranges.iter().any(|r| r.contains(lumi_block as f64)))
    }

    /// Number of runs listed.
    pub fn n_runs(&self) -> usize {
        self.good_runs.len()
    }
}

fn parse_int(s: &str, lineno: usize) -> Result<i64> {
    s.parse::<i64>().map_err(|_| {
        Error::Validation(format!("GRL line {}: expected an integer, got '{s}'", lineno + 1))
    })
}
