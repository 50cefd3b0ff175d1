//! Place-and-route timing summary parser.
//!
//! # Grammar
//!
//! The parser scans the report line by line for this fragment (anywhere on
//! the line, so log prefixes such as `Info: ` are ignored):
//!
//! ```text
//! Max frequency for clock '<clock>': <decimal> <unit> [(PASS|FAIL at <decimal> <unit>)]
//! ```
//!
//! `<unit>` is one of `Hz`, `kHz`, `MHz`, `GHz` (case-insensitive).
//!
//! # Selection policy
//!
//! The tool prints an estimate for each clock after placement and again after
//! routing, so the *last* line for a given clock is its achieved frequency.
//! When several clock domains are present the reported design frequency is
//! the *minimum* across domains: the slowest domain bounds the design.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::units::{parse_frequency, unit_exponent};

static MAX_FREQUENCY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Max frequency for clock\s+'(?P<clock>[^']*)':\s*(?P<value>[0-9]*\.?[0-9]+)\s*(?P<unit>[A-Za-z]+)(?:\s*\((?P<verdict>PASS|FAIL)\s+at\s+(?P<target>[0-9]*\.?[0-9]+)\s*(?P<target_unit>[A-Za-z]+)\))?",
    )
    .expect("max frequency regex is valid")
});

/// Achieved frequency for one clock domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockFrequency {
    /// Clock net name as printed by the tool.
    pub clock: String,
    /// Achieved maximum frequency in Hz.
    pub achieved_hz: u64,
    /// Constraint the tool checked against, if printed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint_hz: Option<u64>,
    /// Whether the tool reported the constraint as met.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

/// Parsed timing summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    /// Final value per clock, in order of first appearance.
    pub clocks: Vec<ClockFrequency>,
    /// Minimum achieved frequency across `clocks`.
    pub max_frequency_hz: u64,
}

/// The report did not yield a usable frequency.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseFailure {
    /// No line matched the grammar. Carries the full report text.
    #[error("no 'Max frequency for clock' line found in place-and-route report")]
    NoFrequencyFound {
        /// Complete text that was scanned.
        report: String,
    },

    /// A matching line held a value that does not convert to Hz.
    #[error("invalid frequency value '{value}' on line {line}")]
    InvalidNumber {
        /// 1-based line number.
        line: usize,
        /// The offending literal.
        value: String,
    },

    /// A matching line used a unit the parser does not know.
    #[error("unknown frequency unit '{unit}' on line {line}")]
    UnknownUnit {
        /// 1-based line number.
        line: usize,
        /// The offending unit.
        unit: String,
    },
}

impl ParseFailure {
    /// The scanned report, when the failure carries it.
    pub fn report_text(&self) -> Option<&str> {
        match self {
            Self::NoFrequencyFound { report } => Some(report),
            _ => None,
        }
    }
}

/// Extract the achieved maximum frequency from a timing report.
pub fn parse(report: &str) -> Result<TimingReport, ParseFailure> {
    let mut clocks: Vec<ClockFrequency> = Vec::new();

    for (idx, line) in report.lines().enumerate() {
        let Some(caps) = MAX_FREQUENCY_LINE.captures(line) else {
            continue;
        };
        let line_no = idx + 1;

        let achieved_hz = convert(line_no, &caps["value"], &caps["unit"])?;
        let constraint_hz = match (caps.name("target"), caps.name("target_unit")) {
            (Some(v), Some(u)) => Some(convert(line_no, v.as_str(), u.as_str())?),
            _ => None,
        };
        let passed = caps.name("verdict").map(|v| v.as_str() == "PASS");

        let entry = ClockFrequency {
            clock: caps["clock"].to_string(),
            achieved_hz,
            constraint_hz,
            passed,
        };

        match clocks.iter_mut().find(|c| c.clock == entry.clock) {
            Some(existing) => *existing = entry,
            None => clocks.push(entry),
        }
    }

    let max_frequency_hz = clocks
        .iter()
        .map(|c| c.achieved_hz)
        .min()
        .ok_or_else(|| ParseFailure::NoFrequencyFound {
            report: report.to_string(),
        })?;

    Ok(TimingReport {
        clocks,
        max_frequency_hz,
    })
}

fn convert(line: usize, value: &str, unit: &str) -> Result<u64, ParseFailure> {
    if unit_exponent(unit).is_none() {
        return Err(ParseFailure::UnknownUnit {
            line,
            unit: unit.to_string(),
        });
    }
    parse_frequency(value, unit).ok_or_else(|| ParseFailure::InvalidNumber {
        line,
        value: value.to_string(),
    })
}
