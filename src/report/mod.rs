//! Timing report extraction.
//!
//! Turns the unstructured text printed by the place-and-route stage into a
//! [`TimingReport`]. A report without a recognizable frequency line is a
//! [`ParseFailure`], never a panic.

mod parser;
pub mod units;

pub use parser::{parse, ClockFrequency, ParseFailure, TimingReport};
