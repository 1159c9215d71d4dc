//! Patchgate command line
//!
//! Thin plumbing around [`patchgate_core`]: load settings, wire the external
//! agents and sinks, run one command, map the outcome to an exit status.

#![allow(missing_docs)]

pub mod cli;
pub mod commands;
pub mod deploy;
pub mod logging;
pub mod wiring;
