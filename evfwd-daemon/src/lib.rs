//! evfwd daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `evfwd-daemon` is used as a binary (main.rs).

pub mod cli;
pub mod logging;
pub mod runner;
pub mod source;
