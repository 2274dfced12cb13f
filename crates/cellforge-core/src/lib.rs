//! # cellforge-core
//!
//! Core coordination types and logic for an ephemeral-worker code
//! generation pipeline: port allocation, working-copy isolation, cell
//! process supervision, a file-lock registry, a task dependency graph
//! and scheduler, the anti-cheating verification gate pipeline, the
//! merge-queue kill-switch, and the workflow layer composing all of the
//! above into single-task and DAG runs.
//!
//! ## Error Handling
//!
//! Every fallible operation returns `Result<T, Error>`. Call sites use
//! the `?` operator for propagation; this crate does not panic on
//! ordinary failure paths.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

pub mod cellprocess;
pub mod config;
pub mod domain;
pub mod error;
pub mod gates;
pub mod learning;
pub mod lifecycle;
pub mod locks;
pub mod mergequeue;
pub mod orchestrator;
pub mod portpool;
pub mod recovery;
pub mod workerclient;
pub mod workflow;
pub mod workingcopy;

pub use config::Config;
pub use error::{Error, Result};
