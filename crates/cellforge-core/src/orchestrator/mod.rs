//! Task Graph Orchestrator (spec.md §4.6): builds a dependency graph over
//! admitted tasks and drives it to completion wave by wave.

pub mod graph;
pub mod metrics;
pub mod scheduler;

pub use graph::TaskGraph;
pub use metrics::OrchestratorMetrics;
pub use scheduler::{Scheduler, SchedulerCallbacks, TaskOutcome};
