//! Workflow Engine Integration (spec.md §4.9): the single-task workflow,
//! the round-based DAG workflow and its enhanced six-gate saga variant,
//! and the Test & Review Slices (§4.11) they compose.

pub mod dag;
pub mod single_task;
pub mod slices;

pub use dag::{
    run_dag, run_enhanced_task, DagInput, DagResult, EnhancedOutcome, EnhancedStage,
    EnhancedTaskPipeline,
};
pub use single_task::{
    SingleTaskConfig, SingleTaskOutcome, SingleTaskWorkflow, TaskExecutor, HEARTBEAT_TIMEOUT,
    IMPLEMENTATION_TIMEOUT, LIGHT_TIMEOUT,
};
