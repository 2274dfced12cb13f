//! Core entity types (spec.md §3), kept free of I/O: every type here is
//! plain data, constructed and inspected by the component modules.

pub mod cell;
pub mod drift;
pub mod gate_result;
pub mod identifiers;
pub mod speculative_branch;
pub mod task_spec;

pub use cell::{BootstrapOutput, Cell};
pub use drift::DriftCheckpoint;
pub use gate_result::{AgentResult, GateResult, TestResult};
pub use identifiers::{BranchId, CellId, PortNumber, SessionId, TaskId, WorkingCopyId};
pub use speculative_branch::{BranchStatus, Change, SpeculativeBranch};
pub use task_spec::{AgentConfig, Priority, Requirement, TaskSpec};
