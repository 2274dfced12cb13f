//! `Cell` and the serializable `BootstrapOutput` handed between activities.

use super::identifiers::{CellId, PortNumber, WorkingCopyId};

/// An isolated, single-task worker process + working-copy + port triple.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Identifies this cell for its lifetime.
    pub id: CellId,
    /// The port the worker process is bound to.
    pub port: PortNumber,
    /// The working-copy backing this cell.
    pub working_copy_id: WorkingCopyId,
    /// Filesystem path of the working copy.
    pub working_copy_path: std::path::PathBuf,
    /// OS process ID of the spawned worker.
    pub pid: u32,
    /// Base URL of the worker's HTTP interface.
    pub base_url: String,
}

impl Cell {
    /// Derive a `WorkingCopyId` from a `CellId` deterministically, so the
    /// lifecycle coordinator never has to invent or store a second ID.
    #[must_use]
    pub fn derive_working_copy_id(cell_id: &CellId) -> WorkingCopyId {
        WorkingCopyId::new(format!("wc-{cell_id}"))
    }
}

/// Serializable handle usable by later workflow activities that must
/// re-derive a typed worker client without holding process references.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BootstrapOutput {
    /// The bootstrapped cell's ID.
    pub cell_id: CellId,
    /// The working-copy ID.
    pub working_copy_id: WorkingCopyId,
    /// The working-copy filesystem path.
    pub working_copy_path: std::path::PathBuf,
    /// The allocated port.
    pub port: u16,
    /// The worker's base URL.
    pub base_url: String,
    /// The worker process ID.
    pub pid: u32,
}

impl From<&Cell> for BootstrapOutput {
    fn from(cell: &Cell) -> Self {
        Self {
            cell_id: cell.id.clone(),
            working_copy_id: cell.working_copy_id.clone(),
            working_copy_path: cell.working_copy_path.clone(),
            port: cell.port.0,
            base_url: cell.base_url.clone(),
            pid: cell.pid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_stable_working_copy_id() {
        let cell_id = CellId::new("cell-7");
        assert_eq!(
            Cell::derive_working_copy_id(&cell_id),
            WorkingCopyId::new("wc-cell-7")
        );
    }

    #[test]
    fn bootstrap_output_carries_no_process_handle() {
        let cell = Cell {
            id: CellId::new("cell-1"),
            port: PortNumber(9001),
            working_copy_id: WorkingCopyId::new("wc-cell-1"),
            working_copy_path: "/tmp/wc-cell-1".into(),
            pid: 4242,
            base_url: "http://127.0.0.1:9001".into(),
        };
        let out = BootstrapOutput::from(&cell);
        assert_eq!(out.port, 9001);
        assert_eq!(out.pid, 4242);
        let serialized = serde_json::to_string(&out).expect("serializes");
        assert!(serialized.contains("9001"));
    }
}
