//! Port Pool (spec.md §4.1): a bounded allocator over an integer range.
//!
//! All operations are serialized by a single mutex, following the
//! short-critical-section discipline `zjj-core`'s registries use
//! throughout `coordination/`.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::config::PortRange;
use crate::domain::PortNumber;

/// Errors specific to port allocation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PortPoolError {
    /// Every port in the configured range is currently allocated.
    #[error("port pool exhausted: no ports available in range")]
    Exhausted,
    /// `Release` was called on a port the pool never handed out.
    #[error("port {0} is not allocated")]
    NotAllocated(u16),
}

impl From<PortPoolError> for crate::Error {
    fn from(err: PortPoolError) -> Self {
        match err {
            PortPoolError::Exhausted => crate::Error::ResourceExhausted(err.to_string()),
            PortPoolError::NotAllocated(_) => crate::Error::NotFound(err.to_string()),
        }
    }
}

struct PortPoolState {
    range: PortRange,
    allocated: HashSet<u16>,
    cursor: u16,
}

/// A bounded, thread-safe allocator over `[range.min, range.max]`.
///
/// Allocation scans forward from a monotonically advancing cursor to
/// minimize reuse collisions; once the upper bound is passed the cursor
/// wraps back to `range.min`.
#[derive(Clone)]
pub struct PortPool {
    state: std::sync::Arc<Mutex<PortPoolState>>,
}

impl PortPool {
    /// Create a new pool covering `range`, with no ports allocated.
    #[must_use]
    pub fn new(range: PortRange) -> Self {
        Self {
            state: std::sync::Arc::new(Mutex::new(PortPoolState {
                cursor: range.min,
                range,
                allocated: HashSet::new(),
            })),
        }
    }

    /// Allocate and return the next free port, advancing the cursor.
    pub fn allocate(&self) -> Result<PortNumber, PortPoolError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let PortPoolState {
            range,
            allocated,
            cursor,
        } = &mut *state;

        let span = u32::from(range.max) - u32::from(range.min) + 1;
        for offset in 0..span {
            let candidate = range.min + ((u32::from(*cursor - range.min) + offset) % span) as u16;
            if !allocated.contains(&candidate) {
                allocated.insert(candidate);
                *cursor = if candidate == range.max {
                    range.min
                } else {
                    candidate + 1
                };
                return Ok(PortNumber(candidate));
            }
        }
        Err(PortPoolError::Exhausted)
    }

    /// Release a previously allocated port back to the pool.
    pub fn release(&self, port: PortNumber) -> Result<(), PortPoolError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.allocated.remove(&port.0) {
            Ok(())
        } else {
            Err(PortPoolError::NotAllocated(port.0))
        }
    }

    /// Whether `port` is currently allocated.
    #[must_use]
    pub fn is_allocated(&self, port: PortNumber) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.allocated.contains(&port.0)
    }

    /// Number of ports still free in the range.
    #[must_use]
    pub fn available_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let total = usize::from(state.range.max - state.range.min) + 1;
        total - state.allocated.len()
    }
}
