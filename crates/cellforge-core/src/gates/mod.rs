//! Anti-Cheating Verification Gate Pipeline (spec.md §4.7): five gates
//! run in a mandated order for a single task, each exposing
//! `check(ctx) -> Result<GateResult>`.

pub mod g1_requirements;
pub mod g2_immutability;
pub mod g3_honesty;
pub mod g4_hardwork;
pub mod g5_drift;

use crate::domain::GateResult;
use crate::{Error, Result};

/// A single verification gate.
#[async_trait::async_trait]
pub trait Gate: Send + Sync {
    /// Gate name, used in error/report output.
    fn name(&self) -> &'static str;

    /// Run the gate, returning its result. An `Err` here means the gate
    /// itself malfunctioned (e.g. I/O failure); a failed check is a
    /// passing `Ok(GateResult)` with `passed == false`.
    async fn check(&self) -> Result<GateResult>;
}

/// Runs gates sequentially, stopping at (and returning) the first
/// failure.
pub async fn run_chain(gates: &[&(dyn Gate + Sync)]) -> Result<Vec<GateResult>> {
    let mut results = Vec::with_capacity(gates.len());
    for gate in gates {
        let result = gate.check().await?;
        let failed = !result.passed;
        let gate_name = gate.name();
        results.push(result);
        if failed {
            let failing = results.last().unwrap();
            return Err(Error::GateFailed {
                gate: gate_name,
                task_id: String::new(),
                message: failing.message.clone(),
            });
        }
    }
    Ok(results)
}

/// Runs every gate concurrently, returning every result (including
/// failures) rather than short-circuiting.
pub async fn run_parallel(gates: &[&(dyn Gate + Sync)]) -> Result<Vec<GateResult>> {
    let futures = gates.iter().map(|gate| gate.check());
    let results = futures::future::join_all(futures).await;
    results.into_iter().collect()
}
