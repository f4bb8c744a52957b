//! Simulation harness.
//!
//! Drives an [`Engine`] against a [`Fabric`] with a generated workload and
//! checks every delivered beat against per-ID submission order. It provides:
//! 1. **Fabric:** Transport models that reorder completions across tags.
//! 2. **Workload:** A seeded stream of multi-beat requests.
//! 3. **Checker:** Per-ID order and beat framing verification.
//! 4. **Scenarios:** Short scripted replays with a readable trace.

pub mod checker;
pub mod fabric;
pub mod rng;
pub mod scenario;
pub mod workload;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::common::error::RemapError;
use crate::config::Config;
use crate::dispatch::Request;
use crate::engine::Engine;
use crate::reorder::Inbound;
use crate::stats::RemapStats;

pub use checker::{OrderChecker, Violation};
pub use fabric::{Fabric, InOrderFabric, ShuffleFabric, SimBeat, SimRequest};
pub use workload::Workload;

/// Result of a simulation run.
#[derive(Clone, Debug, Serialize)]
pub struct SimReport {
    /// Engine counters at the end of the run.
    pub stats: RemapStats,
    /// Transactions delivered in full.
    pub delivered: u64,
    /// Beats delivered.
    pub beats: u64,
    /// Turns executed.
    pub turns: u64,
    /// Ordering violations, rendered.
    pub violations: Vec<String>,
    /// Whether every transaction was delivered within the turn limit.
    pub completed: bool,
}

impl SimReport {
    /// Returns true if the run finished with no violations.
    pub fn is_clean(&self) -> bool {
        self.completed && self.violations.is_empty()
    }
}

/// Runs the engine against a fabric.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: Config,
}

impl Simulator {
    /// Creates a simulator for `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn new(config: Config) -> Result<Self, RemapError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration in use.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the configured workload to completion or until the turn limit.
    ///
    /// Each turn submits as many requests as the dispatch channels accept,
    /// forwards granted requests to the fabric, presents at most one
    /// completion, and hands a refused completion back to the fabric.
    ///
    /// # Errors
    ///
    /// Propagates fatal engine errors; ordering violations are reported in
    /// the returned [`SimReport`] instead.
    pub fn run<F: Fabric>(&self, fabric: &mut F) -> Result<SimReport, RemapError> {
        let mut engine: Engine<SimRequest, SimBeat> = Engine::new(&self.config)?;
        let mut workload = Workload::new(&self.config.sim);
        let mut checker = OrderChecker::new();
        let mut held: Option<Request<SimRequest>> = None;
        let mut completed = false;

        while engine.stats().turns < self.config.sim.max_turns {
            while let Some(request) = held.take().or_else(|| workload.next()) {
                let (id, body) = (request.id, request.payload);
                match engine.submit(request) {
                    Ok(_) => checker.expect(id, body),
                    Err(back) => {
                        held = Some(back);
                        break;
                    }
                }
            }

            let turn = engine.tick(fabric.poll())?;
            for release in &turn.releases {
                if !checker.observe(&release.response) {
                    warn!(tag = %release.tag, id = %release.response.id, "out-of-order delivery");
                }
            }
            if let Some(Inbound::Backpressured(refused)) = turn.inbound {
                debug!(reason = %refused.reason, "completion returned to fabric");
                fabric.retry(refused.item);
            }
            while let Some(outgoing) = engine.take_outgoing() {
                fabric.send(outgoing);
            }

            if held.is_none()
                && workload.is_exhausted()
                && engine.is_quiescent()
                && fabric.in_flight() == 0
            {
                completed = true;
                break;
            }
        }

        if !completed {
            warn!(
                turns = engine.stats().turns,
                outstanding = checker.outstanding(),
                "turn limit reached"
            );
        }
        info!(
            turns = engine.stats().turns,
            delivered = checker.transactions(),
            violations = checker.violations().len(),
            "simulation finished"
        );
        Ok(SimReport {
            stats: engine.stats().clone(),
            delivered: checker.transactions(),
            beats: checker.beats(),
            turns: engine.stats().turns,
            violations: checker.violations().iter().map(ToString::to_string).collect(),
            completed,
        })
    }
}
