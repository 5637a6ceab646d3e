//! The run controller: owns the phase state machine.
//!
//! STATE MACHINE (fixed, documented, never reordered):
//!   IDLE ─prepare→ PREPARING → PREPARED
//!   PREPARED ─start→ RUNNING_30 → PAUSE_30
//!   PAUSE_30 ─continue_to_next→ RUNNING_70 → PAUSE_70
//!   PAUSE_70 ─continue_to_next→ RUNNING_100 → COMPLETED
//!   COMPLETED ─prepare→ PREPARING → PREPARED
//!   any ─cleanup→ IDLE
//!
//! RULES:
//!   - Every transition takes `&mut self`; two phase advances can never
//!     be in flight at once.
//!   - A failed transition leaves the pre-transition phase in place
//!     (a failed prepare lands in IDLE).
//!   - Policy changes mid-run happen only in continue_to_next.
//!   - Event log writes are fire-and-forget and never fail a transition.
//!   - Surrounding surfaces learn about the run only through SimEvents.

use crate::{
    analyzer::{DecisionAnalyzer, PerformanceSample, Recommendation},
    config::SimConfig,
    error::{SimError, SimResult},
    event::{EventBus, EventLogEntry, SimEvent},
    generator::{purge_synthetic, GenerationReport, WorkloadGenerator},
    model::{Provenance, RequestStatus, ServicePoint},
    policy::SchedulingPolicy,
    processor::{self, AdvanceOutcome, ProgressiveProcessor},
    rng::{ComponentSlot, RngBank},
    store::{QueueStore, SimStore},
    types::{RunId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::mpsc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    #[serde(rename = "IDLE")]
    Idle,
    #[serde(rename = "PREPARING")]
    Preparing,
    #[serde(rename = "PREPARED")]
    Prepared,
    #[serde(rename = "RUNNING_30")]
    Running30,
    #[serde(rename = "PAUSE_30")]
    Pause30,
    #[serde(rename = "RUNNING_70")]
    Running70,
    #[serde(rename = "PAUSE_70")]
    Pause70,
    #[serde(rename = "RUNNING_100")]
    Running100,
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Preparing => "PREPARING",
            Self::Prepared => "PREPARED",
            Self::Running30 => "RUNNING_30",
            Self::Pause30 => "PAUSE_30",
            Self::Running70 => "RUNNING_70",
            Self::Pause70 => "PAUSE_70",
            Self::Running100 => "RUNNING_100",
            Self::Completed => "COMPLETED",
        }
    }

    /// True while a synthetic population exists in the store.
    pub fn is_simulation_mode(&self) -> bool {
        !matches!(self, Self::Idle | Self::Preparing)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of the run: 0→30, 30→70 or 70→100.
struct Checkpoint {
    label: &'static str,
    from_percent: u8,
    to_percent: u8,
    from: RunPhase,
    running: RunPhase,
    lands_on: RunPhase,
}

static CHECKPOINTS: [Checkpoint; 3] = [
    Checkpoint {
        label: "PHASE_1",
        from_percent: 0,
        to_percent: 30,
        from: RunPhase::Prepared,
        running: RunPhase::Running30,
        lands_on: RunPhase::Pause30,
    },
    Checkpoint {
        label: "PHASE_2",
        from_percent: 30,
        to_percent: 70,
        from: RunPhase::Pause30,
        running: RunPhase::Running70,
        lands_on: RunPhase::Pause70,
    },
    Checkpoint {
        label: "PHASE_3",
        from_percent: 70,
        to_percent: 100,
        from: RunPhase::Pause70,
        running: RunPhase::Running100,
        lands_on: RunPhase::Completed,
    },
];

/// Metrics recorded when a checkpoint is reached. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetric {
    pub phase: String,
    pub policy: SchedulingPolicy,
    pub avg_wait_minutes: f64,
    pub completed_count: usize,
    /// Requests completed during this phase.
    pub throughput: usize,
    pub recorded_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Option<RunId>,
    pub phase: RunPhase,
    /// Population size, frozen at generation time.
    pub total_requests: usize,
    pub processed_count: usize,
    pub completed_count: usize,
    pub policy: SchedulingPolicy,
    pub metrics: Vec<PhaseMetric>,
    pub recommendation: Option<Recommendation>,
}

impl RunState {
    fn idle(policy: SchedulingPolicy) -> Self {
        Self {
            run_id: None,
            phase: RunPhase::Idle,
            total_requests: 0,
            processed_count: 0,
            completed_count: 0,
            policy,
            metrics: Vec::new(),
            recommendation: None,
        }
    }
}

/// What one checkpoint produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseReport {
    pub metric: PhaseMetric,
    pub outcome: AdvanceOutcome,
    /// `None` once the run is COMPLETED.
    pub recommendation: Option<Recommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Option<RunId>,
    pub phase: RunPhase,
    pub total_requests: usize,
    pub processed_count: usize,
    pub completed_count: usize,
    pub metrics: Vec<PhaseMetric>,
    /// Phase whose metrics score highest under the analyzer's formula.
    pub best_phase: Option<String>,
    pub avg_turnaround_minutes: f64,
}

pub struct RunController<S: QueueStore> {
    config: SimConfig,
    store: S,
    rng_bank: RngBank,
    bus: EventBus,
    analyzer: DecisionAnalyzer,
    state: RunState,
}

impl<S: QueueStore> RunController<S> {
    pub fn new(config: SimConfig, store: S, seed: u64) -> Self {
        let analyzer = DecisionAnalyzer::new(config.analysis.clone());
        let state = RunState::idle(config.default_policy);
        Self {
            config,
            store,
            rng_bank: RngBank::new(seed),
            bus: EventBus::new(),
            analyzer,
            state,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn phase(&self) -> RunPhase {
        self.state.phase
    }

    pub fn metrics(&self) -> &[PhaseMetric] {
        &self.state.metrics
    }

    pub fn recommendation(&self) -> Option<&Recommendation> {
        self.state.recommendation.as_ref()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<SimEvent> {
        self.bus.subscribe()
    }

    /// Choose the policy for the first leg. Only before a run starts.
    pub fn select_initial_policy(&mut self, policy: SchedulingPolicy) -> SimResult<()> {
        match self.state.phase {
            RunPhase::Idle | RunPhase::Prepared | RunPhase::Completed => {
                self.state.policy = policy;
                Ok(())
            }
            phase => Err(SimError::InvalidTransition {
                operation: "select initial policy",
                phase,
            }),
        }
    }

    /// IDLE/COMPLETED → PREPARING → PREPARED. Replaces the synthetic
    /// population; on failure the controller is back in IDLE.
    pub fn prepare(&mut self) -> SimResult<GenerationReport> {
        let phase = self.state.phase;
        if !matches!(phase, RunPhase::Idle | RunPhase::Completed) {
            return Err(SimError::InvalidTransition {
                operation: "prepare",
                phase,
            });
        }
        let policy = self.state.policy;
        self.state = RunState::idle(policy);
        self.state.phase = RunPhase::Preparing;
        log::info!("prepare: generating synthetic population");

        let mut generator = WorkloadGenerator::new(
            self.config.workload.clone(),
            self.rng_bank.for_component(ComponentSlot::Generator),
        );
        let report = match generator.generate(&self.store) {
            Ok(report) => report,
            Err(e) => {
                log::warn!("prepare failed: {e}");
                self.state.phase = RunPhase::Idle;
                return Err(e);
            }
        };

        let run_id = format!("run-{}", uuid::Uuid::new_v4());
        if let Err(e) =
            self.store
                .insert_run(&run_id, self.rng_bank.master_seed(), env!("CARGO_PKG_VERSION"))
        {
            self.state.phase = RunPhase::Idle;
            return Err(e);
        }

        self.state.run_id = Some(run_id.clone());
        self.state.total_requests = report.total;
        self.state.phase = RunPhase::Prepared;
        log::info!("prepare: {run_id} ready with {} requests", report.total);

        self.emit(0, SimEvent::SimulationModeChanged { active: true });
        self.emit(
            0,
            SimEvent::RunPrepared {
                run_id,
                seed: self.rng_bank.master_seed(),
                total_requests: report.total,
            },
        );
        Ok(report)
    }

    /// PREPARED → RUNNING_30 → PAUSE_30.
    pub fn start(&mut self) -> SimResult<PhaseReport> {
        if self.state.phase != RunPhase::Prepared {
            return Err(SimError::InvalidTransition {
                operation: "start",
                phase: self.state.phase,
            });
        }
        self.run_checkpoint(0, self.state.policy)
    }

    /// PAUSE_30 → RUNNING_70 → PAUSE_70, or PAUSE_70 → RUNNING_100 → COMPLETED.
    /// `new_policy`, when given, applies from this leg on.
    pub fn continue_to_next(
        &mut self,
        new_policy: Option<SchedulingPolicy>,
    ) -> SimResult<PhaseReport> {
        let index = match self.state.phase {
            RunPhase::Pause30 => 1,
            RunPhase::Pause70 => 2,
            phase => {
                return Err(SimError::InvalidTransition {
                    operation: "continue",
                    phase,
                })
            }
        };
        let policy = new_policy.unwrap_or(self.state.policy);
        self.run_checkpoint(index, policy)
    }

    /// Any phase → IDLE. Deletes every synthetic request and forgets the
    /// run's metrics. On a store failure the phase is left unchanged.
    pub fn cleanup(&mut self) -> SimResult<usize> {
        let deleted = purge_synthetic(&self.store)?;
        let run_id = self.state.run_id.clone();
        log::info!("cleanup: deleted {deleted} synthetic requests");

        self.emit(
            0,
            SimEvent::RunReset {
                run_id,
                deleted_requests: deleted,
            },
        );
        self.emit(0, SimEvent::SimulationModeChanged { active: false });
        self.state = RunState::idle(self.state.policy);
        Ok(deleted)
    }

    pub fn summary(&self) -> SimResult<RunSummary> {
        let best_phase = self
            .state
            .metrics
            .iter()
            .max_by(|a, b| {
                crate::analyzer::score(a.avg_wait_minutes, a.throughput as f64)
                    .total_cmp(&crate::analyzer::score(b.avg_wait_minutes, b.throughput as f64))
            })
            .map(|m| m.phase.clone());

        let completed = self
            .store
            .select_requests(Provenance::Synthetic, Some(RequestStatus::Completed))?;
        let turnarounds: Vec<f64> = completed
            .iter()
            .filter_map(processor::turnaround_minutes)
            .collect();
        let avg_turnaround_minutes = if turnarounds.is_empty() {
            0.0
        } else {
            turnarounds.iter().sum::<f64>() / turnarounds.len() as f64
        };

        Ok(RunSummary {
            run_id: self.state.run_id.clone(),
            phase: self.state.phase,
            total_requests: self.state.total_requests,
            processed_count: self.state.processed_count,
            completed_count: self.state.completed_count,
            metrics: self.state.metrics.clone(),
            best_phase,
            avg_turnaround_minutes,
        })
    }

    fn run_checkpoint(&mut self, index: usize, policy: SchedulingPolicy) -> SimResult<PhaseReport> {
        let cp = &CHECKPOINTS[index];
        debug_assert_eq!(self.state.phase, cp.from);
        let previous_policy = self.state.policy;

        self.state.phase = cp.running;
        log::info!("{}: {}%→{}% under {policy}", cp.label, cp.from_percent, cp.to_percent);

        match self.advance_checkpoint(index, cp, policy) {
            Ok(report) => {
                if policy != previous_policy {
                    self.emit_for_run(
                        index as u64 + 1,
                        |run_id| SimEvent::PolicySwitched {
                            run_id,
                            from: previous_policy,
                            to: policy,
                        },
                    );
                }
                Ok(report)
            }
            Err(e) => {
                log::warn!("{} failed, staying in {}: {e}", cp.label, cp.from);
                self.state.phase = cp.from;
                self.state.policy = previous_policy;
                Err(e)
            }
        }
    }

    fn advance_checkpoint(
        &mut self,
        index: usize,
        cp: &Checkpoint,
        policy: SchedulingPolicy,
    ) -> SimResult<PhaseReport> {
        let step = index as u64 + 1;
        let processor = ProgressiveProcessor::new(
            self.config.processing.clone(),
            self.state.total_requests,
        )
        .with_service_point(self.target_service_point()?);
        let mut rng = self
            .rng_bank
            .for_component_at_step(ComponentSlot::Processor, step);
        let outcome =
            processor.advance(&self.store, cp.to_percent, cp.from_percent, policy, &mut rng)?;

        let recommendation = if cp.lands_on == RunPhase::Completed {
            None
        } else {
            let waiting = self
                .store
                .select_requests(Provenance::Synthetic, Some(RequestStatus::Waiting))?;
            let snapshot = self.analyzer.snapshot(&waiting);
            Some(self.analyzer.recommend(
                policy,
                PerformanceSample::from(&outcome.metrics),
                &snapshot,
            ))
        };

        let metric = PhaseMetric {
            phase: cp.label.to_string(),
            policy,
            avg_wait_minutes: outcome.metrics.avg_wait_minutes,
            completed_count: outcome.metrics.completed_count,
            throughput: outcome.metrics.throughput,
            recorded_at: chrono::Utc::now().naive_utc(),
        };

        self.state.policy = policy;
        self.state.processed_count = outcome.processed_count;
        self.state.completed_count = outcome.completed_count;
        self.state.metrics.push(metric.clone());
        self.state.recommendation = recommendation.clone();
        self.state.phase = cp.lands_on;

        self.emit_for_run(step, |run_id| SimEvent::PhaseCompleted {
            run_id,
            phase: metric.phase.clone(),
            policy,
            processed_count: outcome.processed_count,
            completed_count: outcome.completed_count,
            avg_wait_minutes: metric.avg_wait_minutes,
        });
        match &recommendation {
            Some(rec) => self.emit_for_run(step, |run_id| SimEvent::RecommendationIssued {
                run_id,
                current: rec.current_policy,
                recommended: rec.recommended_policy,
                confidence: rec.confidence,
            }),
            None => self.emit_for_run(step, |run_id| SimEvent::RunCompleted {
                run_id,
                processed_count: outcome.processed_count,
                completed_count: outcome.completed_count,
            }),
        }

        Ok(PhaseReport {
            metric,
            outcome,
            recommendation,
        })
    }

    /// Resolve `processing.target_service_point` against reference data.
    fn target_service_point(&self) -> SimResult<Option<ServicePoint>> {
        let Some(id) = &self.config.processing.target_service_point else {
            return Ok(None);
        };
        self.store
            .service_points()?
            .into_iter()
            .find(|sp| &sp.id == id)
            .map(Some)
            .ok_or_else(|| SimError::Validation(format!("unknown target service point {id}")))
    }

    fn emit_for_run(&self, step: u64, build: impl FnOnce(RunId) -> SimEvent) {
        match self.state.run_id.clone() {
            Some(run_id) => self.emit(step, build(run_id)),
            None => log::warn!("event at step {step} dropped: no run is prepared"),
        }
    }

    /// Publish to subscribers and append to the run's event log.
    /// Fire-and-forget: a failed log write is reported, never propagated,
    /// so it cannot split a transition that has already landed.
    fn emit(&self, step: u64, event: SimEvent) {
        self.bus.publish(&event);
        let Some(run_id) = &self.state.run_id else {
            return;
        };
        let entry = serde_json::to_string(&event).map(|payload| EventLogEntry {
            id: None,
            run_id: run_id.clone(),
            step,
            source: "controller".to_string(),
            event_type: event.type_name().to_string(),
            payload,
        });
        let written = match entry {
            Ok(entry) => self.store.append_event(&entry),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = written {
            log::warn!("event log write for {} failed: {e}", event.type_name());
        }
    }
}

impl RunController<SimStore> {
    /// Controller over a migrated in-memory store seeded from `config`.
    pub fn build_test_with(config: SimConfig, seed: u64) -> SimResult<Self> {
        let store = SimStore::in_memory()?;
        store.migrate()?;
        store.seed_reference_data(&config)?;
        Ok(Self::new(config, store, seed))
    }

    /// Same as `build_test_with(SimConfig::default_test(), seed)`.
    pub fn build_test(seed: u64) -> SimResult<Self> {
        Self::build_test_with(SimConfig::default_test(), seed)
    }
}
