//! Factory engine
//!
//! Main simulation loop integrating all components:
//! - Three identical production lines on one shared clock
//! - Deterministic order generation and fault injection
//! - Agent command ingress (per-line queues, drained at tick start)
//! - KPI aggregation across every transition
//! - Debounced status publishing through the bus seam
//!
//! # Tick loop
//!
//! ```text
//! For each tick t:
//! 1. Drain each line's command queue
//! 2. Run each line (orders → faults → stations → conveyors →
//!    quality → AGVs → usage reporting)
//! 3. Publish responses, order events and alerts
//! 4. Advance time
//! 5. Flush debounced device snapshots and the periodic KPI snapshot
//! ```
//!
//! # Determinism
//!
//! All randomness flows through one seeded xorshift64* RNG and the
//! phase order is fixed, so the same seed, config and command trace
//! reproduce the identical run.

use crate::core::time::SimClock;
use crate::faults::{FaultConfig, FaultInjector};
use crate::kpi::{KpiCalculator, KpiSnapshot, ScoreBreakdown};
use crate::layout::KPI_PUBLISH_SECONDS;
use crate::line::ProductionLine;
use crate::models::{EventLog, FactoryEvent};
use crate::orders::{OrderGenerator, OrderGeneratorConfig};
use crate::publisher::{
    AgvSnapshot, BusPublisher, ConveyorSnapshot, NoopPublisher, StationSnapshot, StatusDebouncer,
    TopicRoot, WarehouseSnapshot,
};
use crate::rng::RngManager;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

// ============================================================================
// Configuration
// ============================================================================

/// Complete engine configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FactoryConfig {
    /// Seconds the clock advances per tick
    pub tick_seconds: f64,
    /// Simulation horizon in seconds
    pub duration_seconds: f64,
    /// RNG seed for deterministic simulation
    pub rng_seed: u64,
    /// Number of identical lines (named line1..lineN)
    pub num_lines: usize,
    /// Order generation parameters (shared by all lines)
    pub order_config: OrderGeneratorConfig,
    /// Fault injection parameters (shared by all lines)
    pub fault_config: FaultConfig,
    /// Topic prefix; None resolves from the environment
    pub topic_root: Option<String>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1.0,
            duration_seconds: 3600.0,
            rng_seed: 42,
            num_lines: 3,
            order_config: OrderGeneratorConfig::default(),
            fault_config: FaultConfig::default(),
            topic_root: None,
        }
    }
}

/// Result of a single tick
#[derive(Debug, Clone, Default)]
pub struct TickResult {
    /// Simulation time at the start of the tick (seconds)
    pub time: f64,
    pub orders_created: u32,
    pub products_delivered: u32,
    pub products_scrapped: u32,
    pub faults_injected: u32,
    pub commands_processed: u32,
}

/// Simulation error types
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown line index {0}")]
    UnknownLine(usize),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("command queue closed for line {0}")]
    QueueClosed(usize),
}

// ============================================================================
// Engine
// ============================================================================

/// Owns the whole factory: lines, clock, RNG, KPI and the bus seam
pub struct FactoryEngine {
    config: FactoryConfig,
    clock: SimClock,
    rng: RngManager,
    kpi: KpiCalculator,
    event_log: EventLog,
    lines: Vec<ProductionLine>,
    command_txs: Vec<Sender<String>>,
    command_rxs: Vec<Receiver<String>>,
    publisher: Box<dyn BusPublisher>,
    topics: TopicRoot,
    debouncer: StatusDebouncer,
    final_result_published: bool,
}

impl FactoryEngine {
    /// Create a new engine from configuration
    ///
    /// Publishing defaults to the no-op sink; install a real one with
    /// [`FactoryEngine::set_publisher`].
    pub fn new(config: FactoryConfig) -> Result<Self, SimulationError> {
        Self::validate_config(&config)?;

        let clock = SimClock::new(config.tick_seconds, config.duration_seconds);
        let rng = RngManager::new(config.rng_seed);

        let mut lines = Vec::with_capacity(config.num_lines);
        let mut command_txs = Vec::with_capacity(config.num_lines);
        let mut command_rxs = Vec::with_capacity(config.num_lines);
        for i in 0..config.num_lines {
            lines.push(ProductionLine::new(
                format!("line{}", i + 1),
                OrderGenerator::new(config.order_config.clone()),
                FaultInjector::new(config.fault_config.clone()),
            ));
            let (tx, rx) = unbounded();
            command_txs.push(tx);
            command_rxs.push(rx);
        }

        let topics = match &config.topic_root {
            Some(root) => TopicRoot::new(root.clone()),
            None => TopicRoot::from_env(),
        };

        Ok(Self {
            config,
            clock,
            rng,
            kpi: KpiCalculator::new(),
            event_log: EventLog::new(),
            lines,
            command_txs,
            command_rxs,
            publisher: Box::new(NoopPublisher),
            topics,
            debouncer: StatusDebouncer::new(),
            final_result_published: false,
        })
    }

    fn validate_config(config: &FactoryConfig) -> Result<(), SimulationError> {
        if config.tick_seconds <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "tick_seconds must be > 0".to_string(),
            ));
        }
        if config.duration_seconds <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "duration_seconds must be > 0".to_string(),
            ));
        }
        if config.num_lines == 0 || config.num_lines > 8 {
            return Err(SimulationError::InvalidConfig(format!(
                "num_lines must be in 1..=8, got {}",
                config.num_lines
            )));
        }
        let (lo, hi) = config.order_config.interval_range;
        if lo <= 0.0 || hi < lo {
            return Err(SimulationError::InvalidConfig(
                "order interval_range must satisfy 0 < lo <= hi".to_string(),
            ));
        }
        Ok(())
    }

    /// Install the bus publisher (MQTT bridge, buffer, or no-op)
    pub fn set_publisher(&mut self, publisher: Box<dyn BusPublisher>) {
        self.publisher = publisher;
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Current simulated time in seconds
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn is_finished(&self) -> bool {
        self.clock.is_finished()
    }

    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, idx: usize) -> Option<&ProductionLine> {
        self.lines.get(idx)
    }

    pub fn line_mut(&mut self, idx: usize) -> Option<&mut ProductionLine> {
        self.lines.get_mut(idx)
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn kpi(&self) -> &KpiCalculator {
        &self.kpi
    }

    /// Current KPI snapshot
    pub fn kpi_snapshot(&self) -> KpiSnapshot {
        self.kpi.snapshot(self.clock.now())
    }

    /// Current scored breakdown
    pub fn score(&self) -> ScoreBreakdown {
        self.kpi.score(self.clock.now())
    }

    pub fn topics(&self) -> &TopicRoot {
        &self.topics
    }

    // ========================================================================
    // Command ingress
    // ========================================================================

    /// Sender half of a line's command queue, for the bus thread
    pub fn command_sender(&self, line_idx: usize) -> Option<Sender<String>> {
        self.command_txs.get(line_idx).cloned()
    }

    /// Post a raw JSON command onto a line's queue
    ///
    /// The command is validated when the queue is drained at the top
    /// of the next tick.
    pub fn post_command(&self, line_idx: usize, json: impl Into<String>) -> Result<(), SimulationError> {
        let tx = self
            .command_txs
            .get(line_idx)
            .ok_or(SimulationError::UnknownLine(line_idx))?;
        tx.send(json.into())
            .map_err(|_| SimulationError::QueueClosed(line_idx))
    }

    // ========================================================================
    // Scenario tooling
    // ========================================================================

    /// Inject an order (and its products) directly into a line
    ///
    /// Bypasses the order generator but keeps the KPI counters
    /// consistent; used by tests and scripted demos.
    pub fn seed_order(
        &mut self,
        line_idx: usize,
        order: crate::models::Order,
        products: Vec<crate::models::Product>,
    ) -> Result<(), SimulationError> {
        let line = self
            .lines
            .get_mut(line_idx)
            .ok_or(SimulationError::UnknownLine(line_idx))?;
        self.kpi.register_order_created();
        for product in products {
            self.kpi.register_product_created();
            line.seed_raw_product(product);
        }
        line.orders_mut().push(order);
        Ok(())
    }

    /// Fault a specific device now, with full accounting
    pub fn force_fault(
        &mut self,
        line_idx: usize,
        target: crate::faults::FaultTarget,
        duration: f64,
    ) -> Result<(), SimulationError> {
        let now = self.clock.now();
        let mut alerts = Vec::new();
        let mut out = crate::line::LineOutput::default();
        let line = self
            .lines
            .get_mut(line_idx)
            .ok_or(SimulationError::UnknownLine(line_idx))?;
        line.apply_fault(
            target,
            duration,
            now,
            &mut self.kpi,
            &mut self.event_log,
            &mut alerts,
            &mut out,
        );
        let line_name = line.name().to_string();
        for alert in &alerts {
            publish_json(
                self.publisher.as_mut(),
                self.topics.alerts(&alert.line),
                alert,
            );
        }
        for response in &out.responses {
            publish_json(
                self.publisher.as_mut(),
                self.topics.response(&line_name),
                response,
            );
        }
        Ok(())
    }

    // ========================================================================
    // Tick loop
    // ========================================================================

    /// Execute one simulation tick
    pub fn tick(&mut self) -> TickResult {
        let now = self.clock.now();
        let dt = self.clock.tick_seconds();
        let mut result = TickResult {
            time: now,
            ..TickResult::default()
        };
        let mut alerts = Vec::new();
        let mut get_result = false;

        for (idx, line) in self.lines.iter_mut().enumerate() {
            let inbound: Vec<String> = self.command_rxs[idx].try_iter().collect();
            let out = line.tick(
                now,
                dt,
                &mut self.rng,
                &mut self.kpi,
                &mut self.event_log,
                &mut alerts,
                inbound,
            );

            for response in &out.responses {
                publish_json(
                    self.publisher.as_mut(),
                    self.topics.response(line.name()),
                    response,
                );
            }
            for event in &out.order_events {
                publish_json(
                    self.publisher.as_mut(),
                    self.topics.orders_status(),
                    event,
                );
            }
            get_result |= out.get_result_requested;

            result.orders_created += out.orders_created;
            result.products_delivered += out.products_delivered;
            result.products_scrapped += out.products_scrapped;
            result.faults_injected += out.faults_injected;
            result.commands_processed += out.commands_processed;
        }

        for alert in &alerts {
            publish_json(
                self.publisher.as_mut(),
                self.topics.alerts(&alert.line),
                alert,
            );
        }

        self.clock.advance();

        if get_result {
            self.publish_result();
        }

        self.publish_snapshots();

        if self.clock.on_interval(KPI_PUBLISH_SECONDS) {
            let snapshot = self.kpi.snapshot(self.clock.now());
            publish_json(
                self.publisher.as_mut(),
                self.topics.kpi_status(),
                &snapshot,
            );
        }

        if self.clock.is_finished() && !self.final_result_published {
            self.final_result_published = true;
            self.publish_result();
            info!(
                score = self.kpi.score(self.clock.now()).total_score,
                "simulation finished"
            );
        }

        result
    }

    /// Run ticks until the configured end time
    pub fn run_to_end(&mut self) -> ScoreBreakdown {
        while !self.clock.is_finished() {
            self.tick();
        }
        self.score()
    }

    fn publish_result(&mut self) {
        let score = self.kpi.score(self.clock.now());
        publish_json(
            self.publisher.as_mut(),
            self.topics.result_status(),
            &score,
        );
    }

    // ========================================================================
    // Status snapshots
    // ========================================================================

    fn publish_snapshots(&mut self) {
        let now = self.clock.now();
        for line in &self.lines {
            let name = line.name();

            for kind in [
                crate::layout::StationKind::StationA,
                crate::layout::StationKind::StationB,
                crate::layout::StationKind::StationC,
            ] {
                let station = line.station(kind);
                let snap = StationSnapshot {
                    timestamp: now,
                    source_id: station.id().to_string(),
                    status: station.status(),
                    buffer: station.buffer_ids(),
                    output: station.output_id(),
                    working_seconds: station.working_seconds(),
                };
                emit_debounced(
                    &mut self.debouncer,
                    self.publisher.as_mut(),
                    self.topics.station_status(name, station.id()),
                    now,
                    snap,
                    |s, t| s.timestamp = t,
                );
            }

            let quality = line.quality();
            let snap = StationSnapshot {
                timestamp: now,
                source_id: quality.id().to_string(),
                status: quality.status(),
                buffer: quality.buffer_ids(),
                output: quality.output_ids().first().cloned(),
                working_seconds: quality.working_seconds(),
            };
            emit_debounced(
                &mut self.debouncer,
                self.publisher.as_mut(),
                self.topics.station_status(name, quality.id()),
                now,
                snap,
                |s, t| s.timestamp = t,
            );

            for conveyor in [line.conveyor_ab(), line.conveyor_bc()] {
                let snap = ConveyorSnapshot {
                    timestamp: now,
                    source_id: conveyor.id().to_string(),
                    status: conveyor.status(),
                    items: conveyor.item_ids(),
                    upper: None,
                    lower: None,
                };
                emit_debounced(
                    &mut self.debouncer,
                    self.publisher.as_mut(),
                    self.topics.conveyor_status(name, conveyor.id()),
                    now,
                    snap,
                    |s, t| s.timestamp = t,
                );
            }

            let cq = line.conveyor_cq();
            let snap = ConveyorSnapshot {
                timestamp: now,
                source_id: cq.id().to_string(),
                status: cq.main().status(),
                items: cq.main().item_ids(),
                upper: Some(cq.holding_ids(crate::layout::Corridor::Upper)),
                lower: Some(cq.holding_ids(crate::layout::Corridor::Lower)),
            };
            emit_debounced(
                &mut self.debouncer,
                self.publisher.as_mut(),
                self.topics.conveyor_status(name, cq.id()),
                now,
                snap,
                |s, t| s.timestamp = t,
            );

            for agv_id in ["AGV_1", "AGV_2"] {
                if let Some(agv) = line.agv(agv_id) {
                    let snap = AgvSnapshot {
                        timestamp: now,
                        source_id: agv.id().to_string(),
                        status: agv.status(),
                        current_point: agv.current_point().to_string(),
                        target_point: agv.target_point().map(|p| p.to_string()),
                        estimated_time: agv.estimated_seconds_remaining(now),
                        battery_level: agv.battery(),
                        payload: agv.payload_ids(),
                    };
                    emit_debounced(
                        &mut self.debouncer,
                        self.publisher.as_mut(),
                        self.topics.agv_status(name, agv.id()),
                        now,
                        snap,
                        |s, t| s.timestamp = t,
                    );
                }
            }

            let raw = line.raw_material();
            let snap = WarehouseSnapshot {
                timestamp: now,
                source_id: raw.id().to_string(),
                status: crate::devices::DeviceStatus::Idle,
                buffer: raw.product_ids(),
                total: raw.total_supplied(),
            };
            emit_debounced(
                &mut self.debouncer,
                self.publisher.as_mut(),
                self.topics.warehouse_status(name, raw.id()),
                now,
                snap,
                |s, t| s.timestamp = t,
            );

            let finished = line.finished_goods();
            let snap = WarehouseSnapshot {
                timestamp: now,
                source_id: finished.id().to_string(),
                status: crate::devices::DeviceStatus::Idle,
                buffer: finished.product_ids(),
                total: finished.len() as u64,
            };
            emit_debounced(
                &mut self.debouncer,
                self.publisher.as_mut(),
                self.topics.warehouse_status(name, finished.id()),
                now,
                snap,
                |s, t| s.timestamp = t,
            );
        }
    }

    // ========================================================================
    // Invariant validation
    // ========================================================================

    /// Check the structural invariants of the whole factory
    ///
    /// Intended for tests and debug assertions: product conservation,
    /// capacity bounds, battery bounds and holding-buffer purity.
    pub fn validate_invariants(&self) -> Result<(), SimulationError> {
        let census: usize = self.lines.iter().map(|l| l.product_census()).sum();
        if census as u64 != self.kpi.products_emitted() {
            return Err(SimulationError::InvariantViolation(format!(
                "product census {} != emitted {}",
                census,
                self.kpi.products_emitted()
            )));
        }

        for line in &self.lines {
            for kind in [
                crate::layout::StationKind::StationA,
                crate::layout::StationKind::StationB,
                crate::layout::StationKind::StationC,
            ] {
                let station = line.station(kind);
                if station.buffer_level() > crate::layout::STATION_BUFFER_CAPACITY {
                    return Err(SimulationError::InvariantViolation(format!(
                        "{}/{} buffer over capacity",
                        line.name(),
                        station.id()
                    )));
                }
            }
            for conveyor in [line.conveyor_ab(), line.conveyor_bc(), line.conveyor_cq().main()] {
                if conveyor.len() > crate::layout::CONVEYOR_CAPACITY {
                    return Err(SimulationError::InvariantViolation(format!(
                        "{}/{} over capacity",
                        line.name(),
                        conveyor.id()
                    )));
                }
            }
            for agv_id in ["AGV_1", "AGV_2"] {
                if let Some(agv) = line.agv(agv_id) {
                    if agv.payload().len() > crate::layout::AGV_PAYLOAD_CAPACITY {
                        return Err(SimulationError::InvariantViolation(format!(
                            "{}/{} payload over capacity",
                            line.name(),
                            agv_id
                        )));
                    }
                    if !(0.0..=100.0).contains(&agv.battery()) {
                        return Err(SimulationError::InvariantViolation(format!(
                            "{}/{} battery {} out of [0, 100]",
                            line.name(),
                            agv_id,
                            agv.battery()
                        )));
                    }
                }
            }
            for corridor in [crate::layout::Corridor::Upper, crate::layout::Corridor::Lower] {
                for id in line.conveyor_cq().holding_ids(corridor) {
                    if !id.starts_with("prod_P3_") {
                        return Err(SimulationError::InvariantViolation(format!(
                            "{} holding buffer contains non-P3 product {}",
                            line.name(),
                            id
                        )));
                    }
                }
            }

            // Charge classification: every charge an AGV started is
            // counted exactly once as proactive or passive.
            for agv_id in ["AGV_1", "AGV_2"] {
                if let Some(agv) = line.agv(agv_id) {
                    let started = self
                        .event_log
                        .events()
                        .iter()
                        .filter(|e| {
                            matches!(
                                e,
                                FactoryEvent::ChargeStarted { line: l, agv_id: a, .. }
                                    if l == line.name() && a == agv_id
                            )
                        })
                        .count() as u64;
                    let classified =
                        agv.stats().proactive_charges + agv.stats().passive_charges;
                    if classified != started {
                        return Err(SimulationError::InvariantViolation(format!(
                            "{}/{} classified {} charges but started {}",
                            line.name(),
                            agv_id,
                            classified,
                            started
                        )));
                    }
                }
            }
        }

        // Corridor compatibility: raw material pickups complete only on
        // the lower corridor's AGV, warehouse deliveries only on the
        // upper corridor's.
        for event in self.event_log.events_of_type("AgvTaskCompleted") {
            if let FactoryEvent::AgvTaskCompleted {
                line,
                agv_id,
                description,
                ..
            } = event
            {
                let raw_pickup = description.contains("from RawMaterial");
                let warehouse_drop = description.contains("to Warehouse");
                if (raw_pickup && agv_id != "AGV_1") || (warehouse_drop && agv_id != "AGV_2") {
                    return Err(SimulationError::InvariantViolation(format!(
                        "{}/{} completed an out-of-corridor action: {}",
                        line, agv_id, description
                    )));
                }
            }
        }
        Ok(())
    }
}

fn publish_json<T: Serialize>(publisher: &mut dyn BusPublisher, topic: String, payload: &T) {
    if let Ok(json) = serde_json::to_string(payload) {
        publisher.publish(&topic, json);
    }
}

/// Publish a snapshot if it changed (debounced) or its heartbeat is due
///
/// The debounce fingerprint is the payload with the timestamp zeroed,
/// so a pure clock advance does not count as a state change.
fn emit_debounced<T: Serialize + Clone>(
    debouncer: &mut StatusDebouncer,
    publisher: &mut dyn BusPublisher,
    topic: String,
    now: f64,
    snapshot: T,
    set_timestamp: impl Fn(&mut T, f64),
) {
    let mut fingerprint_snap = snapshot.clone();
    set_timestamp(&mut fingerprint_snap, 0.0);
    let (Ok(fingerprint), Ok(payload)) = (
        serde_json::to_string(&fingerprint_snap),
        serde_json::to_string(&snapshot),
    ) else {
        return;
    };
    if debouncer.should_publish(&topic, &fingerprint, now) {
        publisher.publish(&topic, payload);
    }
}
