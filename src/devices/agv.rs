//! Automated guided vehicle
//!
//! An AGV idles until the command handler queues an action, then works
//! through its queue one action at a time: move, load, unload, charge.
//! Battery is consumed per meter moved and per load/unload action;
//! when an action would drive the battery below the low threshold the
//! AGV aborts it, drives to the charging point and charges to full
//! (one passive charge).
//!
//! Device-side effects of load/unload (removing a product from a
//! buffer, admitting it downstream) are performed by the line when the
//! action starts; the AGV itself only models time, energy and payload.

use crate::devices::{DeviceCtx, DeviceStatus};
use crate::layout::{
    travel_distance, Corridor, PathPoint, AGV_ACTION_SECONDS, AGV_BATTERY_PER_ACTION,
    AGV_BATTERY_PER_METER, AGV_CHARGE_RATE, AGV_INITIAL_BATTERY, AGV_LOW_BATTERY_THRESHOLD,
    AGV_PAYLOAD_CAPACITY,
};
use crate::models::{FactoryEvent, Product};
use crate::publisher::AlertPayload;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, warn};

/// Agent-requested action for an AGV
#[derive(Debug, Clone, PartialEq)]
pub enum AgvAction {
    Move { target: PathPoint },
    Load { product_id: Option<String> },
    Unload,
    Charge { target_level: f64 },
}

impl AgvAction {
    pub fn name(&self) -> &'static str {
        match self {
            AgvAction::Move { .. } => "move",
            AgvAction::Load { .. } => "load",
            AgvAction::Unload => "unload",
            AgvAction::Charge { .. } => "charge",
        }
    }
}

/// A validated command waiting in the AGV's FIFO queue
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub command_id: Option<String>,
    pub action: AgvAction,
}

/// Counters feeding the AGV KPIs
#[derive(Debug, Clone, Default)]
pub struct AgvStats {
    /// Charges requested by an agent while battery > threshold
    pub proactive_charges: u64,
    /// Forced (emergency) charges at or below threshold
    pub passive_charges: u64,
    /// Cumulative seconds spent charging
    pub charge_seconds: f64,
    /// Cumulative seconds spent moving
    pub transport_seconds: f64,
    /// Cumulative seconds spent faulted
    pub fault_seconds: f64,
    /// Successfully completed queued actions
    pub completed_tasks: u64,
    /// Meters travelled
    pub total_distance: f64,
}

/// Why an action could not be started
#[derive(Debug, Error, PartialEq)]
pub enum AgvOpError {
    #[error("AGV is faulted and cannot act")]
    Faulted,
    #[error("AGV is busy with another action")]
    Busy,
    #[error("battery too low ({battery:.1}%), forced charge engaged")]
    ForcedCharge { battery: f64 },
    #[error("payload is full ({capacity} products)")]
    PayloadFull { capacity: usize },
    #[error("payload is empty, nothing to unload")]
    PayloadEmpty,
    #[error("charge target {target:.1}% not above current level {current:.1}%")]
    ChargeTargetReached { target: f64, current: f64 },
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    /// Travelling to `target`; `detour` marks the forced-charge leg
    Moving {
        target: PathPoint,
        arrive_at: f64,
        distance: f64,
        detour: bool,
    },
    /// Load/unload in progress (device transfer already applied)
    Acting { until: f64, description: String },
    Charging { target_level: f64, passive: bool },
}

/// Something the line must react to after an AGV tick
#[derive(Debug, Clone, PartialEq)]
pub enum AgvNotice {
    /// The active action finished successfully
    TaskCompleted {
        command_id: Option<String>,
        description: String,
    },
    /// Charging reached its target level
    ChargeCompleted {
        command_id: Option<String>,
        level: f64,
        passive: bool,
    },
}

/// Mobile carrier with energy, payload and an action queue
#[derive(Debug, Clone)]
pub struct Agv {
    id: String,
    corridor: Corridor,
    current_point: PathPoint,
    battery: f64,
    payload: VecDeque<Product>,
    queue: VecDeque<QueuedTask>,
    phase: Phase,
    /// Command the current phase answers, if any
    active_command: Option<Option<String>>,
    stats: AgvStats,
    fault_until: Option<f64>,
    /// Set once the low-battery alert has fired for the current dip
    low_battery_alerted: bool,
}

impl Agv {
    pub fn new(id: impl Into<String>, corridor: Corridor) -> Self {
        Self {
            id: id.into(),
            corridor,
            current_point: PathPoint::P0,
            battery: AGV_INITIAL_BATTERY,
            payload: VecDeque::new(),
            queue: VecDeque::new(),
            phase: Phase::Idle,
            active_command: None,
            stats: AgvStats::default(),
            fault_until: None,
            low_battery_alerted: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn corridor(&self) -> Corridor {
        self.corridor
    }

    pub fn current_point(&self) -> PathPoint {
        self.current_point
    }

    /// Target point while moving, if any
    pub fn target_point(&self) -> Option<PathPoint> {
        match &self.phase {
            Phase::Moving { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Seconds until the current phase completes (0 when idle)
    pub fn estimated_seconds_remaining(&self, now: f64) -> f64 {
        match &self.phase {
            Phase::Moving { arrive_at, .. } => (arrive_at - now).max(0.0),
            Phase::Acting { until, .. } => (until - now).max(0.0),
            Phase::Charging { target_level, .. } => {
                ((target_level - self.battery) / AGV_CHARGE_RATE).max(0.0)
            }
            Phase::Idle => 0.0,
        }
    }

    pub fn battery(&self) -> f64 {
        self.battery
    }

    pub fn is_battery_low(&self) -> bool {
        self.battery <= AGV_LOW_BATTERY_THRESHOLD
    }

    pub fn payload(&self) -> &VecDeque<Product> {
        &self.payload
    }

    pub fn payload_ids(&self) -> Vec<String> {
        self.payload.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn payload_full(&self) -> bool {
        self.payload.len() >= AGV_PAYLOAD_CAPACITY
    }

    pub fn stats(&self) -> &AgvStats {
        &self.stats
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_faulted(&self) -> bool {
        self.fault_until.is_some()
    }

    pub fn is_idle(&self) -> bool {
        !self.is_faulted() && self.phase == Phase::Idle
    }

    pub fn status(&self) -> DeviceStatus {
        if self.is_faulted() {
            DeviceStatus::Fault
        } else {
            match &self.phase {
                Phase::Idle => DeviceStatus::Idle,
                Phase::Moving { .. } => DeviceStatus::Moving,
                Phase::Acting { .. } => DeviceStatus::Processing,
                Phase::Charging { .. } => DeviceStatus::Charging,
            }
        }
    }

    /// Queue a validated agent command
    pub fn enqueue_task(&mut self, task: QueuedTask) {
        self.queue.push_back(task);
    }

    /// Pop the next queued task once idle
    pub fn pop_task(&mut self) -> Option<QueuedTask> {
        if self.is_idle() {
            self.queue.pop_front()
        } else {
            None
        }
    }

    // ========================================================================
    // Battery
    // ========================================================================

    fn consume_battery(&mut self, amount: f64, ctx: &mut DeviceCtx) {
        if amount <= 0.0 {
            return;
        }
        let was_low = self.is_battery_low();
        self.battery = (self.battery - amount).max(0.0);
        if !was_low && self.is_battery_low() && !self.low_battery_alerted {
            self.low_battery_alerted = true;
            warn!(agv = %self.id, battery = self.battery, "battery low");
            ctx.alerts.push(AlertPayload::battery_low(
                ctx.now,
                ctx.line,
                &self.id,
                self.battery,
            ));
        }
    }

    /// Energy an action would consume before it completes (%)
    fn energy_estimate(&self, action: &AgvAction) -> f64 {
        match action {
            AgvAction::Move { target } => {
                travel_distance(self.corridor, self.current_point, *target) * AGV_BATTERY_PER_METER
            }
            AgvAction::Load { .. } | AgvAction::Unload => AGV_BATTERY_PER_ACTION,
            AgvAction::Charge { .. } => 0.0,
        }
    }

    /// Whether starting `action` must trigger the forced-charge detour
    pub fn requires_forced_charge(&self, action: &AgvAction) -> bool {
        if matches!(action, AgvAction::Charge { .. }) {
            return false;
        }
        self.is_battery_low()
            || self.battery - self.energy_estimate(action) < AGV_LOW_BATTERY_THRESHOLD
    }

    // ========================================================================
    // Action starts (called by the line)
    // ========================================================================

    fn ensure_ready(&self) -> Result<(), AgvOpError> {
        if self.is_faulted() {
            return Err(AgvOpError::Faulted);
        }
        if self.phase != Phase::Idle {
            return Err(AgvOpError::Busy);
        }
        Ok(())
    }

    /// Begin a move to `target`
    pub fn start_move(
        &mut self,
        command_id: Option<String>,
        target: PathPoint,
        now: f64,
        ctx: &mut DeviceCtx,
    ) -> Result<(), AgvOpError> {
        self.ensure_ready()?;
        let action = AgvAction::Move { target };
        if self.requires_forced_charge(&action) {
            let battery = self.battery;
            self.begin_forced_charge(now, ctx);
            return Err(AgvOpError::ForcedCharge { battery });
        }
        let distance = travel_distance(self.corridor, self.current_point, target);
        let duration = distance / crate::layout::AGV_SPEED_MPS;
        self.phase = Phase::Moving {
            target,
            arrive_at: now + duration,
            distance,
            detour: false,
        };
        self.active_command = Some(command_id);
        debug!(agv = %self.id, %target, duration, "move started");
        Ok(())
    }

    /// Begin the load/unload timer after the line has applied the
    /// device-side transfer
    ///
    /// `description` becomes the success response text.
    pub fn start_action(
        &mut self,
        command_id: Option<String>,
        description: String,
        now: f64,
        ctx: &mut DeviceCtx,
    ) {
        self.consume_battery(AGV_BATTERY_PER_ACTION, ctx);
        self.phase = Phase::Acting {
            until: now + AGV_ACTION_SECONDS,
            description,
        };
        self.active_command = Some(command_id);
    }

    /// Accept a product into the payload (load transfer)
    ///
    /// # Panics
    /// Panics if the payload is already full; callers must check
    /// [`Agv::payload_full`] first.
    pub fn accept_product(&mut self, product: Product) {
        assert!(
            self.payload.len() < AGV_PAYLOAD_CAPACITY,
            "payload overflow on {}",
            self.id
        );
        self.payload.push_back(product);
    }

    /// Remove the head payload product (unload transfer)
    pub fn remove_product(&mut self) -> Option<Product> {
        self.payload.pop_front()
    }

    /// Put a product back at the head after a failed unload
    pub fn return_product(&mut self, product: Product) {
        self.payload.push_front(product);
    }

    /// Begin an agent-requested charge
    ///
    /// The target level is clamped to at most 100 %. Counts as
    /// proactive while battery is above the low threshold, passive
    /// otherwise.
    pub fn start_charge(
        &mut self,
        command_id: Option<String>,
        target_level: f64,
        now: f64,
        ctx: &mut DeviceCtx,
    ) -> Result<(), AgvOpError> {
        self.ensure_ready()?;
        let target = target_level.min(100.0);
        if target <= self.battery {
            return Err(AgvOpError::ChargeTargetReached {
                target,
                current: self.battery,
            });
        }
        let passive = self.is_battery_low();
        self.active_command = Some(command_id);
        self.begin_charge_phase(target, passive, now, ctx);
        Ok(())
    }

    /// Abort the requested action and detour to the charging point
    ///
    /// The charge target is 100 %; it counts as one passive charge
    /// once charging actually starts.
    pub fn begin_forced_charge(&mut self, now: f64, ctx: &mut DeviceCtx) {
        self.active_command = Some(None);
        if self.current_point == PathPoint::P10 {
            self.begin_charge_phase(100.0, true, now, ctx);
        } else {
            let distance = travel_distance(self.corridor, self.current_point, PathPoint::P10);
            let duration = distance / crate::layout::AGV_SPEED_MPS;
            self.phase = Phase::Moving {
                target: PathPoint::P10,
                arrive_at: now + duration,
                distance,
                detour: true,
            };
        }
        warn!(agv = %self.id, battery = self.battery, "forced charge detour");
    }

    /// Enter the charging phase and classify the charge
    ///
    /// The proactive/passive counters increment here, in lockstep with
    /// the ChargeStarted event, so the two can never disagree.
    fn begin_charge_phase(&mut self, target: f64, passive: bool, _now: f64, ctx: &mut DeviceCtx) {
        if passive {
            self.stats.passive_charges += 1;
        } else {
            self.stats.proactive_charges += 1;
        }
        self.phase = Phase::Charging {
            target_level: target,
            passive,
        };
        ctx.events.log(FactoryEvent::ChargeStarted {
            time: ctx.now,
            line: ctx.line.to_string(),
            agv_id: self.id.clone(),
            proactive: !passive,
            target_level: target,
        });
    }

    // ========================================================================
    // Faults
    // ========================================================================

    /// Mark the AGV faulted until `until`
    ///
    /// Any in-flight action is aborted; the payload is preserved.
    /// Returns the command the aborted action belonged to so the line
    /// can publish a failed response.
    pub fn inject_fault(&mut self, until: f64) -> Option<Option<String>> {
        self.fault_until = Some(until);
        let aborted = if self.phase != Phase::Idle {
            self.phase = Phase::Idle;
            self.active_command.take()
        } else {
            None
        };
        aborted
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance the AGV by one tick
    ///
    /// Returns a notice when a phase (and therefore a queued action)
    /// completed this tick.
    pub fn tick(&mut self, ctx: &mut DeviceCtx) -> Option<AgvNotice> {
        if let Some(until) = self.fault_until {
            self.stats.fault_seconds += ctx.dt;
            if ctx.now < until {
                return None;
            }
            self.fault_until = None;
            ctx.events.log(FactoryEvent::FaultCleared {
                time: ctx.now,
                line: ctx.line.to_string(),
                device_id: self.id.clone(),
            });
        }

        match self.phase.clone() {
            Phase::Idle => None,
            Phase::Moving {
                target,
                arrive_at,
                distance,
                detour,
            } => {
                self.stats.transport_seconds += ctx.dt;
                if ctx.now < arrive_at {
                    return None;
                }
                self.current_point = target;
                self.stats.total_distance += distance;
                self.consume_battery(distance * AGV_BATTERY_PER_METER, ctx);
                if detour {
                    // Forced-charge leg: switch straight into charging.
                    self.begin_charge_phase(100.0, true, ctx.now, ctx);
                    None
                } else {
                    self.phase = Phase::Idle;
                    self.stats.completed_tasks += 1;
                    let command_id = self.active_command.take().flatten();
                    Some(AgvNotice::TaskCompleted {
                        command_id,
                        description: format!(
                            "arrived at {}, battery {:.1}%",
                            target, self.battery
                        ),
                    })
                }
            }
            Phase::Acting { until, description } => {
                if ctx.now < until {
                    return None;
                }
                self.phase = Phase::Idle;
                self.stats.completed_tasks += 1;
                let command_id = self.active_command.take().flatten();
                Some(AgvNotice::TaskCompleted {
                    command_id,
                    description,
                })
            }
            Phase::Charging {
                target_level,
                passive,
            } => {
                self.stats.charge_seconds += ctx.dt;
                self.battery = (self.battery + AGV_CHARGE_RATE * ctx.dt).min(target_level);
                if self.battery < target_level {
                    return None;
                }
                self.phase = Phase::Idle;
                self.low_battery_alerted = false;
                if !passive {
                    self.stats.completed_tasks += 1;
                }
                let command_id = self.active_command.take().flatten();
                ctx.events.log(FactoryEvent::ChargeCompleted {
                    time: ctx.now,
                    line: ctx.line.to_string(),
                    agv_id: self.id.clone(),
                    level: self.battery,
                });
                Some(AgvNotice::ChargeCompleted {
                    command_id,
                    level: self.battery,
                    passive,
                })
            }
        }
    }

    /// Force a specific battery level (scenario tooling)
    pub fn set_battery(&mut self, level: f64) {
        self.battery = level.clamp(0.0, 100.0);
    }

    /// Force a specific position (scenario tooling)
    pub fn set_current_point(&mut self, point: PathPoint) {
        self.current_point = point;
    }
}
