//! Fault injection
//!
//! Periodically selects an eligible device (station, conveyor or AGV)
//! and disables it for a sampled duration. Faults self-clear on a
//! timer; no diagnosis is required. Each fault charges a maintenance
//! cost and publishes an alert carrying the symptom text.

use crate::devices::DeviceCtx;
use serde::{Deserialize, Serialize};

/// Fault injection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Seconds between injections, sampled uniformly
    pub interval_range: (f64, f64),
    /// Fault duration, sampled uniformly (seconds)
    pub duration_range: (f64, f64),
    /// Disable injection entirely (scenario runs)
    pub enabled: bool,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            interval_range: (120.0, 300.0),
            duration_range: (20.0, 60.0),
            enabled: true,
        }
    }
}

/// Concrete device a fault lands on
///
/// The Station-C→Quality conveyor is exempt: faulting it would strand
/// first-pass P3 products with no recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultTarget {
    StationA,
    StationB,
    StationC,
    QualityCheck,
    ConveyorAB,
    ConveyorBC,
    Agv1,
    Agv2,
}

impl FaultTarget {
    /// Device identifier as published on the bus
    pub fn device_id(&self) -> &'static str {
        match self {
            FaultTarget::StationA => "StationA",
            FaultTarget::StationB => "StationB",
            FaultTarget::StationC => "StationC",
            FaultTarget::QualityCheck => "QualityCheck",
            FaultTarget::ConveyorAB => "Conveyor_AB",
            FaultTarget::ConveyorBC => "Conveyor_BC",
            FaultTarget::Agv1 => "AGV_1",
            FaultTarget::Agv2 => "AGV_2",
        }
    }

    /// Symptom text carried in the fault alert
    pub fn symptom(&self) -> &'static str {
        match self {
            FaultTarget::StationA
            | FaultTarget::StationB
            | FaultTarget::StationC
            | FaultTarget::QualityCheck => "station_vibration",
            FaultTarget::ConveyorAB | FaultTarget::ConveyorBC => "conveyor_stuck",
            FaultTarget::Agv1 | FaultTarget::Agv2 => "agv_stuck",
        }
    }
}

const STATION_TARGETS: [FaultTarget; 4] = [
    FaultTarget::StationA,
    FaultTarget::StationB,
    FaultTarget::StationC,
    FaultTarget::QualityCheck,
];
const CONVEYOR_TARGETS: [FaultTarget; 2] = [FaultTarget::ConveyorAB, FaultTarget::ConveyorBC];
const AGV_TARGETS: [FaultTarget; 2] = [FaultTarget::Agv1, FaultTarget::Agv2];

/// A fault decided by the injector, to be applied by the line
#[derive(Debug, Clone, PartialEq)]
pub struct FaultOrder {
    pub target: FaultTarget,
    /// Seconds until the device self-clears
    pub duration: f64,
}

/// Periodic fault source for one line
#[derive(Debug, Clone)]
pub struct FaultInjector {
    config: FaultConfig,
    /// Next injection time; sampled lazily on the first tick
    next_fault_at: Option<f64>,
}

impl FaultInjector {
    pub fn new(config: FaultConfig) -> Self {
        Self {
            config,
            next_fault_at: None,
        }
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    /// Advance the injector; returns the fault to apply this tick, if
    /// any
    pub fn tick(&mut self, ctx: &mut DeviceCtx) -> Option<FaultOrder> {
        if !self.config.enabled {
            return None;
        }

        match self.next_fault_at {
            None => {
                let (lo, hi) = self.config.interval_range;
                self.next_fault_at = Some(ctx.now + ctx.rng.uniform_f64(lo, hi));
                None
            }
            Some(at) if ctx.now >= at => {
                let (lo, hi) = self.config.interval_range;
                self.next_fault_at = Some(ctx.now + ctx.rng.uniform_f64(lo, hi));

                // Pick a fault kind uniformly, then a device within it.
                let target = match ctx.rng.range(0, 3) {
                    0 => STATION_TARGETS[ctx.rng.range(0, STATION_TARGETS.len() as i64) as usize],
                    1 => CONVEYOR_TARGETS[ctx.rng.range(0, CONVEYOR_TARGETS.len() as i64) as usize],
                    _ => AGV_TARGETS[ctx.rng.range(0, AGV_TARGETS.len() as i64) as usize],
                };
                let (dlo, dhi) = self.config.duration_range;
                let duration = ctx.rng.uniform_f64(dlo, dhi);

                Some(FaultOrder { target, duration })
            }
            Some(_) => None,
        }
    }
}
