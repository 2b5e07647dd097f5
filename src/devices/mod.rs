//! Production and logistics devices
//!
//! The heterogeneous device collection of one line: processing
//! stations, conveyors, warehouses, the quality check and the AGVs.
//! Devices are plain owned structs advanced once per tick by their
//! line; status is derived from internal state rather than stored, so
//! it can never disagree with it.

pub mod agv;
pub mod conveyor;
pub mod quality;
pub mod station;
pub mod warehouse;

pub use agv::{Agv, AgvAction, AgvNotice, AgvOpError, AgvStats, QueuedTask};
pub use conveyor::{Conveyor, HoldingConveyor};
pub use quality::{QualityChecker, QualityVerdict};
pub use station::Station;
pub use warehouse::{FinishedGoods, RawMaterial};

use crate::models::EventLog;
use crate::publisher::AlertPayload;
use crate::rng::RngManager;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operational status shared by every device kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    Idle,
    Processing,
    Moving,
    Charging,
    Fault,
    Blocked,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Idle => write!(f, "IDLE"),
            DeviceStatus::Processing => write!(f, "PROCESSING"),
            DeviceStatus::Moving => write!(f, "MOVING"),
            DeviceStatus::Charging => write!(f, "CHARGING"),
            DeviceStatus::Fault => write!(f, "FAULT"),
            DeviceStatus::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// Per-tick context handed to each device by its line
///
/// Carries the clock, the shared RNG, the event log and the alert
/// outbox. Everything runs on the single scheduler thread, so devices
/// can mutate freely through this.
pub struct DeviceCtx<'a> {
    /// Current simulation time (seconds)
    pub now: f64,
    /// Seconds covered by this tick
    pub dt: f64,
    /// Line identifier ("line1".."line3")
    pub line: &'a str,
    /// Shared deterministic RNG
    pub rng: &'a mut RngManager,
    /// Shared event log
    pub events: &'a mut EventLog,
    /// Alerts raised this tick, flushed by the publisher
    pub alerts: &'a mut Vec<AlertPayload>,
}
