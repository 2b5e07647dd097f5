//! Factory layout constants
//!
//! Path-point coordinates, processing-time tables and the nominal
//! figures shared by the routing, energy and KPI models. Coordinates
//! are nominal meters and are used only for AGV energy and move
//! duration; everything else in the simulation is time-based.

use crate::models::product::ProductType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Global constants
// ============================================================================

/// Nominal AGV speed in meters per second
pub const AGV_SPEED_MPS: f64 = 2.0;
/// Battery consumed per meter moved (%)
pub const AGV_BATTERY_PER_METER: f64 = 0.1;
/// Battery consumed per load/unload action (%)
pub const AGV_BATTERY_PER_ACTION: f64 = 0.5;
/// Charge rate (% per second)
pub const AGV_CHARGE_RATE: f64 = 3.33;
/// Below this battery level the AGV refuses work and force-charges (%)
pub const AGV_LOW_BATTERY_THRESHOLD: f64 = 5.0;
/// Duration of one load/unload action (seconds)
pub const AGV_ACTION_SECONDS: f64 = 3.0;
/// Maximum products an AGV can carry
pub const AGV_PAYLOAD_CAPACITY: usize = 2;
/// Battery level AGVs start the simulation with (%)
pub const AGV_INITIAL_BATTERY: f64 = 40.0;
/// Default target level for an agent-requested charge (%)
pub const DEFAULT_CHARGE_TARGET: f64 = 80.0;

/// Station input buffer capacity
pub const STATION_BUFFER_CAPACITY: usize = 3;
/// Conveyor capacity (items in flight or waiting to release)
pub const CONVEYOR_CAPACITY: usize = 3;
/// Conveyor transfer delay per item (seconds)
pub const CONVEYOR_TRANSFER_SECONDS: f64 = 20.0;
/// Capacity of each P3 holding sub-buffer on Conveyor_CQ
pub const HOLDING_BUFFER_CAPACITY: usize = 2;
/// Quality check input buffer capacity
pub const QUALITY_BUFFER_CAPACITY: usize = 2;
/// Quality check output staging capacity (AGV pickup area)
pub const QUALITY_OUTPUT_CAPACITY: usize = 5;

/// Maintenance cost charged per injected fault (cost units)
pub const MAINTENANCE_COST_PER_FAULT: f64 = 8.0;
/// Energy cost per second of station/conveyor work (cost units)
pub const ENERGY_COST_PER_WORK_SECOND: f64 = 0.1;
/// Scrap cost as a fraction of material cost
pub const SCRAP_COST_FACTOR: f64 = 0.8;

/// Snapshot debounce for device status publishes (seconds)
pub const STATUS_DEBOUNCE_SECONDS: f64 = 0.5;
/// Heartbeat interval for unchanged device status (seconds)
pub const STATUS_HEARTBEAT_SECONDS: f64 = 30.0;
/// KPI snapshot publish cadence (seconds)
pub const KPI_PUBLISH_SECONDS: f64 = 10.0;

// ============================================================================
// Path points & corridors
// ============================================================================

/// A discrete stop on an AGV corridor
///
/// The AGV may halt at a path point and interact with the device mapped
/// to it. Both corridors share the same point names; only the
/// coordinates (and the Conveyor_CQ sub-buffer at P6) differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathPoint {
    P0,
    P1,
    P2,
    P3,
    P4,
    P5,
    P6,
    P7,
    P8,
    P9,
    P10,
}

impl PathPoint {
    /// All path points in index order
    pub const ALL: [PathPoint; 11] = [
        PathPoint::P0,
        PathPoint::P1,
        PathPoint::P2,
        PathPoint::P3,
        PathPoint::P4,
        PathPoint::P5,
        PathPoint::P6,
        PathPoint::P7,
        PathPoint::P8,
        PathPoint::P9,
        PathPoint::P10,
    ];
}

impl fmt::Display for PathPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let idx = Self::ALL.iter().position(|p| p == self).unwrap_or(0);
        write!(f, "P{}", idx)
    }
}

impl FromStr for PathPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P0" => Ok(PathPoint::P0),
            "P1" => Ok(PathPoint::P1),
            "P2" => Ok(PathPoint::P2),
            "P3" => Ok(PathPoint::P3),
            "P4" => Ok(PathPoint::P4),
            "P5" => Ok(PathPoint::P5),
            "P6" => Ok(PathPoint::P6),
            "P7" => Ok(PathPoint::P7),
            "P8" => Ok(PathPoint::P8),
            "P9" => Ok(PathPoint::P9),
            "P10" => Ok(PathPoint::P10),
            _ => Err(format!(
                "Invalid path point: '{}'. Valid values: P0..P10",
                s
            )),
        }
    }
}

/// Corridor side an AGV operates in
///
/// AGV_1 runs the lower corridor (y ≈ 15), AGV_2 the upper (y ≈ 25).
/// The corridors are disjoint; AGVs never cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Corridor {
    Lower,
    Upper,
}

impl fmt::Display for Corridor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corridor::Lower => write!(f, "lower"),
            Corridor::Upper => write!(f, "upper"),
        }
    }
}

/// Coordinates of a path point for the given corridor (nominal meters)
pub fn point_coordinates(corridor: Corridor, point: PathPoint) -> (f64, f64) {
    match corridor {
        Corridor::Lower => match point {
            PathPoint::P0 => (5.0, 15.0),
            PathPoint::P1 => (12.0, 15.0),
            PathPoint::P2 => (25.0, 15.0),
            PathPoint::P3 => (32.0, 15.0),
            PathPoint::P4 => (45.0, 15.0),
            PathPoint::P5 => (52.0, 15.0),
            PathPoint::P6 => (65.0, 10.0),
            PathPoint::P7 => (72.0, 15.0),
            PathPoint::P8 => (80.0, 15.0),
            PathPoint::P9 => (95.0, 15.0),
            PathPoint::P10 => (10.0, 10.0),
        },
        Corridor::Upper => match point {
            PathPoint::P0 => (5.0, 25.0),
            PathPoint::P1 => (12.0, 25.0),
            PathPoint::P2 => (25.0, 25.0),
            PathPoint::P3 => (32.0, 25.0),
            PathPoint::P4 => (45.0, 25.0),
            PathPoint::P5 => (52.0, 25.0),
            PathPoint::P6 => (65.0, 25.0),
            PathPoint::P7 => (72.0, 25.0),
            PathPoint::P8 => (80.0, 25.0),
            PathPoint::P9 => (95.0, 25.0),
            PathPoint::P10 => (10.0, 30.0),
        },
    }
}

/// Corridor a point's device is serviced from, if restricted
///
/// Raw material pickup is a lower-corridor service (AGV_1); the
/// finished goods warehouse is served from the upper corridor
/// (AGV_2). Stations and the quality check dock both corridors; the
/// Conveyor_CQ holding buffers are corridor-split by construction.
/// Moves are never restricted, only load/unload.
pub fn corridor_restriction(point: PathPoint) -> Option<Corridor> {
    match point {
        PathPoint::P0 => Some(Corridor::Lower),
        PathPoint::P9 => Some(Corridor::Upper),
        _ => None,
    }
}

/// Straight-line distance between two path points in a corridor (meters)
pub fn travel_distance(corridor: Corridor, from: PathPoint, to: PathPoint) -> f64 {
    let (x1, y1) = point_coordinates(corridor, from);
    let (x2, y2) = point_coordinates(corridor, to);
    ((x2 - x1).powi(2) + (y2 - y1).powi(2)).sqrt()
}

/// Travel time between two path points at nominal speed (seconds)
pub fn travel_seconds(corridor: Corridor, from: PathPoint, to: PathPoint) -> f64 {
    travel_distance(corridor, from, to) / AGV_SPEED_MPS
}

// ============================================================================
// Stations & processing times
// ============================================================================

/// The three processing stations of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StationKind {
    StationA,
    StationB,
    StationC,
}

impl StationKind {
    /// Device identifier as published on the bus
    pub fn device_id(&self) -> &'static str {
        match self {
            StationKind::StationA => "StationA",
            StationKind::StationB => "StationB",
            StationKind::StationC => "StationC",
        }
    }

    /// Path point where AGVs dock at this station
    pub fn dock_point(&self) -> PathPoint {
        match self {
            StationKind::StationA => PathPoint::P1,
            StationKind::StationB => PathPoint::P3,
            StationKind::StationC => PathPoint::P5,
        }
    }
}

impl fmt::Display for StationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.device_id())
    }
}

/// Processing time range for a (station, product type) pair (seconds)
///
/// Midpoints sum, with nominal conveyor delays, to the theoretical
/// cycle times (P1 160 s, P2 200 s, P3 250 s).
pub fn processing_time_range(station: StationKind, ptype: ProductType) -> (f64, f64) {
    match (station, ptype) {
        (StationKind::StationA, ProductType::P1) => (25.0, 35.0),
        (StationKind::StationA, ProductType::P2) => (35.0, 45.0),
        (StationKind::StationA, ProductType::P3) => (30.0, 40.0),
        (StationKind::StationB, ProductType::P1) => (40.0, 50.0),
        (StationKind::StationB, ProductType::P2) => (55.0, 65.0),
        (StationKind::StationB, ProductType::P3) => (45.0, 55.0),
        (StationKind::StationC, ProductType::P1) => (15.0, 25.0),
        (StationKind::StationC, ProductType::P2) => (25.0, 35.0),
        (StationKind::StationC, ProductType::P3) => (20.0, 30.0),
    }
}

/// Inspection time range at the quality check (seconds)
pub fn inspection_time_range(ptype: ProductType) -> (f64, f64) {
    match ptype {
        ProductType::P1 => (10.0, 20.0),
        ProductType::P2 => (15.0, 25.0),
        ProductType::P3 => (10.0, 20.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_point_round_trip() {
        for point in PathPoint::ALL {
            let parsed: PathPoint = point.to_string().parse().unwrap();
            assert_eq!(parsed, point);
        }
    }

    #[test]
    fn test_invalid_path_point_rejected() {
        assert!("P11".parse::<PathPoint>().is_err());
        assert!("p0".parse::<PathPoint>().is_err());
    }

    #[test]
    fn test_corridors_are_disjoint() {
        for point in PathPoint::ALL {
            let lower = point_coordinates(Corridor::Lower, point);
            let upper = point_coordinates(Corridor::Upper, point);
            assert!(lower.1 < upper.1, "corridor rows must not overlap");
        }
    }

    #[test]
    fn test_corridor_restrictions() {
        assert_eq!(corridor_restriction(PathPoint::P0), Some(Corridor::Lower));
        assert_eq!(corridor_restriction(PathPoint::P9), Some(Corridor::Upper));
        for point in [
            PathPoint::P1,
            PathPoint::P3,
            PathPoint::P5,
            PathPoint::P6,
            PathPoint::P7,
            PathPoint::P8,
            PathPoint::P10,
        ] {
            assert_eq!(corridor_restriction(point), None);
        }
    }

    #[test]
    fn test_travel_seconds_straight_segment() {
        // P0 (5,15) -> P1 (12,15): 7 m at 2 m/s
        let secs = travel_seconds(Corridor::Lower, PathPoint::P0, PathPoint::P1);
        assert!((secs - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_processing_midpoints_match_nominal_route() {
        // P1 nominal: A 30 + B 45 + C 20 + inspection 15
        let mid = |(lo, hi): (f64, f64)| (lo + hi) / 2.0;
        let p1 = mid(processing_time_range(StationKind::StationA, ProductType::P1))
            + mid(processing_time_range(StationKind::StationB, ProductType::P1))
            + mid(processing_time_range(StationKind::StationC, ProductType::P1))
            + mid(inspection_time_range(ProductType::P1));
        assert!((p1 - 110.0).abs() < 1e-9);
    }
}
