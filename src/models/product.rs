//! Product model
//!
//! Represents one item flowing through a production line. Each product
//! has:
//! - Identifier (`prod_{type}_{hex}`) and owning order
//! - Type (P1/P2/P3) which drives processing times, material cost and
//!   quality failure probability
//! - A timestamped history of every handoff and processing step
//! - Quality-check attempt count (0, 1, or 2 = scrapped)
//! - Routing state: how many times it has been processed at Station C
//!   and whether it is on its way back for rework

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Product type determines route, cost and quality behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductType {
    P1,
    P2,
    P3,
}

impl ProductType {
    /// Material cost charged when the product is picked up from the
    /// raw material warehouse (cost units)
    pub fn material_cost(&self) -> f64 {
        match self {
            ProductType::P1 => 10.0,
            ProductType::P2 => 15.0,
            ProductType::P3 => 20.0,
        }
    }

    /// Probability that one quality inspection fails
    pub fn quality_failure_probability(&self) -> f64 {
        match self {
            ProductType::P1 => 0.06,
            ProductType::P2 => 0.08,
            ProductType::P3 => 0.12,
        }
    }

    /// Theoretical cycle time along the nominal route (seconds)
    ///
    /// Used only for KPI normalization and deadline calculation.
    pub fn theoretical_seconds(&self) -> f64 {
        match self {
            ProductType::P1 => 160.0,
            ProductType::P2 => 200.0,
            ProductType::P3 => 250.0,
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductType::P1 => write!(f, "P1"),
            ProductType::P2 => write!(f, "P2"),
            ProductType::P3 => write!(f, "P3"),
        }
    }
}

impl FromStr for ProductType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P1" => Ok(ProductType::P1),
            "P2" => Ok(ProductType::P2),
            "P3" => Ok(ProductType::P3),
            _ => Err(format!(
                "Invalid product type: '{}'. Valid values: P1, P2, P3",
                s
            )),
        }
    }
}

/// Quality inspection outcome recorded on the product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityOutcome {
    /// Passed inspection, headed for finished goods
    Passed,
    /// Failed once, headed back to Station C for rework
    Rework,
    /// Failed twice, removed from the line
    Scrapped,
}

/// One timestamped entry in a product's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Simulation time of the event (seconds)
    pub time: f64,
    /// Short human-readable note ("Loaded onto AGV_1 from RawMaterial")
    pub note: String,
}

/// Where a product on an AGV is allowed to be dropped next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgvDestination {
    StationA,
    StationB,
    StationC,
    FinishedGoods,
}

impl fmt::Display for AgvDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgvDestination::StationA => write!(f, "StationA"),
            AgvDestination::StationB => write!(f, "StationB"),
            AgvDestination::StationC => write!(f, "StationC"),
            AgvDestination::FinishedGoods => write!(f, "Warehouse"),
        }
    }
}

/// A single item flowing through the line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier, `prod_{type}_{hex}`
    id: String,
    /// Product type
    product_type: ProductType,
    /// Order this product belongs to
    order_id: String,
    /// Simulation time of creation (seconds)
    created_at: f64,
    /// Timestamped handoff/processing history
    history: Vec<HistoryEntry>,
    /// Quality inspections failed so far (0, 1, or 2)
    attempts: u8,
    /// Times this product has completed processing at Station C
    station_c_visits: u8,
    /// Index of the current step along the nominal route
    route_step: usize,
    /// Last recorded inspection outcome, if any
    quality_outcome: Option<QualityOutcome>,
    /// True once material cost has been charged (at raw pickup)
    material_charged: bool,
}

impl Product {
    /// Create a new product in the raw material warehouse
    pub fn new(id_suffix: &str, product_type: ProductType, order_id: String, now: f64) -> Self {
        Self {
            id: format!("prod_{}_{}", product_type, id_suffix),
            product_type,
            order_id,
            created_at: now,
            history: Vec::new(),
            attempts: 0,
            station_c_visits: 0,
            route_step: 0,
            quality_outcome: None,
            material_charged: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn product_type(&self) -> ProductType {
        self.product_type
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub fn station_c_visits(&self) -> u8 {
        self.station_c_visits
    }

    pub fn route_step(&self) -> usize {
        self.route_step
    }

    pub fn quality_outcome(&self) -> Option<QualityOutcome> {
        self.quality_outcome
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Append a timestamped note to the product history and advance the
    /// route-step index
    pub fn add_history(&mut self, time: f64, note: impl Into<String>) {
        self.history.push(HistoryEntry {
            time,
            note: note.into(),
        });
        self.route_step += 1;
    }

    /// Record one completed processing pass at Station C
    pub fn record_station_c_visit(&mut self) {
        self.station_c_visits = self.station_c_visits.saturating_add(1);
    }

    /// True for a P3 that just finished its first pass at Station C and
    /// must be staged in the holding buffer for a second pass
    pub fn awaiting_second_pass(&self) -> bool {
        self.product_type == ProductType::P3
            && self.station_c_visits == 1
            && self.attempts == 0
            && self.quality_outcome.is_none()
    }

    /// Record a failed inspection; returns the resulting outcome
    ///
    /// First failure routes the product back to Station C for rework,
    /// the second scraps it.
    pub fn record_quality_failure(&mut self) -> QualityOutcome {
        self.attempts = self.attempts.saturating_add(1);
        let outcome = if self.attempts >= 2 {
            QualityOutcome::Scrapped
        } else {
            QualityOutcome::Rework
        };
        self.quality_outcome = Some(outcome);
        outcome
    }

    /// Record a passed inspection
    pub fn record_quality_pass(&mut self) {
        self.quality_outcome = Some(QualityOutcome::Passed);
    }

    /// Clear the rework marker once the product re-enters Station C
    pub fn begin_rework(&mut self) {
        if self.quality_outcome == Some(QualityOutcome::Rework) {
            self.quality_outcome = None;
        }
    }

    /// True while the product is flagged for rework transport
    pub fn needs_rework(&self) -> bool {
        self.quality_outcome == Some(QualityOutcome::Rework)
    }

    /// Charge material cost exactly once; returns the amount to charge
    /// (zero on repeated calls)
    pub fn charge_material(&mut self) -> f64 {
        if self.material_charged {
            0.0
        } else {
            self.material_charged = true;
            self.product_type.material_cost()
        }
    }

    /// Where an AGV carrying this product may legally drop it
    ///
    /// Derived from routing state: fresh raw material goes to Station A,
    /// a staged first-pass P3 goes back to Station B, a rework-flagged
    /// product goes to Station C, and a passed product goes to the
    /// finished goods warehouse.
    pub fn agv_destination(&self) -> AgvDestination {
        match self.quality_outcome {
            Some(QualityOutcome::Passed) => AgvDestination::FinishedGoods,
            Some(QualityOutcome::Rework) => AgvDestination::StationC,
            _ if self.product_type == ProductType::P3 && self.station_c_visits == 1 => {
                AgvDestination::StationB
            }
            _ => AgvDestination::StationA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p3(now: f64) -> Product {
        Product::new("0000abcd", ProductType::P3, "order_1".to_string(), now)
    }

    #[test]
    fn test_id_format() {
        let product = p3(0.0);
        assert_eq!(product.id(), "prod_P3_0000abcd");
    }

    #[test]
    fn test_material_charged_once() {
        let mut product = p3(0.0);
        assert_eq!(product.charge_material(), 20.0);
        assert_eq!(product.charge_material(), 0.0);
    }

    #[test]
    fn test_quality_failure_progression() {
        let mut product = p3(0.0);
        assert_eq!(product.record_quality_failure(), QualityOutcome::Rework);
        assert!(product.needs_rework());

        product.begin_rework();
        assert!(!product.needs_rework());

        assert_eq!(product.record_quality_failure(), QualityOutcome::Scrapped);
        assert_eq!(product.attempts(), 2);
    }

    #[test]
    fn test_second_pass_staging_only_after_first_c_visit() {
        let mut product = p3(0.0);
        assert!(!product.awaiting_second_pass());

        product.record_station_c_visit();
        assert!(product.awaiting_second_pass());
        assert_eq!(product.agv_destination(), AgvDestination::StationB);

        product.record_station_c_visit();
        assert!(!product.awaiting_second_pass());
    }

    #[test]
    fn test_destination_follows_quality_outcome() {
        let mut product = Product::new("01", ProductType::P1, "order_1".to_string(), 0.0);
        assert_eq!(product.agv_destination(), AgvDestination::StationA);

        product.record_quality_failure();
        assert_eq!(product.agv_destination(), AgvDestination::StationC);

        product.begin_rework();
        product.record_quality_pass();
        assert_eq!(product.agv_destination(), AgvDestination::FinishedGoods);
    }
}
