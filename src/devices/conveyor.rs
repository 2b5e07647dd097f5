//! Conveyors
//!
//! Time-delayed, capacity-bounded FIFO transport between two stations.
//! Items become visible to the downstream station after the transfer
//! delay; when the downstream buffer is full the item stays on the
//! conveyor, occupying capacity — this is the primary backpressure
//! mechanism of the line.
//!
//! `Conveyor_CQ` on each line additionally carries two named holding
//! sub-buffers (`upper` and `lower`) used exclusively to stage P3
//! products awaiting their second pass through Stations B and C.

use crate::devices::{DeviceCtx, DeviceStatus};
use crate::layout::{Corridor, CONVEYOR_CAPACITY, CONVEYOR_TRANSFER_SECONDS, HOLDING_BUFFER_CAPACITY};
use crate::models::{FactoryEvent, Product};
use std::collections::VecDeque;

/// A product in transit, revealed at `ready_at`
#[derive(Debug, Clone)]
struct InTransit {
    product: Product,
    ready_at: f64,
}

/// Capacity-bounded FIFO conveyor with a fixed transfer delay
#[derive(Debug, Clone)]
pub struct Conveyor {
    id: String,
    capacity: usize,
    transfer_seconds: f64,
    items: VecDeque<InTransit>,
    /// Cumulative seconds with items in motion (utilization KPI)
    working_seconds: f64,
    fault_until: Option<f64>,
    fault_started: Option<f64>,
}

impl Conveyor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capacity: CONVEYOR_CAPACITY,
            transfer_seconds: CONVEYOR_TRANSFER_SECONDS,
            items: VecDeque::new(),
            working_seconds: 0.0,
            fault_until: None,
            fault_started: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> DeviceStatus {
        if self.fault_until.is_some() {
            DeviceStatus::Fault
        } else if self.items.is_empty() {
            DeviceStatus::Idle
        } else {
            DeviceStatus::Processing
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.fault_until.is_some()
    }

    pub fn working_seconds(&self) -> f64 {
        self.working_seconds
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Product IDs on the belt, in order
    pub fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.product.id().to_string()).collect()
    }

    /// Put a product on the conveyor
    ///
    /// Fails (returning the product) when the belt is full or faulted.
    pub fn try_push(&mut self, product: Product, now: f64) -> Result<(), Product> {
        if self.is_faulted() || self.is_full() {
            return Err(product);
        }
        self.items.push_back(InTransit {
            product,
            ready_at: now + self.transfer_seconds,
        });
        Ok(())
    }

    /// True when the head item has finished its transfer
    pub fn head_ready(&self, now: f64) -> bool {
        !self.is_faulted()
            && self
                .items
                .front()
                .is_some_and(|item| now >= item.ready_at)
    }

    /// Remove and return the head item once its delay has elapsed
    pub fn pop_ready(&mut self, now: f64) -> Option<Product> {
        if self.head_ready(now) {
            self.items.pop_front().map(|i| i.product)
        } else {
            None
        }
    }

    /// Put a popped product back at the head, still ready for release
    pub fn restore_front(&mut self, product: Product, now: f64) {
        self.items.push_front(InTransit {
            product,
            ready_at: now,
        });
    }

    /// Mark the conveyor faulted until `until`
    ///
    /// All in-flight motion freezes; remaining transfer times resume
    /// once the fault clears.
    pub fn inject_fault(&mut self, now: f64, until: f64) {
        self.fault_until = Some(until);
        self.fault_started = Some(now);
    }

    /// Advance the conveyor by one tick (fault clear + work accrual)
    pub fn tick(&mut self, ctx: &mut DeviceCtx) {
        if let Some(until) = self.fault_until {
            if ctx.now < until {
                return;
            }
            let outage = until - self.fault_started.unwrap_or(until);
            for item in &mut self.items {
                item.ready_at += outage;
            }
            self.fault_until = None;
            self.fault_started = None;
            ctx.events.log(FactoryEvent::FaultCleared {
                time: ctx.now,
                line: ctx.line.to_string(),
                device_id: self.id.clone(),
            });
        }

        if !self.items.is_empty() {
            self.working_seconds += ctx.dt;
        }
    }
}

// ============================================================================
// Conveyor_CQ with P3 holding buffers
// ============================================================================

/// The Station-C → Quality conveyor with `upper`/`lower` P3 staging
///
/// The main belt behaves exactly like [`Conveyor`]; the two holding
/// sub-buffers are AGV-accessed only. AGV_1 reaches the lower buffer,
/// AGV_2 the upper one.
#[derive(Debug, Clone)]
pub struct HoldingConveyor {
    main: Conveyor,
    upper: VecDeque<Product>,
    lower: VecDeque<Product>,
}

impl HoldingConveyor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            main: Conveyor::new(id),
            upper: VecDeque::new(),
            lower: VecDeque::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.main.id()
    }

    pub fn main(&self) -> &Conveyor {
        &self.main
    }

    pub fn main_mut(&mut self) -> &mut Conveyor {
        &mut self.main
    }

    fn side(&self, corridor: Corridor) -> &VecDeque<Product> {
        match corridor {
            Corridor::Upper => &self.upper,
            Corridor::Lower => &self.lower,
        }
    }

    fn side_mut(&mut self, corridor: Corridor) -> &mut VecDeque<Product> {
        match corridor {
            Corridor::Upper => &mut self.upper,
            Corridor::Lower => &mut self.lower,
        }
    }

    pub fn holding_len(&self, corridor: Corridor) -> usize {
        self.side(corridor).len()
    }

    pub fn holding_full(&self, corridor: Corridor) -> bool {
        self.side(corridor).len() >= HOLDING_BUFFER_CAPACITY
    }

    /// True when neither holding buffer can accept another P3
    pub fn holding_all_full(&self) -> bool {
        self.holding_full(Corridor::Upper) && self.holding_full(Corridor::Lower)
    }

    /// Product IDs in the given holding buffer
    pub fn holding_ids(&self, corridor: Corridor) -> Vec<String> {
        self.side(corridor).iter().map(|p| p.id().to_string()).collect()
    }

    /// Stage a first-pass P3 in a holding buffer, preferring the side
    /// with more room (lower on a tie)
    ///
    /// Fails (returning the product) when both sides are full; the
    /// upstream station must then block.
    pub fn push_holding(&mut self, product: Product) -> Result<Corridor, Product> {
        let corridor = if self.holding_len(Corridor::Lower) <= self.holding_len(Corridor::Upper) {
            Corridor::Lower
        } else {
            Corridor::Upper
        };
        let corridor = if self.holding_full(corridor) {
            match corridor {
                Corridor::Lower => Corridor::Upper,
                Corridor::Upper => Corridor::Lower,
            }
        } else {
            corridor
        };
        if self.holding_full(corridor) {
            return Err(product);
        }
        self.side_mut(corridor).push_back(product);
        Ok(corridor)
    }

    /// Remove the head product from the given holding buffer
    pub fn pop_holding(&mut self, corridor: Corridor) -> Option<Product> {
        self.side_mut(corridor).pop_front()
    }

    /// Total products on main belt and both holding buffers
    pub fn total_products(&self) -> usize {
        self.main.len() + self.upper.len() + self.lower.len()
    }
}
