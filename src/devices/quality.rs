//! Quality check station
//!
//! Inspects each product for a sampled duration, then draws the
//! outcome from the product type's failure probability. Passed
//! products are staged in the output buffer for AGV pickup to finished
//! goods; a first failure stages the product for rework transport back
//! to Station C; a second failure scraps it.

use crate::devices::{DeviceCtx, DeviceStatus};
use crate::layout::{inspection_time_range, QUALITY_BUFFER_CAPACITY, QUALITY_OUTPUT_CAPACITY};
use crate::models::{FactoryEvent, Product, QualityOutcome};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone)]
struct ActiveJob {
    product: Product,
    finish_at: f64,
}

/// Outcome of an inspection that completed this tick
#[derive(Debug)]
pub enum QualityVerdict {
    Passed {
        product_id: String,
        /// True when the product passed on its first attempt
        first_pass: bool,
    },
    Rework {
        product_id: String,
    },
    /// Second failure; the product leaves the line
    Scrapped {
        product: Product,
    },
}

/// The quality check device of one line
#[derive(Debug, Clone)]
pub struct QualityChecker {
    buffer: VecDeque<Product>,
    active: Option<ActiveJob>,
    /// Inspected products awaiting AGV pickup (passed or rework)
    output: VecDeque<Product>,
    working_seconds: f64,
    fault_until: Option<f64>,
    fault_started: Option<f64>,
    inspected_count: u64,
    passed_count: u64,
    rework_count: u64,
    scrapped_count: u64,
    /// Inspections forced to fail regardless of the random draw
    forced_failures: u8,
    /// Inspections forced to pass regardless of the random draw
    forced_passes: u8,
}

impl QualityChecker {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
            active: None,
            output: VecDeque::new(),
            working_seconds: 0.0,
            fault_until: None,
            fault_started: None,
            inspected_count: 0,
            passed_count: 0,
            rework_count: 0,
            scrapped_count: 0,
            forced_failures: 0,
            forced_passes: 0,
        }
    }

    /// Force the next `n` inspections to fail regardless of the draw
    ///
    /// Scenario tooling: lets tests and scripted demos seed quality
    /// failures without fishing for an RNG seed.
    pub fn force_failures(&mut self, n: u8) {
        self.forced_failures = self.forced_failures.saturating_add(n);
    }

    /// Force the next `n` inspections to pass regardless of the draw
    pub fn force_passes(&mut self, n: u8) {
        self.forced_passes = self.forced_passes.saturating_add(n);
    }

    /// Device identifier as published on the bus
    pub fn id(&self) -> &'static str {
        "QualityCheck"
    }

    pub fn status(&self) -> DeviceStatus {
        if self.fault_until.is_some() {
            DeviceStatus::Fault
        } else if self.active.is_some() {
            DeviceStatus::Processing
        } else if self.output.len() >= QUALITY_OUTPUT_CAPACITY {
            DeviceStatus::Blocked
        } else {
            DeviceStatus::Idle
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.fault_until.is_some()
    }

    pub fn working_seconds(&self) -> f64 {
        self.working_seconds
    }

    pub fn buffer_level(&self) -> usize {
        self.buffer.len()
    }

    pub fn output_level(&self) -> usize {
        self.output.len()
    }

    pub fn buffer_ids(&self) -> Vec<String> {
        self.buffer.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn output_ids(&self) -> Vec<String> {
        self.output.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn inspected_count(&self) -> u64 {
        self.inspected_count
    }

    pub fn passed_count(&self) -> u64 {
        self.passed_count
    }

    pub fn rework_count(&self) -> u64 {
        self.rework_count
    }

    pub fn scrapped_count(&self) -> u64 {
        self.scrapped_count
    }

    /// Total products held (buffer + in process + output staging)
    pub fn total_products(&self) -> usize {
        self.buffer.len() + usize::from(self.active.is_some()) + self.output.len()
    }

    /// Admit a product to the inspection buffer
    pub fn try_enqueue(&mut self, product: Product) -> Result<(), Product> {
        if self.is_faulted() || self.buffer.len() >= QUALITY_BUFFER_CAPACITY {
            return Err(product);
        }
        self.buffer.push_back(product);
        Ok(())
    }

    /// True when an inspected product awaits AGV pickup
    pub fn is_ready_out(&self) -> bool {
        !self.output.is_empty()
    }

    /// Remove the head product from the output staging area
    pub fn take_output(&mut self) -> Option<Product> {
        self.output.pop_front()
    }

    pub fn inject_fault(&mut self, now: f64, until: f64) {
        self.fault_until = Some(until);
        self.fault_started = Some(now);
    }

    /// Advance the quality check by one tick
    ///
    /// Returns the verdict of the inspection that completed this tick,
    /// if any.
    pub fn tick(&mut self, ctx: &mut DeviceCtx) -> Option<QualityVerdict> {
        if let Some(until) = self.fault_until {
            if ctx.now < until {
                return None;
            }
            let outage = until - self.fault_started.unwrap_or(until);
            if let Some(job) = &mut self.active {
                job.finish_at += outage;
            }
            self.fault_until = None;
            self.fault_started = None;
            ctx.events.log(FactoryEvent::FaultCleared {
                time: ctx.now,
                line: ctx.line.to_string(),
                device_id: self.id().to_string(),
            });
        }

        let mut verdict = None;

        // Complete the active inspection; staging requires output room.
        let job_done = self
            .active
            .as_ref()
            .is_some_and(|job| ctx.now >= job.finish_at);
        if job_done && self.output.len() < QUALITY_OUTPUT_CAPACITY {
            let mut product = self.active.take().expect("checked above").product;
            self.inspected_count += 1;
            ctx.events.log(FactoryEvent::ProcessingFinished {
                time: ctx.now,
                line: ctx.line.to_string(),
                device_id: self.id().to_string(),
                product_id: product.id().to_string(),
            });

            let failed = if self.forced_failures > 0 {
                self.forced_failures -= 1;
                true
            } else if self.forced_passes > 0 {
                self.forced_passes -= 1;
                false
            } else {
                ctx.rng
                    .bernoulli(product.product_type().quality_failure_probability())
            };
            if !failed {
                let first_pass = product.attempts() == 0;
                product.record_quality_pass();
                product.add_history(ctx.now, "Passed quality inspection");
                self.passed_count += 1;
                ctx.events.log(FactoryEvent::QualityPassed {
                    time: ctx.now,
                    line: ctx.line.to_string(),
                    product_id: product.id().to_string(),
                });
                verdict = Some(QualityVerdict::Passed {
                    product_id: product.id().to_string(),
                    first_pass,
                });
                self.output.push_back(product);
            } else {
                match product.record_quality_failure() {
                    QualityOutcome::Rework => {
                        product.add_history(ctx.now, "Failed inspection, staged for rework");
                        self.rework_count += 1;
                        ctx.events.log(FactoryEvent::QualityRework {
                            time: ctx.now,
                            line: ctx.line.to_string(),
                            product_id: product.id().to_string(),
                        });
                        verdict = Some(QualityVerdict::Rework {
                            product_id: product.id().to_string(),
                        });
                        self.output.push_back(product);
                    }
                    _ => {
                        self.scrapped_count += 1;
                        debug!(
                            line = ctx.line,
                            product = product.id(),
                            "second inspection failure, scrapping"
                        );
                        verdict = Some(QualityVerdict::Scrapped { product });
                    }
                }
            }
        }

        // Start the next inspection.
        if self.active.is_none() {
            if let Some(mut product) = self.buffer.pop_front() {
                let (lo, hi) = inspection_time_range(product.product_type());
                let duration = ctx.rng.uniform_f64(lo, hi);
                product.add_history(ctx.now, "Entered quality inspection");
                ctx.events.log(FactoryEvent::ProcessingStarted {
                    time: ctx.now,
                    line: ctx.line.to_string(),
                    device_id: self.id().to_string(),
                    product_id: product.id().to_string(),
                });
                self.active = Some(ActiveJob {
                    product,
                    finish_at: ctx.now + duration,
                });
            }
        }

        if self.active.is_some() {
            self.working_seconds += ctx.dt;
        }

        verdict
    }
}

impl Default for QualityChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventLog, ProductType};
    use crate::rng::RngManager;

    fn run_until_output(
        qc: &mut QualityChecker,
        rng: &mut RngManager,
        ticks: usize,
    ) -> Option<Product> {
        let mut events = EventLog::new();
        let mut alerts = Vec::new();
        let mut now = 0.0;
        let mut scrapped = None;
        for _ in 0..ticks {
            let mut ctx = DeviceCtx {
                now,
                dt: 1.0,
                line: "line1",
                rng,
                events: &mut events,
                alerts: &mut alerts,
            };
            if let Some(QualityVerdict::Scrapped { product }) = qc.tick(&mut ctx) {
                scrapped = Some(product);
            }
            now += 1.0;
        }
        scrapped
    }

    #[test]
    fn test_buffer_capacity() {
        let mut qc = QualityChecker::new();
        for i in 0..QUALITY_BUFFER_CAPACITY {
            let p = Product::new(&format!("{:08}", i), ProductType::P1, "o".to_string(), 0.0);
            assert!(qc.try_enqueue(p).is_ok());
        }
        let extra = Product::new("overflow1", ProductType::P1, "o".to_string(), 0.0);
        assert!(qc.try_enqueue(extra).is_err());
    }

    #[test]
    fn test_pass_stages_for_pickup() {
        let mut qc = QualityChecker::new();
        qc.force_passes(1);
        let p = Product::new("00000001", ProductType::P1, "o".to_string(), 0.0);
        qc.try_enqueue(p).unwrap();

        let mut rng = RngManager::new(42);
        let scrapped = run_until_output(&mut qc, &mut rng, 30);

        assert!(scrapped.is_none());
        assert!(qc.is_ready_out());
        let out = qc.take_output().unwrap();
        assert_eq!(out.quality_outcome(), Some(QualityOutcome::Passed));
        assert_eq!(qc.passed_count(), 1);
    }

    #[test]
    fn test_forced_failure_routes_to_rework() {
        let mut qc = QualityChecker::new();
        qc.force_failures(1);
        let p = Product::new("00000001", ProductType::P1, "o".to_string(), 0.0);
        qc.try_enqueue(p).unwrap();

        let mut rng = RngManager::new(42);
        run_until_output(&mut qc, &mut rng, 30);

        let out = qc.take_output().unwrap();
        assert_eq!(out.quality_outcome(), Some(QualityOutcome::Rework));
        assert_eq!(out.attempts(), 1);
        assert_eq!(qc.rework_count(), 1);
    }

    #[test]
    fn test_double_failure_scraps() {
        let mut qc = QualityChecker::new();
        qc.force_failures(1);
        let mut p = Product::new("00000001", ProductType::P3, "o".to_string(), 0.0);
        // Simulate an earlier failed inspection and completed rework.
        p.record_quality_failure();
        p.begin_rework();
        qc.try_enqueue(p).unwrap();

        let mut rng = RngManager::new(42);
        let scrapped = run_until_output(&mut qc, &mut rng, 30).expect("second failure must scrap");

        assert_eq!(scrapped.attempts(), 2);
        assert_eq!(qc.scrapped_count(), 1);
        assert!(!qc.is_ready_out());
    }
}
