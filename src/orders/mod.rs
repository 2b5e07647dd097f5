//! Order generation
//!
//! Emits one order every U(30, 60) seconds with weighted quantity,
//! product mix and priority, and creates the demanded products in the
//! raw material warehouse. Deadlines derive from the theoretical cycle
//! time of the ordered mix and the priority multiplier.

use crate::devices::{DeviceCtx, RawMaterial};
use crate::models::{FactoryEvent, Order, OrderItem, OrderPriority, Product, ProductType};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Order generation parameters
///
/// Defaults follow the production rules: quantity 1-5 weighted
/// 40/30/20/7/3, product mix P1 60 % / P2 30 % / P3 10 %, priority
/// low 70 % / medium 25 % / high 5 %.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderGeneratorConfig {
    /// Seconds between orders, sampled uniformly
    pub interval_range: (f64, f64),
    /// Weights for order quantity 1..=5
    pub quantity_weights: [f64; 5],
    /// Weights for product types P1, P2, P3
    pub type_weights: [f64; 3],
    /// Weights for priorities low, medium, high
    pub priority_weights: [f64; 3],
    /// Disable generation entirely (scenario runs)
    pub enabled: bool,
}

impl Default for OrderGeneratorConfig {
    fn default() -> Self {
        Self {
            interval_range: (30.0, 60.0),
            quantity_weights: [0.40, 0.30, 0.20, 0.07, 0.03],
            type_weights: [0.60, 0.30, 0.10],
            priority_weights: [0.70, 0.25, 0.05],
            enabled: true,
        }
    }
}

const PRODUCT_TYPES: [ProductType; 3] = [ProductType::P1, ProductType::P2, ProductType::P3];
const PRIORITIES: [OrderPriority; 3] = [
    OrderPriority::Low,
    OrderPriority::Medium,
    OrderPriority::High,
];

/// Emits orders onto one line
#[derive(Debug, Clone)]
pub struct OrderGenerator {
    config: OrderGeneratorConfig,
    /// Next emission time; sampled lazily on the first tick
    next_order_at: Option<f64>,
}

impl OrderGenerator {
    pub fn new(config: OrderGeneratorConfig) -> Self {
        Self {
            config,
            next_order_at: None,
        }
    }

    pub fn config(&self) -> &OrderGeneratorConfig {
        &self.config
    }

    /// Advance the generator; returns the order emitted this tick, if
    /// any, with its products already stored in `raw`
    pub fn tick(&mut self, ctx: &mut DeviceCtx, raw: &mut RawMaterial) -> Option<Order> {
        if !self.config.enabled {
            return None;
        }

        let due = match self.next_order_at {
            None => {
                let (lo, hi) = self.config.interval_range;
                self.next_order_at = Some(ctx.now + ctx.rng.uniform_f64(lo, hi));
                return None;
            }
            Some(at) => ctx.now >= at,
        };
        if !due {
            return None;
        }

        let (lo, hi) = self.config.interval_range;
        self.next_order_at = Some(ctx.now + ctx.rng.uniform_f64(lo, hi));

        Some(self.generate(ctx, raw))
    }

    fn generate(&mut self, ctx: &mut DeviceCtx, raw: &mut RawMaterial) -> Order {
        let order_suffix = ctx.rng.hex_id();
        let order_id = format!("order_{}", order_suffix);

        let quantity = 1 + ctx.rng.weighted_choice(&self.config.quantity_weights) as u32;
        let priority = PRIORITIES[ctx.rng.weighted_choice(&self.config.priority_weights)];

        // Draw each product's type independently, then collapse into
        // (type, quantity) items.
        let mut counts = [0u32; 3];
        let mut theoretical = 0.0;
        let mut product_ids = Vec::with_capacity(quantity as usize);
        for _ in 0..quantity {
            let idx = ctx.rng.weighted_choice(&self.config.type_weights);
            let ptype = PRODUCT_TYPES[idx];
            counts[idx] += 1;
            theoretical += ptype.theoretical_seconds();

            let mut product = Product::new(&ctx.rng.hex_id(), ptype, order_id.clone(), ctx.now);
            product.add_history(ctx.now, "Raw material created at RawMaterial");
            product_ids.push(product.id().to_string());
            ctx.events.log(FactoryEvent::ProductCreated {
                time: ctx.now,
                line: ctx.line.to_string(),
                product_id: product.id().to_string(),
                order_id: order_id.clone(),
            });
            raw.store(product);
        }

        let items: Vec<OrderItem> = PRODUCT_TYPES
            .iter()
            .zip(counts)
            .filter(|(_, n)| *n > 0)
            .map(|(ptype, n)| OrderItem {
                product_type: *ptype,
                quantity: n,
            })
            .collect();

        let deadline = ctx.now + theoretical * priority.deadline_multiplier();
        let order = Order::new(
            &order_suffix,
            ctx.now,
            deadline,
            priority,
            items,
            product_ids,
        );

        info!(
            line = ctx.line,
            order = order.id(),
            quantity,
            %priority,
            deadline,
            "order generated"
        );
        ctx.events.log(FactoryEvent::OrderCreated {
            time: ctx.now,
            line: ctx.line.to_string(),
            order_id: order.id().to_string(),
            num_products: quantity,
            priority: priority.to_string(),
            deadline,
        });

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventLog;
    use crate::rng::RngManager;

    fn run_generator(seed: u64, seconds: usize) -> (Vec<Order>, RawMaterial) {
        let mut generator = OrderGenerator::new(OrderGeneratorConfig::default());
        let mut raw = RawMaterial::new();
        let mut rng = RngManager::new(seed);
        let mut events = EventLog::new();
        let mut alerts = Vec::new();
        let mut orders = Vec::new();

        for t in 0..seconds {
            let mut ctx = DeviceCtx {
                now: t as f64,
                dt: 1.0,
                line: "line1",
                rng: &mut rng,
                events: &mut events,
                alerts: &mut alerts,
            };
            if let Some(order) = generator.tick(&mut ctx, &mut raw) {
                orders.push(order);
            }
        }
        (orders, raw)
    }

    #[test]
    fn test_emission_interval_bounds() {
        let (orders, _) = run_generator(42, 700);
        // 700 s of U(30, 60) intervals: between ~11 and ~23 orders.
        assert!(
            (8..=24).contains(&orders.len()),
            "unexpected order count {}",
            orders.len()
        );
    }

    #[test]
    fn test_products_created_in_raw_material() {
        let (orders, raw) = run_generator(42, 700);
        let demanded: u32 = orders.iter().map(|o| o.total_quantity()).sum();
        assert_eq!(raw.total_supplied(), demanded as u64);
        assert_eq!(raw.len() as u64, raw.total_supplied());
    }

    #[test]
    fn test_deadline_uses_priority_multiplier() {
        let (orders, _) = run_generator(7, 2000);
        for order in &orders {
            let theoretical: f64 = order
                .items()
                .iter()
                .map(|i| i.product_type.theoretical_seconds() * i.quantity as f64)
                .sum();
            let expected =
                order.created_at() + theoretical * order.priority().deadline_multiplier();
            assert!((order.deadline() - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_type_mix_skews_toward_p1() {
        let (orders, _) = run_generator(123, 20_000);
        let mut p1 = 0u32;
        let mut total = 0u32;
        for order in &orders {
            for item in order.items() {
                total += item.quantity;
                if item.product_type == ProductType::P1 {
                    p1 += item.quantity;
                }
            }
        }
        let share = p1 as f64 / total as f64;
        assert!(
            (0.45..0.75).contains(&share),
            "P1 share {:.2} out of expected band",
            share
        );
    }

    #[test]
    fn test_disabled_generator_is_silent() {
        let mut config = OrderGeneratorConfig::default();
        config.enabled = false;
        let mut generator = OrderGenerator::new(config);
        let mut raw = RawMaterial::new();
        let mut rng = RngManager::new(1);
        let mut events = EventLog::new();
        let mut alerts = Vec::new();

        for t in 0..500 {
            let mut ctx = DeviceCtx {
                now: t as f64,
                dt: 1.0,
                line: "line1",
                rng: &mut rng,
                events: &mut events,
                alerts: &mut alerts,
            };
            assert!(generator.tick(&mut ctx, &mut raw).is_none());
        }
    }
}
