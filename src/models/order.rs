//! Order model
//!
//! An order groups one or more products demanded from the line. Orders
//! are never removed: they are marked complete once every contained
//! product reaches the finished goods warehouse, and on-time if that
//! happens before the deadline.

use crate::models::product::ProductType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order priority determines the deadline multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderPriority {
    Low,
    Medium,
    High,
}

impl OrderPriority {
    /// Deadline = created + theoretical time × multiplier
    pub fn deadline_multiplier(&self) -> f64 {
        match self {
            OrderPriority::Low => 3.0,
            OrderPriority::Medium => 2.0,
            OrderPriority::High => 1.5,
        }
    }
}

impl fmt::Display for OrderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderPriority::Low => write!(f, "low"),
            OrderPriority::Medium => write!(f, "medium"),
            OrderPriority::High => write!(f, "high"),
        }
    }
}

/// One line item of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_type: ProductType,
    pub quantity: u32,
}

/// An order emitted by the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier, `order_{hex}`
    id: String,
    /// Simulation time of creation (seconds)
    created_at: f64,
    /// Must be fully delivered by this time to count as on-time
    deadline: f64,
    priority: OrderPriority,
    items: Vec<OrderItem>,
    /// Product IDs created for this order
    product_ids: Vec<String>,
    /// Products delivered to finished goods so far
    delivered: u32,
    /// Set when the last product reaches finished goods
    completed_at: Option<f64>,
    /// Whether completion happened before the deadline
    on_time: Option<bool>,
}

impl Order {
    pub fn new(
        id_suffix: &str,
        created_at: f64,
        deadline: f64,
        priority: OrderPriority,
        items: Vec<OrderItem>,
        product_ids: Vec<String>,
    ) -> Self {
        Self {
            id: format!("order_{}", id_suffix),
            created_at,
            deadline,
            priority,
            items,
            product_ids,
            delivered: 0,
            completed_at: None,
            on_time: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn deadline(&self) -> f64 {
        self.deadline
    }

    pub fn priority(&self) -> OrderPriority {
        self.priority
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn product_ids(&self) -> &[String] {
        &self.product_ids
    }

    /// Total number of products the order demands
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn completed_at(&self) -> Option<f64> {
        self.completed_at
    }

    pub fn is_on_time(&self) -> Option<bool> {
        self.on_time
    }

    /// Record one product delivery; returns true if this delivery
    /// completed the order
    pub fn record_delivery(&mut self, now: f64) -> bool {
        if self.is_complete() {
            return false;
        }
        self.delivered += 1;
        if self.delivered >= self.total_quantity() {
            self.completed_at = Some(now);
            self.on_time = Some(now <= self.deadline);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_item_order() -> Order {
        Order::new(
            "beef0001",
            10.0,
            500.0,
            OrderPriority::Medium,
            vec![
                OrderItem {
                    product_type: ProductType::P1,
                    quantity: 1,
                },
                OrderItem {
                    product_type: ProductType::P2,
                    quantity: 1,
                },
            ],
            vec!["prod_P1_a".to_string(), "prod_P2_b".to_string()],
        )
    }

    #[test]
    fn test_completion_requires_all_deliveries() {
        let mut order = two_item_order();
        assert!(!order.record_delivery(100.0));
        assert!(!order.is_complete());

        assert!(order.record_delivery(200.0));
        assert!(order.is_complete());
        assert_eq!(order.is_on_time(), Some(true));
    }

    #[test]
    fn test_late_completion_marked_off_time() {
        let mut order = two_item_order();
        order.record_delivery(100.0);
        order.record_delivery(600.0);
        assert_eq!(order.is_on_time(), Some(false));
    }

    #[test]
    fn test_extra_delivery_ignored() {
        let mut order = two_item_order();
        order.record_delivery(100.0);
        order.record_delivery(200.0);
        assert!(!order.record_delivery(300.0));
        assert_eq!(order.completed_at(), Some(200.0));
    }
}
