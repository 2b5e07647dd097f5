//! Warehouses
//!
//! The raw material warehouse is the source of the line: the order
//! generator creates products here and AGVs pick them up by ID. The
//! finished goods warehouse is the append-only sink. Both are
//! unbounded.

use crate::models::{Product, ProductType};
use std::collections::HashMap;

/// Raw material warehouse (line source)
#[derive(Debug, Clone, Default)]
pub struct RawMaterial {
    products: Vec<Product>,
    total_supplied: u64,
    supplied_by_type: HashMap<ProductType, u64>,
}

impl RawMaterial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device identifier as published on the bus
    pub fn id(&self) -> &'static str {
        "RawMaterial"
    }

    /// Store a freshly created product
    pub fn store(&mut self, product: Product) {
        self.total_supplied += 1;
        *self
            .supplied_by_type
            .entry(product.product_type())
            .or_insert(0) += 1;
        self.products.push(product);
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.products.iter().any(|p| p.id() == product_id)
    }

    /// Remove a specific product for AGV pickup
    pub fn take(&mut self, product_id: &str) -> Option<Product> {
        let idx = self.products.iter().position(|p| p.id() == product_id)?;
        Some(self.products.remove(idx))
    }

    /// Product IDs currently available, in creation order
    pub fn product_ids(&self) -> Vec<String> {
        self.products.iter().map(|p| p.id().to_string()).collect()
    }

    /// Total products ever supplied
    pub fn total_supplied(&self) -> u64 {
        self.total_supplied
    }

    /// Products ever supplied for one type
    pub fn supplied_of_type(&self, ptype: ProductType) -> u64 {
        self.supplied_by_type.get(&ptype).copied().unwrap_or(0)
    }
}

/// Finished goods warehouse (line sink, append-only)
#[derive(Debug, Clone, Default)]
pub struct FinishedGoods {
    products: Vec<Product>,
}

impl FinishedGoods {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device identifier as published on the bus
    pub fn id(&self) -> &'static str {
        "Warehouse"
    }

    /// Accept a delivered product
    pub fn store(&mut self, product: Product) {
        self.products.push(product);
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn contains(&self, product_id: &str) -> bool {
        self.products.iter().any(|p| p.id() == product_id)
    }

    /// Delivered products, in arrival order
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Product IDs delivered so far
    pub fn product_ids(&self) -> Vec<String> {
        self.products.iter().map(|p| p.id().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, ptype: ProductType) -> Product {
        Product::new(id, ptype, "order_1".to_string(), 0.0)
    }

    #[test]
    fn test_take_by_id() {
        let mut raw = RawMaterial::new();
        raw.store(product("00000001", ProductType::P1));
        raw.store(product("00000002", ProductType::P2));

        assert!(raw.contains("prod_P2_00000002"));
        let taken = raw.take("prod_P2_00000002").unwrap();
        assert_eq!(taken.product_type(), ProductType::P2);
        assert!(!raw.contains("prod_P2_00000002"));
        assert_eq!(raw.len(), 1);
        assert_eq!(raw.total_supplied(), 2);
    }

    #[test]
    fn test_take_unknown_id_fails() {
        let mut raw = RawMaterial::new();
        assert!(raw.take("prod_P1_missing0").is_none());
    }

    #[test]
    fn test_finished_goods_append_only() {
        let mut sink = FinishedGoods::new();
        sink.store(product("00000001", ProductType::P1));
        sink.store(product("00000002", ProductType::P1));
        assert_eq!(sink.len(), 2);
        assert!(sink.contains("prod_P1_00000001"));
    }
}
