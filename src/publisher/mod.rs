//! Publisher surface
//!
//! Serializes device/order/KPI state into JSON payloads and hands them
//! to a [`BusPublisher`]. The message-bus transport itself lives
//! outside the core; the engine only ever talks to the trait. Device
//! snapshots are debounced (≥ 500 ms between publishes per topic) with
//! a low-rate heartbeat for unchanged state.

use crate::devices::DeviceStatus;
use crate::layout::{STATUS_DEBOUNCE_SECONDS, STATUS_HEARTBEAT_SECONDS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Topic namespace
// ============================================================================

/// Builds topic strings under a configurable root prefix
///
/// Root resolution order: `TOPIC_ROOT` env var, then `USERNAME`, then
/// `USER`, then the `NLDF_TEST` default.
#[derive(Debug, Clone)]
pub struct TopicRoot {
    root: String,
}

impl TopicRoot {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the topic root from the environment
    pub fn from_env() -> Self {
        let root = std::env::var("TOPIC_ROOT")
            .or_else(|_| std::env::var("USERNAME"))
            .or_else(|_| std::env::var("USER"))
            .unwrap_or_else(|_| "NLDF_TEST".to_string());
        Self::new(root)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn station_status(&self, line: &str, device: &str) -> String {
        format!("{}/{}/station/{}/status", self.root, line, device)
    }

    pub fn conveyor_status(&self, line: &str, device: &str) -> String {
        format!("{}/{}/conveyor/{}/status", self.root, line, device)
    }

    pub fn agv_status(&self, line: &str, device: &str) -> String {
        format!("{}/{}/agv/{}/status", self.root, line, device)
    }

    pub fn warehouse_status(&self, line: &str, device: &str) -> String {
        format!("{}/{}/warehouse/{}/status", self.root, line, device)
    }

    pub fn alerts(&self, line: &str) -> String {
        format!("{}/{}/alerts", self.root, line)
    }

    pub fn orders_status(&self) -> String {
        format!("{}/orders/status", self.root)
    }

    pub fn kpi_status(&self) -> String {
        format!("{}/kpi/status", self.root)
    }

    pub fn result_status(&self) -> String {
        format!("{}/result/status", self.root)
    }

    pub fn command(&self, line: &str) -> String {
        format!("{}/command/{}", self.root, line)
    }

    pub fn response(&self, line: &str) -> String {
        format!("{}/response/{}", self.root, line)
    }
}

impl Default for TopicRoot {
    fn default() -> Self {
        Self::new("NLDF_TEST")
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Alert published on `ROOT/{line}/alerts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub timestamp: f64,
    pub line: String,
    pub alert_type: String,
    pub device_id: String,
    pub severity: String,
    pub message: String,
}

impl AlertPayload {
    pub fn battery_low(now: f64, line: &str, agv_id: &str, level: f64) -> Self {
        Self {
            timestamp: now,
            line: line.to_string(),
            alert_type: "battery_low".to_string(),
            device_id: agv_id.to_string(),
            severity: "warning".to_string(),
            message: format!("{} battery low ({:.1}%)", agv_id, level),
        }
    }

    pub fn buffer_full(now: f64, line: &str, device_id: &str) -> Self {
        Self {
            timestamp: now,
            line: line.to_string(),
            alert_type: "buffer_full".to_string(),
            device_id: device_id.to_string(),
            severity: "warning".to_string(),
            message: format!("{} buffer is full", device_id),
        }
    }

    pub fn fault(now: f64, line: &str, device_id: &str, symptom: &str, duration: f64) -> Self {
        Self {
            timestamp: now,
            line: line.to_string(),
            alert_type: "fault".to_string(),
            device_id: device_id.to_string(),
            severity: "error".to_string(),
            message: format!("{}: {} (est. {:.0}s)", device_id, symptom, duration),
        }
    }
}

/// Station snapshot published on state change and heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub timestamp: f64,
    pub source_id: String,
    pub status: DeviceStatus,
    pub buffer: Vec<String>,
    pub output: Option<String>,
    pub working_seconds: f64,
}

/// Conveyor snapshot; holding buffers only present on Conveyor_CQ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConveyorSnapshot {
    pub timestamp: f64,
    pub source_id: String,
    pub status: DeviceStatus,
    pub items: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower: Option<Vec<String>>,
}

/// AGV snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgvSnapshot {
    pub timestamp: f64,
    pub source_id: String,
    pub status: DeviceStatus,
    pub current_point: String,
    pub target_point: Option<String>,
    pub estimated_time: f64,
    pub battery_level: f64,
    pub payload: Vec<String>,
}

/// Warehouse snapshot (raw material or finished goods)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseSnapshot {
    pub timestamp: f64,
    pub source_id: String,
    pub status: DeviceStatus,
    pub buffer: Vec<String>,
    pub total: u64,
}

/// Order lifecycle events published on `ROOT/orders/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderStatusPayload {
    NewOrder {
        timestamp: f64,
        order_id: String,
        line: String,
        items: Vec<OrderItemPayload>,
        priority: String,
        deadline: f64,
    },
    OrderComplete {
        timestamp: f64,
        order_id: String,
        line: String,
        on_time: bool,
    },
}

/// One item of a published order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemPayload {
    pub product_type: String,
    pub quantity: u32,
}

// ============================================================================
// Publisher trait & implementations
// ============================================================================

/// Seam between the core and the message-bus transport
///
/// The engine serializes payloads and calls `publish`; implementations
/// forward to MQTT, buffer for a bus thread, or drop everything.
pub trait BusPublisher: Send {
    fn publish(&mut self, topic: &str, payload: String);
}

/// Publisher that drops everything (`--no-mqtt` and unit tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl BusPublisher for NoopPublisher {
    fn publish(&mut self, _topic: &str, _payload: String) {}
}

/// Publisher that buffers messages for an external bus thread to drain
#[derive(Debug, Default)]
pub struct BufferedPublisher {
    messages: Vec<(String, String)>,
}

impl BufferedPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Remove and return everything published so far
    pub fn drain(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.messages)
    }

    /// Peek at buffered messages without draining
    pub fn messages(&self) -> &[(String, String)] {
        &self.messages
    }
}

impl BusPublisher for BufferedPublisher {
    fn publish(&mut self, topic: &str, payload: String) {
        self.messages.push((topic.to_string(), payload));
    }
}

/// Shared handle so a test or bus thread can observe what the engine
/// publishes while the engine owns its own publisher box
impl<P: BusPublisher> BusPublisher for std::sync::Arc<std::sync::Mutex<P>> {
    fn publish(&mut self, topic: &str, payload: String) {
        if let Ok(mut inner) = self.lock() {
            inner.publish(topic, payload);
        }
    }
}

// ============================================================================
// Debouncing
// ============================================================================

/// Per-topic change detection with debounce and heartbeat
///
/// A snapshot goes out when its serialized payload differs from the
/// last published one and the debounce window has elapsed, or when the
/// heartbeat interval has passed with no publish at all.
#[derive(Debug, Default)]
pub struct StatusDebouncer {
    last_payload: HashMap<String, String>,
    last_publish: HashMap<String, f64>,
}

impl StatusDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `payload` should be published on `topic` now
    ///
    /// Records the publish when returning true.
    pub fn should_publish(&mut self, topic: &str, payload: &str, now: f64) -> bool {
        let last_time = self.last_publish.get(topic).copied();
        let changed = self.last_payload.get(topic).map(String::as_str) != Some(payload);

        let due = match last_time {
            None => true,
            Some(t) if changed => now - t >= STATUS_DEBOUNCE_SECONDS,
            Some(t) => now - t >= STATUS_HEARTBEAT_SECONDS,
        };

        if due {
            self.last_payload.insert(topic.to_string(), payload.to_string());
            self.last_publish.insert(topic.to_string(), now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_namespace() {
        let topics = TopicRoot::new("NLDF_TEST");
        assert_eq!(
            topics.station_status("line1", "StationA"),
            "NLDF_TEST/line1/station/StationA/status"
        );
        assert_eq!(topics.command("line2"), "NLDF_TEST/command/line2");
        assert_eq!(topics.kpi_status(), "NLDF_TEST/kpi/status");
    }

    #[test]
    fn test_buffered_publisher_drains() {
        let mut bus = BufferedPublisher::new();
        bus.publish("a/b", "{}".to_string());
        bus.publish("a/c", "{}".to_string());
        assert_eq!(bus.len(), 2);

        let drained = bus.drain();
        assert_eq!(drained.len(), 2);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_debouncer_suppresses_unchanged() {
        let mut debouncer = StatusDebouncer::new();
        assert!(debouncer.should_publish("t", "a", 0.0));
        // Unchanged payload inside the heartbeat window: suppressed.
        assert!(!debouncer.should_publish("t", "a", 5.0));
        // Changed payload after the debounce window: published.
        assert!(debouncer.should_publish("t", "b", 6.0));
        // Heartbeat fires even with no change.
        assert!(debouncer.should_publish("t", "b", 37.0));
    }

    #[test]
    fn test_debouncer_blocks_rapid_changes() {
        let mut debouncer = StatusDebouncer::new();
        assert!(debouncer.should_publish("t", "a", 0.0));
        assert!(!debouncer.should_publish("t", "b", 0.2));
        assert!(debouncer.should_publish("t", "b", 0.7));
    }
}
