//! Event logging for simulation replay and auditing.
//!
//! Every significant state transition in the factory is recorded as a
//! [`FactoryEvent`]. The KPI aggregator consumes these incrementally;
//! tests use the log to assert on complete simulation histories.
//!
//! # Event categories
//!
//! - **Orders**: created, completed
//! - **Products**: created, delivered, scrapped
//! - **Processing**: station/quality start and finish
//! - **Quality**: pass, rework
//! - **AGV**: task completion/failure, charge start/finish
//! - **Faults**: injected, cleared
//! - **Commands**: accepted, rejected

/// Simulation event capturing a state change.
///
/// All events carry a simulation time in seconds. Events are logged in
/// the order they occur within a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum FactoryEvent {
    /// Order generator emitted a new order
    OrderCreated {
        time: f64,
        line: String,
        order_id: String,
        num_products: u32,
        priority: String,
        deadline: f64,
    },

    /// All products of an order reached finished goods
    OrderCompleted {
        time: f64,
        line: String,
        order_id: String,
        on_time: bool,
    },

    /// Raw material warehouse created a product
    ProductCreated {
        time: f64,
        line: String,
        product_id: String,
        order_id: String,
    },

    /// Product arrived at the finished goods warehouse
    ProductDelivered {
        time: f64,
        line: String,
        product_id: String,
        cycle_seconds: f64,
    },

    /// Product failed quality twice and was removed
    ProductScrapped {
        time: f64,
        line: String,
        product_id: String,
        scrap_cost: f64,
    },

    /// Station or quality check began processing a product
    ProcessingStarted {
        time: f64,
        line: String,
        device_id: String,
        product_id: String,
    },

    /// Station or quality check finished processing a product
    ProcessingFinished {
        time: f64,
        line: String,
        device_id: String,
        product_id: String,
    },

    /// Quality inspection passed
    QualityPassed {
        time: f64,
        line: String,
        product_id: String,
    },

    /// Quality inspection failed; product routed back for rework
    QualityRework {
        time: f64,
        line: String,
        product_id: String,
    },

    /// Fault injector disabled a device
    FaultInjected {
        time: f64,
        line: String,
        device_id: String,
        symptom: String,
        duration: f64,
    },

    /// Fault timer expired; device back in service
    FaultCleared {
        time: f64,
        line: String,
        device_id: String,
    },

    /// Agent command validated and queued (or executed immediately)
    CommandAccepted {
        time: f64,
        line: String,
        command_id: Option<String>,
        action: String,
        target: String,
    },

    /// Agent command rejected before any side effect
    CommandRejected {
        time: f64,
        line: String,
        command_id: Option<String>,
        reason: String,
    },

    /// AGV finished a queued action successfully
    AgvTaskCompleted {
        time: f64,
        line: String,
        agv_id: String,
        description: String,
    },

    /// AGV action failed (rejection, fault, forced charge)
    AgvTaskFailed {
        time: f64,
        line: String,
        agv_id: String,
        reason: String,
    },

    /// AGV started charging
    ChargeStarted {
        time: f64,
        line: String,
        agv_id: String,
        proactive: bool,
        target_level: f64,
    },

    /// AGV reached its charge target
    ChargeCompleted {
        time: f64,
        line: String,
        agv_id: String,
        level: f64,
    },
}

impl FactoryEvent {
    /// Simulation time at which the event occurred (seconds)
    pub fn time(&self) -> f64 {
        match self {
            FactoryEvent::OrderCreated { time, .. } => *time,
            FactoryEvent::OrderCompleted { time, .. } => *time,
            FactoryEvent::ProductCreated { time, .. } => *time,
            FactoryEvent::ProductDelivered { time, .. } => *time,
            FactoryEvent::ProductScrapped { time, .. } => *time,
            FactoryEvent::ProcessingStarted { time, .. } => *time,
            FactoryEvent::ProcessingFinished { time, .. } => *time,
            FactoryEvent::QualityPassed { time, .. } => *time,
            FactoryEvent::QualityRework { time, .. } => *time,
            FactoryEvent::FaultInjected { time, .. } => *time,
            FactoryEvent::FaultCleared { time, .. } => *time,
            FactoryEvent::CommandAccepted { time, .. } => *time,
            FactoryEvent::CommandRejected { time, .. } => *time,
            FactoryEvent::AgvTaskCompleted { time, .. } => *time,
            FactoryEvent::AgvTaskFailed { time, .. } => *time,
            FactoryEvent::ChargeStarted { time, .. } => *time,
            FactoryEvent::ChargeCompleted { time, .. } => *time,
        }
    }

    /// Short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            FactoryEvent::OrderCreated { .. } => "OrderCreated",
            FactoryEvent::OrderCompleted { .. } => "OrderCompleted",
            FactoryEvent::ProductCreated { .. } => "ProductCreated",
            FactoryEvent::ProductDelivered { .. } => "ProductDelivered",
            FactoryEvent::ProductScrapped { .. } => "ProductScrapped",
            FactoryEvent::ProcessingStarted { .. } => "ProcessingStarted",
            FactoryEvent::ProcessingFinished { .. } => "ProcessingFinished",
            FactoryEvent::QualityPassed { .. } => "QualityPassed",
            FactoryEvent::QualityRework { .. } => "QualityRework",
            FactoryEvent::FaultInjected { .. } => "FaultInjected",
            FactoryEvent::FaultCleared { .. } => "FaultCleared",
            FactoryEvent::CommandAccepted { .. } => "CommandAccepted",
            FactoryEvent::CommandRejected { .. } => "CommandRejected",
            FactoryEvent::AgvTaskCompleted { .. } => "AgvTaskCompleted",
            FactoryEvent::AgvTaskFailed { .. } => "AgvTaskFailed",
            FactoryEvent::ChargeStarted { .. } => "ChargeStarted",
            FactoryEvent::ChargeCompleted { .. } => "ChargeCompleted",
        }
    }

    /// Product ID if the event relates to a specific product
    pub fn product_id(&self) -> Option<&str> {
        match self {
            FactoryEvent::ProductCreated { product_id, .. } => Some(product_id),
            FactoryEvent::ProductDelivered { product_id, .. } => Some(product_id),
            FactoryEvent::ProductScrapped { product_id, .. } => Some(product_id),
            FactoryEvent::ProcessingStarted { product_id, .. } => Some(product_id),
            FactoryEvent::ProcessingFinished { product_id, .. } => Some(product_id),
            FactoryEvent::QualityPassed { product_id, .. } => Some(product_id),
            FactoryEvent::QualityRework { product_id, .. } => Some(product_id),
            _ => None,
        }
    }

    /// Device ID if the event relates to a specific device
    pub fn device_id(&self) -> Option<&str> {
        match self {
            FactoryEvent::ProcessingStarted { device_id, .. } => Some(device_id),
            FactoryEvent::ProcessingFinished { device_id, .. } => Some(device_id),
            FactoryEvent::FaultInjected { device_id, .. } => Some(device_id),
            FactoryEvent::FaultCleared { device_id, .. } => Some(device_id),
            FactoryEvent::AgvTaskCompleted { agv_id, .. } => Some(agv_id),
            FactoryEvent::AgvTaskFailed { agv_id, .. } => Some(agv_id),
            FactoryEvent::ChargeStarted { agv_id, .. } => Some(agv_id),
            FactoryEvent::ChargeCompleted { agv_id, .. } => Some(agv_id),
            _ => None,
        }
    }
}

/// Event log for storing and querying simulation events.
///
/// A simple wrapper around `Vec<FactoryEvent>` with convenience
/// queries.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<FactoryEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn log(&mut self, event: FactoryEvent) {
        self.events.push(event);
    }

    /// Number of events logged
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events
    pub fn events(&self) -> &[FactoryEvent] {
        &self.events
    }

    /// Events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&FactoryEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Events for a specific product
    pub fn events_for_product(&self, product_id: &str) -> Vec<&FactoryEvent> {
        self.events
            .iter()
            .filter(|e| e.product_id() == Some(product_id))
            .collect()
    }

    /// Events for a specific device
    pub fn events_for_device(&self, device_id: &str) -> Vec<&FactoryEvent> {
        self.events
            .iter()
            .filter(|e| e.device_id() == Some(device_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = FactoryEvent::ProcessingStarted {
            time: 42.0,
            line: "line1".to_string(),
            device_id: "StationA".to_string(),
            product_id: "prod_P1_0000cafe".to_string(),
        };

        assert_eq!(event.time(), 42.0);
        assert_eq!(event.event_type(), "ProcessingStarted");
        assert_eq!(event.product_id(), Some("prod_P1_0000cafe"));
        assert_eq!(event.device_id(), Some("StationA"));
    }

    #[test]
    fn test_event_log_queries() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.log(FactoryEvent::ProductCreated {
            time: 1.0,
            line: "line1".to_string(),
            product_id: "prod_P1_01".to_string(),
            order_id: "order_01".to_string(),
        });
        log.log(FactoryEvent::ProcessingStarted {
            time: 2.0,
            line: "line1".to_string(),
            device_id: "StationA".to_string(),
            product_id: "prod_P1_01".to_string(),
        });
        log.log(FactoryEvent::FaultInjected {
            time: 3.0,
            line: "line1".to_string(),
            device_id: "StationA".to_string(),
            symptom: "station_vibration".to_string(),
            duration: 30.0,
        });

        assert_eq!(log.len(), 3);
        assert_eq!(log.events_of_type("ProcessingStarted").len(), 1);
        assert_eq!(log.events_for_product("prod_P1_01").len(), 2);
        assert_eq!(log.events_for_device("StationA").len(), 2);
    }
}
