//! Factory Simulator Core - Rust Engine
//!
//! Discrete-event simulator of a small multi-line manufacturing
//! factory. External agents connect over a message bus, observe device
//! state and issue high-level control commands; the simulator owns the
//! authoritative world state and scores agent behavior against a set
//! of KPIs.
//!
//! # Architecture
//!
//! - **core**: Simulation clock
//! - **models**: Domain types (Product, Order, events)
//! - **devices**: Stations, conveyors, warehouses, quality check, AGVs
//! - **layout**: Path points, coordinates, processing tables
//! - **orders**: Order generation
//! - **faults**: Fault injection
//! - **commands**: Agent command schema and validation
//! - **kpi**: Counters, derived metrics, scored breakdown
//! - **publisher**: Topic namespace and the bus seam
//! - **line**: One production line's routing and AGV dispatch
//! - **orchestrator**: Main simulation loop
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. All randomness is deterministic (one seeded RNG)
//! 2. World state is mutated on a single thread in a stable phase order
//! 3. No product is created or destroyed outside the warehouse
//!    endpoints and the scrap path

// Module declarations
pub mod commands;
pub mod core;
pub mod devices;
pub mod faults;
pub mod kpi;
pub mod layout;
pub mod line;
pub mod models;
pub mod orchestrator;
pub mod orders;
pub mod publisher;
pub mod rng;

// Re-exports for convenience
pub use crate::core::time::SimClock;
pub use commands::{parse_command, AgentCommand, CommandError, CommandResponse};
pub use devices::{
    Agv, AgvAction, AgvStats, Conveyor, DeviceStatus, FinishedGoods, HoldingConveyor,
    QualityChecker, RawMaterial, Station,
};
pub use faults::{FaultConfig, FaultInjector, FaultTarget};
pub use kpi::{KpiCalculator, KpiSnapshot, ScoreBreakdown};
pub use layout::{Corridor, PathPoint, StationKind};
pub use line::ProductionLine;
pub use models::{
    EventLog, FactoryEvent, Order, OrderItem, OrderPriority, Product, ProductType,
};
pub use orchestrator::{FactoryConfig, FactoryEngine, SimulationError, TickResult};
pub use orders::{OrderGenerator, OrderGeneratorConfig};
pub use publisher::{BufferedPublisher, BusPublisher, NoopPublisher, TopicRoot};
pub use rng::RngManager;
