//! Simulation orchestration

mod engine;

pub use engine::{FactoryConfig, FactoryEngine, SimulationError, TickResult};
