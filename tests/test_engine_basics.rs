//! Integration tests for engine construction and the tick loop

use factory_simulator_core_rs::{FactoryConfig, FactoryEngine};

fn quiet_config() -> FactoryConfig {
    let mut config = FactoryConfig::default();
    config.num_lines = 1;
    config.order_config.enabled = false;
    config.fault_config.enabled = false;
    config.topic_root = Some("TEST".to_string());
    config
}

#[test]
fn test_engine_starts_at_zero() {
    let engine = FactoryEngine::new(quiet_config()).unwrap();
    assert_eq!(engine.now(), 0.0);
    assert!(!engine.is_finished());
    assert_eq!(engine.num_lines(), 1);
}

#[test]
fn test_tick_advances_clock() {
    let mut engine = FactoryEngine::new(quiet_config()).unwrap();
    let result = engine.tick();
    assert_eq!(result.time, 0.0);
    assert_eq!(engine.now(), 1.0);
}

#[test]
fn test_three_lines_by_default() {
    let mut config = FactoryConfig::default();
    config.topic_root = Some("TEST".to_string());
    let engine = FactoryEngine::new(config).unwrap();
    assert_eq!(engine.num_lines(), 3);
    assert_eq!(engine.line(0).unwrap().name(), "line1");
    assert_eq!(engine.line(2).unwrap().name(), "line3");
}

#[test]
fn test_invalid_config_rejected() {
    let mut config = quiet_config();
    config.tick_seconds = 0.0;
    assert!(FactoryEngine::new(config).is_err());

    let mut config = quiet_config();
    config.num_lines = 0;
    assert!(FactoryEngine::new(config).is_err());

    let mut config = quiet_config();
    config.duration_seconds = -1.0;
    assert!(FactoryEngine::new(config).is_err());

    let mut config = quiet_config();
    config.order_config.interval_range = (60.0, 30.0);
    assert!(FactoryEngine::new(config).is_err());
}

#[test]
fn test_run_to_end_stops_at_horizon() {
    let mut config = quiet_config();
    config.duration_seconds = 120.0;
    let mut engine = FactoryEngine::new(config).unwrap();
    engine.run_to_end();
    assert!(engine.is_finished());
    assert_eq!(engine.now(), 120.0);
}

#[test]
fn test_idle_engine_has_empty_world() {
    let mut engine = FactoryEngine::new(quiet_config()).unwrap();
    for _ in 0..100 {
        engine.tick();
    }
    let line = engine.line(0).unwrap();
    assert_eq!(line.raw_material().len(), 0);
    assert_eq!(line.finished_goods().len(), 0);
    assert!(line.orders().is_empty());
    engine.validate_invariants().unwrap();
}

#[test]
fn test_orders_flow_into_raw_material() {
    let mut config = quiet_config();
    config.order_config.enabled = true;
    let mut engine = FactoryEngine::new(config).unwrap();

    for _ in 0..600 {
        engine.tick();
    }

    let line = engine.line(0).unwrap();
    assert!(!line.orders().is_empty(), "an order should have arrived");
    assert!(line.raw_material().len() > 0);
    assert_eq!(
        engine.kpi().products_emitted(),
        line.raw_material().total_supplied()
    );
    engine.validate_invariants().unwrap();
}

#[test]
fn test_fault_injection_charges_maintenance() {
    let mut config = quiet_config();
    config.fault_config.enabled = true;
    // Tight interval so several faults land within the window.
    config.fault_config.interval_range = (30.0, 40.0);
    let mut engine = FactoryEngine::new(config).unwrap();

    for _ in 0..500 {
        engine.tick();
    }

    let faults = engine.event_log().events_of_type("FaultInjected").len();
    assert!(faults >= 5, "expected several faults, got {}", faults);
    assert!((engine.kpi().maintenance_cost() - faults as f64 * 8.0).abs() < 1e-9);

    // Faults injected near the horizon (up to 60 s duration) may still
    // be open when the run stops.
    let cleared = engine.event_log().events_of_type("FaultCleared").len();
    assert!(
        cleared >= faults.saturating_sub(3),
        "faults must self-clear ({} cleared of {})",
        cleared,
        faults
    );
}
