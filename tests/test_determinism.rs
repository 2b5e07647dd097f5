//! Determinism: same seed + same config + same command trace must
//! reproduce the identical run

use factory_simulator_core_rs::{FactoryConfig, FactoryEngine};

fn busy_config(seed: u64) -> FactoryConfig {
    let mut config = FactoryConfig::default();
    config.num_lines = 2;
    config.rng_seed = seed;
    config.topic_root = Some("TEST".to_string());
    config
}

fn run(seed: u64, ticks: usize) -> FactoryEngine {
    let mut engine = FactoryEngine::new(busy_config(seed)).unwrap();
    for t in 0..ticks {
        // A small deterministic command trace.
        if t % 97 == 0 {
            engine
                .post_command(0, r#"{"action":"charge","target":"AGV_1","params":{}}"#)
                .unwrap();
        }
        engine.tick();
    }
    engine
}

#[test]
fn test_same_seed_same_history() {
    let a = run(12345, 800);
    let b = run(12345, 800);

    assert_eq!(a.event_log().len(), b.event_log().len());
    assert_eq!(a.event_log().events(), b.event_log().events());
    assert_eq!(a.kpi_snapshot(), b.kpi_snapshot());
}

#[test]
fn test_different_seed_diverges() {
    let a = run(1, 800);
    let b = run(2, 800);

    // Order arrival times alone make identical histories implausible.
    assert_ne!(a.event_log().events(), b.event_log().events());
}

#[test]
fn test_invariants_hold_under_load() {
    let engine = run(999, 1500);
    engine.validate_invariants().unwrap();
}
