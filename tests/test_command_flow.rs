//! Command ingress, validation and response publishing

use factory_simulator_core_rs::publisher::BufferedPublisher;
use factory_simulator_core_rs::{FactoryConfig, FactoryEngine};
use std::sync::{Arc, Mutex};

fn quiet_config() -> FactoryConfig {
    let mut config = FactoryConfig::default();
    config.num_lines = 1;
    config.order_config.enabled = false;
    config.fault_config.enabled = false;
    config.topic_root = Some("TEST".to_string());
    config
}

fn engine_with_bus() -> (FactoryEngine, Arc<Mutex<BufferedPublisher>>) {
    let bus = Arc::new(Mutex::new(BufferedPublisher::new()));
    let mut engine = FactoryEngine::new(quiet_config()).unwrap();
    engine.set_publisher(Box::new(bus.clone()));
    (engine, bus)
}

fn responses(bus: &Arc<Mutex<BufferedPublisher>>) -> Vec<String> {
    bus.lock()
        .unwrap()
        .messages()
        .iter()
        .filter(|(topic, _)| topic == "TEST/response/line1")
        .map(|(_, payload)| payload.clone())
        .collect()
}

#[test]
fn test_malformed_command_rejected_without_side_effect() {
    let (mut engine, bus) = engine_with_bus();
    engine.post_command(0, "{broken json").unwrap();
    engine.tick();

    let responses = responses(&bus);
    assert_eq!(responses.len(), 1);
    assert!(responses[0].contains("Command rejected"));

    // No state change: AGVs untouched.
    let agv = engine.line(0).unwrap().agv("AGV_1").unwrap();
    assert_eq!(agv.queue_len(), 0);
    assert!(agv.is_idle());
}

#[test]
fn test_unknown_action_rejected_with_echoed_id() {
    let (mut engine, bus) = engine_with_bus();
    engine
        .post_command(0, r#"{"command_id":"cmd-9","action":"fly","target":"AGV_1"}"#)
        .unwrap();
    engine.tick();

    let responses = responses(&bus);
    assert_eq!(responses.len(), 1);
    assert!(responses[0].contains("cmd-9"));
    assert!(responses[0].contains("unknown action"));
}

#[test]
fn test_unknown_agv_rejected() {
    let (mut engine, bus) = engine_with_bus();
    engine
        .post_command(
            0,
            r#"{"action":"move","target":"AGV_9","params":{"target_point":"P1"}}"#,
        )
        .unwrap();
    engine.tick();

    let responses = responses(&bus);
    assert_eq!(responses.len(), 1);
    assert!(responses[0].contains("unknown AGV"));
}

#[test]
fn test_move_command_completes_with_response() {
    let (mut engine, bus) = engine_with_bus();
    engine
        .post_command(
            0,
            r#"{"command_id":"mv-1","action":"move","target":"AGV_1","params":{"target_point":"P1"}}"#,
        )
        .unwrap();

    // P0→P1 is 7 m at 2 m/s: finished within a handful of ticks.
    for _ in 0..8 {
        engine.tick();
    }

    let agv = engine.line(0).unwrap().agv("AGV_1").unwrap();
    assert_eq!(agv.current_point().to_string(), "P1");

    let responses = responses(&bus);
    assert_eq!(responses.len(), 1);
    assert!(responses[0].contains("mv-1"));
    assert!(responses[0].contains("arrived at P1"));
}

#[test]
fn test_commands_serialized_per_agv() {
    let (mut engine, _bus) = engine_with_bus();
    engine
        .post_command(
            0,
            r#"{"action":"move","target":"AGV_1","params":{"target_point":"P1"}}"#,
        )
        .unwrap();
    engine
        .post_command(
            0,
            r#"{"action":"move","target":"AGV_1","params":{"target_point":"P3"}}"#,
        )
        .unwrap();
    engine.tick();

    let agv = engine.line(0).unwrap().agv("AGV_1").unwrap();
    // First command active, second queued behind it.
    assert_eq!(agv.queue_len(), 1);
    assert_eq!(agv.target_point().map(|p| p.to_string()), Some("P1".into()));
}

#[test]
fn test_load_at_raw_requires_product_id() {
    let (mut engine, bus) = engine_with_bus();
    engine
        .post_command(0, r#"{"action":"load","target":"AGV_1","params":{}}"#)
        .unwrap();
    engine.tick();

    let responses = responses(&bus);
    assert_eq!(responses.len(), 1);
    assert!(responses[0].contains("product_id is required"));
}

#[test]
fn test_load_at_raw_rejected_for_upper_corridor_agv() {
    let (mut engine, bus) = engine_with_bus();
    // AGV_2 starts at P0 of the upper corridor; raw material is a
    // lower-corridor service.
    engine
        .post_command(
            0,
            r#"{"command_id":"ld-2","action":"load","target":"AGV_2","params":{"product_id":"prod_P1_whatever"}}"#,
        )
        .unwrap();
    engine.tick();

    let responses = responses(&bus);
    assert_eq!(responses.len(), 1);
    assert!(responses[0].contains("ld-2"));
    assert!(responses[0].contains("corridor"));

    let agv = engine.line(0).unwrap().agv("AGV_2").unwrap();
    assert!(agv.payload().is_empty());
    assert!(agv.is_idle());
}

#[test]
fn test_get_result_publishes_zeroed_snapshot_at_start() {
    let (mut engine, bus) = engine_with_bus();
    engine
        .post_command(0, r#"{"command_id":"r1","action":"get_result"}"#)
        .unwrap();
    engine.tick();

    let results: Vec<String> = bus
        .lock()
        .unwrap()
        .messages()
        .iter()
        .filter(|(topic, _)| topic == "TEST/result/status")
        .map(|(_, payload)| payload.clone())
        .collect();
    assert_eq!(results.len(), 1);

    let score: serde_json::Value = serde_json::from_str(&results[0]).unwrap();
    assert_eq!(score["total_score"].as_f64().unwrap(), 0.0);
    let kpis = &score["kpis"];
    for metric in [
        "order_completion_rate",
        "average_production_cycle",
        "device_utilization",
        "first_pass_rate",
        "cost_efficiency",
        "charge_strategy_efficiency",
        "agv_energy_efficiency",
        "agv_utilization",
    ] {
        assert_eq!(
            kpis[metric].as_f64().unwrap(),
            0.0,
            "metric {} should be zero at t=0",
            metric
        );
    }

    assert_eq!(responses(&bus).len(), 1);
}

#[test]
fn test_kpi_snapshot_published_on_cadence() {
    let (mut engine, bus) = engine_with_bus();
    for _ in 0..30 {
        engine.tick();
    }
    let kpi_count = bus
        .lock()
        .unwrap()
        .messages()
        .iter()
        .filter(|(topic, _)| topic == "TEST/kpi/status")
        .count();
    // 30 s at a 10 s cadence.
    assert_eq!(kpi_count, 3);
}
