//! Structural invariants under sustained load
//!
//! Runs a full line with live order generation, fault injection and a
//! scripted AGV shuttle, checking conservation and capacity bounds
//! throughout.

use factory_simulator_core_rs::{Corridor, FactoryConfig, FactoryEngine};

fn busy_config(seed: u64) -> FactoryConfig {
    let mut config = FactoryConfig::default();
    config.num_lines = 1;
    config.rng_seed = seed;
    config.duration_seconds = 100_000.0;
    config.topic_root = Some("TEST".to_string());
    config
}

/// Keep AGV_1 shuttling raw material to Station A and AGV_2 clearing
/// the quality output to the warehouse
fn drive_agents(engine: &FactoryEngine) {
    let line = engine.line(0).unwrap();

    let agv_1 = line.agv("AGV_1").unwrap();
    if agv_1.is_idle() && agv_1.queue_len() == 0 {
        if agv_1.payload().is_empty() {
            if agv_1.current_point().to_string() != "P0" {
                engine
                    .post_command(
                        0,
                        r#"{"action":"move","target":"AGV_1","params":{"target_point":"P0"}}"#,
                    )
                    .unwrap();
            } else if let Some(product_id) = line.raw_material().product_ids().first() {
                engine
                    .post_command(
                        0,
                        format!(
                            r#"{{"action":"load","target":"AGV_1","params":{{"product_id":"{}"}}}}"#,
                            product_id
                        ),
                    )
                    .unwrap();
            }
        } else if agv_1.current_point().to_string() != "P1" {
            engine
                .post_command(
                    0,
                    r#"{"action":"move","target":"AGV_1","params":{"target_point":"P1"}}"#,
                )
                .unwrap();
        } else {
            engine
                .post_command(0, r#"{"action":"unload","target":"AGV_1","params":{}}"#)
                .unwrap();
        }
    }

    let agv_2 = line.agv("AGV_2").unwrap();
    if agv_2.is_idle() && agv_2.queue_len() == 0 {
        if let Some(carried) = agv_2.payload().front() {
            // Deliver wherever the carried product is routed: passed
            // products to the warehouse, rework back to Station C.
            let drop_point = match carried.agv_destination() {
                factory_simulator_core_rs::models::AgvDestination::FinishedGoods => "P9",
                factory_simulator_core_rs::models::AgvDestination::StationC => "P5",
                factory_simulator_core_rs::models::AgvDestination::StationB => "P3",
                factory_simulator_core_rs::models::AgvDestination::StationA => "P1",
            };
            if agv_2.current_point().to_string() != drop_point {
                engine
                    .post_command(
                        0,
                        format!(
                            r#"{{"action":"move","target":"AGV_2","params":{{"target_point":"{}"}}}}"#,
                            drop_point
                        ),
                    )
                    .unwrap();
            } else {
                engine
                    .post_command(0, r#"{"action":"unload","target":"AGV_2","params":{}}"#)
                    .unwrap();
            }
        } else if agv_2.current_point().to_string() != "P8" {
            engine
                .post_command(
                    0,
                    r#"{"action":"move","target":"AGV_2","params":{"target_point":"P8"}}"#,
                )
                .unwrap();
        } else if line.quality().is_ready_out() {
            engine
                .post_command(0, r#"{"action":"load","target":"AGV_2","params":{}}"#)
                .unwrap();
        }
    }
}

#[test]
fn test_conservation_and_bounds_under_load() {
    let mut engine = FactoryEngine::new(busy_config(2024)).unwrap();

    for t in 0..4000 {
        drive_agents(&engine);
        engine.tick();
        if t % 100 == 0 {
            engine.validate_invariants().unwrap_or_else(|e| {
                panic!("invariant violated at t={}: {}", t, e);
            });
        }
    }

    engine.validate_invariants().unwrap();

    // The shuttle must have moved real work through the line.
    let line = engine.line(0).unwrap();
    assert!(
        line.finished_goods().len() + line.scrapped().len() > 0,
        "nothing made it through the line"
    );

    // Charge accounting: every charge is proactive or passive.
    for agv_id in ["AGV_1", "AGV_2"] {
        let stats = line.agv(agv_id).unwrap().stats();
        let charge_events = engine
            .event_log()
            .events_for_device(agv_id)
            .iter()
            .filter(|e| e.event_type() == "ChargeStarted")
            .count() as u64;
        // Charges are classified exactly when they start, so the
        // counters and the ChargeStarted events always agree.
        assert_eq!(
            stats.proactive_charges + stats.passive_charges,
            charge_events,
            "{} charge counters disagree with events",
            agv_id
        );
    }
}

#[test]
fn test_holding_buffers_only_hold_first_pass_p3() {
    let mut engine = FactoryEngine::new(busy_config(7)).unwrap();

    // AGV_1 feeds the line but nobody clears the holding buffers, so
    // any staged P3 stays there for inspection.
    for _ in 0..5000 {
        drive_agents(&engine);
        engine.tick();
    }

    let cq = engine.line(0).unwrap().conveyor_cq();
    for corridor in [Corridor::Upper, Corridor::Lower] {
        for id in cq.holding_ids(corridor) {
            assert!(
                id.starts_with("prod_P3_"),
                "non-P3 product {} in holding buffer",
                id
            );
        }
    }
    engine.validate_invariants().unwrap();
}

#[test]
fn test_battery_stays_in_bounds() {
    let mut engine = FactoryEngine::new(busy_config(55)).unwrap();

    for _ in 0..3000 {
        drive_agents(&engine);
        engine.tick();
        for agv_id in ["AGV_1", "AGV_2"] {
            let battery = engine.line(0).unwrap().agv(agv_id).unwrap().battery();
            assert!(
                (0.0..=100.0).contains(&battery),
                "{} battery {} out of bounds",
                agv_id,
                battery
            );
        }
    }
}
