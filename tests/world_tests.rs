//! Behaviour of the synchronous world across ticks and commands

use std::collections::HashMap;

use intersection_sim::config::SimConfig;
use intersection_sim::error::EngineError;
use intersection_sim::simulation::{
    Axis, Direction, EventType, LightColor, SignalPhase, SimWorld, VehicleId, VehicleStatus,
    VehicleType, STOP_LINE, WORLD_SIZE,
};

const DELTA: f32 = 0.1;

fn assert_lights_consistent(world: &SimWorld) {
    let lights = world.lights();
    let ns_green = lights.north == LightColor::Green || lights.south == LightColor::Green;
    let ew_green = lights.east == LightColor::Green || lights.west == LightColor::Green;
    assert!(!(ns_green && ew_green), "both axes green: {lights:?}");
    if ns_green {
        assert_eq!(lights.east, LightColor::Red);
        assert_eq!(lights.west, LightColor::Red);
    }
    if ew_green {
        assert_eq!(lights.north, LightColor::Red);
        assert_eq!(lights.south, LightColor::Red);
    }
}

#[test]
fn test_add_three_north_then_tick() {
    let mut world = SimWorld::new_with_seed(7);
    let ids = world.add_vehicles("north", 3).unwrap();
    assert_eq!(ids.len(), 3);

    world.tick(DELTA);

    let state = world.snapshot();
    assert_eq!(state.vehicles.len(), 3);
    for vehicle in &state.vehicles {
        assert_eq!(vehicle.direction, Direction::North);
        assert!(matches!(
            vehicle.status,
            VehicleStatus::Moving | VehicleStatus::Stopped
        ));
        assert!(!vehicle.status_reason.is_empty());
    }
}

#[test]
fn test_initial_lights_follow_config() {
    let world = SimWorld::new();
    assert_eq!(world.signal_phase(), SignalPhase::Green(Axis::EastWest));
    assert_eq!(world.lights().east, LightColor::Green);
    assert_eq!(world.lights().north, LightColor::Red);

    let mut config = SimConfig::default();
    config.signals.initial_green = Axis::NorthSouth;
    let world = SimWorld::with_config(config);
    assert_eq!(world.lights().north, LightColor::Green);
    assert_eq!(world.lights().west, LightColor::Red);
}

#[test]
fn test_lights_and_speeds_stay_consistent() {
    let mut world = SimWorld::new_with_seed(11);
    world.seed_initial();
    world.start();

    for tick in 0..3000 {
        match tick {
            100 => {
                world.add_ambulance("south").unwrap();
            }
            150 => {
                world.add_ambulance("west").unwrap();
            }
            400 => {
                world.add_vehicles("east", 8).unwrap();
            }
            900 => {
                world.add_ambulance("east").unwrap();
            }
            1500 => {
                world.add_vehicles("north", 10).unwrap();
            }
            _ => {}
        }
        world.tick(DELTA);

        assert_lights_consistent(&world);
        for vehicle in world.vehicles() {
            assert!(vehicle.speed >= 0.0, "{} negative speed", vehicle.id);
            assert!(
                vehicle.speed <= vehicle.original_speed(),
                "{} exceeded its cruising speed",
                vehicle.id
            );
            if vehicle.status != VehicleStatus::Moving {
                assert!(!vehicle.status_reason.is_empty());
            }
        }
    }
    assert!(world.stats().total_exited > 0);
}

#[test]
fn test_stop_is_idempotent() {
    let mut world = SimWorld::new_with_seed(3);
    world.add_vehicles("west", 4).unwrap();
    world.start();
    for _ in 0..20 {
        world.tick(DELTA);
    }

    world.stop();
    let once = world.snapshot();
    let events_once = world.event_log().total_appended();

    world.stop();
    assert_eq!(world.snapshot(), once);
    assert_eq!(world.event_log().total_appended(), events_once);
    assert!(!once.running);
    assert_eq!(once.vehicles.len(), 4);
}

#[test]
fn test_stop_when_never_started_is_noop() {
    let mut world = SimWorld::new();
    world.stop();
    assert!(!world.is_running());
    assert!(world.event_log().is_empty());
}

#[test]
fn test_start_and_stop_log_events() {
    let mut world = SimWorld::new();
    world.start();
    world.start();
    world.stop();

    let kinds: Vec<EventType> = world.event_log().iter().map(|e| e.event_type).collect();
    assert_eq!(kinds, vec![EventType::Resumed, EventType::Stopped]);
}

#[test]
fn test_ambulance_preempts_within_bounded_ticks() {
    let mut world = SimWorld::new_with_seed(5);
    assert_eq!(world.lights().east, LightColor::Green);

    let ambulance = world.add_ambulance("north").unwrap();

    let mut granted_at = None;
    for tick in 0..5 {
        if world.lights().north == LightColor::Green {
            granted_at = Some(tick);
            break;
        }
        world.tick(DELTA);
    }
    assert!(granted_at.is_some(), "north never turned green");
    assert!(world.emergency_active());
    assert_eq!(world.lights().east, LightColor::Red);
    assert!(world
        .event_log()
        .iter()
        .any(|e| e.event_type == EventType::PriorityGiven));

    // Simulated exit
    assert!(world.remove_vehicle(ambulance));
    assert!(!world.emergency_active());

    let mut resumed = false;
    for _ in 0..60 {
        world.tick(DELTA);
        if matches!(world.signal_phase(), SignalPhase::Green(_)) {
            resumed = true;
            break;
        }
    }
    assert!(resumed, "normal cycling never resumed");
    assert!(!world.emergency_active());
    assert_eq!(world.signal_phase(), SignalPhase::Green(Axis::EastWest));
}

#[test]
fn test_ambulance_releases_corridor_after_crossing() {
    let mut world = SimWorld::new_with_seed(9);
    let ambulance = world.add_ambulance("south").unwrap();
    world.start();

    let mut ticks = 0;
    while world.vehicle(ambulance).is_some() {
        world.tick(DELTA);
        ticks += 1;
        assert!(ticks < 400, "ambulance never left the simulation");
    }

    assert!(!world.emergency_active());
    assert_eq!(world.stats().total_exited, 1);
    assert!(world
        .event_log()
        .iter()
        .any(|e| e.event_type == EventType::Emergency && e.message.contains("cleared")));
}

#[test]
fn test_ambulance_runs_red_light_under_preemption() {
    let mut world = SimWorld::new_with_seed(21);
    let ambulance = world.add_ambulance("north").unwrap();
    world.start();

    let mut saw_priority = false;
    for _ in 0..100 {
        world.tick(DELTA);
        match world.vehicle(ambulance) {
            Some(vehicle) => {
                assert_ne!(vehicle.status, VehicleStatus::Stopped);
                if vehicle.status == VehicleStatus::Emergency {
                    saw_priority = true;
                }
            }
            None => break,
        }
    }
    assert!(saw_priority);
}

#[test]
fn test_conflicting_ambulance_waits_for_corridor() {
    let mut world = SimWorld::new_with_seed(13);
    let north = world.add_ambulance("north").unwrap();
    let east = world.add_ambulance("east").unwrap();

    assert_eq!(world.preemption().granted(), Some(Axis::NorthSouth));
    assert_eq!(world.lights().north, LightColor::Green);
    assert_eq!(world.lights().east, LightColor::Red);

    assert!(world.remove_vehicle(north));
    assert_eq!(world.preemption().granted(), Some(Axis::EastWest));
    assert_eq!(world.lights().east, LightColor::Green);
    assert_eq!(world.lights().north, LightColor::Red);

    assert!(world.remove_vehicle(east));
    assert!(!world.emergency_active());
    assert_lights_consistent(&world);
}

#[test]
fn test_same_axis_ambulance_joins_corridor() {
    let mut world = SimWorld::new_with_seed(17);
    world.add_ambulance("north").unwrap();
    let before = world
        .event_log()
        .iter()
        .filter(|e| e.event_type == EventType::PriorityGiven)
        .count();

    world.add_ambulance("south").unwrap();
    let after = world
        .event_log()
        .iter()
        .filter(|e| e.event_type == EventType::PriorityGiven)
        .count();

    assert_eq!(before, after);
    assert!(world
        .event_log()
        .iter()
        .any(|e| e.message.contains("joins the open")));
}

#[test]
fn test_disabled_priority_leaves_signals_alone() {
    let mut world = SimWorld::new_with_seed(2);
    world.update_settings(None, Some(false));

    world.add_ambulance("north").unwrap();

    assert!(!world.emergency_active());
    assert_eq!(world.signal_phase(), SignalPhase::Green(Axis::EastWest));
}

#[test]
fn test_vehicle_stops_at_red_light() {
    let mut config = SimConfig::default();
    config.signals.green_secs = 60.0;
    config.engine.seed = Some(4);
    let mut world = SimWorld::with_config(config);
    let id = world.add_vehicles("north", 1).unwrap()[0];
    world.start();

    for _ in 0..300 {
        world.tick(DELTA);
        let vehicle = world.vehicle(id).unwrap();
        assert!(vehicle.progress <= STOP_LINE, "ran the red light");
    }

    let vehicle = world.vehicle(id).unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Stopped);
    assert_eq!(vehicle.status_reason, "red light");
    assert_eq!(vehicle.speed, 0.0);
}

#[test]
fn test_queued_vehicles_keep_their_distance() {
    let mut config = SimConfig::default();
    config.signals.green_secs = 60.0;
    config.engine.seed = Some(8);
    let min_gap = config.traffic.min_gap;
    let mut world = SimWorld::with_config(config);
    world.add_vehicles("south", 6).unwrap();
    world.start();

    for _ in 0..400 {
        world.tick(DELTA);
        let mut lane: Vec<_> = world.vehicles().collect();
        lane.sort_by(|a, b| b.progress.total_cmp(&a.progress));
        for pair in lane.windows(2) {
            let gap = pair[0].rear() - pair[1].progress;
            assert!(gap >= min_gap - 0.01, "gap {gap} between {} and {}", pair[0].id, pair[1].id);
        }
    }

    let stopped_behind = world
        .vehicles()
        .filter(|v| v.status_reason == "vehicle ahead")
        .count();
    assert!(stopped_behind > 0);
}

#[test]
fn test_clear_all_keeps_lights_and_running() {
    let mut world = SimWorld::new_with_seed(1);
    world.add_vehicles("east", 5).unwrap();
    world.add_vehicles("north", 5).unwrap();
    world.start();
    for _ in 0..15 {
        world.tick(DELTA);
    }
    let phase = world.signal_phase();

    world.clear_all();

    assert_eq!(world.vehicle_count(), 0);
    assert!(world.is_running());
    assert_eq!(world.signal_phase(), phase);
    assert!(world.snapshot().vehicles.is_empty());
}

#[test]
fn test_invalid_direction_rejected_without_mutation() {
    let mut world = SimWorld::new();
    world.add_vehicles("north", 2).unwrap();
    let events = world.event_log().total_appended();

    let err = world.add_vehicles("up", 2).unwrap_err();
    assert_eq!(err, EngineError::InvalidDirection("up".to_string()));
    assert!(world.add_ambulance("").is_err());

    assert_eq!(world.vehicle_count(), 2);
    assert_eq!(world.event_log().total_appended(), events);
    assert!(!world.emergency_active());
}

#[test]
fn test_direction_names_are_case_insensitive() {
    let mut world = SimWorld::new();
    world.add_vehicles("North", 1).unwrap();
    world.add_ambulance(" WEST ").unwrap();
    assert_eq!(world.vehicle_count(), 2);
}

#[test]
fn test_oversized_batch_rejected() {
    let mut world = SimWorld::new();
    let limit = world.config().traffic.max_vehicles_per_command;

    let err = world.add_vehicles("south", limit + 1).unwrap_err();
    assert!(matches!(err, EngineError::InvalidCount { .. }));
    assert_eq!(world.vehicle_count(), 0);

    assert!(world.add_vehicles("south", 0).unwrap().is_empty());
    assert!(world.event_log().is_empty());
}

#[test]
fn test_spawned_vehicles_do_not_overlap() {
    let mut world = SimWorld::new_with_seed(99);
    let ids = world.add_vehicles("west", 20).unwrap();
    let traffic = world.config().traffic.clone();

    assert_eq!(ids.len(), 20);
    assert!(world.waiting_count() > 0, "20 vehicles cannot all fit");
    assert_eq!(world.vehicle_count() + world.waiting_count(), 20);
    assert_eq!(world.snapshot().waiting_vehicles, world.waiting_count());

    let mut lane: Vec<_> = world.vehicles().collect();
    lane.sort_by(|a, b| b.progress.total_cmp(&a.progress));
    for pair in lane.windows(2) {
        assert!(pair[0].rear() - pair[1].progress >= traffic.min_following_distance - 0.01);
    }
    for vehicle in &lane {
        assert!(vehicle.progress < STOP_LINE);
        assert!(vehicle.rear() >= -traffic.entry_queue_length - 0.01);
    }
}

#[test]
fn test_entering_vehicle_can_stop_behind_the_one_ahead() {
    let mut world = SimWorld::new_with_seed(41);
    world.add_vehicles("south", 6).unwrap();
    let traffic = world.config().traffic.clone();
    let delta = world.config().clock.delta_secs;

    let mut lane: Vec<_> = world.vehicles().collect();
    lane.sort_by(|a, b| b.progress.total_cmp(&a.progress));
    for pair in lane.windows(2) {
        let gap = pair[0].rear() - pair[1].progress;
        let needed =
            traffic.min_following_distance + traffic.braking_distance(pair[1].speed, delta);
        assert!(gap >= needed - 0.01, "{} enters {gap} behind, needs {needed}", pair[1].id);
        assert!(pair[1].speed <= pair[1].original_speed());
    }
}

#[test]
fn test_yielding_vehicles_shed_speed_at_bounded_rate() {
    let mut world = SimWorld::new_with_seed(5);
    let cap = world.config().traffic.deceleration * DELTA;
    world.start();

    let mut previous: HashMap<VehicleId, f32> = HashMap::new();
    let mut worst = 0.0_f32;
    for tick in 0..600 {
        if tick % 50 == 0 {
            world.add_vehicles("north", 6).unwrap();
        }
        world.tick(DELTA);

        for vehicle in world.vehicles() {
            if let Some(before) = previous.get(&vehicle.id) {
                worst = worst.max(before - vehicle.speed);
            }
        }
        previous = world.vehicles().map(|v| (v.id, v.speed)).collect();
    }

    assert!(worst <= cap + 1e-3, "worst single-tick drop {worst} km/h, cap {cap}");
    assert!(worst > 0.0, "nobody ever braked");
}

#[test]
fn test_backed_up_approach_stays_near_the_plane() {
    let mut world = SimWorld::new_with_seed(5);
    let queue = world.config().traffic.entry_queue_length;
    world.start();

    let mut backed_up = false;
    for tick in 0..600 {
        if tick % 50 == 0 {
            world.add_vehicles("north", 6).unwrap();
        }
        world.tick(DELTA);

        for vehicle in world.vehicles() {
            assert!(vehicle.rear() >= -queue - 0.01, "{} queued at {}", vehicle.id, vehicle.progress);
            assert!(vehicle.position.y <= WORLD_SIZE + queue);
        }
        let stats = world.stats();
        assert_eq!(
            stats.active_vehicles as u64 + stats.waiting_vehicles as u64 + stats.total_exited,
            stats.total_spawned
        );
        backed_up |= stats.waiting_vehicles > 0;
    }
    assert!(backed_up, "the approach never backed up");
}

#[test]
fn test_waiting_vehicles_enter_as_room_frees() {
    let mut config = SimConfig::default();
    config.signals.initial_green = Axis::NorthSouth;
    config.traffic.entry_queue_length = 0.0;
    config.engine.seed = Some(23);
    let min_gap = config.traffic.min_gap;
    let mut world = SimWorld::with_config(config);

    let ids = world.add_vehicles("north", 10).unwrap();
    assert_eq!(ids.len(), 10);
    assert!(world.waiting_count() > 0);
    assert!(world.vehicles().all(|v| v.rear() >= -0.01));
    world.start();

    let mut entered_at: HashMap<VehicleId, usize> =
        world.vehicles().map(|v| (v.id, 0)).collect();
    let mut ticks = 0;
    while world.waiting_count() > 0 {
        world.tick(DELTA);
        ticks += 1;
        assert!(ticks < 3000, "entry queue never drained");
        for vehicle in world.vehicles() {
            entered_at.entry(vehicle.id).or_insert(ticks);
        }

        let mut lane: Vec<_> = world.vehicles().collect();
        lane.sort_by(|a, b| b.progress.total_cmp(&a.progress));
        for pair in lane.windows(2) {
            assert!(pair[0].rear() - pair[1].progress >= min_gap - 0.01);
        }
    }

    // Admitted in creation order
    let order: Vec<usize> = ids.iter().map(|id| entered_at[id]).collect();
    assert!(order.windows(2).all(|pair| pair[0] <= pair[1]), "{order:?}");
}

#[test]
fn test_waiting_ambulance_keeps_its_corridor() {
    let mut config = SimConfig::default();
    config.traffic.entry_queue_length = 0.0;
    config.engine.seed = Some(29);
    let mut world = SimWorld::with_config(config);

    world.add_vehicles("west", 10).unwrap();
    let ambulance = world.add_ambulance("west").unwrap();
    assert!(world.vehicle(ambulance).is_none(), "ambulance should be waiting");

    world.start();
    world.tick(DELTA);
    assert_eq!(world.preemption().granted(), Some(Axis::EastWest));
    assert_eq!(world.lights().west, LightColor::Green);

    assert!(world.remove_vehicle(ambulance));
    assert!(!world.emergency_active());
    assert!(!world.remove_vehicle(ambulance));
}

#[test]
fn test_tick_reports_phase_changes() {
    let mut world = SimWorld::new();
    world.start();

    let mut changes = Vec::new();
    for _ in 0..140 {
        if let Some(phase) = world.tick(DELTA).phase_change {
            changes.push(phase);
        }
    }
    assert_eq!(
        changes,
        vec![
            SignalPhase::Yellow(Axis::EastWest),
            SignalPhase::Green(Axis::NorthSouth)
        ]
    );
}

#[test]
fn test_event_log_is_bounded() {
    let mut config = SimConfig::default();
    config.events.capacity = 5;
    let mut world = SimWorld::with_config(config);

    for _ in 0..12 {
        world.add_vehicles("east", 1).unwrap();
    }

    assert_eq!(world.event_log().len(), 5);
    assert_eq!(world.snapshot().events.len(), 5);
    assert_eq!(world.event_log().total_appended(), 12);
}

#[test]
fn test_seeded_population_spreads_over_approaches() {
    let mut world = SimWorld::new_with_seed(31);
    let ids = world.seed_initial();
    assert_eq!(ids.len(), 20);

    for direction in Direction::ALL {
        let count = world
            .vehicles()
            .filter(|v| v.direction == direction)
            .count();
        assert_eq!(count, 5);
    }
    assert!(world
        .vehicles()
        .all(|v| v.vehicle_type != VehicleType::Ambulance && v.telemetry.is_some()));
}

#[test]
fn test_seeded_worlds_are_reproducible() {
    let run = |seed| {
        let mut world = SimWorld::new_with_seed(seed);
        world.seed_initial();
        world.start();
        for _ in 0..200 {
            world.tick(DELTA);
        }
        world.snapshot()
    };
    assert_eq!(run(77), run(77));
}

#[test]
fn test_snapshot_serializes_presentation_fields() {
    let mut world = SimWorld::new_with_seed(12);
    world.add_ambulance("east").unwrap();
    world.tick(DELTA);

    let json: serde_json::Value =
        serde_json::from_str(&world.snapshot().to_json().unwrap()).unwrap();

    assert_eq!(json["trafficLights"]["east"], "green");
    assert_eq!(json["emergencyActive"], true);
    let vehicle = &json["vehicles"][0];
    assert_eq!(vehicle["id"], "V0001");
    assert_eq!(vehicle["type"], "Ambulance");
    assert_eq!(vehicle["direction"], "east");
    assert!(vehicle["originalSpeed"].is_number());
    assert!(vehicle["statusReason"].is_string());
    assert!(vehicle["slice_type"].is_string());
    assert_eq!(json["events"][0]["type"], "ambulance_added");
}
