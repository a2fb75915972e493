use wanderbots_brain::NetworkRunner;
use wanderbots_core::{BotId, Vec2, WanderbotsConfig, World};

/// Network for a single-sensor bot (three inputs): one hidden neuron, two
/// drive outputs with identical wiring so the bot holds its heading.
const STRAIGHT_DRIVER: &str = r#"[
    {"id": 0, "kind": "INPUT"},
    {"id": 1, "kind": "INPUT"},
    {"id": 2, "kind": "INPUT"},
    {"id": 3, "kind": "BIAS"},
    {"id": 4, "kind": "HIDDEN", "links": [
        {"source": 0, "weight": -0.6},
        {"source": 1, "weight": 0.3},
        {"source": 2, "weight": -1.0},
        {"source": 3, "weight": 0.2}
    ]},
    {"id": 5, "kind": "OUTPUT", "links": [
        {"source": 4, "weight": 0.9},
        {"source": 3, "weight": -0.2}
    ]},
    {"id": 6, "kind": "OUTPUT", "links": [
        {"source": 4, "weight": 0.9},
        {"source": 3, "weight": -0.2}
    ]}
]"#;

/// Same topology, different weights; used as the next generation's brain.
const SUCCESSOR_DRIVER: &str = r#"[
    {"id": 0, "kind": "INPUT"},
    {"id": 1, "kind": "INPUT"},
    {"id": 2, "kind": "INPUT"},
    {"id": 3, "kind": "BIAS"},
    {"id": 4, "kind": "HIDDEN", "links": [
        {"source": 0, "weight": 0.4},
        {"source": 1, "weight": -0.8},
        {"source": 2, "weight": 0.1},
        {"source": 3, "weight": -0.3}
    ]},
    {"id": 5, "kind": "OUTPUT", "links": [
        {"source": 4, "weight": 1.2},
        {"source": 3, "weight": 0.1}
    ]},
    {"id": 6, "kind": "OUTPUT", "links": [
        {"source": 4, "weight": 1.1},
        {"source": 3, "weight": 0.1}
    ]}
]"#;

fn driven_world(definition: &str) -> (World, BotId) {
    let mut world = World::new(WanderbotsConfig {
        world_width: 400.0,
        world_height: 200.0,
        num_sensors: 1,
        ..WanderbotsConfig::default()
    })
    .expect("world");
    world
        .add_obstacle(vec![Vec2::new(300.0, 0.0), Vec2::new(300.0, 200.0)])
        .expect("obstacle");
    let id = world.spawn_bot(Vec2::new(100.0, 100.0)).expect("spawn");
    let runner = NetworkRunner::from_json(definition).expect("network");
    world.set_brain(id, Box::new(runner)).expect("brain");
    (world, id)
}

#[test]
fn json_network_drives_a_bot_through_the_world() {
    let (mut world, id) = driven_world(STRAIGHT_DRIVER);

    for _ in 0..40 {
        world.step().expect("step");
    }

    let bot = world.bot(id).expect("bot");
    // Identical output wiring keeps the turn at zero while the logistic
    // outputs keep both tracks strictly positive.
    assert_eq!(bot.rotation(), 0.0);
    assert_eq!(bot.position().y, 100.0);
    assert!(bot.position().x > 100.0);
    assert!(bot.position().x < 200.0);
    assert!(bot.cells_visited() >= 1);
    assert_eq!(bot.brain_kind(), Some("neat.feedforward"));
}

#[test]
fn identically_configured_worlds_evolve_bit_identically() {
    let (mut world_a, id_a) = driven_world(STRAIGHT_DRIVER);
    let (mut world_b, id_b) = driven_world(STRAIGHT_DRIVER);

    for _ in 0..40 {
        let summary_a = world_a.step().expect("step");
        let summary_b = world_b.step().expect("step");
        assert_eq!(summary_a, summary_b);

        let bot_a = world_a.bot(id_a).expect("bot");
        let bot_b = world_b.bot(id_b).expect("bot");
        assert_eq!(bot_a.position(), bot_b.position());
        assert_eq!(bot_a.rotation(), bot_b.rotation());
        assert_eq!(bot_a.tracks(), bot_b.tracks());
        assert_eq!(bot_a.collisions(), bot_b.collisions());
    }
}

#[test]
fn generation_rollover_swaps_networks_and_replays() {
    let (mut world, id) = driven_world(STRAIGHT_DRIVER);

    for _ in 0..25 {
        world.step().expect("step");
    }
    let first_fitness = world.fitness_report()[0].cells_visited;
    assert!(first_fitness >= 1);

    world.reset_generation();
    let successor = NetworkRunner::from_json(SUCCESSOR_DRIVER).expect("network");
    world.set_brain(id, Box::new(successor)).expect("brain");

    let bot = world.bot(id).expect("bot");
    assert_eq!(bot.position(), Vec2::new(100.0, 100.0));
    assert_eq!(bot.cells_visited(), 0);

    world.step().expect("step");
    let bot = world.bot(id).expect("bot");
    // The successor's asymmetric output weights steer immediately.
    assert!(bot.tracks().left != bot.tracks().right);
    assert_eq!(bot.cells_visited(), 1);
}
