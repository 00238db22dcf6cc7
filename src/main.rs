//! rigid2d - headless 2D physics runner
//!
//! Builds one of the preset scenes from configuration, steps it at a fixed
//! rate and logs world statistics and events.

use rigid2d::config::AppConfig;
use rigid2d::systems::SimulationSystem;

fn main() {
    // Load configuration first so the log level can come from it
    let (config, load_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // RUST_LOG still wins over the configured level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.debug.log_level.as_str()))
        .init();
    log::info!("Starting rigid2d");
    if let Some(e) = load_error {
        log::warn!("Failed to load config: {}. Using defaults.", e);
    }

    let sim = &config.simulation;
    let mut scene = match sim.scene.build(sim.scene_size, config.physics.to_physics_config()) {
        Ok(scene) => scene,
        Err(e) => {
            log::error!("Failed to build scene '{}': {}", sim.scene, e);
            std::process::exit(1);
        }
    };
    log::info!(
        "Loaded scene '{}' with {} bodies, {} fixtures and {} joints",
        sim.scene,
        scene.world.body_count(),
        scene.world.fixture_count(),
        scene.world.joint_count()
    );

    let mut system = SimulationSystem::new(sim).with_event_logging(config.debug.log_events);
    for _ in 0..sim.steps {
        system.step(&mut scene.world);
    }

    let totals = system.totals();
    log::info!(
        "Finished {} steps ({:.2}s simulated): {} contacts began, {} ended, {} joints broke",
        system.step_count(),
        system.elapsed(),
        totals.begin_contacts,
        totals.end_contacts,
        totals.joints_broken
    );
    if let Some(body) = scene.focus.and_then(|key| scene.world.get_body(key)) {
        let position = body.position();
        let velocity = body.linear_velocity();
        log::info!(
            "Focus body at ({:.3}, {:.3}) moving ({:.3}, {:.3}), {}",
            position.x,
            position.y,
            velocity.x,
            velocity.y,
            if body.is_awake() { "awake" } else { "asleep" }
        );
    }
}
