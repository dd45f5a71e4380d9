use neuropet::behavior::{Activity, BehaviorEngine, CreatureState, Outcome, Personality, RlOutcome};
use neuropet::config::{load_config, EngineConfig};
use neuropet::utils::SeededRng;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Simulated steps and how often progress is logged.
const STEPS: u64 = 300;
const REPORT_EVERY: u64 = 50;
// Where the trained engine is written when no second argument is given.
const DEFAULT_OUTPUT: &str = "behavior_engine.json";

// Activities the simulated creature actually enjoys.
fn enjoys(activity: Activity) -> bool {
    matches!(activity, Activity::BallPlay | Activity::Explore | Activity::MouseChase)
}

// Advance needs by one step of the chosen activity.
fn simulate(state: &CreatureState, activity: Activity, rng: &mut SeededRng) -> CreatureState {
    let mut next = state.clone();
    match activity {
        Activity::Eat => next.hunger = (next.hunger - 30.0).max(0.0),
        Activity::Sleep => next.energy = (next.energy + 25.0).min(100.0),
        _ => {
            next.hunger = (next.hunger + 3.0).min(100.0);
            next.energy = (next.energy - 2.0).max(0.0);
        }
    }
    let mood = if enjoys(activity) { 4.0 } else { -2.0 };
    next.happiness = (next.happiness + mood).clamp(0.0, 100.0);
    next.seconds_since_interaction += 60.0;
    next.player_nearby = rng.chance(0.3);
    next.time_of_day = (next.time_of_day + 0.25) % 24.0;
    next.pos_x = rng.gen_range_f64(0.0, 1920.0);
    next.pos_y = rng.gen_range_f64(0.0, 1080.0);
    next.sensory = (0..state.sensory.len()).map(|_| rng.next_f64()).collect();
    next
}

fn main() -> neuropet::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "behavior_demo=info,neuropet=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    let output = args.get(2).map(String::as_str).unwrap_or(DEFAULT_OUTPUT);

    let mut world = SeededRng::new(config.seed ^ 0x5eed);
    let mut state = CreatureState {
        hunger: 20.0,
        energy: 80.0,
        happiness: 60.0,
        personality: Some(Personality::Playful),
        sensory: vec![0.0; config.sensory_size],
        ..CreatureState::default()
    };
    let mut engine = BehaviorEngine::new(config)?;

    let mut enjoyed_count = 0u64;
    for step in 1..=STEPS {
        let decision = engine.choose_action(&state)?;
        let next = simulate(&state, decision.activity, &mut world);
        let enjoyed = enjoys(decision.activity);
        enjoyed_count += u64::from(enjoyed);

        let outcome = Outcome {
            enjoyed,
            reward: Some(if enjoyed { 0.8 } else { 0.3 }),
            player_interaction: next.player_nearby,
            rl: decision.rl.map(|rl| RlOutcome {
                action_index: rl.action_index,
                before: state.needs(),
                after: next.needs(),
                next_state: Some(next.clone()),
            }),
            ..Outcome::default()
        };
        engine.learn_from_outcome(&state, &decision.action(), &outcome)?;

        if step % REPORT_EVERY == 0 {
            info!(
                step,
                activity = decision.activity.as_str(),
                enjoyed_rate = enjoyed_count as f64 / step as f64,
                hunger = next.hunger,
                energy = next.energy,
                happiness = next.happiness,
                "simulation progress"
            );
        }
        state = next;
    }

    engine.save(output)?;
    info!(output, interactions = engine.total_interactions(), "demo finished");
    Ok(())
}
