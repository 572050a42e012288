// =============================================================================
// Super Mario Bros. (NES) reinforcement-learning environment CLI
// =============================================================================
// Run:
//   cargo run --release -- rollout --env SuperMarioBros-1-1-v0 --rom-dir roms --episodes 5
//   cargo run --release -- rollout --env SuperMarioBrosRandomStages-v0 --stages 1-4,2-4 --seed 7
//   cargo run --release -- explore --env SuperMarioBros-v0 --rom-dir roms --action right

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use smb_rl::{
    ActionSet, DoneReason, Emulator, EnvConfig, EnvId, RolloutStats, ram, random_policy,
    run_rollout, tetanes,
};

// =============================================================================
// Environment Setup
// =============================================================================

#[derive(Parser)]
struct EnvArgs {
    /// Environment id, e.g. SuperMarioBros-1-1-v0
    #[arg(long, default_value = "SuperMarioBros-v0")]
    env: String,
    /// Directory holding the ROM variants named by the id's version
    #[arg(long, default_value = ".")]
    rom_dir: PathBuf,
    /// ROM file, overriding the one picked by --env
    #[arg(long)]
    rom: Option<PathBuf>,
    /// JSON environment config; replaces --env
    #[arg(long)]
    config: Option<PathBuf>,
    /// right-only | simple | complex
    #[arg(long)]
    actions: Option<String>,
    /// Comma-separated W-S list for random-stage ids
    #[arg(long, value_delimiter = ',')]
    stages: Vec<String>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    frame_skip: Option<u32>,
}

fn build_config(args: &EnvArgs) -> Result<EnvConfig> {
    let mut config = match &args.config {
        Some(path) => EnvConfig::from_json_file(path)?,
        None => {
            let id = EnvId::parse(&args.env)?;
            if args.stages.is_empty() {
                id.config(&args.rom_dir)
            } else {
                id.config_with_stages(&args.rom_dir, args.stages.as_slice())?
            }
        }
    };

    if let Some(rom) = &args.rom {
        config.rom_path = rom.clone();
    }
    if let Some(actions) = &args.actions {
        config.actions = match actions.as_str() {
            "right-only" | "right_only" => ActionSet::RightOnly,
            "simple" | "simple-movement" => ActionSet::SimpleMovement,
            "complex" | "complex-movement" => ActionSet::ComplexMovement,
            other => bail!("unknown action set {other:?} (right-only, simple, complex)"),
        };
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(frame_skip) = args.frame_skip {
        config.frame_skip = frame_skip;
    }
    Ok(config)
}

// =============================================================================
// Rollout
// =============================================================================

#[derive(Parser)]
struct RolloutArgs {
    #[command(flatten)]
    env: EnvArgs,
    #[arg(long, default_value = "5")]
    episodes: usize,
    /// Print per-episode summaries and totals as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn rollout(args: &RolloutArgs) -> Result<()> {
    let config = build_config(&args.env)?;
    let seed = config.seed;
    let mut env = tetanes::open(config)?;
    let policy = random_policy(env.action_count(), seed);

    let episodes = run_rollout(&mut env, args.episodes, policy).context("Rollout failed")?;
    let stats = RolloutStats::from_episodes(&episodes);

    if args.json {
        let out = serde_json::json!({ "episodes": episodes, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (i, ep) in episodes.iter().enumerate() {
        let reason = match ep.reason {
            Some(DoneReason::Death) => "death",
            Some(DoneReason::Completion) => "flag",
            Some(DoneReason::Timeout) => "timeout",
            None => "-",
        };
        println!(
            "Episode {:>3} | {} | reward {:>8.1} | steps {:>5} | x {:>5} | score {:>6} | {reason}",
            i + 1,
            ep.stage,
            ep.reward,
            ep.steps,
            ep.info.x_pos,
            ep.info.score,
        );
    }
    println!(
        "Average reward {:.1} over {} episodes | avg x {:.0} | max x {} | flags {} | deaths {} | timeouts {}",
        stats.avg_reward,
        stats.episodes,
        stats.avg_x,
        stats.max_x,
        stats.completions,
        stats.deaths,
        stats.timeouts,
    );
    Ok(())
}

// =============================================================================
// RAM Explorer
// =============================================================================

#[derive(Parser)]
struct ExploreArgs {
    #[command(flatten)]
    env: EnvArgs,
    /// Action name held every step, e.g. right+B
    #[arg(long, default_value = "right")]
    action: String,
    #[arg(long, default_value = "2000")]
    steps: u64,
    /// Print the watched bytes every N steps
    #[arg(long, default_value = "30")]
    every: u64,
}

fn explore(args: &ExploreArgs) -> Result<()> {
    let config = build_config(&args.env)?;
    let mut env = tetanes::open(config)?;
    let Some(action) = env.action_table().index_of(&args.action) else {
        let names: Vec<_> = env
            .action_table()
            .entries()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        bail!("unknown action {:?}, expected one of {names:?}", args.action);
    };

    let watched: [(&str, u16); 10] = [
        ("Player Routine", ram::PLAYER_ROUTINE),
        ("Player Page", ram::PLAYER_PAGE),
        ("Player X", ram::PLAYER_X),
        ("Y Viewport", ram::PLAYER_Y_VIEWPORT),
        ("Y Pixel", ram::PLAYER_Y_PIXEL),
        ("Float State", ram::FLAGPOLE_FLOAT_STATE),
        ("Enemy0 Type", ram::ENEMY_TYPES[0]),
        ("Engine Mode", ram::GAME_ENGINE_MODE),
        ("Area Timer", ram::CHANGE_AREA_TIMER),
        ("Lives", ram::LIVES),
    ];
    let mut prev_vals = [0u8; 10];

    env.reset()?;
    for step in 1..=args.steps {
        let result = env.step(action)?;
        if step % args.every.max(1) == 0 || result.done {
            let info = &result.info;
            println!("\n--- Step {step} ---");
            println!(
                "  {}-{} (area {}) x={} y={} time={} score={} coins={} status={}",
                info.world,
                info.stage,
                info.area,
                info.x_pos,
                info.y_pos,
                info.time,
                info.score,
                info.coins,
                info.status.as_str(),
            );
            for (i, (name, addr)) in watched.iter().enumerate() {
                let val = env.emulator().read_memory(*addr);
                let changed = if val != prev_vals[i] { " <- changed" } else { "" };
                println!("  {name:<14} [0x{addr:04X}] = {val:3} (0x{val:02X}){changed}");
                prev_vals[i] = val;
            }
        }
        if result.done {
            println!("\nEpisode over: {:?} after {step} steps", result.reason);
            env.reset()?;
        }
    }
    Ok(())
}

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "smb-rl", about = "Super Mario Bros. NES reinforcement-learning environment")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a random agent and report episode statistics
    Rollout(RolloutArgs),
    /// Hold one action and watch the decoded state and RAM bytes
    Explore(ExploreArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Rollout(args) => rollout(args),
        Commands::Explore(args) => explore(args),
    }
}
