use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use tracing::info;

use crate::emulator::{Emulator, Frame};
use crate::env::{Info, MarioEnv};
use crate::error::EnvError;
use crate::reward::DoneReason;
use crate::stage::StageId;

/// One finished episode.
#[derive(Debug, Clone, Serialize)]
pub struct EpisodeSummary {
    pub stage: StageId,
    pub reward: f64,
    pub steps: u64,
    pub reason: Option<DoneReason>,
    pub info: Info,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RolloutStats {
    pub episodes: usize,
    pub avg_reward: f64,
    pub avg_steps: f64,
    pub avg_x: f64,
    pub max_x: u32,
    pub avg_score: f64,
    pub completions: usize,
    pub deaths: usize,
    pub timeouts: usize,
}

impl RolloutStats {
    pub fn from_episodes(episodes: &[EpisodeSummary]) -> Self {
        if episodes.is_empty() {
            return Self::default();
        }
        let denom = episodes.len() as f64;
        let count = |reason: DoneReason| {
            episodes
                .iter()
                .filter(|e| e.reason == Some(reason))
                .count()
        };
        Self {
            episodes: episodes.len(),
            avg_reward: episodes.iter().map(|e| e.reward).sum::<f64>() / denom,
            avg_steps: episodes.iter().map(|e| e.steps as f64).sum::<f64>() / denom,
            avg_x: episodes.iter().map(|e| e.info.x_pos as f64).sum::<f64>() / denom,
            max_x: episodes.iter().map(|e| e.info.x_pos).max().unwrap_or(0),
            avg_score: episodes.iter().map(|e| e.info.score as f64).sum::<f64>() / denom,
            completions: count(DoneReason::Completion),
            deaths: count(DoneReason::Death),
            timeouts: count(DoneReason::Timeout),
        }
    }
}

/// Plays `episodes` episodes, asking `policy` for an action index each step.
/// `policy` sees the latest observation and, after the first step, its info.
pub fn run_rollout<E, P>(
    env: &mut MarioEnv<E>,
    episodes: usize,
    mut policy: P,
) -> Result<Vec<EpisodeSummary>, EnvError>
where
    E: Emulator,
    P: FnMut(&Frame, Option<&Info>) -> usize,
{
    let mut summaries = Vec::with_capacity(episodes);

    for episode in 0..episodes {
        let mut observation = env.reset()?;
        let mut info: Option<Info> = None;
        let mut reward = 0.0f64;

        let (steps, reason) = loop {
            let action = policy(&observation, info.as_ref());
            let result = env.step(action)?;
            reward += result.reward as f64;
            observation = result.observation;
            info = Some(result.info);
            if result.done {
                let steps = env.episode().map(|ctx| ctx.steps).unwrap_or(0);
                break (steps, result.reason);
            }
        };

        let summary = EpisodeSummary {
            stage: env.target().unwrap_or_else(|| StageId::new(1, 1)),
            reward,
            steps,
            reason,
            info: info.unwrap_or_default(),
        };
        info!(
            "episode {}/{episodes}: stage {} reward={:.1} steps={} x={} reason={:?}",
            episode + 1,
            summary.stage,
            summary.reward,
            summary.steps,
            summary.info.x_pos,
            summary.reason,
        );
        summaries.push(summary);
    }

    Ok(summaries)
}

/// Uniformly random actions, the usual baseline agent.
pub fn random_policy(
    action_count: usize,
    seed: Option<u64>,
) -> impl FnMut(&Frame, Option<&Info>) -> usize {
    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    };
    move |_, _| rng.random_range(0..action_count.max(1))
}
