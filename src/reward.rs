use serde::{Deserialize, Serialize};

use crate::error::EnvError;
use crate::state::GameState;

// =============================================================================
// Reward Tuning Knobs
// =============================================================================

/// When a death ends the episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The first frame of a death animation ends the episode.
    LifeLoss,
    /// Only running out of lives ends the episode.
    GameOver,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub reward_clamp: f32,
    /// Frames where `|dx|` exceeds this count as no movement.
    pub x_discontinuity: Option<u32>,
    /// Per in-game clock tick; zero or negative.
    pub time_penalty: f32,
    pub death_penalty: f32,
    pub completion_bonus: f32,
    pub max_steps: u64,
    pub termination: Termination,
    pub end_on_completion: bool,
    /// Lives counter value once the last life is gone.
    pub game_over_lives: u8,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            reward_clamp: 5.0,
            x_discontinuity: None,
            time_penalty: -0.1,
            death_penalty: -25.0,
            completion_bonus: 50.0,
            max_steps: 10_000,
            termination: Termination::LifeLoss,
            end_on_completion: true,
            game_over_lives: 0xFF,
        }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> Result<(), EnvError> {
        if !self.reward_clamp.is_finite() || self.reward_clamp <= 0.0 {
            return Err(EnvError::config(format!(
                "reward_clamp must be a positive number, got {}",
                self.reward_clamp
            )));
        }
        if !self.time_penalty.is_finite() || self.time_penalty > 0.0 {
            return Err(EnvError::config(format!(
                "time_penalty must be zero or negative, got {}",
                self.time_penalty
            )));
        }
        if !self.death_penalty.is_finite() || self.death_penalty > 0.0 {
            return Err(EnvError::config(format!(
                "death_penalty must be zero or negative, got {}",
                self.death_penalty
            )));
        }
        if !self.completion_bonus.is_finite() || self.completion_bonus < 0.0 {
            return Err(EnvError::config(format!(
                "completion_bonus must be zero or positive, got {}",
                self.completion_bonus
            )));
        }
        if self.max_steps == 0 {
            return Err(EnvError::config("max_steps must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// Reward Engine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    Death,
    Completion,
    Timeout,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RewardBreakdown {
    pub movement: f64,
    pub time: f64,
    pub death: f64,
    pub completion: f64,
}

impl RewardBreakdown {
    pub fn total(&self) -> f64 {
        self.movement + self.time + self.death + self.completion
    }

    pub fn accumulate(&mut self, other: &RewardBreakdown) {
        self.movement += other.movement;
        self.time += other.time;
        self.death += other.death;
        self.completion += other.completion;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RewardOutcome {
    pub reward: f32,
    pub done: bool,
    pub reason: Option<DoneReason>,
    pub breakdown: RewardBreakdown,
}

/// Scores one frame transition. Holds configuration only.
#[derive(Debug, Clone)]
pub struct RewardEngine {
    config: RewardConfig,
}

impl RewardEngine {
    pub fn new(config: RewardConfig) -> Result<Self, EnvError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Reward and termination for one emulated frame. The step limit is
    /// applied per agent step by [`RewardEngine::finish_step`].
    pub fn compute(&self, prev: &GameState, curr: &GameState) -> RewardOutcome {
        let rc = &self.config;

        let mut dx = curr.x_position as i64 - prev.x_position as i64;
        if rc
            .x_discontinuity
            .is_some_and(|limit| dx.unsigned_abs() > limit as u64)
        {
            dx = 0;
        }
        let clamp = rc.reward_clamp as f64;
        let movement = (dx as f64).clamp(-clamp, clamp);

        let ticks = prev.time_remaining.saturating_sub(curr.time_remaining);
        let time = rc.time_penalty as f64 * ticks as f64;

        let died = curr.is_dead && !prev.is_dead;
        let death = if died { rc.death_penalty as f64 } else { 0.0 };

        let completed = curr.is_level_complete && !prev.is_level_complete;
        let completion = if completed {
            rc.completion_bonus as f64
        } else {
            0.0
        };

        let breakdown = RewardBreakdown {
            movement,
            time,
            death,
            completion,
        };

        let reason = if self.death_ends_episode(curr) {
            Some(DoneReason::Death)
        } else if rc.end_on_completion && curr.is_level_complete {
            Some(DoneReason::Completion)
        } else {
            None
        };

        RewardOutcome {
            reward: breakdown.total() as f32,
            done: reason.is_some(),
            reason,
            breakdown,
        }
    }

    /// Marks the outcome of an agent step as timed out once `steps_taken`
    /// reaches `max_steps`, unless it already ended for another reason.
    pub fn finish_step(&self, mut outcome: RewardOutcome, steps_taken: u64) -> RewardOutcome {
        if !outcome.done && steps_taken >= self.config.max_steps {
            outcome.done = true;
            outcome.reason = Some(DoneReason::Timeout);
        }
        outcome
    }

    fn death_ends_episode(&self, curr: &GameState) -> bool {
        match self.config.termination {
            Termination::LifeLoss => curr.is_dead,
            // The counter only rolls over once the death animation has played out.
            Termination::GameOver => curr.lives == self.config.game_over_lives,
        }
    }
}
