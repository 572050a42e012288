use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::action::{ActionSet, ActionTable, Buttons};
use crate::emulator::{Emulator, EmulatorMemory, FRAME_HEIGHT, FRAME_WIDTH, Frame};
use crate::error::{EmulatorFault, EnvError};
use crate::reward::{
    DoneReason, RewardBreakdown, RewardConfig, RewardEngine, RewardOutcome, Termination,
};
use crate::stage::{StageId, StagePolicy, StagePool, StageSelector};
use crate::state::{GameState, PlayerState, ram};

// =============================================================================
// Environment Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeMode {
    /// One stage per episode.
    #[default]
    SingleStage,
    /// Play on through stage transitions until the game is over.
    FullGame,
}

/// What `step` does once the episode has ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfterDone {
    #[default]
    Error,
    /// Repeat the last observation with zero reward and `done = true`.
    RepeatLast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub rom_path: PathBuf,
    pub actions: ActionSet,
    pub stage_policy: StagePolicy,
    pub stage_pool: StagePool,
    pub reward: RewardConfig,
    pub seed: Option<u64>,
    pub mode: EpisodeMode,
    /// Frames each action is held for.
    pub frame_skip: u32,
    /// Consecutive frames the completion flag must hold before it counts.
    pub completion_debounce_frames: u32,
    pub reset_max_frames: u32,
    /// Upper bound on frames idled through cut-scenes after a step.
    pub skip_max_frames: u32,
    pub after_done: AfterDone,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            rom_path: PathBuf::from("super-mario-bros.nes"),
            actions: ActionSet::default(),
            stage_policy: StagePolicy::default(),
            stage_pool: StagePool::all(),
            reward: RewardConfig::default(),
            seed: None,
            mode: EpisodeMode::SingleStage,
            frame_skip: 1,
            completion_debounce_frames: 2,
            reset_max_frames: 1_200,
            skip_max_frames: 600,
            after_done: AfterDone::Error,
        }
    }
}

impl EnvConfig {
    pub fn single_stage(stage: StageId) -> Self {
        Self {
            stage_policy: StagePolicy::Fixed(stage),
            ..Default::default()
        }
    }

    pub fn random_stages(pool: StagePool, seed: Option<u64>) -> Self {
        Self {
            stage_policy: StagePolicy::Random {
                no_immediate_repeat: false,
            },
            stage_pool: pool,
            seed,
            ..Default::default()
        }
    }

    /// Starts at 1-1 and keeps going until the last life is lost.
    pub fn full_game() -> Self {
        Self {
            mode: EpisodeMode::FullGame,
            reward: RewardConfig {
                termination: Termination::GameOver,
                end_on_completion: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open config: {}", path.display()))?;
        let config: EnvConfig = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EnvError> {
        self.reward.validate()?;
        if self.frame_skip == 0 {
            return Err(EnvError::config("frame_skip must be at least 1"));
        }
        if self.completion_debounce_frames == 0 {
            return Err(EnvError::config(
                "completion_debounce_frames must be at least 1",
            ));
        }
        if self.reset_max_frames == 0 {
            return Err(EnvError::config("reset_max_frames must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// Step Output
// =============================================================================

/// Decoded variables reported alongside every observation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Info {
    pub score: u32,
    pub time: u16,
    pub coins: u8,
    pub lives: u8,
    pub x_pos: u32,
    pub y_pos: u16,
    pub world: u8,
    pub stage: u8,
    pub area: u8,
    pub status: PlayerState,
    pub flag_get: bool,
}

impl From<&GameState> for Info {
    fn from(s: &GameState) -> Self {
        Self {
            score: s.score,
            time: s.time_remaining,
            coins: s.coins,
            lives: s.lives,
            x_pos: s.x_position,
            y_pos: s.y_position,
            world: s.world,
            stage: s.stage,
            area: s.area,
            status: s.player_state,
            flag_get: s.is_level_complete,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Frame,
    pub reward: f32,
    pub done: bool,
    pub reason: Option<DoneReason>,
    pub info: Info,
}

// =============================================================================
// Episode Controller
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Uninitialized,
    Running,
    Terminated,
}

/// Per-episode bookkeeping, rebuilt by every `reset`.
#[derive(Debug, Clone)]
pub struct EpisodeContext {
    pub prev: GameState,
    pub total_reward: f64,
    pub steps: u64,
    pub frames: u64,
    pub target: StageId,
    pub breakdown: RewardBreakdown,
    pub done_reason: Option<DoneReason>,
    flag_streak: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Startup,
    WaitForLevel,
    WaitForClock,
    Playing,
}

const START_PRESS_INTERVAL: u32 = 30;

pub struct MarioEnv<E: Emulator> {
    emulator: E,
    config: EnvConfig,
    actions: ActionTable,
    rewards: RewardEngine,
    stages: StageSelector,
    phase: Phase,
    episode: Option<EpisodeContext>,
    last_observation: Option<Frame>,
    reward_debug: bool,
}

impl<E: Emulator> MarioEnv<E> {
    pub fn new(emulator: E, config: EnvConfig) -> Result<Self, EnvError> {
        config.validate()?;
        let actions = ActionTable::from_set(&config.actions)?;
        let rewards = RewardEngine::new(config.reward.clone())?;
        let stages = StageSelector::new(
            config.stage_policy.clone(),
            config.stage_pool.clone(),
            config.seed,
        )?;

        Ok(Self {
            emulator,
            config,
            actions,
            rewards,
            stages,
            phase: Phase::Uninitialized,
            episode: None,
            last_observation: None,
            reward_debug: Self::debug_reward_enabled(),
        })
    }

    fn debug_reward_enabled() -> bool {
        match std::env::var("SMB_DEBUG_REWARD") {
            Ok(val) => matches!(val.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"),
            Err(_) => false,
        }
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn action_table(&self) -> &ActionTable {
        &self.actions
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// `(height, width, channels)`
    pub fn observation_shape(&self) -> (usize, usize, usize) {
        (FRAME_HEIGHT, FRAME_WIDTH, 3)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn episode(&self) -> Option<&EpisodeContext> {
        self.episode.as_ref()
    }

    pub fn state(&self) -> Option<&GameState> {
        self.episode.as_ref().map(|ctx| &ctx.prev)
    }

    pub fn target(&self) -> Option<StageId> {
        self.episode.as_ref().map(|ctx| ctx.target)
    }

    pub fn emulator(&self) -> &E {
        &self.emulator
    }

    pub fn emulator_mut(&mut self) -> &mut E {
        &mut self.emulator
    }

    /// Restarts the stage selector's random stream.
    pub fn seed(&mut self, seed: Option<u64>) {
        self.stages.reseed(seed);
    }

    pub fn reset(&mut self) -> Result<Frame, EnvError> {
        self.episode = None;
        self.last_observation = None;
        self.phase = Phase::Uninitialized;

        let target = self.stages.select()?;
        info!("episode start: stage {target} (area {})", target.area);

        let state = self.run_state_machine(target)?;
        let mut ctx = EpisodeContext {
            prev: state,
            total_reward: 0.0,
            steps: 0,
            frames: 0,
            target,
            breakdown: RewardBreakdown::default(),
            done_reason: None,
            flag_streak: 0,
        };
        ctx.prev = self.observe(&mut ctx);
        if (ctx.prev.world, ctx.prev.stage) != (target.world, target.stage) {
            warn!(
                "requested stage {target} but the game reports {}",
                ctx.prev.level_name()
            );
        }

        let frame = self.emulator.frame();
        self.last_observation = Some(frame.clone());
        self.episode = Some(ctx);
        self.phase = Phase::Running;
        Ok(frame)
    }

    pub fn step(&mut self, action: usize) -> Result<StepResult, EnvError> {
        match self.phase {
            Phase::Uninitialized => return Err(EnvError::InvalidState { phase: self.phase }),
            Phase::Terminated => {
                return match self.config.after_done {
                    AfterDone::Error => Err(EnvError::InvalidState { phase: self.phase }),
                    AfterDone::RepeatLast => self.repeat_last(),
                };
            }
            Phase::Running => {}
        }

        // Rejected before the emulator or the episode is touched.
        let buttons = self.actions.to_bitmask(action)?;

        let mut ctx = self
            .episode
            .take()
            .ok_or(EnvError::InvalidState { phase: self.phase })?;
        let outcome = self.advance(&mut ctx, buttons);
        let info = Info::from(&ctx.prev);
        self.episode = Some(ctx);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("episode aborted: {e}");
                self.phase = Phase::Terminated;
                return Err(e);
            }
        };

        let observation = self.emulator.frame();
        self.last_observation = Some(observation.clone());
        if outcome.done {
            self.phase = Phase::Terminated;
            self.log_episode_end();
        }

        Ok(StepResult {
            observation,
            reward: outcome.reward,
            done: outcome.done,
            reason: outcome.reason,
            info,
        })
    }

    fn repeat_last(&self) -> Result<StepResult, EnvError> {
        let ctx = self
            .episode
            .as_ref()
            .ok_or(EnvError::InvalidState { phase: self.phase })?;
        Ok(StepResult {
            observation: self.last_observation.clone().unwrap_or_else(Frame::blank),
            reward: 0.0,
            done: true,
            reason: ctx.done_reason,
            info: Info::from(&ctx.prev),
        })
    }

    fn advance(
        &mut self,
        ctx: &mut EpisodeContext,
        buttons: Buttons,
    ) -> Result<RewardOutcome, EnvError> {
        ctx.steps += 1;

        let mut breakdown = RewardBreakdown::default();
        let mut reason = None;
        for _ in 0..self.config.frame_skip {
            self.clock_frame(buttons)?;
            ctx.frames += 1;

            let curr = self.observe(ctx);
            let frame = self.rewards.compute(&ctx.prev, &curr);
            breakdown.accumulate(&frame.breakdown);
            ctx.prev = curr;
            if frame.done {
                reason = frame.reason;
                break;
            }
        }

        if reason.is_none() {
            reason = self.settle(ctx, &mut breakdown)?;
        }

        let outcome = self.rewards.finish_step(
            RewardOutcome {
                reward: breakdown.total() as f32,
                done: reason.is_some(),
                reason,
                breakdown,
            },
            ctx.steps,
        );

        ctx.total_reward += outcome.reward as f64;
        ctx.breakdown.accumulate(&outcome.breakdown);
        ctx.done_reason = outcome.reason;
        Ok(outcome)
    }

    /// Fast-forwards through frames the agent cannot act in. Deaths and
    /// completions seen while skipping are scored into `breakdown`; movement
    /// and clock changes are not. Returns a done reason if the episode ended
    /// while skipping.
    fn settle(
        &mut self,
        ctx: &mut EpisodeContext,
        breakdown: &mut RewardBreakdown,
    ) -> Result<Option<DoneReason>, EnvError> {
        let start = ctx.frames;
        let reason = self.skip_uncontrollable(ctx, breakdown)?;
        let skipped = ctx.frames - start;
        if skipped > 0 {
            debug!("skipped {skipped} frame(s) after step {}", ctx.steps);
        }
        Ok(reason)
    }

    fn skip_uncontrollable(
        &mut self,
        ctx: &mut EpisodeContext,
        breakdown: &mut RewardBreakdown,
    ) -> Result<Option<DoneReason>, EnvError> {
        if ctx.prev.is_dead {
            self.kill_player();
            let reason = self.idle_frame(ctx, breakdown)?;
            if reason.is_some() {
                return Ok(reason);
            }
        }
        if self.config.mode == EpisodeMode::FullGame && ctx.prev.is_world_over {
            let reason = self.skip_end_of_world(ctx, breakdown)?;
            if reason.is_some() {
                return Ok(reason);
            }
        }
        self.skip_change_area();
        self.skip_occupied_states(ctx, breakdown)
    }

    /// Clocks one input-free frame and scores its termination transitions.
    fn idle_frame(
        &mut self,
        ctx: &mut EpisodeContext,
        breakdown: &mut RewardBreakdown,
    ) -> Result<Option<DoneReason>, EnvError> {
        self.clock_frame(Buttons::NOOP)?;
        ctx.frames += 1;

        let curr = self.observe(ctx);
        let frame = self.rewards.compute(&ctx.prev, &curr);
        breakdown.death += frame.breakdown.death;
        breakdown.completion += frame.breakdown.completion;
        ctx.prev = curr;
        Ok(frame.reason)
    }

    fn observe(&self, ctx: &mut EpisodeContext) -> GameState {
        let mut state = self.read_state();
        let required = self.config.completion_debounce_frames;
        if state.is_level_complete {
            ctx.flag_streak = ctx.flag_streak.saturating_add(1);
            if ctx.flag_streak < required {
                debug!(
                    "completion flag seen ({}/{required} frames)",
                    ctx.flag_streak
                );
            }
        } else {
            if ctx.flag_streak > 0 && ctx.flag_streak < required {
                warn!(
                    "completion flag dropped after {} frame(s) on {}, ignoring",
                    ctx.flag_streak,
                    state.level_name()
                );
            }
            ctx.flag_streak = 0;
        }
        state.is_level_complete = ctx.flag_streak >= required;
        state
    }

    fn read_state(&self) -> GameState {
        GameState::decode(&EmulatorMemory(&self.emulator))
    }

    fn log_episode_end(&self) {
        let Some(ctx) = self.episode.as_ref() else {
            return;
        };
        info!(
            "episode end: stage {target} reason={reason:?} steps={steps} reward={reward:.2} x={x} score={score}",
            target = ctx.target,
            reason = ctx.done_reason,
            steps = ctx.steps,
            reward = ctx.total_reward,
            x = ctx.prev.x_position,
            score = ctx.prev.score,
        );
        if self.reward_debug {
            let b = &ctx.breakdown;
            info!(
                "reward breakdown: movement={:.2} time={:.2} death={:.2} completion={:.2}",
                b.movement, b.time, b.death, b.completion
            );
        }
    }

    // -------------------------------------------------------------------------
    // Emulator plumbing
    // -------------------------------------------------------------------------

    fn clock_frame(&mut self, buttons: Buttons) -> Result<(), EnvError> {
        self.emulator.step(buttons)?;
        Ok(())
    }

    fn press_start(&mut self) -> Result<(), EnvError> {
        self.clock_frame(Buttons::START)?;
        self.clock_frame(Buttons::NOOP)
    }

    fn write_stage(&mut self, target: StageId) {
        let (world, stage, area) = target.ram_bytes();
        self.emulator.write_memory(ram::WORLD, world);
        self.emulator.write_memory(ram::STAGE, stage);
        self.emulator.write_memory(ram::AREA, area);
    }

    fn runout_prelevel_timer(&mut self) {
        self.emulator.write_memory(ram::PRELEVEL_TIMER, 0);
    }

    fn skip_change_area(&mut self) {
        let timer = self.emulator.read_memory(ram::CHANGE_AREA_TIMER);
        if 1 < timer && timer < 255 {
            self.emulator.write_memory(ram::CHANGE_AREA_TIMER, 1);
        }
    }

    /// Cuts the death animation short; takes effect on the next frame.
    fn kill_player(&mut self) {
        self.emulator
            .write_memory(ram::PLAYER_ROUTINE, ram::ROUTINE_DEAD);
    }

    /// Waits out the post-castle cut-scene until the clock moves.
    fn skip_end_of_world(
        &mut self,
        ctx: &mut EpisodeContext,
        breakdown: &mut RewardBreakdown,
    ) -> Result<Option<DoneReason>, EnvError> {
        let time = ctx.prev.time_remaining;
        let mut frames = 0;
        while ctx.prev.time_remaining == time && frames < self.config.skip_max_frames {
            if let Some(reason) = self.idle_frame(ctx, breakdown)? {
                return Ok(Some(reason));
            }
            frames += 1;
        }
        Ok(None)
    }

    fn skip_occupied_states(
        &mut self,
        ctx: &mut EpisodeContext,
        breakdown: &mut RewardBreakdown,
    ) -> Result<Option<DoneReason>, EnvError> {
        let mut frames = 0;
        while (ctx.prev.is_busy || ctx.prev.is_world_over) && !ctx.prev.is_dead {
            if frames >= self.config.skip_max_frames {
                warn!(
                    "still busy after {frames} skipped frames (routine=0x{:02X})",
                    ctx.prev.raw_player_state
                );
                break;
            }
            self.runout_prelevel_timer();
            if let Some(reason) = self.idle_frame(ctx, breakdown)? {
                return Ok(Some(reason));
            }
            frames += 1;
        }
        Ok(None)
    }

    /// Drives the title screen into the target stage and waits until the
    /// player has control.
    fn run_state_machine(&mut self, target: StageId) -> Result<GameState, EnvError> {
        self.emulator.reset()?;

        let max_frames = self.config.reset_max_frames;
        let mut session = SessionState::Startup;
        let mut frames = 0u32;
        let mut since_press = 0u32;
        let mut time_last = 0u16;

        loop {
            let state = self.read_state();
            if frames >= max_frames {
                return Err(EnvError::from(EmulatorFault::new(format!(
                    "timed out waiting for play state after {frames} frames \
                     (phase: {session:?}, engine mode: 0x{mode:02X}, time: {time})",
                    mode = self.emulator.read_memory(ram::GAME_ENGINE_MODE),
                    time = state.time_remaining,
                ))));
            }

            match session {
                SessionState::Startup => {
                    debug!("[sm] press start");
                    self.press_start()?;
                    frames = frames.saturating_add(2);
                    session = SessionState::WaitForLevel;
                }
                SessionState::WaitForLevel => {
                    self.write_stage(target);
                    self.runout_prelevel_timer();
                    if state.time_remaining > 0 {
                        debug!("[sm] level loaded, clock at {}", state.time_remaining);
                        time_last = state.time_remaining;
                        session = SessionState::WaitForClock;
                    } else if since_press >= START_PRESS_INTERVAL {
                        debug!("[sm] press start again");
                        self.press_start()?;
                        frames = frames.saturating_add(2);
                        since_press = 0;
                    } else {
                        self.clock_frame(Buttons::NOOP)?;
                        frames = frames.saturating_add(1);
                        since_press += 1;
                    }
                }
                SessionState::WaitForClock => {
                    if state.time_remaining < time_last && !state.is_busy {
                        session = SessionState::Playing;
                    } else {
                        time_last = time_last.max(state.time_remaining);
                        self.clock_frame(Buttons::NOOP)?;
                        frames = frames.saturating_add(1);
                    }
                }
                SessionState::Playing => {
                    debug!(
                        "[sm] playing {} after {frames} frames",
                        state.level_name()
                    );
                    return Ok(state);
                }
            }
        }
    }
}
