pub mod action;
pub mod emulator;
pub mod env;
pub mod error;
pub mod registry;
pub mod reward;
pub mod rollout;
pub mod stage;
pub mod state;
#[cfg(feature = "tetanes")]
pub mod tetanes;

#[cfg(test)]
mod test_utils;

pub use action::{ActionEntry, ActionSet, ActionTable, Buttons};
pub use emulator::{Emulator, EmulatorMemory, FRAME_HEIGHT, FRAME_WIDTH, Frame, MemoryView};
pub use env::{
    AfterDone, EnvConfig, EpisodeContext, EpisodeMode, Info, MarioEnv, Phase, StepResult,
};
pub use error::{EmulatorFault, EnvError};
pub use registry::{EnvId, EnvKind, RomMode};
pub use reward::{
    DoneReason, RewardBreakdown, RewardConfig, RewardEngine, RewardOutcome, Termination,
};
pub use rollout::{EpisodeSummary, RolloutStats, random_policy, run_rollout};
pub use stage::{PoolEntry, StageId, StagePolicy, StagePool, StageSelector};
pub use state::{GameState, PlayerState, ram};
