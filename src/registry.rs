//! Environment ids in the `SuperMarioBros[-W-S]-vN` family.
//!
//! The id picks how episodes are laid out (whole game, one stage, or random
//! stages) and the version picks which ROM variant is loaded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::env::EnvConfig;
use crate::error::EnvError;
use crate::stage::{StageId, StagePool};

const FAMILY: &str = "SuperMarioBros";
const RANDOM_STAGES: &str = "SuperMarioBrosRandomStages";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RomMode {
    #[default]
    Vanilla,
    Downsample,
    Pixel,
    Rectangle,
}

impl RomMode {
    pub fn from_version(version: u8) -> Option<Self> {
        match version {
            0 => Some(RomMode::Vanilla),
            1 => Some(RomMode::Downsample),
            2 => Some(RomMode::Pixel),
            3 => Some(RomMode::Rectangle),
            _ => None,
        }
    }

    pub fn version(self) -> u8 {
        match self {
            RomMode::Vanilla => 0,
            RomMode::Downsample => 1,
            RomMode::Pixel => 2,
            RomMode::Rectangle => 3,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            RomMode::Vanilla => "super-mario-bros.nes",
            RomMode::Downsample => "super-mario-bros-downsample.nes",
            RomMode::Pixel => "super-mario-bros-pixel.nes",
            RomMode::Rectangle => "super-mario-bros-rectangle.nes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvKind {
    /// 1-1 onwards until the game is over.
    FullGame,
    Stage(StageId),
    RandomStages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId {
    pub kind: EnvKind,
    pub rom_mode: RomMode,
}

impl EnvId {
    pub fn parse(id: &str) -> Result<Self, EnvError> {
        let bad = |why: &str| EnvError::config(format!("unknown environment id {id:?}: {why}"));

        let (body, version) = id
            .rsplit_once("-v")
            .ok_or_else(|| bad("missing -vN suffix"))?;
        let version: u8 = version
            .parse()
            .map_err(|_| bad("version is not a number"))?;
        let rom_mode = RomMode::from_version(version).ok_or_else(|| bad("version must be 0-3"))?;

        let kind = if body == FAMILY {
            EnvKind::FullGame
        } else if body == RANDOM_STAGES {
            EnvKind::RandomStages
        } else if let Some(stage) = body
            .strip_prefix(FAMILY)
            .and_then(|rest| rest.strip_prefix('-'))
        {
            let stage: StageId = stage.parse().map_err(|_| bad("expected W-S"))?;
            EnvKind::Stage(stage)
        } else {
            return Err(bad("not a SuperMarioBros id"));
        };

        Ok(Self { kind, rom_mode })
    }

    pub fn rom_path(&self, rom_dir: &Path) -> std::path::PathBuf {
        rom_dir.join(self.rom_mode.file_name())
    }

    pub fn config(&self, rom_dir: &Path) -> EnvConfig {
        let config = match self.kind {
            EnvKind::FullGame => EnvConfig::full_game(),
            EnvKind::Stage(stage) => EnvConfig::single_stage(stage),
            EnvKind::RandomStages => EnvConfig::random_stages(StagePool::all(), None),
        };
        EnvConfig {
            rom_path: self.rom_path(rom_dir),
            ..config
        }
    }

    /// Like [`EnvId::config`], restricting a random-stage id to `stages`.
    pub fn config_with_stages<S: AsRef<str>>(
        &self,
        rom_dir: &Path,
        stages: &[S],
    ) -> Result<EnvConfig, EnvError> {
        if self.kind != EnvKind::RandomStages {
            return Err(EnvError::config(format!(
                "{self} does not take a stage list"
            )));
        }
        let pool = StagePool::parse(stages)?;
        pool.validate()?;
        Ok(EnvConfig {
            stage_pool: pool,
            ..self.config(rom_dir)
        })
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.rom_mode.version();
        match self.kind {
            EnvKind::FullGame => write!(f, "{FAMILY}-v{v}"),
            EnvKind::Stage(stage) => write!(f, "{FAMILY}-{stage}-v{v}"),
            EnvKind::RandomStages => write!(f, "{RANDOM_STAGES}-v{v}"),
        }
    }
}

impl FromStr for EnvId {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnvId::parse(s)
    }
}
