use std::fmt;
use std::str::FromStr;

use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::EnvError;

pub const WORLDS: std::ops::RangeInclusive<u8> = 1..=8;
pub const STAGES: std::ops::RangeInclusive<u8> = 1..=4;
pub const AREAS: std::ops::RangeInclusive<u8> = 1..=5;

// =============================================================================
// Stage Identity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId {
    pub world: u8,
    pub stage: u8,
    pub area: u8,
}

impl StageId {
    /// Derives the area index the game uses for `world-stage`.
    pub fn new(world: u8, stage: u8) -> Self {
        // These worlds open their later stages with a pipe-intro area.
        let area = if matches!(world, 1 | 2 | 4 | 7) && stage >= 2 {
            stage + 1
        } else {
            stage
        };
        Self { world, stage, area }
    }

    pub fn with_area(world: u8, stage: u8, area: u8) -> Self {
        Self { world, stage, area }
    }

    pub fn validate(&self) -> Result<(), EnvError> {
        if !WORLDS.contains(&self.world)
            || !STAGES.contains(&self.stage)
            || !AREAS.contains(&self.area)
        {
            return Err(EnvError::config(format!(
                "stage {}-{} (area {}) is outside worlds 1-8, stages 1-4, areas 1-5",
                self.world, self.stage, self.area
            )));
        }
        Ok(())
    }

    /// Zero-based RAM encoding `(world, stage, area)`.
    pub fn ram_bytes(&self) -> (u8, u8, u8) {
        (
            self.world.saturating_sub(1),
            self.stage.saturating_sub(1),
            self.area.saturating_sub(1),
        )
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.world, self.stage)
    }
}

impl FromStr for StageId {
    type Err = EnvError;

    /// Parses `"W-S"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || EnvError::config(format!("stage {s:?} is not of the form W-S"));
        let (w, st) = s.trim().split_once('-').ok_or_else(bad)?;
        let world = w.parse::<u8>().map_err(|_| bad())?;
        let stage = st.parse::<u8>().map_err(|_| bad())?;
        let id = StageId::new(world, stage);
        id.validate()?;
        Ok(id)
    }
}

// =============================================================================
// Stage Pool
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub stage: StageId,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagePool {
    entries: Vec<PoolEntry>,
}

impl StagePool {
    pub fn new(stages: impl IntoIterator<Item = StageId>) -> Self {
        Self {
            entries: stages
                .into_iter()
                .map(|stage| PoolEntry { stage, weight: 1 })
                .collect(),
        }
    }

    pub fn weighted(entries: impl IntoIterator<Item = (StageId, u32)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(stage, weight)| PoolEntry { stage, weight })
                .collect(),
        }
    }

    /// Every stage of the game, 1-1 through 8-4.
    pub fn all() -> Self {
        Self::new(WORLDS.flat_map(|w| STAGES.map(move |s| StageId::new(w, s))))
    }

    pub fn parse<S: AsRef<str>>(stages: &[S]) -> Result<Self, EnvError> {
        let ids = stages
            .iter()
            .map(|s| s.as_ref().parse::<StageId>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(ids))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ {
        self.entries.iter().map(|e| e.stage)
    }

    pub fn validate(&self) -> Result<(), EnvError> {
        for entry in &self.entries {
            entry.stage.validate()?;
        }
        if !self.entries.is_empty() && self.entries.iter().all(|e| e.weight == 0) {
            return Err(EnvError::config("stage pool weights are all zero"));
        }
        Ok(())
    }
}

// =============================================================================
// Stage Selector
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePolicy {
    Fixed(StageId),
    Sequential,
    Random {
        #[serde(default)]
        no_immediate_repeat: bool,
    },
}

impl Default for StagePolicy {
    fn default() -> Self {
        StagePolicy::Fixed(StageId::new(1, 1))
    }
}

/// Picks the stage each episode starts on. Owns its random source.
#[derive(Debug, Clone)]
pub struct StageSelector {
    policy: StagePolicy,
    pool: StagePool,
    rng: SmallRng,
    cursor: usize,
    last: Option<StageId>,
}

impl StageSelector {
    pub fn new(policy: StagePolicy, pool: StagePool, seed: Option<u64>) -> Result<Self, EnvError> {
        match &policy {
            StagePolicy::Fixed(stage) => stage.validate()?,
            StagePolicy::Sequential | StagePolicy::Random { .. } => {
                if pool.is_empty() {
                    return Err(EnvError::config(format!(
                        "stage pool is empty under the {policy:?} policy"
                    )));
                }
            }
        }
        pool.validate()?;
        Ok(Self {
            policy,
            pool,
            rng: make_rng(seed),
            cursor: 0,
            last: None,
        })
    }

    pub fn policy(&self) -> &StagePolicy {
        &self.policy
    }

    pub fn pool(&self) -> &StagePool {
        &self.pool
    }

    pub fn last(&self) -> Option<StageId> {
        self.last
    }

    /// Restarts the random stream and the sequential cursor.
    pub fn reseed(&mut self, seed: Option<u64>) {
        self.rng = make_rng(seed);
        self.cursor = 0;
        self.last = None;
    }

    pub fn select(&mut self) -> Result<StageId, EnvError> {
        let picked = match &self.policy {
            StagePolicy::Fixed(stage) => *stage,
            StagePolicy::Sequential => {
                // Weight-0 entries are skipped, as the random policy never draws them.
                let entries = self.pool.entries();
                let len = entries.len();
                let index = (0..len)
                    .map(|offset| (self.cursor + offset) % len)
                    .find(|&i| entries[i].weight > 0)
                    .ok_or_else(|| EnvError::config("stage pool weights are all zero"))?;
                self.cursor = (index + 1) % len;
                entries[index].stage
            }
            StagePolicy::Random {
                no_immediate_repeat,
            } => {
                let entries = self.pool.entries();
                let mut weights: Vec<u32> = entries.iter().map(|e| e.weight).collect();
                if let (true, Some(last)) = (*no_immediate_repeat, self.last) {
                    let mut masked = weights.clone();
                    for (w, e) in masked.iter_mut().zip(entries) {
                        if e.stage == last {
                            *w = 0;
                        }
                    }
                    if masked.iter().any(|&w| w > 0) {
                        weights = masked;
                    }
                }
                let index = if weights.windows(2).all(|w| w[0] == w[1]) {
                    self.rng.random_range(0..entries.len())
                } else {
                    WeightedIndex::new(&weights)
                        .map_err(|e| EnvError::config(format!("stage pool weights: {e}")))?
                        .sample(&mut self.rng)
                };
                entries[index].stage
            }
        };
        self.last = Some(picked);
        Ok(picked)
    }
}

fn make_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_os_rng(),
    }
}
