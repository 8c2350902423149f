//! Module to perform tabular Q learning over relative snake moves.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::snake::snake_game::{
    CellClass, Direction, GridConfig, Move, Position, Result, SnakeError,
};

/// Reward for stepping onto each kind of cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rewards {
    pub food: f32,
    pub open: f32,
    /// Also used for leaving the grid.
    pub lethal: f32,
}

impl Rewards {
    #[must_use]
    pub fn for_cell(&self, cell: CellClass) -> f32 {
        match cell {
            CellClass::Food => self.food,
            CellClass::Open => self.open,
            CellClass::Lethal => self.lethal,
        }
    }
}

impl Default for Rewards {
    fn default() -> Self {
        Self {
            food: 100.0,
            open: -1.0,
            lethal: -100.0,
        }
    }
}

/// Exploration rate that shrinks with every turn taken.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpsilonSchedule {
    pub start: f64,
    /// Multiplier applied once per turn.
    pub decay: f64,
    pub floor: f64,
}

impl EpsilonSchedule {
    /// Epsilon after `turns` turns: `max(floor, start * decay^turns)`.
    #[must_use]
    pub fn value(&self, turns: u64) -> f64 {
        // past i32::MAX turns the power has long since underflowed to the floor
        let exponent = i32::try_from(turns).unwrap_or(i32::MAX);
        (self.start * self.decay.powi(exponent)).max(self.floor)
    }

    fn validate(&self) -> Result<()> {
        let ok = self.floor > 0.0
            && self.floor <= self.start
            && self.start <= 1.0
            && self.decay > 0.0
            && self.decay <= 1.0;
        if ok {
            Ok(())
        } else {
            Err(SnakeError::InvalidConfig(format!(
                "epsilon needs 0 < floor <= start <= 1 and 0 < decay <= 1, got {self:?}"
            )))
        }
    }
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self {
            start: 1.0,
            decay: 0.999,
            floor: 0.1,
        }
    }
}

/// Hyperparameters for [`QLearner`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QLearningConfig {
    /// Learning rate.
    pub alpha: f32,
    /// Weight decay for future rewards.
    pub gamma: f32,
    pub epsilon: EpsilonSchedule,
    pub rewards: Rewards,
    /// How many times a turn may pick an action before giving up.
    pub max_action_retries: usize,
    /// Fixed seed for reproducible runs. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Upper bound on the number of `f32` values the table may allocate.
    pub max_table_values: usize,
}

impl QLearningConfig {
    /// # Errors
    ///
    /// Returns [`SnakeError::InvalidConfig`] when a rate is out of range or no retry is allowed.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(SnakeError::InvalidConfig(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(SnakeError::InvalidConfig(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if self.max_action_retries == 0 {
            return Err(SnakeError::InvalidConfig(
                "max_action_retries must be at least 1".to_string(),
            ));
        }
        self.epsilon.validate()
    }
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.9,
            epsilon: EpsilonSchedule::default(),
            rewards: Rewards::default(),
            max_action_retries: Move::VARIANTS.len(),
            seed: None,
            // 256 MiB of values, a 25x25 board needs under 20 MiB
            max_table_values: 1 << 26,
        }
    }
}

/// What the learner sees each turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub head: Position,
    pub facing: Direction,
    pub food: Position,
}

/// Temporal difference update: `(1 - alpha) * old + alpha * (reward + gamma * next_max)`.
#[must_use]
pub fn td_update(old: f32, reward: f32, next_max: f32, alpha: f32, gamma: f32) -> f32 {
    (1.0 - alpha) * old + alpha * (reward + gamma * next_max)
}

/// Dense table of action values over every head, facing and food combination.
#[derive(Clone, Debug)]
pub struct QTable {
    width: usize,
    height: usize,
    values: Vec<[f32; 3]>,
}

impl QTable {
    /// Number of `f32` values a table for `grid` holds, `None` if it overflows `usize`.
    #[must_use]
    pub fn value_count(grid: &GridConfig) -> Option<usize> {
        let cells = grid.width.checked_mul(grid.height)?;
        cells
            .checked_mul(Direction::VARIANTS.len())?
            .checked_mul(cells)?
            .checked_mul(Move::VARIANTS.len())
    }

    /// # Errors
    ///
    /// Returns [`SnakeError::InvalidConfig`] if the table for `grid` would hold more than
    /// `max_values` values.
    pub fn new(grid: &GridConfig, max_values: usize) -> Result<Self> {
        let count = Self::value_count(grid)
            .filter(|count| *count <= max_values)
            .ok_or_else(|| {
                SnakeError::InvalidConfig(format!(
                    "value table for a {}x{} grid exceeds {max_values} values",
                    grid.width, grid.height
                ))
            })?;
        Ok(Self {
            width: grid.width,
            height: grid.height,
            values: vec![[0.0; 3]; count / Move::VARIANTS.len()],
        })
    }

    fn cell_index(&self, position: Position) -> Option<usize> {
        let x = usize::try_from(position.x).ok()?;
        let y = usize::try_from(position.y).ok()?;
        (x < self.width && y < self.height).then_some(y * self.width + x)
    }

    fn index(&self, state: &StateKey) -> Result<usize> {
        let head = self
            .cell_index(state.head)
            .ok_or(SnakeError::BoundsViolation(state.head))?;
        let food = self
            .cell_index(state.food)
            .ok_or(SnakeError::BoundsViolation(state.food))?;
        let cells = self.width * self.height;
        Ok((head * Direction::VARIANTS.len() + state.facing.index()) * cells + food)
    }

    /// Values for every move in [`Move::VARIANTS`] order.
    ///
    /// # Errors
    ///
    /// Returns [`SnakeError::BoundsViolation`] if the head or food lies outside the table.
    pub fn get(&self, state: &StateKey) -> Result<[f32; 3]> {
        Ok(self.values[self.index(state)?])
    }

    /// # Errors
    ///
    /// Returns [`SnakeError::BoundsViolation`] if the head or food lies outside the table.
    pub fn set(&mut self, state: &StateKey, mv: Move, value: f32) -> Result<()> {
        let i = self.index(state)?;
        self.values[i][mv.index()] = value;
        Ok(())
    }

    /// Highest value stored for `state`.
    ///
    /// # Errors
    ///
    /// Returns [`SnakeError::BoundsViolation`] if the head or food lies outside the table.
    pub fn max_value(&self, state: &StateKey) -> Result<f32> {
        Ok(self.get(state)?.into_iter().fold(f32::NEG_INFINITY, f32::max))
    }

    /// Highest valued move among those `allowed`, first one wins on ties.
    ///
    /// # Errors
    ///
    /// Returns [`SnakeError::BoundsViolation`] if the head or food lies outside the table.
    pub fn best_move(&self, state: &StateKey, allowed: &[Move]) -> Result<Option<Move>> {
        let values = self.get(state)?;
        let mut best: Option<(Move, f32)> = None;
        for mv in Move::VARIANTS {
            if !allowed.contains(&mv) {
                continue;
            }
            let value = values[mv.index()];
            if best.map_or(true, |(_, b)| value > b) {
                best = Some((mv, value));
            }
        }
        Ok(best.map(|(mv, _)| mv))
    }
}

/// Epsilon greedy learner owning the value table.
#[derive(Debug)]
pub struct QLearner {
    table: QTable,
    config: QLearningConfig,
    epsilon: f64,
    rng: StdRng,
}

impl QLearner {
    /// # Errors
    ///
    /// Returns [`SnakeError::InvalidConfig`] if either config is invalid or the value
    /// table for `grid` is larger than `config.max_table_values`.
    pub fn new(grid: &GridConfig, config: QLearningConfig) -> Result<Self> {
        grid.validate()?;
        config.validate()?;
        let table = QTable::new(grid, config.max_table_values)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            table,
            epsilon: config.epsilon.value(0),
            config,
            rng,
        })
    }

    #[must_use]
    pub fn get_table(&self) -> &QTable {
        &self.table
    }

    #[must_use]
    pub fn get_config(&self) -> &QLearningConfig {
        &self.config
    }

    #[must_use]
    pub fn get_epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Recomputes epsilon from the total number of turns taken.
    pub fn decay_epsilon(&mut self, turns_taken: u64) {
        self.epsilon = self.config.epsilon.value(turns_taken);
    }

    /// Select an action among `allowed` using the eps greedy algorithm.
    ///
    /// Returns `Ok(None)` if nothing is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`SnakeError::BoundsViolation`] if `state` lies outside the table.
    pub fn select_action(&mut self, state: &StateKey, allowed: &[Move]) -> Result<Option<Move>> {
        if allowed.is_empty() {
            return Ok(None);
        }
        if self.rng.gen_range(0.0..1.0) < self.epsilon {
            return Ok(Some(allowed[self.rng.gen_range(0..allowed.len())]));
        }
        self.table.best_move(state, allowed)
    }

    /// Applies one update for taking `mv` in `state`.
    ///
    /// `next` is `None` when the move ends the episode outright, in which case no future
    /// value is added. Returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`SnakeError::BoundsViolation`] if `state` or `next` lies outside the table.
    pub fn learn(
        &mut self,
        state: &StateKey,
        mv: Move,
        reward: f32,
        next: Option<&StateKey>,
    ) -> Result<f32> {
        let old = self.table.get(state)?[mv.index()];
        let next_max = match next {
            Some(next) => self.table.max_value(next)?,
            None => 0.0,
        };
        let value = td_update(old, reward, next_max, self.config.alpha, self.config.gamma);
        self.table.set(state, mv, value)?;
        Ok(value)
    }
}
