use log::{debug, info, warn};

use crate::{
    models::snake::{
        snake_bot::{SnakeAgent, Turn},
        snake_game::{
            DeathBoard, GridConfig, Move, PlanningFailure, Position, Result, SnakeError,
        },
    },
    search::a_star::{plan_to_food, SearchCosts},
};

/// What to do when no move towards the food can be planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fallback {
    /// Hand the planning failure to the host.
    Fail,
    /// Keep going straight and hope the board changes.
    #[default]
    Straight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AStarConfig {
    pub costs: SearchCosts,
    pub fallback: Fallback,
}

/// Steers along the cheapest path to the food, replanning every turn.
#[derive(Debug)]
pub struct AStarBot {
    grid: GridConfig,
    config: AStarConfig,
}

impl AStarBot {
    /// # Errors
    ///
    /// Returns [`SnakeError::InvalidConfig`] if `grid` is invalid.
    pub fn new(grid: GridConfig, config: AStarConfig) -> Result<Self> {
        grid.validate()?;
        Ok(Self { grid, config })
    }

    /// Plans this turn's move without any fallback.
    ///
    /// # Errors
    ///
    /// Returns the [`PlanningFailure`] if no legal first step towards food exists.
    pub fn plan_move(&self, turn: &Turn<'_>) -> std::result::Result<Move, PlanningFailure> {
        plan_to_food(
            turn.board,
            &self.grid,
            &self.config.costs,
            turn.head_position,
            turn.facing,
        )
        .map(|plan| {
            debug!(
                "Heading for {} via {} ({:?}), path cost {}",
                plan.goal, plan.first_step, plan.first_move, plan.cost
            );
            plan.first_move
        })
    }
}

impl SnakeAgent for AStarBot {
    fn get_move(&mut self, turn: &Turn<'_>) -> Result<Move> {
        match self.plan_move(turn) {
            Ok(mv) => Ok(mv),
            Err(PlanningFailure::NoFood) => Err(PlanningFailure::NoFood.into()),
            Err(e) => match self.config.fallback {
                Fallback::Straight => {
                    warn!("{e}. Going straight");
                    Ok(Move::Straight)
                }
                Fallback::Fail => Err(SnakeError::Planning(e)),
            },
        }
    }

    fn on_die(
        &mut self,
        head_position: Position,
        _board: &DeathBoard,
        score: u32,
        _body_parts: &[Position],
    ) {
        info!("A* bot died at {head_position} with score {score}");
    }
}
