use super::{
    bots::{a_star_bot::AStarBot, q_learning_bot::QLearningBot},
    snake_game::{Board, DeathBoard, Direction, GridConfig, Move, Position, Result},
};

/// Everything the host tells an agent at the start of a turn.
#[derive(Clone, Copy, Debug)]
pub struct Turn<'a> {
    pub board: &'a Board,
    pub score: u32,
    pub turns_alive: u32,
    /// Turns left before starving, `None` if starving is disabled.
    pub turns_to_starve: Option<u32>,
    pub facing: Direction,
    /// The host guarantees this cell holds the snake head.
    pub head_position: Position,
    /// Body cells from the one behind the head to the tail.
    pub body_parts: &'a [Position],
}

/// Contract between the game loop and a move selection strategy.
pub trait SnakeAgent {
    /// Picks the move for this turn.
    ///
    /// # Errors
    ///
    /// Only for situations the strategy cannot recover from, such as a board without
    /// food. The host treats an error like an invalid move.
    fn get_move(&mut self, turn: &Turn<'_>) -> Result<Move>;

    /// Whether the host should draw the board before asking for a move.
    fn should_redraw_board(&self) -> bool {
        true
    }

    fn should_grow_on_food_collision(&self) -> bool {
        true
    }

    /// Called once per death, before the next snake spawns.
    fn on_die(
        &mut self,
        head_position: Position,
        board: &DeathBoard,
        score: u32,
        body_parts: &[Position],
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnakeBotType {
    AStarBot,
    QLearningBot,
}

impl SnakeBotType {
    pub const VALUES: [Self; 2] = [Self::AStarBot, Self::QLearningBot];

    /// Builds a bot of this type with default settings for `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`super::snake_game::SnakeError::InvalidConfig`] if `grid` is invalid.
    pub fn make_new_bot(&self, grid: GridConfig) -> Result<Box<dyn SnakeAgent>> {
        let bot: Box<dyn SnakeAgent> = match self {
            SnakeBotType::AStarBot => Box::new(AStarBot::new(grid, Default::default())?),
            SnakeBotType::QLearningBot => Box::new(QLearningBot::new(grid, Default::default())?),
        };
        Ok(bot)
    }
}

impl std::fmt::Display for SnakeBotType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnakeBotType::AStarBot => write!(f, "A* Food Seeking Bot"),
            SnakeBotType::QLearningBot => write!(f, "Q Learning Bot"),
        }
    }
}
