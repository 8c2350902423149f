use std::fmt;

use log::{debug, info};

use crate::{
    models::snake::{
        snake_bot::{SnakeAgent, Turn},
        snake_game::{
            classify, CellClass, DeathBoard, GridConfig, Move, PlanningFailure, Position, Result,
            SnakeError,
        },
    },
    rl::q_learning::{QLearner, QLearningConfig, StateKey},
};

/// Running totals kept by the learning bot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LearningStats {
    pub turns_taken: u64,
    pub food_eaten: u64,
    /// Steps into lethal cells or off the grid.
    pub penalties: u64,
}

impl LearningStats {
    /// Food eaten per penalty, `None` while no penalty has been taken.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn food_penalty_ratio(&self) -> Option<f64> {
        (self.penalties > 0).then(|| self.food_eaten as f64 / self.penalties as f64)
    }
}

impl fmt::Display for LearningStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "turns={} food={} penalties={} ratio=",
            self.turns_taken, self.food_eaten, self.penalties
        )?;
        match self.food_penalty_ratio() {
            Some(ratio) => write!(f, "{ratio:.3}"),
            None => write!(f, "undefined"),
        }
    }
}

/// Learns which relative move pays off from head, facing and food position.
///
/// The value table and lifetime totals survive deaths. Only the per life totals are reset.
#[derive(Debug)]
pub struct QLearningBot {
    grid: GridConfig,
    learner: QLearner,
    lifetime: LearningStats,
    life: LearningStats,
}

impl QLearningBot {
    /// # Errors
    ///
    /// Returns [`SnakeError::InvalidConfig`] if `grid` or `config` is invalid.
    pub fn new(grid: GridConfig, config: QLearningConfig) -> Result<Self> {
        let learner = QLearner::new(&grid, config)?;
        Ok(Self {
            grid,
            learner,
            lifetime: LearningStats::default(),
            life: LearningStats::default(),
        })
    }

    #[must_use]
    pub fn get_learner(&self) -> &QLearner {
        &self.learner
    }

    #[must_use]
    pub fn get_lifetime_stats(&self) -> LearningStats {
        self.lifetime
    }

    #[must_use]
    pub fn get_life_stats(&self) -> LearningStats {
        self.life
    }

    fn record_penalty(&mut self) {
        self.lifetime.penalties += 1;
        self.life.penalties += 1;
    }

    fn record_food(&mut self) {
        self.lifetime.food_eaten += 1;
        self.life.food_eaten += 1;
    }
}

impl SnakeAgent for QLearningBot {
    fn get_move(&mut self, turn: &Turn<'_>) -> Result<Move> {
        let (width, height) = (turn.board.get_width(), turn.board.get_height());
        if width > self.grid.width || height > self.grid.height {
            return Err(SnakeError::InvalidConfig(format!(
                "{width}x{height} board does not fit the {}x{} value table",
                self.grid.width, self.grid.height
            )));
        }
        let food = turn
            .board
            .get_food_location()
            .ok_or(PlanningFailure::NoFood)?;
        let state = StateKey {
            head: turn.head_position,
            facing: turn.facing,
            food,
        };
        let lethal = self.learner.get_config().rewards.lethal;
        let max_attempts = self.learner.get_config().max_action_retries;

        let mut allowed = Move::VARIANTS.to_vec();
        let mut chosen = None;
        for _ in 0..max_attempts {
            let Some(mv) = self.learner.select_action(&state, &allowed)? else {
                break;
            };
            let facing = turn.facing.rotate(mv);
            let next = turn.head_position.step(facing);
            if self.grid.contains(next) {
                chosen = Some((mv, next, facing));
                break;
            }
            // leaving the grid ends the game, so there is no future value to add
            debug!("{mv:?} from {} leaves the grid, picking again", turn.head_position);
            self.learner.learn(&state, mv, lethal, None)?;
            self.record_penalty();
            allowed.retain(|m| *m != mv);
        }
        let Some((mv, next, facing)) = chosen else {
            return Err(SnakeError::RetriesExhausted {
                attempts: max_attempts.min(Move::VARIANTS.len()),
            });
        };

        let cell = classify(turn.board.get(next));
        let reward = self.learner.get_config().rewards.for_cell(cell);
        match cell {
            CellClass::Food => self.record_food(),
            CellClass::Lethal => self.record_penalty(),
            CellClass::Open => (),
        }
        let next_state = StateKey {
            head: next,
            facing,
            food,
        };
        let value = self.learner.learn(&state, mv, reward, Some(&next_state))?;

        self.lifetime.turns_taken += 1;
        self.life.turns_taken += 1;
        self.learner.decay_epsilon(self.lifetime.turns_taken);
        debug!(
            "{mv:?} from {} to {next}: reward {reward}, value {value:.3}, epsilon {:.3}",
            turn.head_position,
            self.learner.get_epsilon()
        );
        Ok(mv)
    }

    fn should_redraw_board(&self) -> bool {
        false
    }

    fn on_die(
        &mut self,
        head_position: Position,
        _board: &DeathBoard,
        score: u32,
        _body_parts: &[Position],
    ) {
        info!(
            "Q learning bot died at {head_position} with score {score}. Life: {}. Lifetime: {}",
            self.life, self.lifetime
        );
        self.life = LearningStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snake::snake_game::{Board, Direction, GameObject};
    use crate::rl::q_learning::{td_update, EpsilonSchedule};

    fn greedy_config() -> QLearningConfig {
        QLearningConfig {
            epsilon: EpsilonSchedule {
                start: 1e-9,
                decay: 1.0,
                floor: 1e-9,
            },
            seed: Some(11),
            ..QLearningConfig::default()
        }
    }

    fn board_with(head: Position, food: Position) -> Board {
        let mut board = Board::new(5, 5);
        board.set(head, GameObject::SnakeHead).unwrap();
        board.set(food, GameObject::Food).unwrap();
        board
    }

    fn turn_on<'a>(board: &'a Board, head: Position, facing: Direction) -> Turn<'a> {
        Turn {
            board,
            score: 0,
            turns_alive: 0,
            turns_to_starve: Some(10),
            facing,
            head_position: head,
            body_parts: &[],
        }
    }

    #[test]
    fn first_step_matches_closed_form() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = greedy_config();
        let mut bot = QLearningBot::new(GridConfig::new(5, 5), config).unwrap();
        let head = Position::new(2, 2);
        let food = Position::new(4, 4);
        let board = board_with(head, food);

        // all zeros, so the greedy pick is the first move in order
        let mv = bot.get_move(&turn_on(&board, head, Direction::North)).unwrap();
        assert_eq!(mv, Move::Left);

        let state = StateKey {
            head,
            facing: Direction::North,
            food,
        };
        let expected = td_update(0.0, config.rewards.open, 0.0, config.alpha, config.gamma);
        let stored = bot.get_learner().get_table().get(&state).unwrap()[Move::Left.index()];
        assert!((stored - expected).abs() < 1e-6);
        assert!((stored - config.alpha * config.rewards.open).abs() < 1e-6);
        assert_eq!(bot.get_lifetime_stats().turns_taken, 1);
    }

    #[test]
    fn leaving_the_grid_is_penalised_and_retried() {
        let config = greedy_config();
        let mut bot = QLearningBot::new(GridConfig::new(5, 5), config).unwrap();
        let head = Position::new(0, 0);
        let board = board_with(head, Position::new(4, 4));

        // facing north in the corner only a right turn stays on the board
        let mv = bot.get_move(&turn_on(&board, head, Direction::North)).unwrap();
        assert_eq!(mv, Move::Right);

        let values = bot
            .get_learner()
            .get_table()
            .get(&StateKey {
                head,
                facing: Direction::North,
                food: Position::new(4, 4),
            })
            .unwrap();
        let penalty = config.alpha * config.rewards.lethal;
        assert!((values[Move::Left.index()] - penalty).abs() < 1e-6);
        assert!((values[Move::Straight.index()] - penalty).abs() < 1e-6);
        assert_eq!(bot.get_lifetime_stats().penalties, 2);
        assert_eq!(bot.get_lifetime_stats().turns_taken, 1);
    }

    #[test]
    fn retries_are_bounded() {
        let config = QLearningConfig {
            max_action_retries: 1,
            ..greedy_config()
        };
        let mut bot = QLearningBot::new(GridConfig::new(5, 5), config).unwrap();
        let head = Position::new(0, 0);
        let board = board_with(head, Position::new(4, 4));
        assert_eq!(
            bot.get_move(&turn_on(&board, head, Direction::North)),
            Err(SnakeError::RetriesExhausted { attempts: 1 })
        );

        // a head with no in-bounds successor gives up after every move was tried
        let mut bot = QLearningBot::new(GridConfig::new(1, 1), greedy_config()).unwrap();
        let mut board = Board::new(1, 1);
        board.set(head, GameObject::Food).unwrap();
        assert_eq!(
            bot.get_move(&turn_on(&board, head, Direction::North)),
            Err(SnakeError::RetriesExhausted { attempts: 3 })
        );
        assert_eq!(bot.get_lifetime_stats().penalties, 3);
    }

    #[test]
    fn eating_and_crashing_are_counted() {
        let mut bot = QLearningBot::new(GridConfig::new(5, 5), greedy_config()).unwrap();
        let head = Position::new(2, 2);
        // the greedy pick on a fresh table is a left turn, west of a north facing head
        let board = board_with(head, Position::new(1, 2));
        bot.get_move(&turn_on(&board, head, Direction::North)).unwrap();
        assert_eq!(bot.get_life_stats().food_eaten, 1);

        let mut board = board_with(head, Position::new(4, 4));
        board.set(Position::new(1, 2), GameObject::Wall).unwrap();
        bot.get_move(&turn_on(&board, head, Direction::North)).unwrap();
        assert_eq!(bot.get_life_stats().penalties, 1);
        assert_eq!(bot.get_life_stats().food_penalty_ratio(), Some(1.0));
    }

    #[test]
    fn death_resets_life_but_keeps_learning() {
        let mut bot = QLearningBot::new(GridConfig::new(5, 5), greedy_config()).unwrap();
        let head = Position::new(2, 2);
        let food = Position::new(4, 4);
        let board = board_with(head, food);
        bot.get_move(&turn_on(&board, head, Direction::North)).unwrap();
        let state = StateKey {
            head,
            facing: Direction::North,
            food,
        };
        let before = bot.get_learner().get_table().get(&state).unwrap();
        let epsilon = bot.get_learner().get_epsilon();

        bot.on_die(head, &DeathBoard::from_board(board), 0, &[]);

        assert_eq!(bot.get_life_stats(), LearningStats::default());
        assert_eq!(bot.get_lifetime_stats().turns_taken, 1);
        assert_eq!(bot.get_learner().get_table().get(&state).unwrap(), before);
        assert!((bot.get_learner().get_epsilon() - epsilon).abs() < f64::EPSILON);
    }

    #[test]
    fn board_larger_than_grid_is_rejected() {
        let mut bot = QLearningBot::new(GridConfig::new(5, 5), greedy_config()).unwrap();
        let mut board = Board::new(8, 8);
        let head = Position::new(2, 2);
        board.set(head, GameObject::SnakeHead).unwrap();
        board.set(Position::new(1, 1), GameObject::Food).unwrap();
        assert!(matches!(
            bot.get_move(&turn_on(&board, head, Direction::North)),
            Err(SnakeError::InvalidConfig(_))
        ));
        assert_eq!(bot.get_lifetime_stats(), LearningStats::default());

        // a smaller board still fits inside the table
        let mut board = Board::new(4, 4);
        board.set(head, GameObject::SnakeHead).unwrap();
        board.set(Position::new(1, 1), GameObject::Food).unwrap();
        assert!(bot.get_move(&turn_on(&board, head, Direction::North)).is_ok());
    }

    #[test]
    fn no_food_is_an_error() {
        let mut bot = QLearningBot::new(GridConfig::new(5, 5), greedy_config()).unwrap();
        let mut board = Board::new(5, 5);
        let head = Position::new(2, 2);
        board.set(head, GameObject::SnakeHead).unwrap();
        assert_eq!(
            bot.get_move(&turn_on(&board, head, Direction::North)),
            Err(SnakeError::Planning(PlanningFailure::NoFood))
        );
    }

    #[test]
    fn epsilon_follows_turns_taken() {
        let config = QLearningConfig {
            epsilon: EpsilonSchedule {
                start: 0.5,
                decay: 0.5,
                floor: 0.1,
            },
            seed: Some(5),
            ..QLearningConfig::default()
        };
        let mut bot = QLearningBot::new(GridConfig::new(5, 5), config).unwrap();
        let board = board_with(Position::new(2, 2), Position::new(4, 4));
        let mut last = bot.get_learner().get_epsilon();
        for _ in 0..5 {
            bot.get_move(&turn_on(&board, Position::new(2, 2), Direction::North))
                .unwrap();
            let eps = bot.get_learner().get_epsilon();
            assert!(eps <= last && eps >= 0.1);
            last = eps;
        }
        assert!((last - 0.1).abs() < 1e-12);
    }

    #[test]
    fn ratio_is_undefined_without_penalties() {
        let stats = LearningStats {
            turns_taken: 4,
            food_eaten: 2,
            penalties: 0,
        };
        assert_eq!(stats.food_penalty_ratio(), None);
        assert_eq!(stats.to_string(), "turns=4 food=2 penalties=0 ratio=undefined");
        let stats = LearningStats {
            penalties: 4,
            ..stats
        };
        assert_eq!(stats.to_string(), "turns=4 food=2 penalties=4 ratio=0.500");
    }

    #[test]
    fn learns_to_walk_into_food() {
        let config = QLearningConfig {
            epsilon: EpsilonSchedule {
                start: 1.0,
                decay: 0.99,
                floor: 0.1,
            },
            seed: Some(42),
            ..QLearningConfig::default()
        };
        let mut bot = QLearningBot::new(GridConfig::new(5, 5), config).unwrap();
        let head = Position::new(2, 2);
        let food = Position::new(2, 1);
        let board = board_with(head, food);
        for _ in 0..300 {
            bot.get_move(&turn_on(&board, head, Direction::North)).unwrap();
        }
        let best = bot
            .get_learner()
            .get_table()
            .best_move(
                &StateKey {
                    head,
                    facing: Direction::North,
                    food,
                },
                &Move::VARIANTS,
            )
            .unwrap();
        assert_eq!(best, Some(Move::Straight));
    }
}
