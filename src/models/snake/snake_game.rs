//! Grid model shared by every snake agent.
//!
//! Cell states, compass and relative directions, the host's board snapshot and the
//! playable bounds the agents navigate within.
use std::fmt;

use thiserror::Error;

/// Cost of stepping into a wall or snake when lethal cells are made traversable.
pub const LETHAL_COST: u32 = 1000;

pub type Result<T> = std::result::Result<T, SnakeError>;

/// Reasons the search strategy could not produce a move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningFailure {
    #[error("no food on the board")]
    NoFood,
    #[error("no path from {from} to {to}")]
    Unreachable { from: Position, to: Position },
    #[error("reconstructed path does not start with a legal move from {from}")]
    InconsistentPath { from: Position },
    #[error("head is already at the goal {0}")]
    AlreadyAtGoal(Position),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnakeError {
    #[error("planning failed: {0}")]
    Planning(#[from] PlanningFailure),
    #[error("position {0} is outside the grid")]
    BoundsViolation(Position),
    #[error("no in-bounds action found after {attempts} attempts")]
    RetriesExhausted { attempts: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("board columns must be non-empty and of equal length")]
    InvalidBoardSize,
}

/// Object that can be found on a board cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameObject {
    Empty,
    Food,
    Wall,
    SnakeHead,
    SnakeBody,
}

impl GameObject {
    #[must_use]
    pub fn is_snake(self) -> bool {
        matches!(self, GameObject::SnakeHead | GameObject::SnakeBody)
    }
}

/// What stepping onto a cell means to an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellClass {
    /// Wall, snake, or off the board.
    Lethal,
    Open,
    Food,
}

/// Classifies the target of a step. `None` means the target is off the board.
#[must_use]
pub fn classify(cell: Option<GameObject>) -> CellClass {
    match cell {
        Some(GameObject::Empty) => CellClass::Open,
        Some(GameObject::Food) => CellClass::Food,
        Some(GameObject::Wall | GameObject::SnakeHead | GameObject::SnakeBody) | None => {
            CellClass::Lethal
        }
    }
}

/// Absolute compass facing. North points to the top row (`y = 0`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const VARIANTS: [Direction; 4] = [Self::North, Self::South, Self::East, Self::West];

    #[must_use]
    pub fn value(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
        }
    }

    /// Facing after making `mv`. Left turns cycle North, West, South, East.
    #[must_use]
    pub fn rotate(self, mv: Move) -> Direction {
        match (mv, self) {
            (Move::Straight, d) => d,
            (Move::Left, Direction::North) | (Move::Right, Direction::South) => Direction::West,
            (Move::Left, Direction::West) | (Move::Right, Direction::East) => Direction::South,
            (Move::Left, Direction::South) | (Move::Right, Direction::North) => Direction::East,
            (Move::Left, Direction::East) | (Move::Right, Direction::West) => Direction::North,
        }
    }

    /// Dense index used by the value table.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
        }
    }
}

/// Relative move, the only thing an agent hands back to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Move {
    Left,
    Straight,
    Right,
}

impl Move {
    /// Fixed action order. Ties in the value table resolve to the earliest entry.
    pub const VARIANTS: [Move; 3] = [Self::Left, Self::Straight, Self::Right];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Move::Left => 0,
            Move::Straight => 1,
            Move::Right => 2,
        }
    }

    /// The move that takes a snake facing `facing` from `from` to the adjacent `to`.
    ///
    /// Returns `None` when `to` is not one of the three cells reachable in a single turn.
    #[must_use]
    pub fn between(facing: Direction, from: Position, to: Position) -> Option<Move> {
        Move::VARIANTS
            .into_iter()
            .find(|mv| from.step(facing.rotate(*mv)) == to)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn step(self, direction: Direction) -> Position {
        let (dx, dy) = direction.value();
        Position::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the up to three cells a snake can enter next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Neighbor {
    pub mv: Move,
    pub position: Position,
    /// Facing after arriving at `position`.
    pub facing: Direction,
}

/// Playable area the agents are allowed to move in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
    /// Rings of cells along the edge that count as out of bounds.
    pub margin: usize,
}

impl GridConfig {
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            margin: 0,
        }
    }

    #[must_use]
    pub fn with_margin(mut self, margin: usize) -> Self {
        self.margin = margin;
        self
    }

    /// # Errors
    ///
    /// Returns [`SnakeError::InvalidConfig`] if the margin leaves no playable cell or a
    /// dimension does not fit in an `i32` coordinate.
    pub fn validate(&self) -> Result<()> {
        if self.width <= 2 * self.margin || self.height <= 2 * self.margin {
            return Err(SnakeError::InvalidConfig(format!(
                "{}x{} grid with margin {} has no playable cells",
                self.width, self.height, self.margin
            )));
        }
        if i32::try_from(self.width).is_err() || i32::try_from(self.height).is_err() {
            return Err(SnakeError::InvalidConfig(format!(
                "{}x{} grid is too large",
                self.width, self.height
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        let (Ok(x), Ok(y)) = (usize::try_from(position.x), usize::try_from(position.y)) else {
            return false;
        };
        x >= self.margin
            && x + self.margin < self.width
            && y >= self.margin
            && y + self.margin < self.height
    }

    /// Cells reachable in one turn from `position` while facing `facing`, in
    /// [`Move::VARIANTS`] order. Anything outside the playable area is dropped.
    #[must_use]
    pub fn neighbors(&self, position: Position, facing: Direction) -> Vec<Neighbor> {
        Move::VARIANTS
            .into_iter()
            .filter_map(|mv| {
                let facing = facing.rotate(mv);
                let position = position.step(facing);
                self.contains(position).then_some(Neighbor {
                    mv,
                    position,
                    facing,
                })
            })
            .collect()
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self::new(25, 25)
    }
}

/// Snapshot of the board handed over by the host, accessed as `board[x][y]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    width: usize,
    height: usize,
    /// Column-major: `cells[x * height + y]`.
    cells: Vec<GameObject>,
}

impl Board {
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![GameObject::Empty; width * height],
        }
    }

    /// Builds a board from host columns, where `columns[x][y]` is the cell at `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`SnakeError::InvalidBoardSize`] if there are no columns, a column is
    /// empty, or the columns differ in length.
    pub fn from_columns(columns: Vec<Vec<GameObject>>) -> Result<Self> {
        let height = columns.first().map_or(0, Vec::len);
        if height == 0 || columns.iter().any(|c| c.len() != height) {
            return Err(SnakeError::InvalidBoardSize);
        }
        let width = columns.len();
        Ok(Self {
            width,
            height,
            cells: columns.into_iter().flatten().collect(),
        })
    }

    #[must_use]
    pub fn get_width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn get_height(&self) -> usize {
        self.height
    }

    fn index_of(&self, position: Position) -> Option<usize> {
        let x = usize::try_from(position.x).ok()?;
        let y = usize::try_from(position.y).ok()?;
        (x < self.width && y < self.height).then_some(x * self.height + y)
    }

    /// Cell at `position`, or `None` if it is off the board.
    #[must_use]
    pub fn get(&self, position: Position) -> Option<GameObject> {
        self.index_of(position).map(|i| self.cells[i])
    }

    /// # Errors
    ///
    /// Returns [`SnakeError::BoundsViolation`] if `position` is off the board.
    pub fn set(&mut self, position: Position, object: GameObject) -> Result<()> {
        let i = self
            .index_of(position)
            .ok_or(SnakeError::BoundsViolation(position))?;
        self.cells[i] = object;
        Ok(())
    }

    /// First food cell scanning column by column, or `None` if there is none.
    #[must_use]
    pub fn get_food_location(&self) -> Option<Position> {
        let i = self.cells.iter().position(|c| *c == GameObject::Food)?;
        // both fit since the cell index came from a board of this size
        let x = i32::try_from(i / self.height).ok()?;
        let y = i32::try_from(i % self.height).ok()?;
        Some(Position::new(x, y))
    }
}

/// Board passed to [`crate::models::snake::snake_bot::SnakeAgent::on_die`]. It only
/// holds walls, food and empty cells.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeathBoard(Board);

impl DeathBoard {
    #[must_use]
    pub fn from_board(mut board: Board) -> Self {
        for cell in &mut board.cells {
            if cell.is_snake() {
                *cell = GameObject::Empty;
            }
        }
        Self(board)
    }

    #[must_use]
    pub fn get(&self, position: Position) -> Option<GameObject> {
        self.0.get(position)
    }

    #[must_use]
    pub fn get_food_location(&self) -> Option<Position> {
        self.0.get_food_location()
    }

    #[must_use]
    pub fn get_board(&self) -> &Board {
        &self.0
    }
}
