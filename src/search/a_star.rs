//! Direction-aware A* search over a snake board.
//!
//! A snake can never reverse, so which cells are reachable from a node depends on the
//! facing it arrived with. Every frontier entry carries that facing explicitly and the
//! successors are generated from it.
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use log::debug;

use crate::models::snake::snake_game::{
    classify, Board, CellClass, Direction, GridConfig, Move, PlanningFailure, Position,
    LETHAL_COST,
};

/// Cost of stepping onto each kind of cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchCosts {
    pub open: u32,
    pub food: u32,
    /// `None` makes walls and snake cells impassable.
    pub lethal: Option<u32>,
}

impl SearchCosts {
    /// Lets the search walk through lethal cells at a fixed high cost instead of
    /// treating them as walls.
    #[must_use]
    pub fn with_lethal_cost(mut self, cost: u32) -> Self {
        self.lethal = Some(cost);
        self
    }

    /// Costs where lethal cells are traversable at [`LETHAL_COST`].
    #[must_use]
    pub fn traversable() -> Self {
        Self::default().with_lethal_cost(LETHAL_COST)
    }

    #[must_use]
    pub fn step_cost(&self, cell: CellClass) -> Option<u32> {
        match cell {
            CellClass::Open => Some(self.open),
            CellClass::Food => Some(self.food),
            CellClass::Lethal => self.lethal,
        }
    }
}

impl Default for SearchCosts {
    fn default() -> Self {
        Self {
            open: 1,
            food: 0,
            lethal: None,
        }
    }
}

#[must_use]
pub fn manhattan(a: Position, b: Position) -> u32 {
    a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrontierNode {
    priority: u32,
    /// Insertion counter, breaks priority ties first-in first-out.
    order: u64,
    cost: u32,
    position: Position,
    facing: Direction,
}

// BinaryHeap is a max-heap, so the comparison is reversed to pop the lowest priority
// and then the oldest entry.
impl Ord for FrontierNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for FrontierNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Predecessors and best known costs gathered during one search.
#[derive(Debug, Default, Clone)]
pub struct PathRecord {
    pub came_from: HashMap<Position, Position>,
    pub cost_so_far: HashMap<Position, u32>,
}

impl PathRecord {
    /// First cell on the recorded path from `start` to `goal`.
    ///
    /// # Errors
    ///
    /// Fails if `goal` is `start` or the predecessor chain does not lead back to `start`.
    pub fn first_step(&self, start: Position, goal: Position) -> Result<Position, PlanningFailure> {
        if start == goal {
            return Err(PlanningFailure::AlreadyAtGoal(goal));
        }
        let mut current = goal;
        // each hop visits a distinct recorded cell, anything longer is a cycle
        for _ in 0..=self.came_from.len() {
            let previous = *self
                .came_from
                .get(&current)
                .ok_or(PlanningFailure::InconsistentPath { from: start })?;
            if previous == start {
                return Ok(current);
            }
            current = previous;
        }
        Err(PlanningFailure::InconsistentPath { from: start })
    }

    /// Full path from `start` (exclusive) to `goal` (inclusive).
    #[must_use]
    pub fn path_to(&self, start: Position, goal: Position) -> Vec<Position> {
        let mut path = Vec::new();
        let mut current = goal;
        while current != start && path.len() <= self.came_from.len() {
            path.push(current);
            match self.came_from.get(&current) {
                Some(previous) => current = *previous,
                None => return Vec::new(),
            }
        }
        // ran out of recorded cells without reaching start, so the chain loops
        if current != start {
            return Vec::new();
        }
        path.reverse();
        path
    }
}

/// Searches from `start` (facing `facing`) to `goal`.
///
/// Stops as soon as `goal` leaves the frontier and returns everything recorded so far.
///
/// # Errors
///
/// Returns [`PlanningFailure::Unreachable`] if the frontier runs dry first.
pub fn a_star_search(
    board: &Board,
    grid: &GridConfig,
    costs: &SearchCosts,
    start: Position,
    facing: Direction,
    goal: Position,
) -> Result<PathRecord, PlanningFailure> {
    let mut frontier = BinaryHeap::new();
    let mut record = PathRecord::default();
    let mut order = 0;

    record.cost_so_far.insert(start, 0);
    frontier.push(FrontierNode {
        priority: manhattan(start, goal),
        order,
        cost: 0,
        position: start,
        facing,
    });

    while let Some(node) = frontier.pop() {
        if node.position == goal {
            debug!("Reached {} with cost {}", goal, node.cost);
            return Ok(record);
        }
        if record
            .cost_so_far
            .get(&node.position)
            .is_some_and(|best| node.cost > *best)
        {
            continue;
        }

        for next in grid.neighbors(node.position, node.facing) {
            let Some(step) = costs.step_cost(classify(board.get(next.position))) else {
                continue;
            };
            let new_cost = node.cost + step;
            let improves = record
                .cost_so_far
                .get(&next.position)
                .map_or(true, |best| new_cost < *best);
            if improves {
                record.cost_so_far.insert(next.position, new_cost);
                record.came_from.insert(next.position, node.position);
                order += 1;
                frontier.push(FrontierNode {
                    priority: new_cost + manhattan(next.position, goal),
                    order,
                    cost: new_cost,
                    position: next.position,
                    facing: next.facing,
                });
            }
        }
    }

    Err(PlanningFailure::Unreachable {
        from: start,
        to: goal,
    })
}

/// Outcome of planning a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub goal: Position,
    pub first_step: Position,
    pub first_move: Move,
    /// Total cost of the whole path to `goal`.
    pub cost: u32,
}

/// Plans the next move from `start` towards `goal`.
///
/// # Errors
///
/// Any [`PlanningFailure`]; a plan is never made up from a partial path.
pub fn plan(
    board: &Board,
    grid: &GridConfig,
    costs: &SearchCosts,
    start: Position,
    facing: Direction,
    goal: Position,
) -> Result<Plan, PlanningFailure> {
    if start == goal {
        return Err(PlanningFailure::AlreadyAtGoal(goal));
    }
    let record = a_star_search(board, grid, costs, start, facing, goal)?;
    let first_step = record.first_step(start, goal)?;
    let first_move = Move::between(facing, start, first_step)
        .ok_or(PlanningFailure::InconsistentPath { from: start })?;
    let cost = record
        .cost_so_far
        .get(&goal)
        .copied()
        .ok_or(PlanningFailure::InconsistentPath { from: start })?;
    Ok(Plan {
        goal,
        first_step,
        first_move,
        cost,
    })
}

/// Plans towards the first food found on the board.
///
/// # Errors
///
/// [`PlanningFailure::NoFood`] if the board holds no food, otherwise as [`plan`].
pub fn plan_to_food(
    board: &Board,
    grid: &GridConfig,
    costs: &SearchCosts,
    start: Position,
    facing: Direction,
) -> Result<Plan, PlanningFailure> {
    let goal = board.get_food_location().ok_or(PlanningFailure::NoFood)?;
    plan(board, grid, costs, start, facing, goal)
}
