use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::game::combat::ObstacleDestroyed;
use crate::game::config::ArenaConfig;
use crate::game::simulation::SimSet;

/// Ask the path service for a route from `start` to `goal`. The service
/// answers by inserting or replacing the agent's `PlannedPath`; on failure it
/// leaves the previous path untouched.
#[derive(Event, Message, Debug, Clone)]
pub struct PathRequest {
    pub entity: Entity,
    pub start: Vec2,
    pub goal: Vec2,
}

/// Marker for an agent whose path request has been issued but not yet
/// answered. Agents never hold more than one request in flight.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PendingPath;

/// An ordered route plus progress through it. The waypoint list is immutable
/// once computed; a recomputed route replaces it wholesale and resets the
/// cursor to zero.
#[derive(Component, Debug, Clone, Default)]
pub struct PlannedPath {
    pub waypoints: SmallVec<[Vec2; 16]>,
    pub cursor: usize,
}

impl PlannedPath {
    pub fn exhausted(&self) -> bool {
        self.cursor >= self.waypoints.len()
    }
}

/// Walkability grid the path search runs on. Cells are stamped blocked (255)
/// from obstacle colliders; everything else costs 1.
#[derive(Resource, Debug, Clone, Default)]
pub struct NavGrid {
    pub width: usize,
    pub height: usize,
    pub cell_size: f32,
    pub origin: Vec2,
    pub cost: Vec<u8>,
}

pub const BLOCKED: u8 = 255;

impl NavGrid {
    pub fn new(map_width: f32, map_height: f32, cell_size: f32) -> Self {
        let width = (map_width / cell_size).ceil() as usize;
        let height = (map_height / cell_size).ceil() as usize;
        Self {
            width,
            height,
            cell_size,
            origin: Vec2::new(-map_width / 2.0, -map_height / 2.0),
            cost: vec![1; width * height],
        }
    }

    pub fn get_index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    pub fn world_to_grid(&self, pos: Vec2) -> Option<(usize, usize)> {
        let local = pos - self.origin;
        if local.x < 0.0 || local.y < 0.0 {
            return None;
        }
        let x = (local.x / self.cell_size) as usize;
        let y = (local.y / self.cell_size) as usize;
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((x, y))
    }

    /// Cell center in world space.
    pub fn grid_to_world(&self, x: usize, y: usize) -> Vec2 {
        self.origin
            + Vec2::new(
                (x as f32 + 0.5) * self.cell_size,
                (y as f32 + 0.5) * self.cell_size,
            )
    }

    pub fn is_blocked(&self, x: usize, y: usize) -> bool {
        self.cost[self.get_index(x, y)] == BLOCKED
    }

    /// Stamp a circular region with a cost value. Used both to mark obstacles
    /// and to clear them when a destructible dies.
    pub fn stamp_circle(&mut self, center: Vec2, radius: f32, value: u8) {
        let r_sq = radius * radius;
        for y in 0..self.height {
            for x in 0..self.width {
                let cell_center = self.grid_to_world(x, y);
                if cell_center.distance_squared(center) <= r_sq {
                    let idx = self.get_index(x, y);
                    self.cost[idx] = value;
                }
            }
        }
    }
}

// ============================================================================
// A* search
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
struct SearchState {
    cost: i64,
    node: (usize, usize),
}

impl Ord for SearchState {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for SearchState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn heuristic(a: (usize, usize), b: (usize, usize)) -> i64 {
    let dx = (a.0 as i64 - b.0 as i64).abs();
    let dy = (a.1 as i64 - b.1 as i64).abs();
    dx + dy
}

/// Bresenham walk over grid cells; true when no blocked cell lies between
/// them. A clear line lets the search return a trivial direct route.
pub fn grid_line_clear(start: (usize, usize), goal: (usize, usize), grid: &NavGrid) -> bool {
    let (mut x0, mut y0) = (start.0 as isize, start.1 as isize);
    let (x1, y1) = (goal.0 as isize, goal.1 as isize);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if x0 < 0 || x0 >= grid.width as isize || y0 < 0 || y0 >= grid.height as isize {
            return false;
        }
        if grid.is_blocked(x0 as usize, y0 as usize) {
            return false;
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
    true
}

/// 4-way A* over the nav grid. Returns world-space waypoints, or None when no
/// route exists or either endpoint is unusable.
pub fn find_path(start: Vec2, goal: Vec2, grid: &NavGrid) -> Option<SmallVec<[Vec2; 16]>> {
    const MAX_ITERATIONS: usize = 20_000;

    let start_cell = grid.world_to_grid(start)?;
    let goal_cell = grid.world_to_grid(goal)?;
    if grid.is_blocked(goal_cell.0, goal_cell.1) || grid.is_blocked(start_cell.0, start_cell.1) {
        return None;
    }

    if grid_line_clear(start_cell, goal_cell, grid) {
        let mut waypoints = SmallVec::new();
        waypoints.push(grid.grid_to_world(goal_cell.0, goal_cell.1));
        return Some(waypoints);
    }

    let mut open_set = BinaryHeap::new();
    open_set.push(SearchState {
        cost: 0,
        node: start_cell,
    });

    let mut came_from: FxHashMap<(usize, usize), (usize, usize)> = FxHashMap::default();
    let mut g_score: FxHashMap<(usize, usize), i64> = FxHashMap::default();
    g_score.insert(start_cell, 0);

    let mut iterations = 0;
    while let Some(SearchState { cost: _, node }) = open_set.pop() {
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            error!(
                "Path search exceeded {} iterations, start {:?} goal {:?}",
                MAX_ITERATIONS, start_cell, goal_cell
            );
            return None;
        }

        if node == goal_cell {
            return Some(reconstruct(came_from, node, grid));
        }

        let (x, y) = node;
        let neighbors = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];

        for (nx, ny) in neighbors {
            if nx >= grid.width || ny >= grid.height || grid.is_blocked(nx, ny) {
                continue;
            }
            let neighbor = (nx, ny);
            let tentative = g_score[&node] + 1;
            if tentative < *g_score.get(&neighbor).unwrap_or(&i64::MAX) {
                came_from.insert(neighbor, node);
                g_score.insert(neighbor, tentative);
                open_set.push(SearchState {
                    cost: tentative + heuristic(neighbor, goal_cell),
                    node: neighbor,
                });
            }
        }
    }

    None
}

fn reconstruct(
    came_from: FxHashMap<(usize, usize), (usize, usize)>,
    mut current: (usize, usize),
    grid: &NavGrid,
) -> SmallVec<[Vec2; 16]> {
    let mut path = SmallVec::new();
    path.push(grid.grid_to_world(current.0, current.1));
    while let Some(&prev) = came_from.get(&current) {
        current = prev;
        path.push(grid.grid_to_world(current.0, current.1));
    }
    path.reverse();
    path
}

// ============================================================================
// Plugin & systems
// ============================================================================

pub struct PathfindingPlugin;

impl Plugin for PathfindingPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<PathRequest>();
        app.init_resource::<NavGrid>();
        app.add_systems(Startup, init_nav_grid);
        app.add_systems(
            FixedUpdate,
            (restamp_destroyed_obstacles, process_path_requests)
                .chain()
                .in_set(SimSet::Decision)
                .before(crate::game::enemy::perception::update_perception),
        );
    }
}

fn init_nav_grid(config: Res<ArenaConfig>, mut grid: ResMut<NavGrid>) {
    *grid = NavGrid::new(config.map_width, config.map_height, config.nav_cell_size);
    for obstacle in &config.obstacles {
        grid.stamp_circle(obstacle.position, obstacle.radius, BLOCKED);
    }
    info!(
        "Nav grid initialized: {}x{} cells ({} obstacles stamped)",
        grid.width,
        grid.height,
        config.obstacles.len()
    );
}

/// Clear nav grid cells when a destructible obstacle dies, so paths can
/// immediately route through the gap.
fn restamp_destroyed_obstacles(
    mut destroyed: MessageReader<ObstacleDestroyed>,
    mut grid: ResMut<NavGrid>,
) {
    for msg in destroyed.read() {
        grid.stamp_circle(msg.position, msg.radius, 1);
        info!("Obstacle at {:?} cleared from nav grid", msg.position);
    }
}

/// Answer outstanding path requests. A successful search replaces the
/// agent's route and resets its cursor; a failed search leaves any existing
/// route untouched so the agent keeps following its stale path. A request
/// whose agent has despawned is dropped without effect.
fn process_path_requests(
    mut commands: Commands,
    mut requests: MessageReader<PathRequest>,
    grid: Res<NavGrid>,
    agents: Query<Entity, With<PendingPath>>,
) {
    for request in requests.read() {
        // Agent may have died since the request was issued
        let Ok(entity) = agents.get(request.entity) else {
            continue;
        };

        match find_path(request.start, request.goal, &grid) {
            Some(waypoints) => {
                commands.entity(entity).insert(PlannedPath {
                    waypoints,
                    cursor: 0,
                });
            }
            None => {
                debug!(
                    "Path search failed from {:?} to {:?}, keeping previous route",
                    request.start, request.goal
                );
            }
        }
        commands.entity(entity).remove::<PendingPath>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid() -> NavGrid {
        NavGrid::new(20.0, 20.0, 0.5)
    }

    #[test]
    fn grid_round_trips_world_coordinates() {
        let grid = open_grid();
        let (x, y) = grid.world_to_grid(Vec2::new(3.2, -4.7)).unwrap();
        let center = grid.grid_to_world(x, y);
        assert!(center.distance(Vec2::new(3.2, -4.7)) < grid.cell_size);
        assert!(grid.world_to_grid(Vec2::new(100.0, 0.0)).is_none());
    }

    #[test]
    fn clear_line_gives_direct_route() {
        let grid = open_grid();
        let path = find_path(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0), &grid).unwrap();
        assert_eq!(path.len(), 1);
        assert!(path[0].distance(Vec2::new(5.0, 0.0)) < grid.cell_size);
    }

    #[test]
    fn path_routes_around_a_wall() {
        let mut grid = open_grid();
        // Vertical wall at x ~ 0 with a gap far to the north
        grid.stamp_circle(Vec2::new(0.0, -2.0), 4.0, BLOCKED);

        let start = Vec2::new(-6.0, -2.0);
        let goal = Vec2::new(6.0, -2.0);
        let path = find_path(start, goal, &grid).unwrap();
        assert!(path.len() > 2);

        // Every waypoint must sit on a walkable cell
        for wp in &path {
            let (x, y) = grid.world_to_grid(*wp).unwrap();
            assert!(!grid.is_blocked(x, y));
        }

        // Route must actually reach the goal cell
        let last = *path.last().unwrap();
        assert!(last.distance(goal) < grid.cell_size);
    }

    #[test]
    fn blocked_goal_is_an_error() {
        let mut grid = open_grid();
        grid.stamp_circle(Vec2::new(5.0, 5.0), 1.0, BLOCKED);
        assert!(find_path(Vec2::ZERO, Vec2::new(5.0, 5.0), &grid).is_none());
    }

    #[test]
    fn unreachable_goal_is_an_error() {
        let mut grid = open_grid();
        // Ring of blocked cells around the goal
        for angle in 0..64 {
            let theta = angle as f32 / 64.0 * std::f32::consts::TAU;
            grid.stamp_circle(Vec2::new(5.0, 5.0) + Vec2::from_angle(theta) * 2.0, 0.8, BLOCKED);
        }
        assert!(find_path(Vec2::ZERO, Vec2::new(5.0, 5.0), &grid).is_none());
    }

    #[test]
    fn restamping_reopens_cells() {
        let mut grid = open_grid();
        grid.stamp_circle(Vec2::ZERO, 2.0, BLOCKED);
        let (x, y) = grid.world_to_grid(Vec2::ZERO).unwrap();
        assert!(grid.is_blocked(x, y));
        grid.stamp_circle(Vec2::ZERO, 2.0, 1);
        assert!(!grid.is_blocked(x, y));
    }

    #[test]
    fn random_obstacle_fields_never_yield_blocked_waypoints() {
        fastrand::seed(7);
        for _ in 0..20 {
            let mut grid = open_grid();
            for _ in 0..fastrand::usize(1..8) {
                let center = Vec2::new(
                    fastrand::f32() * 16.0 - 8.0,
                    fastrand::f32() * 16.0 - 8.0,
                );
                grid.stamp_circle(center, fastrand::f32() * 2.0 + 0.5, BLOCKED);
            }
            let start = Vec2::new(-9.0, -9.0);
            let goal = Vec2::new(9.0, 9.0);
            if let Some(path) = find_path(start, goal, &grid) {
                for wp in &path {
                    let (x, y) = grid.world_to_grid(*wp).unwrap();
                    assert!(!grid.is_blocked(x, y), "waypoint {wp:?} is blocked");
                }
            }
        }
    }

    #[test]
    fn planned_path_exhaustion() {
        let mut path = PlannedPath::default();
        assert!(path.exhausted());
        path.waypoints.push(Vec2::ZERO);
        assert!(!path.exhausted());
        path.cursor = 1;
        assert!(path.exhausted());
    }
}
