//! Mental rotation test.
//!
//! The player sees a shape and its transformed target and has to name a
//! sequence of at most `min_moves` transforms that turns one into the other.
//! Shapes are outlines stored as line segments (pairs of points). Level 1
//! uses free polygons rotated about their centroid, level 2 uses cells on a
//! 4x4 grid rotated about the grid center.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::GameRules;
use crate::error::{GameError, Result};
use crate::game::{GameCode, GameSettings, PlayerChoice, Problem};

pub const EPSILON: f64 = 1e-3;
pub const GRID_SIZE: usize = 4;
pub const CELL_SIZE: f64 = 50.0;
pub const MAX_MOVES: usize = 4;
const SOLUTION_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum Transform {
    #[serde(rename = "rotate_left_45")]
    #[strum(serialize = "rotate_left_45")]
    RotateLeft45,
    #[serde(rename = "rotate_right_45")]
    #[strum(serialize = "rotate_right_45")]
    RotateRight45,
    #[serde(rename = "flip_horizontal")]
    #[strum(serialize = "flip_horizontal")]
    FlipHorizontal,
    #[serde(rename = "flip_vertical")]
    #[strum(serialize = "flip_vertical")]
    FlipVertical,
}

impl Transform {
    pub const ALL: [Transform; 4] = [
        Transform::RotateLeft45,
        Transform::RotateRight45,
        Transform::FlipHorizontal,
        Transform::FlipVertical,
    ];

    /// The move that undoes `self`.
    pub fn opposite(self) -> Transform {
        match self {
            Transform::RotateLeft45 => Transform::RotateRight45,
            Transform::RotateRight45 => Transform::RotateLeft45,
            flip => flip,
        }
    }

    fn apply(self, p: Point) -> Point {
        let rotate = |angle: f64| {
            let (sin, cos) = angle.sin_cos();
            Point::new(p.x * cos - p.y * sin, p.x * sin + p.y * cos)
        };
        match self {
            Transform::RotateRight45 => rotate(std::f64::consts::FRAC_PI_4),
            Transform::RotateLeft45 => rotate(-std::f64::consts::FRAC_PI_4),
            Transform::FlipHorizontal => Point::new(-p.x, p.y),
            Transform::FlipVertical => Point::new(p.x, -p.y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Applies `moves` in order, rotating and flipping about `center`.
pub fn apply_transforms(points: &[Point], moves: &[Transform], center: Point) -> Vec<Point> {
    points
        .iter()
        .map(|p| {
            let local = Point::new(p.x - center.x, p.y - center.y);
            let moved = moves.iter().fold(local, |acc, m| m.apply(acc));
            Point::new(moved.x + center.x, moved.y + center.y)
        })
        .collect()
}

pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::new(0.0, 0.0);
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

/// Grid cell of a point at `EPSILON` resolution.
fn quantised(p: &Point) -> (i64, i64) {
    ((p.x / EPSILON).round() as i64, (p.y / EPSILON).round() as i64)
}

fn sorted(points: &[Point]) -> Vec<Point> {
    let mut points = points.to_vec();
    points.sort_by_key(quantised);
    points
}

/// Order-independent point set equality within `EPSILON`.
pub fn same_shape(a: &[Point], b: &[Point]) -> bool {
    a.len() == b.len()
        && sorted(a)
            .iter()
            .zip(sorted(b).iter())
            .all(|(p, q)| (p.x - q.x).abs() <= EPSILON && (p.y - q.y).abs() <= EPSILON)
}

/// Closed polygon outline as segments.
fn outline(vertices: &[(f64, f64)]) -> Vec<Point> {
    vertices
        .iter()
        .zip(vertices.iter().cycle().skip(1))
        .flat_map(|(&(x0, y0), &(x1, y1))| [Point::new(x0, y0), Point::new(x1, y1)])
        .collect()
}

/// Border segments of every active cell in a `"0110/0110/..."` grid.
pub fn parse_grid(grid: &str) -> Result<Vec<Point>> {
    let mut points = Vec::new();
    for (row, line) in grid.split('/').enumerate() {
        for (col, cell) in line.chars().enumerate() {
            match cell {
                '0' => {}
                '1' => {
                    let left = col as f64 * CELL_SIZE;
                    let top = row as f64 * CELL_SIZE;
                    let (right, bottom) = (left + CELL_SIZE, top + CELL_SIZE);
                    points.extend([
                        Point::new(left, top),
                        Point::new(right, top),
                        Point::new(right, top),
                        Point::new(right, bottom),
                        Point::new(right, bottom),
                        Point::new(left, bottom),
                        Point::new(left, bottom),
                        Point::new(left, top),
                    ]);
                }
                other => {
                    return Err(GameError::configuration(format!(
                        "invalid grid cell '{other}' in '{grid}'"
                    )))
                }
            }
        }
    }
    Ok(points)
}

pub fn grid_center() -> Point {
    let half = GRID_SIZE as f64 * CELL_SIZE / 2.0;
    Point::new(half, half)
}

const POLYGONS: &[(&str, &[(f64, f64)])] = &[
    (
        "P",
        &[(0.0, 0.0), (60.0, 0.0), (60.0, 50.0), (20.0, 50.0), (20.0, 100.0), (0.0, 100.0)],
    ),
    (
        "L",
        &[(0.0, 0.0), (20.0, 0.0), (20.0, 80.0), (60.0, 80.0), (60.0, 100.0), (0.0, 100.0)],
    ),
    (
        "F",
        &[
            (0.0, 0.0),
            (70.0, 0.0),
            (70.0, 20.0),
            (20.0, 20.0),
            (20.0, 40.0),
            (50.0, 40.0),
            (50.0, 60.0),
            (20.0, 60.0),
            (20.0, 100.0),
            (0.0, 100.0),
        ],
    ),
    ("flag", &[(0.0, 0.0), (80.0, 20.0), (20.0, 40.0), (20.0, 100.0), (0.0, 100.0)]),
    ("wedge", &[(0.0, 0.0), (100.0, 30.0), (30.0, 60.0)]),
];

const GRIDS: &[(&str, &str)] = &[
    ("hook", "0110/0100/0100/0000"),
    ("step", "1100/0110/0010/0000"),
    ("tee", "1110/0100/0100/0000"),
    ("corner", "0000/0110/0110/1110"),
    ("zig", "0000/1100/0111/0000"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationProblem {
    pub id: usize,
    pub level: u32,
    pub shape: String,
    pub initial: Vec<Point>,
    pub target: Vec<Point>,
    /// Pivot for every rotation and flip.
    pub center: Point,
    pub min_moves: usize,
    /// One sequence of `min_moves` transforms that reaches `target`.
    pub solution: Vec<Transform>,
}

fn random_moves(count: usize, rng: &mut StdRng) -> Vec<Transform> {
    let mut moves: Vec<Transform> = Vec::with_capacity(count);
    while moves.len() < count {
        let next = Transform::ALL[rng.gen_range(0..Transform::ALL.len())];
        if moves.last().map(|prev| prev.opposite()) != Some(next) {
            moves.push(next);
        }
    }
    moves
}

/// A non-cancelling sequence that visibly changes the shape.
fn random_solution(initial: &[Point], count: usize, center: Point, rng: &mut StdRng) -> Vec<Transform> {
    for _ in 0..SOLUTION_ATTEMPTS {
        let moves = random_moves(count, rng);
        if !same_shape(initial, &apply_transforms(initial, &moves, center)) {
            return moves;
        }
    }
    debug!(count, "falling back to a single rotation");
    vec![Transform::RotateRight45]
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ShapeRotationRules;

impl ShapeRotationRules {
    fn problem<'a>(&self, problem: &'a Problem) -> Result<&'a RotationProblem> {
        match problem {
            Problem::ShapeRotation(p) => Ok(p),
            _ => Err(GameError::ChoiceMismatch {
                game: GameCode::ShapeRotation,
            }),
        }
    }

    fn base_shape(level: u32, rng: &mut StdRng) -> (String, Vec<Point>, Point) {
        if level == 2 {
            let (name, grid) = GRIDS[rng.gen_range(0..GRIDS.len())];
            // Grids are fixed literals, so parsing cannot fail.
            let points = parse_grid(grid).unwrap_or_default();
            (name.to_string(), points, grid_center())
        } else {
            let (name, vertices) = POLYGONS[rng.gen_range(0..POLYGONS.len())];
            let points = outline(vertices);
            let center = centroid(&points);
            (name.to_string(), points, center)
        }
    }
}

impl GameRules for ShapeRotationRules {
    fn code(&self) -> GameCode {
        GameCode::ShapeRotation
    }

    fn validate(&self, settings: &GameSettings) -> Result<()> {
        match settings.levels().into_iter().find(|l| !(1..=2).contains(l)) {
            Some(level) => Err(GameError::configuration(format!(
                "shape rotation round must be 1 or 2, got {level}"
            ))),
            None => Ok(()),
        }
    }

    fn generate(&mut self, index: usize, settings: &GameSettings, rng: &mut StdRng) -> Problem {
        let level = settings.level_at(index);
        let (shape, initial, center) = Self::base_shape(level, rng);
        let min_moves = rng.gen_range(1..=MAX_MOVES);
        let solution = random_solution(&initial, min_moves, center, rng);
        let target = apply_transforms(&initial, &solution, center);

        Problem::ShapeRotation(RotationProblem {
            id: index + 1,
            level,
            shape,
            initial,
            target,
            center,
            min_moves: solution.len(),
            solution,
        })
    }

    fn expected(&self, problem: &Problem) -> Result<PlayerChoice> {
        Ok(PlayerChoice::Transforms(self.problem(problem)?.solution.clone()))
    }

    fn grade(&self, problem: &Problem, choice: &PlayerChoice) -> Result<bool> {
        let problem = self.problem(problem)?;
        let PlayerChoice::Transforms(moves) = choice else {
            return Err(GameError::ChoiceMismatch {
                game: GameCode::ShapeRotation,
            });
        };
        if moves.len() > problem.min_moves {
            return Ok(false);
        }
        let reached = apply_transforms(&problem.initial, moves, problem.center);
        Ok(same_shape(&reached, &problem.target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn near_equal_xs_still_sort_consistently() {
        use itertools::Itertools;

        // x values closer than EPSILON pairwise but not end to end
        let points = vec![
            Point::new(0.0, 2.0),
            Point::new(0.0008, 1.0),
            Point::new(0.0016, 0.0),
        ];
        let nudged: Vec<Point> = points
            .iter()
            .map(|p| Point::new(p.x + 1e-9, p.y - 1e-9))
            .collect();
        for order in nudged.iter().cloned().permutations(nudged.len()) {
            assert!(same_shape(&points, &order), "{order:?}");
        }
        assert!(!same_shape(&points, &points[..2]));
    }

    fn square() -> Vec<Point> {
        outline(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)])
    }

    fn problem_from(initial: Vec<Point>, solution: Vec<Transform>, center: Point) -> Problem {
        let target = apply_transforms(&initial, &solution, center);
        Problem::ShapeRotation(RotationProblem {
            id: 1,
            level: 1,
            shape: "test".into(),
            initial,
            target,
            center,
            min_moves: solution.len(),
            solution,
        })
    }

    #[test]
    fn square_flips_onto_itself() {
        let points = square();
        let center = centroid(&points);
        for flip in [Transform::FlipHorizontal, Transform::FlipVertical] {
            assert!(same_shape(&points, &apply_transforms(&points, &[flip], center)));
        }
        let rotated = apply_transforms(&points, &[Transform::RotateRight45], center);
        assert!(!same_shape(&points, &rotated));
        let back = apply_transforms(&rotated, &[Transform::RotateLeft45], center);
        assert!(same_shape(&points, &back));
    }

    #[test]
    fn two_rights_are_a_quarter_turn() {
        let p = [Point::new(1.0, 0.0)];
        let moved = apply_transforms(
            &p,
            &[Transform::RotateRight45, Transform::RotateRight45],
            Point::new(0.0, 0.0),
        );
        assert!(same_shape(&moved, &[Point::new(0.0, 1.0)]));
    }

    #[test]
    fn grid_parsing_emits_four_segments_per_cell() {
        let points = parse_grid("0110/0110/0110/1110").unwrap();
        assert_eq!(points.len(), 7 * 8);
        assert!(parse_grid("01x0").is_err());
        assert_eq!(grid_center(), Point::new(100.0, 100.0));
    }

    #[test]
    fn equivalent_sequences_are_accepted() {
        let rules = ShapeRotationRules;
        let initial = outline(POLYGONS[0].1);
        let center = centroid(&initial);
        let problem = problem_from(
            initial,
            vec![Transform::FlipHorizontal, Transform::FlipVertical],
            center,
        );
        let half_turn = vec![Transform::FlipVertical, Transform::FlipHorizontal];
        assert!(rules.grade(&problem, &PlayerChoice::Transforms(half_turn)).unwrap());
    }

    #[test]
    fn too_many_moves_are_wrong_even_if_they_reach_the_target() {
        let rules = ShapeRotationRules;
        let initial = outline(POLYGONS[1].1);
        let center = centroid(&initial);
        let problem = problem_from(initial, vec![Transform::FlipHorizontal], center);
        let padded = vec![
            Transform::FlipHorizontal,
            Transform::FlipVertical,
            Transform::FlipVertical,
        ];
        assert!(!rules.grade(&problem, &PlayerChoice::Transforms(padded)).unwrap());
        assert!(!rules.grade(&problem, &PlayerChoice::Transforms(vec![])).unwrap());
    }

    #[test]
    fn generated_problems_are_solvable_and_non_trivial() {
        let mut rules = ShapeRotationRules;
        let mut rng = StdRng::seed_from_u64(21);
        for level in [1, 2] {
            let settings = GameSettings {
                level,
                ..GameSettings::default()
            };
            for i in 0..40 {
                let problem = rules.generate(i, &settings, &mut rng);
                let Problem::ShapeRotation(p) = &problem else {
                    panic!("unexpected {problem:?}");
                };
                assert!((1..=MAX_MOVES).contains(&p.min_moves));
                assert!(p.solution.windows(2).all(|w| w[0].opposite() != w[1]));
                assert!(!same_shape(&p.initial, &p.target));
                let expected = rules.expected(&problem).unwrap();
                assert!(rules.grade(&problem, &expected).unwrap());
            }
        }
    }

    #[test]
    fn transform_names_match_storage() {
        assert_eq!(Transform::RotateLeft45.to_string(), "rotate_left_45");
        assert_eq!(
            serde_json::to_string(&Transform::FlipVertical).unwrap(),
            "\"flip_vertical\""
        );
    }
}
