use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use super::grid::{Cell, Grid};

/// Picks food cells that no snake occupies.
pub struct FoodSpawner {
    rng: StdRng,
}

impl FoodSpawner {
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| rand::rng().random());
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    // generate random point, then search in a spiral for unoccupied cells
    pub fn spawn<F>(&mut self, grid: &Grid, occupied: F) -> Option<Cell>
    where F: Fn(Cell) -> bool {
        let start_x = self.rng.random_range(0..grid.width());
        let start_y = self.rng.random_range(0..grid.height());

        if !occupied((start_x, start_y)) {
            return Some((start_x, start_y));
        }

        // on a torus every cell is within half the larger side of the start
        for radius in 1..=grid.width().max(grid.height()) / 2 {
            for i in -radius..=radius {
                let ring = [
                    (start_x + i, start_y - radius),
                    (start_x + i, start_y + radius),
                    (start_x + radius, start_y + i),
                    (start_x - radius, start_y + i),
                ];
                for cell in ring {
                    let cell = grid.wrap(cell);
                    if !occupied(cell) {
                        return Some(cell);
                    }
                }
            }
        }

        // board is full
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_never_spawns_on_occupied_cell() {
        let grid = Grid::new(6, 5).unwrap();
        let mut spawner = FoodSpawner::new(Some(7));

        // everything but one cell is taken
        let free = (4, 3);
        let taken: HashSet<Cell> = (0..grid.area()).map(|i| grid.cell_at(i)).filter(|&c| c != free).collect();

        for _ in 0..50 {
            assert_eq!(spawner.spawn(&grid, |c| taken.contains(&c)), Some(free));
        }
    }

    #[test]
    fn test_full_board_yields_none() {
        let grid = Grid::new(3, 3).unwrap();
        let mut spawner = FoodSpawner::new(Some(1));
        assert_eq!(spawner.spawn(&grid, |_| true), None);
    }

    #[test]
    fn test_same_seed_same_cells() {
        let grid = Grid::new(20, 20).unwrap();
        let mut a = FoodSpawner::new(Some(42));
        let mut b = FoodSpawner::new(Some(42));
        for _ in 0..10 {
            assert_eq!(a.spawn(&grid, |_| false), b.spawn(&grid, |_| false));
        }
    }
}
