// Food manager - spawns square pellets into empty regions and tracks their
// per-cell energy. Consumption itself happens in the growth engine.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;

use crate::config::SimConfig;
use crate::grid::{CellKind, Grid};
use crate::types::{FoodId, IdGen};

#[derive(Clone, Debug)]
pub struct FoodPellet {
    pub id: FoodId,
    pub origin: (i32, i32),
    pub size: usize,
    pub cells: HashMap<(i32, i32), f32>,
    pub remaining_energy: f32,
}

#[derive(Default)]
pub struct FoodField {
    pub pellets: BTreeMap<FoodId, FoodPellet>,
    by_cell: HashMap<(i32, i32), FoodId>,
}

impl FoodField {
    /// Try to place one pellet: K random top-left candidates, skipping any
    /// square that leaves the edge margin or overlaps a non-empty cell.
    pub fn try_spawn<R: Rng>(
        &mut self,
        grid: &mut Grid,
        config: &SimConfig,
        ids: &mut IdGen,
        tick: u64,
        rng: &mut R,
    ) -> Option<FoodId> {
        if self.pellets.len() >= config.food_max_pellets {
            return None;
        }
        let size = config.food_pellet_size;
        let margin = config.food_edge_margin;
        if grid.width < size + 2 * margin || grid.height < size + 2 * margin {
            return None;
        }

        for _ in 0..config.food_spawn_attempts {
            let ox = rng.gen_range(margin..=grid.width - margin - size) as i32;
            let oy = rng.gen_range(margin..=grid.height - margin - size) as i32;
            if let Some(id) = self.spawn_at(grid, config, ids, tick, (ox, oy)) {
                return Some(id);
            }
        }
        None
    }

    /// Place a pellet with its top-left corner at `origin` if the whole
    /// square is Empty. Used by try_spawn and for manual food placement.
    pub fn spawn_at(
        &mut self,
        grid: &mut Grid,
        config: &SimConfig,
        ids: &mut IdGen,
        tick: u64,
        origin: (i32, i32),
    ) -> Option<FoodId> {
        let size = config.food_pellet_size;
        let clear = (0..size as i32).all(|dx| {
            (0..size as i32).all(|dy| {
                grid.get(origin.0 + dx, origin.1 + dy)
                    .map_or(false, |c| c.kind == CellKind::Empty)
            })
        });
        if !clear {
            return None;
        }

        let id = ids.food();
        let mut cells = HashMap::with_capacity(size * size);
        for dx in 0..size as i32 {
            for dy in 0..size as i32 {
                let pos = (origin.0 + dx, origin.1 + dy);
                cells.insert(pos, config.food_cell_energy);
                self.by_cell.insert(pos, id);
                if let Some(cell) = grid.get_mut(pos.0, pos.1) {
                    cell.kind = CellKind::Food;
                    cell.food = Some(id);
                    cell.creation_tick = tick;
                    cell.opacity = 1.0;
                }
            }
        }
        let remaining_energy = config.food_cell_energy * (size * size) as f32;
        self.pellets.insert(
            id,
            FoodPellet {
                id,
                origin,
                size,
                cells,
                remaining_energy,
            },
        );
        Some(id)
    }

    /// Remove one food cell and return its stored energy. The pellet record
    /// is dropped once its cell map empties.
    pub fn consume(&mut self, pos: (i32, i32)) -> Option<f32> {
        let id = self.by_cell.remove(&pos)?;
        let pellet = self.pellets.get_mut(&id)?;
        let energy = pellet.cells.remove(&pos)?;
        pellet.remaining_energy -= energy;
        if pellet.cells.is_empty() {
            self.pellets.remove(&id);
        }
        Some(energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn spawn_one(config: &SimConfig) -> (FoodField, Grid, FoodId) {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut grid = Grid::new(config.grid_width, config.grid_height);
        let mut ids = IdGen::default();
        let mut field = FoodField::default();
        let id = field
            .try_spawn(&mut grid, config, &mut ids, 1, &mut rng)
            .expect("empty grid should accept a pellet");
        (field, grid, id)
    }

    #[test]
    fn pellet_energy_is_cell_count_times_per_cell_energy() {
        let mut config = SimConfig::default();
        config.food_pellet_size = 4;
        config.food_cell_energy = 50.0;
        let (field, _grid, id) = spawn_one(&config);
        let pellet = &field.pellets[&id];
        assert_eq!(pellet.cells.len(), 16);
        assert!((pellet.remaining_energy - 800.0).abs() < f32::EPSILON);
    }

    #[test]
    fn consuming_every_cell_drops_the_pellet() {
        let mut config = SimConfig::default();
        config.food_pellet_size = 4;
        config.food_cell_energy = 50.0;
        let (mut field, _grid, id) = spawn_one(&config);
        let cells: Vec<_> = field.pellets[&id].cells.keys().copied().collect();
        let mut total = 0.0;
        for pos in cells {
            total += field.consume(pos).expect("cell exists");
        }
        assert!((total - 800.0).abs() < f32::EPSILON);
        assert!(!field.pellets.contains_key(&id));
        // Re-consuming a removed cell is a no-op.
        assert!(field.consume((0, 0)).is_none());
    }

    #[test]
    fn spawn_respects_pellet_cap() {
        let mut config = SimConfig::default();
        config.food_max_pellets = 1;
        let (mut field, mut grid, _id) = spawn_one(&config);
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut ids = IdGen::default();
        assert!(field
            .try_spawn(&mut grid, &config, &mut ids, 2, &mut rng)
            .is_none());
    }

    #[test]
    fn spawn_skips_occupied_squares() {
        let mut config = SimConfig::default();
        config.grid_width = 10;
        config.grid_height = 10;
        config.food_pellet_size = 4;
        config.food_edge_margin = 0;
        config.food_spawn_attempts = 64;
        let mut grid = Grid::new(10, 10);
        // Occupy everything so no clear square exists.
        for x in 0..10 {
            for y in 0..10 {
                grid.get_mut(x, y).unwrap().kind = CellKind::Source;
            }
        }
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let mut ids = IdGen::default();
        let mut field = FoodField::default();
        assert!(field
            .try_spawn(&mut grid, &config, &mut ids, 1, &mut rng)
            .is_none());
    }
}
