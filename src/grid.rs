// Grid and cell store - passive spatial data, single source of truth for
// occupancy. All logic lives in the callers.

use serde::Serialize;

use crate::types::{FoodId, SourceId, TendrilId};

/// The 8 neighbor offsets in counter-clockwise order starting east. Relative
/// direction classification indexes into this order.
pub const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

pub fn chebyshev(a: (i32, i32), b: (i32, i32)) -> i32 {
    (a.0 - b.0).abs().max((a.1 - b.1).abs())
}

/// Octant index of a unit step vector, or None for a non-step.
pub fn octant_of(d: (i32, i32)) -> Option<usize> {
    NEIGHBOR_OFFSETS.iter().position(|&o| o == d)
}

/// Rotation steps (counter-clockwise) from `heading` to `step`, used to look
/// up a relative-direction weight: 0 = forward, 4 = backward.
pub fn relative_direction(heading: (i32, i32), step: (i32, i32)) -> Option<usize> {
    let h = octant_of(heading)?;
    let s = octant_of(step)?;
    Some((s + 8 - h) % 8)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
pub enum CellKind {
    #[default]
    Empty,
    Source,
    Tendril,
    Food,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Cell {
    pub kind: CellKind,
    pub owner_source: Option<SourceId>,
    /// Normally 0 or 1 entries; 2+ only where a branch or a connection
    /// shares the cell.
    pub owner_tendrils: Vec<TendrilId>,
    pub food: Option<FoodId>,
    pub creation_tick: u64,
    pub opacity: f32,
    pub is_branch_point: bool,
    pub is_connection_point: bool,
}

pub struct Grid {
    pub width: usize,
    pub height: usize,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::default(); width * height],
        }
    }

    pub fn within_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    pub fn get(&self, x: i32, y: i32) -> Option<&Cell> {
        if self.within_bounds(x, y) {
            Some(&self.cells[y as usize * self.width + x as usize])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, x: i32, y: i32) -> Option<&mut Cell> {
        if self.within_bounds(x, y) {
            Some(&mut self.cells[y as usize * self.width + x as usize])
        } else {
            None
        }
    }

    pub fn set(&mut self, x: i32, y: i32, cell: Cell) {
        if let Some(slot) = self.get_mut(x, y) {
            *slot = cell;
        }
    }

    /// Read-only iteration for render snapshots.
    pub fn cells(&self) -> impl Iterator<Item = ((i32, i32), &Cell)> {
        let width = self.width;
        self.cells.iter().enumerate().map(move |(i, cell)| {
            (((i % width) as i32, (i / width) as i32), cell)
        })
    }
}

/// Intended cell mutation produced by a simulation phase and applied at the
/// end of that phase. Updates that would break the kind/owner invariant are
/// skipped and logged, never applied.
#[derive(Clone, Debug)]
pub enum CellUpdate {
    /// Claim an Empty (or just-consumed Food) cell for a tendril.
    OccupyTendril {
        pos: (i32, i32),
        tendril: TendrilId,
        source: SourceId,
        tick: u64,
    },
    /// Add a co-owner to an existing Tendril or Source cell.
    AddOwner { pos: (i32, i32), tendril: TendrilId },
    MarkBranchPoint { pos: (i32, i32) },
    MarkConnectionPoint { pos: (i32, i32) },
    /// Drop a tendril from a cell's owner set; an emptied non-Source cell
    /// reverts to Empty. When other owners remain, `successor` names the
    /// source the cell now belongs to (a shared connection cell must not
    /// keep pointing at the removed rival's source).
    ReleaseOwner {
        pos: (i32, i32),
        tendril: TendrilId,
        successor: Option<SourceId>,
    },
}

pub fn apply_updates(grid: &mut Grid, updates: Vec<CellUpdate>) {
    for update in updates {
        apply_one(grid, update);
    }
}

fn apply_one(grid: &mut Grid, update: CellUpdate) {
    match update {
        CellUpdate::OccupyTendril {
            pos,
            tendril,
            source,
            tick,
        } => {
            let Some(cell) = grid.get_mut(pos.0, pos.1) else {
                tracing::warn!(?pos, "skipping out-of-bounds cell claim");
                return;
            };
            if !matches!(cell.kind, CellKind::Empty | CellKind::Food) {
                tracing::warn!(?pos, kind = ?cell.kind, "skipping claim of occupied cell");
                return;
            }
            cell.kind = CellKind::Tendril;
            cell.owner_source = Some(source);
            cell.owner_tendrils = vec![tendril];
            cell.food = None;
            cell.creation_tick = tick;
            cell.opacity = 1.0;
            cell.is_branch_point = false;
            cell.is_connection_point = false;
        }
        CellUpdate::AddOwner { pos, tendril } => {
            let Some(cell) = grid.get_mut(pos.0, pos.1) else {
                tracing::warn!(?pos, "skipping out-of-bounds owner add");
                return;
            };
            if !matches!(cell.kind, CellKind::Tendril | CellKind::Source) {
                tracing::warn!(?pos, kind = ?cell.kind, "skipping owner add on unowned cell");
                return;
            }
            if !cell.owner_tendrils.contains(&tendril) {
                cell.owner_tendrils.push(tendril);
            }
        }
        CellUpdate::MarkBranchPoint { pos } => {
            if let Some(cell) = grid.get_mut(pos.0, pos.1) {
                cell.is_branch_point = true;
            }
        }
        CellUpdate::MarkConnectionPoint { pos } => {
            if let Some(cell) = grid.get_mut(pos.0, pos.1) {
                cell.is_connection_point = true;
            }
        }
        CellUpdate::ReleaseOwner {
            pos,
            tendril,
            successor,
        } => {
            let Some(cell) = grid.get_mut(pos.0, pos.1) else {
                return;
            };
            cell.owner_tendrils.retain(|&id| id != tendril);
            if cell.owner_tendrils.is_empty() && cell.kind == CellKind::Tendril {
                *cell = Cell::default();
                return;
            }
            if cell.owner_tendrils.len() < 2 {
                // A shared marker is meaningless once the cell has a single owner
                cell.is_branch_point = false;
            }
            if !cell.owner_tendrils.is_empty() && cell.kind == CellKind::Tendril {
                if let Some(source) = successor {
                    cell.owner_source = Some(source);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_lookup_is_none() {
        let grid = Grid::new(4, 4);
        assert!(grid.get(-1, 0).is_none());
        assert!(grid.get(0, 4).is_none());
        assert!(grid.get(3, 3).is_some());
    }

    #[test]
    fn relative_direction_is_rotation_from_heading() {
        // Heading east: east is forward, west is backward.
        assert_eq!(relative_direction((1, 0), (1, 0)), Some(0));
        assert_eq!(relative_direction((1, 0), (-1, 0)), Some(4));
        // Heading north-west, forward stays index 0.
        assert_eq!(relative_direction((-1, 1), (-1, 1)), Some(0));
        assert_eq!(relative_direction((0, 0), (1, 0)), None);
    }

    #[test]
    fn occupying_a_taken_cell_is_skipped() {
        let mut grid = Grid::new(4, 4);
        let first = CellUpdate::OccupyTendril {
            pos: (1, 1),
            tendril: TendrilId(1),
            source: SourceId(0),
            tick: 1,
        };
        let second = CellUpdate::OccupyTendril {
            pos: (1, 1),
            tendril: TendrilId(2),
            source: SourceId(1),
            tick: 1,
        };
        apply_updates(&mut grid, vec![first, second]);
        let cell = grid.get(1, 1).unwrap();
        assert_eq!(cell.owner_tendrils, vec![TendrilId(1)]);
    }

    #[test]
    fn releasing_last_owner_resets_cell() {
        let mut grid = Grid::new(4, 4);
        apply_updates(
            &mut grid,
            vec![CellUpdate::OccupyTendril {
                pos: (2, 2),
                tendril: TendrilId(7),
                source: SourceId(0),
                tick: 3,
            }],
        );
        apply_updates(
            &mut grid,
            vec![CellUpdate::ReleaseOwner {
                pos: (2, 2),
                tendril: TendrilId(7),
                successor: None,
            }],
        );
        let cell = grid.get(2, 2).unwrap();
        assert_eq!(cell.kind, CellKind::Empty);
        assert!(cell.owner_tendrils.is_empty());
    }

    #[test]
    fn releasing_a_co_owner_hands_the_cell_to_the_survivor_source() {
        // A connection cell owned by source 0's tendril and co-owned by
        // source 1's. Removing the original owner must not leave the cell
        // attributed to source 0.
        let mut grid = Grid::new(4, 4);
        apply_updates(
            &mut grid,
            vec![
                CellUpdate::OccupyTendril {
                    pos: (1, 2),
                    tendril: TendrilId(1),
                    source: SourceId(0),
                    tick: 1,
                },
                CellUpdate::AddOwner {
                    pos: (1, 2),
                    tendril: TendrilId(2),
                },
                CellUpdate::MarkConnectionPoint { pos: (1, 2) },
            ],
        );
        apply_updates(
            &mut grid,
            vec![CellUpdate::ReleaseOwner {
                pos: (1, 2),
                tendril: TendrilId(1),
                successor: Some(SourceId(1)),
            }],
        );
        let cell = grid.get(1, 2).unwrap();
        assert_eq!(cell.kind, CellKind::Tendril);
        assert_eq!(cell.owner_tendrils, vec![TendrilId(2)]);
        assert_eq!(cell.owner_source, Some(SourceId(1)));
    }

    #[test]
    fn source_cell_keeps_kind_when_owners_clear() {
        let mut grid = Grid::new(4, 4);
        {
            let cell = grid.get_mut(0, 0).unwrap();
            cell.kind = CellKind::Source;
            cell.owner_source = Some(SourceId(0));
            cell.owner_tendrils = vec![TendrilId(3)];
        }
        apply_updates(
            &mut grid,
            vec![CellUpdate::ReleaseOwner {
                pos: (0, 0),
                tendril: TendrilId(3),
                successor: None,
            }],
        );
        let cell = grid.get(0, 0).unwrap();
        assert_eq!(cell.kind, CellKind::Source);
        assert!(cell.owner_tendrils.is_empty());
    }
}
