use crate::grid::chebyshev;
use crate::types::{SignalState, SourceId, TendrilId, TendrilState};

#[derive(Clone, Debug)]
pub struct Tendril {
    pub id: TendrilId,
    pub source_id: SourceId,
    /// Ordered cell path. path[0] is the source cell for roots, or the
    /// parent's branch cell for branches. Consecutive cells are 8-adjacent.
    pub path: Vec<(i32, i32)>,
    pub state: TendrilState,
    pub signal_state: SignalState,
    /// Fractional index into path while a signal is propagating.
    pub signal_position: f32,
    pub opacity: f32,
    pub is_branch: bool,
    pub parent: Option<TendrilId>,
    pub creation_tick: u64,
    /// Heading used before the path has a second cell to derive one from.
    pub initial_heading: (i32, i32),
    pub blocked_since: Option<u64>,
}

impl Tendril {
    pub fn root(
        id: TendrilId,
        source_id: SourceId,
        origin: (i32, i32),
        heading: (i32, i32),
        tick: u64,
    ) -> Self {
        Self {
            id,
            source_id,
            path: vec![origin],
            state: TendrilState::Growing,
            signal_state: SignalState::Idle,
            signal_position: 0.0,
            opacity: 1.0,
            is_branch: false,
            parent: None,
            creation_tick: tick,
            initial_heading: heading,
            blocked_since: None,
        }
    }

    pub fn branch(
        id: TendrilId,
        parent: &Tendril,
        branch_point: (i32, i32),
        first_cell: (i32, i32),
        tick: u64,
    ) -> Self {
        Self {
            id,
            source_id: parent.source_id,
            path: vec![branch_point, first_cell],
            state: TendrilState::Growing,
            signal_state: SignalState::Idle,
            signal_position: 0.0,
            opacity: 1.0,
            is_branch: true,
            parent: Some(parent.id),
            creation_tick: tick,
            initial_heading: (first_cell.0 - branch_point.0, first_cell.1 - branch_point.1),
            blocked_since: None,
        }
    }

    pub fn head(&self) -> (i32, i32) {
        *self.path.last().expect("tendril path is never empty")
    }

    /// Last movement heading: the vector of the final path step, or the
    /// initial heading while the path is still a single cell.
    pub fn heading(&self) -> (i32, i32) {
        if self.path.len() >= 2 {
            let a = self.path[self.path.len() - 2];
            let b = self.path[self.path.len() - 1];
            (b.0 - a.0, b.1 - a.1)
        } else {
            self.initial_heading
        }
    }

    pub fn contains(&self, pos: (i32, i32)) -> bool {
        self.path.contains(&pos)
    }

    pub fn index_of(&self, pos: (i32, i32)) -> Option<usize> {
        self.path.iter().position(|&c| c == pos)
    }

    /// True when `pos` touches the path anywhere except the head or the cell
    /// just behind it. Used for self-avoidance during growth.
    pub fn touches_older_path(&self, pos: (i32, i32)) -> bool {
        let skip_from = self.path.len().saturating_sub(2);
        self.path[..skip_from]
            .iter()
            .any(|&c| chebyshev(c, pos) <= 1)
    }

    /// Only Growing tendrils block; a Connected one that cannot extend
    /// further keeps its connection.
    pub fn mark_blocked(&mut self, tick: u64) {
        if self.state == TendrilState::Growing {
            self.state = TendrilState::Blocked;
            self.blocked_since = Some(tick);
        }
    }
}
