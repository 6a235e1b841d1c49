// Shared id types and entity state machines

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct SourceId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TendrilId(pub u64);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct FoodId(pub u64);

/// Monotonic id generator owned by the simulation state, so that ids stay
/// unique without any process-wide counters.
#[derive(Clone, Debug, Default)]
pub struct IdGen {
    next_tendril: u64,
    next_food: u64,
}

impl IdGen {
    pub fn tendril(&mut self) -> TendrilId {
        let id = TendrilId(self.next_tendril);
        self.next_tendril += 1;
        id
    }

    pub fn food(&mut self) -> FoodId {
        let id = FoodId(self.next_food);
        self.next_food += 1;
        id
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum TendrilState {
    Growing,
    Blocked,
    Connected,
    Fading,
    Reabsorbing,
}

impl TendrilState {
    /// Fading and Reabsorbing are terminal decay states; a decaying tendril
    /// no longer grows, carries signals, or counts for connectivity.
    pub fn is_decaying(self) -> bool {
        matches!(self, TendrilState::Fading | TendrilState::Reabsorbing)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum SignalState {
    Idle,
    Propagating,
    ReachedTip,
}
