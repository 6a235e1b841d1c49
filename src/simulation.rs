use std::collections::{BTreeMap, HashSet};

use rand::Rng;

use crate::config::{SimConfig, Tunables};
use crate::error::Result;
use crate::food::FoodField;
use crate::grid::{apply_updates, CellKind, CellUpdate, Grid, NEIGHBOR_OFFSETS};
use crate::growth;
use crate::integrity;
use crate::signal;
use crate::source::SourceRegistry;
use crate::tendril::Tendril;
use crate::types::{IdGen, SignalState, SourceId, TendrilId, TendrilState};

// Simulation state - contains all mutable state data
pub struct SimulationState {
    pub grid: Grid,
    pub sources: SourceRegistry,
    /// Keyed by id; BTreeMap iteration gives the stable ascending order the
    /// phase rules rely on.
    pub tendrils: BTreeMap<TendrilId, Tendril>,
    pub food: FoodField,
    pub ids: IdGen,
    pub tick: u64,
}

// Simulation - contains state, config, and control flags
pub struct Simulation {
    pub state: SimulationState,
    pub config: SimConfig,
    pub paused: bool,
    pub speed_multiplier: f32,
    pub speed_accumulator: f32,
}

// Implement Deref for convenience - allows sim.grid instead of sim.state.grid
impl std::ops::Deref for Simulation {
    type Target = SimulationState;
    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl std::ops::DerefMut for Simulation {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl Simulation {
    pub fn new<R: Rng>(rng: &mut R) -> Result<Self> {
        Self::with_config(rng, SimConfig::default())
    }

    pub fn with_config<R: Rng>(rng: &mut R, config: SimConfig) -> Result<Self> {
        config.validate()?;
        let state = Self::build_state(&config, rng);
        Ok(Self {
            state,
            config,
            paused: false,
            speed_multiplier: 1.0,
            speed_accumulator: 0.0,
        })
    }

    fn build_state<R: Rng>(config: &SimConfig, rng: &mut R) -> SimulationState {
        let mut state = SimulationState {
            grid: Grid::new(config.grid_width, config.grid_height),
            sources: SourceRegistry::place(config, rng),
            tendrils: BTreeMap::new(),
            food: FoodField::default(),
            ids: IdGen::default(),
            tick: 0,
        };
        let placements: Vec<(SourceId, (i32, i32))> = state
            .sources
            .sources
            .iter()
            .map(|s| (s.id, s.pos()))
            .collect();
        for (id, pos) in placements {
            if let Some(cell) = state.grid.get_mut(pos.0, pos.1) {
                cell.kind = CellKind::Source;
                cell.owner_source = Some(id);
                cell.creation_tick = 0;
                cell.opacity = 1.0;
            }
            spawn_root(&mut state, id, pos, 0, rng);
        }
        state
    }

    /// Full state reset with the current config. Also the resize path: the
    /// grid is reconstructed and source placement re-run, never patched.
    pub fn reset<R: Rng>(&mut self, rng: &mut R) {
        self.state = Self::build_state(&self.config, rng);
        self.speed_accumulator = 0.0;
    }

    pub fn resize<R: Rng>(&mut self, width: usize, height: usize, rng: &mut R) -> Result<()> {
        let mut config = self.config.clone();
        config.grid_width = width;
        config.grid_height = height;
        config.validate()?;
        self.config = config;
        self.reset(rng);
        Ok(())
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }
    pub fn increase_speed(&mut self) {
        self.speed_multiplier = (self.speed_multiplier * 1.5).min(10.0);
    }
    pub fn decrease_speed(&mut self) {
        self.speed_multiplier = (self.speed_multiplier / 1.5).max(0.1);
    }
    pub fn reset_speed(&mut self) {
        self.speed_multiplier = 1.0;
    }

    /// Replace the live tunables. Values are validated before being applied.
    pub fn set_tunables(&mut self, tunables: Tunables) -> Result<()> {
        tunables.validate()?;
        self.config.tunables = tunables;
        Ok(())
    }

    /// Drop a food pellet with its top-left corner at the given cell, if the
    /// square is clear. Manual counterpart of the periodic spawner.
    pub fn add_food_pellet(&mut self, x: i32, y: i32) -> bool {
        let tick = self.state.tick;
        self.state
            .food
            .spawn_at(
                &mut self.state.grid,
                &self.config,
                &mut self.state.ids,
                tick,
                (x, y),
            )
            .is_some()
    }

    pub fn stats(&self) -> (usize, usize, usize, usize, f32, u64) {
        let sources_active = self.state.sources.sources.iter().filter(|s| s.is_active).count();
        let mut tendrils_alive = 0;
        let mut tendrils_decaying = 0;
        for t in self.state.tendrils.values() {
            if t.state.is_decaying() {
                tendrils_decaying += 1;
            } else {
                tendrils_alive += 1;
            }
        }
        let total_energy: f32 = self.state.sources.sources.iter().map(|s| s.energy).sum();
        (
            sources_active,
            tendrils_alive,
            tendrils_decaying,
            self.state.food.pellets.len(),
            total_energy,
            self.state.tick,
        )
    }

    /// Advance the simulation by `delta_ms` of wall time: one tick through
    /// the fixed phase sequence.
    pub fn advance<R: Rng>(&mut self, delta_ms: f32, rng: &mut R) {
        if !(delta_ms > 0.0) || !delta_ms.is_finite() {
            return;
        }
        // Clamp runaway frame deltas so a stalled scheduler cannot teleport
        // signals past whole paths.
        let dt_secs = (delta_ms / 1000.0).min(0.25);
        self.state.tick = self.state.tick.wrapping_add(1);
        let tick = self.state.tick;

        // Phase 1: food spawn
        if tick % self.config.food_spawn_interval_ticks.max(1) == 0 {
            self.state.food.try_spawn(
                &mut self.state.grid,
                &self.config,
                &mut self.state.ids,
                tick,
                rng,
            );
        }

        // Phase 2: source regeneration, then signal emission
        self.regenerate_sources(rng);
        signal::emit(&mut self.state, &self.config, dt_secs);

        // Phase 3: signal propagation
        let arrivals = signal::propagate(&mut self.state, &self.config, dt_secs);

        // Phase 4: growth, in stable id order with batched cell writes
        let mut claimed: HashSet<(i32, i32)> = HashSet::new();
        let mut updates: Vec<CellUpdate> = Vec::new();
        for id in arrivals {
            growth::attempt_growth(
                &mut self.state,
                &self.config,
                id,
                &mut claimed,
                &mut updates,
                rng,
            );
            if let Some(t) = self.state.tendrils.get_mut(&id) {
                if t.signal_state == SignalState::ReachedTip {
                    t.signal_state = SignalState::Idle;
                    t.signal_position = 0.0;
                }
            }
        }
        apply_updates(&mut self.state.grid, updates);

        // Phase 5: fade/decay sweep
        self.fade_sweep();

        // Phase 6: periodic path integrity verification
        if tick % self.config.integrity_interval_ticks == 0 {
            integrity::verify(&mut self.state);
        }
    }

    /// Inactive sources that have accumulated enough energy regenerate and
    /// get a fresh root tendril.
    fn regenerate_sources<R: Rng>(&mut self, rng: &mut R) {
        let threshold = self.config.reactivation_threshold();
        let tick = self.state.tick;
        let mut regenerated: Vec<(SourceId, (i32, i32))> = Vec::new();
        for source in &mut self.state.sources.sources {
            if !source.is_active && source.energy >= threshold {
                source.is_active = true;
                source.last_activity_tick = tick;
                source.emission_accum = 0.0;
                regenerated.push((source.id, source.pos()));
            }
        }
        for (id, pos) in regenerated {
            spawn_root(&mut self.state, id, pos, tick, rng);
        }
    }

    fn fade_sweep(&mut self) {
        let tick = self.state.tick;

        // Long-blocked tendrils of a still-active source are reabsorbed so
        // their energy returns to the pool.
        let reclaim_after = self.config.blocked_reabsorb_ticks;
        for t in self.state.tendrils.values_mut() {
            if t.state == TendrilState::Blocked {
                let expired = t
                    .blocked_since
                    .map_or(false, |since| tick.saturating_sub(since) >= reclaim_after);
                let source_active = self
                    .state
                    .sources
                    .get(t.source_id)
                    .map_or(false, |s| s.is_active);
                if expired && source_active {
                    t.state = TendrilState::Reabsorbing;
                }
            }
        }

        let mut removals: Vec<TendrilId> = Vec::new();
        for (id, t) in self.state.tendrils.iter_mut() {
            let rate = match t.state {
                TendrilState::Fading => self.config.fading_rate,
                TendrilState::Reabsorbing => self.config.reabsorbing_rate,
                _ => continue,
            };
            t.opacity = (t.opacity - rate).max(0.0);
            // Mirror the decay onto the cells the renderer reads.
            for &pos in &t.path {
                if let Some(cell) = self.state.grid.get_mut(pos.0, pos.1) {
                    if cell.kind == CellKind::Tendril {
                        cell.opacity = cell.opacity.min(t.opacity);
                    }
                }
            }
            if t.opacity <= self.config.removal_epsilon {
                removals.push(*id);
            }
        }

        let mut updates: Vec<CellUpdate> = Vec::new();
        for id in removals {
            let Some(t) = self.state.tendrils.remove(&id) else {
                continue;
            };
            for &pos in &t.path {
                // Hand shared cells over to a surviving owner's source.
                let successor = self
                    .state
                    .grid
                    .get(pos.0, pos.1)
                    .and_then(|cell| {
                        cell.owner_tendrils
                            .iter()
                            .find(|&&oid| oid != id)
                            .and_then(|oid| self.state.tendrils.get(oid))
                    })
                    .map(|survivor| survivor.source_id);
                updates.push(CellUpdate::ReleaseOwner {
                    pos,
                    tendril: id,
                    successor,
                });
            }
            if t.state == TendrilState::Reabsorbing {
                // path[0] was never paid for, so it does not count.
                let recovered =
                    t.path.len().saturating_sub(1) as f32 * self.config.cell_energy_cost;
                self.state.sources.credit(t.source_id, recovered, tick);
            }
        }
        apply_updates(&mut self.state.grid, updates);
    }
}

fn spawn_root<R: Rng>(
    state: &mut SimulationState,
    source_id: SourceId,
    pos: (i32, i32),
    tick: u64,
    rng: &mut R,
) {
    let heading = NEIGHBOR_OFFSETS[rng.gen_range(0..NEIGHBOR_OFFSETS.len())];
    let id = state.ids.tendril();
    state
        .tendrils
        .insert(id, Tendril::root(id, source_id, pos, heading, tick));
    if let Some(cell) = state.grid.get_mut(pos.0, pos.1) {
        if !cell.owner_tendrils.contains(&id) {
            cell.owner_tendrils.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::chebyshev;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn quiet_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.grid_width = 60;
        config.grid_height = 60;
        config.source_count = 2;
        config.food_max_pellets = 0; // food disabled
        config.min_source_distance = 25.0;
        config
    }

    fn run_ticks(sim: &mut Simulation, rng: &mut ChaCha8Rng, ticks: usize) {
        for _ in 0..ticks {
            sim.advance(16.0, rng);
        }
    }

    #[test]
    fn paths_stay_chebyshev_adjacent() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut sim = Simulation::with_config(&mut rng, quiet_config()).unwrap();
        run_ticks(&mut sim, &mut rng, 600);
        assert!(sim.tendrils.values().any(|t| t.path.len() > 3));
        for t in sim.tendrils.values() {
            assert!(!t.path.is_empty());
            for pair in t.path.windows(2) {
                assert_eq!(chebyshev(pair[0], pair[1]), 1, "path broke adjacency");
            }
        }
    }

    #[test]
    fn energy_never_goes_negative() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut config = quiet_config();
        config.initial_energy = 40.0;
        let mut sim = Simulation::with_config(&mut rng, config).unwrap();
        for _ in 0..1200 {
            sim.advance(16.0, &mut rng);
            for s in &sim.sources.sources {
                assert!(s.energy >= 0.0, "source energy went negative");
            }
        }
    }

    #[test]
    fn growth_steps_are_bounded_by_initial_energy() {
        // With food disabled, a 500-energy source at cost 1 affords at most
        // 500 growth/branch steps before it drains and deactivates.
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut config = quiet_config();
        config.grid_width = 120;
        config.grid_height = 120;
        config.source_count = 1;
        config.initial_energy = 500.0;
        config.cell_energy_cost = 1.0;
        config.tunables.branch_probability = 0.2;
        config.min_branch_path_len = 3;
        config.blocked_reabsorb_ticks = u64::MAX; // no energy refunds
        config.fading_rate = 0.0; // keep paths around for counting
        config.reabsorbing_rate = 0.0;
        let mut sim = Simulation::with_config(&mut rng, config).unwrap();
        run_ticks(&mut sim, &mut rng, 8000);

        // Every path cell beyond path[0] cost exactly one unit, so the total
        // grown must match the energy spent and can never exceed 500.
        let grown: usize = sim
            .tendrils
            .values()
            .map(|t| t.path.len().saturating_sub(1))
            .sum();
        let source = &sim.sources.sources[0];
        assert!(grown <= 500, "grew {grown} cells from 500 energy");
        assert!(
            (grown as f32 - (500.0 - source.energy)).abs() < 1e-3,
            "spent energy does not match grown cells"
        );
        if source.energy <= 0.0 {
            assert!(!source.is_active, "drained source was not deactivated");
        }
    }

    #[test]
    fn straight_line_growth_with_forward_only_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut config = quiet_config();
        config.grid_width = 40;
        config.grid_height = 40;
        config.source_count = 1;
        config.tunables.direction_weights = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        config.tunables.branch_probability = 0.0;
        config.blocked_reabsorb_ticks = u64::MAX; // keep the blocked path visible
        let mut sim = Simulation::with_config(&mut rng, config).unwrap();

        let id = *sim.tendrils.keys().next().unwrap();
        sim.state.tendrils.get_mut(&id).unwrap().initial_heading = (1, 0);
        let origin = sim.tendrils[&id].path[0];

        run_ticks(&mut sim, &mut rng, 12000);

        let t = &sim.tendrils[&id];
        // Strictly eastward, one row, until the boundary blocked it.
        for (i, &(x, y)) in t.path.iter().enumerate() {
            assert_eq!(y, origin.1);
            assert_eq!(x, origin.0 + i as i32);
        }
        assert_eq!(t.head().0, sim.grid.width as i32 - 1);
        assert_eq!(t.state, TendrilState::Blocked);
    }

    #[test]
    fn short_tendrils_never_branch() {
        let mut config = quiet_config();
        config.min_branch_path_len = 6;
        config.tunables.branch_probability = 1.0;
        for seed in 0..8 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut sim = Simulation::with_config(&mut rng, config.clone()).unwrap();
            for _ in 0..200 {
                sim.advance(16.0, &mut rng);
                for t in sim.tendrils.values() {
                    if t.is_branch {
                        let parent = &sim.tendrils[&t.parent.unwrap()];
                        assert!(
                            parent.path.len() >= sim.config.min_branch_path_len,
                            "seed {seed}: branch spawned from short parent"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn branches_grow_past_their_spawn_length() {
        // A branch is born with two path cells and only ever extends when a
        // signal crossing its branch point is copied onto it and carried to
        // its tip. If that hand-off broke, every branch would stay length 2.
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut config = quiet_config();
        config.grid_width = 100;
        config.grid_height = 100;
        config.source_count = 1;
        config.tunables.branch_probability = 0.5;
        config.min_branch_path_len = 3;
        let mut sim = Simulation::with_config(&mut rng, config).unwrap();
        run_ticks(&mut sim, &mut rng, 2000);

        assert!(
            sim.tendrils.values().any(|t| t.is_branch),
            "setup should produce at least one branch"
        );
        assert!(
            sim.tendrils
                .values()
                .any(|t| t.is_branch && t.path.len() > 2),
            "no branch ever grew past its spawn length"
        );
    }

    #[test]
    fn deactivation_fades_all_descendants_in_one_verify() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut config = quiet_config();
        config.source_count = 1;
        config.tunables.branch_probability = 0.5;
        config.min_branch_path_len = 3;
        let mut sim = Simulation::with_config(&mut rng, config).unwrap();
        run_ticks(&mut sim, &mut rng, 800);
        assert!(
            sim.tendrils.values().any(|t| t.is_branch),
            "setup should produce at least one branch"
        );

        sim.state.sources.sources[0].energy = 0.0;
        integrity::verify(&mut sim.state);

        for t in sim.tendrils.values() {
            assert!(
                t.state.is_decaying(),
                "tendril {:?} still live after source drain",
                t.id
            );
        }
        assert!(!sim.sources.sources[0].is_active);
    }

    #[test]
    fn removed_tendrils_stay_removed() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut config = quiet_config();
        config.source_count = 1;
        config.fading_rate = 1.0; // decay in a single sweep
        let mut sim = Simulation::with_config(&mut rng, config).unwrap();
        run_ticks(&mut sim, &mut rng, 300);

        sim.state.sources.sources[0].energy = 0.0;
        integrity::verify(&mut sim.state);
        sim.fade_sweep();
        assert!(sim.tendrils.is_empty());

        // Source cell ownership was cleared but its kind survived.
        let pos = sim.sources.sources[0].pos();
        let cell = sim.grid.get(pos.0, pos.1).unwrap();
        assert_eq!(cell.kind, CellKind::Source);
        assert!(cell.owner_tendrils.is_empty());

        // Re-running the sweep touches nothing.
        sim.fade_sweep();
        assert!(sim.tendrils.is_empty());
        let again = sim.grid.get(pos.0, pos.1).unwrap();
        assert_eq!(again.kind, CellKind::Source);
    }

    #[test]
    fn food_consumption_credits_the_source_exactly() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut config = quiet_config();
        config.source_count = 1;
        config.grid_width = 40;
        config.grid_height = 40;
        config.food_max_pellets = 0; // no random spawns, manual pellet only
        config.food_pellet_size = 4;
        config.food_cell_energy = 50.0;
        config.tunables.direction_weights = [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        config.tunables.branch_probability = 0.0;
        config.blocked_reabsorb_ticks = u64::MAX;
        config.fading_rate = 0.0;
        config.reabsorbing_rate = 0.0;
        let mut sim = Simulation::with_config(&mut rng, config).unwrap();

        // Aim a straight eastward tendril at a hand-placed 4x4 pellet.
        relocate_source(&mut sim, (5, 20));
        sim.state
            .tendrils
            .values_mut()
            .next()
            .unwrap()
            .initial_heading = (1, 0);
        assert!(sim.add_food_pellet(12, 18));
        assert!(
            (sim.food.pellets.values().next().unwrap().remaining_energy - 800.0).abs()
                < f32::EPSILON
        );

        let before: f32 = sim.sources.sources[0].energy;
        run_ticks(&mut sim, &mut rng, 12000);

        let remaining: f32 = sim
            .food
            .pellets
            .values()
            .map(|p| p.remaining_energy)
            .sum();
        let eaten = 800.0 - remaining;
        assert!(eaten >= 200.0, "tendril never reached the pellet");
        let grown: usize = sim
            .tendrils
            .values()
            .map(|t| t.path.len().saturating_sub(1))
            .sum();
        // Net energy: credits from eaten cells minus one cost per grown cell
        // (food cells join the path, so their movement cost is included).
        let expected = before + eaten - grown as f32;
        let actual = sim.sources.sources[0].energy;
        assert!(
            (actual - expected).abs() < 1e-3,
            "energy accounting drifted: actual {actual}, expected {expected}"
        );
    }

    /// Move a freshly initialized single source (and its root tendril) to a
    /// known cell so a test can stage deterministic geometry.
    fn relocate_source(sim: &mut Simulation, pos: (i32, i32)) {
        let old = sim.state.sources.sources[0].pos();
        if let Some(cell) = sim.state.grid.get_mut(old.0, old.1) {
            *cell = Default::default();
        }
        let id = {
            let source = &mut sim.state.sources.sources[0];
            source.x = pos.0;
            source.y = pos.1;
            source.id
        };
        let tendril_id = *sim.state.tendrils.keys().next().unwrap();
        sim.state.tendrils.get_mut(&tendril_id).unwrap().path = vec![pos];
        if let Some(cell) = sim.state.grid.get_mut(pos.0, pos.1) {
            cell.kind = CellKind::Source;
            cell.owner_source = Some(id);
            cell.opacity = 1.0;
            cell.owner_tendrils = vec![tendril_id];
        }
    }
}
