// Source registry and energy economy

use rand::Rng;

use crate::config::SimConfig;
use crate::types::SourceId;

#[derive(Clone, Debug)]
pub struct Source {
    pub id: SourceId,
    pub x: i32,
    pub y: i32,
    pub energy: f32,
    pub is_active: bool,
    pub last_activity_tick: u64,
    /// Seconds accumulated toward the next signal emission.
    pub emission_accum: f32,
}

impl Source {
    pub fn pos(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

pub struct SourceRegistry {
    pub sources: Vec<Source>,
}

impl SourceRegistry {
    /// Place sources by rejection sampling: draw a random coordinate, retry
    /// up to a bounded attempt count while it sits too close to an existing
    /// source, and accept the last draw when attempts run out so placement
    /// always terminates.
    pub fn place<R: Rng>(config: &SimConfig, rng: &mut R) -> Self {
        let min_dist_sq = config.min_source_distance * config.min_source_distance;
        let mut sources: Vec<Source> = Vec::with_capacity(config.source_count);

        for i in 0..config.source_count {
            let mut x = rng.gen_range(0..config.grid_width) as i32;
            let mut y = rng.gen_range(0..config.grid_height) as i32;
            for _ in 0..config.placement_attempts {
                let too_close = sources.iter().any(|s| {
                    let dx = (s.x - x) as f32;
                    let dy = (s.y - y) as f32;
                    dx * dx + dy * dy < min_dist_sq
                });
                if !too_close {
                    break;
                }
                x = rng.gen_range(0..config.grid_width) as i32;
                y = rng.gen_range(0..config.grid_height) as i32;
            }
            sources.push(Source {
                id: SourceId(i as u32),
                x,
                y,
                energy: config.initial_energy,
                is_active: true,
                last_activity_tick: 0,
                emission_accum: 0.0,
            });
        }

        Self { sources }
    }

    pub fn get(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: SourceId) -> Option<&mut Source> {
        self.sources.get_mut(id.0 as usize)
    }

    pub fn can_afford(&self, id: SourceId, cost: f32) -> bool {
        self.get(id).map_or(false, |s| s.is_active && s.energy >= cost)
    }

    /// Deduct `cost` if the source can afford it. Energy never goes
    /// negative; an unaffordable spend is rejected outright.
    pub fn try_spend(&mut self, id: SourceId, cost: f32, tick: u64) -> bool {
        let Some(source) = self.get_mut(id) else {
            return false;
        };
        if !source.is_active || source.energy < cost {
            return false;
        }
        source.energy -= cost;
        source.last_activity_tick = tick;
        true
    }

    pub fn credit(&mut self, id: SourceId, amount: f32, tick: u64) {
        if let Some(source) = self.get_mut(id) {
            source.energy += amount;
            source.last_activity_tick = tick;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn placement_spreads_sources_apart() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut config = SimConfig::default();
        config.source_count = 4;
        config.min_source_distance = 30.0;
        let registry = SourceRegistry::place(&config, &mut rng);
        assert_eq!(registry.sources.len(), 4);
        for (i, a) in registry.sources.iter().enumerate() {
            for b in &registry.sources[i + 1..] {
                let dx = (a.x - b.x) as f32;
                let dy = (a.y - b.y) as f32;
                assert!((dx * dx + dy * dy).sqrt() >= config.min_source_distance);
            }
        }
    }

    #[test]
    fn placement_terminates_when_grid_is_too_tight() {
        // 16 sources spaced 100 apart cannot fit on a 20x20 grid; the
        // attempt cap must still let placement finish.
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut config = SimConfig::default();
        config.grid_width = 20;
        config.grid_height = 20;
        config.source_count = 16;
        config.min_source_distance = 100.0;
        let registry = SourceRegistry::place(&config, &mut rng);
        assert_eq!(registry.sources.len(), 16);
    }

    #[test]
    fn spend_never_drives_energy_negative() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut config = SimConfig::default();
        config.source_count = 1;
        config.initial_energy = 3.0;
        let mut registry = SourceRegistry::place(&config, &mut rng);
        let id = SourceId(0);
        assert!(registry.try_spend(id, 2.0, 1));
        assert!(!registry.try_spend(id, 2.0, 2));
        assert!(registry.get(id).unwrap().energy >= 0.0);
    }
}
