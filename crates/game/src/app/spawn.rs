use engine::{CollisionField, Vec2, Viewport};
use rand::Rng;
use tracing::info;

/// Catalog entry for something that can appear on the map. The catalog
/// itself (stats, pricing) lives behind an external service; the spawner
/// only needs identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Species {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnEntity {
    pub id: u64,
    pub species_id: u32,
    pub species_name: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct SpawnerConfig {
    pub map_width: f64,
    pub map_height: f64,
    pub population: usize,
    /// Encounter range around the avatar, world pixels.
    pub proximity_radius: f64,
    /// Extra slack around the viewport when culling.
    pub cull_buffer: f64,
    pub max_placement_attempts: u32,
}

impl SpawnerConfig {
    pub fn for_map(map_width: f64, map_height: f64) -> Self {
        Self {
            map_width,
            map_height,
            population: 50,
            proximity_radius: 80.0,
            cull_buffer: 100.0,
            max_placement_attempts: 100,
        }
    }
}

/// Places wild entities at random walkable positions and answers proximity
/// and visibility queries. Placement happens once per populated set; a
/// caught entity is replaced immediately so the population stays constant.
pub struct EntitySpawner {
    config: SpawnerConfig,
    entities: Vec<SpawnEntity>,
    next_id: u64,
}

impl EntitySpawner {
    pub fn new(config: SpawnerConfig) -> Self {
        Self {
            config,
            entities: Vec::new(),
            next_id: 1,
        }
    }

    #[cfg(test)]
    pub(crate) fn entities(&self) -> &[SpawnEntity] {
        &self.entities
    }

    #[cfg(test)]
    pub(crate) fn is_populated(&self) -> bool {
        !self.entities.is_empty()
    }

    /// One-shot placement: a no-op while the set is already populated, so a
    /// refreshed catalog can never destructively re-roll live positions.
    pub fn place_initial<R: Rng + ?Sized>(
        &mut self,
        species: &[Species],
        collision: &CollisionField,
        rng: &mut R,
    ) {
        if !self.entities.is_empty() || species.is_empty() {
            return;
        }
        for _ in 0..self.config.population {
            let entity = self.spawn_one(species, collision, rng);
            self.entities.push(entity);
        }
        info!(population = self.entities.len(), "wild_entities_placed");
    }

    /// Despawns a caught entity and immediately places a replacement at a
    /// fresh random walkable position. Returns `false` for unknown ids.
    pub fn remove<R: Rng + ?Sized>(
        &mut self,
        id: u64,
        species: &[Species],
        collision: &CollisionField,
        rng: &mut R,
    ) -> bool {
        let Some(index) = self.entities.iter().position(|entity| entity.id == id) else {
            return false;
        };
        let caught = self.entities.remove(index);
        info!(
            entity_id = caught.id,
            species = %caught.species_name,
            "wild_entity_removed"
        );
        if !species.is_empty() {
            let replacement = self.spawn_one(species, collision, rng);
            self.entities.push(replacement);
        }
        true
    }

    /// The single closest entity within the encounter radius, or none.
    /// Strict comparison keeps the first-placed entity on exact ties.
    pub fn nearest_within_radius(&self, position: Vec2) -> Option<&SpawnEntity> {
        let mut closest: Option<(&SpawnEntity, f64)> = None;
        for entity in &self.entities {
            let distance = position.distance(Vec2::new(entity.x, entity.y));
            match closest {
                Some((_, best)) if distance >= best => {}
                _ => closest = Some((entity, distance)),
            }
        }
        closest.and_then(|(entity, distance)| {
            (distance <= self.config.proximity_radius).then_some(entity)
        })
    }

    /// Pure viewport cull; safe to call every frame.
    pub fn visible_entities(&self, camera: Vec2, viewport: Viewport) -> Vec<&SpawnEntity> {
        let buffer = self.config.cull_buffer;
        self.entities
            .iter()
            .filter(|entity| {
                let screen_x = entity.x - camera.x;
                let screen_y = entity.y - camera.y;
                screen_x > -buffer
                    && screen_x < viewport.width as f64 + buffer
                    && screen_y > -buffer
                    && screen_y < viewport.height as f64 + buffer
            })
            .collect()
    }

    fn spawn_one<R: Rng + ?Sized>(
        &mut self,
        species: &[Species],
        collision: &CollisionField,
        rng: &mut R,
    ) -> SpawnEntity {
        let pick = &species[rng.gen_range(0..species.len())];
        let position = self.random_walkable_position(collision, rng);
        let id = self.next_id;
        self.next_id += 1;
        SpawnEntity {
            id,
            species_id: pick.id,
            species_name: pick.name.clone(),
            x: position.x,
            y: position.y,
        }
    }

    /// Rejection-samples a walkable point; the map centre is the fallback
    /// when the attempt budget runs out (e.g. collision data failed open or
    /// the map is mostly blocked).
    fn random_walkable_position<R: Rng + ?Sized>(
        &self,
        collision: &CollisionField,
        rng: &mut R,
    ) -> Vec2 {
        for _ in 0..self.config.max_placement_attempts {
            let x = rng.gen_range(0.0..self.config.map_width);
            let y = rng.gen_range(0.0..self.config.map_height);
            if collision.is_walkable(x, y) {
                return Vec2::new(x, y);
            }
        }
        Vec2::new(self.config.map_width / 2.0, self.config.map_height / 2.0)
    }
}
