use std::path::Path;
use std::time::Duration;

use engine::{
    AvatarView, CollisionField, EntityMarker, FrameSnapshot, Game, InputEvent, MapManifest,
    RenderTile, TileStreamer, TileStreamerConfig, Viewport,
};
use rand::rngs::StdRng;
use tracing::info;

use super::movement::{MovementConfig, MovementController};
use super::position_store::PositionStore;
use super::spawn::{EntitySpawner, SpawnerConfig, Species};

/// The playable overworld: wires the collision field, avatar movement, wild
/// entity population, tile streaming and position persistence together
/// behind the engine's `Game` trait. Each tick runs the same fixed order:
/// poll collision readiness, one-shot entity placement, movement, persist,
/// proximity, tile streaming.
pub struct OverworldScene {
    collision: CollisionField,
    movement: MovementController,
    spawner: EntitySpawner,
    streamer: TileStreamer,
    store: PositionStore,
    account: String,
    species: Vec<Species>,
    rng: StdRng,
    nearby: Option<u64>,
}

impl OverworldScene {
    pub fn new(
        manifest: &MapManifest,
        assets_dir: &Path,
        store: PositionStore,
        account: String,
        species: Vec<Species>,
        rng: StdRng,
    ) -> Self {
        let map_width = f64::from(manifest.map_width);
        let map_height = f64::from(manifest.map_height);

        let collision = CollisionField::begin_load(
            assets_dir.join(&manifest.collision_path),
            map_width,
            map_height,
            manifest.collision_scale,
        );

        let restored = store.load(&account);
        let movement_config = MovementConfig {
            sprite_width: f64::from(manifest.sprite_frame_width),
            sprite_height: f64::from(manifest.sprite_frame_height),
            ..MovementConfig::for_map(map_width, map_height)
        };
        let movement = MovementController::new(movement_config, restored);

        let streamer_config = TileStreamerConfig {
            tile_extension: manifest.tile_extension.clone(),
            ..TileStreamerConfig::new(
                map_width,
                map_height,
                manifest.tile_size,
                assets_dir.join(&manifest.tile_dir),
            )
        };
        let streamer = TileStreamer::new(streamer_config);

        let spawner = EntitySpawner::new(SpawnerConfig::for_map(map_width, map_height));

        Self::from_parts(
            collision, movement, spawner, streamer, store, account, species, rng,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        collision: CollisionField,
        movement: MovementController,
        spawner: EntitySpawner,
        streamer: TileStreamer,
        store: PositionStore,
        account: String,
        species: Vec<Species>,
        rng: StdRng,
    ) -> Self {
        Self {
            collision,
            movement,
            spawner,
            streamer,
            store,
            account,
            species,
            rng,
            nearby: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn nearby_entity_id(&self) -> Option<u64> {
        self.nearby
    }

    /// Despawns the entity currently in encounter range, if any; the battle
    /// and catch flow itself lives with the out-of-process backend. The
    /// population is replenished immediately.
    pub fn resolve_encounter(&mut self) -> bool {
        let Some(id) = self.nearby.take() else {
            return false;
        };
        let resolved = self
            .spawner
            .remove(id, &self.species, &self.collision, &mut self.rng);
        if resolved {
            info!(entity_id = id, "encounter_resolved");
        }
        resolved
    }

    fn persist_position(&self) {
        self.store.save(&self.account, self.movement.position());
    }
}

impl Game for OverworldScene {
    fn handle_input(&mut self, event: InputEvent) {
        if event == InputEvent::Interact {
            self.resolve_encounter();
            return;
        }
        if self.movement.handle_input(event, &self.collision) {
            self.persist_position();
        }
    }

    fn update(&mut self, dt: Duration, viewport: Viewport) {
        self.collision.poll();
        if self.collision.is_ready() {
            // No-op once populated; spawning waits for walkability data so
            // entities never land inside walls.
            self.spawner
                .place_initial(&self.species, &self.collision, &mut self.rng);
        }

        if self.movement.update(dt, &self.collision) {
            self.persist_position();
        }

        let camera = self.movement.camera(viewport);
        self.streamer.update(camera, viewport, dt);

        let nearest = self.spawner.nearest_within_radius(self.movement.position());
        let nearby = nearest.map(|entity| entity.id);
        if nearby != self.nearby {
            match nearest {
                Some(entity) => info!(
                    entity_id = entity.id,
                    species_id = entity.species_id,
                    species = %entity.species_name,
                    "encounter_available"
                ),
                None => info!("encounter_cleared"),
            }
            self.nearby = nearby;
        }
    }

    fn frame(&mut self, viewport: Viewport) -> FrameSnapshot {
        let camera = self.movement.camera(viewport);

        let tile_size = self.streamer.tile_size();
        let tiles = self
            .streamer
            .visible_tiles()
            .iter()
            .map(|tile| RenderTile {
                screen_x: tile.screen_x,
                screen_y: tile.screen_y,
                size: tile_size,
                image: if tile.loaded {
                    self.streamer.image(tile.key)
                } else {
                    None
                },
            })
            .collect();

        let screen = self.movement.screen_position(camera);
        let (frame_col, frame_row) = self.movement.sprite_cell();
        let probe = self.movement.probe_point();
        let avatar = AvatarView {
            screen_x: screen.x,
            screen_y: screen.y,
            frame_col,
            frame_row,
            translucent: self.collision.is_ready()
                && self.collision.is_semi_walkable(probe.x, probe.y),
        };

        let entities = self
            .spawner
            .visible_entities(camera, viewport)
            .into_iter()
            .map(|entity| EntityMarker {
                id: entity.id,
                screen_x: entity.x - camera.x,
                screen_y: entity.y - camera.y,
                nearby: Some(entity.id) == self.nearby,
            })
            .collect();

        FrameSnapshot {
            camera,
            tiles,
            avatar,
            entities,
        }
    }
}
