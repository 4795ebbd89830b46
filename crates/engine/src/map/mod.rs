mod collision;
mod geometry;
mod loader;
mod manifest;
mod tiles;

pub use collision::{
    CollisionField, CollisionGrid, COLOR_TOLERANCE, SEMI_WALKABLE_COLOR, WALKABLE_COLOR,
};
pub use geometry::{camera_position, world_to_screen, Vec2, Viewport};
pub use loader::{TileImage, TileLoadResult, TileLoaderPool};
pub use manifest::{ManifestError, MapManifest, MANIFEST_FILE};
pub use tiles::{TileKey, TileStreamer, TileStreamerConfig, VisibleTile};
