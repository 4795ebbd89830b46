use std::sync::Arc;
use std::time::Duration;

use crate::map::{TileImage, Vec2, Viewport};

use super::input::InputEvent;

/// One background tile ready for drawing. `image` is `None` while the tile
/// is still loading (or failed); the renderer fills a placeholder cell.
#[derive(Debug, Clone)]
pub struct RenderTile {
    pub screen_x: f64,
    pub screen_y: f64,
    pub size: u32,
    pub image: Option<Arc<TileImage>>,
}

/// Avatar draw state: camera-relative position plus the sprite-sheet cell
/// selected by facing and walk cycle.
#[derive(Debug, Clone, Copy)]
pub struct AvatarView {
    pub screen_x: f64,
    pub screen_y: f64,
    pub frame_col: u32,
    pub frame_row: u32,
    /// Standing on semi-walkable ground (water, tall grass); drawn half
    /// transparent.
    pub translucent: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EntityMarker {
    pub id: u64,
    pub screen_x: f64,
    pub screen_y: f64,
    /// Within encounter range of the avatar.
    pub nearby: bool,
}

/// Side-effect-free drawing snapshot taken once per render pass.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub camera: Vec2,
    pub tiles: Vec<RenderTile>,
    pub avatar: AvatarView,
    pub entities: Vec<EntityMarker>,
}

/// The simulation driven by the app loop: input events in, fixed-rate
/// updates, and a pure frame snapshot out.
pub trait Game {
    fn handle_input(&mut self, event: InputEvent);
    fn update(&mut self, dt: Duration, viewport: Viewport);
    fn frame(&mut self, viewport: Viewport) -> FrameSnapshot;
}
