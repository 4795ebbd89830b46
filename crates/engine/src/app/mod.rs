mod game;
mod input;
mod loop_runner;
mod metrics;
mod renderer;

pub use game::{AvatarView, EntityMarker, FrameSnapshot, Game, RenderTile};
pub use input::{Direction, DirectionStack, InputEvent};
pub use loop_runner::{run_app, AppError, LoopConfig};
pub use metrics::LoopMetricsSnapshot;
pub use renderer::{Renderer, RendererConfig};
