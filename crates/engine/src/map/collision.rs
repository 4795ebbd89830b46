use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use image::imageops::FilterType;
use tracing::{info, warn};

/// Pixel colour marking regular walkable ground in the collision bitmap.
pub const WALKABLE_COLOR: [u8; 3] = [255, 0, 255];
/// Pixel colour marking semi-walkable ground (water, tall grass).
pub const SEMI_WALKABLE_COLOR: [u8; 3] = [0, 255, 255];
/// Per-channel tolerance absorbing lossy-compression drift in the bitmap.
pub const COLOR_TOLERANCE: u8 = 30;

/// Downscaled RGBA snapshot of the collision bitmap. Immutable once built.
#[derive(Debug, Clone)]
pub struct CollisionGrid {
    width: u32,
    height: u32,
    scale: u32,
    rgba: Vec<u8>,
}

impl CollisionGrid {
    pub fn from_rgba(width: u32, height: u32, scale: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * 4;
        if scale == 0 || rgba.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            scale,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn pixel_matches(&self, x: i64, y: i64, target: [u8; 3]) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        let index = (y as usize * self.width as usize + x as usize) * 4;
        let pixel = &self.rgba[index..index + 4];
        pixel[0].abs_diff(target[0]) <= COLOR_TOLERANCE
            && pixel[1].abs_diff(target[1]) <= COLOR_TOLERANCE
            && pixel[2].abs_diff(target[2]) <= COLOR_TOLERANCE
    }

    /// 3x3 neighbourhood sample: a single matching pixel is enough. The
    /// downscale aliases class boundaries, and sticking the avatar on a
    /// boundary is worse than letting it brush past one.
    fn neighbourhood_matches(&self, x: i64, y: i64, target: [u8; 3]) -> bool {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if self.pixel_matches(x + dx, y + dy, target) {
                    return true;
                }
            }
        }
        false
    }
}

enum FieldState {
    Loading(Receiver<Option<CollisionGrid>>),
    Ready(CollisionGrid),
    Failed,
}

/// Walkability oracle over the collision bitmap. The bitmap is decoded once,
/// off the main timeline; until it is ready (and forever if the decode
/// fails) every query answers `true` so the avatar is never stuck waiting
/// on an asset.
pub struct CollisionField {
    map_width: f64,
    map_height: f64,
    state: FieldState,
}

impl CollisionField {
    /// Kicks off the background decode and returns immediately. Callers
    /// observe readiness through [`poll`](Self::poll); nobody blocks.
    pub fn begin_load(path: PathBuf, map_width: f64, map_height: f64, scale: u32) -> Self {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let grid = decode_collision_bitmap(&path, map_width, map_height, scale);
            // Receiver may be gone if the field was dropped mid-load.
            let _ = sender.send(grid);
        });
        Self {
            map_width,
            map_height,
            state: FieldState::Loading(receiver),
        }
    }

    /// Ready-made field, for tests and offline tooling.
    pub fn from_grid(grid: CollisionGrid, map_width: f64, map_height: f64) -> Self {
        Self {
            map_width,
            map_height,
            state: FieldState::Ready(grid),
        }
    }

    /// Non-blocking readiness check; call once per tick. A failed decode is
    /// terminal for this process: no retry, queries stay fail-open.
    pub fn poll(&mut self) {
        let FieldState::Loading(receiver) = &self.state else {
            return;
        };
        match receiver.try_recv() {
            Ok(Some(grid)) => {
                info!(
                    grid_width = grid.width,
                    grid_height = grid.height,
                    scale = grid.scale,
                    "collision_grid_ready"
                );
                self.state = FieldState::Ready(grid);
            }
            Ok(None) | Err(TryRecvError::Disconnected) => {
                warn!("collision_grid_unavailable_failing_open");
                self.state = FieldState::Failed;
            }
            Err(TryRecvError::Empty) => {}
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, FieldState::Ready(_))
    }

    pub fn is_walkable(&self, x: f64, y: f64) -> bool {
        self.query(x, y, WALKABLE_COLOR)
    }

    pub fn is_semi_walkable(&self, x: f64, y: f64) -> bool {
        self.query(x, y, SEMI_WALKABLE_COLOR)
    }

    fn query(&self, x: f64, y: f64, target: [u8; 3]) -> bool {
        let FieldState::Ready(grid) = &self.state else {
            return true;
        };
        let clamped_x = clamp_coord(x, self.map_width);
        let clamped_y = clamp_coord(y, self.map_height);
        let sample_x = (clamped_x / grid.scale as f64).floor() as i64;
        let sample_y = (clamped_y / grid.scale as f64).floor() as i64;
        grid.neighbourhood_matches(sample_x, sample_y, target)
    }
}

fn clamp_coord(value: f64, max_exclusive: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.min(max_exclusive - 1.0).max(0.0)
}

fn decode_collision_bitmap(
    path: &std::path::Path,
    map_width: f64,
    map_height: f64,
    scale: u32,
) -> Option<CollisionGrid> {
    let grid_width = ((map_width as u32) / scale).max(1);
    let grid_height = ((map_height as u32) / scale).max(1);
    match image::open(path) {
        Ok(decoded) => {
            // Nearest keeps the class colours crisp; any smoothing filter
            // would blend boundary pixels out of tolerance.
            let resized = decoded.resize_exact(grid_width, grid_height, FilterType::Nearest);
            let rgba = resized.to_rgba8();
            CollisionGrid::from_rgba(grid_width, grid_height, scale, rgba.into_raw())
        }
        Err(error) => {
            warn!(
                path = %path.display(),
                error = %error,
                "collision_bitmap_decode_failed"
            );
            None
        }
    }
}
