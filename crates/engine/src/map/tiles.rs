use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::geometry::{Vec2, Viewport};
use super::loader::{TileImage, TileLoaderPool};

/// How far past the viewport edge tiles are still considered visible, in
/// multiples of the tile size. Keeps one-and-a-half rings of slack so tiles
/// materialise before they scroll on screen.
const VISIBILITY_BUFFER_TILES: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibleTile {
    pub key: TileKey,
    pub screen_x: f64,
    pub screen_y: f64,
    pub loaded: bool,
}

#[derive(Debug, Clone)]
pub struct TileStreamerConfig {
    pub map_width: f64,
    pub map_height: f64,
    pub tile_size: u32,
    pub cache_capacity: usize,
    pub worker_count: usize,
    /// Visible-set recomputation is coalesced to this interval while the
    /// camera moves continuously.
    pub recompute_interval: Duration,
    pub tile_dir: PathBuf,
    pub tile_extension: String,
}

impl TileStreamerConfig {
    pub fn new(map_width: f64, map_height: f64, tile_size: u32, tile_dir: PathBuf) -> Self {
        Self {
            map_width,
            map_height,
            tile_size,
            cache_capacity: 100,
            worker_count: 4,
            recompute_interval: Duration::from_millis(16),
            tile_dir,
            tile_extension: "png".to_string(),
        }
    }
}

struct CacheEntry {
    image: Arc<TileImage>,
    last_used: u64,
}

/// Streams background tiles for the current camera rectangle: computes the
/// visible set, feeds uncached tiles to the loader pool (closest first),
/// and maintains a recency-bounded cache of decoded images. Everything
/// mutating happens on the caller's tick; workers only hand results back.
pub struct TileStreamer {
    config: TileStreamerConfig,
    tiles_x: i32,
    tiles_y: i32,
    cache: HashMap<TileKey, CacheEntry>,
    in_flight: HashSet<TileKey>,
    pool: TileLoaderPool,
    visible: Vec<VisibleTile>,
    use_counter: u64,
    submitted: u64,
    recompute_accum: Duration,
    last_view: Option<(Vec2, Viewport)>,
}

impl TileStreamer {
    pub fn new(config: TileStreamerConfig) -> Self {
        let tile = config.tile_size.max(1) as f64;
        let tiles_x = (config.map_width / tile).ceil() as i32;
        let tiles_y = (config.map_height / tile).ceil() as i32;
        let pool = TileLoaderPool::new(config.worker_count);
        Self {
            config,
            tiles_x,
            tiles_y,
            cache: HashMap::new(),
            in_flight: HashSet::new(),
            pool,
            visible: Vec::new(),
            use_counter: 0,
            submitted: 0,
            recompute_accum: Duration::ZERO,
            last_view: None,
        }
    }

    /// Per-tick entry point: applies finished loads, then recomputes the
    /// visible set if the view changed and the coalescing interval elapsed.
    pub fn update(&mut self, camera: Vec2, viewport: Viewport, dt: Duration) {
        self.pump_completions();

        self.recompute_accum = self.recompute_accum.saturating_add(dt);
        let view = (camera, viewport);
        let dirty = self.last_view != Some(view);
        let first = self.last_view.is_none();
        if dirty && (first || self.recompute_accum >= self.config.recompute_interval) {
            self.recompute(camera, viewport);
            self.last_view = Some(view);
            self.recompute_accum = Duration::ZERO;
        }
    }

    pub fn visible_tiles(&self) -> &[VisibleTile] {
        &self.visible
    }

    pub fn image(&self, key: TileKey) -> Option<Arc<TileImage>> {
        self.cache.get(&key).map(|entry| Arc::clone(&entry.image))
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn tile_size(&self) -> u32 {
        self.config.tile_size
    }

    fn recompute(&mut self, camera: Vec2, viewport: Viewport) {
        let tile = self.config.tile_size.max(1) as f64;
        let buffer = tile * VISIBILITY_BUFFER_TILES;
        let start_x = (((camera.x - buffer) / tile).floor() as i32).max(0);
        let end_x = (((camera.x + viewport.width as f64 + buffer) / tile).floor() as i32)
            .min(self.tiles_x - 1);
        let start_y = (((camera.y - buffer) / tile).floor() as i32).max(0);
        let end_y = (((camera.y + viewport.height as f64 + buffer) / tile).floor() as i32)
            .min(self.tiles_y - 1);

        self.visible.clear();
        let mut to_load = Vec::new();
        for tile_y in start_y..=end_y {
            for tile_x in start_x..=end_x {
                let key = TileKey {
                    x: tile_x,
                    y: tile_y,
                };
                let cached = if let Some(entry) = self.cache.get_mut(&key) {
                    // On-screen tiles stay fresh in the recency order.
                    self.use_counter += 1;
                    entry.last_used = self.use_counter;
                    true
                } else {
                    false
                };
                self.visible.push(VisibleTile {
                    key,
                    screen_x: tile_x as f64 * tile - camera.x,
                    screen_y: tile_y as f64 * tile - camera.y,
                    loaded: cached,
                });
                if !cached && !self.in_flight.contains(&key) {
                    to_load.push(key);
                }
            }
        }

        if to_load.is_empty() {
            return;
        }
        let view_center = Vec2::new(
            camera.x + viewport.width as f64 / 2.0,
            camera.y + viewport.height as f64 / 2.0,
        );
        for key in to_load {
            let tile_center = Vec2::new(
                key.x as f64 * tile + tile / 2.0,
                key.y as f64 * tile + tile / 2.0,
            );
            let priority_sq = tile_center.distance_sq(view_center) as i64;
            self.in_flight.insert(key);
            self.submitted += 1;
            self.pool.submit(key, self.tile_path(key), priority_sq);
        }
        debug!(
            visible = self.visible.len(),
            in_flight = self.in_flight.len(),
            submitted_total = self.submitted,
            "tile_visibility_recomputed"
        );
    }

    fn pump_completions(&mut self) {
        while let Some(result) = self.pool.try_recv() {
            self.in_flight.remove(&result.key);
            let Some(image) = result.image else {
                // Failed tile stays unloaded; a later recompute that finds it
                // uncached again is the only retry path.
                continue;
            };
            self.insert_loaded(result.key, image);
            if let Some(tile) = self.visible.iter_mut().find(|tile| tile.key == result.key) {
                tile.loaded = true;
            }
        }
    }

    /// Insert-then-evict is a single step so the cache can never be observed
    /// over capacity.
    fn insert_loaded(&mut self, key: TileKey, image: Arc<TileImage>) {
        self.use_counter += 1;
        self.cache.insert(
            key,
            CacheEntry {
                image,
                last_used: self.use_counter,
            },
        );
        while self.cache.len() > self.config.cache_capacity {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| *key);
            let Some(oldest) = oldest else {
                break;
            };
            self.cache.remove(&oldest);
        }
    }

    fn tile_path(&self, key: TileKey) -> PathBuf {
        self.config.tile_dir.join(format!(
            "map_{}_{}.{}",
            key.x, key.y, self.config.tile_extension
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: PathBuf) -> TileStreamerConfig {
        TileStreamerConfig::new(10560.0, 6080.0, 512, dir)
    }

    fn test_image() -> Arc<TileImage> {
        Arc::new(TileImage {
            width: 1,
            height: 1,
            rgba: vec![0, 0, 0, 255],
        })
    }

    fn keys(streamer: &TileStreamer) -> Vec<TileKey> {
        streamer.visible.iter().map(|tile| tile.key).collect()
    }

    #[test]
    fn visible_set_at_origin_is_exactly_the_buffered_grid_corner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut streamer = TileStreamer::new(test_config(dir.path().to_path_buf()));
        streamer.update(Vec2::new(0.0, 0.0), Viewport::new(512, 512), Duration::ZERO);

        // Camera rect expanded by 1.5 tiles covers world x in [-768, 1280):
        // tile columns 0..=2, clamped at the grid edge. Same for rows.
        let mut expected = Vec::new();
        for y in 0..=2 {
            for x in 0..=2 {
                expected.push(TileKey { x, y });
            }
        }
        assert_eq!(keys(&streamer), expected);
        for tile in streamer.visible_tiles() {
            assert!(!tile.loaded);
            assert_eq!(tile.screen_x, tile.key.x as f64 * 512.0);
            assert_eq!(tile.screen_y, tile.key.y as f64 * 512.0);
        }
    }

    #[test]
    fn visible_set_clamps_at_far_corner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut streamer = TileStreamer::new(test_config(dir.path().to_path_buf()));
        // Grid is 21x12 tiles; camera pinned at the bottom-right corner.
        streamer.update(
            Vec2::new(10560.0 - 512.0, 6080.0 - 512.0),
            Viewport::new(512, 512),
            Duration::ZERO,
        );

        let visible = keys(&streamer);
        assert!(visible.iter().all(|key| key.x <= 20 && key.y <= 11));
        assert!(visible.contains(&TileKey { x: 20, y: 11 }));
        assert!(visible.contains(&TileKey { x: 18, y: 10 }));
        assert!(!visible.contains(&TileKey { x: 21, y: 11 }));
    }

    #[test]
    fn screen_coordinates_are_camera_relative() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut streamer = TileStreamer::new(test_config(dir.path().to_path_buf()));
        streamer.update(
            Vec2::new(1000.0, 600.0),
            Viewport::new(512, 512),
            Duration::ZERO,
        );

        let tile = streamer
            .visible_tiles()
            .iter()
            .find(|tile| tile.key == TileKey { x: 2, y: 1 })
            .expect("tile (2,1) visible")
            .clone();
        assert_eq!(tile.screen_x, 2.0 * 512.0 - 1000.0);
        assert_eq!(tile.screen_y, 512.0 - 600.0);
    }

    #[test]
    fn cache_never_exceeds_capacity_and_keeps_most_recent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path().to_path_buf());
        config.cache_capacity = 3;
        let mut streamer = TileStreamer::new(config);

        for i in 0..8 {
            streamer.insert_loaded(TileKey { x: i, y: 0 }, test_image());
            assert!(streamer.cache_len() <= 3);
        }

        assert_eq!(streamer.cache_len(), 3);
        for i in 5..8 {
            assert!(streamer.image(TileKey { x: i, y: 0 }).is_some());
        }
        for i in 0..5 {
            assert!(streamer.image(TileKey { x: i, y: 0 }).is_none());
        }
    }

    #[test]
    fn eviction_removes_least_recently_used_not_least_recently_inserted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path().to_path_buf());
        config.cache_capacity = 2;
        let mut streamer = TileStreamer::new(config);

        streamer.insert_loaded(TileKey { x: 0, y: 0 }, test_image());
        streamer.insert_loaded(TileKey { x: 9, y: 9 }, test_image());
        // Touch the older entry by bringing it on screen; (9,9) is far
        // outside the window and keeps its older stamp.
        streamer.recompute(Vec2::new(0.0, 0.0), Viewport::new(1, 1));
        streamer.insert_loaded(TileKey { x: 5, y: 5 }, test_image());

        assert_eq!(streamer.cache_len(), 2);
        assert!(streamer.image(TileKey { x: 0, y: 0 }).is_some());
        assert!(streamer.image(TileKey { x: 5, y: 5 }).is_some());
        assert!(streamer.image(TileKey { x: 9, y: 9 }).is_none());
    }

    #[test]
    fn tiles_already_in_flight_are_not_resubmitted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut streamer = TileStreamer::new(test_config(dir.path().to_path_buf()));

        streamer.recompute(Vec2::new(0.0, 0.0), Viewport::new(512, 512));
        let first_pass = streamer.submitted;
        assert_eq!(first_pass, 9);

        // Same window again without pumping completions: every key is still
        // marked in flight, so nothing new may be submitted.
        streamer.recompute(Vec2::new(1.0, 0.0), Viewport::new(512, 512));
        assert_eq!(streamer.submitted, first_pass);
    }

    #[test]
    fn recompute_is_coalesced_until_the_interval_elapses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut streamer = TileStreamer::new(test_config(dir.path().to_path_buf()));
        let viewport = Viewport::new(512, 512);

        streamer.update(Vec2::new(0.0, 0.0), viewport, Duration::ZERO);
        let origin_tiles = keys(&streamer);

        // 1ms later the camera has moved a full tile; too soon to recompute.
        streamer.update(Vec2::new(512.0, 0.0), viewport, Duration::from_millis(1));
        assert_eq!(keys(&streamer), origin_tiles);

        // Once the interval accumulates, the pending change is applied.
        streamer.update(Vec2::new(512.0, 0.0), viewport, Duration::from_millis(20));
        assert_ne!(keys(&streamer), origin_tiles);
        assert!(keys(&streamer).contains(&TileKey { x: 3, y: 0 }));
    }

    #[test]
    fn completed_load_marks_visible_tile_without_recompute() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tile_path = dir.path().join("map_0_0.png");
        image::RgbaImage::from_pixel(2, 2, image::Rgba([1, 2, 3, 255]))
            .save(&tile_path)
            .expect("save tile");

        let mut streamer = TileStreamer::new(test_config(dir.path().to_path_buf()));
        let viewport = Viewport::new(512, 512);
        streamer.update(Vec2::new(0.0, 0.0), viewport, Duration::ZERO);
        assert!(!streamer.visible_tiles()[0].loaded);

        // Pump with an unchanged view until the worker delivers tile (0,0);
        // the visible entry flips to loaded without a recompute.
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while streamer.image(TileKey { x: 0, y: 0 }).is_none() {
            assert!(std::time::Instant::now() < deadline, "tile load timed out");
            std::thread::sleep(Duration::from_millis(5));
            streamer.update(Vec2::new(0.0, 0.0), viewport, Duration::from_millis(5));
        }
        let tile = streamer
            .visible_tiles()
            .iter()
            .find(|tile| tile.key == TileKey { x: 0, y: 0 })
            .expect("origin tile");
        assert!(tile.loaded);

        // The other eight tiles failed to decode and stay unloaded.
        assert!(streamer.image(TileKey { x: 1, y: 1 }).is_none());
    }
}
