#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn distance_sq(self, other: Vec2) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Camera origin that keeps `target` centered, clamped so the viewport never
/// leaves the map. A viewport larger than the map pins the camera at 0.
pub fn camera_position(target: Vec2, viewport: Viewport, map_width: f64, map_height: f64) -> Vec2 {
    Vec2 {
        x: clamp_axis(
            target.x - viewport.width as f64 / 2.0,
            map_width - viewport.width as f64,
        ),
        y: clamp_axis(
            target.y - viewport.height as f64 / 2.0,
            map_height - viewport.height as f64,
        ),
    }
}

pub fn world_to_screen(world: Vec2, camera: Vec2) -> Vec2 {
    Vec2 {
        x: world.x - camera.x,
        y: world.y - camera.y,
    }
}

fn clamp_axis(value: f64, max: f64) -> f64 {
    value.min(max).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_centers_target_away_from_edges() {
        let camera = camera_position(
            Vec2::new(500.0, 400.0),
            Viewport::new(200, 100),
            1000.0,
            800.0,
        );
        assert_eq!(camera, Vec2::new(400.0, 350.0));
    }

    #[test]
    fn camera_clamps_at_map_origin() {
        let camera = camera_position(Vec2::new(10.0, 5.0), Viewport::new(200, 100), 1000.0, 800.0);
        assert_eq!(camera, Vec2::new(0.0, 0.0));
    }

    #[test]
    fn camera_clamps_at_far_edge() {
        let camera = camera_position(
            Vec2::new(995.0, 799.0),
            Viewport::new(200, 100),
            1000.0,
            800.0,
        );
        assert_eq!(camera, Vec2::new(800.0, 700.0));
    }

    #[test]
    fn oversized_viewport_pins_camera_at_zero() {
        let camera = camera_position(Vec2::new(50.0, 50.0), Viewport::new(400, 400), 100.0, 100.0);
        assert_eq!(camera, Vec2::new(0.0, 0.0));
    }

    #[test]
    fn world_to_screen_subtracts_camera() {
        let screen = world_to_screen(Vec2::new(300.0, 120.0), Vec2::new(250.0, 100.0));
        assert_eq!(screen, Vec2::new(50.0, 20.0));
    }
}
