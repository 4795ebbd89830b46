use std::time::Duration;

use engine::{camera_position, CollisionField, Direction, DirectionStack, InputEvent, Vec2, Viewport};
use tracing::info;

/// Tuning for avatar movement and the walk-cycle animation. Defaults match
/// the shipped overworld sprite and cadence.
#[derive(Debug, Clone)]
pub struct MovementConfig {
    pub map_width: f64,
    pub map_height: f64,
    /// World pixels covered by one step.
    pub step_px: f64,
    pub step_interval: Duration,
    pub frame_interval: Duration,
    pub frame_count: u32,
    /// How long the walk frame is held after input stops before resetting,
    /// so tap-style movement does not visually snap.
    pub idle_grace: Duration,
    pub sprite_width: f64,
    pub sprite_height: f64,
    /// Collision is probed below the sprite centre, at the feet.
    pub probe_offset_y: f64,
    /// Bound on the radial search that heals an unwalkable restored
    /// position.
    pub snap_search_radius: f64,
}

impl MovementConfig {
    pub fn for_map(map_width: f64, map_height: f64) -> Self {
        Self {
            map_width,
            map_height,
            step_px: 24.0,
            step_interval: Duration::from_millis(120),
            frame_interval: Duration::from_millis(120),
            frame_count: 4,
            idle_grace: Duration::from_millis(150),
            sprite_width: 68.0,
            sprite_height: 72.0,
            probe_offset_y: 12.0,
            snap_search_radius: 512.0,
        }
    }

    fn home(&self) -> Vec2 {
        Vec2::new(self.map_width / 2.0, self.map_height / 2.0)
    }

    fn clamp_to_bounds(&self, position: Vec2) -> Vec2 {
        Vec2 {
            x: clamp_axis(
                position.x,
                self.sprite_width / 2.0,
                self.map_width - self.sprite_width / 2.0,
            ),
            y: clamp_axis(
                position.y,
                self.sprite_height / 2.0,
                self.map_height - self.sprite_height / 2.0,
            ),
        }
    }
}

fn clamp_axis(value: f64, lo: f64, hi: f64) -> f64 {
    value.min(hi).max(lo)
}

/// Avatar state machine: owns the world position, facing and walk frame.
/// Directional input transitions Idle/Moving; while moving, steps land on a
/// fixed interval (plus one immediate step on a fresh press) and are
/// rejected when the collision probe says the target is not walkable. No
/// movement happens at all until the collision field reports ready.
pub struct MovementController {
    config: MovementConfig,
    position: Vec2,
    facing: Direction,
    frame: u32,
    pressed: DirectionStack,
    moving: bool,
    step_accum: Duration,
    frame_accum: Duration,
    idle_accum: Duration,
    needs_walkable_check: bool,
}

impl MovementController {
    /// `restored` is the persisted position for this account, if any.
    /// Non-finite values are discarded in favour of the home position;
    /// a position that turns out to be unwalkable is healed on the first
    /// update after the collision field becomes ready.
    pub fn new(config: MovementConfig, restored: Option<Vec2>) -> Self {
        let valid = restored.filter(|p| p.x.is_finite() && p.y.is_finite());
        let position = valid
            .map(|p| config.clamp_to_bounds(p))
            .unwrap_or_else(|| config.home());
        let needs_walkable_check = valid.is_some();
        Self {
            config,
            position,
            facing: Direction::Down,
            frame: 0,
            pressed: DirectionStack::default(),
            moving: false,
            step_accum: Duration::ZERO,
            frame_accum: Duration::ZERO,
            idle_accum: Duration::ZERO,
            needs_walkable_check,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    #[cfg(test)]
    pub(crate) fn facing(&self) -> Direction {
        self.facing
    }

    #[cfg(test)]
    pub(crate) fn frame(&self) -> u32 {
        self.frame
    }

    #[cfg(test)]
    pub(crate) fn is_moving(&self) -> bool {
        self.moving
    }

    /// Sprite-sheet cell for the current facing and walk frame: rows are
    /// down/left/right/up, columns are the animation frames.
    pub fn sprite_cell(&self) -> (u32, u32) {
        let row = match self.facing {
            Direction::Down => 0,
            Direction::Left => 1,
            Direction::Right => 2,
            Direction::Up => 3,
        };
        (self.frame, row)
    }

    /// World point sampled for walkability checks: the avatar's feet.
    pub fn probe_point(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.y + self.config.probe_offset_y)
    }

    pub fn camera(&self, viewport: Viewport) -> Vec2 {
        camera_position(
            self.position,
            viewport,
            self.config.map_width,
            self.config.map_height,
        )
    }

    /// Top-left screen position of the sprite for the given camera.
    pub fn screen_position(&self, camera: Vec2) -> Vec2 {
        Vec2 {
            x: self.position.x - camera.x - self.config.sprite_width / 2.0,
            y: self.position.y - camera.y - self.config.sprite_height / 2.0,
        }
    }

    /// Returns `true` when the avatar's position changed.
    pub fn handle_input(&mut self, event: InputEvent, collision: &CollisionField) -> bool {
        match event {
            InputEvent::Press(direction) | InputEvent::JoystickStart(direction) => {
                let fresh = self.pressed.press(direction);
                self.begin_moving();
                if fresh {
                    // First step of a fresh press lands immediately; repeats
                    // wait for the fixed interval.
                    self.step_accum = Duration::ZERO;
                    return self.try_step(direction, collision);
                }
                false
            }
            InputEvent::Release(direction) => {
                self.pressed.release(direction);
                if self.pressed.is_empty() {
                    self.stop_moving();
                }
                false
            }
            InputEvent::JoystickChange(Some(direction)) => {
                let already_active = self.pressed.active() == Some(direction);
                self.pressed.clear();
                self.pressed.press(direction);
                self.begin_moving();
                if !already_active {
                    self.step_accum = Duration::ZERO;
                    return self.try_step(direction, collision);
                }
                false
            }
            InputEvent::JoystickChange(None) | InputEvent::JoystickStop => {
                self.pressed.clear();
                self.stop_moving();
                false
            }
            // Interaction is handled upstream; it never moves the avatar.
            InputEvent::Interact => false,
        }
    }

    /// Fixed-rate tick. Returns `true` when the avatar's position changed.
    pub fn update(&mut self, dt: Duration, collision: &CollisionField) -> bool {
        let mut changed = false;

        if self.needs_walkable_check && collision.is_ready() {
            self.needs_walkable_check = false;
            changed |= self.heal_position(collision);
        }

        if self.moving {
            if let Some(direction) = self.pressed.active() {
                self.step_accum = self.step_accum.saturating_add(dt);
                while self.step_accum >= self.config.step_interval {
                    self.step_accum -= self.config.step_interval;
                    changed |= self.try_step(direction, collision);
                }
            }
            self.frame_accum = self.frame_accum.saturating_add(dt);
            while self.frame_accum >= self.config.frame_interval {
                self.frame_accum -= self.config.frame_interval;
                self.frame = (self.frame + 1) % self.config.frame_count.max(1);
            }
            self.idle_accum = Duration::ZERO;
        } else if self.frame != 0 {
            self.idle_accum = self.idle_accum.saturating_add(dt);
            if self.idle_accum >= self.config.idle_grace {
                self.frame = 0;
            }
        }

        changed
    }

    fn begin_moving(&mut self) {
        if self.moving {
            return;
        }
        self.moving = true;
        self.step_accum = Duration::ZERO;
        self.frame_accum = Duration::ZERO;
    }

    fn stop_moving(&mut self) {
        if !self.moving {
            return;
        }
        self.moving = false;
        self.idle_accum = Duration::ZERO;
    }

    /// Attempts one step. Facing always updates so a blocked avatar still
    /// turns toward the input; the position only changes when the target
    /// probe is walkable and the collision field is ready.
    fn try_step(&mut self, direction: Direction, collision: &CollisionField) -> bool {
        self.facing = direction;
        if !collision.is_ready() {
            return false;
        }

        let half_w = self.config.sprite_width / 2.0;
        let half_h = self.config.sprite_height / 2.0;
        let step = self.config.step_px;
        let mut candidate = self.position;
        match direction {
            Direction::Up => candidate.y = (candidate.y - step).max(half_h),
            Direction::Down => candidate.y = (candidate.y + step).min(self.config.map_height - half_h),
            Direction::Left => candidate.x = (candidate.x - step).max(half_w),
            Direction::Right => candidate.x = (candidate.x + step).min(self.config.map_width - half_w),
        }

        if !collision.is_walkable(candidate.x, candidate.y + self.config.probe_offset_y) {
            return false;
        }
        if candidate == self.position {
            return false;
        }
        self.position = candidate;
        true
    }

    /// Bounded radial search for the nearest walkable point around an
    /// illegal restored position; falls back to home when the search is
    /// exhausted.
    fn heal_position(&mut self, collision: &CollisionField) -> bool {
        let probe = self.probe_point();
        if collision.is_walkable(probe.x, probe.y) {
            return false;
        }

        let ring_step = self.config.step_px.max(1.0);
        let mut radius = ring_step;
        while radius <= self.config.snap_search_radius {
            let samples = (((radius / ring_step).ceil() as u32) * 8).max(8);
            for sample in 0..samples {
                let angle = f64::from(sample) / f64::from(samples) * std::f64::consts::TAU;
                let candidate = self.config.clamp_to_bounds(Vec2::new(
                    self.position.x + radius * angle.cos(),
                    self.position.y + radius * angle.sin(),
                ));
                if collision.is_walkable(candidate.x, candidate.y + self.config.probe_offset_y) {
                    info!(
                        from_x = self.position.x,
                        from_y = self.position.y,
                        to_x = candidate.x,
                        to_y = candidate.y,
                        "restored_position_snapped_to_walkable"
                    );
                    self.position = candidate;
                    return true;
                }
            }
            radius += ring_step;
        }

        info!("restored_position_unwalkable_using_home");
        self.position = self.config.home();
        true
    }
}
