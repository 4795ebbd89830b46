use std::sync::Arc;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use super::game::Game;
use super::input::{Direction, InputEvent};
use super::metrics::MetricsAccumulator;
use super::renderer::{Renderer, RendererConfig};

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Overworld".to_string(),
            window_width: 960,
            window_height: 540,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

/// Fixed-tick application loop: window events feed directional input to the
/// game, simulation advances at `target_tps`, and every pass renders a fresh
/// frame snapshot.
pub fn run_app(
    config: LoopConfig,
    renderer_config: RendererConfig,
    mut game: Box<dyn Game>,
) -> Result<(), AppError> {
    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let mut renderer =
        Renderer::new(Arc::clone(&window), renderer_config).map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let target_tps = config.target_tps.max(1);
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let max_frame_delta = normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        "loop_config"
    );

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut metrics = MetricsAccumulator::new(metrics_log_interval);
    let loop_window = Arc::clone(&window);

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == loop_window.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = loop_window.inner_size();
                        if let Err(error) = renderer.resize(size.width, size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        let PhysicalKey::Code(code) = event.physical_key else {
                            return;
                        };
                        if code == KeyCode::Escape && event.state == ElementState::Pressed {
                            info!(reason = "escape_key", "shutdown_requested");
                            window_target.exit();
                            return;
                        }
                        if is_interact_key(code) {
                            if event.state == ElementState::Pressed && !event.repeat {
                                game.handle_input(InputEvent::Interact);
                            }
                            return;
                        }
                        let Some(direction) = direction_for_key(code) else {
                            return;
                        };
                        match event.state {
                            ElementState::Pressed if !event.repeat => {
                                game.handle_input(InputEvent::Press(direction));
                            }
                            ElementState::Released => {
                                game.handle_input(InputEvent::Release(direction));
                            }
                            ElementState::Pressed => {}
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                let now = Instant::now();
                let mut frame_dt = now.saturating_duration_since(last_frame_instant);
                last_frame_instant = now;
                if frame_dt > max_frame_delta {
                    frame_dt = max_frame_delta;
                }
                accumulator = accumulator.saturating_add(frame_dt);

                let mut ticks_this_frame = 0;
                while accumulator >= fixed_dt && ticks_this_frame < max_ticks_per_frame {
                    game.update(fixed_dt, renderer.viewport());
                    metrics.record_tick();
                    accumulator -= fixed_dt;
                    ticks_this_frame += 1;
                }
                if ticks_this_frame == max_ticks_per_frame {
                    // Shed backlog instead of spiralling after a long stall.
                    accumulator = Duration::ZERO;
                }

                let snapshot = game.frame(renderer.viewport());
                if let Err(error) = renderer.render(&snapshot) {
                    warn!(error = %error, "render_failed");
                    window_target.exit();
                    return;
                }

                metrics.record_frame(frame_dt);
                if let Some(sample) = metrics.maybe_snapshot(now) {
                    info!(
                        fps = sample.fps,
                        tps = sample.tps,
                        frame_time_ms = sample.frame_time_ms,
                        "loop_metrics"
                    );
                }
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

fn direction_for_key(code: KeyCode) -> Option<Direction> {
    match code {
        KeyCode::ArrowUp | KeyCode::KeyW => Some(Direction::Up),
        KeyCode::ArrowDown | KeyCode::KeyS => Some(Direction::Down),
        KeyCode::ArrowLeft | KeyCode::KeyA => Some(Direction::Left),
        KeyCode::ArrowRight | KeyCode::KeyD => Some(Direction::Right),
        _ => None,
    }
}

fn is_interact_key(code: KeyCode) -> bool {
    matches!(code, KeyCode::Space | KeyCode::Enter)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wasd_and_arrows_map_to_the_same_directions() {
        assert_eq!(direction_for_key(KeyCode::KeyW), Some(Direction::Up));
        assert_eq!(direction_for_key(KeyCode::ArrowUp), Some(Direction::Up));
        assert_eq!(direction_for_key(KeyCode::KeyD), Some(Direction::Right));
        assert_eq!(
            direction_for_key(KeyCode::ArrowRight),
            Some(Direction::Right)
        );
        assert_eq!(direction_for_key(KeyCode::Space), None);
    }

    #[test]
    fn space_and_enter_are_interact_keys() {
        assert!(is_interact_key(KeyCode::Space));
        assert!(is_interact_key(KeyCode::Enter));
        assert!(!is_interact_key(KeyCode::KeyW));
    }

    #[test]
    fn zero_durations_fall_back_to_defaults() {
        assert_eq!(
            normalize_non_zero_duration(Duration::ZERO, Duration::from_secs(1)),
            Duration::from_secs(1)
        );
        assert_eq!(
            normalize_non_zero_duration(Duration::from_millis(5), Duration::from_secs(1)),
            Duration::from_millis(5)
        );
    }
}
