use std::path::PathBuf;
use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use tracing::warn;
use winit::window::Window;

use crate::map::Viewport;

use super::game::FrameSnapshot;

const CLEAR_COLOR: [u8; 4] = [12, 14, 18, 255];
const TILE_PLACEHOLDER_COLOR: [u8; 4] = [24, 28, 34, 255];
const AVATAR_FALLBACK_COLOR: [u8; 4] = [232, 84, 60, 255];
const ENTITY_MARKER_COLOR: [u8; 4] = [255, 222, 90, 255];
const NEARBY_MARKER_COLOR: [u8; 4] = [120, 255, 140, 255];
const ENTITY_MARKER_HALF_SIZE_PX: i32 = 6;
const ALPHA_VISIBLE_THRESHOLD: u8 = 128;

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub sprite_sheet_path: PathBuf,
    pub frame_width: u32,
    pub frame_height: u32,
}

struct SpriteSheet {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
enum BlitMode {
    Opaque,
    /// Per-pixel alpha cutout.
    Cutout,
    /// Cutout mixed 50/50 with the backdrop.
    HalfTransparent,
}

/// Software blitter over a single framebuffer. Purely consumes frame
/// snapshots; all simulation state lives on the other side of the `Game`
/// trait.
pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
    frame_width: u32,
    frame_height: u32,
    sprite_sheet: Option<SpriteSheet>,
}

impl Renderer {
    pub fn new(window: Arc<Window>, config: RendererConfig) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        let sprite_sheet = load_sprite_sheet(&config.sprite_sheet_path);
        Ok(Self {
            window,
            pixels,
            viewport: Viewport {
                width: size.width,
                height: size.height,
            },
            frame_width: config.frame_width,
            frame_height: config.frame_height,
            sprite_sheet,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.viewport = Viewport { width, height };
        Ok(())
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub fn render(&mut self, snapshot: &FrameSnapshot) -> Result<(), Error> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Ok(());
        }
        let viewport = self.viewport;
        let frame = self.pixels.frame_mut();
        for chunk in frame.chunks_exact_mut(4) {
            chunk.copy_from_slice(&CLEAR_COLOR);
        }

        for tile in &snapshot.tiles {
            let x = tile.screen_x.round() as i32;
            let y = tile.screen_y.round() as i32;
            match &tile.image {
                Some(image) => blit(
                    frame,
                    viewport,
                    x,
                    y,
                    &image.rgba,
                    image.width,
                    (0, 0, image.width, image.height),
                    BlitMode::Opaque,
                ),
                None => fill_rect(
                    frame,
                    viewport,
                    x,
                    y,
                    tile.size as i32,
                    tile.size as i32,
                    TILE_PLACEHOLDER_COLOR,
                ),
            }
        }

        for marker in &snapshot.entities {
            let color = if marker.nearby {
                NEARBY_MARKER_COLOR
            } else {
                ENTITY_MARKER_COLOR
            };
            fill_rect(
                frame,
                viewport,
                marker.screen_x.round() as i32 - ENTITY_MARKER_HALF_SIZE_PX,
                marker.screen_y.round() as i32 - ENTITY_MARKER_HALF_SIZE_PX,
                ENTITY_MARKER_HALF_SIZE_PX * 2,
                ENTITY_MARKER_HALF_SIZE_PX * 2,
                color,
            );
        }

        let avatar = &snapshot.avatar;
        let avatar_x = avatar.screen_x.round() as i32;
        let avatar_y = avatar.screen_y.round() as i32;
        let mode = if avatar.translucent {
            BlitMode::HalfTransparent
        } else {
            BlitMode::Cutout
        };
        match &self.sprite_sheet {
            Some(sheet) => {
                let src_x = avatar.frame_col * self.frame_width;
                let src_y = avatar.frame_row * self.frame_height;
                blit(
                    frame,
                    viewport,
                    avatar_x,
                    avatar_y,
                    &sheet.rgba,
                    sheet.width,
                    (src_x, src_y, self.frame_width, self.frame_height),
                    mode,
                );
            }
            None => fill_rect(
                frame,
                viewport,
                avatar_x,
                avatar_y,
                self.frame_width as i32,
                self.frame_height as i32,
                AVATAR_FALLBACK_COLOR,
            ),
        }

        self.pixels.render()
    }
}

fn load_sprite_sheet(path: &std::path::Path) -> Option<SpriteSheet> {
    match image::open(path) {
        Ok(decoded) => {
            let rgba = decoded.to_rgba8();
            Some(SpriteSheet {
                width: rgba.width(),
                height: rgba.height(),
                rgba: rgba.into_raw(),
            })
        }
        Err(error) => {
            warn!(
                path = %path.display(),
                error = %error,
                "sprite_sheet_unavailable_using_placeholder"
            );
            None
        }
    }
}

fn fill_rect(
    frame: &mut [u8],
    viewport: Viewport,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    color: [u8; 4],
) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + width).min(viewport.width as i32);
    let y1 = (y + height).min(viewport.height as i32);
    for row in y0..y1 {
        for col in x0..x1 {
            let index = (row as usize * viewport.width as usize + col as usize) * 4;
            frame[index..index + 4].copy_from_slice(&color);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn blit(
    frame: &mut [u8],
    viewport: Viewport,
    dst_x: i32,
    dst_y: i32,
    src_rgba: &[u8],
    src_stride: u32,
    src_rect: (u32, u32, u32, u32),
    mode: BlitMode,
) {
    let (src_x, src_y, src_w, src_h) = src_rect;
    if src_stride == 0 || src_x + src_w > src_stride {
        return;
    }
    let src_rows = src_rgba.len() / (src_stride as usize * 4);
    if (src_y + src_h) as usize > src_rows {
        return;
    }

    for row in 0..src_h as i32 {
        let out_y = dst_y + row;
        if out_y < 0 || out_y >= viewport.height as i32 {
            continue;
        }
        for col in 0..src_w as i32 {
            let out_x = dst_x + col;
            if out_x < 0 || out_x >= viewport.width as i32 {
                continue;
            }
            let src_index = ((src_y as i32 + row) as usize * src_stride as usize
                + (src_x as i32 + col) as usize)
                * 4;
            let dst_index = (out_y as usize * viewport.width as usize + out_x as usize) * 4;
            let pixel = &src_rgba[src_index..src_index + 4];
            match mode {
                BlitMode::Opaque => {
                    frame[dst_index..dst_index + 4].copy_from_slice(pixel);
                }
                BlitMode::Cutout => {
                    if pixel[3] >= ALPHA_VISIBLE_THRESHOLD {
                        frame[dst_index..dst_index + 4].copy_from_slice(pixel);
                    }
                }
                BlitMode::HalfTransparent => {
                    if pixel[3] >= ALPHA_VISIBLE_THRESHOLD {
                        for channel in 0..3 {
                            let mixed = (u16::from(pixel[channel])
                                + u16::from(frame[dst_index + channel]))
                                / 2;
                            frame[dst_index + channel] = mixed as u8;
                        }
                        frame[dst_index + 3] = 255;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_frame(viewport: Viewport) -> Vec<u8> {
        vec![0u8; viewport.width as usize * viewport.height as usize * 4]
    }

    fn pixel(frame: &[u8], viewport: Viewport, x: usize, y: usize) -> [u8; 4] {
        let index = (y * viewport.width as usize + x) * 4;
        [
            frame[index],
            frame[index + 1],
            frame[index + 2],
            frame[index + 3],
        ]
    }

    #[test]
    fn fill_rect_clips_to_the_framebuffer() {
        let viewport = Viewport::new(4, 4);
        let mut frame = blank_frame(viewport);
        fill_rect(&mut frame, viewport, -2, -2, 4, 4, [9, 9, 9, 255]);

        assert_eq!(pixel(&frame, viewport, 0, 0), [9, 9, 9, 255]);
        assert_eq!(pixel(&frame, viewport, 1, 1), [9, 9, 9, 255]);
        assert_eq!(pixel(&frame, viewport, 2, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn opaque_blit_copies_sub_rect() {
        let viewport = Viewport::new(4, 4);
        let mut frame = blank_frame(viewport);
        // 2x2 source, all distinct colours.
        let src = vec![
            1, 0, 0, 255, 2, 0, 0, 255, //
            3, 0, 0, 255, 4, 0, 0, 255,
        ];
        blit(
            &mut frame,
            viewport,
            1,
            1,
            &src,
            2,
            (1, 0, 1, 2),
            BlitMode::Opaque,
        );

        assert_eq!(pixel(&frame, viewport, 1, 1), [2, 0, 0, 255]);
        assert_eq!(pixel(&frame, viewport, 1, 2), [4, 0, 0, 255]);
        assert_eq!(pixel(&frame, viewport, 0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn cutout_blit_skips_transparent_pixels() {
        let viewport = Viewport::new(2, 1);
        let mut frame = blank_frame(viewport);
        let src = vec![7, 7, 7, 255, 8, 8, 8, 0];
        blit(
            &mut frame,
            viewport,
            0,
            0,
            &src,
            2,
            (0, 0, 2, 1),
            BlitMode::Cutout,
        );

        assert_eq!(pixel(&frame, viewport, 0, 0), [7, 7, 7, 255]);
        assert_eq!(pixel(&frame, viewport, 1, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn half_transparent_blit_mixes_with_backdrop() {
        let viewport = Viewport::new(1, 1);
        let mut frame = blank_frame(viewport);
        fill_rect(&mut frame, viewport, 0, 0, 1, 1, [100, 100, 100, 255]);
        let src = vec![200, 0, 0, 255];
        blit(
            &mut frame,
            viewport,
            0,
            0,
            &src,
            1,
            (0, 0, 1, 1),
            BlitMode::HalfTransparent,
        );

        assert_eq!(pixel(&frame, viewport, 0, 0), [150, 50, 50, 255]);
    }

    #[test]
    fn out_of_range_source_rect_is_ignored() {
        let viewport = Viewport::new(2, 2);
        let mut frame = blank_frame(viewport);
        let src = vec![1, 1, 1, 255];
        blit(
            &mut frame,
            viewport,
            0,
            0,
            &src,
            1,
            (0, 5, 1, 1),
            BlitMode::Opaque,
        );
        assert_eq!(pixel(&frame, viewport, 0, 0), [0, 0, 0, 0]);
    }
}
