//! The UI framebuffer and the ScreenGrab encoder.
//!
//! The real display path (LVGL widgets, sprite rendering, the fractal
//! background) draws into this same buffer through the renderer seam;
//! here we rasterize incoming render frames directly so captures show
//! the live world.

use dirtproto::api::ui::ScreenGrabOkay;
use dirtproto::error::ApiError;
use dirtproto::render::{BasicCell, DebugCell, RenderFormat, RenderMessage};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Reference display: HyperPixel 4.0.
pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 480;

/// RGBA8 framebuffer, row-major.
pub struct Framebuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width * height * 4) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn clear(&mut self, r: u8, g: u8, b: u8) {
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&[r, g, b, 0xFF]);
        }
    }

    fn put(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = ((y * self.width + x) * 4) as usize;
        self.pixels[offset..offset + 4].copy_from_slice(&rgba);
    }

    fn fill_rect(&mut self, x0: u32, y0: u32, w: u32, h: u32, rgba: [u8; 4]) {
        for y in y0..(y0 + h).min(self.height) {
            for x in x0..(x0 + w).min(self.width) {
                self.put(x, y, rgba);
            }
        }
    }

    /// Rasterize a render frame: each cell becomes a scaled block, or the
    /// scenario video frame is blitted when present.
    pub fn draw_frame(&mut self, message: &RenderMessage) {
        if let Some(video) = &message.scenario_video_frame {
            self.draw_rgb565(video.width as u32, video.height as u32, &video.pixels);
            return;
        }
        if message.width <= 0 || message.height <= 0 {
            return;
        }

        let grid_w = message.width as u32;
        let grid_h = message.height as u32;
        let scale_x = (self.width / grid_w).max(1);
        let scale_y = (self.height / grid_h).max(1);
        let scale = scale_x.min(scale_y);

        let cell_size = match message.format {
            RenderFormat::Basic => BasicCell::WIRE_SIZE,
            RenderFormat::Debug => DebugCell::WIRE_SIZE,
        };

        for cy in 0..grid_h {
            for cx in 0..grid_w {
                let index = (cy * grid_w + cx) as usize;
                let offset = index * cell_size;
                let Some(chunk) = message.payload.get(offset..offset + cell_size) else {
                    return;
                };
                let color = match message.format {
                    RenderFormat::Basic => {
                        BasicCell::read_from(chunk).map(|cell| cell.color).unwrap_or(0)
                    }
                    RenderFormat::Debug => DebugCell::read_from(chunk)
                        .map(|cell| debug_cell_color(&cell))
                        .unwrap_or(0),
                };
                let rgba = [
                    (color >> 24) as u8,
                    (color >> 16) as u8,
                    (color >> 8) as u8,
                    0xFF,
                ];
                self.fill_rect(cx * scale, cy * scale, scale, scale, rgba);
            }
        }
    }

    fn draw_rgb565(&mut self, width: u32, height: u32, pixels: &[u8]) {
        for y in 0..height.min(self.height) {
            for x in 0..width.min(self.width) {
                let offset = ((y * width + x) * 2) as usize;
                let Some(bytes) = pixels.get(offset..offset + 2) else {
                    return;
                };
                let value = u16::from_le_bytes([bytes[0], bytes[1]]);
                let r = ((value >> 11) & 0x1F) as u8;
                let g = ((value >> 5) & 0x3F) as u8;
                let b = (value & 0x1F) as u8;
                self.put(x, y, [r << 3, g << 2, b << 3, 0xFF]);
            }
        }
    }

    /// Encode the framebuffer as base64 PNG for the ScreenGrab response.
    pub fn grab_png(&self) -> Result<ScreenGrabOkay, ApiError> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| ApiError::new("Framebuffer size mismatch"))?;

        let mut png_bytes = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut png_bytes, image::ImageFormat::Png)
            .map_err(|e| ApiError::new(format!("PNG encode failed: {e}")))?;

        Ok(ScreenGrabOkay {
            data: BASE64.encode(png_bytes.into_inner()),
            width: self.width,
            height: self.height,
            format: "png".into(),
        })
    }
}

/// Debug frames don't carry a color; derive one from pressure so the
/// overlay is visible.
fn debug_cell_color(cell: &DebugCell) -> u32 {
    let intensity = (cell.pressure_hydro >> 8) as u32;
    (intensity << 24) | (intensity << 16) | 0xFFu32
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirtproto::render::ScenarioVideoFrame;

    #[test]
    fn grab_produces_png_magic() {
        let mut framebuffer = Framebuffer::new(64, 48);
        framebuffer.clear(10, 20, 30);
        let okay = framebuffer.grab_png().unwrap();
        assert_eq!(okay.width, 64);
        assert_eq!(okay.height, 48);
        assert_eq!(okay.format, "png");

        let bytes = BASE64.decode(okay.data).unwrap();
        assert_eq!(&bytes[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn draw_frame_scales_cells() {
        let mut framebuffer = Framebuffer::new(40, 40);
        let mut payload = Vec::new();
        // 2x2 grid, one red cell at (0,0).
        BasicCell {
            material: 1,
            fill: 255,
            render_as: -1,
            color: 0xFF0000FF,
        }
        .write_to(&mut payload);
        for _ in 0..3 {
            BasicCell::default().write_to(&mut payload);
        }

        let message = RenderMessage {
            format: RenderFormat::Basic,
            width: 2,
            height: 2,
            payload,
            ..Default::default()
        };
        framebuffer.draw_frame(&message);

        // Top-left block is red, bottom-right is black.
        let offset = 0;
        assert_eq!(framebuffer.pixels[offset], 0xFF);
        let last = ((39 * 40 + 39) * 4) as usize;
        assert_eq!(framebuffer.pixels[last], 0x00);
    }

    #[test]
    fn video_frames_take_priority() {
        let mut framebuffer = Framebuffer::new(16, 16);
        // Full-red RGB565 pixel: R=31, G=0, B=0.
        let pixel = (31u16 << 11).to_le_bytes();
        let mut pixels = Vec::new();
        for _ in 0..4 {
            pixels.extend_from_slice(&pixel);
        }
        let message = RenderMessage {
            scenario_video_frame: Some(ScenarioVideoFrame {
                width: 2,
                height: 2,
                frame_id: 1,
                pixels,
            }),
            ..Default::default()
        };
        framebuffer.draw_frame(&message);
        assert_eq!(framebuffer.pixels[0], 31 << 3);
    }
}
