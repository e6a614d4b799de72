/// Off-screen pixel surface backing a window
use core::ptr::NonNull;

use embedded_graphics_core::pixelcolor::raw::RawU16;
use embedded_graphics_core::pixelcolor::Rgb565;
use embedded_graphics_core::prelude::*;
use log::debug;

use super::colors::{rgb565_to_rgb888, PixelFormat};
use crate::error::{FramebufferError, Result};

/// Row stride alignment in bytes
const PITCH_ALIGN: usize = 4;

pub struct Surface {
    width: u32,
    height: u32,
    format: PixelFormat,
    pitch: usize,
    pixels: Vec<u8>,
}

impl Surface {
    /// Allocate a zeroed surface. Fails instead of aborting when the heap is short.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 || width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(FramebufferError::InvalidDimensions { width, height });
        }

        let pitch = Self::pitch_for(width, format);
        let bytes = pitch
            .checked_mul(height as usize)
            .ok_or(FramebufferError::InvalidDimensions { width, height })?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(bytes)
            .map_err(|_| FramebufferError::SurfaceAllocation { bytes })?;
        pixels.resize(bytes, 0);

        debug!(
            "Created {}x{} {} surface, pitch {} ({} KB)",
            width,
            height,
            format.name(),
            pitch,
            bytes / 1024
        );

        Ok(Self { width, height, format, pitch, pixels })
    }

    /// Row stride for `width` pixels, rounded up to a 4-byte boundary.
    pub fn pitch_for(width: u32, format: PixelFormat) -> usize {
        let row = width as usize * format.bytes_per_pixel();
        (row + PITCH_ALIGN - 1) / PITCH_ALIGN * PITCH_ALIGN
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub(crate) fn pixels_ptr(&mut self) -> NonNull<u8> {
        // A surface always has at least one row, so the buffer is never empty
        NonNull::new(self.pixels.as_mut_ptr()).unwrap_or(NonNull::dangling())
    }

    /// Pixel bytes of row `y`, without the pitch padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.pitch;
        &self.pixels[start..start + self.row_bytes()]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.pitch;
        let len = self.row_bytes();
        &mut self.pixels[start..start + len]
    }

    /// Rows `[y, y + rows)` including pitch padding between them.
    pub fn rows(&self, y: u32, rows: u32) -> &[u8] {
        let start = y as usize * self.pitch;
        let end = (y + rows) as usize * self.pitch;
        &self.pixels[start..end]
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Read a pixel as 8-bit channels.
    pub fn get_rgb888(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.pitch + x as usize * bpp;
        Some(self.format.read_rgb888(&self.pixels[offset..offset + bpp]))
    }

    /// Write a pixel from 8-bit channels, ignoring out-of-bounds coordinates.
    pub fn set_rgb888(&mut self, x: u32, y: u32, r: u8, g: u8, b: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.pitch + x as usize * bpp;
        self.format.write_rgb888(&mut self.pixels[offset..offset + bpp], r, g, b);
    }

    fn set_rgb565(&mut self, x: u32, y: u32, color: u16) {
        match self.format {
            PixelFormat::Rgb565 => {
                if x >= self.width || y >= self.height {
                    return;
                }
                let offset = y as usize * self.pitch + x as usize * 2;
                self.pixels[offset..offset + 2].copy_from_slice(&color.to_ne_bytes());
            }
            _ => {
                let (r, g, b) = rgb565_to_rgb888(color);
                self.set_rgb888(x, y, r, g, b);
            }
        }
    }

    /// Fill every pixel with one color
    pub fn fill_rgb888(&mut self, r: u8, g: u8, b: u8) {
        let bpp = self.format.bytes_per_pixel();
        let mut pixel = [0u8; 4];
        self.format.write_rgb888(&mut pixel, r, g, b);
        for y in 0..self.height {
            for chunk in self.row_mut(y).chunks_exact_mut(bpp) {
                chunk.copy_from_slice(&pixel[..bpp]);
            }
        }
    }
}

impl core::fmt::Debug for Surface {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("pitch", &self.pitch)
            .finish()
    }
}

impl OriginDimensions for Surface {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Surface {
    type Color = Rgb565;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> core::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            self.set_rgb565(point.x as u32, point.y as u32, RawU16::from(color).into_inner());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::pixelcolor::RgbColor;
    use embedded_graphics::prelude::Primitive;
    use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};

    #[test]
    fn pitch_is_word_aligned() {
        assert_eq!(Surface::pitch_for(320, PixelFormat::Rgb565), 640);
        assert_eq!(Surface::pitch_for(3, PixelFormat::Rgb565), 8);
        assert_eq!(Surface::pitch_for(3, PixelFormat::Xrgb8888), 12);
    }

    #[test]
    fn rejects_empty_surfaces() {
        assert_eq!(
            Surface::new(0, 240, PixelFormat::Rgb565).unwrap_err(),
            FramebufferError::InvalidDimensions { width: 0, height: 240 }
        );
    }

    #[test]
    fn allocation_matches_pitch_times_height() {
        let surface = Surface::new(5, 7, PixelFormat::Rgb565).unwrap();
        assert_eq!(surface.pitch(), 12);
        assert_eq!(surface.pixels().len(), 12 * 7);
        assert_eq!(surface.row(6).len(), 10);
    }

    #[test]
    fn draw_target_writes_native_rgb565() {
        let mut surface = Surface::new(8, 4, PixelFormat::Rgb565).unwrap();
        Rectangle::new(Point::new(2, 1), Size::new(3, 2))
            .into_styled(PrimitiveStyle::with_fill(Rgb565::RED))
            .draw(&mut surface)
            .unwrap();

        assert_eq!(surface.get_rgb888(2, 1), Some((255, 0, 0)));
        assert_eq!(surface.get_rgb888(4, 2), Some((255, 0, 0)));
        assert_eq!(surface.get_rgb888(5, 2), Some((0, 0, 0)));
        assert_eq!(surface.get_rgb888(2, 3), Some((0, 0, 0)));
    }

    #[test]
    fn draw_target_expands_into_32bit_surfaces() {
        let mut surface = Surface::new(4, 4, PixelFormat::Xrgb8888).unwrap();
        Pixel(Point::new(1, 1), Rgb565::BLUE).draw(&mut surface).unwrap();
        Pixel(Point::new(-1, 9), Rgb565::BLUE).draw(&mut surface).unwrap();
        assert_eq!(surface.get_rgb888(1, 1), Some((0, 0, 255)));
    }
}
