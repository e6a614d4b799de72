//! Chunk conversion strategies: surface rows in, panel-ready RGB565 out
//!
//! The strategy is picked once at framebuffer creation from what the device
//! actually has attached.

use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use super::accel::{Accelerator, AcceleratorClient, Rotation, ScaleRotateOp};
use super::chunking::Chunk;
use super::colors::{PixelFormat, Rgb565Encoder};
use super::surface::Surface;
use super::Rect;
use crate::error::{FramebufferError, Result};

/// Output is always 16 bits per pixel
pub const OUT_BYTES_PER_PIXEL: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStrategy {
    /// Accelerated when an accelerator is attached, else passthrough for
    /// RGB565 surfaces, else software
    #[default]
    Auto,
    Software,
    Passthrough,
    Accelerated,
}

/// Where a converted chunk goes and how much of the scratch buffer it filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutput {
    pub rect: Rect,
    pub bytes: usize,
}

pub trait ChunkConverter: Send {
    fn name(&self) -> &'static str;

    /// Output bytes produced per source row of a `width` pixel surface
    fn out_bytes_per_row(&self, width: u32) -> usize {
        width as usize * OUT_BYTES_PER_PIXEL
    }

    /// Byte alignment the scratch buffer needs for this converter's output
    fn output_align(&self) -> usize {
        4
    }

    /// Convert `chunk` rows of `surface` into the start of `scratch`.
    fn convert(&mut self, surface: &Surface, chunk: Chunk, scratch: &mut [u8]) -> Result<ChunkOutput>;
}

fn check_capacity(needed: usize, scratch: &[u8]) -> Result<()> {
    if needed > scratch.len() {
        return Err(FramebufferError::ScratchOverflow { needed, capacity: scratch.len() });
    }
    Ok(())
}

/// Per-pixel conversion from any surface format to the wire encoding.
pub struct SoftwareConverter {
    encoder: Rgb565Encoder,
}

impl SoftwareConverter {
    pub fn new(encoder: Rgb565Encoder) -> Self {
        Self { encoder }
    }
}

impl ChunkConverter for SoftwareConverter {
    fn name(&self) -> &'static str {
        "software"
    }

    fn convert(&mut self, surface: &Surface, chunk: Chunk, scratch: &mut [u8]) -> Result<ChunkOutput> {
        let format = surface.format();
        let bpp = format.bytes_per_pixel();
        let out_row = self.out_bytes_per_row(surface.width());
        let bytes = out_row * chunk.rows as usize;
        check_capacity(bytes, scratch)?;

        for (i, y) in (chunk.y..chunk.end()).enumerate() {
            let dst = &mut scratch[i * out_row..(i + 1) * out_row];
            for (src, out) in surface.row(y).chunks_exact(bpp).zip(dst.chunks_exact_mut(2)) {
                let (r, g, b) = format.read_rgb888(src);
                self.encoder.store(out, self.encoder.encode(r, g, b));
            }
        }

        Ok(ChunkOutput { rect: Rect::new(0, chunk.y, surface.width(), chunk.rows), bytes })
    }
}

/// Native RGB565 surface: copy rows, fixing channel and byte order only when needed.
pub struct PassthroughConverter {
    encoder: Rgb565Encoder,
}

impl PassthroughConverter {
    pub fn new(encoder: Rgb565Encoder) -> Self {
        Self { encoder }
    }
}

impl ChunkConverter for PassthroughConverter {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn convert(&mut self, surface: &Surface, chunk: Chunk, scratch: &mut [u8]) -> Result<ChunkOutput> {
        if surface.format() != PixelFormat::Rgb565 {
            return Err(FramebufferError::Unsupported(format!(
                "passthrough from {} surface",
                surface.format().name()
            )));
        }

        let out_row = self.out_bytes_per_row(surface.width());
        let bytes = out_row * chunk.rows as usize;
        check_capacity(bytes, scratch)?;

        // Identity only holds when native order is little-endian
        let copy = self.encoder.is_identity() && cfg!(target_endian = "little");

        for (i, y) in (chunk.y..chunk.end()).enumerate() {
            let src = surface.row(y);
            let dst = &mut scratch[i * out_row..(i + 1) * out_row];
            if copy {
                dst.copy_from_slice(src);
            } else {
                for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(2)) {
                    let word = u16::from_ne_bytes([s[0], s[1]]);
                    self.encoder.store(d, self.encoder.encode_rgb565(word));
                }
            }
        }

        Ok(ChunkOutput { rect: Rect::new(0, chunk.y, surface.width(), chunk.rows), bytes })
    }
}

/// Routes each chunk through a 2D engine that scales, rotates and converts.
pub struct AcceleratedConverter {
    client: Box<dyn AcceleratorClient>,
    engine: &'static str,
    align: usize,
    encoder: Rgb565Encoder,
    scale: u32,
    rotation: Rotation,
}

impl AcceleratedConverter {
    pub fn new(
        accelerator: &dyn Accelerator,
        encoder: Rgb565Encoder,
        scale: u32,
        rotation: Rotation,
    ) -> Result<Self> {
        let client = accelerator.register_client()?;
        Ok(Self {
            client,
            engine: accelerator.name(),
            align: accelerator.output_align(),
            encoder,
            scale,
            rotation,
        })
    }

    pub fn engine(&self) -> &'static str {
        self.engine
    }
}

impl ChunkConverter for AcceleratedConverter {
    fn name(&self) -> &'static str {
        "accelerated"
    }

    fn output_align(&self) -> usize {
        self.align
    }

    fn out_bytes_per_row(&self, width: u32) -> usize {
        width as usize * (self.scale * self.scale) as usize * OUT_BYTES_PER_PIXEL
    }

    fn convert(&mut self, surface: &Surface, chunk: Chunk, scratch: &mut [u8]) -> Result<ChunkOutput> {
        let bytes = self.out_bytes_per_row(surface.width()) * chunk.rows as usize;
        check_capacity(bytes, scratch)?;

        self.client.scale_rotate(ScaleRotateOp {
            input: surface.rows(chunk.y, chunk.rows),
            in_format: surface.format(),
            in_pitch: surface.pitch(),
            in_width: surface.width(),
            in_height: chunk.rows,
            scale: self.scale,
            rotation: self.rotation,
            encoder: self.encoder,
            // Whole buffer, so engines that need aligned lengths see its real size
            output: scratch,
        })?;

        let rect = self
            .rotation
            .map_rows(surface.width(), surface.height(), chunk.y, chunk.rows, self.scale);
        Ok(ChunkOutput { rect, bytes })
    }
}

/// Resolve `strategy` against what is actually available and build the converter.
pub fn build_converter(
    strategy: ConversionStrategy,
    surface_format: PixelFormat,
    encoder: Rgb565Encoder,
    scale: u32,
    rotation: Rotation,
    accelerator: Option<&Arc<dyn Accelerator>>,
) -> Result<Box<dyn ChunkConverter>> {
    let resolved = match strategy {
        ConversionStrategy::Auto if accelerator.is_some() => ConversionStrategy::Accelerated,
        ConversionStrategy::Auto if surface_format == PixelFormat::Rgb565 => ConversionStrategy::Passthrough,
        ConversionStrategy::Auto => ConversionStrategy::Software,
        other => other,
    };

    if resolved != ConversionStrategy::Accelerated && (scale != 1 || rotation != Rotation::Deg0) {
        return Err(FramebufferError::Config(format!(
            "scale {} / rotation {} needs the accelerated strategy",
            scale,
            rotation.degrees()
        )));
    }

    let converter: Box<dyn ChunkConverter> = match resolved {
        ConversionStrategy::Software => Box::new(SoftwareConverter::new(encoder)),
        ConversionStrategy::Passthrough => {
            if surface_format != PixelFormat::Rgb565 {
                return Err(FramebufferError::Config(format!(
                    "passthrough needs an RGB565 surface, got {}",
                    surface_format.name()
                )));
            }
            Box::new(PassthroughConverter::new(encoder))
        }
        ConversionStrategy::Accelerated => {
            let accel = accelerator.ok_or_else(|| {
                FramebufferError::Config("accelerated strategy without an accelerator".into())
            })?;
            if !accel.supports_input(surface_format) {
                return Err(FramebufferError::Unsupported(format!(
                    "{} cannot read {} surfaces",
                    accel.name(),
                    surface_format.name()
                )));
            }
            let converter = AcceleratedConverter::new(accel.as_ref(), encoder, scale, rotation)?;
            info!(
                "Using {} accelerator: scale x{}, rotation {}",
                converter.engine(),
                scale,
                rotation.degrees()
            );
            Box::new(converter)
        }
        ConversionStrategy::Auto => unreachable!("auto resolved above"),
    };

    info!(
        "Chunk converter: {} ({} -> RGB565 {:?}, swap_bytes={})",
        converter.name(),
        surface_format.name(),
        encoder.order(),
        encoder.swap_bytes()
    );
    Ok(converter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::accel::SoftwareAccelerator;
    use crate::display::colors::ColorOrder;

    fn gradient(width: u32, height: u32, format: PixelFormat) -> Surface {
        let mut surface = Surface::new(width, height, format).unwrap();
        for y in 0..height {
            for x in 0..width {
                surface.set_rgb888(x, y, (x * 8) as u8, (y * 4) as u8, 0x80);
            }
        }
        surface
    }

    #[test]
    fn software_converts_xrgb_rows_into_scratch_start() {
        let surface = gradient(4, 6, PixelFormat::Xrgb8888);
        let mut conv = SoftwareConverter::new(Rgb565Encoder::default());
        let mut scratch = vec![0u8; 4 * 2 * 2];

        let out = conv.convert(&surface, Chunk { y: 4, rows: 2 }, &mut scratch).unwrap();
        assert_eq!(out, ChunkOutput { rect: Rect::new(0, 4, 4, 2), bytes: 16 });

        let enc = Rgb565Encoder::default();
        // pixel (1, 5) is the sixth word: second row, second column
        let word = enc.load(&scratch[(4 + 1) * 2..]);
        assert_eq!(word, enc.encode(8, 20, 0x80));
    }

    #[test]
    fn passthrough_skips_pitch_padding() {
        // 3 px RGB565 rows carry two bytes of padding
        let surface = gradient(3, 2, PixelFormat::Rgb565);
        assert_eq!(surface.pitch(), 8);
        let mut conv = PassthroughConverter::new(Rgb565Encoder::default());
        let mut scratch = vec![0xAAu8; 12];

        let out = conv.convert(&surface, Chunk { y: 0, rows: 2 }, &mut scratch).unwrap();
        assert_eq!(out.bytes, 12);
        assert_eq!(&scratch[..6], surface.row(0));
        assert_eq!(&scratch[6..12], surface.row(1));
    }

    #[test]
    fn passthrough_applies_panel_wire_order() {
        let mut surface = Surface::new(1, 1, PixelFormat::Rgb565).unwrap();
        surface.set_rgb888(0, 0, 255, 0, 0);
        let mut conv = PassthroughConverter::new(Rgb565Encoder::new(ColorOrder::Bgr, true));
        let mut scratch = [0u8; 2];
        conv.convert(&surface, Chunk { y: 0, rows: 1 }, &mut scratch).unwrap();
        // red lands in the blue field, high byte first
        assert_eq!(scratch, [0x00, 0x1F]);
    }

    #[test]
    fn converters_refuse_to_overrun_scratch() {
        let surface = gradient(8, 8, PixelFormat::Rgb565);
        let mut conv = PassthroughConverter::new(Rgb565Encoder::default());
        let mut scratch = vec![0u8; 8 * 2 * 3];
        let err = conv.convert(&surface, Chunk { y: 0, rows: 4 }, &mut scratch).unwrap_err();
        assert_eq!(err, FramebufferError::ScratchOverflow { needed: 64, capacity: 48 });
    }

    #[test]
    fn accelerated_output_matches_software_at_identity() {
        let surface = gradient(5, 4, PixelFormat::Xrgb8888);
        let accel: Arc<dyn Accelerator> = Arc::new(SoftwareAccelerator::new());
        let mut fast = build_converter(
            ConversionStrategy::Auto,
            PixelFormat::Xrgb8888,
            Rgb565Encoder::default(),
            1,
            Rotation::Deg0,
            Some(&accel),
        )
        .unwrap();
        assert_eq!(fast.name(), "accelerated");
        let mut slow = SoftwareConverter::new(Rgb565Encoder::default());

        let chunk = Chunk { y: 1, rows: 3 };
        let mut a = vec![0u8; 30];
        let mut b = vec![0u8; 30];
        let out_a = fast.convert(&surface, chunk, &mut a).unwrap();
        let out_b = slow.convert(&surface, chunk, &mut b).unwrap();
        assert_eq!(out_a, out_b);
        assert_eq!(a, b);
    }

    struct CacheLineEngine;

    impl Accelerator for CacheLineEngine {
        fn name(&self) -> &'static str {
            "cache-line"
        }

        fn register_client(&self) -> Result<Box<dyn AcceleratorClient>> {
            SoftwareAccelerator::new().register_client()
        }

        fn output_align(&self) -> usize {
            64
        }
    }

    #[test]
    fn scratch_alignment_follows_the_engine() {
        let enc = Rgb565Encoder::default();
        let accel: Arc<dyn Accelerator> = Arc::new(CacheLineEngine);
        let accelerated =
            build_converter(ConversionStrategy::Accelerated, PixelFormat::Rgb565, enc, 1, Rotation::Deg0, Some(&accel))
                .unwrap();
        assert_eq!(accelerated.output_align(), 64);

        let software =
            build_converter(ConversionStrategy::Software, PixelFormat::Rgb565, enc, 1, Rotation::Deg0, Some(&accel))
                .unwrap();
        assert_eq!(software.output_align(), 4);
    }

    #[test]
    fn auto_picks_by_surface_format() {
        let enc = Rgb565Encoder::default();
        let native = build_converter(ConversionStrategy::Auto, PixelFormat::Rgb565, enc, 1, Rotation::Deg0, None);
        assert_eq!(native.unwrap().name(), "passthrough");
        let packed = build_converter(ConversionStrategy::Auto, PixelFormat::Rgba8888, enc, 1, Rotation::Deg0, None);
        assert_eq!(packed.unwrap().name(), "software");
    }

    #[test]
    fn scaling_without_accelerator_is_a_config_error() {
        let err = build_converter(
            ConversionStrategy::Auto,
            PixelFormat::Rgb565,
            Rgb565Encoder::default(),
            2,
            Rotation::Deg0,
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, FramebufferError::Config(_)));
    }
}
