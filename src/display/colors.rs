// Pixel formats and RGB565 encoding for the panel wire format
// Channel order and byte order differ between panels, so neither is hard-coded

use serde::{Deserialize, Serialize};

/// Pixel layouts a window surface can use.
///
/// The 32-bit formats are packed into a native-endian `u32`, the way the
/// windowing layer defines them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// `0xXXRRGGBB`
    Xrgb8888,
    /// `0xRRGGBBAA`
    Rgba8888,
    /// `RRRRRGGG GGGBBBBB` in a native-endian `u16`
    Rgb565,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Xrgb8888 | PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb565 => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Xrgb8888 => "XRGB8888",
            PixelFormat::Rgba8888 => "RGBA8888",
            PixelFormat::Rgb565 => "RGB565",
        }
    }

    /// Read one pixel starting at `bytes[0]` as 8-bit channels.
    #[inline]
    pub fn read_rgb888(&self, bytes: &[u8]) -> (u8, u8, u8) {
        match self {
            PixelFormat::Xrgb8888 => {
                let p = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                ((p >> 16) as u8, (p >> 8) as u8, p as u8)
            }
            PixelFormat::Rgba8888 => {
                let p = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                ((p >> 24) as u8, (p >> 16) as u8, (p >> 8) as u8)
            }
            PixelFormat::Rgb565 => rgb565_to_rgb888(u16::from_ne_bytes([bytes[0], bytes[1]])),
        }
    }

    /// Write 8-bit channels as one pixel starting at `bytes[0]`.
    #[inline]
    pub fn write_rgb888(&self, bytes: &mut [u8], r: u8, g: u8, b: u8) {
        match self {
            PixelFormat::Xrgb8888 => {
                let p = 0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32;
                bytes[..4].copy_from_slice(&p.to_ne_bytes());
            }
            PixelFormat::Rgba8888 => {
                let p = (r as u32) << 24 | (g as u32) << 16 | (b as u32) << 8 | 0xFF;
                bytes[..4].copy_from_slice(&p.to_ne_bytes());
            }
            PixelFormat::Rgb565 => {
                bytes[..2].copy_from_slice(&rgb888_to_rgb565(r, g, b).to_ne_bytes());
            }
        }
    }
}

/// Which channel sits in the high five bits of a 5-6-5 word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorOrder {
    Rgb,
    Bgr,
}

/// Convert RGB888 to RGB565
#[inline]
pub fn rgb888_to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// Convert RGB565 to RGB888, replicating the top bits into the low bits
#[inline]
pub fn rgb565_to_rgb888(color: u16) -> (u8, u8, u8) {
    let r = ((color >> 11) & 0x1F) as u8;
    let g = ((color >> 5) & 0x3F) as u8;
    let b = (color & 0x1F) as u8;

    ((r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2))
}

/// Swap the red and blue fields of a 5-6-5 word
#[inline]
pub fn swap_red_blue(color: u16) -> u16 {
    (color >> 11) | (color & 0x07E0) | (color << 11)
}

/// Encodes pixels the way the attached panel expects them on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb565Encoder {
    order: ColorOrder,
    swap_bytes: bool,
}

impl Rgb565Encoder {
    pub const fn new(order: ColorOrder, swap_bytes: bool) -> Self {
        Self { order, swap_bytes }
    }

    pub fn order(&self) -> ColorOrder {
        self.order
    }

    pub fn swap_bytes(&self) -> bool {
        self.swap_bytes
    }

    /// True when a native RGB565 pixel can be copied to the wire unchanged.
    pub fn is_identity(&self) -> bool {
        self.order == ColorOrder::Rgb && !self.swap_bytes
    }

    #[inline]
    pub fn encode(&self, r: u8, g: u8, b: u8) -> u16 {
        self.encode_rgb565(rgb888_to_rgb565(r, g, b))
    }

    /// Re-pack a standard RGB565 word into the panel's channel order.
    #[inline]
    pub fn encode_rgb565(&self, color: u16) -> u16 {
        match self.order {
            ColorOrder::Rgb => color,
            ColorOrder::Bgr => swap_red_blue(color),
        }
    }

    /// Inverse of [`encode`](Self::encode), modulo 5-6-5 quantization.
    #[inline]
    pub fn decode(&self, wire: u16) -> (u8, u8, u8) {
        let color = match self.order {
            ColorOrder::Rgb => wire,
            ColorOrder::Bgr => swap_red_blue(wire),
        };
        rgb565_to_rgb888(color)
    }

    /// Store a 5-6-5 word as the two bytes the panel reads.
    #[inline]
    pub fn store(&self, out: &mut [u8], word: u16) {
        let bytes = if self.swap_bytes {
            word.to_be_bytes()
        } else {
            word.to_le_bytes()
        };
        out[0] = bytes[0];
        out[1] = bytes[1];
    }

    /// Read back a word written by [`store`](Self::store).
    #[inline]
    pub fn load(&self, bytes: &[u8]) -> u16 {
        if self.swap_bytes {
            u16::from_be_bytes([bytes[0], bytes[1]])
        } else {
            u16::from_le_bytes([bytes[0], bytes[1]])
        }
    }
}

impl Default for Rgb565Encoder {
    fn default() -> Self {
        Self::new(ColorOrder::Rgb, false)
    }
}

/// Common colors in RGB565 format
pub mod palette {
    pub const BLACK: u16 = 0x0000;
    pub const WHITE: u16 = 0xFFFF;
    pub const RED: u16 = 0xF800;
    pub const GREEN: u16 = 0x07E0;
    pub const BLUE: u16 = 0x001F;
}
