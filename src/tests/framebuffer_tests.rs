use std::sync::Arc;

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::pixelcolor::Rgb565;
use proptest::prelude::*;

use super::support::*;
use crate::config::FramebufferConfig;
use crate::display::accel::{Accelerator, Rotation, SoftwareAccelerator};
use crate::display::colors::{ColorOrder, PixelFormat};
use crate::display::convert::ConversionStrategy;
use crate::display::Rect;
use crate::window::BasicWindow;

#[test]
fn qvga_rgb565_in_four_row_chunks() {
    let rig = rig(config_with_chunk(4));
    let mut window = BasicWindow::new(320, 240);

    let info = rig.device.create_window_framebuffer(&mut window).unwrap();
    assert_eq!(info.format, PixelFormat::Rgb565);
    assert_eq!(info.pitch, 640);

    rig.device.update_window_framebuffer(&mut window, &[]).unwrap();

    let draws = rig.panel.draws();
    assert_eq!(draws.len(), 60);
    for (k, draw) in draws.iter().enumerate() {
        let y = 4 * k as i32;
        assert_eq!((draw.x0, draw.y0, draw.x1, draw.y1), (0, y, 320, y + 4));
        assert_eq!(draw.data.len(), 320 * 4 * 2);
    }

    let stats = rig.device.frame_stats(&window).unwrap();
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.chunks, 60);
    assert_eq!(stats.completion_waits, 60);
    assert_eq!(rig.panel.consumed(), 60);
    assert_eq!(stats.bytes_transferred, 320 * 240 * 2);
}

#[test]
fn last_chunk_carries_the_remainder() {
    let rig = rig(config_with_chunk(16));
    let mut window = BasicWindow::new(32, 170);
    rig.device.create_window_framebuffer(&mut window).unwrap();
    rig.device.update_window_framebuffer(&mut window, &[]).unwrap();

    let draws = rig.panel.draws();
    assert_eq!(draws.len(), 11);
    assert_eq!(draws[10].rows(), (160, 170));
}

#[test]
fn drawn_pixels_reach_the_panel_in_wire_order() {
    let rig = rig(config_with_chunk(8));
    let mut window = BasicWindow::new(16, 16);
    rig.device.create_window_framebuffer(&mut window).unwrap();

    let surface = rig.device.surface_mut(&mut window).unwrap();
    surface.clear(Rgb565::BLACK).unwrap();
    Rectangle::new(Point::new(0, 8), Size::new(16, 8))
        .into_styled(PrimitiveStyle::with_fill(Rgb565::RED))
        .draw(surface)
        .unwrap();

    rig.device.update_window_framebuffer(&mut window, &[]).unwrap();

    let draws = rig.panel.draws();
    assert_eq!(draws.len(), 2);
    assert!(draws[0].data.iter().all(|&b| b == 0));
    // Default wire format: RGB order, low byte first
    assert!(draws[1].data.chunks_exact(2).all(|px| px == [0x00, 0xF8]));
}

#[test]
fn xrgb_surface_converts_to_bgr_big_endian() {
    let config = FramebufferConfig {
        surface_format: PixelFormat::Xrgb8888,
        color_order: ColorOrder::Bgr,
        swap_bytes: true,
        chunk_height: 2,
        ..FramebufferConfig::default()
    };
    let rig = rig(config);
    let mut window = BasicWindow::new(4, 2);

    let info = rig.device.create_window_framebuffer(&mut window).unwrap();
    assert_eq!(info.format, PixelFormat::Xrgb8888);
    assert_eq!(info.pitch, 16);
    assert_eq!(rig.device.framebuffer(&window).unwrap().converter_name(), "software");

    rig.device.surface_mut(&mut window).unwrap().fill_rgb888(255, 0, 0);
    rig.device.update_window_framebuffer(&mut window, &[]).unwrap();

    let draws = rig.panel.draws();
    assert_eq!(draws.len(), 1);
    assert!(draws[0].data.chunks_exact(2).all(|px| px == [0x00, 0x1F]));
}

#[test]
fn rgba_surface_ignores_alpha() {
    let config = FramebufferConfig {
        surface_format: PixelFormat::Rgba8888,
        ..config_with_chunk(1)
    };
    let rig = rig(config);
    let mut window = BasicWindow::new(2, 1);
    rig.device.create_window_framebuffer(&mut window).unwrap();

    // 0xRRGGBBAA: half-transparent blue, fully transparent white
    let row = rig.device.surface_mut(&mut window).unwrap().row_mut(0);
    row[..4].copy_from_slice(&0x0000_FF7Fu32.to_ne_bytes());
    row[4..].copy_from_slice(&0xFFFF_FF00u32.to_ne_bytes());
    rig.device.update_window_framebuffer(&mut window, &[]).unwrap();

    let draws = rig.panel.draws();
    assert_eq!(draws[0].data, vec![0x1F, 0x00, 0xFF, 0xFF]);
}

#[test]
fn dirty_rects_still_send_the_full_frame() {
    let rig = rig(config_with_chunk(10));
    let mut window = BasicWindow::new(20, 40);
    rig.device.create_window_framebuffer(&mut window).unwrap();

    rig.device
        .update_window_framebuffer(&mut window, &[Rect::new(0, 0, 2, 2)])
        .unwrap();
    assert_eq!(rig.panel.draw_count(), 4);
}

#[test]
fn panel_offset_shifts_every_window() {
    let config = FramebufferConfig { panel_offset: (0, 35), ..config_with_chunk(85) };
    let rig = rig(config);
    let mut window = BasicWindow::new(320, 170);
    rig.device.create_window_framebuffer(&mut window).unwrap();
    rig.device.update_window_framebuffer(&mut window, &[]).unwrap();

    let draws = rig.panel.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!((draws[0].y0, draws[0].y1), (35, 120));
    assert_eq!((draws[1].y0, draws[1].y1), (120, 205));
}

#[test]
fn chunk_height_is_clamped_to_the_transfer_ceiling() {
    let config = FramebufferConfig {
        max_transfer_bytes: 320 * 2 * 3,
        ..config_with_chunk(16)
    };
    let rig = rig(config);
    let mut window = BasicWindow::new(320, 240);
    rig.device.create_window_framebuffer(&mut window).unwrap();

    let fb = rig.device.framebuffer(&window).unwrap();
    assert_eq!(fb.chunk_height(), 3);
    assert_eq!(fb.scratch_capacity(), 320 * 2 * 3);

    rig.device.update_window_framebuffer(&mut window, &[]).unwrap();
    assert_eq!(rig.panel.draw_count(), 80);
}

#[test]
fn chunk_taller_than_window_uses_one_transfer() {
    let rig = rig(config_with_chunk(64));
    let mut window = BasicWindow::new(10, 5);
    rig.device.create_window_framebuffer(&mut window).unwrap();
    assert_eq!(rig.device.framebuffer(&window).unwrap().scratch_capacity(), 10 * 5 * 2);

    rig.device.update_window_framebuffer(&mut window, &[]).unwrap();
    let draws = rig.panel.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].rows(), (0, 5));
}

fn accelerated(rotation: Rotation, scale: u32, chunk_height: u32) -> (Rig, Arc<SoftwareAccelerator>) {
    let config = FramebufferConfig {
        strategy: ConversionStrategy::Accelerated,
        rotation,
        scale,
        ..config_with_chunk(chunk_height)
    };
    let accel = Arc::new(SoftwareAccelerator::new());
    let mut rig = rig(config);
    rig.device = rig.device.with_accelerator(accel.clone() as Arc<dyn Accelerator>);
    (rig, accel)
}

#[test]
fn rotated_bands_become_panel_columns() {
    let (rig, accel) = accelerated(Rotation::Deg90, 1, 1);
    let mut window = BasicWindow::new(4, 2);
    rig.device.create_window_framebuffer(&mut window).unwrap();
    assert_eq!(accel.active_clients(), 1);

    let surface = rig.device.surface_mut(&mut window).unwrap();
    for x in 0..4 {
        surface.set_rgb888(x, 0, (x * 64) as u8, 0, 0);
    }
    rig.device.update_window_framebuffer(&mut window, &[]).unwrap();

    let draws = rig.panel.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!((draws[0].x0, draws[0].y0, draws[0].x1, draws[0].y1), (0, 0, 1, 4));
    assert_eq!((draws[1].x0, draws[1].y0, draws[1].x1, draws[1].y1), (1, 0, 2, 4));

    // Counter-clockwise: the right end of row 0 ends up at the top of column 0
    let first: Vec<u8> = draws[0].data.chunks_exact(2).map(|px| px[1] & 0xF8).collect();
    assert_eq!(first, vec![192, 128, 64, 0]);
}

#[test]
fn scaled_output_grows_rects_and_scratch() {
    let (rig, _accel) = accelerated(Rotation::Deg0, 2, 4);
    let mut window = BasicWindow::new(40, 8);
    rig.device.create_window_framebuffer(&mut window).unwrap();
    assert_eq!(rig.device.framebuffer(&window).unwrap().scratch_capacity(), 40 * 4 * 4 * 2);

    rig.device.update_window_framebuffer(&mut window, &[]).unwrap();
    let draws = rig.panel.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!((draws[1].x0, draws[1].y0, draws[1].x1, draws[1].y1), (0, 8, 80, 16));
    assert_eq!(draws[1].data.len(), 80 * 8 * 2);
}

#[test]
fn auto_prefers_an_attached_accelerator() {
    let accel = Arc::new(SoftwareAccelerator::new());
    let mut rig = rig(config_with_chunk(8));
    rig.device = rig.device.with_accelerator(accel.clone() as Arc<dyn Accelerator>);
    let mut window = BasicWindow::new(8, 8);
    rig.device.create_window_framebuffer(&mut window).unwrap();
    assert_eq!(rig.device.framebuffer(&window).unwrap().converter_name(), "accelerated");
    assert_eq!(accel.active_clients(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn chunks_never_exceed_scratch(
        width in 1u32..48,
        height in 1u32..48,
        chunk_height in 1u32..40,
        scale in 1u32..=4,
        xrgb in any::<bool>(),
    ) {
        let config = FramebufferConfig {
            surface_format: if xrgb { PixelFormat::Xrgb8888 } else { PixelFormat::Rgb565 },
            strategy: ConversionStrategy::Accelerated,
            scale,
            ..config_with_chunk(chunk_height)
        };
        let mut rig = rig(config);
        rig.device = rig.device.with_accelerator(Arc::new(SoftwareAccelerator::new()));

        let mut window = BasicWindow::new(width, height);
        rig.device.create_window_framebuffer(&mut window).unwrap();
        let capacity = rig.device.framebuffer(&window).unwrap().scratch_capacity();

        rig.device.update_window_framebuffer(&mut window, &[]).unwrap();

        let draws = rig.panel.draws();
        prop_assert_eq!(draws.len() as u32, (height + chunk_height - 1) / chunk_height);
        let mut covered = 0;
        for draw in &draws {
            prop_assert!(draw.data.len() <= capacity);
            covered += draw.data.len();
        }
        prop_assert_eq!(covered, (width * height * scale * scale * 2) as usize);
    }
}
