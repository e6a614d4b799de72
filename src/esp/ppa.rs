/// ESP32-P4 Pixel-Processing Accelerator: scale-rotate-mirror clients
///
/// The PPA rotates counter-clockwise and writes RGB565 little-endian. Channel
/// order is handled by `rgb_swap`; a big-endian wire format is produced by a
/// byte swap pass after the engine returns.
use core::ffi::c_void;
use core::ptr;

use esp_idf_sys::*;
use log::*;

use super::hardware_error;
use crate::display::accel::{Accelerator, AcceleratorClient, Rotation, ScaleRotateOp};
use crate::display::colors::{ColorOrder, PixelFormat};
use crate::error::{FramebufferError, Result};

/// Output buffers must cover whole L2 cache lines
const PPA_OUTPUT_ALIGN: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct PpaAccelerator;

impl PpaAccelerator {
    pub fn new() -> Self {
        Self
    }
}

impl Accelerator for PpaAccelerator {
    fn name(&self) -> &'static str {
        "ppa"
    }

    fn register_client(&self) -> Result<Box<dyn AcceleratorClient>> {
        let mut handle: ppa_client_handle_t = ptr::null_mut();
        unsafe {
            let config = ppa_client_config_t {
                oper_type: ppa_operation_t_PPA_OPERATION_SRM,
                max_pending_trans_num: 1,
                ..core::mem::zeroed()
            };
            esp!(ppa_register_client(&config, &mut handle)).map_err(|e| {
                error!("ppa_register_client failed: {}", e);
                FramebufferError::AcceleratorRegistration(format!("ppa_register_client: {}", e))
            })?;
        }
        info!("PPA SRM client registered");
        Ok(Box::new(PpaClient { handle }))
    }

    fn supports_input(&self, format: PixelFormat) -> bool {
        // The SRM engine reads ARGB8888 (== native XRGB8888) and RGB565
        matches!(format, PixelFormat::Xrgb8888 | PixelFormat::Rgb565)
    }

    fn output_align(&self) -> usize {
        PPA_OUTPUT_ALIGN
    }
}

struct PpaClient {
    handle: ppa_client_handle_t,
}

// The client handle is owned by exactly one converter
unsafe impl Send for PpaClient {}

fn color_mode(format: PixelFormat) -> Result<ppa_srm_color_mode_t> {
    match format {
        PixelFormat::Xrgb8888 => Ok(ppa_srm_color_mode_t_PPA_SRM_COLOR_MODE_ARGB8888),
        PixelFormat::Rgb565 => Ok(ppa_srm_color_mode_t_PPA_SRM_COLOR_MODE_RGB565),
        other => Err(FramebufferError::Unsupported(format!("PPA input {}", other.name()))),
    }
}

fn rotation_angle(rotation: Rotation) -> ppa_srm_rotation_angle_t {
    match rotation {
        Rotation::Deg0 => ppa_srm_rotation_angle_t_PPA_SRM_ROTATION_ANGLE_0,
        Rotation::Deg90 => ppa_srm_rotation_angle_t_PPA_SRM_ROTATION_ANGLE_90,
        Rotation::Deg180 => ppa_srm_rotation_angle_t_PPA_SRM_ROTATION_ANGLE_180,
        Rotation::Deg270 => ppa_srm_rotation_angle_t_PPA_SRM_ROTATION_ANGLE_270,
    }
}

impl AcceleratorClient for PpaClient {
    fn scale_rotate(&mut self, op: ScaleRotateOp<'_>) -> Result<()> {
        let needed = op.out_bytes();
        if needed > op.output.len() {
            return Err(FramebufferError::ScratchOverflow { needed, capacity: op.output.len() });
        }

        let in_cm = color_mode(op.in_format)?;
        let (out_w, out_h) = op.out_size();
        let stride_px = (op.in_pitch / op.in_format.bytes_per_pixel()) as u32;

        unsafe {
            let mut srm: ppa_srm_oper_config_t = core::mem::zeroed();

            srm.in_.buffer = op.input.as_ptr() as _;
            srm.in_.pic_w = stride_px;
            srm.in_.pic_h = op.in_height;
            srm.in_.block_w = op.in_width;
            srm.in_.block_h = op.in_height;
            srm.in_.__bindgen_anon_1.srm_cm = in_cm;

            srm.out.buffer = op.output.as_mut_ptr() as *mut c_void;
            srm.out.buffer_size = op.output.len() as u32;
            srm.out.pic_w = out_w;
            srm.out.pic_h = out_h;
            srm.out.__bindgen_anon_1.srm_cm = ppa_srm_color_mode_t_PPA_SRM_COLOR_MODE_RGB565;

            srm.rotation_angle = rotation_angle(op.rotation);
            srm.scale_x = op.scale as f32;
            srm.scale_y = op.scale as f32;
            srm.rgb_swap = op.encoder.order() == ColorOrder::Bgr;
            srm.mode = ppa_trans_mode_t_PPA_TRANS_MODE_BLOCKING;

            esp!(ppa_do_scale_rotate_mirror(self.handle, &srm))
                .map_err(|e| hardware_error("ppa_do_scale_rotate_mirror", e))?;
        }

        if op.encoder.swap_bytes() {
            for px in op.output[..needed].chunks_exact_mut(2) {
                px.swap(0, 1);
            }
        }
        Ok(())
    }
}

impl Drop for PpaClient {
    fn drop(&mut self) {
        if let Err(e) = unsafe { esp!(ppa_unregister_client(self.handle)) } {
            warn!("ppa_unregister_client failed: {}", e);
        } else {
            debug!("PPA SRM client unregistered");
        }
    }
}
