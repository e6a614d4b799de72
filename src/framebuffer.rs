/// Window framebuffer lifecycle: create, present and destroy
///
/// Each window owns a [`WindowFramebuffer`] stored in its property store under
/// [`SURFACE_PROPERTY`]. The context holds everything the transfer loop needs,
/// so dropping it releases the surface, scratch buffer, completion signal,
/// panel registration and accelerator client together.
use core::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, trace};

use crate::config::FramebufferConfig;
use crate::display::accel::Accelerator;
use crate::display::chunking::ChunkPlan;
use crate::display::colors::PixelFormat;
use crate::display::convert::{build_converter, ChunkConverter};
use crate::display::panel::PanelDriver;
use crate::display::perf_metrics::{FrameMetrics, FrameStats};
use crate::display::surface::Surface;
use crate::display::transfer::TransferSync;
use crate::display::Rect;
use crate::error::{FramebufferError, Result};
use crate::memory::{allocate_with_fallback, MemoryAllocator, MemoryPool, ScratchBuffer};
use crate::window::Window;

/// Property key the framebuffer context lives under
pub const SURFACE_PROPERTY: &str = "espidf.internal.window.surface";

/// What the windowing layer needs to draw into a freshly created surface.
///
/// `pixels` stays valid until the framebuffer is destroyed or recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferInfo {
    pub format: PixelFormat,
    pub pixels: NonNull<u8>,
    pub pitch: usize,
}

/// Claim on a panel's single completion slot
struct PanelBinding {
    panel: Arc<dyn PanelDriver>,
    in_use: Arc<AtomicBool>,
    registered: bool,
}

impl PanelBinding {
    fn claim(panel: &Arc<dyn PanelDriver>, in_use: &Arc<AtomicBool>) -> Result<Self> {
        if in_use
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FramebufferError::PanelInUse);
        }
        Ok(Self { panel: panel.clone(), in_use: in_use.clone(), registered: false })
    }

    fn register(&mut self, sync: &TransferSync) -> Result<()> {
        self.panel.register_completion(sync.signal().clone())?;
        self.registered = true;
        Ok(())
    }
}

impl Drop for PanelBinding {
    fn drop(&mut self) {
        if self.registered {
            self.panel.unregister_completion();
            debug!("Completion callback removed from {}", self.panel.name());
        }
        self.in_use.store(false, Ordering::Release);
    }
}

/// Per-window framebuffer context.
pub struct WindowFramebuffer {
    // Field order is drop order: the accelerator client and the panel
    // registration go before the signal they point at.
    converter: Box<dyn ChunkConverter>,
    binding: PanelBinding,
    sync: TransferSync,
    scratch: ScratchBuffer,
    plan: ChunkPlan,
    metrics: FrameMetrics,
    surface: Surface,
}

impl WindowFramebuffer {
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats { completion_waits: self.sync.completions(), ..self.metrics.stats() }
    }

    pub fn chunk_height(&self) -> u32 {
        self.plan.chunk_height()
    }

    pub fn scratch_capacity(&self) -> usize {
        self.scratch.capacity()
    }

    pub fn scratch_pool(&self) -> MemoryPool {
        self.scratch.pool()
    }

    pub fn converter_name(&self) -> &'static str {
        self.converter.name()
    }

    /// Push the whole surface to the panel, one chunk at a time.
    pub fn present(&mut self) -> Result<()> {
        self.metrics.start_frame();
        match self.push_chunks() {
            Ok(()) => {
                self.metrics.end_frame();
                Ok(())
            }
            Err(e) => {
                self.metrics.abort_frame();
                Err(e)
            }
        }
    }

    fn push_chunks(&mut self) -> Result<()> {
        let panel = self.binding.panel.as_ref();
        // A chunk that timed out last time may still be reading scratch
        self.sync.settle(panel)?;

        for chunk in self.plan.chunks() {
            let out = self.converter.convert(&self.surface, chunk, self.scratch.as_bytes_mut())?;
            trace!("Chunk y={} rows={} -> {:?}, {} bytes", chunk.y, chunk.rows, out.rect, out.bytes);

            // Scratch is not touched again until the panel has finished reading it
            self.sync.transfer(panel, out.rect, &self.scratch.as_bytes()[..out.bytes], chunk.y)?;
            self.metrics.add_chunk(out.bytes);
        }
        Ok(())
    }
}

impl Drop for WindowFramebuffer {
    fn drop(&mut self) {
        info!(
            "Releasing {}x{} framebuffer ({} frames pushed)",
            self.surface.width(),
            self.surface.height(),
            self.metrics.stats().frames
        );
    }
}

/// Framebuffer backend for one LCD panel.
pub struct FramebufferDevice {
    config: FramebufferConfig,
    panel: Arc<dyn PanelDriver>,
    allocator: Arc<dyn MemoryAllocator>,
    accelerator: Option<Arc<dyn Accelerator>>,
    panel_in_use: Arc<AtomicBool>,
}

impl FramebufferDevice {
    pub fn new(
        config: FramebufferConfig,
        panel: Arc<dyn PanelDriver>,
        allocator: Arc<dyn MemoryAllocator>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Framebuffer device on {}: {} surface, {} rows/chunk, pools {:?}",
            panel.name(),
            config.surface_format.name(),
            config.chunk_height,
            config.memory_pools
        );
        Ok(Self {
            config,
            panel,
            allocator,
            accelerator: None,
            panel_in_use: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Attach a 2D engine for the accelerated strategy.
    pub fn with_accelerator(mut self, accelerator: Arc<dyn Accelerator>) -> Self {
        info!("Accelerator attached: {}", accelerator.name());
        self.accelerator = Some(accelerator);
        self
    }

    pub fn config(&self) -> &FramebufferConfig {
        &self.config
    }

    pub fn panel(&self) -> &Arc<dyn PanelDriver> {
        &self.panel
    }

    /// Allocate a surface for `window` and bind it through the property store.
    ///
    /// A framebuffer already bound to the window is released first. On error
    /// nothing stays allocated or registered and the window has no surface.
    pub fn create_window_framebuffer(&self, window: &mut dyn Window) -> Result<FramebufferInfo> {
        if window.properties_mut().clear(SURFACE_PROPERTY) {
            info!("Replaced the window's previous framebuffer");
        }

        let (width, height) = window.size_in_pixels();
        let context = self.build_context(width, height)?;
        window.properties_mut().set(SURFACE_PROPERTY, context);

        let context = window
            .properties_mut()
            .get_mut::<WindowFramebuffer>(SURFACE_PROPERTY)
            .ok_or(FramebufferError::SurfaceNotFound)?;
        let surface = context.surface_mut();
        Ok(FramebufferInfo {
            format: surface.format(),
            pitch: surface.pitch(),
            pixels: surface.pixels_ptr(),
        })
    }

    fn build_context(&self, width: u32, height: u32) -> Result<WindowFramebuffer> {
        let config = &self.config;
        let mut binding = PanelBinding::claim(&self.panel, &self.panel_in_use)?;

        let surface = Surface::new(width, height, config.surface_format)?;

        let converter = build_converter(
            config.strategy,
            config.surface_format,
            config.encoder(),
            config.scale,
            config.rotation,
            self.accelerator.as_ref(),
        )?;

        let out_row = converter.out_bytes_per_row(width);
        let rows = ChunkPlan::clamped_height(config.chunk_height, out_row, config.max_transfer_bytes).min(height);
        if rows < config.chunk_height.min(height) {
            info!(
                "Chunk height clamped {} -> {} rows to stay under {} bytes per transfer",
                config.chunk_height, rows, config.max_transfer_bytes
            );
        }

        let align = converter.output_align();
        let scratch = allocate_with_fallback(
            self.allocator.as_ref(),
            &config.memory_pools,
            rows as usize * out_row,
            align,
        )?;

        let signal = self.panel.create_completion_signal()?;
        let sync = TransferSync::new(signal, config.transfer_timeout(), config.panel_offset);
        binding.register(&sync)?;

        info!(
            "Framebuffer {}x{} {} created: {} converter, {} rows/chunk, {} byte scratch in {}",
            width,
            height,
            config.surface_format.name(),
            converter.name(),
            rows,
            scratch.capacity(),
            scratch.pool().name()
        );

        Ok(WindowFramebuffer {
            converter,
            binding,
            sync,
            scratch,
            plan: ChunkPlan::new(height, rows),
            metrics: FrameMetrics::new(config.stats_report_interval()),
            surface,
        })
    }

    /// Push the window's surface to the panel.
    ///
    /// Dirty rectangles are accepted but the whole surface is always sent.
    pub fn update_window_framebuffer(&self, window: &mut dyn Window, dirty: &[Rect]) -> Result<()> {
        let context = window
            .properties_mut()
            .get_mut::<WindowFramebuffer>(SURFACE_PROPERTY)
            .ok_or(FramebufferError::SurfaceNotFound)?;
        trace!("Update with {} dirty rects, sending full frame", dirty.len());
        context.present()
    }

    /// Release the window's framebuffer.
    ///
    /// Returns false when nothing was bound to the window. That call is a
    /// caller mistake but has no effect, so it is only logged.
    pub fn destroy_window_framebuffer(&self, window: &mut dyn Window) -> bool {
        let released = window.properties_mut().clear(SURFACE_PROPERTY);
        if !released {
            debug!("destroy_window_framebuffer: no framebuffer bound");
        }
        released
    }

    pub fn framebuffer<'w>(&self, window: &'w dyn Window) -> Option<&'w WindowFramebuffer> {
        window.properties().get::<WindowFramebuffer>(SURFACE_PROPERTY)
    }

    pub fn framebuffer_mut<'w>(&self, window: &'w mut dyn Window) -> Option<&'w mut WindowFramebuffer> {
        window.properties_mut().get_mut::<WindowFramebuffer>(SURFACE_PROPERTY)
    }

    pub fn surface_mut<'w>(&self, window: &'w mut dyn Window) -> Option<&'w mut Surface> {
        self.framebuffer_mut(window).map(WindowFramebuffer::surface_mut)
    }

    pub fn frame_stats(&self, window: &dyn Window) -> Option<FrameStats> {
        self.framebuffer(window).map(WindowFramebuffer::stats)
    }
}
