use std::time::{Duration, Instant};

/// Per-framebuffer transfer counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub frames: u64,
    pub chunks: u64,
    /// Completion signals actually consumed, counted by the transfer handshake
    pub completion_waits: u64,
    pub bytes_transferred: u64,
    pub last_frame_chunks: u32,
    pub last_frame_time: Duration,
    pub worst_frame_time: Duration,
}

/// Accumulates [`FrameStats`] and reports them on a fixed interval
pub struct FrameMetrics {
    stats: FrameStats,
    frame_start: Option<Instant>,
    frame_chunks: u32,

    // Report timing
    last_report: Instant,
    report_interval: Option<Duration>,
    frames_at_report: u64,
}

impl FrameMetrics {
    pub fn new(report_interval: Option<Duration>) -> Self {
        Self {
            stats: FrameStats::default(),
            frame_start: None,
            frame_chunks: 0,
            last_report: Instant::now(),
            report_interval,
            frames_at_report: 0,
        }
    }

    pub fn start_frame(&mut self) {
        self.frame_start = Some(Instant::now());
        self.frame_chunks = 0;
    }

    /// Record one chunk that was issued and whose completion was consumed
    pub fn add_chunk(&mut self, bytes: usize) {
        self.frame_chunks += 1;
        self.stats.chunks += 1;
        self.stats.bytes_transferred += bytes as u64;
    }

    pub fn end_frame(&mut self) {
        if let Some(start) = self.frame_start.take() {
            let elapsed = start.elapsed();
            self.stats.frames += 1;
            self.stats.last_frame_chunks = self.frame_chunks;
            self.stats.last_frame_time = elapsed;
            if elapsed > self.stats.worst_frame_time {
                self.stats.worst_frame_time = elapsed;
            }
            log::debug!(
                "Frame {} pushed in {} chunks, {:.2}ms",
                self.stats.frames,
                self.frame_chunks,
                elapsed.as_secs_f32() * 1000.0
            );
        }

        if let Some(interval) = self.report_interval {
            if self.last_report.elapsed() >= interval {
                self.report(interval);
                self.last_report = Instant::now();
                self.frames_at_report = self.stats.frames;
            }
        }
    }

    /// Drop an unfinished frame, e.g. after a transfer error
    pub fn abort_frame(&mut self) {
        self.frame_start = None;
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    fn report(&self, interval: Duration) {
        let frames = self.stats.frames - self.frames_at_report;
        if frames == 0 {
            return;
        }
        let fps = frames as f32 / interval.as_secs_f32();
        log::info!(
            "[FB PERF] {:.1} fps | {} chunks/frame | last {:.1}ms | worst {:.1}ms | {} KB total",
            fps,
            self.stats.last_frame_chunks,
            self.stats.last_frame_time.as_secs_f32() * 1000.0,
            self.stats.worst_frame_time.as_secs_f32() * 1000.0,
            self.stats.bytes_transferred / 1024
        );
    }
}
