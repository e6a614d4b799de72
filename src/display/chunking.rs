/// Row-chunk planning for transfers bounded by the DMA buffer size
use core::cmp::{max, min};

/// Largest single transfer the i80 DMA path takes comfortably (60KB)
pub const DEFAULT_MAX_TRANSFER_BYTES: usize = 60 * 1024;

/// One band of rows `[y, y + rows)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub y: u32,
    pub rows: u32,
}

impl Chunk {
    pub fn end(&self) -> u32 {
        self.y + self.rows
    }
}

/// Splits a surface height into chunks of at most `chunk_height` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    height: u32,
    chunk_height: u32,
}

impl ChunkPlan {
    pub fn new(height: u32, chunk_height: u32) -> Self {
        Self { height, chunk_height: max(chunk_height, 1) }
    }

    /// Pick a chunk height no taller than `requested` whose output stays under
    /// `max_transfer_bytes`. Never below one row.
    pub fn clamped_height(requested: u32, out_row_bytes: usize, max_transfer_bytes: usize) -> u32 {
        if out_row_bytes == 0 {
            return max(requested, 1);
        }
        let fit = (max_transfer_bytes / out_row_bytes).min(u32::MAX as usize) as u32;
        max(min(requested, fit), 1)
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn chunk_height(&self) -> u32 {
        self.chunk_height
    }

    pub fn len(&self) -> usize {
        let (h, c) = (self.height as u64, self.chunk_height as u64);
        ((h + c - 1) / c) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    pub fn chunks(&self) -> Chunks {
        Chunks { plan: *self, next_y: 0 }
    }
}

pub struct Chunks {
    plan: ChunkPlan,
    next_y: u32,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next_y >= self.plan.height {
            return None;
        }
        let rows = min(self.plan.chunk_height, self.plan.height - self.next_y);
        let chunk = Chunk { y: self.next_y, rows };
        self.next_y += rows;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = ChunkPlan::new(self.plan.height - self.next_y, self.plan.chunk_height).len();
        (left, Some(left))
    }
}

impl ExactSizeIterator for Chunks {}
