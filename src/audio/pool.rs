// ABOUTME: Buffer pool for recycling playback sample buffers
// ABOUTME: Keeps allocations off the buffer-completion path

use crossbeam::queue::ArrayQueue;

/// Pool of interleaved `f32` sample buffers
pub struct BufferPool {
    pool: ArrayQueue<Vec<f32>>,
    capacity: usize,
}

impl BufferPool {
    /// Create a new buffer pool
    ///
    /// # Arguments
    /// * `pool_size` - Number of buffers to pre-allocate
    /// * `buffer_capacity` - Capacity of each buffer in samples
    pub fn new(pool_size: usize, buffer_capacity: usize) -> Self {
        let pool = ArrayQueue::new(pool_size.max(1));
        for _ in 0..pool_size {
            let _ = pool.push(Vec::with_capacity(buffer_capacity));
        }

        Self {
            pool,
            capacity: buffer_capacity,
        }
    }

    /// Get a zeroed buffer of `capacity` samples (allocates if the pool is empty)
    pub fn get(&self) -> Vec<f32> {
        let mut buf = self
            .pool
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.capacity));
        buf.clear();
        buf.resize(self.capacity, 0.0);
        buf
    }

    /// Return a buffer to the pool
    pub fn put(&self, mut buf: Vec<f32>) {
        buf.clear();
        let _ = self.pool.push(buf); // Ignore if pool is full
    }

    /// Buffers currently waiting in the pool
    pub fn available(&self) -> usize {
        self.pool.len()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
