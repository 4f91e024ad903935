//! Lock-free hop queue between a capture context and the processing task
//!
//! The engine is never called from interrupt context. A capture callback (I2S/DMA
//! interrupt, audio thread) pushes interleaved samples into a [`HopProducer`]; the
//! task that owns the [`FrontEnd`](crate::FrontEnd) drains whole hops from the
//! matching [`HopConsumer`]. One producer, one consumer, no locks.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::fixed_point::Q15;

/// Standard cache line size (x86_64/ARM64)
const CACHE_LINE_SIZE: usize = 64;

/// Cache-line aligned wrapper to prevent false sharing
#[repr(align(64))]
struct CacheAligned<T>(T);

/// Hop queue errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingBufferError {
    #[error("Queue capacity {0} is too small (minimum 2 samples)")]
    InvalidCapacity(usize),

    #[error("Queue overflow: {requested} samples pushed, {available} free")]
    Overflow { requested: usize, available: usize },

    #[error("Queue underrun: {requested} samples requested, {available} queued")]
    Underrun { requested: usize, available: usize },
}

// ============================================================================
// Statistics
// ============================================================================

/// Live counters, updated with relaxed atomics from both ends.
#[derive(Debug, Default)]
pub struct QueueStats {
    pushed: AtomicU64,
    popped: AtomicU64,
    overflows: AtomicU64,
    underruns: AtomicU64,
}

/// Point-in-time copy of [`QueueStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueCounters {
    /// Samples accepted by the producer
    pub pushed: u64,
    /// Samples consumed (popped or skipped)
    pub popped: u64,
    /// Rejected pushes
    pub overflows: u64,
    /// Rejected pops
    pub underruns: u64,
}

impl QueueStats {
    pub fn snapshot(&self) -> QueueCounters {
        QueueCounters {
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.pushed.store(0, Ordering::Relaxed);
        self.popped.store(0, Ordering::Relaxed);
        self.overflows.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
    }
}

// ============================================================================
// Shared State
// ============================================================================

#[repr(C)] // Keep the padding between the two positions
struct Inner {
    buffer: Box<[UnsafeCell<Q15>]>,
    size: usize,
    mask: usize,
    /// Free-running sample count written (owned by the producer)
    write_pos: CacheAligned<AtomicUsize>,
    _padding: [u8; CACHE_LINE_SIZE],
    /// Free-running sample count read (owned by the consumer)
    read_pos: CacheAligned<AtomicUsize>,
    stats: QueueStats,
}

// Each cell is touched by exactly one side at a time; the positions hand ownership over
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

impl Inner {
    fn new(requested: usize) -> Result<Self, RingBufferError> {
        if requested < 2 {
            return Err(RingBufferError::InvalidCapacity(requested));
        }
        let size = requested
            .checked_next_power_of_two()
            .ok_or(RingBufferError::InvalidCapacity(requested))?;

        let buffer: Box<[UnsafeCell<Q15>]> = (0..size).map(|_| UnsafeCell::new(0)).collect();

        Ok(Self {
            buffer,
            size,
            mask: size - 1,
            write_pos: CacheAligned(AtomicUsize::new(0)),
            _padding: [0; CACHE_LINE_SIZE],
            read_pos: CacheAligned(AtomicUsize::new(0)),
            stats: QueueStats::default(),
        })
    }

    /// Queued samples. Positions run free, so `write - read` never exceeds `size`.
    #[inline]
    fn queued(&self, write: usize, read: usize) -> usize {
        write.wrapping_sub(read)
    }

    /// Copy `data` into the ring starting at position `start`.
    ///
    /// # Safety
    /// The `data.len()` cells from `start` must be free (owned by the producer).
    #[inline(always)]
    unsafe fn copy_in(&self, start: usize, data: &[Q15]) {
        let idx = start & self.mask;
        let first = (self.size - idx).min(data.len());
        let base = self.buffer.as_ptr() as *mut Q15;
        ptr::copy_nonoverlapping(data.as_ptr(), base.add(idx), first);
        if data.len() > first {
            ptr::copy_nonoverlapping(data.as_ptr().add(first), base, data.len() - first);
        }
    }

    /// Copy `out.len()` samples out of the ring starting at position `start`.
    ///
    /// # Safety
    /// The cells must hold published samples (owned by the consumer).
    #[inline(always)]
    unsafe fn copy_out(&self, start: usize, out: &mut [Q15]) {
        let idx = start & self.mask;
        let first = (self.size - idx).min(out.len());
        let base = self.buffer.as_ptr() as *const Q15;
        ptr::copy_nonoverlapping(base.add(idx), out.as_mut_ptr(), first);
        if out.len() > first {
            ptr::copy_nonoverlapping(base, out.as_mut_ptr().add(first), out.len() - first);
        }
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Writing end. `Send` but not `Sync`: exactly one producer.
pub struct HopProducer {
    inner: Arc<Inner>,
    _not_sync: PhantomData<std::cell::Cell<()>>,
}

unsafe impl Send for HopProducer {}

/// Reading end. `Send` but not `Sync`: exactly one consumer.
pub struct HopConsumer {
    inner: Arc<Inner>,
    _not_sync: PhantomData<std::cell::Cell<()>>,
}

unsafe impl Send for HopConsumer {}

/// Create a queue holding at least `capacity` samples (rounded up to a power of two).
///
/// ```
/// use audio_frontend_core::ring_buffer::hop_queue;
///
/// let (producer, consumer) = hop_queue(512).unwrap();
/// producer.push(&[0i16; 128]).unwrap();
/// let mut hop = [0i16; 128];
/// assert!(consumer.pop_hop(&mut hop));
/// ```
pub fn hop_queue(capacity: usize) -> Result<(HopProducer, HopConsumer), RingBufferError> {
    let inner = Arc::new(Inner::new(capacity)?);
    Ok((
        HopProducer {
            inner: inner.clone(),
            _not_sync: PhantomData,
        },
        HopConsumer {
            inner,
            _not_sync: PhantomData,
        },
    ))
}

impl HopProducer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.size
    }

    /// Free samples
    #[inline]
    pub fn space(&self) -> usize {
        let write = self.inner.write_pos.0.load(Ordering::Relaxed);
        let read = self.inner.read_pos.0.load(Ordering::Acquire);
        self.inner.size - self.inner.queued(write, read)
    }

    /// Push all of `samples` or nothing.
    pub fn push(&self, samples: &[Q15]) -> Result<usize, RingBufferError> {
        if samples.is_empty() {
            return Ok(0);
        }
        let write = self.inner.write_pos.0.load(Ordering::Relaxed);
        let read = self.inner.read_pos.0.load(Ordering::Acquire);
        let available = self.inner.size - self.inner.queued(write, read);
        if samples.len() > available {
            self.inner.stats.overflows.fetch_add(1, Ordering::Relaxed);
            return Err(RingBufferError::Overflow {
                requested: samples.len(),
                available,
            });
        }

        // SAFETY: `available` free cells start at `write` and only the producer writes
        unsafe { self.inner.copy_in(write, samples) };
        self.inner
            .write_pos
            .0
            .store(write.wrapping_add(samples.len()), Ordering::Release);
        self.inner
            .stats
            .pushed
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
        Ok(samples.len())
    }

    /// Push as many samples as fit; returns the count. A short push counts as overflow.
    pub fn push_available(&self, samples: &[Q15]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        let write = self.inner.write_pos.0.load(Ordering::Relaxed);
        let read = self.inner.read_pos.0.load(Ordering::Acquire);
        let count = samples.len().min(self.inner.size - self.inner.queued(write, read));
        if count < samples.len() {
            self.inner.stats.overflows.fetch_add(1, Ordering::Relaxed);
        }
        if count == 0 {
            return 0;
        }

        // SAFETY: as in `push`
        unsafe { self.inner.copy_in(write, &samples[..count]) };
        self.inner
            .write_pos
            .0
            .store(write.wrapping_add(count), Ordering::Release);
        self.inner.stats.pushed.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    pub fn stats(&self) -> &QueueStats {
        &self.inner.stats
    }
}

impl HopConsumer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.size
    }

    /// Queued samples
    #[inline]
    pub fn available(&self) -> usize {
        let write = self.inner.write_pos.0.load(Ordering::Acquire);
        let read = self.inner.read_pos.0.load(Ordering::Relaxed);
        self.inner.queued(write, read)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Fill `out` completely or fail with an underrun.
    pub fn pop(&self, out: &mut [Q15]) -> Result<usize, RingBufferError> {
        if out.is_empty() {
            return Ok(0);
        }
        let available = self.available();
        if available < out.len() {
            self.inner.stats.underruns.fetch_add(1, Ordering::Relaxed);
            return Err(RingBufferError::Underrun {
                requested: out.len(),
                available,
            });
        }
        self.take(out);
        Ok(out.len())
    }

    /// Take one whole hop if it is queued. Polling an incomplete hop is not an underrun.
    pub fn pop_hop(&self, hop: &mut [Q15]) -> bool {
        if hop.is_empty() || self.available() < hop.len() {
            return false;
        }
        self.take(hop);
        true
    }

    /// Copy up to `out.len()` samples without consuming them; the rest is zeroed.
    pub fn peek(&self, out: &mut [Q15]) -> usize {
        let read = self.inner.read_pos.0.load(Ordering::Relaxed);
        let count = out.len().min(self.available());
        // SAFETY: `count` published cells start at `read`
        unsafe { self.inner.copy_out(read, &mut out[..count]) };
        out[count..].fill(0);
        count
    }

    /// Drop up to `count` samples; returns how many were dropped.
    pub fn skip(&self, count: usize) -> usize {
        let count = count.min(self.available());
        if count > 0 {
            self.inner.read_pos.0.fetch_add(count, Ordering::Release);
            self.inner.stats.popped.fetch_add(count as u64, Ordering::Relaxed);
        }
        count
    }

    pub fn stats(&self) -> &QueueStats {
        &self.inner.stats
    }

    /// Caller checked that `out.len()` samples are queued.
    #[inline]
    fn take(&self, out: &mut [Q15]) {
        let read = self.inner.read_pos.0.load(Ordering::Relaxed);
        // SAFETY: the Acquire in `available` published these cells, only the consumer reads
        unsafe { self.inner.copy_out(read, out) };
        self.inner
            .read_pos
            .0
            .store(read.wrapping_add(out.len()), Ordering::Release);
        self.inner
            .stats
            .popped
            .fetch_add(out.len() as u64, Ordering::Relaxed);
    }
}
