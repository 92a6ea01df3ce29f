//! Cluster-local scratchpad memory and its watermark allocator.
//!
//! The scratchpad is a small, fast, explicitly-managed memory shared by all
//! cores of one cluster. There is no cache and no virtual memory: addresses
//! inside a kernel are plain byte offsets into this array.
//!
//! Allocation is a monotonically increasing watermark. Nothing is freed
//! while a kernel runs; the whole scratchpad is reclaimed at once when the
//! kernel exits (`ScratchpadAllocator::reset`).

use crate::cluster::params::STREAM_ALIGN;

/// One replica's scratchpad memory.
pub struct Scratchpad {
    data: Vec<u8>,
}

impl Scratchpad {
    /// Create a zeroed scratchpad of the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self { data: vec![0u8; capacity] }
    }

    /// Capacity in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the scratchpad has zero capacity.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read bytes at a byte offset.
    pub fn read_bytes(&self, offset: u32, buf: &mut [u8]) {
        let offset = offset as usize;
        debug_assert!(
            offset + buf.len() <= self.data.len(),
            "scratchpad read past end: offset=0x{:x} len={} capacity=0x{:x}",
            offset, buf.len(), self.data.len()
        );
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
    }

    /// Write bytes at a byte offset.
    pub fn write_bytes(&mut self, offset: u32, data: &[u8]) {
        let offset = offset as usize;
        debug_assert!(
            offset + data.len() <= self.data.len(),
            "scratchpad write past end: offset=0x{:x} len={} capacity=0x{:x}",
            offset, data.len(), self.data.len()
        );
        self.data[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Read an 8-byte-aligned f64.
    #[inline]
    pub fn read_f64(&self, offset: u32) -> f64 {
        debug_assert!(offset as usize % STREAM_ALIGN == 0, "unaligned stream read at 0x{:x}", offset);
        let mut buf = [0u8; 8];
        self.read_bytes(offset, &mut buf);
        f64::from_le_bytes(buf)
    }

    /// Write an 8-byte-aligned f64.
    #[inline]
    pub fn write_f64(&mut self, offset: u32, value: f64) {
        debug_assert!(offset as usize % STREAM_ALIGN == 0, "unaligned stream write at 0x{:x}", offset);
        self.write_bytes(offset, &value.to_le_bytes());
    }

    /// Read an index-table entry of the given width (little-endian).
    pub fn read_index(&self, offset: u32, width_bytes: usize) -> u32 {
        let mut buf = [0u8; 4];
        self.read_bytes(offset, &mut buf[..width_bytes]);
        u32::from_le_bytes(buf)
    }

    /// Byte-fill a range.
    pub fn fill(&mut self, offset: u32, value: u8, len: usize) {
        let offset = offset as usize;
        debug_assert!(offset + len <= self.data.len());
        self.data[offset..offset + len].fill(value);
    }

    /// Raw view of the whole scratchpad (test inspection).
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Scratchpad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scratchpad").field("capacity", &self.data.len()).finish()
    }
}

/// Monotonic watermark allocator over one scratchpad.
///
/// Offsets handed out are stable for the lifetime of a kernel. Exhaustion
/// is a hard configuration error: on real hardware this is caught by the
/// link-time partition, so the hosted model panics rather than recovering.
#[derive(Debug)]
pub struct ScratchpadAllocator {
    top: u32,
    capacity: u32,
}

impl ScratchpadAllocator {
    /// Create an allocator over a scratchpad of the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self { top: 0, capacity: capacity as u32 }
    }

    /// Allocate `len` bytes with the given alignment; returns the offset.
    pub fn alloc(&mut self, len: usize, align: usize) -> u32 {
        assert!(align.is_power_of_two(), "alignment must be a power of two");
        let aligned = (self.top as usize).next_multiple_of(align);
        let end = aligned + len;
        assert!(
            end <= self.capacity as usize,
            "scratchpad exhausted: need {} bytes at 0x{:x}, capacity 0x{:x}",
            len, aligned, self.capacity
        );
        self.top = end as u32;
        log::trace!("spm alloc: offset=0x{:x} len=0x{:x} top=0x{:x}", aligned, len, self.top);
        aligned as u32
    }

    /// Allocate `count` equally-sized, stream-aligned slots; returns their offsets.
    pub fn alloc_slots(&mut self, slot_bytes: usize, count: usize) -> Vec<u32> {
        (0..count).map(|_| self.alloc(slot_bytes, STREAM_ALIGN)).collect()
    }

    /// Current watermark.
    pub fn watermark(&self) -> u32 {
        self.top
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        (self.capacity - self.top) as usize
    }

    /// Reclaim the whole scratchpad (kernel exit).
    pub fn reset(&mut self) {
        self.top = 0;
    }
}
