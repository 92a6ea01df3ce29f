//! Simulated backing store (bulk, high-latency memory).
//!
//! In hardware the transfer engine reaches the backing store over the
//! system interconnect. This module models that memory for hosted runs:
//! sparse 4 KiB pages over the full 64-bit address space, with unallocated
//! pages reading as zero.
//!
//! Named regions are bookkeeping only; pages are allocated on demand
//! regardless of regions. They give tests and the demo binary readable
//! transfer statistics.

use std::collections::BTreeMap;

/// Error type for backing-store region operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackingStoreError {
    /// A new region overlaps an already-registered one.
    RegionOverlap { new_base: u64, existing_name: String },
    /// Region not found by name.
    RegionNotFound(String),
}

impl std::fmt::Display for BackingStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegionOverlap { new_base, existing_name } => {
                write!(f, "Region at 0x{:016x} overlaps with '{}'", new_base, existing_name)
            }
            Self::RegionNotFound(name) => write!(f, "Region '{}' not found", name),
        }
    }
}

impl std::error::Error for BackingStoreError {}

/// A named address range in the backing store.
#[derive(Debug, Clone)]
pub struct Region {
    /// Human-readable name (e.g. "input", "output")
    pub name: String,
    /// Base address
    pub base: u64,
    /// Size in bytes
    pub size: usize,
    /// Bytes read out of this region by transfers
    pub bytes_read: u64,
    /// Bytes written into this region by transfers
    pub bytes_written: u64,
}

impl Region {
    fn new(name: impl Into<String>, base: u64, size: usize) -> Self {
        Self { name: name.into(), base, size, bytes_read: 0, bytes_written: 0 }
    }

    /// Check if an address range overlaps this region.
    #[inline]
    pub fn overlaps(&self, addr: u64, len: usize) -> bool {
        let end = addr.saturating_add(len as u64);
        let region_end = self.base.saturating_add(self.size as u64);
        addr < region_end && end > self.base
    }
}

/// Sparse backing-store memory.
///
/// Storage is a page map so that tests can scatter buffers anywhere in the
/// 64-bit space without allocating the range in between.
pub struct BackingStore {
    /// page base address -> page contents
    pages: BTreeMap<u64, Box<[u8; Self::PAGE_SIZE]>>,
    regions: Vec<Region>,
}

impl BackingStore {
    /// Page size for sparse storage.
    pub const PAGE_SIZE: usize = 4096;

    const PAGE_MASK: u64 = !(Self::PAGE_SIZE as u64 - 1);

    /// Create an empty backing store.
    pub fn new() -> Self {
        Self { pages: BTreeMap::new(), regions: Vec::new() }
    }

    /// Register a named region for statistics tracking.
    pub fn add_region(
        &mut self,
        name: impl Into<String>,
        base: u64,
        size: usize,
    ) -> Result<(), BackingStoreError> {
        let name = name.into();
        for existing in &self.regions {
            if existing.overlaps(base, size) {
                return Err(BackingStoreError::RegionOverlap {
                    new_base: base,
                    existing_name: existing.name.clone(),
                });
            }
        }
        self.regions.push(Region::new(name, base, size));
        Ok(())
    }

    /// Look up a region by name.
    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// All registered regions.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn page_mut(&mut self, addr: u64) -> &mut [u8; Self::PAGE_SIZE] {
        let page_addr = addr & Self::PAGE_MASK;
        self.pages
            .entry(page_addr)
            .or_insert_with(|| Box::new([0u8; Self::PAGE_SIZE]))
    }

    fn page(&self, addr: u64) -> Option<&[u8; Self::PAGE_SIZE]> {
        self.pages.get(&(addr & Self::PAGE_MASK)).map(|b| b.as_ref())
    }

    /// Write a byte slice, crossing page boundaries as needed.
    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) {
        let mut cur = addr;
        let mut remaining = data;
        while !remaining.is_empty() {
            let offset = (cur & (Self::PAGE_SIZE as u64 - 1)) as usize;
            let take = remaining.len().min(Self::PAGE_SIZE - offset);
            let page = self.page_mut(cur);
            page[offset..offset + take].copy_from_slice(&remaining[..take]);
            cur += take as u64;
            remaining = &remaining[take..];
        }
    }

    /// Read bytes into a buffer. Unallocated pages read as zero.
    pub fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
        let mut cur = addr;
        let mut done = 0;
        while done < buf.len() {
            let offset = (cur & (Self::PAGE_SIZE as u64 - 1)) as usize;
            let take = (buf.len() - done).min(Self::PAGE_SIZE - offset);
            match self.page(cur) {
                Some(page) => buf[done..done + take].copy_from_slice(&page[offset..offset + take]),
                None => buf[done..done + take].fill(0),
            }
            cur += take as u64;
            done += take;
        }
    }

    /// Write a 64-bit word (little-endian).
    #[inline]
    pub fn write_u64(&mut self, addr: u64, value: u64) {
        self.write_bytes(addr, &value.to_le_bytes());
    }

    /// Read a 64-bit word (little-endian).
    #[inline]
    pub fn read_u64(&self, addr: u64) -> u64 {
        let mut buf = [0u8; 8];
        self.read_bytes(addr, &mut buf);
        u64::from_le_bytes(buf)
    }

    /// Write a slice of f64 values (convenience for test data).
    pub fn write_f64s(&mut self, addr: u64, values: &[f64]) {
        for (i, v) in values.iter().enumerate() {
            self.write_bytes(addr + (i * 8) as u64, &v.to_le_bytes());
        }
    }

    /// Read a slice of f64 values.
    pub fn read_f64s(&self, addr: u64, count: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(count);
        let mut buf = [0u8; 8];
        for i in 0..count {
            self.read_bytes(addr + (i * 8) as u64, &mut buf);
            out.push(f64::from_le_bytes(buf));
        }
        out
    }

    /// Record bytes read out of a region by a transfer.
    pub fn record_transfer_read(&mut self, addr: u64, len: usize) {
        if let Some(region) = self.regions.iter_mut().find(|r| r.overlaps(addr, len)) {
            region.bytes_read += len as u64;
        }
    }

    /// Record bytes written into a region by a transfer.
    pub fn record_transfer_write(&mut self, addr: u64, len: usize) {
        if let Some(region) = self.regions.iter_mut().find(|r| r.overlaps(addr, len)) {
            region.bytes_written += len as u64;
        }
    }

    /// Number of pages allocated so far.
    pub fn allocated_pages(&self) -> usize {
        self.pages.len()
    }
}

impl Default for BackingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingStore")
            .field("allocated_pages", &self.pages.len())
            .field("regions", &self.regions.len())
            .finish()
    }
}
