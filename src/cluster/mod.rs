//! Cluster memory system: address map, scratchpad replicas, backing store.
//!
//! The platform has exactly two kinds of memory:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Backing store                         │
//! │        (large, high-latency, 64-bit byte-addressed)       │
//! └───────────────┬──────────────────────────────────────────┘
//!                 │ transfer engine
//! ┌───────────────▼─────────┐  ┌─────────────────────────┐
//! │  Scratchpad, replica 0  │  │  Scratchpad, replica 1  │ ...
//! │  window at              │  │  window at              │
//! │  SCRATCHPAD_BASE        │  │  SCRATCHPAD_BASE +      │
//! │                         │  │  REPLICA_STRIDE         │
//! └─────────────────────────┘  └─────────────────────────┘
//! ```
//!
//! Address resolution is a fixed split: a 64-bit address that falls inside a
//! replica's window is scratchpad; everything else is backing store. The
//! resolution rule is pure and has no failure mode; addresses in the gap
//! between a scratchpad's end and the next window are a configuration error
//! (debug assertion), matching the platform's undefined behaviour there.

pub mod backing;
pub mod barrier;
pub mod params;
pub mod scratchpad;

pub use backing::{BackingStore, BackingStoreError, Region};
pub use barrier::ClusterBarrier;
pub use scratchpad::{Scratchpad, ScratchpadAllocator};

use params::{MAX_REPLICAS, REPLICA_STRIDE, SCRATCHPAD_BASE};

/// Selection of cluster replicas, one bit per replica.
///
/// Used by multicast transfers to fan a write out to several scratchpads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplicaMask(u8);

impl ReplicaMask {
    /// The empty mask (no replication).
    pub const EMPTY: Self = Self(0);

    /// Build a mask from raw bits (bit r selects replica r).
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Build a mask selecting the given replicas.
    pub fn of(replicas: &[usize]) -> Self {
        let mut bits = 0u8;
        for &r in replicas {
            assert!(r < MAX_REPLICAS, "replica {} out of range", r);
            bits |= 1 << r;
        }
        Self(bits)
    }

    /// True if no replica is selected.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if replica `r` is selected.
    #[inline]
    pub fn contains(&self, r: usize) -> bool {
        r < MAX_REPLICAS && self.0 & (1 << r) != 0
    }

    /// Iterate over the selected replica indices.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_REPLICAS).filter(|&r| self.contains(r))
    }

    /// Raw bits.
    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// Where a 64-bit address resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Backing store, absolute address.
    Backing(u64),
    /// Scratchpad of one replica, byte offset within it.
    Scratchpad { replica: usize, offset: u32 },
}

/// The fixed address map of the cluster system.
#[derive(Debug, Clone, Copy)]
pub struct AddressMap {
    replicas: usize,
    scratchpad_bytes: usize,
}

impl AddressMap {
    /// Create the map for `replicas` scratchpads of `scratchpad_bytes` each.
    pub fn new(replicas: usize, scratchpad_bytes: usize) -> Self {
        assert!(replicas >= 1 && replicas <= MAX_REPLICAS);
        assert!(scratchpad_bytes as u64 <= REPLICA_STRIDE);
        Self { replicas, scratchpad_bytes }
    }

    /// Number of replicas.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Scratchpad capacity per replica.
    pub fn scratchpad_bytes(&self) -> usize {
        self.scratchpad_bytes
    }

    /// The global address of a scratchpad offset on one replica.
    #[inline]
    pub fn scratchpad_addr(&self, replica: usize, offset: u32) -> u64 {
        debug_assert!(replica < self.replicas);
        debug_assert!((offset as usize) < self.scratchpad_bytes);
        SCRATCHPAD_BASE + replica as u64 * REPLICA_STRIDE + offset as u64
    }

    /// Resolve a 64-bit address to its location.
    #[inline]
    pub fn resolve(&self, addr: u64) -> Location {
        let span = self.replicas as u64 * REPLICA_STRIDE;
        if addr >= SCRATCHPAD_BASE && addr < SCRATCHPAD_BASE + span {
            let rel = addr - SCRATCHPAD_BASE;
            let replica = (rel / REPLICA_STRIDE) as usize;
            let offset = rel % REPLICA_STRIDE;
            debug_assert!(
                offset < self.scratchpad_bytes as u64,
                "address 0x{:x} falls in the unmapped gap of replica {}",
                addr, replica
            );
            Location::Scratchpad { replica, offset: offset as u32 }
        } else {
            Location::Backing(addr)
        }
    }
}

/// All memory reachable by the transfer engine: the backing store plus one
/// scratchpad per cluster replica.
pub struct ClusterMemory {
    map: AddressMap,
    backing: BackingStore,
    replicas: Vec<Scratchpad>,
}

impl ClusterMemory {
    /// Create the memory system for the given geometry.
    pub fn new(replicas: usize, scratchpad_bytes: usize) -> Self {
        let map = AddressMap::new(replicas, scratchpad_bytes);
        Self {
            map,
            backing: BackingStore::new(),
            replicas: (0..replicas).map(|_| Scratchpad::new(scratchpad_bytes)).collect(),
        }
    }

    /// The address map.
    pub fn map(&self) -> AddressMap {
        self.map
    }

    /// The backing store.
    pub fn backing(&self) -> &BackingStore {
        &self.backing
    }

    /// Mutable backing store (host-side setup and inspection).
    pub fn backing_mut(&mut self) -> &mut BackingStore {
        &mut self.backing
    }

    /// One replica's scratchpad.
    pub fn scratchpad(&self, replica: usize) -> &Scratchpad {
        &self.replicas[replica]
    }

    /// One replica's scratchpad, mutable.
    pub fn scratchpad_mut(&mut self, replica: usize) -> &mut Scratchpad {
        &mut self.replicas[replica]
    }

    /// Read bytes from either address space.
    ///
    /// The range must not straddle the scratchpad/backing boundary; the
    /// transfer engine resolves each row at its start address.
    pub fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
        match self.map.resolve(addr) {
            Location::Backing(a) => self.backing.read_bytes(a, buf),
            Location::Scratchpad { replica, offset } => {
                self.replicas[replica].read_bytes(offset, buf)
            }
        }
    }

    /// Write bytes to either address space.
    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) {
        match self.map.resolve(addr) {
            Location::Backing(a) => self.backing.write_bytes(a, data),
            Location::Scratchpad { replica, offset } => {
                self.replicas[replica].write_bytes(offset, data)
            }
        }
    }

    /// Write bytes to the primary destination, and additionally to the same
    /// scratchpad offset in every replica selected by `mask`.
    ///
    /// Replication is defined only for scratchpad destinations: the mask
    /// selects cluster replicas. A backing-store destination with a
    /// non-empty mask writes the primary destination only.
    pub fn write_bytes_multicast(&mut self, addr: u64, data: &[u8], mask: ReplicaMask) {
        match self.map.resolve(addr) {
            Location::Backing(a) => {
                if !mask.is_empty() {
                    log::warn!(
                        "multicast mask 0b{:08b} ignored for backing-store destination 0x{:x}",
                        mask.bits(), addr
                    );
                }
                self.backing.write_bytes(a, data);
            }
            Location::Scratchpad { replica, offset } => {
                self.replicas[replica].write_bytes(offset, data);
                for r in mask.iter() {
                    if r != replica {
                        debug_assert!(r < self.replicas.len(), "multicast to replica {} out of range", r);
                        self.replicas[r].write_bytes(offset, data);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ClusterMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterMemory")
            .field("replicas", &self.replicas.len())
            .field("scratchpad_bytes", &self.map.scratchpad_bytes)
            .field("backing", &self.backing)
            .finish()
    }
}
