//! streamrt: streaming pipeline runtime for scratchpad-coupled compute
//! clusters.
//!
//! The runtime models a cluster of scratchpad replicas over a shared
//! backing store and the three mechanisms kernels are built from:
//!
//! - an asynchronous transfer engine moving batches between backing store
//!   and scratchpad ([`dma`]),
//! - streaming register lanes feeding the compute loop without address
//!   arithmetic ([`stream`]),
//! - a three-stage load/compute/store pipeline over rotating buffer rings,
//!   synchronised only by the cluster barrier ([`pipeline`]).
//!
//! [`accel`] adds control-register access to attached fixed-function
//! units, and [`config`] the file/env configuration layer.
//!
//! # Usage
//!
//! ```no_run
//! use streamrt::cluster::{ClusterMemory, ScratchpadAllocator};
//! use streamrt::dma::TransferEngine;
//! use streamrt::pipeline::{PipelineScheduler, RoleSet};
//! use streamrt::stream::StreamUnit;
//!
//! let mut mem = ClusterMemory::new(4, 128 * 1024);
//! let mut engine = TransferEngine::new(2);
//! let mut unit = StreamUnit::new();
//! let mut alloc = ScratchpadAllocator::new(128 * 1024);
//! let mut scheduler = PipelineScheduler::new(RoleSet::mint(), &mut alloc, 0, 0, 64, 2);
//! # let _ = (&mut mem, &mut engine, &mut unit, &mut scheduler);
//! ```

pub mod accel;
pub mod cluster;
pub mod config;
pub mod dma;
pub mod pipeline;
pub mod stream;
