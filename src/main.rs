//! streamrt demo: run the three-stage identity pipeline and report what
//! moved.

use std::env;

use streamrt::cluster::{ClusterMemory, ScratchpadAllocator};
use streamrt::config::Config;
use streamrt::dma::TransferEngine;
use streamrt::pipeline::{ComputeCtx, LoadCtx, PipelineScheduler, RoleSet, StoreCtx, StreamKernel};
use streamrt::stream::{LaneAddressing, LaneConfig, StreamUnit};

const BATCH_BYTES: u32 = 64;
const SOURCE: u64 = 0x4000_0000;
const DEST: u64 = 0x5000_0000;

/// Streams each batch through the lanes unchanged.
struct IdentityKernel {
    src: u64,
    dst: u64,
}

impl StreamKernel for IdentityKernel {
    fn batch_bytes(&self) -> u32 {
        BATCH_BYTES
    }

    fn load(&mut self, ctx: &mut LoadCtx<'_>, item: u64) {
        ctx.copy_in(self.src + item * BATCH_BYTES as u64);
    }

    fn compute(&mut self, ctx: &mut ComputeCtx<'_>, _item: u64) {
        let elems = ctx.batch_elems();
        let (in_slot, out_slot) = (ctx.in_slot(), ctx.out_slot());
        ctx.unit().configure_lane(0, LaneConfig::reader(LaneAddressing::affine_1d(elems, 8)));
        ctx.unit().configure_lane(1, LaneConfig::writer(LaneAddressing::affine_1d(elems, 8)));
        ctx.unit().arm(0, in_slot);
        ctx.unit().arm(1, out_slot);
        let mut streams = ctx.enable();
        for _ in 0..elems {
            let x = streams.read(0);
            streams.write(1, x);
        }
    }

    fn store(&mut self, ctx: &mut StoreCtx<'_>, item: u64) {
        ctx.copy_out(self.dst + item * BATCH_BYTES as u64);
    }
}

fn usage() {
    println!("Usage: streamrt [--batches K] [--buffers N]");
    println!();
    println!("Runs the identity pipeline: K batches of {} bytes through", BATCH_BYTES);
    println!("an N-slot double-buffered load/compute/store pipeline.");
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut batches: u64 = 20;
    let mut buffers: usize = 2;

    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--batches" => {
                batches = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--batches needs a value"))?
                    .parse()?;
            }
            "--buffers" => {
                buffers = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--buffers needs a value"))?
                    .parse()?;
            }
            "--help" | "-h" => {
                usage();
                return Ok(());
            }
            other => {
                usage();
                anyhow::bail!("unknown argument: {}", other);
            }
        }
    }

    let config = Config::get();
    config.validate()?;

    let mut mem = ClusterMemory::new(config.replicas(), config.scratchpad_bytes());
    let mut engine = TransferEngine::new(config.dma_channels());
    let mut unit = StreamUnit::new();
    let mut alloc = ScratchpadAllocator::new(config.scratchpad_bytes());

    // Seed the source region with a recognisable pattern.
    let total = batches * BATCH_BYTES as u64;
    let pattern: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
    mem.backing_mut().add_region("source", SOURCE, total as usize)?;
    mem.backing_mut().add_region("dest", DEST, total as usize)?;
    mem.backing_mut().write_bytes(SOURCE, &pattern);

    let mut kernel = IdentityKernel { src: SOURCE, dst: DEST };
    let mut scheduler =
        PipelineScheduler::new(RoleSet::mint(), &mut alloc, 0, 0, BATCH_BYTES, buffers);
    let report = scheduler.run(&mut kernel, batches, &mut mem, &mut engine, &mut unit);

    let mut out = vec![0u8; total as usize];
    mem.backing().read_bytes(DEST, &mut out);
    let ok = out == pattern;

    println!("streamrt identity pipeline");
    println!("==========================");
    println!("Batches:        {} x {} B", report.work_items, BATCH_BYTES);
    println!("Ring slots:     {}", scheduler.buffer_count());
    println!("Iterations:     {} ({} fill/drain)", report.iterations, report.iterations - report.work_items);
    let stats = engine.stats(0);
    println!(
        "Channel 0:      {} transfers, {} B, {} rows",
        stats.transfers_completed, stats.bytes_transferred, stats.rows_retired
    );
    println!("Verification:   {}", if ok { "OK" } else { "MISMATCH" });

    if !ok {
        anyhow::bail!("pipeline output does not match the source pattern");
    }
    Ok(())
}
