//! Multi-trial ray-trace loop, serial or split across rayon workers.
#![allow(clippy::cast_possible_truncation)]

use crate::trace::RayTracer;
use fdtrace_core::{
    seed_for_thread, LossReason, OpticalCalibration, RayRecord, Result, RunConfig, SiteGeometry,
    TraceOutcome,
};
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io;

/// Destination of emitted ray records.
pub trait RecordSink {
    /// Writes one record.
    ///
    /// # Errors
    /// Returns any I/O error from the underlying destination.
    fn write_record(&mut self, record: &RayRecord) -> io::Result<()>;

    /// Flushes buffered records.
    ///
    /// # Errors
    /// Returns any I/O error from the underlying destination.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl RecordSink for Vec<RayRecord> {
    fn write_record(&mut self, record: &RayRecord) -> io::Result<()> {
        self.push(*record);
        Ok(())
    }
}

/// Outcome counts of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceStatistics {
    /// Rays emitted.
    pub rays_traced: u64,
    /// Rays that landed inside a tube.
    pub tube_hits: u64,
    /// Rays that landed between tubes.
    pub gap_hits: u64,
    /// Rays lost before the camera face, by reason code.
    losses: BTreeMap<i32, u64>,
}

impl TraceStatistics {
    /// Counts one traced ray.
    pub fn record(&mut self, outcome: TraceOutcome) {
        self.rays_traced += 1;
        match outcome {
            TraceOutcome::Tube(_) => self.tube_hits += 1,
            TraceOutcome::Gap => self.gap_hits += 1,
            TraceOutcome::Lost(reason) => *self.losses.entry(reason.code()).or_default() += 1,
        }
    }

    /// Rays written to the output.
    #[inline]
    pub fn records_written(&self) -> u64 {
        self.tube_hits + self.gap_hits
    }

    /// Rays lost for `reason`.
    pub fn lost(&self, reason: LossReason) -> u64 {
        self.losses.get(&reason.code()).copied().unwrap_or(0)
    }

    /// Rays lost for any reason.
    pub fn total_lost(&self) -> u64 {
        self.losses.values().sum()
    }

    /// Adds the counts of `other`.
    pub fn merge(&mut self, other: &TraceStatistics) {
        self.rays_traced += other.rays_traced;
        self.tube_hits += other.tube_hits;
        self.gap_hits += other.gap_hits;
        for (code, count) in &other.losses {
            *self.losses.entry(*code).or_default() += count;
        }
    }

    /// Logs a summary at info level.
    pub fn log_summary(&self) {
        info!(
            "traced {} rays: {} written ({} in tubes, {} in gaps), {} lost",
            self.rays_traced,
            self.records_written(),
            self.tube_hits,
            self.gap_hits,
            self.total_lost()
        );
        for reason in LossReason::ALL {
            let count = self.lost(reason);
            if count > 0 {
                info!("  {}: {count}", reason.label());
            }
        }
    }
}

/// Number of workers for a requested count; zero means one per hardware
/// thread.
pub fn resolve_thread_count(requested: usize) -> usize {
    if requested == 0 {
        rayon::current_num_threads().max(1)
    } else {
        requested
    }
}

/// Trials handled by each of `workers` workers, earlier workers taking the
/// remainder.
pub fn split_trials(total: u64, workers: usize) -> Vec<u64> {
    let workers = workers.max(1) as u64;
    let base = total / workers;
    let extra = total % workers;
    (0..workers).map(|i| base + u64::from(i < extra)).collect()
}

/// Runs the configured number of trials against one camera.
#[derive(Debug)]
pub struct RayTraceEngine<'a> {
    tracer: RayTracer<'a>,
    camera: usize,
    flip_y: bool,
    seed: u64,
    threads: usize,
}

impl<'a> RayTraceEngine<'a> {
    /// Prepares an engine from an already modified geometry.
    ///
    /// # Errors
    /// Propagates configuration and tracer construction errors.
    pub fn new(
        geometry: &SiteGeometry,
        calib: &'a OpticalCalibration,
        config: &RunConfig,
    ) -> Result<Self> {
        config.validate()?;
        let tracer = RayTracer::new(geometry, config.mirror, calib, config.source)?;
        Ok(Self {
            tracer,
            camera: config.mirror,
            flip_y: geometry.flips_camera_y(),
            seed: config.seed,
            threads: config.threads,
        })
    }

    /// Worker count used by [`run`](Self::run).
    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Traces `rays` rays, writing every record that reached the camera
    /// face to `sink`.
    ///
    /// With one worker records stream straight to the sink. With several,
    /// each worker buffers its records and the buffers are written in
    /// worker order, so a fixed seed and thread count give identical output.
    ///
    /// # Errors
    /// Returns I/O errors from the sink or a failure to start the workers.
    pub fn run<S: RecordSink + ?Sized>(&self, rays: u64, sink: &mut S) -> io::Result<TraceStatistics> {
        let stats = if self.threads <= 1 {
            self.run_serial(rays, sink)?
        } else {
            self.run_parallel(rays, sink)?
        };
        sink.finish()?;
        Ok(stats)
    }

    fn run_serial<S: RecordSink + ?Sized>(&self, rays: u64, sink: &mut S) -> io::Result<TraceStatistics> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed_for_thread(self.seed, 0));
        let mut stats = TraceStatistics::default();
        for _ in 0..rays {
            let result = self.tracer.trace(&mut rng);
            stats.record(result.outcome);
            if let Some(record) = RayRecord::from_trace(self.camera, &result, self.flip_y) {
                sink.write_record(&record)?;
            }
        }
        Ok(stats)
    }

    fn run_parallel<S: RecordSink + ?Sized>(&self, rays: u64, sink: &mut S) -> io::Result<TraceStatistics> {
        let shares = split_trials(rays, self.threads);
        debug!("splitting {rays} rays across {} workers: {shares:?}", self.threads);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(io::Error::other)?;

        let batches: Vec<(Vec<RayRecord>, TraceStatistics)> = pool.install(|| {
            shares
                .par_iter()
                .enumerate()
                .map(|(worker, &count)| self.trace_batch(worker, count))
                .collect()
        });

        let mut stats = TraceStatistics::default();
        for (records, batch_stats) in &batches {
            for record in records {
                sink.write_record(record)?;
            }
            stats.merge(batch_stats);
        }
        Ok(stats)
    }

    fn trace_batch(&self, worker: usize, count: u64) -> (Vec<RayRecord>, TraceStatistics) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed_for_thread(self.seed, worker));
        let mut stats = TraceStatistics::default();
        let mut records = Vec::with_capacity(count as usize / 4);
        for _ in 0..count {
            let result = self.tracer.trace(&mut rng);
            stats.record(result.outcome);
            records.extend(RayRecord::from_trace(self.camera, &result, self.flip_y));
        }
        (records, stats)
    }
}
