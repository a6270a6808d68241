//! Flagging every baseline of a chunk on a pool of worker threads.
//!
//! The main thread feeds baseline indices into a bounded queue and closes it.
//! Each worker pops indices until the queue is drained, flags the baseline
//! and accumulates statistics into its own [`QualityStatistics`]. Workers
//! merge their statistics into the shared result once, when they finish.
//! [`process_baselines`] returns only after every worker has joined, so the
//! buffers are free to be written out or overwritten afterwards.

use std::{
    sync::Mutex,
    thread::{self, ScopedJoinHandle},
};

use crossbeam_channel::bounded;
use crossbeam_utils::atomic::AtomicCell;
use log::{debug, trace};

use crate::{
    buffers::BaselineBufferSet,
    error::Af2msError,
    flags::{FlagMask, Flagger},
    io::error::IOError,
    statistics::QualityStatistics,
    util::progress_bar,
};

/// Options for [`process_baselines`].
#[derive(Clone, Copy, Debug)]
pub struct ProcessOptions {
    /// Whether to call the flagger on cross-correlations. Otherwise every
    /// mask is all unflagged.
    pub rfi_detection: bool,
    /// Whether to accumulate statistics at all
    pub collect_statistics: bool,
    /// Number of worker threads, at least 1
    pub num_threads: usize,
    /// Absolute index of the chunk's first timestep
    pub first_timestep: usize,
    /// Whether to draw a progress bar
    pub draw_progress: bool,
}

/// The result of processing one chunk.
#[derive(Debug)]
pub struct ProcessedChunk {
    /// One mask per baseline, in canonical order
    pub masks: Vec<FlagMask>,
    /// Statistics of this chunk
    pub statistics: QualityStatistics,
}

fn process_one(
    buffers: &BaselineBufferSet,
    baseline_idx: usize,
    flagger: &dyn Flagger,
    options: &ProcessOptions,
    statistics: &mut QualityStatistics,
) -> Result<FlagMask, Af2msError> {
    let buffer = &buffers[baseline_idx];
    let baseline = buffers.baselines()[baseline_idx];
    let mask = if baseline.is_auto() || !options.rfi_detection {
        FlagMask::unflagged_like(buffer)
    } else {
        flagger.flag(buffer).map_err(|e| match e {
            shape_error @ Af2msError::BadArrayShape { .. } => shape_error,
            other => Af2msError::Flagging {
                baseline: baseline_idx,
                message: other.to_string(),
            },
        })?
    };
    mask.check_shape(buffer)?;
    if options.collect_statistics {
        statistics.accumulate(
            buffer,
            &mask,
            baseline,
            baseline_idx,
            options.first_timestep,
        )?;
    }
    Ok(mask)
}

/// Flag every baseline in `buffers` and accumulate their statistics.
///
/// `statistics_template` fixes the shape of the statistics; its contents are
/// ignored.
///
/// # Errors
///
/// The first error of any worker aborts the whole chunk: a failing flagger
/// gives [`Af2msError::Flagging`], a mask of the wrong shape gives
/// [`Af2msError::BadArrayShape`] and a panicking worker gives
/// [`Af2msError::WorkerPanic`].
pub fn process_baselines(
    buffers: &BaselineBufferSet,
    flagger: &dyn Flagger,
    statistics_template: &QualityStatistics,
    options: &ProcessOptions,
) -> Result<ProcessedChunk, Af2msError> {
    trace!("start process_baselines");
    let num_baselines = buffers.baselines().len();
    let num_threads = options.num_threads.max(1).min(num_baselines.max(1));
    debug!(
        "flagging {} baselines on {} threads",
        num_baselines, num_threads
    );

    let (tx_baseline, rx_baseline) = bounded::<usize>(num_threads * 4);
    let masks: Mutex<Vec<Option<FlagMask>>> = Mutex::new(vec![None; num_baselines]);
    let merged = Mutex::new(statistics_template.empty_like());
    let flag_progress = progress_bar(num_baselines, "flagging", options.draw_progress);
    // set by any worker that fails, so the others stop early
    let error = AtomicCell::new(false);

    let scoped_result: Result<(), Af2msError> = thread::scope(|scope| {
        let mut handles: Vec<ScopedJoinHandle<Result<(), Af2msError>>> =
            Vec::with_capacity(num_threads);
        for thread_idx in 0..num_threads {
            let rx_baseline = rx_baseline.clone();
            let (masks, merged, flag_progress, error) = (&masks, &merged, &flag_progress, &error);
            let handle = thread::Builder::new()
                .name(format!("flag{}", thread_idx))
                .spawn_scoped(scope, move || {
                    let mut local_stats = statistics_template.empty_like();
                    for baseline_idx in rx_baseline.iter() {
                        if error.load() {
                            break;
                        }
                        let result =
                            process_one(buffers, baseline_idx, flagger, options, &mut local_stats);
                        let mask = match result {
                            Ok(mask) => mask,
                            Err(e) => {
                                error.store(true);
                                return Err(e);
                            }
                        };
                        masks.lock().map_err(|_| Af2msError::WorkerPanic)?[baseline_idx] =
                            Some(mask);
                        flag_progress.inc(1);
                    }
                    merged
                        .lock()
                        .map_err(|_| Af2msError::WorkerPanic)?
                        .merge(&local_stats)
                })
                .map_err(IOError::from)?;
            handles.push(handle);
        }
        // only the workers hold receivers now
        drop(rx_baseline);

        for baseline_idx in 0..num_baselines {
            // a send only fails when every worker has exited early
            if error.load() || tx_baseline.send(baseline_idx).is_err() {
                break;
            }
        }
        // close the queue
        drop(tx_baseline);

        let mut first_error = None;
        for handle in handles {
            let result = handle.join().unwrap_or(Err(Af2msError::WorkerPanic));
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    });
    scoped_result?;
    flag_progress.finish();

    let masks = masks
        .into_inner()
        .map_err(|_| Af2msError::WorkerPanic)?
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(Af2msError::WorkerPanic)?;
    let statistics = merged.into_inner().map_err(|_| Af2msError::WorkerPanic)?;
    trace!("end process_baselines");
    Ok(ProcessedChunk { masks, statistics })
}
