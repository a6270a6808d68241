//! Planning how an observation is split into chunks of timesteps which fit
//! in memory.

use std::ops::Range;

use log::{debug, warn};

use crate::{
    constants::{BYTES_PER_SAMPLE, CHANNEL_ALIGNMENT, MIN_FLAGGING_TIMESTEPS, NUM_POL_PRODUCTS},
    types::Baseline,
};

/// A partition of the selected timesteps into contiguous, non-overlapping
/// ranges. Ranges are absolute timestep indices into the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    /// The chunks, in order
    pub chunks: Vec<Range<usize>>,
    /// Timesteps per chunk that fit in the memory budget
    pub max_timesteps_per_chunk: usize,
    /// Physical time capacity each baseline buffer needs: the length of the
    /// longest chunk
    pub capacity: usize,
    /// Whether the budget did not fit a single timestep
    pub clamped: bool,
}

impl ChunkPlan {
    /// Number of chunks.
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Total number of timesteps covered.
    pub fn num_timesteps(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.len()).sum()
    }
}

/// The channel count rounded up to [`CHANNEL_ALIGNMENT`].
pub fn aligned_channel_count(num_chans: usize) -> usize {
    (num_chans + CHANNEL_ALIGNMENT - 1) / CHANNEL_ALIGNMENT * CHANNEL_ALIGNMENT
}

/// Bytes needed to hold one timestep of every baseline in memory.
pub fn bytes_per_timestep(num_ants: usize, num_chans: usize) -> usize {
    NUM_POL_PRODUCTS * aligned_channel_count(num_chans) * Baseline::count(num_ants) * BYTES_PER_SAMPLE
}

/// Split `num_timesteps` timesteps starting at `interval_start` into chunks
/// of at most the number of timesteps that fit in `memory_bytes`.
///
/// The number of chunks is `1 + num_timesteps / max`, and chunk `i` spans
/// `[T*i/K, T*(i+1)/K)` (offset by `interval_start`). This always gives
/// gap-free coverage, but when `num_timesteps` is a multiple of `max` there
/// is one more chunk than strictly needed.
///
/// Running out of memory is not fatal: a budget which doesn't fit a single
/// timestep is clamped to one timestep per chunk with a warning. When
/// `rfi_detection` is set, chunks shorter than [`MIN_FLAGGING_TIMESTEPS`]
/// also produce a warning.
pub fn plan_chunks(
    num_timesteps: usize,
    num_ants: usize,
    num_chans: usize,
    memory_bytes: usize,
    interval_start: usize,
    rfi_detection: bool,
) -> ChunkPlan {
    let footprint = bytes_per_timestep(num_ants, num_chans).max(1);
    let mut max_timesteps_per_chunk = memory_bytes / footprint;
    let clamped = max_timesteps_per_chunk == 0;
    if clamped {
        warn!(
            "The available memory ({} bytes) is not enough to hold a single timestep ({} bytes). Continuing anyway, but the machine may start swapping.",
            memory_bytes, footprint
        );
        max_timesteps_per_chunk = 1;
    }
    if rfi_detection && max_timesteps_per_chunk < MIN_FLAGGING_TIMESTEPS {
        warn!(
            "This set is too large to fit in memory: only {} timesteps fit per chunk, so flagging accuracy will be reduced.",
            max_timesteps_per_chunk
        );
    }

    let num_chunks = 1 + num_timesteps / max_timesteps_per_chunk;
    let chunks: Vec<_> = (0..num_chunks)
        .map(|chunk| {
            let start = num_timesteps * chunk / num_chunks + interval_start;
            let end = num_timesteps * (chunk + 1) / num_chunks + interval_start;
            start..end
        })
        .collect();
    let capacity = (num_timesteps + num_chunks - 1) / num_chunks;
    debug!(
        "{} bytes per timestep, {} timesteps per chunk, {} chunks of at most {} timesteps",
        footprint, max_timesteps_per_chunk, num_chunks, capacity
    );

    ChunkPlan {
        chunks,
        max_timesteps_per_chunk,
        capacity,
        clamped,
    }
}
