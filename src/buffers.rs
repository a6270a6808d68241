//! Per-baseline time series buffers, and scattering raw records into them.
//!
//! The correlator writes one record per timestep holding every baseline.
//! Flagging wants the opposite: one baseline at a time, all timesteps of a
//! chunk. [`BaselineBufferSet::ingest_chunk`] does the transpose.

use std::ops::Range;

use indicatif::ProgressBar;
use log::{debug, trace};

use crate::{
    constants::NUM_POL_PRODUCTS,
    error::Af2msError,
    io::aartfaac::AartfaacFile,
    ndarray::{s, Array3, ArrayView2, Axis},
    types::{Baseline, Timestep},
    util::progress_bar,
    Complex,
};

/// Number of real valued sample planes in a buffer: real and imaginary for
/// each polarisation product.
pub const NUM_PLANES: usize = NUM_POL_PRODUCTS * 2;

/// The samples of one baseline for the current chunk.
///
/// Plane `pol * 2` holds the real parts of polarisation `pol` and plane
/// `pol * 2 + 1` the imaginary parts. Each plane is `[channel][time]`, with a
/// time stride (the capacity) fixed at allocation. Only the first
/// [`BaselineBuffer::width`] timesteps of a plane are meaningful.
#[derive(Clone, Debug)]
pub struct BaselineBuffer {
    planes: Array3<f32>,
    width: usize,
}

impl BaselineBuffer {
    /// Allocate a buffer for `num_chans` channels and `capacity` timesteps.
    /// The logical width starts out as the full capacity.
    pub fn new(num_chans: usize, capacity: usize) -> Self {
        Self {
            planes: Array3::zeros((NUM_PLANES, num_chans, capacity)),
            width: capacity,
        }
    }

    /// Physical number of timesteps.
    pub fn capacity(&self) -> usize {
        self.planes.len_of(Axis(2))
    }

    /// Distance between the same timestep of adjacent channels.
    pub fn stride(&self) -> usize {
        self.capacity()
    }

    /// Logical number of timesteps in the current chunk.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of channels.
    pub fn num_chans(&self) -> usize {
        self.planes.len_of(Axis(1))
    }

    /// Change the logical width without touching the allocation.
    ///
    /// # Errors
    ///
    /// [`Af2msError::BadArrayShape`] if `width` exceeds the capacity.
    pub fn resize_without_reallocation(&mut self, width: usize) -> Result<(), Af2msError> {
        if width > self.capacity() {
            return Err(Af2msError::BadArrayShape {
                argument: "width".into(),
                function: "BaselineBuffer::resize_without_reallocation".into(),
                expected: format!("<= {}", self.capacity()),
                received: format!("{}", width),
            });
        }
        self.width = width;
        Ok(())
    }

    /// Store the sample of polarisation `pol`, channel `chan` at local
    /// timestep `time`.
    pub fn set_sample(&mut self, pol: usize, chan: usize, time: usize, sample: Complex<f32>) {
        self.planes[(pol * 2, chan, time)] = sample.re;
        self.planes[(pol * 2 + 1, chan, time)] = sample.im;
    }

    /// The sample of polarisation `pol`, channel `chan` at local timestep
    /// `time`.
    pub fn sample(&self, pol: usize, chan: usize, time: usize) -> Complex<f32> {
        Complex::new(
            self.planes[(pol * 2, chan, time)],
            self.planes[(pol * 2 + 1, chan, time)],
        )
    }

    /// The logical `[channel][time]` view of plane `plane`.
    pub fn plane(&self, plane: usize) -> ArrayView2<f32> {
        self.planes.slice(s![plane, .., ..self.width])
    }
}

/// One [`BaselineBuffer`] per baseline, indexed in canonical order (see
/// [`Baseline::all`]), plus the table mapping the correlator's baseline order
/// onto it.
#[derive(Clone, Debug)]
pub struct BaselineBufferSet {
    num_ants: usize,
    num_chans: usize,
    baselines: Vec<Baseline>,
    buffers: Vec<BaselineBuffer>,
    raw_to_buffer: Vec<usize>,
    raw_vis: Vec<Complex<f32>>,
}

impl BaselineBufferSet {
    /// Allocate buffers for every baseline of `num_ants` antennas, each with
    /// room for `capacity` timesteps of `num_chans` channels. This is the only
    /// allocation; later chunks reuse it.
    pub fn new(num_ants: usize, num_chans: usize, capacity: usize) -> Self {
        trace!("start BaselineBufferSet::new");
        let baselines = Baseline::all(num_ants);

        // The correlator enumerates (a1, a2) with a2 <= a1; the buffers are
        // indexed by the canonical (a2, a1). The sample is not conjugated.
        let mut raw_to_buffer = Vec::with_capacity(baselines.len());
        for ant1 in 0..num_ants {
            for ant2 in 0..=ant1 {
                raw_to_buffer.push(Self::canonical_index(num_ants, ant2, ant1));
            }
        }

        let buffers = vec![BaselineBuffer::new(num_chans, capacity); baselines.len()];
        debug!(
            "allocated {} baseline buffers of {} channels x {} timesteps",
            buffers.len(),
            num_chans,
            capacity
        );
        trace!("end BaselineBufferSet::new");
        Self {
            num_ants,
            num_chans,
            baselines,
            buffers,
            raw_to_buffer,
            raw_vis: vec![],
        }
    }

    fn canonical_index(num_ants: usize, ant1: usize, ant2: usize) -> usize {
        ant1 * num_ants - ant1 * ant1.saturating_sub(1) / 2 + (ant2 - ant1)
    }

    /// Canonical buffer index of the baseline between `ant_a` and `ant_b`, in
    /// either order.
    pub fn baseline_index(&self, ant_a: usize, ant_b: usize) -> usize {
        let (ant1, ant2) = (ant_a.min(ant_b), ant_a.max(ant_b));
        Self::canonical_index(self.num_ants, ant1, ant2)
    }

    /// For each baseline in correlator order, the buffer it is stored in.
    pub fn raw_index_map(&self) -> &[usize] {
        &self.raw_to_buffer
    }

    /// The baselines, in buffer order.
    pub fn baselines(&self) -> &[Baseline] {
        &self.baselines
    }

    /// The buffers, in canonical baseline order.
    pub fn buffers(&self) -> &[BaselineBuffer] {
        &self.buffers
    }

    /// Number of antennas.
    pub fn num_ants(&self) -> usize {
        self.num_ants
    }

    /// Number of channels.
    pub fn num_chans(&self) -> usize {
        self.num_chans
    }

    /// Logical number of timesteps in the current chunk.
    pub fn width(&self) -> usize {
        self.buffers.first().map_or(0, BaselineBuffer::width)
    }

    /// Set the logical width of every buffer.
    ///
    /// # Errors
    ///
    /// [`Af2msError::BadArrayShape`] if `width` exceeds the capacity.
    pub fn resize_all(&mut self, width: usize) -> Result<(), Af2msError> {
        for buffer in &mut self.buffers {
            buffer.resize_without_reallocation(width)?;
        }
        Ok(())
    }

    /// Scatter one record, in correlator order, into local timestep `time`.
    ///
    /// # Errors
    ///
    /// [`Af2msError::BadArrayShape`] if `vis` does not hold exactly one
    /// timestep, or `time` is beyond the logical width.
    pub fn ingest_timestep(&mut self, vis: &[Complex<f32>], time: usize) -> Result<(), Af2msError> {
        let per_baseline = self.num_chans * NUM_POL_PRODUCTS;
        let expected = self.baselines.len() * per_baseline;
        if vis.len() != expected || time >= self.width() {
            return Err(Af2msError::BadArrayShape {
                argument: "vis".into(),
                function: "BaselineBufferSet::ingest_timestep".into(),
                expected: format!("{} visibilities at time < {}", expected, self.width()),
                received: format!("{} visibilities at time {}", vis.len(), time),
            });
        }
        for (raw_baseline, &buffer_idx) in self.raw_to_buffer.iter().enumerate() {
            let buffer = &mut self.buffers[buffer_idx];
            let baseline_vis = &vis[raw_baseline * per_baseline..(raw_baseline + 1) * per_baseline];
            for (chan, chan_vis) in baseline_vis.chunks_exact(NUM_POL_PRODUCTS).enumerate() {
                for (pol, &sample) in chan_vis.iter().enumerate() {
                    buffer.set_sample(pol, chan, time, sample);
                }
            }
        }
        Ok(())
    }

    /// Read the timesteps in `chunk` from `reader` and scatter them into the
    /// buffers, after setting their logical width to the chunk length.
    ///
    /// Returns the time span of each timestep read.
    ///
    /// # Errors
    ///
    /// Any read error aborts the chunk.
    pub fn ingest_chunk<R>(
        &mut self,
        reader: &mut AartfaacFile<R>,
        chunk: Range<usize>,
        draw_progress: bool,
    ) -> Result<Vec<Timestep>, Af2msError>
    where
        R: std::io::Read + std::io::Seek,
    {
        trace!("start ingest_chunk");
        self.resize_all(chunk.len())?;
        self.raw_vis
            .resize(reader.vis_per_timestep(), Complex::default());
        reader.seek_to_timestep(chunk.start)?;

        let read_progress: ProgressBar = progress_bar(chunk.len(), "reading", draw_progress);
        let mut timesteps = Vec::with_capacity(chunk.len());
        let mut raw_vis = std::mem::take(&mut self.raw_vis);
        for time in 0..chunk.len() {
            let timestep = reader.read_timestep(&mut raw_vis)?;
            self.ingest_timestep(&raw_vis, time)?;
            timesteps.push(timestep);
            read_progress.inc(1);
        }
        self.raw_vis = raw_vis;
        read_progress.finish();
        trace!("end ingest_chunk");
        Ok(timesteps)
    }
}

impl std::ops::Index<usize> for BaselineBufferSet {
    type Output = BaselineBuffer;

    fn index(&self, index: usize) -> &Self::Output {
        &self.buffers[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        io::aartfaac::AartfaacFile,
        test_common::{synthetic_file, synthetic_vis},
    };
    use std::io::Cursor;

    #[test]
    fn test_raw_index_map_swaps_antennas() {
        let set = BaselineBufferSet::new(3, 1, 1);
        // correlator order (0,0) (1,0) (1,1) (2,0) (2,1) (2,2)
        assert_eq!(set.raw_index_map(), &[0, 1, 3, 2, 4, 5]);
    }

    #[test]
    fn test_raw_index_map_is_a_bijection() {
        for num_ants in 1..12 {
            let set = BaselineBufferSet::new(num_ants, 1, 1);
            let mut seen = set.raw_index_map().to_vec();
            seen.sort_unstable();
            assert_eq!(seen, (0..Baseline::count(num_ants)).collect::<Vec<_>>());
            for (idx, baseline) in set.baselines().iter().enumerate() {
                assert_eq!(set.baseline_index(baseline.ant1, baseline.ant2), idx);
                assert_eq!(set.baseline_index(baseline.ant2, baseline.ant1), idx);
            }
        }
    }

    #[test]
    fn test_resize_keeps_allocation() {
        let mut buffer = BaselineBuffer::new(3, 5);
        buffer.set_sample(1, 2, 4, Complex::new(1., -1.));
        buffer.resize_without_reallocation(2).unwrap();
        assert_eq!(buffer.width(), 2);
        assert_eq!(buffer.capacity(), 5);
        assert_eq!(buffer.stride(), 5);
        assert_eq!(buffer.plane(2).dim(), (3, 2));
        buffer.resize_without_reallocation(5).unwrap();
        assert_eq!(buffer.sample(1, 2, 4), Complex::new(1., -1.));
        assert!(matches!(
            buffer.resize_without_reallocation(6),
            Err(Af2msError::BadArrayShape { .. })
        ));
    }

    #[test]
    fn test_ingest_timestep_scatters_by_baseline_channel_pol() {
        let (num_ants, num_chans) = (3, 2);
        let mut set = BaselineBufferSet::new(num_ants, num_chans, 2);
        let vis = synthetic_vis(num_ants, num_chans, 1);
        set.ingest_timestep(&vis, 1).unwrap();

        // raw baseline 3 is (2, 0), stored at canonical (0, 2), buffer 2
        let buffer = &set[set.baseline_index(0, 2)];
        let raw_idx = (3 * num_chans + 1) * 4 + 2;
        assert_eq!(buffer.sample(2, 1, 1), vis[raw_idx]);
        assert_eq!(buffer.plane(4)[(1, 1)], vis[raw_idx].re);
        assert_eq!(buffer.plane(5)[(1, 1)], vis[raw_idx].im);

        assert!(set.ingest_timestep(&vis[1..], 0).is_err());
        assert!(set.ingest_timestep(&vis, 2).is_err());
    }

    #[test]
    fn test_ingest_chunk_reuses_buffers() {
        let (num_ants, num_chans) = (4, 2);
        let bytes = synthetic_file(num_ants, num_chans, 3, 100., 1.);
        let mut reader = AartfaacFile::from_reader(Cursor::new(bytes), "SB001.vis", None).unwrap();
        let mut set = BaselineBufferSet::new(num_ants, num_chans, 2);

        let timesteps = set.ingest_chunk(&mut reader, 0..1, false).unwrap();
        assert_eq!(timesteps.len(), 1);
        assert_eq!(set.width(), 1);

        let timesteps = set.ingest_chunk(&mut reader, 1..3, false).unwrap();
        assert_eq!(set.width(), 2);
        assert_eq!(timesteps[0].start_unix, 101.);
        assert_eq!(timesteps[1].start_unix, 102.);
        // the imaginary part encodes the file timestep
        let buffer = &set[set.baseline_index(1, 3)];
        assert_eq!(buffer.sample(0, 0, 0).im, 1.5);
        assert_eq!(buffer.sample(3, 1, 1).im, 2.5);
        for buffer in set.buffers() {
            assert_eq!(buffer.capacity(), 2);
        }

        assert!(set.ingest_chunk(&mut reader, 0..3, false).is_err());
    }
}
