//! The chunk loop: read, flag and write every chunk of the selected
//! timesteps, in order.

use std::{
    fmt::Display,
    io::{Read, Seek},
};

use derive_builder::Builder;
use log::{debug, info, trace};
use marlu::{hifitime::Duration, RADec};

use crate::{
    buffers::BaselineBufferSet,
    chunking::{plan_chunks, ChunkPlan},
    constants::TELESCOPE_NAME,
    corrections::{zenith_phase_centre, GeometryCorrector, RotationPath, UvwService},
    error::Af2msError,
    flags::Flagger,
    io::{
        aartfaac::{AartfaacFile, BandSetup},
        antenna_config::AntennaLayout,
        writer::{
            AartfaacKeywords, AntennaInfo, BandInfo, ChannelInfo, FieldInfo, ObservationInfo,
            SourceInfo, VisWriter,
        },
    },
    output::OutputAssembler,
    processing::{process_baselines, ProcessOptions},
    selection::TimestepSelection,
    statistics::QualityStatistics,
    types::{unix_to_mjd_seconds, Baseline},
    with_increment_duration,
};

fn default_num_threads() -> usize {
    crate::rayon::current_num_threads().max(1)
}

/// Options for [`convert`]
#[derive(Builder, Debug, Clone)]
pub struct ConvertOptions {
    /// Whether to call the flagger on cross-correlations
    #[builder(default = "false")]
    pub rfi_detection: bool,
    /// Whether to collect and write quality statistics
    #[builder(default = "true")]
    pub collect_statistics: bool,
    /// First selected timestep
    #[builder(default)]
    pub interval_start: usize,
    /// One past the last selected timestep, 0 for the end of the file
    #[builder(default)]
    pub interval_end: usize,
    /// Manual phase centre. Defaults to the zenith at the central timestep.
    #[builder(default)]
    pub phase_centre: Option<RADec>,
    /// Memory budget for the baseline buffers \[bytes\]
    #[builder(default = "usize::MAX")]
    pub memory_bytes: usize,
    /// Number of flagging threads
    #[builder(default = "default_num_threads()")]
    pub num_threads: usize,
    /// How the phase rotation is computed
    #[builder(default)]
    pub rotation: RotationPath,
    /// UT1 - UTC \[seconds\], used for the zenith phase centre
    #[builder(default)]
    pub dut1_s: f64,
    /// Recorded in the observation metadata
    #[builder(default)]
    pub command_line: String,
    /// Whether to draw progress bars
    #[builder(default = "false")]
    pub draw_progress: bool,
}

/// The same values the builder fills in.
impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            rfi_detection: false,
            collect_statistics: true,
            interval_start: 0,
            interval_end: 0,
            phase_centre: None,
            memory_bytes: usize::MAX,
            num_threads: default_num_threads(),
            rotation: RotationPath::default(),
            dut1_s: 0.,
            command_line: String::new(),
            draw_progress: false,
        }
    }
}

impl Display for ConvertOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} flag cross-correlations.",
            if self.rfi_detection { "Will" } else { "Will not" }
        )?;
        writeln!(
            f,
            "{} collect quality statistics.",
            if self.collect_statistics {
                "Will"
            } else {
                "Will not"
            }
        )?;
        writeln!(f, "Will use {} flagging threads.", self.num_threads)?;
        writeln!(f, "Will rotate with the {:?} path.", self.rotation)?;
        Ok(())
    }
}

/// What [`plan_conversion`] decided.
#[derive(Debug, Clone)]
pub struct ConversionPlan {
    /// The selected timesteps
    pub selection: TimestepSelection,
    /// How they are split into chunks
    pub chunks: ChunkPlan,
}

/// What [`convert`] did.
#[derive(Debug, Clone)]
pub struct ConvertSummary {
    /// The selection and chunks that were converted
    pub plan: ConversionPlan,
    /// The phase centre the visibilities were rotated to
    pub phase_centre: RADec,
    /// Number of rows handed to the writer chain
    pub num_rows: usize,
    /// Statistics of the whole run, if collected
    pub statistics: Option<QualityStatistics>,
}

/// Resolve the selected interval of `reader` and split it into chunks.
///
/// # Errors
///
/// [`Af2msError::InvalidInterval`] for an invalid interval.
pub fn plan_conversion<R: Read + Seek>(
    reader: &AartfaacFile<R>,
    options: &ConvertOptions,
) -> Result<ConversionPlan, Af2msError> {
    let selection = TimestepSelection::resolve(
        options.interval_start,
        options.interval_end,
        reader.num_timesteps(),
    )?;
    let chunks = plan_chunks(
        selection.len(),
        reader.num_antennas(),
        reader.num_channels(),
        options.memory_bytes,
        selection.timestep_range.start,
        options.rfi_detection,
    );
    Ok(ConversionPlan { selection, chunks })
}

/// The frequency set-up of a file opened with a mode.
///
/// # Errors
///
/// [`Af2msError::UnknownMode`] if the file was opened without one.
pub fn band_setup<R: Read + Seek>(reader: &AartfaacFile<R>) -> Result<BandSetup, Af2msError> {
    reader
        .band()
        .copied()
        .ok_or_else(|| Af2msError::UnknownMode {
            received: format!("(none, {} was opened without a mode)", reader.filename()),
        })
}

/// The phase centre of the run: `manual` if given, otherwise the zenith
/// above the reference antenna at the start of the central selected
/// timestep.
///
/// # Errors
///
/// Any read or geometry error.
pub fn resolve_phase_centre<R: Read + Seek>(
    reader: &mut AartfaacFile<R>,
    layout: &AntennaLayout,
    selection: &TimestepSelection,
    manual: Option<RADec>,
    dut1: Duration,
) -> Result<RADec, Af2msError> {
    if let Some(phase_centre) = manual {
        info!("Using manual phase centre {}", phase_centre);
        return Ok(phase_centre);
    }
    let reference = layout
        .positions
        .first()
        .copied()
        .ok_or(Af2msError::TooFewAntennas {
            expected: 1,
            received: 0,
        })?;
    let centre = selection.centre_timestep();
    reader.seek_to_timestep(centre)?;
    let timestep = reader.read_metadata()?;
    let phase_centre = zenith_phase_centre(reference, timestep.start_epoch(), dut1)?;
    info!(
        "Using zenith at timestep {} as phase centre: {}",
        centre, phase_centre
    );
    Ok(phase_centre)
}

/// The antenna table.
pub fn antenna_infos(layout: &AntennaLayout) -> Vec<AntennaInfo> {
    layout
        .positions
        .iter()
        .enumerate()
        .map(|(idx, &position)| AntennaInfo {
            name: format!("A12_{}", idx),
            station: TELESCOPE_NAME.to_string(),
            antenna_type: "GROUND-BASED".to_string(),
            mount: "ALT-AZ".to_string(),
            position,
            diameter: 1.0,
            flag: false,
        })
        .collect()
}

/// The spectral window of `reader`.
pub fn band_info<R: Read + Seek>(reader: &AartfaacFile<R>) -> BandInfo {
    let width_hz = reader.channel_width();
    BandInfo {
        name: format!("AARTF_BAND_{:.1}", reader.frequency() / 1e6),
        channels: reader
            .channel_freqs_hz()
            .into_iter()
            .map(|frequency_hz| ChannelInfo {
                frequency_hz,
                width_hz,
                effective_bandwidth_hz: width_hz,
                resolution_hz: width_hz,
            })
            .collect(),
        ref_freq_hz: reader.frequency(),
        total_bandwidth_hz: reader.bandwidth(),
    }
}

fn write_metadata<R: Read + Seek, W: VisWriter + ?Sized>(
    reader: &mut AartfaacFile<R>,
    layout: &AntennaLayout,
    writer: &mut W,
    selection: &TimestepSelection,
    phase_centre: RADec,
    command_line: &str,
) -> Result<(), Af2msError> {
    trace!("start write_metadata");
    reader.seek_to_timestep(selection.timestep_range.start)?;
    let start_mjd_s = reader.read_metadata()?.start_mjd_s();
    let duration_s = reader.integration_time() * selection.len() as f64;
    let end_mjd_s = start_mjd_s + duration_s;

    writer.write_antennae(&antenna_infos(layout), start_mjd_s)?;
    writer.write_band_info(&band_info(reader))?;
    writer.write_source(&SourceInfo {
        name: TELESCOPE_NAME.to_string(),
        id: 0,
        time_mjd_s: start_mjd_s,
        interval_s: duration_s,
        direction: phase_centre,
    })?;
    writer.write_field(&FieldInfo {
        name: TELESCOPE_NAME.to_string(),
        delay_direction: phase_centre,
        phase_direction: phase_centre,
        reference_direction: phase_centre,
    })?;
    writer.write_observation(&ObservationInfo {
        telescope_name: TELESCOPE_NAME.to_string(),
        observer: "Unknown".to_string(),
        schedule_type: TELESCOPE_NAME.to_string(),
        project: "Unknown".to_string(),
        start_mjd_s,
        end_mjd_s,
        command_line: command_line.to_string(),
    })?;
    trace!("end write_metadata");
    Ok(())
}

/// Convert the selected timesteps of `reader` and write them to `writer`.
///
/// `reader` must have been opened with a mode. `antennas` needs at least as
/// many positions as the file has antennas; extra positions are ignored.
///
/// Everything ends up in `writer`, which is finalised on success. On error
/// whatever was written so far is left as is.
///
/// # Errors
///
/// Any read, geometry, flagging or write error, and
/// [`Af2msError::InvalidInterval`] or [`Af2msError::TooFewAntennas`] for
/// inconsistent options.
pub fn convert<R, W>(
    reader: &mut AartfaacFile<R>,
    antennas: &AntennaLayout,
    writer: &mut W,
    flagger: &dyn Flagger,
    uvw_service: &dyn UvwService,
    options: &ConvertOptions,
) -> Result<ConvertSummary, Af2msError>
where
    R: Read + Seek,
    W: VisWriter + ?Sized,
{
    trace!("start convert");
    let band = band_setup(reader)?;
    let num_ants = reader.num_antennas();
    let num_chans = reader.num_channels();
    let num_baselines = Baseline::count(num_ants);

    let mut layout = antennas.clone();
    layout.truncate(num_ants)?;
    let plan = plan_conversion(reader, options)?;
    info!(
        "Converting timesteps {:?} in {} chunks of at most {} timesteps",
        plan.selection.timestep_range,
        plan.chunks.num_chunks(),
        plan.chunks.capacity
    );

    let dut1 = Duration::from_seconds(options.dut1_s);
    let phase_centre = resolve_phase_centre(
        reader,
        &layout,
        &plan.selection,
        options.phase_centre,
        dut1,
    )?;
    write_metadata(
        reader,
        &layout,
        writer,
        &plan.selection,
        phase_centre,
        &options.command_line,
    )?;

    let channel_freqs_hz = reader.channel_freqs_hz();
    let corrector = GeometryCorrector::new(
        uvw_service,
        &layout.positions,
        phase_centre,
        &channel_freqs_hz,
        options.rotation,
    );
    let mut assembler = OutputAssembler::new(corrector, vec![reader.channel_width(); num_chans]);
    let mut buffers = BaselineBufferSet::new(num_ants, num_chans, plan.chunks.capacity.max(1));
    let template = QualityStatistics::new(&channel_freqs_hz, num_baselines);
    let mut statistics = template.empty_like();
    let mut num_rows = 0;

    for (chunk_idx, chunk) in plan.chunks.chunks.iter().enumerate() {
        info!(
            "Processing chunk {} of {}: timesteps {:?}",
            chunk_idx + 1,
            plan.chunks.num_chunks(),
            chunk
        );
        if chunk.is_empty() {
            continue;
        }
        let timesteps = with_increment_duration!(
            "read",
            buffers.ingest_chunk(reader, chunk.clone(), options.draw_progress)?
        );
        let processed = with_increment_duration!(
            "flag",
            process_baselines(
                &buffers,
                flagger,
                &template,
                &ProcessOptions {
                    rfi_detection: options.rfi_detection,
                    collect_statistics: options.collect_statistics,
                    num_threads: options.num_threads,
                    first_timestep: chunk.start,
                    draw_progress: options.draw_progress,
                },
            )?
        );
        statistics.merge(&processed.statistics)?;
        with_increment_duration!(
            "write",
            assembler.write_chunk(
                writer,
                &buffers,
                &processed.masks,
                &timesteps,
                options.draw_progress,
            )?
        );
        num_rows += timesteps.len() * num_baselines;
        debug!("{} rows written after chunk {}", num_rows, chunk_idx + 1);
    }

    if options.collect_statistics {
        writer.write_statistics(&statistics)?;
    }
    writer.write_keywords(&AartfaacKeywords {
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: band.mode.number(),
        band_label: band.mode.band_name().to_string(),
        flag_window_size: plan.selection.len() / plan.chunks.num_chunks(),
        axes: layout.axes,
    })?;
    writer.finalise()?;
    info!(
        "Wrote {} rows, start {} MJD s",
        num_rows,
        unix_to_mjd_seconds(reader.start_time())
    );
    trace!("end convert");

    Ok(ConvertSummary {
        plan,
        phase_centre,
        num_rows,
        statistics: options.collect_statistics.then_some(statistics),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        corrections::PrecessionUvw,
        flags::MadFlagger,
        io::{
            aartfaac::AartfaacMode, antenna_config::AntennaConfig, writer::MemoryWriter,
        },
        test_common::{synthetic_antenna_config, synthetic_file},
    };
    use approx::assert_abs_diff_eq;
    use std::io::Cursor;

    const MODE: AartfaacMode = AartfaacMode::LbaOuter10_90;

    fn reader(
        num_ants: usize,
        num_chans: usize,
        num_timesteps: usize,
    ) -> AartfaacFile<Cursor<Vec<u8>>> {
        let bytes = synthetic_file(num_ants, num_chans, num_timesteps, 1_546_300_800., 1.);
        AartfaacFile::from_reader(Cursor::new(bytes), "SB320.vis", Some(MODE)).unwrap()
    }

    fn layout(num_ants: usize) -> AntennaLayout {
        AntennaConfig::parse(&synthetic_antenna_config(num_ants), "test.conf")
            .unwrap()
            .layout(MODE)
            .unwrap()
    }

    fn options() -> ConvertOptionsBuilder {
        let mut builder = ConvertOptionsBuilder::default();
        builder.num_threads(2);
        builder
    }

    #[test]
    fn test_builder_defaults() {
        let options = ConvertOptionsBuilder::default().build().unwrap();
        assert!(!options.rfi_detection);
        assert!(options.collect_statistics);
        assert_eq!(options.interval_end, 0);
        assert_eq!(options.memory_bytes, usize::MAX);
        assert!(options.num_threads >= 1);
        assert_eq!(options.rotation, RotationPath::Vectorized);
    }

    #[test]
    fn test_default_matches_builder() {
        let built = ConvertOptionsBuilder::default().build().unwrap();
        let default = ConvertOptions::default();
        assert_eq!(default.memory_bytes, built.memory_bytes);
        assert_eq!(default.num_threads, built.num_threads);
        assert!(default.num_threads >= 1);
        assert_eq!(default.collect_statistics, built.collect_statistics);
        assert_eq!(default.rfi_detection, built.rfi_detection);
        assert_eq!(default.rotation, built.rotation);

        // an unlimited budget converts everything in one chunk
        let reader = reader(4, 2, 3);
        let plan = plan_conversion(&reader, &default).unwrap();
        assert_eq!(plan.chunks.chunks, vec![0..3]);
        assert!(!plan.chunks.clamped);
    }

    #[test]
    fn test_convert_two_chunks() {
        let (num_ants, num_chans, num_timesteps) = (4, 2, 3);
        let mut reader = reader(num_ants, num_chans, num_timesteps);
        let options = options().memory_bytes(2 * 1440).build().unwrap();
        let mut writer = MemoryWriter::default();
        let summary = convert(
            &mut reader,
            &layout(num_ants),
            &mut writer,
            &MadFlagger::default(),
            &PrecessionUvw::default(),
            &options,
        )
        .unwrap();

        assert_eq!(summary.plan.chunks.chunks, vec![0..1, 1..3]);
        assert_eq!(summary.num_rows, 30);
        assert_eq!(writer.rows.len(), 30);
        assert_eq!(writer.row_batches, vec![10; 3]);
        assert!(writer.finalised);

        let canonical: Vec<_> = Baseline::all(num_ants)
            .into_iter()
            .map(|bl| (bl.ant1, bl.ant2))
            .collect();
        for (timestep, rows) in writer.rows.chunks(10).enumerate() {
            let pairs: Vec<_> = rows.iter().map(|row| (row.antenna1, row.antenna2)).collect();
            assert_eq!(pairs, canonical);
            for row in rows {
                assert_abs_diff_eq!(
                    row.time_mjd_s,
                    unix_to_mjd_seconds(1_546_300_800. + timestep as f64)
                );
                assert!(row.flags.iter().all(|&flag| !flag));
                assert_eq!(row.weights, vec![(195_312.5 / 2.) as f32; 8]);
                assert!(row.data.iter().any(|vis| vis.norm() > 0.));
            }
        }

        let keywords = writer.keywords.unwrap();
        assert_eq!(keywords.mode, 1);
        assert_eq!(keywords.band_label, "LBA");
        assert_eq!(keywords.flag_window_size, 1);
        let statistics = writer.statistics.unwrap();
        assert_eq!(statistics.total().count, 30 * 8);
        assert_eq!(statistics.timesteps().len(), 3);
    }

    #[test]
    fn test_metadata() {
        let mut reader = reader(2, 4, 2);
        let options = options()
            .phase_centre(Some(RADec::from_degrees(10., 50.)))
            .command_line("aartfaac2ms in out conf".to_string())
            .build()
            .unwrap();
        let mut writer = MemoryWriter::default();
        let summary = convert(
            &mut reader,
            &layout(3),
            &mut writer,
            &MadFlagger::default(),
            &PrecessionUvw::default(),
            &options,
        )
        .unwrap();
        assert_abs_diff_eq!(summary.phase_centre.ra, 10f64.to_radians());

        let names: Vec<_> = writer.antennae.iter().map(|ant| ant.name.as_str()).collect();
        assert_eq!(names, vec!["A12_0", "A12_1"]);
        assert!(writer.antennae.iter().all(|ant| ant.mount == "ALT-AZ"));

        // subband 320 of mode 1
        let band = writer.band.unwrap();
        assert_eq!(band.name, "AARTF_BAND_62.5");
        assert_eq!(band.channels.len(), 4);
        let width = 195_312.5 / 4.;
        assert_abs_diff_eq!(
            band.channels[0].frequency_hz,
            62.5e6 - 195_312.5 / 2. + width / 2.
        );
        assert_abs_diff_eq!(band.channels[3].width_hz, width);

        let observation = writer.observation.unwrap();
        assert_eq!(observation.telescope_name, "AARTFAAC");
        assert_eq!(observation.command_line, "aartfaac2ms in out conf");
        assert_abs_diff_eq!(observation.end_mjd_s - observation.start_mjd_s, 2.);
        assert_abs_diff_eq!(writer.source.unwrap().interval_s, 2.);
        assert_abs_diff_eq!(writer.field.unwrap().phase_direction.dec, 50f64.to_radians());
    }

    #[test]
    fn test_interval_and_no_statistics() {
        let mut reader = reader(2, 1, 5);
        let options = options()
            .interval_start(1)
            .interval_end(4)
            .collect_statistics(false)
            .rfi_detection(true)
            .build()
            .unwrap();
        let mut writer = MemoryWriter::default();
        let summary = convert(
            &mut reader,
            &layout(2),
            &mut writer,
            &MadFlagger::default(),
            &PrecessionUvw::default(),
            &options,
        )
        .unwrap();
        assert_eq!(summary.plan.selection.timestep_range, 1..4);
        assert_eq!(summary.plan.chunks.chunks, vec![1..4]);
        assert!(summary.statistics.is_none());
        assert!(writer.statistics.is_none());
        assert_eq!(writer.rows.len(), 3 * 3);
        assert_abs_diff_eq!(
            writer.rows[0].time_mjd_s,
            unix_to_mjd_seconds(1_546_300_801.)
        );
        assert_eq!(writer.keywords.unwrap().flag_window_size, 3);
    }

    #[test]
    fn test_zenith_phase_centre_by_default() {
        let mut reader = reader(2, 1, 3);
        let mut writer = MemoryWriter::default();
        let summary = convert(
            &mut reader,
            &layout(2),
            &mut writer,
            &MadFlagger::default(),
            &PrecessionUvw::default(),
            &options().build().unwrap(),
        )
        .unwrap();
        // the array is at about 52.9 degrees north
        assert_abs_diff_eq!(summary.phase_centre.dec.to_degrees(), 52.9, epsilon = 0.5);
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let mut reader = reader(3, 1, 3);
        let mut writer = MemoryWriter::default();
        let bad_interval = options().interval_start(2).interval_end(2).build().unwrap();
        assert!(matches!(
            convert(
                &mut reader,
                &layout(3),
                &mut writer,
                &MadFlagger::default(),
                &PrecessionUvw::default(),
                &bad_interval,
            ),
            Err(Af2msError::InvalidInterval { .. })
        ));
        assert!(matches!(
            convert(
                &mut reader,
                &layout(2),
                &mut writer,
                &MadFlagger::default(),
                &PrecessionUvw::default(),
                &options().build().unwrap(),
            ),
            Err(Af2msError::TooFewAntennas { .. })
        ));
        assert!(writer.rows.is_empty());

        let bytes = synthetic_file(2, 1, 1, 1_546_300_800., 1.);
        let mut unbanded = AartfaacFile::from_reader(Cursor::new(bytes), "raw.vis", None).unwrap();
        assert!(matches!(
            convert(
                &mut unbanded,
                &layout(2),
                &mut writer,
                &MadFlagger::default(),
                &PrecessionUvw::default(),
                &options().build().unwrap(),
            ),
            Err(Af2msError::UnknownMode { .. })
        ));
    }
}
