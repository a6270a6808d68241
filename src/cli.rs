//! Command Line Interface helpers for aartfaac2ms

use crate::{
    chunking::bytes_per_timestep,
    corrections::{PrecessionUvw, RotationPath},
    error::{
        Af2msError::{self, ClapError, DryRun},
        CLIError::InvalidCommandLineArgument,
    },
    flags::MadFlagger,
    get_durations,
    io::{
        aartfaac::{AartfaacFile, AartfaacMode},
        antenna_config::AntennaLayout,
        averaging::AveragingWriter,
        table::TableWriter,
        writer::VisWriter,
        IOContext,
    },
    marlu::{hifitime::Epoch, RADec},
    pipeline::{convert, plan_conversion, ConversionPlan, ConvertOptions, ConvertSummary},
    types::Baseline,
    with_increment_duration,
};
use clap::{arg, command, ErrorKind::ArgumentNotFound, ValueHint::FilePath};
use log::{debug, info, trace};
use prettytable::{cell, format as prettyformat, row, table};
use std::{
    ffi::OsString,
    fmt::{Debug, Display},
    time::Duration,
};
use sysinfo::System;

/// Everything needed to run a conversion from the command line.
pub struct Af2msContext {
    /// Input / output paths
    pub io_ctx: IOContext,
    /// Receiver mode of the observation
    pub mode: AartfaacMode,
    /// The opened input file
    pub reader: AartfaacFile,
    /// Antenna positions and axes of the mode's band
    pub layout: AntennaLayout,
    /// Conversion parameters
    pub convert_opts: ConvertOptions,
    /// The selection and its chunks
    pub plan: ConversionPlan,
    /// Sensitivity of the built-in flagger
    pub flag_threshold: f64,
    /// temporal averaging factor
    pub avg_time: usize,
    /// spectral averaging factor
    pub avg_freq: usize,
}

// Add build-time information from the "built" crate.
include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Write a few lines describing how this executable was compiled.
///
/// # Errors
///
/// propagates writeln! fails
pub fn fmt_build_info(f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match GIT_HEAD_REF {
        Some(hr) => {
            let dirty = GIT_DIRTY.unwrap_or(false);
            writeln!(
                f,
                "Compiled on git commit hash: {}{}",
                GIT_COMMIT_HASH.unwrap_or("<unknown>"),
                if dirty { " (dirty)" } else { "" }
            )?;
            writeln!(f, "            git head ref: {}", hr)?;
        }
        None => writeln!(f, "Compiled on git commit hash: <no git info>")?,
    }
    writeln!(f, "            {}", BUILT_TIME_UTC)?;
    writeln!(f, "         with compiler {}", RUSTC_VERSION)?;
    writeln!(f)?;
    Ok(())
}

fn gib(bytes: usize) -> f64 {
    bytes as f64 / 1024.0_f64.powi(3)
}

impl Display for Af2msContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} version {}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )?;

        fmt_build_info(f)?;

        writeln!(f, "Input file:           {}", self.io_ctx.vis_in)?;
        writeln!(f, "Antenna config:       {}", self.io_ctx.antenna_conf_in)?;
        writeln!(f, "Output table:         {}", self.io_ctx.table_out)?;
        writeln!(f, "Mode:                 {} ({})", self.mode.number(), self.mode)?;
        writeln!(
            f,
            "Geometry:             {} antennas, {} baselines, {} channels, {} timesteps",
            self.reader.num_antennas(),
            Baseline::count(self.reader.num_antennas()),
            self.reader.num_channels(),
            self.reader.num_timesteps(),
        )?;
        writeln!(
            f,
            "Frequency:            {:.3} MHz, bandwidth {:.3} kHz, channel width {:.3} kHz",
            self.reader.frequency() / 1e6,
            self.reader.bandwidth() / 1e3,
            self.reader.channel_width() / 1e3,
        )?;

        let start_unix = self.reader.start_time();
        let integration_s = self.reader.integration_time();
        let selection = &self.plan.selection.timestep_range;
        writeln!(
            f,
            "Time range:           {} UTC, unix={:.3}, integration {:.3} s",
            Epoch::from_unix_seconds(start_unix),
            start_unix,
            integration_s,
        )?;
        writeln!(
            f,
            "Selected timesteps:   {}..{} of {}",
            selection.start,
            selection.end,
            self.reader.num_timesteps()
        )?;
        match self.convert_opts.phase_centre {
            Some(phase_centre) => writeln!(f, "Phase centre:         {}", phase_centre)?,
            None => writeln!(
                f,
                "Phase centre:         zenith at timestep {}",
                self.plan.selection.centre_timestep()
            )?,
        }

        let bytes_per_ts = bytes_per_timestep(self.reader.num_antennas(), self.reader.num_channels());
        writeln!(
            f,
            "Estimated memory per timestep = {:7.04} GiB, selected = {:7.04} GiB, available = {:7.04} GiB",
            gib(bytes_per_ts),
            gib(self.plan.selection.estimate_bytes(
                self.reader.num_antennas(),
                self.reader.num_channels()
            )),
            gib(self.convert_opts.memory_bytes),
        )?;

        let mut chunk_table = table!(["", "start", "end", "timesteps", "start unix [s]"]);
        chunk_table.set_format(*prettyformat::consts::FORMAT_CLEAN);
        for (chunk_idx, chunk) in self.plan.chunks.chunks.iter().enumerate() {
            chunk_table.add_row(row![r =>
                format!("chunk{}:", chunk_idx),
                chunk.start,
                chunk.end,
                chunk.len(),
                format!("{:.3}", start_unix + chunk.start as f64 * integration_s)
            ]);
        }
        writeln!(
            f,
            "Chunk details (chunks={}, max per chunk={}):\n{}",
            self.plan.chunks.num_chunks(),
            self.plan.chunks.max_timesteps_per_chunk,
            chunk_table
        )?;

        if self.avg_time > 1 || self.avg_freq > 1 {
            writeln!(
                f,
                "Will average {} timesteps and {} channels.",
                self.avg_time, self.avg_freq
            )?;
        }
        if self.convert_opts.rfi_detection {
            writeln!(f, "Flagging threshold:   {} sigma", self.flag_threshold)?;
        }
        writeln!(f, "Conversion options: \n{}", &self.convert_opts)?;

        Ok(())
    }
}

fn invalid_arg(option: &str, expected: &str, received: impl Display) -> Af2msError {
    Af2msError::CLIError(InvalidCommandLineArgument {
        option: option.into(),
        expected: expected.into(),
        received: received.to_string(),
    })
}

impl Af2msContext {
    fn get_matches<I, T>(args: I) -> Result<clap::ArgMatches, Af2msError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        let mut app = command!()
            .arg_required_else_help(true)
            .next_line_help(false)
            .about("Convert raw AARTFAAC correlator visibilities into flagged, \
                    corrected and weighted visibility tables.")
            .args(&[
                // input options
                arg!(<VIS> "Raw visibility file, its name must contain the subband (e.g. SB320)")
                    .value_hint(FilePath)
                    .help_heading("INPUT"),
                arg!(<OUTPUT> "Output table directory")
                    .value_hint(FilePath)
                    .help_heading("OUTPUT"),
                arg!(<ANTENNA_CONF> "Antenna field configuration file")
                    .value_hint(FilePath)
                    .help_heading("INPUT"),
                arg!(--mode <MODE> "Receiver (RCU) mode, 1-7")
                    .help_heading("INPUT"),

                // processing options
                arg!(--"phase-centre" "Override the zenith phase centre (degrees)")
                    .value_names(&["RA", "DEC"])
                    .allow_hyphen_values(true)
                    .required(false),
                arg!(--"scalar-rotation" "Do not use the vectorized phase rotation"),
                arg!(--"dry-run" "Just print the summary and exit"),
                arg!(--"no-draw-progress" "do not show progress bars"),

                // selection options
                arg!(--interval "Timestep index range (exclusive end) to convert, END 0 means all")
                    .help_heading("SELECTION")
                    .value_names(&["START", "END"])
                    .required(false),

                // flagging options
                arg!(--flag "Flag cross-correlations with the built-in flagger")
                    .help_heading("FLAGGING"),
                arg!(--"no-flag" "Do not flag")
                    .help_heading("FLAGGING")
                    .overrides_with("flag"),
                arg!(--"flag-threshold" <SIGMA> "Deviation from the median, in robust standard deviations, above which a sample is flagged")
                    .help_heading("FLAGGING")
                    .required(false),
                arg!(--"no-statistics" "Do not collect quality statistics")
                    .help_heading("FLAGGING"),

                // averaging
                arg!(--"time-avg" <FACTOR> "Average <FACTOR> timesteps per averaged timestep")
                    .help_heading("AVERAGING")
                    .required(false),
                arg!(--"freq-avg" <FACTOR> "Average <FACTOR> channels per averaged channel")
                    .help_heading("AVERAGING")
                    .required(false),

                // resource limit options
                arg!(--mem <PERCENT> "Use at most <PERCENT> of the total system memory [default: 50]")
                    .help_heading("RESOURCE LIMITS")
                    .required(false)
                    .conflicts_with("max-memory"),
                arg!(--"max-memory" <GIBIBYTES> "Use at most <GIBIBYTES> GiB for the baseline buffers")
                    .help_heading("RESOURCE LIMITS")
                    .required(false),
                arg!(--threads <COUNT> "Number of flagging threads [default: all cores]")
                    .help_heading("RESOURCE LIMITS")
                    .required(false),
            ]);
        let matches = app.try_get_matches_from_mut(args)?;
        Ok(matches)
    }

    fn parse_io_matches(matches: &clap::ArgMatches) -> IOContext {
        IOContext {
            vis_in: match matches.value_of_t("VIS") {
                Ok(path) => path,
                _ => unreachable!("<VIS> is required, enforced by clap"),
            },
            antenna_conf_in: match matches.value_of_t("ANTENNA_CONF") {
                Ok(path) => path,
                _ => unreachable!("<ANTENNA_CONF> is required, enforced by clap"),
            },
            table_out: match matches.value_of_t("OUTPUT") {
                Ok(path) => path,
                _ => unreachable!("<OUTPUT> is required, enforced by clap"),
            },
        }
    }

    fn parse_mode_matches(matches: &clap::ArgMatches) -> Result<AartfaacMode, Af2msError> {
        let mode = matches.value_of_t::<u8>("mode")?;
        AartfaacMode::try_from(mode)
    }

    fn parse_interval_matches(matches: &clap::ArgMatches) -> Result<(usize, usize), Af2msError> {
        match matches
            .values_of_t::<usize>("interval")
            .map(|v| (v[0], v[1]))
        {
            Err(err) if err.kind() != ArgumentNotFound => Err(err.into()),
            Ok(interval) => Ok(interval),
            Err(_) => Ok((0, 0)),
        }
    }

    fn parse_phase_centre_matches(
        matches: &clap::ArgMatches,
    ) -> Result<Option<RADec>, Af2msError> {
        match matches
            .values_of_t::<f64>("phase-centre")
            .map(|v| (v[0], v[1]))
        {
            Err(err) if err.kind() != ArgumentNotFound => Err(err.into()),
            Ok((ra, dec)) => {
                if !(-90.0..=90.0).contains(&dec) {
                    return Err(invalid_arg(
                        "--phase-centre <RA> <DEC>",
                        "a declination between -90 and 90 degrees",
                        dec,
                    ));
                }
                Ok(Some(RADec::from_degrees(ra, dec)))
            }
            Err(_) => Ok(None),
        }
    }

    fn parse_avg_matches(matches: &clap::ArgMatches) -> Result<(usize, usize), Af2msError> {
        let mut factors = [1, 1];
        for (factor, option) in factors.iter_mut().zip(["time-avg", "freq-avg"]) {
            match matches.value_of_t::<usize>(option) {
                Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
                Ok(0) => {
                    return Err(invalid_arg(
                        &format!("--{} <FACTOR>", option),
                        "a positive integer",
                        0,
                    ))
                }
                Ok(value) => *factor = value,
                Err(_) => {}
            }
        }
        Ok((factors[0], factors[1]))
    }

    fn parse_memory_matches(matches: &clap::ArgMatches) -> Result<usize, Af2msError> {
        match (
            matches.value_of_t::<f64>("mem"),
            matches.value_of_t::<f64>("max-memory"),
        ) {
            // filter any errors other than ArgumentNotFound
            (Err(err), _) if err.kind() != ArgumentNotFound => Err(err.into()),
            (_, Err(err)) if err.kind() != ArgumentNotFound => Err(err.into()),
            (Ok(_), Ok(_)) => {
                unreachable!("--mem conflicts with --max-memory, enforced by clap")
            }
            (_, Ok(mem_gib)) => {
                let max_mem_bytes = mem_gib * 1024.0_f64.powi(3);
                if max_mem_bytes < 1.0 {
                    return Err(invalid_arg(
                        "--max-memory <GIBIBYTES>",
                        "at least one Byte",
                        format!("{}B", max_mem_bytes),
                    ));
                }
                Ok(max_mem_bytes as usize)
            }
            (percent, _) => {
                let percent = percent.unwrap_or(50.0);
                if !(percent > 0.0 && percent <= 100.0) {
                    return Err(invalid_arg(
                        "--mem <PERCENT>",
                        "a percentage in (0, 100]",
                        percent,
                    ));
                }
                let mut sys = System::new();
                sys.refresh_memory();
                let total_bytes = sys.total_memory();
                debug!("total system memory: {} bytes", total_bytes);
                Ok((total_bytes as f64 * percent / 100.0) as usize)
            }
        }
    }

    fn parse_convert_matches(
        matches: &clap::ArgMatches,
        command_line: String,
    ) -> Result<(ConvertOptions, f64), Af2msError> {
        let (interval_start, interval_end) = Self::parse_interval_matches(matches)?;
        let mut convert_opts = ConvertOptions {
            rfi_detection: matches.is_present("flag") && !matches.is_present("no-flag"),
            collect_statistics: !matches.is_present("no-statistics"),
            interval_start,
            interval_end,
            phase_centre: Self::parse_phase_centre_matches(matches)?,
            memory_bytes: Self::parse_memory_matches(matches)?,
            rotation: if matches.is_present("scalar-rotation") {
                RotationPath::Scalar
            } else {
                RotationPath::Vectorized
            },
            command_line,
            draw_progress: !matches.is_present("no-draw-progress"),
            ..ConvertOptions::default()
        };
        convert_opts.num_threads = match matches.value_of_t::<usize>("threads") {
            Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
            Ok(0) => return Err(invalid_arg("--threads <COUNT>", "at least one thread", 0)),
            Ok(count) => count,
            Err(_) => crate::rayon::current_num_threads().max(1),
        };
        let flag_threshold = match matches.value_of_t::<f64>("flag-threshold") {
            Err(err) if err.kind() != ArgumentNotFound => return Err(err.into()),
            Ok(sigma) if sigma.is_finite() && sigma > 0.0 => sigma,
            Ok(sigma) => {
                return Err(invalid_arg(
                    "--flag-threshold <SIGMA>",
                    "a positive number",
                    sigma,
                ))
            }
            Err(_) => MadFlagger::default().threshold,
        };
        Ok((convert_opts, flag_threshold))
    }

    /// Parse an iterator of arguments, `args` into an `Af2msContext`.
    ///
    /// # Errors
    ///
    /// Can raise:
    /// - `clap::Error` if clap cannot parse `args`
    /// - `IOError` if the input files can't be opened or are invalid.
    /// - `Af2msError::CLIError` if the arguments are invalid.
    /// - `Af2msError::DryRun` if `--dry-run` was given, after the summary
    ///   has been logged.
    pub fn from_args<I, T>(args: I) -> Result<Self, Af2msError>
    where
        I: IntoIterator<Item = T> + Debug,
        T: Into<OsString> + Clone,
    {
        debug!("args:\n{:?}", &args);
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let arg_strings: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        let command_line = shlex::try_join(arg_strings.iter().map(String::as_str))
            .unwrap_or_else(|_| arg_strings.join(" "));

        let matches = Self::get_matches(args)?;
        trace!("arg matches:\n{:?}", &matches);

        let io_ctx = Self::parse_io_matches(&matches);
        let mode = Self::parse_mode_matches(&matches)?;
        let (avg_time, avg_freq) = Self::parse_avg_matches(&matches)?;
        let (convert_opts, flag_threshold) = Self::parse_convert_matches(&matches, command_line)?;

        let (reader, layout) = with_increment_duration!("init", {
            let reader = io_ctx.open_vis(mode)?;
            let layout = io_ctx.read_layout(mode)?;
            (reader, layout)
        });
        let plan = plan_conversion(&reader, &convert_opts)?;

        let result = Self {
            io_ctx,
            mode,
            reader,
            layout,
            convert_opts,
            plan,
            flag_threshold,
            avg_time,
            avg_freq,
        };

        info!("{}", &result);

        if matches.is_present("dry-run") {
            return Err(DryRun {});
        }

        Ok(result)
    }

    /// Convert the input file, writing the output table.
    ///
    /// # Errors
    ///
    /// Any error of [`convert`], or of creating the output.
    pub fn run(self) -> Result<ConvertSummary, Af2msError> {
        let Af2msContext {
            io_ctx,
            mut reader,
            layout,
            convert_opts,
            flag_threshold,
            avg_time,
            avg_freq,
            ..
        } = self;

        let table = TableWriter::create(&io_ctx.table_out)?;
        let mut writer: Box<dyn VisWriter> = if avg_time > 1 || avg_freq > 1 {
            Box::new(AveragingWriter::new(table, avg_time, avg_freq)?)
        } else {
            Box::new(table)
        };
        convert(
            &mut reader,
            &layout,
            writer.as_mut(),
            &MadFlagger::new(flag_threshold),
            &PrecessionUvw::default(),
            &convert_opts,
        )
    }
}

/// Parse `args`, run the conversion and log the stage durations. Returns the
/// exit code of the process.
pub fn main_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    I: Debug,
{
    let af2ms_ctx = match Af2msContext::from_args(args) {
        Ok(af2ms_ctx) => af2ms_ctx,
        Err(DryRun {}) => {
            info!("Dry run. No files will be written.");
            return 0;
        }
        Err(ClapError(inner)) => {
            // Swallow broken pipe errors
            trace!("clap error: {:?}", inner.kind());
            let _ = inner.print();
            match inner.kind() {
                clap::ErrorKind::DisplayHelp | clap::ErrorKind::DisplayVersion => return 0,
                _ => return 1,
            }
        }
        Err(e) => {
            eprintln!("error parsing args: {e}");
            return 1;
        }
    };

    let bytes_selected = af2ms_ctx.plan.selection.estimate_bytes(
        af2ms_ctx.reader.num_antennas(),
        af2ms_ctx.reader.num_channels(),
    );

    match af2ms_ctx.run() {
        Ok(summary) => {
            info!(
                "total duration: {:?}",
                get_durations().into_iter().fold(
                    Duration::ZERO,
                    |duration_sum, (name, duration)| {
                        info!("{} duration: {:?}", name, duration);
                        duration_sum + duration
                    }
                )
            );
            if let Some(read_time) = get_durations().get("read") {
                info!(
                    "Estimated data read = {:7.04} GiB @ {:8.03} MiB/s",
                    gib(bytes_selected),
                    (bytes_selected / 1024_usize.pow(2)) as f32 / read_time.as_secs_f32()
                );
            }
            info!("{} rows written", summary.num_rows);
            if let Some(statistics) = summary.statistics {
                info!("quality statistics: {}", statistics);
            }
            0
        }
        Err(e) => {
            eprintln!("conversion error: {e}");
            1
        }
    }
}


#[cfg(test)]
mod argparse_tests {
    use std::path::PathBuf;

    use approx::assert_abs_diff_eq;
    use tempfile::{tempdir, TempDir};

    use crate::{
        corrections::RotationPath,
        error::Af2msError,
        io::error::IOError,
        test_common::{synthetic_antenna_config, write_synthetic_file},
    };

    use super::Af2msContext;

    struct Fixture {
        _dir: TempDir,
        vis: PathBuf,
        conf: PathBuf,
        out: PathBuf,
    }

    impl Fixture {
        fn new(num_timesteps: usize) -> Self {
            let dir = tempdir().unwrap();
            let vis = write_synthetic_file(dir.path(), "SB320.vis", 3, 2, num_timesteps);
            let conf = dir.path().join("antennas.conf");
            std::fs::write(&conf, synthetic_antenna_config(3)).unwrap();
            let out = dir.path().join("out.table");
            Self {
                _dir: dir,
                vis,
                conf,
                out,
            }
        }

        fn args<'a>(&'a self, extra: &[&'a str]) -> Vec<&'a str> {
            let mut args = vec![
                "aartfaac2ms",
                self.vis.to_str().unwrap(),
                self.out.to_str().unwrap(),
                self.conf.to_str().unwrap(),
            ];
            args.extend_from_slice(extra);
            args
        }
    }

    #[test]
    fn test_parse_missing_input() {
        let fixture = Fixture::new(2);

        // no antenna config
        let args = vec![
            "aartfaac2ms",
            fixture.vis.to_str().unwrap(),
            fixture.out.to_str().unwrap(),
            "--mode",
            "1",
        ];
        match Af2msContext::from_args(&args) {
            Err(Af2msError::ClapError(inner)) => assert!(matches!(
                inner.kind(),
                clap::error::ErrorKind::MissingRequiredArgument { .. }
            )),
            Err(e) => panic!("expected missing required argument error, not {}", e),
            Ok(_) => panic!("expected error, but got Ok(_)"),
        }

        // no mode
        match Af2msContext::from_args(&fixture.args(&[])) {
            Err(Af2msError::ClapError(inner)) => assert!(matches!(
                inner.kind(),
                clap::error::ErrorKind::MissingRequiredArgument { .. }
            )),
            Err(e) => panic!("expected missing required argument error, not {}", e),
            Ok(_) => panic!("expected error, but got Ok(_)"),
        }
    }

    #[test]
    fn test_parse_invalid_input() {
        let fixture = Fixture::new(2);
        let args = vec![
            "aartfaac2ms",
            "nonexistent_SB001.vis",
            fixture.out.to_str().unwrap(),
            fixture.conf.to_str().unwrap(),
            "--mode",
            "1",
        ];
        assert!(matches!(
            Af2msContext::from_args(&args),
            Err(Af2msError::IOError(IOError::StdIo(_)))
        ));
    }

    #[test]
    fn test_parse_invalid_mode() {
        let fixture = Fixture::new(2);
        for mode in ["0", "8"] {
            assert!(matches!(
                Af2msContext::from_args(&fixture.args(&["--mode", mode])),
                Err(Af2msError::UnknownMode { .. })
            ));
        }
        assert!(matches!(
            Af2msContext::from_args(&fixture.args(&["--mode", "lba"])),
            Err(Af2msError::ClapError(_))
        ));
    }

    #[test]
    fn test_parse_mode_sets_frequency() {
        let fixture = Fixture::new(2);
        let af2ms_ctx = Af2msContext::from_args(&fixture.args(&["--mode", "5"])).unwrap();
        // subband 320 in the 100-200 MHz zone
        assert_abs_diff_eq!(af2ms_ctx.reader.frequency(), 162.5e6);
        assert_eq!(af2ms_ctx.layout.positions.len(), 3);
    }

    #[test]
    fn test_parse_invalid_interval() {
        let fixture = Fixture::new(4);
        for (start, end) in [("2", "2"), ("3", "1"), ("0", "5")] {
            assert!(matches!(
                Af2msContext::from_args(&fixture.args(&["--mode", "1", "--interval", start, end])),
                Err(Af2msError::InvalidInterval { .. })
            ));
        }
    }

    #[test]
    fn test_parse_valid_interval() {
        let fixture = Fixture::new(4);
        let af2ms_ctx =
            Af2msContext::from_args(&fixture.args(&["--mode", "1", "--interval", "1", "0"]))
                .unwrap();
        assert_eq!(af2ms_ctx.plan.selection.timestep_range, 1..4);
        assert_eq!(af2ms_ctx.plan.chunks.chunks, vec![1..4]);
    }

    #[test]
    fn test_parse_phase_centre() {
        let fixture = Fixture::new(2);
        let af2ms_ctx = Af2msContext::from_args(&fixture.args(&[
            "--mode",
            "1",
            "--phase-centre",
            "350.85",
            "58.815",
        ]))
        .unwrap();
        let phase_centre = af2ms_ctx.convert_opts.phase_centre.unwrap();
        assert_abs_diff_eq!(phase_centre.ra.to_degrees(), 350.85, epsilon = 1e-10);
        assert_abs_diff_eq!(phase_centre.dec.to_degrees(), 58.815, epsilon = 1e-10);

        assert!(matches!(
            Af2msContext::from_args(&fixture.args(&[
                "--mode",
                "1",
                "--phase-centre",
                "0",
                "91"
            ])),
            Err(Af2msError::CLIError(_))
        ));
    }

    #[test]
    fn test_parse_flagging() {
        let fixture = Fixture::new(2);
        let default = Af2msContext::from_args(&fixture.args(&["--mode", "1"])).unwrap();
        assert!(!default.convert_opts.rfi_detection);
        assert!(default.convert_opts.collect_statistics);
        assert_abs_diff_eq!(default.flag_threshold, 5.0);

        let flagged = Af2msContext::from_args(&fixture.args(&[
            "--mode",
            "1",
            "--flag",
            "--flag-threshold",
            "3.5",
            "--no-statistics",
        ]))
        .unwrap();
        assert!(flagged.convert_opts.rfi_detection);
        assert!(!flagged.convert_opts.collect_statistics);
        assert_abs_diff_eq!(flagged.flag_threshold, 3.5);

        let overridden =
            Af2msContext::from_args(&fixture.args(&["--mode", "1", "--flag", "--no-flag"]))
                .unwrap();
        assert!(!overridden.convert_opts.rfi_detection);

        assert!(matches!(
            Af2msContext::from_args(&fixture.args(&["--mode", "1", "--flag-threshold", "0"])),
            Err(Af2msError::CLIError(_))
        ));
    }

    #[test]
    fn test_parse_invalid_avg() {
        let fixture = Fixture::new(2);
        for option in ["--time-avg", "--freq-avg"] {
            assert!(matches!(
                Af2msContext::from_args(&fixture.args(&["--mode", "1", option, "0"])),
                Err(Af2msError::CLIError(_))
            ));
        }
    }

    #[test]
    fn test_parse_valid_avg() {
        let fixture = Fixture::new(2);
        let af2ms_ctx = Af2msContext::from_args(&fixture.args(&[
            "--mode",
            "1",
            "--time-avg",
            "2",
            "--freq-avg",
            "3",
        ]))
        .unwrap();
        assert_eq!((af2ms_ctx.avg_time, af2ms_ctx.avg_freq), (2, 3));
    }

    #[test]
    fn test_parse_memory() {
        let fixture = Fixture::new(2);
        let max_memory =
            Af2msContext::from_args(&fixture.args(&["--mode", "1", "--max-memory", "2"]))
                .unwrap();
        assert_eq!(max_memory.convert_opts.memory_bytes, 2 * 1024_usize.pow(3));

        let percent = Af2msContext::from_args(&fixture.args(&["--mode", "1", "--mem", "10"]))
            .unwrap();
        assert!(percent.convert_opts.memory_bytes > 0);

        for extra in [
            ["--mem", "0"],
            ["--mem", "101"],
            ["--max-memory", "0.0000000000000001"],
        ] {
            let mut args = vec!["--mode", "1"];
            args.extend_from_slice(&extra);
            assert!(matches!(
                Af2msContext::from_args(&fixture.args(&args)),
                Err(Af2msError::CLIError(_))
            ));
        }

        assert!(matches!(
            Af2msContext::from_args(&fixture.args(&[
                "--mode",
                "1",
                "--mem",
                "10",
                "--max-memory",
                "1"
            ])),
            Err(Af2msError::ClapError(_))
        ));
    }

    #[test]
    fn test_parse_threads_and_rotation() {
        let fixture = Fixture::new(2);
        let af2ms_ctx = Af2msContext::from_args(&fixture.args(&[
            "--mode",
            "1",
            "--threads",
            "3",
            "--scalar-rotation",
        ]))
        .unwrap();
        assert_eq!(af2ms_ctx.convert_opts.num_threads, 3);
        assert_eq!(af2ms_ctx.convert_opts.rotation, RotationPath::Scalar);
        assert!(af2ms_ctx.convert_opts.command_line.contains("--scalar-rotation"));

        assert!(matches!(
            Af2msContext::from_args(&fixture.args(&["--mode", "1", "--threads", "0"])),
            Err(Af2msError::CLIError(_))
        ));
    }

    #[test]
    fn test_parse_dry_run() {
        let fixture = Fixture::new(2);
        assert!(matches!(
            Af2msContext::from_args(&fixture.args(&["--mode", "1", "--dry-run"])),
            Err(Af2msError::DryRun {})
        ));
    }
}
