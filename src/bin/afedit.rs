use aartfaac2ms::{
    constants::AARTFAAC_ITRF_XYZ,
    corrections::earth_position,
    error::{
        Af2msError::{self, ClapError},
        CLIError::InvalidCommandLineArgument,
    },
    hifitime::{Duration, Epoch},
    io::error::IOError,
    marlu::XyzGeocentric,
    selection::{select_by_time, TimeRange},
    AartfaacFile,
};
use clap::{
    arg, command,
    ErrorKind::{ArgumentNotFound, DisplayHelp, DisplayVersion},
    ValueHint::FilePath,
};
use log::{debug, info, trace};
use std::{
    env,
    ffi::OsString,
    fmt::Debug,
    fs::File,
    io::{BufWriter, Write},
};

fn get_matches<I, T>(args: I) -> Result<clap::ArgMatches, Af2msError>
where
    I: IntoIterator<Item = T> + Debug,
    T: Into<OsString> + Clone,
{
    let mut app = command!()
        .name("afedit")
        .arg_required_else_help(true)
        .about("Show the time range of a raw AARTFAAC visibility file, or copy a time range of it to a new file.")
        .args(&[
            arg!(<INPUT> "Raw visibility file")
                .value_hint(FilePath),
            arg!([OUTPUT] "Where to write the selected timesteps")
                .value_hint(FilePath),
            arg!(--"trim-start" <COUNT> "Skip the first <COUNT> timesteps")
                .help_heading("SELECTION")
                .required(false),
            arg!(--"trim-end" <COUNT> "Skip the last <COUNT> timesteps")
                .help_heading("SELECTION")
                .required(false),
            arg!(--"lst-start" <HOURS> "Keep timesteps from this local sidereal time")
                .help_heading("SELECTION")
                .required(false),
            arg!(--"lst-end" <HOURS> "Keep timesteps until this local sidereal time")
                .help_heading("SELECTION")
                .required(false),
            arg!(--"utc-start" <TIME> "Keep timesteps from this UTC time, e.g. 2019-01-01T00:00:00")
                .help_heading("SELECTION")
                .required(false),
            arg!(--"utc-end" <TIME> "Keep timesteps until this UTC time")
                .help_heading("SELECTION")
                .required(false),
            arg!(--"show-lst" "Only print the time range, don't write anything"),
        ]);
    Ok(app.try_get_matches_from_mut(args)?)
}

fn parse_or<T>(matches: &clap::ArgMatches, name: &str, default: T) -> Result<T, Af2msError>
where
    T: std::str::FromStr,
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    match matches.value_of_t::<T>(name) {
        Err(err) if err.kind() != ArgumentNotFound => Err(err.into()),
        Ok(value) => Ok(value),
        Err(_) => Ok(default),
    }
}

fn parse_utc(matches: &clap::ArgMatches, name: &str, default: f64) -> Result<f64, Af2msError> {
    match matches.value_of(name) {
        None => Ok(default),
        Some(text) => {
            let with_scale = if text.contains("UTC") {
                text.to_string()
            } else {
                format!("{} UTC", text)
            };
            Epoch::from_gregorian_str(&with_scale)
                .map(|epoch| epoch.to_unix_seconds())
                .map_err(|e| {
                    InvalidCommandLineArgument {
                        option: format!("--{} <TIME>", name),
                        expected: format!("an ISO 8601 time ({})", e),
                        received: text.to_string(),
                    }
                    .into()
                })
        }
    }
}

fn run<I, T>(args: I) -> Result<(), Af2msError>
where
    I: IntoIterator<Item = T> + Debug,
    T: Into<OsString> + Clone,
{
    let matches = get_matches(args)?;
    trace!("arg matches:\n{:?}", &matches);

    let input: String = match matches.value_of_t("INPUT") {
        Ok(path) => path,
        _ => unreachable!("<INPUT> is required, enforced by clap"),
    };
    let mut reader = AartfaacFile::open_unbanded(&input)?;
    let num_timesteps = reader.num_timesteps();
    info!(
        "{}: {} antennas, {} channels, {} timesteps",
        input,
        reader.num_antennas(),
        reader.num_channels(),
        num_timesteps
    );

    let trim_start: usize = parse_or(&matches, "trim-start", 0)?;
    let trim_end: usize = parse_or(&matches, "trim-end", 0)?;
    let scan = trim_start..num_timesteps.saturating_sub(trim_end);
    let lst_range = TimeRange::new(
        parse_or(&matches, "lst-start", 0.0)?,
        parse_or(&matches, "lst-end", 24.0)?,
    );
    let utc_range = TimeRange::new(
        parse_utc(&matches, "utc-start", f64::MIN)?,
        parse_utc(&matches, "utc-end", f64::MAX)?,
    );
    debug!("scanning {:?}, LST {:?}, UTC {:?}", scan, lst_range, utc_range);

    let array_pos = earth_position(XyzGeocentric {
        x: AARTFAAC_ITRF_XYZ[0],
        y: AARTFAAC_ITRF_XYZ[1],
        z: AARTFAAC_ITRF_XYZ[2],
    })?;
    let result = select_by_time(
        &mut reader,
        scan,
        lst_range,
        utc_range,
        array_pos,
        Duration::from_seconds(0.),
    )?;
    println!("UTC range: {} - {}", result.first_utc, result.last_utc);
    println!(
        "LST range: {:.4} - {:.4} h",
        result.first_lst_hours, result.last_lst_hours
    );

    if matches.is_present("show-lst") {
        return Ok(());
    }

    let selection = result.selection.ok_or(Af2msError::InvalidInterval {
        start: 0,
        end: 0,
        num_timesteps,
    })?;
    println!(
        "Selected timesteps {} - {} ({} timesteps)",
        selection.start,
        selection.end,
        selection.len()
    );
    let output: String = match matches.value_of_t("OUTPUT") {
        Ok(path) => path,
        Err(_) => {
            return Err(InvalidCommandLineArgument {
                option: "<OUTPUT>".into(),
                expected: "an output path, unless --show-lst is given".into(),
                received: "nothing".into(),
            }
            .into())
        }
    };
    let mut writer = BufWriter::new(File::create(&output).map_err(IOError::from)?);
    reader.copy_timesteps(selection, &mut writer)?;
    writer.flush().map_err(IOError::from)?;
    info!("wrote {}", output);
    Ok(())
}

fn main_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T> + Debug,
    T: Into<OsString> + Clone,
{
    match run(args) {
        Ok(()) => 0,
        Err(ClapError(inner)) => {
            trace!("clap error: {:?}", inner.kind());
            let _ = inner.print();
            match inner.kind() {
                DisplayHelp | DisplayVersion => 0,
                _ => 1,
            }
        }
        Err(e) => {
            eprintln!("afedit error: {e}");
            1
        }
    }
}

fn main() {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    trace!("start main");
    let retcode = main_with_args(env::args());
    trace!("end main");
    std::process::exit(retcode);
}
