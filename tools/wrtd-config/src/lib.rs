//! Shared plumbing of the configuration front-ends.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use libwrtd::{CharDev, LogReader, WrtdInput, WrtdOutput};
use wrtd_common::{LogLevel, TriggerId, TriggerMode};

/// Directory the driver populates with per-slot devices.
pub const DEV_DIR: &str = "/dev/wrtd";

fn dev_path(device: u32, dir: char, slot: u32) -> PathBuf {
    PathBuf::from(format!("{DEV_DIR}/wrtd-{device:04x}-hmq-{dir}-{slot:02}"))
}

/// Opens the input-personality control channel of `device`.
///
/// # Errors
///
/// Any device-open failure.
pub fn open_input(device: u32) -> Result<WrtdInput<CharDev>> {
    let transport = CharDev::open(&dev_path(device, 'i', 0), &dev_path(device, 'o', 0))
        .with_context(|| format!("opening TDC control of device 0x{device:04x}"))?;
    Ok(WrtdInput::new(transport))
}

/// Opens the output-personality control channel of `device`.
///
/// # Errors
///
/// Any device-open failure.
pub fn open_output(device: u32) -> Result<WrtdOutput<CharDev>> {
    let transport = CharDev::open(&dev_path(device, 'i', 1), &dev_path(device, 'o', 1))
        .with_context(|| format!("opening FD control of device 0x{device:04x}"))?;
    Ok(WrtdOutput::new(transport))
}

/// Opens a personality's log stream (`fd` selects the output side).
///
/// # Errors
///
/// Any device-open failure.
pub fn open_log(device: u32, fd: bool) -> Result<LogReader<CharDev>> {
    let slot = if fd { 3 } else { 2 };
    let transport = CharDev::open_stream(&dev_path(device, 'o', slot))
        .with_context(|| format!("opening log stream of device 0x{device:04x}"))?;
    Ok(LogReader::new(transport))
}

/// Parses a `0x`-optional hexadecimal device id.
///
/// # Errors
///
/// On malformed input.
pub fn parse_dev_id(arg: &str) -> Result<u32, String> {
    let trimmed = arg.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(trimmed, 16).map_err(|err| format!("bad device id {arg:?}: {err}"))
}

/// Parses a `system:port:trigger` identity (hex fields).
///
/// # Errors
///
/// On malformed input.
pub fn parse_trig_id(arg: &str) -> Result<TriggerId> {
    let fields: Vec<_> = arg.split(':').collect();
    if fields.len() != 3 {
        bail!("trigger id must be system:port:trigger, got {arg:?}");
    }
    let parse = |field: &str| -> Result<u32> {
        let trimmed = field.trim_start_matches("0x");
        u32::from_str_radix(trimmed, 16).with_context(|| format!("bad id field {field:?}"))
    };
    Ok(TriggerId::new(parse(fields[0])?, parse(fields[1])?, parse(fields[2])?))
}

/// Parses a triggering mode name.
///
/// # Errors
///
/// On anything but `auto` or `single`.
pub fn parse_mode(arg: &str) -> Result<TriggerMode> {
    match arg {
        "auto" => Ok(TriggerMode::Auto),
        "single" => Ok(TriggerMode::Single),
        _ => bail!("mode must be auto or single, got {arg:?}"),
    }
}

/// Parses a log-level argument: comma-separated names or `off`/`all`.
///
/// # Errors
///
/// On an unknown level name.
pub fn parse_log_level(arg: &str) -> Result<LogLevel> {
    if arg == "off" {
        return Ok(LogLevel::empty());
    }
    if arg == "all" {
        return Ok(LogLevel::ALL);
    }
    let mut level = LogLevel::empty();
    for name in arg.split(',') {
        level |= match name {
            "raw" => LogLevel::RAW,
            "sent" => LogLevel::SENT,
            "promisc" => LogLevel::PROMISC,
            "filtered" => LogLevel::FILTERED,
            "executed" => LogLevel::EXECUTED,
            "missed" => LogLevel::MISSED,
            _ => bail!("unknown log level {name:?}"),
        };
    }
    Ok(level)
}

/// Initializes diagnostics from `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}
