//! Configures one output channel of a trigger-distribution node.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use libwrtd::{OutputState, OutputTriggerState, format_flags, format_log_level};
use wrtd_config::{
    init_tracing, open_log, open_output, parse_dev_id, parse_log_level, parse_mode, parse_trig_id,
};

#[derive(Parser)]
#[command(
    name = "wrtd-fd-config",
    about = "Configures a channel of a fine-delay output on a white-rabbit trigger distribution node"
)]
struct Cli {
    /// Device id (hexadecimal).
    #[arg(short = 'D', value_parser = parse_dev_id)]
    device: u32,

    /// Channel to configure.
    #[arg(short = 'c')]
    channel: u32,

    /// Command: state, enable, disable, arm, disarm, trig-assign,
    /// trig-remove, trig-enable, trig-disable, trig-list, trig-set-delay,
    /// set-mode, set-width, set-dead-time, set-log-level, reset-counters,
    /// sw-trigger, base-time, log-dump, ping, version.
    #[arg(short = 'C', default_value = "state")]
    command: String,

    /// Command arguments.
    args: Vec<String>,

    /// Gate the new assignment on this condition id.
    #[arg(long, value_parser = |s: &str| parse_trig_id(s).map_err(|e| e.to_string()))]
    condition: Option<wrtd_common::TriggerId>,

    /// Dump machine-readable state.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print().ok();
            return ExitCode::FAILURE;
        }
    };
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("wrtd-fd-config: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn arg<'a>(cli: &'a Cli, index: usize, what: &str) -> Result<&'a str> {
    cli.args
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument: {what}"))
}

fn parse_ps(text: &str) -> Result<u64> {
    text.parse().with_context(|| format!("bad picosecond value {text:?}"))
}

/// Finds a trigger's handle by identity, for handle-based commands.
fn handle_by_id(
    output: &libwrtd::WrtdOutput<libwrtd::CharDev>,
    channel: u32,
    id_text: &str,
) -> Result<libwrtd::TriggerHandle> {
    let id = parse_trig_id(id_text)?;
    Ok(output.trig_get_by_id(channel, id)?.handle)
}

fn run(cli: &Cli) -> Result<()> {
    let output = open_output(cli.device)?;
    let ch = cli.channel;

    match cli.command.as_str() {
        "state" => {
            let state = output.state(ch)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print_state(&state);
            }
            return Ok(());
        }
        "enable" => output.enable(ch, true)?,
        "disable" => output.enable(ch, false)?,
        "arm" => output.arm(ch, true)?,
        "disarm" => output.arm(ch, false)?,
        "trig-assign" => {
            let id = parse_trig_id(arg(cli, 0, "trigger id")?)?;
            let handle = output.trig_assign(ch, id, cli.condition)?;
            output.trig_enable(&handle, true)?;
            println!(
                "Assigned {} (entry {}, condition {:?})",
                id, handle.trig, handle.cond
            );
            return Ok(());
        }
        "trig-remove" => {
            let handle = handle_by_id(&output, ch, arg(cli, 0, "trigger id")?)?;
            output.trig_remove(&handle)?;
        }
        "trig-enable" => {
            let handle = handle_by_id(&output, ch, arg(cli, 0, "trigger id")?)?;
            output.trig_enable(&handle, true)?;
        }
        "trig-disable" => {
            let handle = handle_by_id(&output, ch, arg(cli, 0, "trigger id")?)?;
            output.trig_enable(&handle, false)?;
        }
        "trig-set-delay" => {
            let handle = handle_by_id(&output, ch, arg(cli, 0, "trigger id")?)?;
            output.trig_set_delay_ps(&handle, parse_ps(arg(cli, 1, "delay (ps)")?)?)?;
        }
        "trig-list" => {
            let triggers = output.trig_list(ch)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&triggers)?);
            } else if triggers.is_empty() {
                println!("Channel {ch}: no triggers assigned");
            } else {
                for state in &triggers {
                    print_trigger(state);
                }
            }
            return Ok(());
        }
        "set-mode" => output.set_mode(ch, parse_mode(arg(cli, 0, "mode")?)?)?,
        "set-width" => output.set_width_ps(ch, parse_ps(arg(cli, 0, "width (ps)")?)?)?,
        "set-dead-time" => {
            output.set_dead_time_ps(ch, parse_ps(arg(cli, 0, "dead time (ps)")?)?)?;
        }
        "set-log-level" => {
            output.set_log_level(ch, parse_log_level(arg(cli, 0, "log level")?)?)?;
        }
        "reset-counters" => output.reset_counters(ch)?,
        "sw-trigger" => {
            let fired = output.software_trigger(ch, None)?;
            println!("Pulse scheduled at {fired}");
            return Ok(());
        }
        "base-time" => {
            println!("{}", output.base_time()?);
            return Ok(());
        }
        "log-dump" => {
            let mut reader = open_log(cli.device, true)?;
            while let Some(entry) = reader.next_entry(Duration::from_millis(200))? {
                println!("{entry:?}");
            }
            return Ok(());
        }
        "ping" => output.ping()?,
        "version" => {
            let block = output.version()?;
            println!(
                "fpga 0x{:08x}, rt 0x{:08x}, version {}.{}, git 0x{:08x}",
                block.fpga_id,
                block.rt_id,
                block.rt_version >> 16,
                block.rt_version & 0xFFFF,
                block.git_version
            );
            return Ok(());
        }
        other => bail!("unknown command {other:?}"),
    }

    println!("Command executed!");
    Ok(())
}

fn print_state(state: &OutputState) {
    println!("Channel {} state:", state.output);
    println!(" - Flags:                 {}", format_flags(state.flags));
    println!(" - Mode:                  {:?}", state.mode);
    println!(" - Executed pulses:       {}", state.executed_pulses);
    println!(
        " - Missed pulses:         late {}, dead time {}, overflow {}, no timing {}",
        state.missed_pulses_late,
        state.missed_pulses_deadtime,
        state.missed_pulses_overflow,
        state.missed_pulses_no_timing
    );
    println!(" - Queued pulses:         {}", state.queued_pulses);
    println!(
        " - Last executed:         {}, ID: {}, SeqNo {}",
        state.last_executed.ts, state.last_executed.id, state.last_executed.seq
    );
    println!(
        " - Last enqueued:         {}, ID: {}, SeqNo {}",
        state.last_enqueued.ts, state.last_enqueued.id, state.last_enqueued.seq
    );
    println!(
        " - Last received:         {}, ID: {}, SeqNo {}",
        state.last_received.ts, state.last_received.id, state.last_received.seq
    );
    println!(" - Dead time:             {} ns", u64::from(state.dead_time) * 8);
    println!(" - Pulse width:           {} ns", u64::from(state.width_cycles) * 8);
    println!(
        " - Received messages:     {} network, {} loopback",
        state.received_messages, state.received_loopback
    );
    println!(" - Log level:             {}", format_log_level(state.log_level));
}

fn print_trigger(state: &OutputTriggerState) {
    let kind = if state.is_conditional { "conditional" } else { "direct" };
    println!(
        "{} ({kind}, {}): delay {} ps, hits {}, misses {}, latency worst {} µs avg {} µs",
        state.trigger,
        if state.enabled { "enabled" } else { "disabled" },
        state.delay_ps,
        state.executed_pulses,
        state.missed_pulses,
        state.latency_worst_us,
        state.latency_average_us
    );
    if state.is_conditional {
        println!("    condition: {}", state.condition);
    }
}
