//! Configures one input channel of a trigger-distribution node.

use std::process::ExitCode;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use libwrtd::{InputState, format_flags, format_log_level};
use wrtd_common::{TriggerEntry, TriggerId};
use wrtd_config::{
    init_tracing, open_input, parse_dev_id, parse_log_level, parse_mode, parse_trig_id,
};
use wrtd_time::Timestamp;

#[derive(Parser)]
#[command(
    name = "wrtd-tdc-config",
    about = "Configures a channel of a TDC on a white-rabbit trigger distribution node"
)]
struct Cli {
    /// Device id (hexadecimal).
    #[arg(short = 'D', value_parser = parse_dev_id)]
    device: u32,

    /// Channel to configure.
    #[arg(short = 'c')]
    channel: u32,

    /// Command: state, enable, disable, arm, disarm, assign, unassign,
    /// set-delay, set-dead-time, set-mode, set-seq, set-log-level,
    /// reset-counters, sw-trigger, ping, version.
    #[arg(short = 'C', default_value = "state")]
    command: String,

    /// Command arguments.
    args: Vec<String>,

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
            eprintln!("wrtd-tdc-config: {err:#}");
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

fn run(cli: &Cli) -> Result<()> {
    let input = open_input(cli.device)?;
    let ch = cli.channel;

    match cli.command.as_str() {
        "state" => {
            let state = input.state(ch)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print_state(&state);
            }
            return Ok(());
        }
        "enable" => input.enable(ch, true)?,
        "disable" => input.enable(ch, false)?,
        "arm" => input.arm(ch, true)?,
        "disarm" => input.arm(ch, false)?,
        "assign" => {
            let id = parse_trig_id(arg(cli, 0, "trigger id")?)?;
            input.assign_trigger(ch, id)?;
        }
        "unassign" => input.unassign_trigger(ch)?,
        "set-delay" => input.set_delay_ps(ch, parse_ps(arg(cli, 0, "delay (ps)")?)?)?,
        "set-dead-time" => {
            input.set_dead_time_ps(ch, parse_ps(arg(cli, 0, "dead time (ps)")?)?)?;
        }
        "set-mode" => input.set_mode(ch, parse_mode(arg(cli, 0, "mode")?)?)?,
        "set-seq" => {
            let seq = arg(cli, 0, "sequence number")?.parse().context("bad sequence number")?;
            input.set_seq(ch, seq)?;
        }
        "set-log-level" => {
            input.set_log_level(ch, parse_log_level(arg(cli, 0, "log level")?)?)?;
        }
        "reset-counters" => input.reset_counters(ch)?,
        "sw-trigger" => {
            let delay_ps = parse_ps(arg(cli, 0, "delay (ps)")?)?;
            let entry = TriggerEntry {
                ts: Timestamp::from_picos(delay_ps),
                id: TriggerId::default(),
                seq: 0,
            };
            input.software_trigger(&entry)?;
        }
        "ping" => input.ping()?,
        "version" => {
            let block = input.version()?;
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

fn print_state(state: &InputState) {
    if !state.enabled() {
        println!("Channel {}: disabled", state.input);
        return;
    }
    println!("Channel {} state:", state.input);
    println!(" - Flags:                 {}", format_flags(state.flags));
    println!(" - Mode:                  {:?}", state.mode);
    println!(" - Delay:                 {}", state.delay);
    println!(" - Tagged pulses:         {}", state.tagged_pulses);
    println!(" - Sent triggers:         {}", state.sent_triggers);
    println!(" - Sent packets:          {}", state.sent_packets);
    println!(" - Missed (no timing):    {}", state.miss_no_timing);
    println!(" - Assigned ID:           {}", state.assigned_id);
    println!(" - Last input pulse:      {}", state.last_tagged);
    println!(
        " - Last sent trigger:     {}, ID: {}, SeqNo {}",
        state.last_sent.ts, state.last_sent.id, state.last_sent.seq
    );
    println!(" - Dead time:             {} ns", u64::from(state.dead_time) * 8);
    println!(" - Log level:             {}", format_log_level(state.log_level));
}
