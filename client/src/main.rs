// This file defines the command-line client for the greenhouse control
// service.
//
// It can query device state, sensor readings and the operation mode, and
// send manual commands to the skylights, shades, curtains and fans.

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use greenlib::config::DashboardConfig;
use greenlib::dashboard::Dashboard;
use greenlib::device::{Device, DeviceKind};
use greenlib::display::{print_device_states, print_sensor_snapshot, print_views};
use greenlib::http::HttpControlService;
use greenlib::service::ControlService;
use greenlib::types::{Direction, Magnitude, OperationMode};
use itertools::Itertools;
use regex::Regex;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Greenhouse control command-line client")]
struct Args {
    #[arg(long, help = "Base URL (or host:port) of the control service")]
    addr: Option<String>,

    #[arg(long, help = "Path to a TOML dashboard config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,

    #[arg(long, help = "If true, output is printed in json format")]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show what the controller reports for every device.
    Status,
    /// Show current sensor readings and how much history is available.
    Sensors,
    /// Get or set the operation mode (auto or manual).
    Mode {
        #[arg(help = "auto or manual. Prints the current mode if omitted.")]
        mode: Option<OperationMode>,
    },
    /// Send manual device commands. Only works in MANUAL mode.
    Ctl {
        #[arg(
            required = true,
            help = "Commands of the form <device>@open:<pct>, <device>@close:<pct>, <device>@on or <device>@off"
        )]
        edits: Vec<String>,
    },
    /// Reset every device on the controller.
    Reset,
    /// Keep polling and print the device table until Ctrl-C.
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stderrlog::new()
        .module(module_path!())
        .module("greenlib")
        .verbosity(log::Level::Info)
        .init()?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::new_with_reasonable_defaults(),
    };
    // The service address can be passed by flag or environment variable. Flag
    // takes precedence over both the env var and the config file.
    if let Some(addr) = args.addr.clone().or(env::var("GREENHOUSE_ADDR").ok()) {
        config.base_url = addr;
    }
    config.validate()?;

    match &args.command {
        Commands::Status => {
            let service = connect(&config)?;
            let states = service.status().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&states)?);
            } else {
                println!("Device State:");
                println!("=============");
                print_device_states(&states);
            }
        }
        Commands::Sensors => {
            let service = connect(&config)?;
            let snapshot = service.sensor_data().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_sensor_snapshot(&snapshot);
            }
        }
        Commands::Mode { mode } => {
            let service = connect(&config)?;
            match mode {
                Some(mode) => {
                    service.set_operation_mode(*mode).await?;
                    log::info!("Operation mode set to {mode}");
                }
                None => {
                    let mode = service.operation_mode().await?;
                    if args.json {
                        println!("{}", serde_json::json!({ "mode": mode }));
                    } else {
                        println!("{mode}");
                    }
                }
            }
        }
        Commands::Ctl { edits } => {
            let edits: Vec<Edit> = edits
                .iter()
                .map(|x| parse_edit(x))
                .collect::<Result<_, _>>()
                .map_err(|err| anyhow!("Error parsing command(s): {err}"))?;

            let (dash, _notices) = Dashboard::connect(&config)?;
            if !dash.refresh_mode().await || !dash.refresh_status().await {
                return Err(anyhow!("Could not load current state from the controller"));
            }
            for edit in &edits {
                apply_edit(&dash, edit)?;
            }

            let report = dash.confirm().await?;
            if args.json {
                let failures: Vec<_> = report
                    .failures
                    .iter()
                    .map(|(device, err)| serde_json::json!({ "device": device, "error": err }))
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "succeeded": report.succeeded,
                        "failures": failures,
                    })
                );
            } else if report.attempted() == 0 {
                println!("Nothing to send; devices already match.");
            } else {
                println!(
                    "Sent {} command(s), {} failed.",
                    report.attempted(),
                    report.failures.len()
                );
                if !report.failures.is_empty() {
                    println!(
                        "Failed: {}",
                        report
                            .failures
                            .iter()
                            .map(|(device, err)| format!("{device} ({err})"))
                            .join(", ")
                    );
                }
            }
            if !report.failures.is_empty() {
                return Err(anyhow!("{} device command(s) failed", report.failures.len()));
            }
        }
        Commands::Reset => {
            // Goes through the dashboard so AUTO mode refuses the reset.
            let (dash, _notices) = Dashboard::connect(&config)?;
            if !dash.refresh_mode().await {
                return Err(anyhow!("Could not read the operation mode from the controller"));
            }
            let ack = dash.reset().await?;
            println!(
                "{}",
                ack.message.as_deref().unwrap_or("All devices were reset.")
            );
        }
        Commands::Watch => watch(&config).await?,
    }

    Ok(())
}

fn connect(config: &DashboardConfig) -> anyhow::Result<HttpControlService> {
    let service = HttpControlService::new(&config.base_url, config.request_timeout())?;
    log::info!("Connecting to control service at '{}'...", service.base_url());
    Ok(service)
}

async fn watch(config: &DashboardConfig) -> anyhow::Result<()> {
    let (mut dash, mut notices) = Dashboard::connect(config)?;
    dash.mount();

    // Give the first poll a moment before printing.
    let period = Duration::from_secs(config.status_poll_secs);
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + Duration::from_secs(1),
        period,
    );
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(notice) = notices.recv() => println!("{notice}"),
            _ = ticker.tick() => {
                let (views, mode, usage) =
                    dash.read(|s| (s.views(), s.mode(), s.usage().clone()));
                print_views(&views, mode, &usage);
                println!();
            }
        }
    }

    log::info!("Stopping...");
    dash.teardown();
    Ok(())
}

fn apply_edit(dash: &Dashboard, edit: &Edit) -> anyhow::Result<()> {
    match *edit {
        Edit::Adjust {
            device,
            direction,
            magnitude,
        } => dash.select(device, direction, magnitude)?,
        Edit::Switch { device, on } => dash.set_toggle(device, on)?,
    }
    Ok(())
}

// One requested change to a device's pending state.
#[derive(PartialEq, Debug, Clone, Copy)]
enum Edit {
    Adjust {
        device: Device,
        direction: Direction,
        magnitude: Magnitude,
    },
    Switch {
        device: Device,
        on: bool,
    },
}

#[derive(PartialEq, Debug)]
struct CommandParseError {
    msg: String,
}

impl CommandParseError {
    pub fn new(msg: &str) -> Self {
        Self { msg: msg.into() }
    }
}

impl fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

fn parse_edit(cmd: &str) -> Result<Edit, CommandParseError> {
    if cmd.is_empty() {
        return Err(CommandParseError::new("Empty command"));
    }

    let re = Regex::new(r"^(?<device>[^@:\s]+)@(?<action>[a-zA-Z]+)(:(?<pct>[^:\s]+))?$")
        .map_err(|err| CommandParseError::new(&err.to_string()))?;
    let caps = match re.captures(cmd) {
        Some(c) => c,
        None => {
            return Err(CommandParseError::new(&format!("Invalid command: '{cmd}'")));
        }
    };

    let name = &caps["device"];
    let device: Device = name
        .parse()
        .map_err(|err: anyhow::Error| CommandParseError::new(&err.to_string()))?;
    let action = caps["action"].to_lowercase();
    let pct = caps.name("pct").map(|m| m.as_str());

    match (device.kind(), action.as_str(), pct) {
        (DeviceKind::Toggle, "on" | "off", None) => Ok(Edit::Switch {
            device,
            on: action == "on",
        }),
        (DeviceKind::Toggle, "on" | "off", Some(_)) => Err(CommandParseError::new(&format!(
            "{device} is switched on or off and takes no percentage"
        ))),
        (DeviceKind::Toggle, _, _) => Err(CommandParseError::new(&format!(
            "{device} only supports 'on' or 'off'"
        ))),
        (DeviceKind::Adjustable, "open" | "close", Some(pct)) => {
            let direction: Direction = action
                .parse()
                .map_err(|err: anyhow::Error| CommandParseError::new(&err.to_string()))?;
            let magnitude: Magnitude = pct
                .parse()
                .map_err(|err: anyhow::Error| CommandParseError::new(&err.to_string()))?;
            Ok(Edit::Adjust {
                device,
                direction,
                magnitude,
            })
        }
        (DeviceKind::Adjustable, "open" | "close", None) => Err(CommandParseError::new(&format!(
            "Missing percentage for {device}, e.g. '{name}@{action}:40%'"
        ))),
        (DeviceKind::Adjustable, _, _) => Err(CommandParseError::new(&format!(
            "{device} only supports 'open' or 'close'"
        ))),
    }
}


#[cfg(test)]
mod args {
    use super::*;

    #[test]
    fn mode_parses_case_insensitively() {
        let args = Args::try_parse_from(["client", "mode", "manual"]).unwrap();
        match args.command {
            Commands::Mode { mode } => assert_eq!(mode, Some(OperationMode::Manual)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ctl_requires_edits() {
        assert!(Args::try_parse_from(["client", "ctl"]).is_err());
        let args =
            Args::try_parse_from(["client", "--addr", "10.0.0.5:5000", "ctl", "fan@on"]).unwrap();
        assert_eq!(args.addr.as_deref(), Some("10.0.0.5:5000"));
    }
}
