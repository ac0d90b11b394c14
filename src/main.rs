//! CLI entry point for the MHV4 console.
//!
//! Subcommands:
//! - `monitor` — connect and print live channel readouts per module
//! - `apply`   — send one set-point per channel (volts)
//! - `power`   — switch every channel output on or off
//! - `rc`      — flip remote-control/local mode (asks for confirmation)

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mhv4_console::command::parse_setpoint;
use mhv4_console::format::{border_state, module_readouts, BorderState};
use mhv4_console::state::DeviceState;
use mhv4_console::{ConsoleSession, ModeChangeConfirmation, Settings};
use std::io::Write;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mhv4-console")]
#[command(about = "Monitoring and control console for the MHV4 HV power supply", long_about = None)]
struct Cli {
    /// Configuration name under config/ (default: "default")
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch live channel state
    Monitor,

    /// Apply set-points, one value in volts per channel, in server order
    Apply {
        #[arg(required = true)]
        volts: Vec<String>,
    },

    /// Switch all channel outputs
    Power {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },

    /// Flip remote-control/local mode
    Rc {
        #[arg(value_parser = ["rc", "local"])]
        mode: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let settings = Settings::new(cli.config.as_deref())?;

    match cli.command {
        Commands::Monitor => monitor(settings).await,
        Commands::Apply { volts } => apply(settings, &volts).await,
        Commands::Power { state } => power(settings, state == "on").await,
        Commands::Rc { mode } => flip_mode(settings, mode == "rc").await,
    }
}

async fn monitor(settings: Settings) -> Result<()> {
    let mut session = ConsoleSession::connect(settings).await?;
    let mut rx = session.store().subscribe();

    render(&rx.borrow().clone());
    println!("monitoring... press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow().clone();
                render(&state);
            }
        }
    }

    session.close().await;
    println!("session closed");
    Ok(())
}

fn render(state: &DeviceState) {
    let status = match border_state(state) {
        BorderState::Normal => "ok",
        BorderState::Busy => "busy (ramping)",
        BorderState::Alert => "ALERT: readings unavailable",
    };
    println!(
        "--- mode: {} | status: {} ---",
        if state.mode { "RC" } else { "local" },
        status
    );

    match module_readouts(state) {
        Ok(modules) => {
            for (id, module) in modules.iter().enumerate() {
                println!("MHV4 module {id}");
                for row in module {
                    println!(
                        "  bus {} dev {} ch {}  [{}] {}  V={} V  I={} uA",
                        row.bus, row.device, row.channel, row.polarity, row.onoff,
                        row.voltage, row.current
                    );
                }
            }
        }
        Err(err) => eprintln!("cannot render channel table: {err}"),
    }
}

async fn apply(settings: Settings, volts: &[String]) -> Result<()> {
    let max_voltage = settings.limits.max_voltage;
    let setpoints = volts
        .iter()
        .map(|v| parse_setpoint(v, max_voltage))
        .collect::<mhv4_console::Result<Vec<i64>>>()?;

    let mut session = ConsoleSession::connect(settings).await?;
    let result = session.commander().apply_setpoints(&setpoints).await;
    session.close().await;

    result?;
    println!("set-points accepted; hardware is ramping");
    Ok(())
}

async fn power(settings: Settings, on: bool) -> Result<()> {
    let mut session = ConsoleSession::connect(settings).await?;
    let desired = vec![on; session.store().current().channels.len()];
    let result = session.commander().apply_on_off(&desired).await;
    session.close().await;

    result?;
    println!("all outputs switched {}", if on { "ON" } else { "OFF" });
    Ok(())
}

async fn flip_mode(settings: Settings, desired: bool) -> Result<()> {
    print!(
        "Flip to {} mode? Channels may be energized. [y/N] ",
        if desired { "RC" } else { "local" }
    );
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    if !answer.trim().eq_ignore_ascii_case("y") {
        bail!("mode change not confirmed");
    }

    let mut session = ConsoleSession::connect(settings).await?;
    let result = session
        .commander()
        .flip_mode(desired, ModeChangeConfirmation::granted())
        .await;
    session.close().await;

    result?;
    println!("mode set to {}", if desired { "RC" } else { "local" });
    Ok(())
}
