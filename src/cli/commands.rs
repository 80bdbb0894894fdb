use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::modbus::{LogChannel, ModbusMaster, SlaveId};
use crate::output::{spawn_event_pump, ConsoleSink, EventSink, FileSink};
use crate::services::{run_blink_test, BlinkPlan, LightZones, Zone};

/// How the port is given back once a command is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    /// Lights keep the state the command left them in.
    Release,
    /// Lights are switched off first.
    Disconnect,
}

impl Shutdown {
    fn for_command(name: &str) -> Self {
        match name {
            "blink" | "follow" => Shutdown::Disconnect,
            _ => Shutdown::Release,
        }
    }
}

pub async fn handle_subcommands(matches: &ArgMatches, config: Config) -> Result<()> {
    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("No command given"))?;

    if name == "init-config" {
        let path = sub
            .get_one::<String>("path")
            .ok_or_else(|| anyhow!("Missing path"))?;
        Config::default()
            .save_to_file(path)
            .with_context(|| format!("Failed to write {}", path))?;
        println!("✅ Default settings written to {}", path);
        return Ok(());
    }

    let master = Arc::new(ModbusMaster::from_config(&config));

    let mut sinks: Vec<Box<dyn EventSink>> = vec![Box::new(ConsoleSink)];
    if let Some(path) = matches.get_one::<String>("log-file") {
        info!("📝 Adding file output: {}", path);
        sinks.push(Box::new(FileSink::new(path, Some(LogChannel::ModbusTrace))));
    }
    let pump = spawn_event_pump(master.subscribe(), sinks);

    let outcome = run_command(&master, &config, name, sub).await;

    // Closed here so the master's Drop has nothing left to write.
    close_master(Arc::clone(&master), Shutdown::for_command(name)).await?;
    drop(master);
    pump.await.context("Event output task failed")?;
    outcome
}

async fn close_master(master: Arc<ModbusMaster>, shutdown: Shutdown) -> Result<()> {
    tokio::task::spawn_blocking(move || match shutdown {
        Shutdown::Release => master.release_port(),
        Shutdown::Disconnect => master.disconnect(),
    })
    .await
    .context("Failed to close the serial port")
}

async fn run_command(
    master: &Arc<ModbusMaster>,
    config: &Config,
    name: &str,
    sub: &ArgMatches,
) -> Result<()> {
    if name == "ports" {
        let ports = master.list_ports()?;
        if ports.is_empty() {
            println!("💡 Check the USB-RS485 adapter is plugged in");
        }
        return Ok(());
    }

    let connection = config
        .connection_config()
        .context("Cannot open the light output")?;
    master
        .connect(connection)
        .with_context(|| format!("Failed to connect to {}", config.serial_port))?;

    match name {
        "on" | "off" => {
            let slave = SlaveId::new(
                *sub.get_one::<u8>("slave")
                    .ok_or_else(|| anyhow!("Missing slave address"))?,
            )?;
            master.set_coil(slave, name == "on")?;
        }
        "all-on" => master.set_all(true)?,
        "all-off" => master.set_all(false)?,
        "light" => {
            let label = sub
                .get_one::<String>("label")
                .ok_or_else(|| anyhow!("Missing label"))?;
            let on = sub.get_one::<String>("state").map(String::as_str) == Some("on");
            master.set_light_for_label(label, on)?;
        }
        "blink" => {
            let mut plan = BlinkPlan::from_settings(master.slave_ids(), &config.blink);
            if let Some(cycles) = sub.get_one::<u32>("cycles") {
                plan = plan.with_cycles(*cycles);
            }
            let on = sub
                .get_one::<u64>("on-ms")
                .map(|ms| Duration::from_millis(*ms))
                .unwrap_or(plan.on_duration);
            let off = sub
                .get_one::<u64>("off-ms")
                .map(|ms| Duration::from_millis(*ms))
                .unwrap_or(plan.off_duration);
            plan = plan.with_timing(on, off);

            let task = run_blink_test(Arc::clone(master), plan)?;
            let token = task.cancellation_token();
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("🛑 Stopping blink test...");
                    token.cancel();
                }
            });

            let report = task.wait().await;
            ctrl_c.abort();
            let report = report?;
            info!(
                "📊 Blink: {} cycle(s), {} sent, {} failed{}",
                report.cycles_completed,
                report.commands_sent,
                report.commands_failed,
                if report.cancelled { ", cancelled" } else { "" }
            );
        }
        "follow" => follow_zones(master).await?,
        other => return Err(anyhow!("Unknown command: {}", other)),
    }

    Ok(())
}

/// Reads `<label> <inside|outside>` lines from stdin until EOF or Ctrl-C.
async fn follow_zones(master: &Arc<ModbusMaster>) -> Result<()> {
    info!("👀 Waiting for zone events on stdin (<label> inside|outside)");
    let mut zones = LightZones::new(Arc::clone(master));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Stopping zone follower...");
                break;
            }
        };
        let Some(line) = line else { break };

        let Some((label, zone)) = parse_zone_line(&line) else {
            if !line.trim().is_empty() {
                warn!("⚠ Ignoring malformed zone event: {}", line.trim());
            }
            continue;
        };

        // Coil writes block; hand the tracker to the blocking pool and back.
        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = zones.update(&label, zone);
            (zones, result)
        })
        .await
        .context("Zone update task failed")?;
        zones = returned;

        // Failures are already logged by the master; keep following.
        if let Err(e) = result {
            warn!("⚠ Zone event not applied: {}", e);
        }
    }

    Ok(())
}

fn parse_zone_line(line: &str) -> Option<(String, Zone)> {
    let mut parts = line.split_whitespace();
    let label = parts.next()?;
    let zone = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((label.to_string(), zone))
}
