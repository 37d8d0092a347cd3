//! CLI Entry Point for vitrina
//!
//! Provides command-line interface for:
//! - Running the kiosk against the backend API on a simulated screen (`run`)
//! - Replaying a scripted sensor sequence against an in-memory backend (`simulate`)
//! - Validating a configuration file (`check-config`)
//!
//! # Usage
//!
//! ```bash
//! vitrina --config config/vitrina.toml run
//! vitrina simulate --script "7;3,9;;" --versus-mode 2
//! vitrina check-config
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use vitrina::backend::{HttpBackend, MockBackend, PlaylistEntry};
use vitrina::beacon::Beacon;
use vitrina::config::{KioskConfig, DEFAULT_CONFIG_PATH};
use vitrina::display::SimulatedDisplay;
use vitrina::prefs::{JsonFilePreferences, MemoryPreferences, PreferenceKey, PreferenceStore};
use vitrina::sensors::ActiveSensorSet;
use vitrina::{logging, Kiosk};

#[derive(Parser)]
#[command(name = "vitrina")]
#[command(about = "Sensor-driven video kiosk controller", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the kiosk against the configured backend, drawing on a simulated
    /// screen that logs surface activity instead of a real display
    Run {
        /// Simulated video length; non-looping videos end after this many seconds
        #[arg(long, default_value = "20")]
        video_secs: u64,
    },

    /// Replay sensor sets against an in-memory backend
    Simulate {
        /// Sensor sets separated by ';', pins by ',' (empty step = no sensor)
        #[arg(long)]
        script: String,

        /// Time each step is held, in milliseconds
        #[arg(long, default_value = "2000")]
        step_ms: u64,

        /// Backend versus mode (1-4)
        #[arg(long, default_value = "4")]
        versus_mode: u8,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = KioskConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if let Commands::CheckConfig = cli.command {
        config.validate()?;
        println!("{}", toml::to_string_pretty(&config)?);
        println!("Configuration OK");
        return Ok(());
    }

    config.validate()?;
    let prefs = open_preferences(&config)?;
    // The admin panel can switch the debug panel on for this device.
    config.application.debug_panel |= prefs.get(PreferenceKey::DebugEnabled);
    let panel = logging::init_from_config(&config)?;
    if panel.is_some() {
        tracing::info!("debug panel enabled");
    }

    let result = match cli.command {
        Commands::Run { video_secs } => run(config, prefs, video_secs).await,
        Commands::Simulate {
            script,
            step_ms,
            versus_mode,
        } => {
            simulate(
                config,
                prefs,
                &script,
                Duration::from_millis(step_ms),
                versus_mode,
            )
            .await
        }
        Commands::CheckConfig => Ok(()),
    };

    if let Some(panel) = panel {
        eprintln!("--- debug panel ({} lines) ---", panel.len());
        eprintln!("{}", panel.render());
    }
    result
}

fn open_preferences(config: &KioskConfig) -> Result<Arc<dyn PreferenceStore>> {
    Ok(match &config.preferences.path {
        Some(path) => Arc::new(
            JsonFilePreferences::open(path)
                .with_context(|| format!("opening preferences {}", path.display()))?,
        ),
        None => Arc::new(MemoryPreferences::new()),
    })
}

/// Flip the shutdown flag on Ctrl+C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl+C received"),
            Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl+C"),
        }
        let _ = tx.send(true);
        // Keep the sender alive so receivers do not observe a closed channel first.
        std::future::pending::<()>().await;
    });
    rx
}

async fn run(
    config: KioskConfig,
    prefs: Arc<dyn PreferenceStore>,
    video_secs: u64,
) -> Result<()> {
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    backend
        .wait_until_reachable(
            config.backend.connect_retries,
            Duration::from_millis(config.backend.connect_retry_delay_ms),
        )
        .await
        .context("backend unreachable")?;

    let display = Arc::new(SimulatedDisplay::new().with_activity_log());
    display.set_auto_finish(Some(Duration::from_secs(video_secs.max(1))));
    let shutdown = shutdown_on_ctrl_c();

    if let Some(beacon_config) = &config.beacon {
        let beacon = Beacon::new(
            beacon_config,
            Duration::from_millis(config.backend.request_timeout_ms),
        )?;
        tokio::spawn(beacon.run(shutdown.clone()));
    }

    let kiosk = Kiosk::new(config, backend, display, prefs);
    kiosk.run(shutdown).await;
    Ok(())
}

/// Parse `"7;3,9;;"` into `[[7], [3, 9], [], []]`.
fn parse_script(script: &str) -> Result<Vec<ActiveSensorSet>> {
    script
        .split(';')
        .map(|step| {
            let pins = step
                .split(',')
                .map(str::trim)
                .filter(|pin| !pin.is_empty())
                .map(|pin| pin.parse::<u32>().with_context(|| format!("invalid pin '{pin}'")))
                .collect::<Result<Vec<u32>>>()?;
            Ok(ActiveSensorSet::from_pins(pins))
        })
        .collect()
}

/// Add every pin the script uses to the polled pins, keeping the configured order.
fn merge_script_pins(pins: &mut Vec<u32>, steps: &[ActiveSensorSet]) {
    for sensor in steps.iter().flat_map(|set| set.iter()) {
        if !pins.contains(&sensor.0) {
            pins.push(sensor.0);
        }
    }
}

async fn simulate(
    mut config: KioskConfig,
    prefs: Arc<dyn PreferenceStore>,
    script: &str,
    step: Duration,
    versus_mode: u8,
) -> Result<()> {
    let steps = parse_script(script)?;
    if !(1..=4).contains(&versus_mode) {
        bail!("versus mode must be between 1 and 4, got {versus_mode}");
    }
    merge_script_pins(&mut config.sensors.pins, &steps);

    let backend = Arc::new(MockBackend::new());
    backend.set_versus_mode(versus_mode);
    for pin in &config.sensors.pins {
        backend.assign_video(*pin, &format!("videos/sensor_{pin}.mp4"));
    }
    backend.set_playlist(
        (1..=3)
            .map(|id| PlaylistEntry {
                id,
                video_path: format!("background/loop_{id}.mp4"),
                order: id,
            })
            .collect(),
    );

    let display = Arc::new(SimulatedDisplay::new().with_activity_log());
    display.set_auto_finish(Some(step));
    let kiosk = Arc::new(Kiosk::new(
        config,
        backend.clone(),
        display,
        prefs,
    ));

    let (tx, rx) = watch::channel(false);
    let runner = {
        let kiosk = Arc::clone(&kiosk);
        tokio::spawn(async move { kiosk.run(rx).await })
    };

    for (index, set) in steps.iter().enumerate() {
        let pins: Vec<u32> = set.iter().map(|sensor| sensor.0).collect();
        tracing::info!(step = index + 1, set = %set, "simulated sensors");
        backend.set_active(&pins);
        tokio::time::sleep(step).await;
        println!(
            "step {:>2}: sensors {:<16} -> {}",
            index + 1,
            set.to_string(),
            kiosk.controller().composition()
        );
    }

    let _ = tx.send(true);
    runner.await?;
    println!("activations registered: {}", backend.activations().len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_parses_steps() {
        let steps = parse_script("7;3,9;;").unwrap();
        assert_eq!(
            steps,
            vec![
                ActiveSensorSet::from_pins([7]),
                ActiveSensorSet::from_pins([3, 9]),
                ActiveSensorSet::empty(),
                ActiveSensorSet::empty(),
            ]
        );
    }

    #[test]
    fn script_pins_are_added_to_polled_pins() {
        let mut pins = vec![17, 27];
        let steps = parse_script("7;3,27;;17").unwrap();
        merge_script_pins(&mut pins, &steps);
        assert_eq!(pins, vec![17, 27, 7, 3]);
    }

    #[test]
    fn script_rejects_garbage() {
        assert!(parse_script("7;x").is_err());
    }
}
