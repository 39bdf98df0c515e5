//! Helio daemon
//!
//! Keeps external monitors adapted to daylight or to the built-in panel's
//! brightness over DDC/CI, and offers a few one-shot commands for
//! inspecting and driving monitors by hand.
//!
//! Signals while running:
//! - SIGINT / SIGTERM: stop the loops and exit
//! - SIGUSR1: reload the config file
//! - SIGUSR2: log a diagnostics dump

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use helio_config::HelioConfig;
use helio_hal::mock::{MockBackend, MockPlatform, MockReference, MockSession};
use helio_hal::{
    BackendKind, ControlId, DisplayId, ReferenceSource, SysfsBacklight, SysfsDisplays,
    SystemSession, VideoInputSource,
};
use helio_service::{Controller, DiagnosticsReport, Providers, Scheduler, policy, self_test};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "heliod")]
#[command(about = "Adaptive brightness for external monitors over DDC/CI", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file to use instead of the default search path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// DDC backend: auto, i2c, ddcutil or mock
    #[arg(long)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the adaptive loops until stopped (default)
    Run,
    /// List connected external displays
    List,
    /// Print diagnostics as JSON
    Dump,
    /// Sweep brightness and contrast on every display and report failures
    SelfTest,
    /// Read a control
    Get {
        /// Display id, serial or name
        display: String,
        /// Control name, alias or hex code
        control: String,
    },
    /// Write a control
    Set {
        display: String,
        control: String,
        /// Raw value, or an input name such as "hdmi2" for INPUT_SOURCE
        value: String,
    },
    /// Show which control a name resolves to
    Resolve { token: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    if let Some(Command::Resolve { token }) = &cli.command {
        return resolve(token);
    }

    let (mut settings, config_path) = load_settings(cli.config)?;
    if let Some(backend) = cli.backend {
        settings.ddc.backend = backend;
        settings.validate().context("Invalid --backend")?;
    }

    let providers = build_providers(policy::backend_kind(&settings.ddc))?;
    let controller = Arc::new(Controller::new(settings, config_path.clone(), providers));
    controller
        .refresh_topology()
        .await
        .context("Failed to enumerate displays")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(controller, config_path).await,
        Command::List => {
            list(&controller);
            Ok(())
        }
        Command::Dump => {
            println!("{}", DiagnosticsReport::collect(&controller).to_json()?);
            Ok(())
        }
        Command::SelfTest => {
            let report = self_test(&controller).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.passed() {
                bail!("{} writes failed", report.failures.len());
            }
            Ok(())
        }
        Command::Get { display, control } => get(&controller, &display, &control).await,
        Command::Set {
            display,
            control,
            value,
        } => set(&controller, &display, &control, &value).await,
        Command::Resolve { .. } => Ok(()),
    }
}

/// Setup logging to the console
fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(false))
        .init();
}

/// Load the given file, or the first one on the search path
///
/// The returned path is where setting changes are saved.
fn load_settings(explicit: Option<PathBuf>) -> Result<(HelioConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let settings = HelioConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        return Ok((settings, Some(path)));
    }

    match HelioConfig::find() {
        Some(path) => {
            let settings = HelioConfig::load(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            info!("Loaded settings from {}", path.display());
            Ok((settings, Some(path)))
        }
        None => {
            warn!("No config file found, using defaults");
            Ok((HelioConfig::default(), Some(HelioConfig::user_path())))
        }
    }
}

fn build_providers(kind: BackendKind) -> Result<Providers> {
    if kind == BackendKind::Mock {
        info!("[MOCK] Simulating two external monitors");
        let ids = [DisplayId(1), DisplayId(2)];
        return Ok(Providers {
            backend: Arc::new(MockBackend::with_sample_monitors()),
            platform: Arc::new(MockPlatform::with_outputs(&ids)),
            session: Arc::new(MockSession::new()),
            reference: Some(Arc::new(MockReference::new(Some(50.0)))),
        });
    }

    let backend = helio_hal::probe(kind).context("No DDC backend available")?;
    let reference = SysfsBacklight::detect().map(|b| {
        info!("Reference display backlight: {}", b.path().display());
        Arc::new(b) as Arc<dyn ReferenceSource>
    });

    Ok(Providers {
        backend,
        platform: Arc::new(SysfsDisplays::default()),
        session: Arc::new(SystemSession::default()),
        reference,
    })
}

async fn run(controller: Arc<Controller>, config_path: Option<PathBuf>) -> Result<()> {
    info!(
        "Helio starting: {} display(s), {} mode, {} backend",
        controller.displays().len(),
        controller.mode(),
        controller.transport().backend_name()
    );

    let mut scheduler = Scheduler::start(Arc::clone(&controller));
    if let Some(path) = config_path.filter(|p| p.exists()) {
        if let Err(e) = scheduler.watch_config(&path) {
            warn!("Not watching {}: {}", path.display(), e);
        }
    }

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => break,
            _ = sigterm.recv() => break,
            _ = sigusr1.recv() => {
                info!("Received reload signal");
                match controller.reload_settings() {
                    Ok(()) => scheduler.request_adapt(),
                    Err(e) => warn!("Reload failed, keeping current settings: {}", e),
                }
            }
            _ = sigusr2.recv() => {
                match DiagnosticsReport::collect(&controller).to_json() {
                    Ok(json) => info!("Diagnostics:\n{}", json),
                    Err(e) => warn!("Failed to serialize diagnostics: {}", e),
                }
            }
        }
    }

    info!("Received shutdown signal");
    scheduler.shutdown().await;
    Ok(())
}

fn list(controller: &Controller) {
    let displays = controller.displays();
    if displays.is_empty() {
        println!("No external displays found");
        return;
    }
    for display in displays {
        let bus = display
            .i2c_bus
            .map(|b| format!("i2c-{}", b))
            .unwrap_or_else(|| "no DDC".to_string());
        println!(
            "{:>3}  {:<24} {:<10} {:<8} {}",
            display.id, display.name, display.connector, bus, display.serial
        );
    }
}

fn resolve(token: &str) -> Result<()> {
    let control = ControlId::resolve(token).ok_or_else(|| anyhow!("Unknown control: {}", token))?;
    println!("{:#04x} {} ({})", control.code(), control.name(), control.display_name());
    Ok(())
}

async fn get(controller: &Controller, display: &str, control: &str) -> Result<()> {
    let display = controller.find_display(display)?;
    let control =
        ControlId::resolve(control).ok_or_else(|| anyhow!("Unknown control: {}", control))?;

    let current = controller
        .get_current_value(display.id, control)
        .await
        .ok_or_else(|| anyhow!("Could not read {} from {}", control, display.name))?;
    let max = controller.get_max_value(display.id, control).await;

    match (control, max) {
        (ControlId::InputSource, _) => match VideoInputSource::from_value(current) {
            Some(source) => println!("{}: {}", control, source),
            None => println!("{}: {:#04x}", control, current),
        },
        (_, Some(max)) => println!("{}: {} / {}", control, current, max),
        (_, None) => println!("{}: {}", control, current),
    }
    Ok(())
}

async fn set(controller: &Controller, display: &str, control: &str, value: &str) -> Result<()> {
    let display = controller.find_display(display)?;
    let control =
        ControlId::resolve(control).ok_or_else(|| anyhow!("Unknown control: {}", control))?;

    if control == ControlId::InputSource {
        let source = VideoInputSource::parse(value)
            .ok_or_else(|| anyhow!("Unknown input source: {}", value))?;
        controller.set_input(display.id, source).await?;
        println!("{}: {}", control, source);
        return Ok(());
    }

    let value: u16 = value
        .parse()
        .with_context(|| format!("Invalid value: {}", value))?;
    if ControlId::RESETS.contains(&control) {
        controller.reset_control(display.id, control).await?;
    } else {
        controller.set_value(display.id, control, value).await?;
    }
    println!("{}: {}", control, value);
    Ok(())
}
