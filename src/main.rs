//! Sati Sensor Agent CLI
//!
//! Privacy-first stress sensing and intervention for deep work.

use chrono::Utc;
use clap::{Parser, Subcommand};
use sati_sensor_agent::{
    collector::{check_permission, route_event, Collector, CollectorConfig, HAS_INPUT_TAP},
    config::{Config, SourceConfig},
    core::SessionReport,
    monitor::{build_input_sensor, Monitor, MonitorEvent},
    transparency::create_shared_log_with_persistence,
    PRIVACY_DECLARATION, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sati-sensor")]
#[command(author = "Sati")]
#[command(version = VERSION)]
#[command(about = "Privacy-first stress sensing and intervention for deep work", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring
    Start {
        /// Signal sources (keyboard, mouse, breathing, posture, screen, or all).
        /// Defaults to the configured sources.
        #[arg(long)]
        sources: Option<String>,

        /// Declare what you intend to work on
        #[arg(long)]
        intent: Option<String>,

        /// Serve the local control API on this port (requires server feature)
        #[arg(long)]
        serve_port: Option<u16>,
    },

    /// Pause monitoring
    Pause,

    /// Resume monitoring
    Resume,

    /// Show current status
    Status,

    /// Display privacy declaration
    Privacy,

    /// Combine exported session reports
    Export {
        /// Directory holding session reports
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            sources,
            intent,
            serve_port,
        } => {
            cmd_start(sources.as_deref(), intent.as_deref(), serve_port);
        }
        Commands::Pause => {
            cmd_pause();
        }
        Commands::Resume => {
            cmd_resume();
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Privacy => {
            cmd_privacy();
        }
        Commands::Export { output, format } => {
            cmd_export(output, &format);
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config ({e}), using defaults");
        Config::default()
    })
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

fn cmd_start(sources: Option<&str>, intent: Option<&str>, serve_port: Option<u16>) {
    println!("Sati Sensor Agent v{VERSION}");
    println!();

    let mut config = load_config();
    if let Some(sources) = sources {
        config.sources = SourceConfig::from_csv(sources);
    }
    if !config.sources.any_enabled() {
        eprintln!("Error: At least one source must be enabled");
        std::process::exit(1);
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    // Input Monitoring permission gates keyboard and mouse only; without it
    // the other sources still run.
    let input_tap = config.sources.input_enabled() && HAS_INPUT_TAP && check_permission();
    if config.sources.input_enabled() && !input_tap {
        if HAS_INPUT_TAP {
            eprintln!("Warning: Input Monitoring permission not granted; keyboard and mouse disabled.");
            eprintln!();
            eprintln!("To grant permission:");
            eprintln!("1. Open System Settings > Privacy & Security");
            eprintln!("2. Select 'Input Monitoring'");
            eprintln!("3. Add this application to the allowed list");
            eprintln!("4. Restart the application");
        } else {
            eprintln!("Warning: No input listener on this platform; keyboard and mouse disabled.");
        }
        eprintln!();
    }

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    println!("Starting monitoring...");
    println!("  Keyboard: {}", enabled(config.sources.keyboard));
    println!("  Mouse: {}", enabled(config.sources.mouse));
    println!("  Breathing: {}", enabled(config.sources.breathing));
    println!("  Posture: {}", enabled(config.sources.posture));
    println!("  Screen: {}", enabled(config.sources.screen));
    println!(
        "  Window: {}s, cooldown: {}s",
        config.detection.window_duration.as_secs(),
        config.intervention.cooldown.as_secs()
    );

    let transparency_log =
        create_shared_log_with_persistence(config.data_path.join("transparency.json"));

    let input_sensor = match build_input_sensor(&config, input_tap) {
        Ok(sensor) => sensor,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let monitor = match Monitor::from_config(
        &config,
        input_sensor.clone(),
        transparency_log.clone(),
        Utc::now(),
    ) {
        Ok(monitor) => Arc::new(monitor),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Some(intent) = intent {
        if intent.trim().is_empty() {
            eprintln!("Warning: Ignoring empty intent");
        } else {
            monitor.set_intent(intent);
        }
    }
    let current_intent = monitor.intent_state(Utc::now()).current_intent;
    if !current_intent.is_empty() {
        println!("  Intent: {current_intent}");
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    if let Some(ref sensor) = input_sensor {
        sensor.start(Utc::now());
    }

    let mut collector = Collector::new(CollectorConfig::from_sources(&config.sources));

    // Support pause/resume from another process by polling the config file.
    let mut paused = config.paused;
    let mut last_config_check = Instant::now();

    if paused {
        println!("Monitoring is currently paused.");
        println!("Run `sati-sensor resume` to start.");
        println!();
    } else if input_tap {
        if let Err(e) = collector.start() {
            eprintln!("Error starting collector: {e}");
            std::process::exit(1);
        }
    }

    let monitor_handle = spawn_monitor_thread(
        monitor.clone(),
        running.clone(),
        config.intervention.tick_interval,
    );
    let intent_handle = spawn_intent_thread(&config, monitor.clone(), running.clone());

    #[cfg(feature = "server")]
    let server = serve_port.and_then(|port| start_server(port, monitor.clone()));
    #[cfg(not(feature = "server"))]
    if serve_port.is_some() {
        eprintln!("Warning: --serve-port ignored (server feature not enabled at compile time)");
    }

    // Listener loop: drain input events into the sensor
    let receiver = collector.receiver().clone();

    while running.load(Ordering::SeqCst) {
        if last_config_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(cfg) = Config::load() {
                if cfg.paused != paused {
                    paused = cfg.paused;
                    monitor.set_paused(paused);

                    if paused {
                        println!();
                        println!("Pausing monitoring...");
                        collector.stop();
                        while receiver.try_recv().is_ok() {}
                    } else {
                        println!();
                        println!("Resuming monitoring...");
                        if input_tap {
                            if let Err(e) = collector.start() {
                                eprintln!("Error resuming collector: {e}");
                                std::process::exit(1);
                            }
                        }
                    }
                }
            }
            last_config_check = Instant::now();
        }

        let Some(sensor) = input_sensor.as_ref().filter(|_| input_tap) else {
            thread::sleep(Duration::from_millis(100));
            continue;
        };
        if paused {
            thread::sleep(Duration::from_millis(100));
            continue;
        }

        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => route_event(&event, sensor, &transparency_log),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                eprintln!("Collector disconnected unexpectedly");
                break;
            }
        }
    }

    println!();
    println!("Stopping monitoring...");
    running.store(false, Ordering::SeqCst);
    collector.stop();
    if let Some(ref sensor) = input_sensor {
        sensor.stop();
    }
    monitor.tracker().stop();

    for handle in [Some(monitor_handle), intent_handle].into_iter().flatten() {
        let _ = handle.join();
    }

    #[cfg(feature = "server")]
    if let Some((_runtime, shutdown_tx)) = server {
        let _ = shutdown_tx.send(());
    }

    if let Err(e) = transparency_log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    let report = monitor.report(Utc::now());
    let export_path = config.export_path.join(format!(
        "session_{}.json",
        report.ended_at.format("%Y%m%d_%H%M%S")
    ));
    if let Some(parent) = export_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            if let Err(e) = std::fs::write(&export_path, json) {
                eprintln!("Error writing session report: {e}");
            } else {
                println!(
                    "Session report ({} interventions) written to {:?}",
                    report.interventions.len(),
                    export_path
                );
            }
        }
        Err(e) => {
            eprintln!("Error serializing session report: {e}");
        }
    }

    println!();
    println!("{}", transparency_log.summary());
}

/// Sleep for `duration` in short steps, returning early once stopped.
fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(100)));
    }
}

fn spawn_monitor_thread(
    monitor: Arc<Monitor>,
    running: Arc<AtomicBool>,
    tick_interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            if let Some(event) = monitor.tick(Utc::now()) {
                announce(&event);
            }
            sleep_while_running(&running, tick_interval);
        }
    })
}

#[cfg(feature = "ollama")]
fn spawn_intent_thread(
    config: &Config,
    monitor: Arc<Monitor>,
    running: Arc<AtomicBool>,
) -> Option<JoinHandle<()>> {
    use sati_sensor_agent::providers::CommandContextSource;
    use sati_sensor_agent::BlockingOllamaClient;

    if !config.sources.screen {
        return None;
    }
    let Some(command) = config.screen.capture_command.clone() else {
        eprintln!("Warning: Screen enabled but no capture command configured");
        return None;
    };

    let client = match BlockingOllamaClient::new(config.ai.clone()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Warning: Intent checks disabled: {e}");
            return None;
        }
    };
    match client.is_available() {
        Ok(true) => println!("  Intent judge: {} via {}", config.ai.vision_model, config.ai.host),
        Ok(false) => {
            eprintln!("Warning: Vision model not installed; intent checks will pass by default")
        }
        Err(e) => eprintln!("Warning: Ollama not reachable ({e}); intent checks will pass by default"),
    }

    let context = match CommandContextSource::new(command, config.screen.timeout) {
        Ok(context) => context,
        Err(e) => {
            eprintln!("Warning: Intent checks disabled: {e}");
            return None;
        }
    };
    let check_interval = config.intent.check_interval;
    monitor.tracker().start();

    Some(thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            if let Some(event) = monitor.intent_tick(Utc::now(), &client, &context) {
                announce(&event);
            }
            sleep_while_running(&running, check_interval);
        }
    }))
}

#[cfg(not(feature = "ollama"))]
fn spawn_intent_thread(
    config: &Config,
    _monitor: Arc<Monitor>,
    _running: Arc<AtomicBool>,
) -> Option<JoinHandle<()>> {
    if config.sources.screen {
        eprintln!("Warning: Intent checks need the ollama feature; screen source ignored");
    }
    None
}

#[cfg(feature = "server")]
fn start_server(
    port: u16,
    monitor: Arc<Monitor>,
) -> Option<(tokio::runtime::Runtime, tokio::sync::oneshot::Sender<()>)> {
    use sati_sensor_agent::server::{run, ServerConfig};

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Warning: Could not start server runtime: {e}");
            return None;
        }
    };

    match runtime.block_on(run(ServerConfig::new(port), monitor)) {
        Ok((addr, shutdown_tx)) => {
            println!("Control API: http://{addr}");
            Some((runtime, shutdown_tx))
        }
        Err(e) => {
            eprintln!("Warning: Could not start control API: {e}");
            None
        }
    }
}

fn announce(event: &MonitorEvent) {
    match event {
        MonitorEvent::Intervention(intervention) => {
            println!(
                "[{}] Stress {} ({:.0}) - take a breath and step back for a moment",
                intervention.at.with_timezone(&chrono::Local).format("%H:%M:%S"),
                intervention.level,
                intervention.score
            );
        }
        MonitorEvent::CalmRestored { at } => {
            println!(
                "[{}] Calm restored",
                at.with_timezone(&chrono::Local).format("%H:%M:%S")
            );
        }
        MonitorEvent::IntentMismatch(mismatch) => {
            println!(
                "[{}] You set out to: {}. Still on track?",
                mismatch.at.with_timezone(&chrono::Local).format("%H:%M:%S"),
                mismatch.intent
            );
        }
    }
}

fn cmd_pause() {
    let mut config = load_config();
    config.paused = true;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Monitoring paused. Use 'sati-sensor resume' to continue.");
}

fn cmd_resume() {
    let mut config = load_config();
    config.paused = false;
    if let Err(e) = config.save() {
        eprintln!("Error saving config: {e}");
        std::process::exit(1);
    }
    println!("Monitoring resumed.");
}

fn cmd_status() {
    let config = load_config();

    println!("Sati Sensor Agent Status");
    println!("========================");
    println!();

    let has_permission = check_permission();
    println!(
        "Input Monitoring Permission: {}",
        if has_permission {
            "Granted ✓"
        } else {
            "Not Granted ✗"
        }
    );
    println!();

    println!("Configuration:");
    println!("  Keyboard: {}", enabled(config.sources.keyboard));
    println!("  Mouse: {}", enabled(config.sources.mouse));
    println!("  Breathing: {}", enabled(config.sources.breathing));
    println!("  Posture: {}", enabled(config.sources.posture));
    println!("  Screen: {}", enabled(config.sources.screen));
    println!(
        "  Stress threshold: {} events per {}s",
        config.detection.stress_threshold,
        config.detection.window_duration.as_secs()
    );
    println!("  Cooldown: {}s", config.intervention.cooldown.as_secs());
    println!("  Paused: {}", config.paused);
    println!();

    let stats_path = config.data_path.join("transparency.json");
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                for (key, label) in [
                    ("keyboard_events", "Keyboard events"),
                    ("mouse_events", "Mouse events"),
                    ("ticks", "Monitoring ticks"),
                    ("interventions", "Interventions"),
                    ("calm_restorations", "Calm restorations"),
                    ("intent_checks", "Intent checks"),
                    ("intent_mismatches", "Intent mismatches"),
                ] {
                    if let Some(value) = stats.get(key) {
                        println!("  {label}: {value}");
                    }
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
}

fn cmd_export(output: Option<PathBuf>, format: &str) {
    let config = load_config();
    let export_dir = output.unwrap_or(config.export_path.clone());

    let session_files: Vec<PathBuf> = std::fs::read_dir(&export_dir)
        .map(|entries| {
            let mut files: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension().map(|e| e == "json").unwrap_or(false)
                        && p.file_name()
                            .and_then(|n| n.to_str())
                            .map(|n| n.starts_with("session_"))
                            .unwrap_or(false)
                })
                .collect();
            files.sort();
            files
        })
        .unwrap_or_default();

    if session_files.is_empty() {
        println!("No session reports found in {export_dir:?}");
        println!("Run 'sati-sensor start' to begin monitoring.");
        return;
    }

    println!(
        "Found {} session report(s) in {:?}",
        session_files.len(),
        export_dir
    );

    let mut reports: Vec<SessionReport> = Vec::new();
    for file in &session_files {
        match std::fs::read_to_string(file)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<SessionReport>(&content).map_err(|e| e.to_string())
            }) {
            Ok(report) => reports.push(report),
            Err(e) => eprintln!("Warning: Skipping {file:?}: {e}"),
        }
    }

    let interventions: usize = reports.iter().map(|r| r.interventions.len()).sum();
    let mismatches: u64 = reports.iter().map(|r| r.total_mismatches()).sum();
    println!(
        "Total: {} sessions, {} interventions, {} intent mismatches",
        reports.len(),
        interventions,
        mismatches
    );

    let output_path = export_dir.join(format!(
        "export_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        if format == "jsonl" { "jsonl" } else { "json" }
    ));

    let result = if format == "jsonl" {
        let lines: Vec<String> = reports
            .iter()
            .filter_map(|r| serde_json::to_string(r).ok())
            .collect();
        std::fs::write(&output_path, lines.join("\n"))
    } else {
        match serde_json::to_string_pretty(&reports) {
            Ok(json) => std::fs::write(&output_path, json),
            Err(e) => {
                eprintln!("Error serializing: {e}");
                return;
            }
        }
    };

    match result {
        Ok(_) => println!("Exported to {output_path:?}"),
        Err(e) => eprintln!("Error writing export: {e}"),
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
