//! Device Lane CLI
//!
//! Entry point for the `device-lane` command-line tool.

use clap::{Parser, Subcommand};
use device_lane::adb::AdbRegistry;
use device_lane::config::{
    default_config_path, env_layer, ConfigError, EffectiveConfig, LaneSettings,
};
use device_lane::mock::MockRegistry;
use device_lane::signal::{self, SignalState};
use device_lane::{init_logging, ops, serve, Dispatcher, Target};
use lane_backend::DeviceRegistry;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "device-lane")]
#[command(about = "Per-device session lane for Android automation", version)]
struct Cli {
    /// Path to config file (default: ~/.config/device-lane/lane.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Serial used when a request names no device
    #[arg(long, global = true)]
    default_serial: Option<String>,

    /// Worker pool size
    #[arg(long, global = true)]
    max_workers: Option<usize>,

    /// Idle session expiry in seconds (<= 0 disables)
    #[arg(long, global = true, allow_negative_numbers = true)]
    session_ttl: Option<f64>,

    /// Seconds between session health checks (<= 0 checks every access)
    #[arg(long, global = true, allow_negative_numbers = true)]
    healthcheck_interval: Option<f64>,

    /// Connect retries after the first attempt
    #[arg(long, global = true)]
    connect_retries: Option<u32>,

    /// Base connect backoff in seconds
    #[arg(long, global = true)]
    connect_backoff: Option<f64>,

    /// adb executable
    #[arg(long, global = true)]
    adb: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List connected devices
    Devices {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run one shell command on a device
    Exec {
        /// Target device serial
        #[arg(long, short = 's')]
        serial: Option<String>,

        /// The shell command (after --)
        #[arg(last = true, required = true)]
        cmd: Vec<String>,
    },

    /// Serve line-delimited JSON requests on stdin/stdout
    Serve {
        /// Use in-process mock devices instead of adb
        #[arg(long, value_delimiter = ',')]
        mock_devices: Option<Vec<String>>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as JSON
    Show,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (effective, settings) = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(2);
        }
    };

    match cli.command {
        Commands::Devices { json } => run_devices(&settings, json),
        Commands::Exec { serial, cmd } => run_exec(&settings, serial, cmd),
        Commands::Serve { mock_devices } => run_serve(&settings, mock_devices),
        Commands::Config { action } => match action {
            ConfigCommands::Show => run_config_show(&effective),
        },
    }
}

fn load_config(cli: &Cli) -> Result<(EffectiveConfig, LaneSettings), ConfigError> {
    let env = env_layer(std::env::vars())?;
    let default_path = default_config_path();
    EffectiveConfig::build(cli.config.as_deref(), default_path.as_deref(), env, cli_layer(cli))
}

/// Config layer from global flags, `None` if no flag was given
fn cli_layer(cli: &Cli) -> Option<Value> {
    let mut layer = Map::new();
    if let Some(serial) = &cli.default_serial {
        layer.insert("default_serial".into(), Value::from(serial.as_str()));
    }
    if let Some(n) = cli.max_workers {
        layer.insert("max_workers".into(), Value::from(n));
    }
    if let Some(s) = cli.session_ttl {
        layer.insert("session_ttl_seconds".into(), Value::from(s));
    }
    if let Some(s) = cli.healthcheck_interval {
        layer.insert("healthcheck_interval_seconds".into(), Value::from(s));
    }
    if let Some(n) = cli.connect_retries {
        layer.insert("connect_retries".into(), Value::from(n));
    }
    if let Some(s) = cli.connect_backoff {
        layer.insert("connect_backoff_seconds".into(), Value::from(s));
    }
    if let Some(adb) = &cli.adb {
        layer.insert("adb_path".into(), Value::from(adb.as_str()));
    }
    (!layer.is_empty()).then_some(Value::Object(layer))
}

fn build_dispatcher(registry: Arc<dyn DeviceRegistry>, settings: &LaneSettings) -> Dispatcher {
    match Dispatcher::from_settings(registry, settings) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error starting worker pool: {}", e);
            process::exit(1);
        }
    }
}

fn run_devices(settings: &LaneSettings, json: bool) {
    let dispatcher = build_dispatcher(Arc::new(AdbRegistry::new(&settings.adb_path)), settings);

    let devices = match dispatcher.list_devices() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error listing devices: {}", e);
            process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&devices) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error serializing devices: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    if devices.is_empty() {
        println!("No devices connected.");
        return;
    }
    println!("{:<24} {:<10} {:<20} {}", "SERIAL", "STATE", "MODEL", "ANDROID");
    for device in devices {
        println!(
            "{:<24} {:<10} {:<20} {}",
            device.serial,
            device.state,
            device.model.as_deref().unwrap_or("-"),
            device.android_version.as_deref().unwrap_or("-")
        );
    }
}

fn run_exec(settings: &LaneSettings, serial: Option<String>, cmd: Vec<String>) {
    let dispatcher = build_dispatcher(Arc::new(AdbRegistry::new(&settings.adb_path)), settings);
    let target = Target::from_option(serial.as_deref());

    let result = ops::shell(&dispatcher, target, &cmd.join(" "));
    dispatcher.shutdown();

    match result {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            process::exit(1);
        }
    }
}

fn run_serve(settings: &LaneSettings, mock_devices: Option<Vec<String>>) {
    let registry: Arc<dyn DeviceRegistry> = match mock_devices {
        Some(serials) => Arc::new(MockRegistry::with_serials(
            serials.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        )),
        None => Arc::new(AdbRegistry::new(&settings.adb_path)),
    };
    let dispatcher = Arc::new(build_dispatcher(registry, settings));

    let on_interrupt = Arc::clone(&dispatcher);
    if let Err(e) = signal::install(Arc::new(SignalState::new()), move || on_interrupt.shutdown()) {
        eprintln!("Warning: could not install interrupt handler: {}", e);
    }

    let stdin = io::stdin();
    let output = Mutex::new(io::stdout());
    if let Err(e) = serve(&dispatcher, BufReader::new(stdin.lock()), &output) {
        eprintln!("Error reading requests: {}", e);
        process::exit(1);
    }
}

fn run_config_show(effective: &EffectiveConfig) {
    match effective.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing config: {}", e);
            process::exit(1);
        }
    }
}
