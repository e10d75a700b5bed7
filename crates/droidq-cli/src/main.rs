//! CLI for querying and driving Android UI hierarchies over adb.
//!
//! # Usage
//!
//! ```bash
//! # List attached devices
//! droidq devices
//!
//! # Print the raw uiautomator dump
//! droidq dump > screen.xml
//!
//! # Find elements (all conditions must hold; `*`, `?` and `|` are supported)
//! droidq query -w class='*.Button|*.ImageButton' -w clickable=true
//!
//! # Query a saved dump instead of a device
//! droidq query --file screen.xml -w text='Sign*'
//!
//! # Tap the first (or Nth) matching element
//! droidq tap -w text=OK
//! droidq tap -w resource-id='*:id/title' --index 1
//!
//! # Raw input
//! droidq tap-location 540 1200
//! droidq long-press 540 1200 --duration 800
//! droidq key BACK
//!
//! # Device info
//! droidq screen-size
//! droidq activity
//!
//! # Target a specific device
//! droidq -s emulator-5554 query -w text=OK
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use droidq_core::adb::{Adb, AdbDevice, AdbError};
use droidq_core::config::DroidqConfig;
use droidq_core::element::{Element, ElementError};
use droidq_core::extract::{parse_condition, Conditions};
use droidq_core::source::{DumpSource, FileSource, SourceError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// CLI for querying and driving Android UI hierarchies over adb.
#[derive(Parser)]
#[command(name = "droidq")]
#[command(about = "Query and drive Android UI hierarchies over adb")]
#[command(version)]
struct Cli {
    /// Device serial (defaults to the configured or first online device)
    #[arg(short, long, global = true, env = "DROIDQ_SERIAL")]
    serial: Option<String>,

    /// Path to the adb executable
    #[arg(long, global = true, env = "DROIDQ_ADB")]
    adb: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, env = "DROIDQ_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List attached devices
    Devices,

    /// Print the raw UI hierarchy dump
    Dump,

    /// Find elements whose attributes match all conditions
    Query {
        /// Condition as ATTRIBUTE=PATTERN (repeatable)
        #[arg(short = 'w', long = "where", value_parser = parse_condition)]
        conditions: Vec<(String, String)>,
        /// Read the dump from a file instead of the device
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Tap the center of a matching element
    Tap {
        /// Condition as ATTRIBUTE=PATTERN (repeatable)
        #[arg(short = 'w', long = "where", value_parser = parse_condition, required = true)]
        conditions: Vec<(String, String)>,
        /// Which match to tap, in document order
        #[arg(short, long, default_value = "0")]
        index: usize,
    },

    /// Tap at screen coordinates
    TapLocation {
        /// X coordinate
        x: f64,
        /// Y coordinate
        y: f64,
    },

    /// Long-press at screen coordinates
    LongPress {
        /// X coordinate
        x: i32,
        /// Y coordinate
        y: i32,
        /// Press duration in milliseconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// Send a key event by name (BACK, HOME, ENTER, ...) or keycode
    Key {
        /// Key name or numeric keycode
        key: String,
    },

    /// Print the screen resolution
    ScreenSize,

    /// Print the focused package and activity
    Activity,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_logging(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().unwrap_or(OsStr::new("droidq.log"));
            let file_appender = tracing_appender::rolling::never(dir, name);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file_appender)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[derive(Debug)]
enum CliError {
    Device(String),
    ActionFailed(String),
    Format(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::ActionFailed(_) => 1,
            CliError::Device(_) => 2,
            CliError::Format(_) => 3,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Device(msg) => write!(f, "Device error: {}", msg),
            CliError::ActionFailed(msg) => write!(f, "Action failed: {}", msg),
            CliError::Format(msg) => write!(f, "Format error: {}", msg),
        }
    }
}

impl From<AdbError> for CliError {
    fn from(e: AdbError) -> Self {
        match e {
            AdbError::Hierarchy(_) => CliError::Format(e.to_string()),
            AdbError::MissingBounds | AdbError::Parse(_) => CliError::ActionFailed(e.to_string()),
            other => CliError::Device(other.to_string()),
        }
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Adb(e) => e.into(),
            SourceError::Read { .. } => CliError::Device(e.to_string()),
            SourceError::Hierarchy(_) => CliError::Format(e.to_string()),
        }
    }
}

impl From<ElementError> for CliError {
    fn from(e: ElementError) -> Self {
        CliError::Format(e.to_string())
    }
}

fn load_config(cli: &Cli) -> DroidqConfig {
    let mut config = DroidqConfig::load();
    if let Some(adb) = &cli.adb {
        config.adb_path = adb.clone();
    }
    if let Some(serial) = &cli.serial {
        config.default_serial = Some(serial.clone());
    }
    config
}

async fn connect(cli: &Cli) -> Result<AdbDevice, CliError> {
    let config = load_config(cli);
    let adb = Adb::new(config.clone());
    let device = match &config.default_serial {
        Some(serial) => adb.find_device(serial).await?,
        None => adb.first_device().await?,
    };
    debug!(serial = device.serial(), "Selected device");
    Ok(device)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Devices => list_devices(&cli).await,
        Command::Dump => {
            let device = connect(&cli).await?;
            print!("{}", device.dump_xml().await?);
            Ok(())
        }
        Command::Query { conditions, file } => {
            let conditions: Conditions = conditions.iter().cloned().collect();
            let source: Box<dyn DumpSource> = match file {
                Some(path) => Box::new(FileSource::new(path)),
                None => Box::new(connect(&cli).await?),
            };
            let hierarchy = source.hierarchy().await?;
            let elements = hierarchy.extract(&conditions)?;
            print_elements(&cli, &elements)
        }
        Command::Tap { conditions, index } => {
            let conditions: Conditions = conditions.iter().cloned().collect();
            let device = connect(&cli).await?;
            let hierarchy = device.hierarchy().await?;
            let elements = hierarchy.extract(&conditions)?;
            let element = elements.get(*index).ok_or_else(|| {
                CliError::ActionFailed(format!(
                    "No element #{} matches {} ({} found)",
                    index,
                    describe(&conditions),
                    elements.len()
                ))
            })?;
            device.tap_element(element).await?;
            info!(element = %format_element_pretty(element), "Tapped element");
            report(&cli, "tap", &format_element_pretty(element));
            Ok(())
        }
        Command::TapLocation { x, y } => {
            let device = connect(&cli).await?;
            device.tap(*x, *y).await?;
            report(&cli, "tap-location", &format!("({}, {})", x, y));
            Ok(())
        }
        Command::LongPress { x, y, duration } => {
            let device = connect(&cli).await?;
            device
                .long_press(*x, *y, duration.map(Duration::from_millis))
                .await?;
            report(&cli, "long-press", &format!("({}, {})", x, y));
            Ok(())
        }
        Command::Key { key } => {
            let device = connect(&cli).await?;
            device.key(key).await?;
            report(&cli, "key", key);
            Ok(())
        }
        Command::ScreenSize => {
            let device = connect(&cli).await?;
            let size = device.screen_size().await?;
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::json!(size));
            } else {
                println!("{}x{}", size.width, size.height);
            }
            Ok(())
        }
        Command::Activity => {
            let device = connect(&cli).await?;
            match device.current_activity().await? {
                Some(activity) => {
                    if cli.format == OutputFormat::Json {
                        println!("{}", serde_json::json!(activity));
                    } else {
                        println!("{}/{}", activity.package_name, activity.activity_name);
                    }
                    Ok(())
                }
                None => Err(CliError::ActionFailed(
                    "Could not determine the focused activity".to_string(),
                )),
            }
        }
    }
}

async fn list_devices(cli: &Cli) -> Result<(), CliError> {
    let adb = Adb::new(load_config(cli));
    let devices = adb.devices().await?;
    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::json!({ "devices": devices }));
    } else if devices.is_empty() {
        eprintln!("No devices attached");
    } else {
        for device in &devices {
            println!("{}\t{}", device.serial, device.state);
        }
    }
    Ok(())
}

fn print_elements(cli: &Cli, elements: &[Element]) -> Result<(), CliError> {
    if cli.format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(elements)
            .map_err(|e| CliError::Format(e.to_string()))?;
        println!("{}", json);
    } else {
        for element in elements {
            println!("{}", format_element_pretty(element));
        }
        if !cli.quiet {
            eprintln!("{} element(s) matched", elements.len());
        }
    }
    Ok(())
}

fn report(cli: &Cli, action: &str, target: &str) {
    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::json!({ "success": true, "action": action, "target": target }));
    } else if !cli.quiet {
        eprintln!("|{}|{}|", action, target);
    }
}

fn describe(conditions: &Conditions) -> String {
    conditions
        .iter()
        .map(|(name, pattern)| format!("{}={}", name, pattern))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format an element on one line: `[Class] resource-id "text" @(cx,cy)`
fn format_element_pretty(element: &Element) -> String {
    let mut parts = Vec::new();
    let class = element
        .class_name()
        .map(|c| c.rsplit('.').next().unwrap_or(c))
        .unwrap_or("Unknown");
    parts.push(format!("[{}]", class));
    if let Some(id) = element.resource_id().filter(|id| !id.is_empty()) {
        parts.push(id.to_string());
    }
    let label = element
        .text()
        .filter(|t| !t.is_empty())
        .or_else(|| element.content_desc().filter(|d| !d.is_empty()));
    if let Some(label) = label {
        parts.push(format!("\"{}\"", label));
    }
    if let Some(bounds) = element.bounds {
        let (x, y) = bounds.center();
        parts.push(format!("@({},{})", x, y));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use droidq_core::element::RawNode;

    #[test]
    fn test_format_element_pretty() {
        let node = RawNode::new()
            .with_attribute("class", "android.widget.Button")
            .with_attribute("resource-id", "com.example:id/ok")
            .with_attribute("text", "OK")
            .with_attribute("bounds", "[0,0][100,50]");
        let element = Element::new(&node).unwrap();
        assert_eq!(
            format_element_pretty(&element),
            "[Button] com.example:id/ok \"OK\" @(50,25)"
        );
    }

    #[test]
    fn test_format_element_falls_back_to_content_desc() {
        let node = RawNode::new()
            .with_attribute("class", "android.widget.ImageButton")
            .with_attribute("resource-id", "")
            .with_attribute("text", "")
            .with_attribute("content-desc", "More options");
        let element = Element::new(&node).unwrap();
        assert_eq!(format_element_pretty(&element), "[ImageButton] \"More options\"");
    }

    #[test]
    fn test_format_element_without_class() {
        let node = RawNode::new();
        let element = Element::new(&node).unwrap();
        assert_eq!(format_element_pretty(&element), "[Unknown]");
    }

    #[test]
    fn test_describe_conditions() {
        let conditions: Conditions = [("text", "OK"), ("class", "*Button")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        // BTreeMap orders by attribute name.
        assert_eq!(describe(&conditions), "class=*Button text=OK");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(CliError::ActionFailed("x".into()).exit_code(), 1);
        assert_eq!(CliError::from(AdbError::NoDevices).exit_code(), 2);
        let malformed = ElementError::MalformedBounds { value: "[0,0]".into() };
        assert_eq!(CliError::from(malformed).exit_code(), 3);
    }

    #[test]
    fn test_cli_parses_conditions() {
        let cli = Cli::try_parse_from(["droidq", "query", "-w", "class=*Button", "--where", "text=a=b"]).unwrap();
        match cli.command {
            Command::Query { conditions, file } => {
                assert!(file.is_none());
                assert_eq!(
                    conditions,
                    [
                        ("class".to_string(), "*Button".to_string()),
                        ("text".to_string(), "a=b".to_string()),
                    ]
                );
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn test_cli_rejects_bad_condition() {
        assert!(Cli::try_parse_from(["droidq", "query", "-w", "class"]).is_err());
        assert!(Cli::try_parse_from(["droidq", "tap"]).is_err());
    }
}
