//! Interface to the Android Debug Bridge (`adb`) command-line tool.
//!
//! This module wraps the handful of `adb` invocations droidq needs: listing
//! devices, capturing `uiautomator` dumps, and injecting input. Command output
//! parsing (device lists, `wm size`, `dumpsys window`, `getevent -lp`) is done
//! by pure functions that are exposed for testing.
//!
//! Process spawning goes through the [`CommandRunner`] trait so the device
//! logic can be exercised without a real device.
//!
//! # Example
//!
//! ```no_run
//! use droidq_core::adb::Adb;
//! use droidq_core::config::DroidqConfig;
//! use droidq_core::extract::Conditions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let adb = Adb::new(DroidqConfig::load());
//! let device = adb.first_device().await?;
//!
//! let mut conditions = Conditions::new();
//! conditions.insert("text".into(), "OK|Continue".into());
//!
//! let hierarchy = device.hierarchy().await?;
//! if let Some(button) = hierarchy.first(&conditions)? {
//!     device.tap_element(&button).await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DroidqConfig;
use crate::element::Element;
use crate::hierarchy::{Hierarchy, HierarchyError};

/// Marker `uiautomator` prints while the UI is not ready to be dumped.
const DUMP_NOT_READY_MARKER: &str = "ERROR";

/// Opening tag of a successful dump.
const HIERARCHY_TAG: &str = "<hierarchy";

/// Header line of `adb devices` output.
const DEVICE_LIST_HEADER: &str = "List of devices";

/// Errors that can occur when talking to a device through adb.
#[derive(Error, Debug)]
pub enum AdbError {
    /// An adb command exited unsuccessfully (after retries).
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// No device is attached in the `device` state.
    #[error("No online Android device found")]
    NoDevices,

    /// The requested serial is not attached or not online.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device kept reporting that the UI could not be dumped.
    #[error("UI dump not ready after {attempts} attempts")]
    DumpNotReady {
        /// Number of dump attempts made.
        attempts: u32,
    },

    /// Command output did not have the expected shape.
    #[error("Unexpected adb output: {0}")]
    Parse(String),

    /// An element without bounds cannot be tapped.
    #[error("Element has no bounds")]
    MissingBounds,

    /// No touchscreen input device was reported by `getevent -lp`.
    #[error("No touchscreen input device found")]
    NoTouchScreen,

    /// The dump could not be parsed.
    #[error("Hierarchy error: {0}")]
    Hierarchy(#[from] HierarchyError),

    /// An I/O error occurred while spawning adb.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs one adb invocation and returns its standard output.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs adb with the given arguments.
    async fn run(&self, args: &[String]) -> Result<String, AdbError>;
}

/// [`CommandRunner`] that spawns the real `adb` binary.
///
/// A non-zero exit is retried up to `retries` times before being reported as
/// [`AdbError::CommandFailed`]. Failure to spawn the binary at all is not
/// retried.
#[derive(Debug, Clone)]
pub struct AdbBinary {
    path: PathBuf,
    retries: u32,
}

impl AdbBinary {
    /// Creates a runner for the adb executable at `path`.
    pub fn new(path: impl Into<PathBuf>, retries: u32) -> Self {
        Self {
            path: path.into(),
            retries,
        }
    }
}

#[async_trait]
impl CommandRunner for AdbBinary {
    async fn run(&self, args: &[String]) -> Result<String, AdbError> {
        let mut attempt = 0;
        loop {
            debug!(adb = %self.path.display(), args = ?args, attempt, "Running adb");
            let output = tokio::process::Command::new(&self.path)
                .args(args)
                .output()
                .await?;

            if output.status.success() {
                return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
            }

            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if attempt >= self.retries {
                return Err(AdbError::CommandFailed(stderr));
            }
            attempt += 1;
            warn!(attempt, error = %stderr, "adb command failed, retrying");
        }
    }
}

/// An attached device as reported by `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidDevice {
    /// The device serial (e.g. `emulator-5554`).
    pub serial: String,
    /// The connection state (`device`, `offline`, `unauthorized`, ...).
    pub state: String,
}

impl AndroidDevice {
    /// Returns true if the device is ready to accept commands.
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

/// Screen resolution in pixels, from `wm size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    /// Horizontal resolution.
    pub width: u32,
    /// Vertical resolution.
    pub height: u32,
}

/// The focused activity, from `dumpsys window windows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Application package (e.g. `com.android.settings`).
    pub package_name: String,
    /// Activity class, as printed by dumpsys (e.g. `.Settings`).
    pub activity_name: String,
}

/// The touchscreen input device, from `getevent -lp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchScreen {
    /// Input device node (e.g. `/dev/input/event2`).
    pub path: String,
    /// Maximum value of `ABS_MT_POSITION_X`.
    pub max: u32,
}

/// Entry point for adb operations that are not tied to one device.
#[derive(Clone)]
pub struct Adb {
    runner: Arc<dyn CommandRunner>,
    config: DroidqConfig,
}

impl Adb {
    /// Creates an `Adb` that spawns the binary configured in `config`.
    pub fn new(config: DroidqConfig) -> Self {
        let runner = AdbBinary::new(config.adb_path.clone(), config.command_retries);
        Self::with_runner(Arc::new(runner), config)
    }

    /// Creates an `Adb` backed by a custom runner.
    pub fn with_runner(runner: Arc<dyn CommandRunner>, config: DroidqConfig) -> Self {
        Self { runner, config }
    }

    /// Lists attached devices in any state.
    pub async fn devices(&self) -> Result<Vec<AndroidDevice>, AdbError> {
        let output = self.runner.run(&args(["devices"])).await?;
        Ok(Self::parse_devices(&output))
    }

    /// Returns a handle for the device with the given serial.
    ///
    /// The device is not contacted until a command is sent.
    pub fn device(&self, serial: impl Into<String>) -> AdbDevice {
        AdbDevice {
            runner: self.runner.clone(),
            serial: serial.into(),
            config: self.config.clone(),
        }
    }

    /// Returns a handle for the configured default device, or else the
    /// first online device.
    ///
    /// # Errors
    ///
    /// - [`AdbError::NoDevices`] if no default is configured and no device is online
    /// - Any error from [`Self::devices`]
    pub async fn first_device(&self) -> Result<AdbDevice, AdbError> {
        if let Some(serial) = &self.config.default_serial {
            return Ok(self.device(serial.clone()));
        }
        let devices = self.devices().await?;
        let device = devices
            .into_iter()
            .find(AndroidDevice::is_online)
            .ok_or(AdbError::NoDevices)?;
        info!(serial = %device.serial, "Using first online device");
        Ok(self.device(device.serial))
    }

    /// Returns a handle for `serial` after checking that it is attached and online.
    ///
    /// # Errors
    ///
    /// - [`AdbError::DeviceNotFound`] if the serial is missing or not in the `device` state
    pub async fn find_device(&self, serial: &str) -> Result<AdbDevice, AdbError> {
        let devices = self.devices().await?;
        if devices.iter().any(|d| d.serial == serial && d.is_online()) {
            Ok(self.device(serial))
        } else {
            Err(AdbError::DeviceNotFound(serial.to_string()))
        }
    }

    /// Parses `adb devices` output.
    ///
    /// Returns an empty list if the output lacks the `List of devices` header.
    pub fn parse_devices(output: &str) -> Vec<AndroidDevice> {
        if !output.contains(DEVICE_LIST_HEADER) {
            return Vec::new();
        }
        output
            .lines()
            .skip_while(|line| !line.contains(DEVICE_LIST_HEADER))
            .skip(1)
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let serial = parts.next()?;
                let state = parts.next()?;
                Some(AndroidDevice {
                    serial: serial.to_string(),
                    state: state.to_string(),
                })
            })
            .collect()
    }
}

/// A handle for issuing commands to one device.
#[derive(Clone)]
pub struct AdbDevice {
    runner: Arc<dyn CommandRunner>,
    serial: String,
    config: DroidqConfig,
}

impl AdbDevice {
    /// The device serial.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Returns true if the serial names an emulator instance.
    pub fn is_emulator(&self) -> bool {
        self.serial.starts_with("emulator-")
    }

    /// Runs `adb -s <serial> <args...>`.
    pub async fn send<I, S>(&self, command: I) -> Result<String, AdbError>
    where
        I: IntoIterator<Item = S> + Send,
        S: Into<String>,
    {
        let mut full = vec!["-s".to_string(), self.serial.clone()];
        full.extend(command.into_iter().map(Into::into));
        self.runner.run(&full).await
    }

    /// Runs `adb -s <serial> shell <command>`.
    pub async fn shell(&self, command: &str) -> Result<String, AdbError> {
        self.send(["shell".to_string(), command.to_string()]).await
    }

    /// Captures the raw `uiautomator` XML dump.
    ///
    /// While the output contains `ERROR` (the UI is mid-transition), waits
    /// [`DroidqConfig::dump_retry_delay_ms`] and tries again, up to
    /// [`DroidqConfig::dump_max_attempts`] attempts.
    ///
    /// # Errors
    ///
    /// - [`AdbError::DumpNotReady`] if every attempt reported `ERROR`
    /// - Any error from running adb
    pub async fn dump_xml(&self) -> Result<String, AdbError> {
        let attempts = self.config.dump_max_attempts.max(1);
        for attempt in 1..=attempts {
            let output = self
                .send(["exec-out", "uiautomator", "dump", "/dev/tty"])
                .await?;
            if !is_dump_not_ready(&output) {
                debug!(serial = %self.serial, bytes = output.len(), attempt, "Captured dump");
                return Ok(output);
            }
            debug!(serial = %self.serial, attempt, "Dump not ready");
            if attempt < attempts {
                tokio::time::sleep(self.config.dump_retry_delay()).await;
            }
        }
        Err(AdbError::DumpNotReady { attempts })
    }

    /// Captures and parses the current UI hierarchy.
    pub async fn hierarchy(&self) -> Result<Hierarchy, AdbError> {
        let xml = self.dump_xml().await?;
        Ok(Hierarchy::parse(&xml)?)
    }

    /// Taps at screen coordinates, rounded to whole pixels.
    pub async fn tap(&self, x: f64, y: f64) -> Result<(), AdbError> {
        let command = format!("input tap {} {}", x.round(), y.round());
        self.shell(&command).await.map(drop)
    }

    /// Taps the center of an element's bounds.
    ///
    /// # Errors
    ///
    /// - [`AdbError::MissingBounds`] if the element has no bounds
    pub async fn tap_element(&self, element: &Element<'_>) -> Result<(), AdbError> {
        let (x, y) = element.bounds.ok_or(AdbError::MissingBounds)?.center();
        self.tap(f64::from(x), f64::from(y)).await
    }

    /// Long-presses at screen coordinates, implemented as a zero-length swipe.
    ///
    /// `duration` defaults to [`DroidqConfig::long_press_ms`].
    pub async fn long_press(&self, x: i32, y: i32, duration: Option<Duration>) -> Result<(), AdbError> {
        let millis = duration.map_or(self.config.long_press_ms, |d| {
            u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
        });
        let command = format!("input swipe {x} {y} {x} {y} {millis}");
        self.shell(&command).await.map(drop)
    }

    /// Sends a key event. Accepts a name such as `BACK` or a numeric keycode.
    pub async fn key(&self, key: &str) -> Result<(), AdbError> {
        let code = key_code(key).ok_or_else(|| AdbError::Parse(format!("Unknown key: {key}")))?;
        self.shell(&format!("input keyevent {code}")).await.map(drop)
    }

    /// Reads the screen resolution via `wm size`.
    pub async fn screen_size(&self) -> Result<ScreenSize, AdbError> {
        let output = self.shell("wm size").await?;
        parse_screen_size(&output)
            .ok_or_else(|| AdbError::Parse(format!("No resolution in: {}", output.trim())))
    }

    /// Reads the focused activity, if one can be identified.
    pub async fn current_activity(&self) -> Result<Option<Activity>, AdbError> {
        let output = self
            .shell("dumpsys window windows | grep -E 'mCurrentFocus|mFocusedApp'")
            .await?;
        Ok(parse_current_activity(&output))
    }

    /// Locates the touchscreen input device via `getevent -lp`.
    pub async fn touchscreen(&self) -> Result<TouchScreen, AdbError> {
        let output = self.shell("getevent -lp").await?;
        parse_touchscreen(&output).ok_or(AdbError::NoTouchScreen)
    }

    /// Presses and releases the touchscreen with raw `sendevent` writes.
    ///
    /// Lower level than [`tap`](Self::tap): it bypasses the input manager and
    /// holds the contact for `duration` before lifting.
    pub async fn touch(&self, x: i32, y: i32, duration: Duration) -> Result<(), AdbError> {
        let screen = self.touchscreen().await?;
        let (down, up) = sendevent_commands(&screen.path, x, y, self.is_emulator());
        self.shell(&down).await?;
        tokio::time::sleep(duration).await;
        self.shell(&up).await.map(drop)
    }

    /// Copies a local file to the device.
    pub async fn push(&self, src: &str, dst: &str) -> Result<String, AdbError> {
        self.send(["push", src, dst]).await
    }
}

/// A dump is not ready when it reports `ERROR` and carries no hierarchy.
///
/// A real hierarchy whose node text happens to contain `ERROR` is accepted.
fn is_dump_not_ready(output: &str) -> bool {
    output.contains(DUMP_NOT_READY_MARKER) && !output.contains(HIERARCHY_TAG)
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Resolves a key name (case-insensitive) or a numeric keycode.
pub fn key_code(key: &str) -> Option<u32> {
    if let Ok(code) = key.parse::<u32>() {
        return Some(code);
    }
    let code = match key.to_ascii_uppercase().trim_start_matches("KEYCODE_") {
        "HOME" => 3,
        "BACK" => 4,
        "VOLUME_UP" => 24,
        "VOLUME_DOWN" => 25,
        "POWER" => 26,
        "ENTER" => 66,
        "DEL" => 67,
        "MENU" => 82,
        "APP_SWITCH" => 187,
        _ => return None,
    };
    Some(code)
}

/// Extracts the first `<width>x<height>` pair from `wm size` output.
///
/// When an override size is present it follows the physical size, so the
/// physical resolution is returned.
pub fn parse_screen_size(output: &str) -> Option<ScreenSize> {
    output.split_whitespace().find_map(|token| {
        let (w, h) = token.split_once('x')?;
        Some(ScreenSize {
            width: w.parse().ok()?,
            height: h.parse().ok()?,
        })
    })
}

/// Extracts package and activity from an `ActivityRecord{<hex> u0 <pkg>/<activity> t<n>}` record.
pub fn parse_current_activity(output: &str) -> Option<Activity> {
    output
        .split("ActivityRecord{")
        .skip(1)
        .find_map(|record| {
            let body = &record[..record.find('}')?];
            let tokens: Vec<&str> = body.split_whitespace().collect();
            let [hash, user, component, task] = tokens.as_slice() else {
                return None;
            };
            let is_hex = !hash.is_empty() && hash.chars().all(|c| c.is_ascii_hexdigit());
            let is_task = task
                .strip_prefix('t')
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
            if !is_hex || *user != "u0" || !is_task {
                return None;
            }
            let (package, activity) = component.split_once('/')?;
            Some(Activity {
                package_name: package.to_string(),
                activity_name: activity.to_string(),
            })
        })
}

/// Finds the input device that reports `ABS_MT_POSITION_X`, and its `max`.
pub fn parse_touchscreen(output: &str) -> Option<TouchScreen> {
    let mut current: Option<&str> = None;
    for line in output.lines() {
        if line.contains("add device") {
            current = line
                .split_whitespace()
                .find(|token| token.starts_with("/dev/input/event"));
        }
        if line.contains("ABS_MT_POSITION_X") {
            let path = current?;
            let max = line
                .split(',')
                .find_map(|field| field.trim().strip_prefix("max "))
                .and_then(|value| value.trim().parse().ok())?;
            return Some(TouchScreen {
                path: path.to_string(),
                max,
            });
        }
    }
    None
}

/// Builds the `sendevent` shell lines for a touch down and the matching lift.
///
/// Emulators accept the bare multitouch position events; physical devices
/// also need a tracking id and `BTN_TOUCH`.
pub fn sendevent_commands(device: &str, x: i32, y: i32, emulator: bool) -> (String, String) {
    let (down, up): (Vec<String>, Vec<String>) = if emulator {
        (
            vec![
                format!("3 53 {x}"),
                format!("3 54 {y}"),
                "0 2 0".into(),
                "0 0 0".into(),
            ],
            vec!["0 2 0".into(), "0 0 0".into(), "0 2 0".into(), "0 0 0".into()],
        )
    } else {
        (
            vec![
                "3 57 1381".into(),
                format!("3 53 {x}"),
                format!("3 54 {y}"),
                "1 330 1".into(),
                "0 0 0".into(),
            ],
            vec!["3 57 4294967295".into(), "1 330 0".into(), "0 0 0".into()],
        )
    };
    let join = |events: Vec<String>| {
        events
            .iter()
            .map(|event| format!("sendevent {device} {event}"))
            .collect::<Vec<_>>()
            .join("; ")
    };
    (join(down), join(up))
}
