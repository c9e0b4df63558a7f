//! Core types for mobtarget-sdk.
//!
//! This module defines the fundamental types used throughout the SDK:
//!
//! - [`DeployError`] - Error type for every build, install and launch operation
//! - [`Arch`] / [`Variant`] - Instruction-set selection and the bundle variant it implies
//! - [`DeviceFamily`] - Simulator device family selector
//! - [`TargetConfig`] / [`ToolPaths`] - Per-target configuration handed in by the caller

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Result alias used across the SDK.
pub type Result<T, E = DeployError> = std::result::Result<T, E>;

/// Error types for mobtarget-sdk operations.
///
/// Every variant carries enough context (command line, exit code or path)
/// to be shown to a user as-is.
///
/// # Example
///
/// ```
/// use mobtarget_sdk::{Arch, DeployError, Variant};
///
/// match Variant::from_arch(Arch::X86_64) {
///     Err(DeployError::Config(msg)) => assert!(msg.contains("x86_64")),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Invalid or unusable configuration.
    ///
    /// Raised before any external tool runs: unsupported architecture,
    /// no matching SDK, unparsable override manifest or entitlements.
    #[error("configuration error: {0}")]
    Config(String),

    /// An external tool could not be started.
    #[error("failed to start `{command} {}`: {source}\n\nEnsure the tool is installed and available on PATH.", .args.join(" "))]
    Spawn {
        command: String,
        args: Vec<String>,
        #[source]
        source: io::Error,
    },

    /// An external tool ran but exited unsuccessfully.
    #[error("`{command} {}` failed with {}", .args.join(" "), describe_exit(.code))]
    Execution {
        command: String,
        args: Vec<String>,
        /// `None` when the process was terminated by a signal.
        code: Option<i32>,
    },

    /// A filesystem operation failed.
    #[error("I/O error at {}: {source}. Check file paths and permissions", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A property list could not be read or written.
    #[error("property list error at {}: {source}", .path.display())]
    Plist {
        path: PathBuf,
        #[source]
        source: plist::Error,
    },
}

impl DeployError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn plist(path: impl Into<PathBuf>, source: plist::Error) -> Self {
        DeployError::Plist {
            path: path.into(),
            source,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

/// Instruction-set architecture of the executable being packaged.
///
/// The compiler knows more architectures than the iOS target accepts; see
/// [`Variant::from_arch`] for the two that can actually be deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86,
    X86_64,
    Thumbv7,
    Arm64,
}

impl Arch {
    /// Returns the architecture name as written in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Thumbv7 => "thumbv7",
            Arch::Arm64 => "arm64",
        }
    }

    /// Returns the name clang expects after `-arch`.
    pub fn clang_arch(&self) -> &'static str {
        match self {
            Arch::X86 => "i386",
            Arch::X86_64 => "x86_64",
            Arch::Thumbv7 => "armv7",
            Arch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x86" => Ok(Arch::X86),
            "x86_64" => Ok(Arch::X86_64),
            "thumbv7" => Ok(Arch::Thumbv7),
            "arm64" => Ok(Arch::Arm64),
            other => Err(DeployError::Config(format!(
                "unknown architecture '{}'. Expected one of: x86, x86_64, thumbv7, arm64",
                other
            ))),
        }
    }
}

/// Bundle variant: where the app is going to run.
///
/// Device bundles are signed and carry a resource-rules file; simulator
/// bundles are neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// A physically attached device (`thumbv7`).
    Device,
    /// The local simulator (`x86`).
    Simulator,
}

impl Variant {
    /// Maps an architecture onto the variant it deploys to.
    ///
    /// Only `x86` (simulator) and `thumbv7` (device) are supported; every
    /// other architecture is rejected here so that the target never
    /// reaches an external tool with it.
    pub fn from_arch(arch: Arch) -> Result<Self> {
        match arch {
            Arch::X86 => Ok(Variant::Simulator),
            Arch::Thumbv7 => Ok(Variant::Device),
            other => Err(DeployError::Config(format!(
                "Arch '{}' is unsupported for iOS target. Use 'thumbv7' (device) or 'x86' (simulator)",
                other
            ))),
        }
    }

    /// Platform directory / `CFBundleSupportedPlatforms` value.
    pub fn platform_name(&self) -> &'static str {
        match self {
            Variant::Device => "iPhoneOS",
            Variant::Simulator => "iPhoneSimulator",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Device => "device",
            Variant::Simulator => "simulator",
        }
    }
}

/// Device family the simulator should emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    #[default]
    IPhone,
    IPad,
}

impl DeviceFamily {
    /// Lower-cased name as passed to `ios-sim --family`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::IPhone => "iphone",
            DeviceFamily::IPad => "ipad",
        }
    }
}

impl FromStr for DeviceFamily {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "iphone" => Ok(DeviceFamily::IPhone),
            "ipad" => Ok(DeviceFamily::IPad),
            other => Err(DeployError::Config(format!(
                "unknown device family '{}'. Expected 'iphone' or 'ipad'",
                other
            ))),
        }
    }
}

/// Locations of the external tools the target drives.
///
/// Bare names are looked up on `PATH` by the operating system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// `xcrun`, used for `dsymutil` and for locating `codesign_allocate`.
    pub xcrun: PathBuf,
    /// The code signer.
    pub codesign: PathBuf,
    /// Used to find the active developer directory.
    pub xcode_select: PathBuf,
    /// The compiler driver used as linker by [`crate::ClangLinker`].
    pub clang: PathBuf,
    /// Simulator launcher.
    pub ios_sim: PathBuf,
    /// Device debug bridge.
    pub fruitstrap: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            xcrun: PathBuf::from("xcrun"),
            codesign: PathBuf::from("codesign"),
            xcode_select: PathBuf::from("xcode-select"),
            clang: PathBuf::from("clang"),
            ios_sim: PathBuf::from("ios-sim"),
            fruitstrap: PathBuf::from("fruitstrap"),
        }
    }
}

impl ToolPaths {
    /// Resolves `ios-sim` and `fruitstrap` inside a bin directory, leaving
    /// the Xcode tools on `PATH`.
    pub fn with_bin_dir(bin_dir: &Path) -> Self {
        Self {
            ios_sim: bin_dir.join("ios-sim"),
            fruitstrap: bin_dir.join("fruitstrap"),
            ..Self::default()
        }
    }
}

/// Per-target configuration.
///
/// Owned by the caller and read-only to the SDK. Deserializes from a TOML
/// `[target]` table; every field has a default.
///
/// # Example
///
/// ```
/// use mobtarget_sdk::{Arch, TargetConfig};
///
/// let config = TargetConfig {
///     arch: Some(Arch::X86),
///     executable_name: "Hello".to_string(),
///     ..TargetConfig::default()
/// };
/// assert_eq!(config.sign_identity, "iPhone Developer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Target architecture. Defaults to `thumbv7` (device).
    pub arch: Option<Arch>,
    /// SDK version to bind (e.g. "8.1"). The latest installed SDK when unset.
    #[serde(rename = "sdk")]
    pub sdk_version: Option<String>,
    /// Caller-authored Info.plist copied into the bundle instead of the
    /// synthesized defaults.
    pub info_plist: Option<PathBuf>,
    /// Resource rules copied into device bundles instead of the bundled default.
    pub resource_rules_plist: Option<PathBuf>,
    /// Entitlements passed to the signer (with `get-task-allow` forced on).
    pub entitlements_plist: Option<PathBuf>,
    /// Code signing identity.
    pub sign_identity: String,
    /// Name of the executable inside the bundle.
    pub executable_name: String,
    /// Finished executable to install. Defaults to `<tmp_dir>/<executable_name>`.
    pub executable: Option<PathBuf>,
    /// Primary identifier used as `CFBundleIdentifier`.
    pub main_identifier: Option<String>,
    /// Install directory used by `launch` unless `skip_install` is set.
    pub install_dir: Option<PathBuf>,
    /// Scratch directory for entitlements and launch bundles.
    pub tmp_dir: PathBuf,
    /// Launch from a per-target `<executable>.app` under `tmp_dir` instead of the install dir.
    pub skip_install: bool,
    /// Xcode developer directory. Found via `xcode-select` when unset.
    pub developer_dir: Option<PathBuf>,
    pub tools: ToolPaths,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            arch: None,
            sdk_version: None,
            info_plist: None,
            resource_rules_plist: None,
            entitlements_plist: None,
            sign_identity: "iPhone Developer".to_string(),
            executable_name: String::new(),
            executable: None,
            main_identifier: None,
            install_dir: None,
            tmp_dir: std::env::temp_dir().join("mobtarget"),
            skip_install: false,
            developer_dir: None,
            tools: ToolPaths::default(),
        }
    }
}

impl TargetConfig {
    /// Architecture with the `thumbv7` default applied.
    pub fn arch(&self) -> Arch {
        self.arch.unwrap_or(Arch::Thumbv7)
    }

    /// Path of the finished executable to install.
    pub fn executable_path(&self) -> PathBuf {
        self.executable
            .clone()
            .unwrap_or_else(|| self.tmp_dir.join(&self.executable_name))
    }
}
