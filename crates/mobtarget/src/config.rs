//! Configuration file support for mobtarget.
//!
//! Settings live in `mobtarget.toml` so the signing identity, SDK and
//! bundle paths don't have to be passed on every invocation.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory (`./mobtarget.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! Relative paths inside the file are resolved against the directory that
//! contains it.
//!
//! ## Example Configuration
//!
//! ```toml
//! [target]
//! arch = "thumbv7"
//! sdk = "8.1"
//! executable_name = "Hello"
//! executable = "build/Hello"
//! install_dir = "build/Hello.app"
//! sign_identity = "iPhone Developer"
//! entitlements_plist = "Entitlements.plist"
//!
//! [target.tools]
//! ios_sim = "/opt/mobtarget/bin/ios-sim"
//! fruitstrap = "/opt/mobtarget/bin/fruitstrap"
//!
//! [launch]
//! family = "ipad"
//! arguments = ["--verbose"]
//! ```

use anyhow::{Context, Result};
use mobtarget_sdk::{DeviceFamily, TargetConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "mobtarget.toml";

/// Environment variable overriding `target.sign_identity`.
pub const SIGN_IDENTITY_ENV: &str = "MOBTARGET_SIGN_IDENTITY";

/// Root configuration structure for `mobtarget.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobtargetConfig {
    /// Target settings, passed straight to the SDK.
    pub target: TargetConfig,

    /// Defaults for `mobtarget launch`.
    pub launch: LaunchDefaults,
}

/// Launch defaults; CLI flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchDefaults {
    /// Simulated device family.
    pub family: DeviceFamily,

    /// Arguments passed to the app when none are given on the command line.
    pub arguments: Vec<String>,

    pub stdout_fifo: Option<PathBuf>,
    pub stderr_fifo: Option<PathBuf>,
}

impl MobtargetConfig {
    /// Loads configuration from the specified file path.
    ///
    /// Relative paths are resolved against the file's directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: MobtargetConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Finds and loads `mobtarget.toml` from the current directory or a parent.
    pub fn discover() -> Result<Option<(Self, PathBuf)>> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&cwd)
    }

    /// Finds and loads `mobtarget.toml` starting from `start_dir`.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let join = |p: &mut Option<PathBuf>| {
            if let Some(path) = p
                && path.is_relative()
            {
                *path = base.join(&*path);
            }
        };
        let target = &mut self.target;
        join(&mut target.info_plist);
        join(&mut target.resource_rules_plist);
        join(&mut target.entitlements_plist);
        join(&mut target.executable);
        join(&mut target.install_dir);
        join(&mut target.developer_dir);
        join(&mut self.launch.stdout_fifo);
        join(&mut self.launch.stderr_fifo);
    }

    /// Applies environment overrides from `lookup`.
    ///
    /// `DEVELOPER_DIR` is honoured by the SDK itself when no developer
    /// directory is configured.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(identity) = lookup(SIGN_IDENTITY_ENV).filter(|v| !v.is_empty()) {
            self.target.sign_identity = identity;
        }
    }

    /// Generates a commented starter `mobtarget.toml`.
    pub fn generate_starter_toml(executable_name: &str) -> String {
        format!(
            r#"# mobtarget configuration file
# CLI flags override these settings when provided.

[target]
# Target architecture: "thumbv7" (device, default) or "x86" (simulator)
arch = "thumbv7"

# SDK version to bind (default: latest installed)
# sdk = "8.1"

# Name of the executable inside the app bundle
executable_name = "{executable_name}"

# Linked executable to install (default: <tmp_dir>/<executable_name>)
executable = "build/{executable_name}"

# App bundle directory used by `install` and `launch`
install_dir = "build/{executable_name}.app"

# Code signing identity (device only). MOBTARGET_SIGN_IDENTITY overrides it.
sign_identity = "iPhone Developer"

# Optional Info.plist used instead of the generated one
# info_plist = "Info.plist"

# Optional entitlements; get-task-allow is always forced on
# entitlements_plist = "Entitlements.plist"

# Optional resource rules copied into device bundles
# resource_rules_plist = "ResourceRules.plist"

# Launch from a scratch bundle in tmp_dir instead of install_dir
skip_install = false

# Xcode developer directory (default: DEVELOPER_DIR, then xcode-select)
# developer_dir = "/Applications/Xcode.app/Contents/Developer"

[target.tools]
ios_sim = "ios-sim"
fruitstrap = "fruitstrap"

[launch]
# Simulated device family: "iphone" or "ipad"
family = "iphone"

# Arguments passed to the app
arguments = []
"#,
            executable_name = executable_name,
        )
    }
}

/// Configuration resolver that merges config file values with CLI arguments.
///
/// CLI arguments always take precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<MobtargetConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Loads `explicit` when given, otherwise discovers `mobtarget.toml`.
    ///
    /// Environment overrides are applied on top of the loaded file.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let found = match explicit {
            Some(path) => Some((MobtargetConfig::load_from_file(path)?, path.to_path_buf())),
            None => MobtargetConfig::discover()?,
        };
        let (mut config, config_path) = match found {
            Some((config, path)) => {
                tracing::debug!("Using config file {}", path.display());
                (config, Some(path))
            }
            None => (MobtargetConfig::default(), None),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(Self {
            config: Some(config),
            config_path,
        })
    }

    /// The target configuration, or defaults when nothing was loaded.
    pub fn target(&self) -> TargetConfig {
        self.config
            .as_ref()
            .map(|c| c.target.clone())
            .unwrap_or_default()
    }

    /// The launch defaults.
    pub fn launch(&self) -> LaunchDefaults {
        self.config
            .as_ref()
            .map(|c| c.launch.clone())
            .unwrap_or_default()
    }

    /// Resolves a CLI value, using config as fallback.
    pub fn resolve<T, F>(&self, cli_value: Option<T>, config_getter: F, default: T) -> T
    where
        F: FnOnce(&MobtargetConfig) -> Option<T>,
    {
        cli_value
            .or_else(|| self.config.as_ref().and_then(config_getter))
            .unwrap_or(default)
    }
}
