//! Installed platform SDK discovery.
//!
//! SDKs live under the Xcode developer directory:
//!
//! ```text
//! <developer dir>/Platforms/iPhoneOS.platform/Developer/SDKs/iPhoneOS8.1.sdk
//! <developer dir>/Platforms/iPhoneSimulator.platform/Developer/SDKs/iPhoneSimulator8.1.sdk
//! ```
//!
//! Each `.sdk` directory carries an `SDKSettings.plist` with its canonical
//! name, version and default build properties. Nothing is cached: every
//! call to [`SdkRegistry::list_sdks`] rescans the filesystem.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use plist::{Dictionary, Value};

use crate::executor::Executor;
use crate::types::{DeployError, Result, TargetConfig, Variant};

const SDK_SETTINGS: &str = "SDKSettings.plist";

/// One installed platform SDK.
#[derive(Debug, Clone, PartialEq)]
pub struct Sdk {
    display_name: String,
    canonical_name: String,
    version: String,
    root: PathBuf,
    default_properties: Dictionary,
    variant: Variant,
}

impl Sdk {
    /// Reads an SDK from its `.sdk` directory.
    pub fn from_dir(root: &Path, variant: Variant) -> Result<Self> {
        let settings_path = root.join(SDK_SETTINGS);
        let settings =
            Value::from_file(&settings_path).map_err(|e| DeployError::plist(&settings_path, e))?;
        let dict = settings.as_dictionary().ok_or_else(|| {
            DeployError::Config(format!(
                "{} is not a dictionary",
                settings_path.display()
            ))
        })?;

        let string_key = |key: &str| -> Result<String> {
            dict.get(key)
                .and_then(Value::as_string)
                .map(str::to_string)
                .ok_or_else(|| {
                    DeployError::Config(format!(
                        "{} has no '{}' entry",
                        settings_path.display(),
                        key
                    ))
                })
        };

        let canonical_name = string_key("CanonicalName")?;
        let version = string_key("Version")?;
        let display_name = string_key("DisplayName").unwrap_or_else(|_| canonical_name.clone());
        let default_properties = dict
            .get("DefaultProperties")
            .and_then(Value::as_dictionary)
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            display_name,
            canonical_name,
            version,
            root: root.to_path_buf(),
            default_properties,
            variant,
        })
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// E.g. `iphoneos8.1`.
    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    /// E.g. `8.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The SDK root, used as `-isysroot`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn default_properties(&self) -> &Dictionary {
        &self.default_properties
    }

    pub fn default_property(&self, key: &str) -> Option<&Value> {
        self.default_properties.get(key)
    }

    /// `PLATFORM_NAME` default property (`iphoneos`, `iphonesimulator`).
    pub fn platform_name(&self) -> Option<&str> {
        self.default_property("PLATFORM_NAME")
            .and_then(Value::as_string)
    }
}

/// Orders dotted version strings numerically ("7.0" < "8.0" < "8.1" < "10.0").
///
/// Components that are not numbers compare as zero; ties fall back to a
/// plain string comparison so the order is total.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| part.trim().parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (pa, pb) = (parse(a), parse(b));
    let len = pa.len().max(pb.len());
    for i in 0..len {
        let x = pa.get(i).copied().unwrap_or(0);
        let y = pb.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.cmp(b)
}

/// Picks an SDK from `sdks`.
///
/// With no requested version the highest version wins; otherwise the SDK
/// whose version string is exactly `requested`.
pub fn resolve_sdk(mut sdks: Vec<Sdk>, requested: Option<&str>) -> Result<Sdk> {
    match requested {
        None => {
            sdks.sort_by(|a, b| compare_versions(&a.version, &b.version));
            sdks.pop().ok_or_else(|| {
                DeployError::Config(
                    "No iOS SDKs found. Install Xcode or point developer_dir at it".to_string(),
                )
            })
        }
        Some(version) => sdks
            .into_iter()
            .find(|sdk| sdk.version == version)
            .ok_or_else(|| {
                DeployError::Config(format!(
                    "No SDK found matching version string {}",
                    version
                ))
            }),
    }
}

/// Enumerates SDKs installed in one developer directory.
#[derive(Debug, Clone)]
pub struct SdkRegistry {
    developer_dir: PathBuf,
}

impl SdkRegistry {
    pub fn new(developer_dir: impl Into<PathBuf>) -> Self {
        Self {
            developer_dir: developer_dir.into(),
        }
    }

    /// Finds the developer directory for `config`.
    ///
    /// Order: `config.developer_dir`, the `DEVELOPER_DIR` environment
    /// variable, then `xcode-select --print-path`.
    pub fn locate(config: &TargetConfig) -> Result<Self> {
        if let Some(dir) = &config.developer_dir {
            return Ok(Self::new(dir));
        }
        if let Ok(dir) = std::env::var("DEVELOPER_DIR")
            && !dir.is_empty()
        {
            return Ok(Self::new(dir));
        }
        let dir = Executor::new(&config.tools.xcode_select)
            .arg("--print-path")
            .exec_capture()?;
        Ok(Self::new(dir))
    }

    pub fn developer_dir(&self) -> &Path {
        &self.developer_dir
    }

    /// Directory holding the `.sdk` bundles for `variant`.
    pub fn sdks_dir(&self, variant: Variant) -> PathBuf {
        self.developer_dir
            .join("Platforms")
            .join(format!("{}.platform", variant.platform_name()))
            .join("Developer")
            .join("SDKs")
    }

    /// Lists the installed SDKs for `variant`, lowest version first.
    ///
    /// A missing platform directory yields an empty list. SDK directories
    /// without readable settings are skipped.
    pub fn list_sdks(&self, variant: Variant) -> Result<Vec<Sdk>> {
        let dir = self.sdks_dir(variant);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No SDK directory at {}", dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(DeployError::io(&dir, e)),
        };

        let mut sdks = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| DeployError::io(&dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("sdk") {
                continue;
            }
            match Sdk::from_dir(&path, variant) {
                Ok(sdk) => sdks.push(sdk),
                Err(e) => tracing::warn!("Skipping SDK at {}: {}", path.display(), e),
            }
        }
        sdks.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(sdks)
    }

    /// Lists SDKs for `variant` and picks one, see [`resolve_sdk`].
    pub fn resolve(&self, variant: Variant, requested: Option<&str>) -> Result<Sdk> {
        let sdk = resolve_sdk(self.list_sdks(variant)?, requested)?;
        tracing::debug!(
            "Resolved {} SDK {} at {}",
            variant.as_str(),
            sdk.canonical_name,
            sdk.root.display()
        );
        Ok(sdk)
    }
}
