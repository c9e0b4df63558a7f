//! Symbolication and code signing.
//!
//! Preparing a bundle directory runs these steps in order:
//!
//! 1. Write `Info.plist` (see [`crate::manifest`])
//! 2. Regenerate the `.dSYM` bundle next to the directory with `xcrun dsymutil`
//! 3. Device only: copy `ResourceRules.plist` into the bundle
//! 4. Device only: resolve entitlements and run `codesign`
//!
//! Any failing tool aborts the preparation. Nothing is rolled back; running
//! the preparation again starts from scratch.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use include_dir::{Dir, include_dir};
use plist::{Dictionary, Value};
use tempfile::NamedTempFile;

use crate::executor::Executor;
use crate::manifest::{self, ManifestDefaults, RESOURCE_RULES_PLIST};
use crate::sdk::Sdk;
use crate::types::{DeployError, Result, TargetConfig, ToolPaths, Variant};

const RESOURCES: Dir = include_dir!("$CARGO_MANIFEST_DIR/resources");

/// File name of the bundled default entitlements.
pub const ENTITLEMENTS_PLIST: &str = "Entitlements.plist";

/// Entitlement that lets a debugger attach to the app.
pub const GET_TASK_ALLOW: &str = "get-task-allow";

/// Returns the contents of a resource bundled with the SDK.
pub fn bundled_resource(name: &str) -> Result<&'static [u8]> {
    RESOURCES
        .get_file(name)
        .map(|f| f.contents())
        .ok_or_else(|| DeployError::Config(format!("bundled resource {} is missing", name)))
}

/// Location of the symbol bundle generated for `app_dir`.
///
/// `build/Hello.app` → `build/Hello.app.dSYM`.
pub fn dsym_dir(app_dir: &Path) -> Result<PathBuf> {
    let name = app_dir.file_name().ok_or_else(|| {
        DeployError::Config(format!(
            "bundle directory {} has no file name",
            app_dir.display()
        ))
    })?;
    let mut dsym_name = name.to_os_string();
    dsym_name.push(".dSYM");
    Ok(app_dir.with_file_name(dsym_name))
}

/// Removes a directory tree, treating "does not exist" as success.
///
/// A plain file at `dir` is removed as well.
fn remove_dir_if_present(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotADirectory => {
            fs::remove_file(dir).map_err(|e| DeployError::io(dir, e))
        }
        Err(e) => Err(DeployError::io(dir, e)),
    }
}

/// Copies `src` to `dest`.
///
/// Copying a file onto itself is a no-op. Errors name `src` when it cannot be
/// read and `dest` otherwise.
pub(crate) fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    let src_real = fs::canonicalize(src).map_err(|e| DeployError::io(src, e))?;
    if fs::canonicalize(dest).is_ok_and(|dest_real| dest_real == src_real) {
        tracing::debug!("{} is already in place", dest.display());
        return Ok(());
    }
    fs::copy(src, dest).map_err(|e| DeployError::io(dest, e))?;
    Ok(())
}

/// Regenerates the debug symbol bundle for `app_dir/executable`.
///
/// The stale bundle is deleted first so repeated installs never accumulate
/// old symbols.
pub fn generate_dsym(tools: &ToolPaths, app_dir: &Path, executable: &str) -> Result<PathBuf> {
    let dsym = dsym_dir(app_dir)?;
    remove_dir_if_present(&dsym)?;
    Executor::new(&tools.xcrun)
        .arg("dsymutil")
        .arg("-o")
        .arg(&dsym)
        .arg(app_dir.join(executable))
        .exec()?;
    Ok(dsym)
}

/// Copies the resource rules into `dest_dir`.
///
/// Uses the caller's file when given, the bundled default otherwise.
pub fn copy_resource_rules(dest_dir: &Path, source: Option<&Path>) -> Result<PathBuf> {
    let dest = dest_dir.join(RESOURCE_RULES_PLIST);
    match source {
        Some(src) => {
            copy_file(src, &dest)?;
        }
        None => {
            fs::write(&dest, bundled_resource(RESOURCE_RULES_PLIST)?)
                .map_err(|e| DeployError::io(&dest, e))?;
        }
    }
    Ok(dest)
}

fn parse_entitlements(source: EntitlementsSource<'_>) -> Result<Dictionary> {
    let (value, origin) = match source {
        EntitlementsSource::File(path) => (Value::from_file(path), path.display().to_string()),
        EntitlementsSource::Bundled(bytes) => (
            Value::from_reader(io::Cursor::new(bytes)),
            format!("bundled {}", ENTITLEMENTS_PLIST),
        ),
    };
    let value = value.map_err(|e| {
        DeployError::Config(format!("Failed to parse entitlements {}: {}", origin, e))
    })?;
    value.into_dictionary().ok_or_else(|| {
        DeployError::Config(format!(
            "entitlements {} must contain a dictionary at the top level",
            origin
        ))
    })
}

enum EntitlementsSource<'a> {
    File(&'a Path),
    Bundled(&'a [u8]),
}

/// Writes the entitlements the signer should use into `tmp_dir`.
///
/// The caller's file (or the bundled default) is parsed, `get-task-allow`
/// is forced on, and the result is written as XML to a fresh
/// `<tmp_dir>/Entitlements*.plist`. Every call gets its own file, removed
/// when the returned handle drops. The caller's file is never modified.
pub fn resolve_entitlements(tmp_dir: &Path, caller: Option<&Path>) -> Result<NamedTempFile> {
    let mut dict = match caller {
        Some(path) => parse_entitlements(EntitlementsSource::File(path))?,
        None => parse_entitlements(EntitlementsSource::Bundled(bundled_resource(
            ENTITLEMENTS_PLIST,
        )?))?,
    };
    dict.insert(GET_TASK_ALLOW.to_string(), Value::Boolean(true));

    fs::create_dir_all(tmp_dir).map_err(|e| DeployError::io(tmp_dir, e))?;
    let mut scratch = tempfile::Builder::new()
        .prefix("Entitlements")
        .suffix(".plist")
        .tempfile_in(tmp_dir)
        .map_err(|e| DeployError::io(tmp_dir, e))?;
    Value::Dictionary(dict)
        .to_writer_xml(&mut scratch)
        .map_err(|e| DeployError::plist(scratch.path(), e))?;
    scratch
        .flush()
        .map_err(|e| DeployError::io(scratch.path(), e))?;
    Ok(scratch)
}

/// Builds the `codesign` invocation.
///
/// `allocate` is the `codesign_allocate` path the signer needs in its
/// environment.
pub fn codesign_invocation(
    tools: &ToolPaths,
    identity: &str,
    entitlements: Option<&Path>,
    app_dir: &Path,
    allocate: &str,
) -> Executor {
    let mut exec = Executor::new(&tools.codesign)
        .env("CODESIGN_ALLOCATE", allocate)
        .args(["-f", "-s", identity]);
    if let Some(entitlements) = entitlements {
        exec = exec.arg("--entitlements").arg(entitlements);
    }
    exec.arg(app_dir)
}

/// Signs `app_dir` with `identity`.
pub fn codesign(
    tools: &ToolPaths,
    identity: &str,
    entitlements: Option<&Path>,
    app_dir: &Path,
) -> Result<()> {
    let allocate = Executor::new(&tools.xcrun)
        .args(["-sdk", "iphoneos", "-f", "codesign_allocate"])
        .exec_capture()?;
    tracing::debug!("Using codesign_allocate at {}", allocate);
    codesign_invocation(tools, identity, entitlements, app_dir, &allocate).exec()
}

/// Everything needed to prepare a bundle directory.
#[derive(Debug, Clone, Copy)]
pub struct BundleContext<'a> {
    pub config: &'a TargetConfig,
    pub variant: Variant,
    pub sdk: &'a Sdk,
    pub manifest_override: Option<&'a Dictionary>,
    /// Name of the executable inside the bundle.
    pub executable: &'a str,
}

impl BundleContext<'_> {
    fn manifest_defaults(&self) -> ManifestDefaults {
        ManifestDefaults {
            executable_name: self.config.executable_name.clone(),
            main_identifier: self.config.main_identifier.clone(),
        }
    }

    /// Writes `Info.plist` into `dir` with the variant customization applied.
    pub fn write_manifest(&self, dir: &Path) -> Result<PathBuf> {
        manifest::materialize(
            dir,
            self.manifest_override,
            self.sdk,
            &self.manifest_defaults(),
            manifest::customize_for(self.variant),
        )
    }

    /// Runs the full pipeline over `dir`.
    pub fn prepare(&self, dir: &Path) -> Result<()> {
        self.write_manifest(dir)?;
        generate_dsym(&self.config.tools, dir, self.executable)?;
        if self.variant == Variant::Device {
            copy_resource_rules(dir, self.config.resource_rules_plist.as_deref())?;
            let entitlements = resolve_entitlements(
                &self.config.tmp_dir,
                self.config.entitlements_plist.as_deref(),
            )?;
            codesign(
                &self.config.tools,
                &self.config.sign_identity,
                Some(entitlements.path()),
                dir,
            )?;
        }
        Ok(())
    }
}
