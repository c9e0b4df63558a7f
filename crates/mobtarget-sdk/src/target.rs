//! The iOS target: `initialize → build → install → launch`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use plist::{Dictionary, Value};
use tempfile::TempDir;

use crate::executor::{Executor, LaunchedProcess};
use crate::launch::{LaunchParameters, LaunchStrategy};
use crate::manifest;
use crate::sdk::{Sdk, SdkRegistry};
use crate::signing::{self, BundleContext};
use crate::types::{Arch, DeployError, Result, TargetConfig, Variant};

/// Minimum OS version passed to the compiler driver when linking.
pub const MIN_OS_VERSION_FLAG: &str = "-miphoneos-version-min=3.0";

/// Links object files into an executable.
pub trait Linker {
    fn link(
        &self,
        out_file: &Path,
        cc_args: &[String],
        object_files: &[PathBuf],
        lib_args: &[String],
    ) -> Result<()>;
}

/// Links with `clang -arch <arch>`.
#[derive(Debug, Clone)]
pub struct ClangLinker {
    clang: PathBuf,
    arch: Arch,
}

impl ClangLinker {
    pub fn new(clang: impl Into<PathBuf>, arch: Arch) -> Self {
        Self {
            clang: clang.into(),
            arch,
        }
    }

    /// Builds the link invocation without running it.
    pub fn invocation(
        &self,
        out_file: &Path,
        cc_args: &[String],
        object_files: &[PathBuf],
        lib_args: &[String],
    ) -> Executor {
        Executor::new(&self.clang)
            .arg("-o")
            .arg(out_file)
            .arg("-arch")
            .arg(self.arch.clang_arch())
            .args(cc_args)
            .args(object_files)
            .args(lib_args)
    }
}

impl Linker for ClangLinker {
    fn link(
        &self,
        out_file: &Path,
        cc_args: &[String],
        object_files: &[PathBuf],
        lib_args: &[String],
    ) -> Result<()> {
        self.invocation(out_file, cc_args, object_files, lib_args)
            .exec()
    }
}

/// State bound once by [`IosTarget::initialize`].
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub sdk: Sdk,
    pub variant: Variant,
    pub manifest_override: Option<Dictionary>,
}

/// An initialized iOS target.
///
/// # Example
///
/// ```no_run
/// use mobtarget_sdk::{Arch, IosTarget, LaunchParameters, TargetConfig};
///
/// let config = TargetConfig {
///     arch: Some(Arch::X86),
///     executable_name: "Hello".to_string(),
///     install_dir: Some("build/Hello.app".into()),
///     ..TargetConfig::default()
/// };
/// let target = IosTarget::initialize(config)?;
/// target.install(std::path::Path::new("build/Hello.app"))?;
/// let mut process = target.launch(&LaunchParameters::default())?;
/// process.wait()?;
/// # Ok::<(), mobtarget_sdk::DeployError>(())
/// ```
#[derive(Debug, Clone)]
pub struct IosTarget {
    config: TargetConfig,
    resolved: ResolvedTarget,
    /// Per-target directory under `tmp_dir`, created on first use.
    scratch: Arc<OnceLock<TempDir>>,
}

impl IosTarget {
    /// Validates `config` and binds an SDK from the located developer directory.
    pub fn initialize(config: TargetConfig) -> Result<Self> {
        let registry = SdkRegistry::locate(&config)?;
        Self::initialize_with(config, &registry)
    }

    /// Like [`IosTarget::initialize`] with an explicit registry.
    pub fn initialize_with(config: TargetConfig, registry: &SdkRegistry) -> Result<Self> {
        let variant = Variant::from_arch(config.arch())?;
        let manifest_override = config
            .info_plist
            .as_deref()
            .map(manifest::load_override)
            .transpose()?;
        let sdk = registry.resolve(variant, config.sdk_version.as_deref())?;
        tracing::info!(
            "Targeting {} ({}) with SDK {}",
            config.arch(),
            variant.as_str(),
            sdk.display_name()
        );
        Ok(Self {
            config,
            resolved: ResolvedTarget {
                sdk,
                variant,
                manifest_override,
            },
            scratch: Arc::default(),
        })
    }

    pub fn config(&self) -> &TargetConfig {
        &self.config
    }

    pub fn resolved(&self) -> &ResolvedTarget {
        &self.resolved
    }

    pub fn sdk(&self) -> &Sdk {
        &self.resolved.sdk
    }

    pub fn variant(&self) -> Variant {
        self.resolved.variant
    }

    pub fn arch(&self) -> Arch {
        self.config.arch()
    }

    /// Executable name inside the bundle.
    ///
    /// The override manifest's `CFBundleExecutable` wins over the configured name.
    pub fn executable_name(&self) -> String {
        self.resolved
            .manifest_override
            .as_ref()
            .and_then(|dict| dict.get("CFBundleExecutable"))
            .and_then(Value::as_string)
            .map(str::to_string)
            .unwrap_or_else(|| self.config.executable_name.clone())
    }

    /// Directory the app is launched from.
    ///
    /// The install directory, or `<tmp>/<scratch>/<executable>.app` when
    /// installing is skipped. The latter is created if needed, is private to
    /// this target and is removed when the last clone of it drops.
    pub fn app_dir(&self) -> Result<PathBuf> {
        if !self.config.skip_install {
            return self.config.install_dir.clone().ok_or_else(|| {
                DeployError::Config(
                    "no install directory configured. Set install_dir or skip_install".to_string(),
                )
            });
        }
        let dir = self
            .scratch_dir()?
            .join(format!("{}.app", self.executable_name()));
        fs::create_dir_all(&dir).map_err(|e| DeployError::io(&dir, e))?;
        Ok(dir)
    }

    fn scratch_dir(&self) -> Result<&Path> {
        if let Some(dir) = self.scratch.get() {
            return Ok(dir.path());
        }
        let tmp = &self.config.tmp_dir;
        fs::create_dir_all(tmp).map_err(|e| DeployError::io(tmp, e))?;
        let dir = tempfile::Builder::new()
            .prefix("mobtarget-")
            .tempdir_in(tmp)
            .map_err(|e| DeployError::io(tmp, e))?;
        Ok(self.scratch.get_or_init(|| dir).path())
    }

    /// Compiler driver arguments added for the bound SDK.
    pub fn sdk_cc_args(&self) -> Vec<String> {
        vec![
            MIN_OS_VERSION_FLAG.to_string(),
            "-isysroot".to_string(),
            self.sdk_root().to_string_lossy().into_owned(),
        ]
    }

    fn sdk_root(&self) -> PathBuf {
        let root = self.resolved.sdk.root();
        std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf())
    }

    /// Links `object_files` into `out_file` against the bound SDK.
    pub fn build(
        &self,
        out_file: &Path,
        cc_args: &[String],
        object_files: &[PathBuf],
        lib_args: &[String],
        linker: &dyn Linker,
    ) -> Result<()> {
        let mut args = cc_args.to_vec();
        args.extend(self.sdk_cc_args());
        tracing::info!("Linking {}", out_file.display());
        linker.link(out_file, &args, object_files, lib_args)
    }

    /// The default linker for this target's architecture.
    pub fn default_linker(&self) -> ClangLinker {
        ClangLinker::new(&self.config.tools.clang, self.arch())
    }

    fn bundle<'a>(&'a self, executable: &'a str) -> BundleContext<'a> {
        BundleContext {
            config: &self.config,
            variant: self.resolved.variant,
            sdk: &self.resolved.sdk,
            manifest_override: self.resolved.manifest_override.as_ref(),
            executable,
        }
    }

    /// Copies the configured executable into `dir`.
    pub fn install_executable(&self, dir: &Path) -> Result<PathBuf> {
        let src = self.config.executable_path();
        fs::create_dir_all(dir).map_err(|e| DeployError::io(dir, e))?;
        let dest = dir.join(self.executable_name());
        tracing::debug!("Installing {} to {}", src.display(), dest.display());
        signing::copy_file(&src, &dest)?;
        Ok(dest)
    }

    /// Installs the executable into `install_dir` and prepares the bundle.
    pub fn install(&self, install_dir: &Path) -> Result<()> {
        tracing::info!("Installing to {}", install_dir.display());
        self.install_executable(install_dir)?;
        self.prepare_install(install_dir)
    }

    /// Writes the manifest, symbols and (on device) signature into `install_dir`.
    pub fn prepare_install(&self, install_dir: &Path) -> Result<()> {
        let executable = self.executable_name();
        self.bundle(&executable).prepare(install_dir)
    }

    /// Installs the executable into `app_dir` then prepares it like an install.
    pub fn prepare_launch(&self, app_dir: &Path) -> Result<()> {
        self.install_executable(app_dir)?;
        self.prepare_install(app_dir)
    }

    /// Starts the app. The caller owns the returned process.
    pub fn launch(&self, params: &LaunchParameters) -> Result<LaunchedProcess> {
        let app_dir = self.app_dir()?;
        match self.resolved.variant {
            Variant::Device => self.prepare_launch(&app_dir)?,
            Variant::Simulator => {
                self.install_executable(&app_dir)?;
                let executable = self.executable_name();
                self.bundle(&executable).write_manifest(&app_dir)?;
            }
        }
        tracing::info!("Launching {}", app_dir.display());
        LaunchStrategy::for_variant(self.resolved.variant)
            .invocation(&self.config.tools, &app_dir, params)?
            .spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::testing::write_fake_sdk;
    use crate::types::ToolPaths;
    use std::cell::RefCell;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let dev = dir.path().join("Developer");
            write_fake_sdk(&dev, Variant::Device, "8.0");
            write_fake_sdk(&dev, Variant::Device, "8.1");
            write_fake_sdk(&dev, Variant::Simulator, "8.1");
            fs::write(dir.path().join("Hello"), b"\xcf\xfa\xed\xfe fake binary").unwrap();
            Self { dir }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn registry(&self) -> SdkRegistry {
            SdkRegistry::new(self.path().join("Developer"))
        }

        fn config(&self, arch: Arch) -> TargetConfig {
            TargetConfig {
                arch: Some(arch),
                executable_name: "Hello".to_string(),
                executable: Some(self.path().join("Hello")),
                tmp_dir: self.path().join("tmp"),
                install_dir: Some(self.path().join("install").join("Hello.app")),
                tools: ToolPaths::with_bin_dir(&self.path().join("bin")),
                ..TargetConfig::default()
            }
        }
    }

    #[derive(Default)]
    struct RecordingLinker {
        calls: RefCell<Vec<(PathBuf, Vec<String>, Vec<PathBuf>, Vec<String>)>>,
    }

    impl Linker for RecordingLinker {
        fn link(
            &self,
            out_file: &Path,
            cc_args: &[String],
            object_files: &[PathBuf],
            lib_args: &[String],
        ) -> Result<()> {
            self.calls.borrow_mut().push((
                out_file.to_path_buf(),
                cc_args.to_vec(),
                object_files.to_vec(),
                lib_args.to_vec(),
            ));
            Ok(())
        }
    }

    #[test]
    fn test_initialize_binds_latest_sdk() {
        let fx = Fixture::new();
        let target = IosTarget::initialize_with(fx.config(Arch::Thumbv7), &fx.registry()).unwrap();
        assert_eq!(target.variant(), Variant::Device);
        assert_eq!(target.sdk().version(), "8.1");
        assert!(target.resolved().manifest_override.is_none());
    }

    #[test]
    fn test_initialize_defaults_to_device() {
        let fx = Fixture::new();
        let config = TargetConfig {
            arch: None,
            ..fx.config(Arch::X86)
        };
        let target = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        assert_eq!(target.arch(), Arch::Thumbv7);
        assert_eq!(target.variant(), Variant::Device);
    }

    #[test]
    fn test_initialize_requested_sdk() {
        let fx = Fixture::new();
        let config = TargetConfig {
            sdk_version: Some("8.0".to_string()),
            ..fx.config(Arch::Thumbv7)
        };
        let target = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        assert_eq!(target.sdk().version(), "8.0");
    }

    #[test]
    fn test_initialize_rejects_unsupported_arch() {
        let fx = Fixture::new();
        let err = IosTarget::initialize_with(fx.config(Arch::Arm64), &fx.registry()).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
        assert!(err.to_string().contains("arm64"));
    }

    #[test]
    fn test_initialize_rejects_missing_sdk_version() {
        let fx = Fixture::new();
        let config = TargetConfig {
            sdk_version: Some("9.0".to_string()),
            ..fx.config(Arch::Thumbv7)
        };
        let err = IosTarget::initialize_with(config, &fx.registry()).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn test_initialize_rejects_unparsable_override() {
        let fx = Fixture::new();
        let info = fx.path().join("Info.plist");
        fs::write(&info, "garbage").unwrap();
        let config = TargetConfig {
            info_plist: Some(info),
            ..fx.config(Arch::Thumbv7)
        };
        let err = IosTarget::initialize_with(config, &fx.registry()).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn test_executable_name_prefers_override() {
        let fx = Fixture::new();
        let info = fx.path().join("Info.plist");
        let mut dict = Dictionary::new();
        dict.insert(
            "CFBundleExecutable".to_string(),
            Value::String("Custom".to_string()),
        );
        Value::Dictionary(dict).to_file_xml(&info).unwrap();

        let config = TargetConfig {
            info_plist: Some(info),
            ..fx.config(Arch::Thumbv7)
        };
        let target = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        assert_eq!(target.executable_name(), "Custom");

        let plain = IosTarget::initialize_with(fx.config(Arch::Thumbv7), &fx.registry()).unwrap();
        assert_eq!(plain.executable_name(), "Hello");
    }

    #[test]
    fn test_app_dir_uses_install_dir_or_tmp() {
        let fx = Fixture::new();
        let target = IosTarget::initialize_with(fx.config(Arch::X86), &fx.registry()).unwrap();
        assert_eq!(
            target.app_dir().unwrap(),
            fx.path().join("install").join("Hello.app")
        );

        let config = TargetConfig {
            skip_install: true,
            ..fx.config(Arch::X86)
        };
        let target = IosTarget::initialize_with(config.clone(), &fx.registry()).unwrap();
        let dir = target.app_dir().unwrap();
        assert!(dir.is_dir());
        assert!(dir.starts_with(fx.path().join("tmp")));
        assert_eq!(dir.file_name().unwrap(), "Hello.app");
        assert_eq!(target.app_dir().unwrap(), dir);
        assert_eq!(target.clone().app_dir().unwrap(), dir);

        let other = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        let other_dir = other.app_dir().unwrap();
        assert_ne!(other_dir, dir);

        drop(target);
        assert!(!dir.exists());
        assert!(other_dir.is_dir());
    }

    #[test]
    fn test_install_executable_already_in_place() {
        let fx = Fixture::new();
        let app = fx.path().join("install").join("Hello.app");
        fs::create_dir_all(&app).unwrap();
        let exe = app.join("Hello");
        fs::write(&exe, b"linked straight into the bundle").unwrap();

        let config = TargetConfig {
            executable: Some(exe.clone()),
            ..fx.config(Arch::X86)
        };
        let target = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        assert_eq!(target.install_executable(&app).unwrap(), exe);
        assert_eq!(fs::read(&exe).unwrap(), b"linked straight into the bundle");
    }

    #[test]
    fn test_install_missing_executable_names_source() {
        let fx = Fixture::new();
        let missing = fx.path().join("missing");
        let config = TargetConfig {
            executable: Some(missing.clone()),
            ..fx.config(Arch::X86)
        };
        let target = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        let err = target
            .install_executable(&fx.path().join("install").join("Hello.app"))
            .unwrap_err();
        assert!(matches!(err, DeployError::Io { ref path, .. } if path == &missing));
    }

    #[test]
    fn test_app_dir_without_install_dir_is_config_error() {
        let fx = Fixture::new();
        let config = TargetConfig {
            install_dir: None,
            ..fx.config(Arch::X86)
        };
        let target = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        assert!(matches!(target.app_dir(), Err(DeployError::Config(_))));
    }

    #[test]
    fn test_build_appends_sdk_flags() {
        let fx = Fixture::new();
        let target = IosTarget::initialize_with(fx.config(Arch::Thumbv7), &fx.registry()).unwrap();
        let linker = RecordingLinker::default();
        target
            .build(
                Path::new("out/Hello"),
                &["-g".to_string()],
                &[PathBuf::from("main.o")],
                &["-lobjc".to_string()],
                &linker,
            )
            .unwrap();

        let calls = linker.calls.borrow();
        assert_eq!(calls.len(), 1);
        let (out, cc_args, objects, libs) = &calls[0];
        assert_eq!(out, Path::new("out/Hello"));
        assert_eq!(cc_args[0], "-g");
        assert_eq!(cc_args[1], MIN_OS_VERSION_FLAG);
        assert_eq!(cc_args[2], "-isysroot");
        assert_eq!(Path::new(&cc_args[3]), target.sdk().root());
        assert_eq!(objects, &vec![PathBuf::from("main.o")]);
        assert_eq!(libs, &vec!["-lobjc".to_string()]);
    }

    #[test]
    fn test_clang_linker_invocation() {
        let linker = ClangLinker::new("clang", Arch::Thumbv7);
        let exec = linker.invocation(
            Path::new("Hello"),
            &["-g".to_string()],
            &[PathBuf::from("a.o"), PathBuf::from("b.o")],
            &["-lc".to_string()],
        );
        assert_eq!(
            exec.args_lossy(),
            vec!["-o", "Hello", "-arch", "armv7", "-g", "a.o", "b.o", "-lc"]
        );
    }

    #[cfg(unix)]
    fn write_script(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Stand-ins for the Xcode tools and launchers. `codesign` appends one line per
    /// call to `codesign.log`; `fruitstrap` records its arguments and refuses to run
    /// against an unprepared bundle.
    #[cfg(unix)]
    fn install_fake_tools(fx: &Fixture) -> ToolPaths {
        let bin = fx.path().join("bin");
        write_script(
            &bin.join("xcrun"),
            "if [ \"$1\" = dsymutil ]; then mkdir -p \"$3\"; exit 0; fi\n\
             if [ \"$1\" = -sdk ]; then echo /fake/codesign_allocate; exit 0; fi\n\
             exit 1\n",
        );
        write_script(
            &bin.join("codesign"),
            r#"dir="$(dirname "$0")"
if [ "$4" = --entitlements ]; then
    [ -e "$6/ResourceRules.plist" ] || exit 4
    cp "$5" "$dir/signed-entitlements.plist"
fi
echo "$CODESIGN_ALLOCATE $*" >> "$dir/codesign.log"
"#,
        );
        write_script(
            &bin.join("ios-sim"),
            "echo \"$*\" > \"$(dirname \"$0\")/ios-sim.log\"\n",
        );
        write_script(
            &bin.join("fruitstrap"),
            r#"dir="$(dirname "$0")"
for a in "$@"; do printf '%s\n' "$a"; done > "$dir/fruitstrap.args"
bundle=
while [ $# -gt 0 ]; do
    if [ "$1" = --bundle ]; then bundle="$2"; fi
    shift
done
for f in "$bundle/Hello" "$bundle/Info.plist" "$bundle/ResourceRules.plist" "$bundle.dSYM" "$dir/codesign.log"; do
    if [ ! -e "$f" ]; then echo "missing $f" >&2; exit 3; fi
done
printf '%s\n' '@"launched\n"'
"#,
        );
        ToolPaths {
            xcrun: bin.join("xcrun"),
            codesign: bin.join("codesign"),
            ..ToolPaths::with_bin_dir(&bin)
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_device_install_is_idempotent() {
        let fx = Fixture::new();
        let config = TargetConfig {
            tools: install_fake_tools(&fx),
            ..fx.config(Arch::Thumbv7)
        };
        let target = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        let install_dir = fx.path().join("install").join("Hello.app");

        target.install(&install_dir).unwrap();
        let first_manifest = fs::read(install_dir.join("Info.plist")).unwrap();
        target.install(&install_dir).unwrap();

        assert!(install_dir.join("Hello").is_file());
        assert_eq!(fs::read(install_dir.join("Info.plist")).unwrap(), first_manifest);
        assert!(install_dir.join("ResourceRules.plist").is_file());

        let siblings: Vec<_> = fs::read_dir(fx.path().join("install"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        let dsyms: Vec<_> = siblings.iter().filter(|n| n.ends_with(".dSYM")).collect();
        assert_eq!(dsyms, vec!["Hello.app.dSYM"]);

        let signed = fx.path().join("bin").join("signed-entitlements.plist");
        let entitlements = Value::from_file(&signed).unwrap();
        assert_eq!(
            entitlements
                .as_dictionary()
                .and_then(|d| d.get("get-task-allow")),
            Some(&Value::Boolean(true))
        );

        let log = fs::read_to_string(fx.path().join("bin").join("codesign.log")).unwrap();
        let lines: Vec<_> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("/fake/codesign_allocate -f -s iPhone Developer --entitlements "));
        assert!(lines[0].ends_with("Hello.app"));

        let leftover: Vec<_> = fs::read_dir(fx.path().join("tmp"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("Entitlements"))
            .collect();
        assert!(leftover.is_empty(), "scratch entitlements left behind: {:?}", leftover);
    }

    #[cfg(unix)]
    #[test]
    fn test_device_launch_signs_before_starting_bridge() {
        let fx = Fixture::new();
        let config = TargetConfig {
            tools: install_fake_tools(&fx),
            ..fx.config(Arch::Thumbv7)
        };
        let target = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        let out_path = fx.path().join("app.out");
        let params = LaunchParameters {
            arguments: vec!["-v".to_string(), "two words".to_string()],
            stdout_fifo: Some(out_path.clone()),
            ..Default::default()
        };

        let mut process = target.launch(&params).unwrap();
        assert!(process.wait().unwrap().success());

        let app_dir = fx.path().join("install").join("Hello.app");
        let log = fs::read_to_string(fx.path().join("bin").join("codesign.log")).unwrap();
        assert_eq!(log.lines().count(), 1);

        let args = fs::read_to_string(fx.path().join("bin").join("fruitstrap.args")).unwrap();
        let args: Vec<_> = args.lines().collect();
        let value_of = |flag: &str| {
            let at = args.iter().position(|a| *a == flag).unwrap();
            args[at + 1].to_string()
        };
        assert_eq!(value_of("--args"), r#""-v" "two words""#);
        assert_eq!(value_of("--bundle"), app_dir.display().to_string());
        assert_eq!(args.last(), Some(&app_dir.display().to_string().as_str()));

        assert_eq!(fs::read_to_string(&out_path).unwrap(), "launched\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_simulator_install_skips_signing() {
        let fx = Fixture::new();
        let config = TargetConfig {
            tools: install_fake_tools(&fx),
            ..fx.config(Arch::X86)
        };
        let target = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        let install_dir = fx.path().join("install").join("Hello.app");
        target.install(&install_dir).unwrap();

        assert!(install_dir.join("Info.plist").is_file());
        assert!(!install_dir.join("ResourceRules.plist").exists());
        assert!(fx.path().join("install").join("Hello.app.dSYM").is_dir());
        assert!(!fx.path().join("bin").join("codesign.log").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_simulator_launch_from_tmp_bundle() {
        let fx = Fixture::new();
        let config = TargetConfig {
            tools: install_fake_tools(&fx),
            skip_install: true,
            ..fx.config(Arch::X86)
        };
        let target = IosTarget::initialize_with(config, &fx.registry()).unwrap();
        let params = LaunchParameters {
            arguments: vec!["-v".to_string()],
            ..Default::default()
        };
        let mut process = target.launch(&params).unwrap();
        assert!(process.wait().unwrap().success());

        let app_dir = target.app_dir().unwrap();
        assert!(app_dir.starts_with(fx.path().join("tmp")));
        assert!(app_dir.join("Hello").is_file());
        assert!(app_dir.join("Info.plist").is_file());
        assert!(!app_dir.with_file_name("Hello.app.dSYM").exists());

        let log = fs::read_to_string(fx.path().join("bin").join("ios-sim.log")).unwrap();
        assert_eq!(
            log.trim(),
            format!(
                "launch {} --unbuffered --family iphone --args -v",
                app_dir.display()
            )
        );
    }
}
