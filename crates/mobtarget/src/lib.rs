//! # mobtarget
//!
//! Command-line tool for packaging, signing and launching iOS apps.
//!
//! ## Overview
//!
//! `mobtarget` is the CLI front end of [`mobtarget_sdk`]. It handles:
//!
//! - **Linking** - Links object files against the selected iOS SDK
//! - **Installing** - Writes `Info.plist`, generates the dSYM bundle and signs device builds
//! - **Launching** - Starts the app in the simulator or on an attached device
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter config
//! mobtarget init
//!
//! # Show installed SDKs
//! mobtarget sdks --arch x86
//!
//! # Link, install and launch on a device
//! mobtarget build --out build/Hello --object build/main.o --lib-arg=-lobjc
//! mobtarget install --install-dir build/Hello.app
//! mobtarget launch -- --verbose
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `init` | Write a starter `mobtarget.toml` |
//! | `sdks` | List installed SDKs |
//! | `build` | Link an executable against the bound SDK |
//! | `install` | Install and prepare an app bundle |
//! | `launch` | Launch the app and wait for it to exit |
//!
//! ## CLI Flags
//!
//! Global flags available on all commands:
//!
//! - **`--verbose` / `-v`** - Log every tool invocation and its output
//! - **`--config`** - Use this config file instead of discovering `mobtarget.toml`
//!
//! `RUST_LOG` overrides the log filter chosen by `--verbose`.
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `mobtarget.toml`

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use mobtarget_sdk::{
    Arch, DeviceFamily, IosTarget, LaunchParameters, SdkRegistry, TargetConfig, Variant,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

pub mod config;

use config::{CONFIG_FILE_NAME, ConfigResolver, MobtargetConfig};

/// Build, sign and launch iOS apps.
#[derive(Parser, Debug)]
#[command(name = "mobtarget", author, version, about = "iOS packaging and launch orchestrator", long_about = None)]
struct Cli {
    /// Print verbose output including all commands
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Path to the config file (default: discover mobtarget.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter config file.
    Init {
        #[arg(long, default_value = CONFIG_FILE_NAME)]
        output: PathBuf,
        #[arg(long, default_value = "Hello", help = "Executable name for the starter config")]
        executable_name: String,
        #[arg(long, help = "Overwrite an existing file")]
        force: bool,
    },
    /// List installed SDKs for the selected architecture.
    Sdks {
        #[arg(long, value_parser = parse_arch)]
        arch: Option<Arch>,
    },
    /// Link object files into an executable against the bound SDK.
    Build {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, help = "Output executable")]
        out: PathBuf,
        #[arg(long = "object", required = true, help = "Object file to link (repeatable)")]
        objects: Vec<PathBuf>,
        #[arg(long = "cc-arg", allow_hyphen_values = true, help = "Extra compiler driver argument")]
        cc_args: Vec<String>,
        #[arg(long = "lib-arg", allow_hyphen_values = true, help = "Library argument (e.g. -lobjc)")]
        lib_args: Vec<String>,
    },
    /// Install the executable and prepare the app bundle.
    Install {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Launch the app and wait for it to exit.
    Launch {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, help = "FIFO receiving the app's stdout")]
        stdout_fifo: Option<PathBuf>,
        #[arg(long, help = "FIFO receiving the app's stderr")]
        stderr_fifo: Option<PathBuf>,
        #[arg(long, value_parser = parse_family, help = "Simulated device family: iphone or ipad")]
        family: Option<DeviceFamily>,
        #[arg(long, help = "Launch from a scratch bundle instead of the install dir")]
        skip_install: bool,
        /// Arguments passed to the app
        #[arg(last = true)]
        args: Vec<String>,
    },
}

/// Flags overriding the `[target]` table.
#[derive(Args, Debug, Default)]
struct TargetArgs {
    #[arg(long, value_parser = parse_arch, help = "thumbv7 (device) or x86 (simulator)")]
    arch: Option<Arch>,
    #[arg(long, help = "SDK version to bind, e.g. 8.1")]
    sdk: Option<String>,
    #[arg(long)]
    install_dir: Option<PathBuf>,
    #[arg(long)]
    sign_identity: Option<String>,
}

impl TargetArgs {
    fn apply(self, config: &mut TargetConfig) {
        if let Some(arch) = self.arch {
            config.arch = Some(arch);
        }
        if let Some(sdk) = self.sdk {
            config.sdk_version = Some(sdk);
        }
        if let Some(dir) = self.install_dir {
            config.install_dir = Some(dir);
        }
        if let Some(identity) = self.sign_identity {
            config.sign_identity = identity;
        }
    }
}

fn parse_arch(s: &str) -> std::result::Result<Arch, String> {
    s.parse::<Arch>().map_err(|e| e.to_string())
}

fn parse_family(s: &str) -> std::result::Result<DeviceFamily, String> {
    s.parse::<DeviceFamily>().map_err(|e| e.to_string())
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("mobtarget=debug,mobtarget_sdk=debug")
        } else {
            EnvFilter::new("mobtarget=info,mobtarget_sdk=info")
        }
    });

    // try_init: tests may run the CLI more than once in one process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}

/// Entry point shared by the binary.
///
/// Returns the process exit code: the app's own exit code for `launch`,
/// success otherwise.
pub fn run() -> Result<ExitCode> {
    load_dotenv();
    run_with(Cli::parse())
}

/// `.env` beside the nearest `mobtarget.toml`, else in `start`.
fn dotenv_path(start: &Path) -> PathBuf {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE_NAME).is_file())
        .unwrap_or(start)
        .join(".env")
}

fn load_dotenv() {
    if let Ok(cwd) = std::env::current_dir() {
        // .env is optional
        let _ = dotenvy::from_path(dotenv_path(&cwd));
    }
}

fn run_with(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose);

    match cli.command {
        Command::Init {
            output,
            executable_name,
            force,
        } => {
            cmd_init(&output, &executable_name, force)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Sdks { arch } => {
            let resolver = ConfigResolver::load(cli.config.as_deref())?;
            let mut config = resolver.target();
            if arch.is_some() {
                config.arch = arch;
            }
            cmd_sdks(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Build {
            target,
            out,
            objects,
            cc_args,
            lib_args,
        } => {
            let ios = initialize(cli.config.as_deref(), target)?;
            let linker = ios.default_linker();
            ios.build(&out, &cc_args, &objects, &lib_args, &linker)
                .with_context(|| format!("Failed to link {}", out.display()))?;
            println!("Linked {}", out.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Install { target } => {
            let ios = initialize(cli.config.as_deref(), target)?;
            let install_dir = ios
                .config()
                .install_dir
                .clone()
                .context("No install directory. Pass --install-dir or set target.install_dir")?;
            ios.install(&install_dir)
                .with_context(|| format!("Failed to install to {}", install_dir.display()))?;
            println!("Installed {}", install_dir.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Launch {
            target,
            stdout_fifo,
            stderr_fifo,
            family,
            skip_install,
            args,
        } => {
            let resolver = ConfigResolver::load(cli.config.as_deref())?;
            let mut config = resolver.target();
            target.apply(&mut config);
            if skip_install {
                config.skip_install = true;
            }
            let params = launch_parameters(
                &resolver,
                &config,
                LaunchOverrides {
                    stdout_fifo,
                    stderr_fifo,
                    family,
                    args,
                },
            )?;
            let ios = IosTarget::initialize(config).context("Failed to initialize target")?;
            cmd_launch(&ios, &params)
        }
    }
}

fn initialize(config_path: Option<&Path>, args: TargetArgs) -> Result<IosTarget> {
    let resolver = ConfigResolver::load(config_path)?;
    let mut config = resolver.target();
    args.apply(&mut config);
    IosTarget::initialize(config).context("Failed to initialize target")
}

fn cmd_init(output: &Path, executable_name: &str, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite it",
            output.display()
        );
    }
    let contents = MobtargetConfig::generate_starter_toml(executable_name);
    std::fs::write(output, contents)
        .with_context(|| format!("Failed to write config file: {:?}", output))?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn cmd_sdks(config: &TargetConfig) -> Result<()> {
    let variant = Variant::from_arch(config.arch())?;
    let registry = SdkRegistry::locate(config).context("Failed to locate Xcode")?;
    let sdks = registry.list_sdks(variant)?;
    if sdks.is_empty() {
        println!(
            "No {} SDKs found in {}",
            variant.as_str(),
            registry.sdks_dir(variant).display()
        );
        return Ok(());
    }
    for sdk in &sdks {
        println!(
            "{:<8} {:<24} {}",
            sdk.version(),
            sdk.canonical_name(),
            sdk.root().display()
        );
    }
    Ok(())
}

struct LaunchOverrides {
    stdout_fifo: Option<PathBuf>,
    stderr_fifo: Option<PathBuf>,
    family: Option<DeviceFamily>,
    args: Vec<String>,
}

/// Merges CLI flags with the `[launch]` table.
///
/// The simulator is booted with the SDK version bound for the target.
fn launch_parameters(
    resolver: &ConfigResolver,
    config: &TargetConfig,
    overrides: LaunchOverrides,
) -> Result<LaunchParameters> {
    let defaults = resolver.launch();
    let arguments = if overrides.args.is_empty() {
        defaults.arguments
    } else {
        overrides.args
    };
    let simulator_sdk = match Variant::from_arch(config.arch())? {
        Variant::Simulator => config.sdk_version.clone(),
        Variant::Device => None,
    };
    Ok(LaunchParameters {
        arguments,
        stdout_fifo: overrides.stdout_fifo.or(defaults.stdout_fifo),
        stderr_fifo: overrides.stderr_fifo.or(defaults.stderr_fifo),
        simulator_sdk,
        family: resolver.resolve(overrides.family, |c| Some(c.launch.family), DeviceFamily::default()),
    })
}

fn cmd_launch(target: &IosTarget, params: &LaunchParameters) -> Result<ExitCode> {
    let mut process = target.launch(params).context("Failed to launch app")?;
    tracing::info!("Started {} (pid {})", process.command(), process.id());
    let status = process.wait()?;
    match status.code() {
        Some(0) => Ok(ExitCode::SUCCESS),
        Some(code) => {
            tracing::info!("App exited with status {}", code);
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
        None => {
            tracing::error!("App was terminated by a signal");
            Ok(ExitCode::FAILURE)
        }
    }
}
