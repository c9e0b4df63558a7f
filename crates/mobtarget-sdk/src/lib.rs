//! iOS target SDK for Rust
//!
//! `mobtarget-sdk` takes a linked iOS executable the rest of the way to a
//! running app: it binds an installed Xcode SDK, writes the bundle's
//! `Info.plist`, generates debug symbols, signs device bundles and launches
//! the app either in the simulator (`ios-sim`) or on an attached device
//! (`fruitstrap`).
//!
//! # Quick Start
//!
//! ```no_run
//! use mobtarget_sdk::{Arch, IosTarget, LaunchParameters, TargetConfig};
//!
//! fn main() -> Result<(), mobtarget_sdk::DeployError> {
//!     let config = TargetConfig {
//!         arch: Some(Arch::Thumbv7),
//!         executable_name: "Hello".to_string(),
//!         executable: Some("target/Hello".into()),
//!         install_dir: Some("build/Hello.app".into()),
//!         ..TargetConfig::default()
//!     };
//!
//!     let target = IosTarget::initialize(config)?;
//!     target.install(std::path::Path::new("build/Hello.app"))?;
//!
//!     let mut process = target.launch(&LaunchParameters {
//!         arguments: vec!["--verbose".to_string()],
//!         ..LaunchParameters::default()
//!     })?;
//!     process.wait()?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **SDK registry** ([`sdk`]): enumerates installed SDKs and picks one
//! - **Executor** ([`executor`]): runs external tools and routes their output
//! - **Manifest** ([`manifest`]): builds `Info.plist`
//! - **Signing** ([`signing`]): dSYM generation, entitlements and `codesign`
//! - **Launch** ([`launch`]): simulator and device launch invocations
//! - **Target** ([`target`]): ties the above together
//!
//! Only two architectures are supported: `x86` selects the simulator and
//! `thumbv7` (the default) selects a physical device.

pub mod executor;
pub mod launch;
pub mod manifest;
pub mod sdk;
pub mod signing;
pub mod target;
pub mod types;

pub use executor::{Executor, LaunchedProcess, OutputSink};
pub use launch::{LaunchParameters, LaunchStrategy};
pub use sdk::{Sdk, SdkRegistry};
pub use target::{ClangLinker, IosTarget, Linker, ResolvedTarget};
pub use types::{Arch, DeployError, DeviceFamily, Result, TargetConfig, ToolPaths, Variant};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
