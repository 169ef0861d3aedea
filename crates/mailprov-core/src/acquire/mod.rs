//! Binary acquisition
//!
//! Materializes the maddy binary, its stock config, unit files and man pages
//! under the `install_root`/`install_prefix` layout, either by downloading a
//! prebuilt release or by building from source.
//!
//! ## Strategy Selection
//!
//! | Platform          | `force_compile = false` | `force_compile = true` |
//! |-------------------|-------------------------|------------------------|
//! | linux / x86_64    | download                | build                  |
//! | linux / aarch64   | build                   | build                  |
//! | linux / other     | unsupported             | build                  |
//! | other OS          | unsupported             | build                  |
//!
//! Selection is pure and happens before any network or subprocess activity.

mod build;
mod download;
mod workspace;

pub use build::build_and_install;
pub use download::{download_and_install, install_extracted};
pub use workspace::Workspace;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::InstallSpec;
use crate::error::{Error, Result, ResultExt};

/// Prebuilt artifact variant for linux/x86_64
pub const LINUX_X86_64_VARIANT: &str = "x86_64-linux-musl";

/// Host operating system and CPU architecture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system, as in `std::env::consts::OS`
    pub os: String,
    /// Architecture, as in `std::env::consts::ARCH`
    pub arch: String,
}

impl Platform {
    /// Describe an arbitrary platform
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this process runs on
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Whether service-manager unit files are installed here
    pub fn uses_systemd(&self) -> bool {
        self.os == "linux"
    }
}

/// How the binary is obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Fetch and unpack a prebuilt release artifact
    Download {
        /// Artifact variant string, e.g. `x86_64-linux-musl`
        variant: String,
    },
    /// Clone the source and run its build script
    Build,
}

/// Pick an acquisition strategy for `platform`
pub fn select_strategy(spec: &InstallSpec, platform: &Platform) -> Result<Strategy> {
    if spec.force_compile {
        return Ok(Strategy::Build);
    }

    match platform.os.as_str() {
        "linux" => match platform.arch.as_str() {
            "x86_64" => Ok(Strategy::Download {
                variant: LINUX_X86_64_VARIANT.to_string(),
            }),
            "aarch64" => Ok(Strategy::Build),
            _ => Err(Error::unsupported_arch(&platform.os, &platform.arch)),
        },
        _ => Err(Error::unsupported_os(&platform.os, &platform.arch)),
    }
}

/// What an acquisition run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireReport {
    /// The strategy that ran
    pub strategy: Strategy,
    /// Where the config template landed, for downloads
    pub config_path: Option<std::path::PathBuf>,
}

/// Acquire and install maddy for the current host
pub async fn acquire(spec: &InstallSpec, cancel: &CancellationToken) -> Result<AcquireReport> {
    acquire_on(spec, &Platform::current(), cancel).await
}

/// Acquire and install maddy as if running on `platform`
pub async fn acquire_on(
    spec: &InstallSpec,
    platform: &Platform,
    cancel: &CancellationToken,
) -> Result<AcquireReport> {
    spec.validate()?;
    let strategy = select_strategy(spec, platform)?;
    info!(
        "acquiring maddy {} for {}/{} via {:?}",
        spec.version(),
        platform.os,
        platform.arch,
        strategy
    );

    match &strategy {
        Strategy::Download { variant } => {
            let config_path = download_and_install(spec, platform, variant, cancel)
                .await
                .context("downloading and installing release")?;
            Ok(AcquireReport {
                strategy,
                config_path: Some(config_path),
            })
        }
        Strategy::Build => {
            build_and_install(spec, cancel)
                .await
                .context("building and installing from source")?;
            Ok(AcquireReport {
                strategy,
                config_path: None,
            })
        }
    }
}
