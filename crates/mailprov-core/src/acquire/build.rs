// # Build and Install
//
// Shallow-clones the source at the requested ref and drives the upstream
// build script. Each step runs with the workspace (or the checkout inside
// it) as its working directory.

use std::ffi::OsStr;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::workspace::Workspace;
use crate::config::InstallSpec;
use crate::error::{Result, ResultExt};
use crate::process::{self, command};

const CHECKOUT_DIR: &str = "maddy";

/// Clone, build and install maddy from source
pub async fn build_and_install(spec: &InstallSpec, cancel: &CancellationToken) -> Result<()> {
    let workspace = Workspace::create("maddy-build-", spec.keep_artifacts)?;
    let git_ref = spec.git_ref();

    info!("cloning {} at {}", spec.repository(), git_ref);
    let mut clone = command("git");
    clone
        .args(["clone", "--depth", "1", "--single-branch", "--branch"])
        .arg(short_ref(&git_ref))
        .arg(spec.repository())
        .arg(CHECKOUT_DIR)
        .current_dir(workspace.path());
    process::run(&mut clone, cancel)
        .await
        .with_context(|| format!("cloning {}", spec.repository()))?;

    let checkout = workspace.join(CHECKOUT_DIR);
    let build_script = checkout.join("build.sh");

    step(&checkout, "go", &["mod", "download"], cancel)
        .await
        .context("downloading go modules")?;
    step(&checkout, "go", &["mod", "verify"], cancel)
        .await
        .context("verifying go modules")?;
    step(&checkout, &build_script, &[], cancel)
        .await
        .context("building maddy")?;

    let root = spec.install_root();
    let mut install = command(&build_script);
    install
        .arg("--destdir")
        .arg(&root)
        .args(["--prefix", spec.install_prefix()])
        .arg("install")
        .current_dir(&checkout);
    process::run(&mut install, cancel)
        .await
        .with_context(|| format!("installing maddy into {}", root.display()))?;

    info!("maddy built and installed under {}", spec.prefix_dir().display());
    Ok(())
}

async fn step(
    dir: &Path,
    program: impl AsRef<OsStr>,
    args: &[&str],
    cancel: &CancellationToken,
) -> Result<()> {
    let mut cmd = command(program);
    cmd.args(args).current_dir(dir);
    let output = process::run(&mut cmd, cancel).await?;
    if !output.is_empty() {
        tracing::debug!("{}", output.trim_end());
    }
    Ok(())
}

/// Branch or tag name for `git clone --branch`
fn short_ref(git_ref: &str) -> &str {
    git_ref
        .strip_prefix("refs/tags/")
        .or_else(|| git_ref.strip_prefix("refs/heads/"))
        .unwrap_or(git_ref)
}
