//! Service configuration
//!
//! Turns an installed maddy tree into one that serves the requested domains:
//!
//! 1. domain substitution in `etc/maddy/maddy.conf` (via [`crate::patch`])
//! 2. certificate storage under `etc/letsencrypt`, linked as `etc/maddy/certs`
//! 3. ownership and ACLs for the service account
//!
//! Steps run in order; the first failure aborts the rest.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ConfigSpec;
use crate::error::{Error, Result, ResultExt};
use crate::patch::{PatchRule, patch_file_async};
use crate::process::{self, command};

/// Apply `spec` to the installed tree
pub async fn configure(spec: &ConfigSpec, cancel: &CancellationToken) -> Result<()> {
    spec.validate()?;

    configure_domains(spec, cancel)
        .await
        .context("configuring domains")?;
    configure_certs(spec).context("configuring certificates")?;
    configure_permissions(spec, cancel)
        .await
        .context("configuring permissions")?;

    info!("maddy configured for {}", spec.primary_domain);
    Ok(())
}

/// Substitution rules for the stock `maddy.conf`
pub fn domain_rules(spec: &ConfigSpec) -> Result<Vec<PatchRule>> {
    let mut local_domains = String::from("$(local_domains) = $(primary_domain)");
    for domain in &spec.additional_domains {
        local_domains.push(' ');
        local_domains.push_str(domain);
    }

    Ok(vec![
        PatchRule::literal(
            r"^\$\(hostname\) =.*$",
            &format!("$(hostname) = {}", spec.hostname),
        )?,
        PatchRule::literal(
            r"^\$\(primary_domain\) =.*$",
            &format!("$(primary_domain) = {}", spec.primary_domain),
        )?,
        PatchRule::literal(r"^\$\(local_domains\) =.*$", &local_domains)?,
    ])
}

async fn configure_domains(spec: &ConfigSpec, cancel: &CancellationToken) -> Result<()> {
    let path = spec.config_file();
    let outcome = patch_file_async(path.clone(), domain_rules(spec)?, cancel.clone()).await?;
    info!(
        "patched {}: {} line(s) changed, previous version at {}",
        path.display(),
        outcome.lines_changed,
        outcome.backup.display()
    );
    Ok(())
}

fn configure_certs(spec: &ConfigSpec) -> Result<()> {
    let certs = spec.certs_dir();
    let live = certs.join("live");
    let archive = certs.join("archive");
    create_private_dir(&live)?;
    create_private_dir(&archive)?;

    let link = spec.config_dir().join("certs");
    symlink(&live, &link)?;
    info!("linked {} -> {}", link.display(), live.display());
    Ok(())
}

fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|e| Error::fs("creating directory", dir, e))
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| Error::fs("creating symlink", link, e))
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
        .map_err(|e| Error::fs("creating symlink", link, e))
}

async fn configure_permissions(spec: &ConfigSpec, cancel: &CancellationToken) -> Result<()> {
    let certs = spec.certs_dir();

    match process::find_on_path("setfacl") {
        Some(setfacl) => {
            let mut cmd = command(setfacl);
            cmd.args(["-R", "-m"])
                .arg(format!("u:{}:rX", spec.service_user()))
                .arg(certs.join("live"))
                .arg(certs.join("archive"));
            process::run(&mut cmd, cancel)
                .await
                .context("granting certificate access")?;
        }
        None => warn!(
            "setfacl not found, {} may be unable to read certificates",
            spec.service_user()
        ),
    }

    let config_dir = spec.config_dir();
    let mut chown = command("chown");
    chown
        .arg("-R")
        .arg(format!("{}:{}", spec.service_user(), spec.service_group()))
        .arg(&config_dir);
    process::run(&mut chown, cancel)
        .await
        .with_context(|| format!("changing owner of {}", config_dir.display()))?;
    Ok(())
}
