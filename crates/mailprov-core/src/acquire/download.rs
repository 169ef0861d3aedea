// # Download and Install
//
// Fetches `<base>/v<version>/maddy-<version>-<variant>.tar.zst` and streams
// the response body straight into `tar --zstd -xf -`; the archive is never
// buffered in full. The extracted tree is then placed with the `install`
// utility using explicit modes (0755 for directories and executables, 0644
// for config, unit files and docs).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::workspace::Workspace;
use super::Platform;
use crate::cancel::cancellable;
use crate::config::{self, InstallSpec, CONFIG_FILE_NAME};
use crate::error::{Error, Result, ResultExt};
use crate::patch::timestamp;
use crate::process::{self, command};

const USER_AGENT: &str = "maddy installer";

/// Connection timeout for artifact downloads; the body itself may take longer
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Download, extract and install a release; returns where the config landed
pub async fn download_and_install(
    spec: &InstallSpec,
    platform: &Platform,
    variant: &str,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let workspace = Workspace::create("maddy-download-", spec.keep_artifacts)?;

    let dir_name = format!("maddy-{}-{}", spec.version(), variant);
    let url = format!(
        "{}/v{}/{}.tar.zst",
        spec.download_base_url(),
        spec.version(),
        dir_name
    );

    fetch_and_extract(&url, workspace.path(), cancel).await?;

    install_extracted(&workspace.join(&dir_name), spec, platform, cancel).await
}

async fn fetch_and_extract(url: &str, dest: &Path, cancel: &CancellationToken) -> Result<()> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::http(format!("building HTTP client: {}", e)))?;

    info!("begin download: {}", url);
    let mut response = cancellable(cancel, "downloading release", async {
        client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(format!("unable to download {}: {}", url, e)))
    })
    .await?;

    if !response.status().is_success() {
        return Err(Error::http(format!(
            "unexpected status downloading archive {}: {}",
            url,
            response.status()
        )));
    }

    info!("begin extract");
    let mut extract = command("tar");
    extract
        .args(["--zstd", "-xf", "-"])
        .current_dir(dest)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let line = process::describe(&extract);

    let mut child = extract
        .spawn()
        .map_err(|e| Error::fs("starting extract command", "tar", e))?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::cancelled("extract command has no stdin"))?;

    let piped = cancellable(cancel, "streaming archive", async {
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::http(format!("reading body of {}: {}", url, e)))?
        {
            stdin
                .write_all(&chunk)
                .await
                .map_err(|e| Error::fs("piping archive to", "tar", e))?;
        }
        stdin
            .shutdown()
            .await
            .map_err(|e| Error::fs("closing stdin of", "tar", e))
    })
    .await;
    drop(stdin);

    // Transport failures and cancellation win; a write error means tar went
    // away, and its own output explains why
    if matches!(&piped, Err(e) if !matches!(e, Error::Filesystem { .. })) {
        let _ = child.kill().await;
        return piped;
    }

    info!("wait for extract");
    let output = cancellable(cancel, "waiting for extract", async {
        child
            .wait_with_output()
            .await
            .map_err(|e| Error::fs("waiting for", "tar", e))
    })
    .await?;

    let combined = process::combine(&output.stdout, &output.stderr);
    if !output.status.success() {
        return Err(Error::subprocess(line, output.status, combined));
    }
    piped
}

/// Place an already extracted release tree into the install layout
pub async fn install_extracted(
    build_dir: &Path,
    spec: &InstallSpec,
    platform: &Platform,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let prefix_dir = spec.prefix_dir();
    let bin_dir = prefix_dir.join("bin");
    let config_dir = config::config_dir(&spec.install_root());

    install_dir(&bin_dir, cancel).await?;
    install_files("0755", &[build_dir.join("maddy")], &bin_dir, cancel)
        .await
        .context("installing maddy binary")?;

    install_dir(&config_dir, cancel).await?;
    let conf_target = config_target(&config_dir)?;
    install_files("0644", &[build_dir.join(CONFIG_FILE_NAME)], &conf_target, cancel)
        .await
        .with_context(|| format!("installing maddy config {}", conf_target.display()))?;

    if platform.uses_systemd() {
        let systemd_dir = prefix_dir.join("lib/systemd/system");
        install_dir(&systemd_dir, cancel).await?;
        let units = files_with_extension(&build_dir.join("systemd"), "service")?;
        if !units.is_empty() {
            install_files("0644", &units, &systemd_dir, cancel)
                .await
                .context("installing maddy systemd service")?;
        }
    }

    let man_src = build_dir.join("man");
    if man_src.is_dir() {
        let man_dir = prefix_dir.join("share/man/man1");
        install_dir(&man_dir, cancel).await?;
        for page in files_with_extension(&man_src, "1")? {
            install_files("0644", std::slice::from_ref(&page), &man_dir, cancel)
                .await
                .with_context(|| format!("installing maddy man file {}", page.display()))?;
        }
    }

    Ok(conf_target)
}

/// `maddy.conf`, or a timestamped sibling when one is already present
fn config_target(config_dir: &Path) -> Result<PathBuf> {
    let target = config_dir.join(CONFIG_FILE_NAME);
    match std::fs::symlink_metadata(&target) {
        Ok(_) => {
            let fresh = config_dir.join(format!("{}.new-{}", CONFIG_FILE_NAME, timestamp()));
            info!(
                "{} exists, installing new config as {}",
                target.display(),
                fresh.display()
            );
            Ok(fresh)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(target),
        Err(e) => Err(Error::fs("checking for", target, e)),
    }
}

async fn install_dir(dir: &Path, cancel: &CancellationToken) -> Result<()> {
    let mut cmd = command("install");
    cmd.args(["-m", "0755", "-d"]).arg(dir);
    process::run(&mut cmd, cancel)
        .await
        .with_context(|| format!("installing directory {}", dir.display()))?;
    Ok(())
}

async fn install_files(
    mode: &str,
    sources: &[PathBuf],
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut cmd = command("install");
    cmd.args(["-m", mode]).args(sources).arg(dest);
    process::run(&mut cmd, cancel).await?;
    Ok(())
}

/// Regular files in `dir` ending in `.<ext>`, sorted; empty if `dir` is absent
fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::fs("listing", dir, e)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::fs("listing", dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|x| x == ext) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
