//! Service-manager integration
//!
//! Hosts without systemd are not an error: the unit is simply left for the
//! operator to start.

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Result, ResultExt};
use crate::process::{self, command};

/// Default unit name for the mail server
pub const MADDY_UNIT: &str = "maddy";

/// Reload unit files, then enable and start `unit`
pub async fn enable_and_start(unit: &str, cancel: &CancellationToken) -> Result<()> {
    let Some(systemctl) = process::find_on_path("systemctl") else {
        info!("systemctl not found, not starting {}", unit);
        return Ok(());
    };

    for args in [
        vec!["daemon-reload"],
        vec!["enable", unit],
        vec!["start", unit],
    ] {
        let mut cmd = command(&systemctl);
        cmd.args(&args);
        process::run(&mut cmd, cancel)
            .await
            .with_context(|| format!("systemctl {}", args.join(" ")))?;
    }

    info!("{} enabled and started", unit);
    Ok(())
}
