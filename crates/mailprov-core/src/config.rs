//! Configuration types for the provisioning system
//!
//! Every struct here is built once at the boundary (CLI flags, environment,
//! a config file) and passed by value into the core. Empty fields fall back
//! to the defaults exposed by the accessor methods.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pinned known-good maddy release
pub const DEFAULT_VERSION: &str = "0.8.1";
/// Upstream source repository
pub const DEFAULT_REPOSITORY: &str = "https://github.com/foxcpp/maddy";
/// Upstream release artifact host
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://github.com/foxcpp/maddy/releases/download";
/// Default filesystem root for installation
pub const DEFAULT_INSTALL_ROOT: &str = "/";
/// Default prefix below the root
pub const DEFAULT_INSTALL_PREFIX: &str = "usr/local";
/// Default service account
pub const DEFAULT_SERVICE_USER: &str = "maddy";
/// Default service group
pub const DEFAULT_SERVICE_GROUP: &str = "maddy";

/// Desired binary provenance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSpec {
    /// Release version, with or without a leading `v`
    pub version: String,
    /// Explicit git ref for source builds
    pub git_ref: String,
    /// Source repository URL
    pub repository: String,
    /// Release artifact host
    pub download_base_url: String,
    /// Always build from source, whatever the platform
    pub force_compile: bool,
    /// Filesystem root that the layout is installed under
    pub install_root: String,
    /// Prefix for binaries, unit files and man pages, relative to the root
    pub install_prefix: String,
    /// Leave the temporary workspace behind for debugging
    pub keep_artifacts: bool,
}

impl InstallSpec {
    /// Release version without a leading `v`
    pub fn version(&self) -> &str {
        let v = self.version.strip_prefix('v').unwrap_or(&self.version);
        if v.is_empty() { DEFAULT_VERSION } else { v }
    }

    /// Git ref to clone, derived from the version when not set
    pub fn git_ref(&self) -> String {
        if self.git_ref.is_empty() {
            format!("refs/tags/v{}", self.version())
        } else {
            self.git_ref.clone()
        }
    }

    /// Source repository URL
    pub fn repository(&self) -> &str {
        or_default(&self.repository, DEFAULT_REPOSITORY)
    }

    /// Release artifact host, without trailing slash
    pub fn download_base_url(&self) -> &str {
        or_default(&self.download_base_url, DEFAULT_DOWNLOAD_BASE_URL).trim_end_matches('/')
    }

    /// Installation root
    pub fn install_root(&self) -> PathBuf {
        PathBuf::from(or_default(&self.install_root, DEFAULT_INSTALL_ROOT))
    }

    /// Installation prefix, relative to the root
    pub fn install_prefix(&self) -> &str {
        or_default(&self.install_prefix, DEFAULT_INSTALL_PREFIX)
    }

    /// `<root>/<prefix>`
    pub fn prefix_dir(&self) -> PathBuf {
        self.install_root().join(self.install_prefix().trim_start_matches('/'))
    }

    /// Validate the inputs
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.version().chars().any(char::is_whitespace) {
            return Err(crate::Error::config(format!(
                "Invalid version: {:?}",
                self.version
            )));
        }
        if !self.download_base_url().starts_with("http://")
            && !self.download_base_url().starts_with("https://")
        {
            return Err(crate::Error::config(format!(
                "Download base URL must use HTTP or HTTPS scheme. Got: {}",
                self.download_base_url()
            )));
        }
        Ok(())
    }
}

/// Desired service configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSpec {
    /// Host name of the mail server, as published in MX records
    pub hostname: String,
    /// Primary mail domain
    pub primary_domain: String,
    /// Further mail domains served by the same instance, in order
    pub additional_domains: Vec<String>,
    /// Filesystem root; must match the one used for installation
    pub install_root: String,
    /// Installation prefix; must match the one used for installation
    pub install_prefix: String,
    /// Account that owns config and certificates
    pub service_user: String,
    /// Group that owns config and certificates
    pub service_group: String,
}

impl ConfigSpec {
    /// Installation root
    pub fn install_root(&self) -> PathBuf {
        PathBuf::from(or_default(&self.install_root, DEFAULT_INSTALL_ROOT))
    }

    /// Installation prefix, relative to the root
    pub fn install_prefix(&self) -> &str {
        or_default(&self.install_prefix, DEFAULT_INSTALL_PREFIX)
    }

    /// Service account name
    pub fn service_user(&self) -> &str {
        or_default(&self.service_user, DEFAULT_SERVICE_USER)
    }

    /// Service group name
    pub fn service_group(&self) -> &str {
        or_default(&self.service_group, DEFAULT_SERVICE_GROUP)
    }

    /// `<root>/etc/maddy`
    pub fn config_dir(&self) -> PathBuf {
        config_dir(&self.install_root())
    }

    /// `<root>/etc/maddy/maddy.conf`
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join(CONFIG_FILE_NAME)
    }

    /// `<root>/etc/letsencrypt`
    pub fn certs_dir(&self) -> PathBuf {
        self.install_root().join("etc/letsencrypt")
    }

    /// Validate the inputs
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.hostname.trim().is_empty() {
            return Err(crate::Error::config("Hostname is required"));
        }
        if self.primary_domain.trim().is_empty() {
            return Err(crate::Error::config("Primary mail domain is required"));
        }
        check_name("hostname", &self.hostname)?;
        check_name("primary mail domain", &self.primary_domain)?;
        for domain in &self.additional_domains {
            check_name("additional mail domain", domain)?;
        }
        Ok(())
    }
}

/// Name of the maddy configuration file
pub const CONFIG_FILE_NAME: &str = "maddy.conf";

/// `<root>/etc/maddy`
pub fn config_dir(root: &std::path::Path) -> PathBuf {
    root.join("etc/maddy")
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Zone ID (optional, looked up by name when absent)
        #[serde(default)]
        zone_id: Option<String>,
        /// Zone name (used when no zone ID is given)
        #[serde(default)]
        zone_name: Option<String>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                zone_name,
            } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                let has_id = zone_id.as_deref().is_some_and(|z| !z.is_empty());
                let has_name = zone_name.as_deref().is_some_and(|z| !z.is_empty());
                if !has_id && !has_name {
                    return Err(crate::Error::config(
                        "Cloudflare provider needs a zone ID or a zone name",
                    ));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// A name substituted into a config line must be one non-blank token
fn check_name(what: &str, value: &str) -> Result<(), crate::Error> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(crate::Error::config(format!("Invalid {}: {:?}", what, value)));
    }
    Ok(())
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}
