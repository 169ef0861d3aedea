//! Command-line surface
//!
//! Argument structs only; each converts into the matching core spec type.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mailprov_core::config::{ConfigSpec, InstallSpec, ProviderConfig};
use mailprov_core::mail::{DEFAULT_DKIM_KEY_DIR, DEFAULT_MX_PRIORITY, MailRecordsSpec};
use mailprov_core::traits::{RecordQuery, RecordType};

/// Provision a maddy mail server and keep its DNS records in shape.
#[derive(Parser, Debug)]
#[command(name = "mailprov", version, about)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "MAILPROV_LOG_LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Maddy related commands
    #[command(alias = "m")]
    Maddy {
        #[command(subcommand)]
        command: MaddyCommand,
    },
    /// Cloudflare helper commands
    #[command(alias = "cf")]
    Cloudflare(CloudflareArgs),
}

#[derive(Subcommand, Debug)]
pub enum MaddyCommand {
    /// Install, configure and start maddy
    #[command(alias = "i")]
    Install(InstallArgs),
    /// Configure an already installed maddy
    Configure(ConfigureArgs),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Repository for maddy source code (implies --force-compile)
    #[arg(short = 'r', long = "maddy-repo")]
    pub repository: Option<String>,

    /// Git ref for maddy source code (implies --force-compile)
    #[arg(short = 'b', long = "maddy-ref")]
    pub git_ref: Option<String>,

    /// Maddy version to install
    #[arg(short = 'v', long = "maddy-version", default_value = mailprov_core::config::DEFAULT_VERSION)]
    pub maddy_version: String,

    /// Force compilation rather than download of binary artifacts
    #[arg(short = 'f', long)]
    pub force_compile: bool,

    /// Release artifact host
    #[arg(long, hide = true)]
    pub download_base_url: Option<String>,

    /// Keep the temporary download or build directory
    #[arg(long)]
    pub keep_artifacts: bool,

    #[command(flatten)]
    pub config: ConfigureArgs,
}

impl InstallArgs {
    pub fn install_spec(&self) -> InstallSpec {
        let repository = self.repository.clone().unwrap_or_default();
        let git_ref = self.git_ref.clone().unwrap_or_default();
        InstallSpec {
            version: self.maddy_version.clone(),
            force_compile: self.force_compile || !repository.is_empty() || !git_ref.is_empty(),
            repository,
            git_ref,
            download_base_url: self.download_base_url.clone().unwrap_or_default(),
            install_root: self.config.install_root.to_string_lossy().into_owned(),
            install_prefix: self.config.install_prefix.clone(),
            keep_artifacts: self.keep_artifacts,
        }
    }
}

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Hostname running the maddy server, as shown by MX records
    #[arg(short = 'n', long)]
    pub hostname: String,

    /// Primary email domain
    #[arg(short = 'p', long)]
    pub primary_domain: String,

    /// Additional email domain, can repeat
    #[arg(short = 'a', long = "additional-domain")]
    pub additional_domains: Vec<String>,

    /// Filesystem root to install under
    #[arg(long, default_value = mailprov_core::config::DEFAULT_INSTALL_ROOT)]
    pub install_root: PathBuf,

    /// Prefix below the root for binaries, units and man pages
    #[arg(long, default_value = mailprov_core::config::DEFAULT_INSTALL_PREFIX)]
    pub install_prefix: String,

    /// Account that owns config and certificates
    #[arg(long, default_value = mailprov_core::config::DEFAULT_SERVICE_USER)]
    pub service_user: String,

    /// Group that owns config and certificates
    #[arg(long, default_value = mailprov_core::config::DEFAULT_SERVICE_GROUP)]
    pub service_group: String,
}

impl ConfigureArgs {
    pub fn config_spec(&self) -> ConfigSpec {
        ConfigSpec {
            hostname: self.hostname.clone(),
            primary_domain: self.primary_domain.clone(),
            additional_domains: self.additional_domains.clone(),
            install_root: self.install_root.to_string_lossy().into_owned(),
            install_prefix: self.install_prefix.clone(),
            service_user: self.service_user.clone(),
            service_group: self.service_group.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct CloudflareArgs {
    /// Token for Cloudflare auth
    #[arg(long, global = true, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Cloudflare zone name
    #[arg(long, global = true)]
    pub zone_name: Option<String>,

    /// Cloudflare zone ID
    #[arg(long, global = true)]
    pub zone_id: Option<String>,

    #[command(subcommand)]
    pub command: CloudflareCommand,
}

impl CloudflareArgs {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig::Cloudflare {
            api_token: self.token.clone().unwrap_or_default(),
            zone_id: self.zone_id.clone(),
            zone_name: self.zone_name.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CloudflareCommand {
    /// Read DNS records
    Read(ReadArgs),
    /// DNS records for a maddy mail domain
    Maddy {
        #[command(subcommand)]
        command: CloudflareMaddyCommand,
    },
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Record name
    #[arg(long)]
    pub record_name: Option<String>,

    /// Record type (MX, A, TXT, etc)
    #[arg(long)]
    pub record_type: Option<RecordType>,

    /// Match records with this content
    #[arg(long)]
    pub content: Option<String>,
}

impl ReadArgs {
    pub fn query(&self) -> RecordQuery {
        RecordQuery {
            name: self.record_name.clone(),
            record_type: self.record_type,
            content: self.content.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CloudflareMaddyCommand {
    /// Update DNS records for maddy
    #[command(alias = "update")]
    UpdateDns(UpdateDnsArgs),
}

#[derive(Args, Debug)]
pub struct UpdateDnsArgs {
    /// Mail domain
    #[arg(long)]
    pub mail_domain: String,

    /// Mail domain postmaster email address
    #[arg(long)]
    pub postmaster: String,

    /// DKIM TXT record value; read from the key directory when omitted
    #[arg(long)]
    pub dkim: Option<String>,

    /// MX host, can repeat
    #[arg(long = "mx-host")]
    pub mx_hosts: Vec<String>,

    /// Cause conflicting DNS records to be deleted
    #[arg(long)]
    pub destructive: bool,

    /// Directory holding maddy's generated DKIM keys
    #[arg(long, default_value = DEFAULT_DKIM_KEY_DIR)]
    pub dkim_key_dir: PathBuf,
}

impl UpdateDnsArgs {
    pub fn mail_spec(&self) -> MailRecordsSpec {
        MailRecordsSpec {
            domain: self.mail_domain.clone(),
            postmaster: self.postmaster.clone(),
            dkim: self.dkim.clone().filter(|d| !d.is_empty()),
            mx_hosts: self
                .mx_hosts
                .iter()
                .map(|host| (host.clone(), DEFAULT_MX_PRIORITY))
                .collect::<BTreeMap<_, _>>(),
            destructive: self.destructive,
            dkim_key_dir: self.dkim_key_dir.clone(),
        }
    }
}
