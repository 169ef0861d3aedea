// # mailprov
//
// Thin integration layer: binds command-line arguments to the input structs
// of `mailprov-core`, registers DNS providers and sequences the core
// operations. No provisioning or DNS logic lives here.
//
// ## Commands
//
// - `mailprov maddy install`: acquire, configure, enable and start maddy
// - `mailprov maddy configure`: configure an installed maddy only
// - `mailprov cloudflare read`: list records as `id: TYPE name :: content`
// - `mailprov cloudflare maddy update-dns`: reconcile the mail records
//
// ## Environment
//
// - `MAILPROV_LOG_LEVEL`: log level (default info)
// - `CLOUDFLARE_API_TOKEN`: Cloudflare token, instead of `--token`
// - `MAILPROV_MODE=dry-run`: read from the DNS provider but never write
//
// ## Example
//
// ```bash
// export CLOUDFLARE_API_TOKEN=your_token
//
// mailprov maddy install -n mx.example.org -p example.org
// mailprov cloudflare --zone-name example.org maddy update-dns \
//     --mail-domain example.org --postmaster postmaster@example.org \
//     --mx-host mx.example.org --destructive
// ```

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mailprov_core::mail::MailRecordReconciler;
use mailprov_core::service::MADDY_UNIT;
use mailprov_core::{DnsApi, ProviderRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::cli::{Cli, CloudflareArgs, CloudflareCommand, CloudflareMaddyCommand, Command, MaddyCommand};

/// Exit codes for different termination scenarios
///
/// - 0: Success
/// - 1: Configuration or startup error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MailprovExitCode {
    Success = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<MailprovExitCode> for ExitCode {
    fn from(code: MailprovExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(log_level) = parse_level(&cli.log_level) else {
        eprintln!(
            "Configuration error: log level '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            cli.log_level
        );
        return MailprovExitCode::ConfigError.into();
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return MailprovExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return MailprovExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(cancel_on_interrupt(cancel.clone()));

        let outcome = run(cli.command, &cancel).await;
        watcher.abort();
        outcome
    });

    match result {
        Ok(()) => MailprovExitCode::Success.into(),
        Err(e) => {
            let (message, code) = failure(&e);
            error!("{}", message);
            code.into()
        }
    }
}

/// Log message and exit code for a failed run
///
/// Core errors already render their context chain in `Display`, so the
/// alternate form (which walks `source()` again) is not used.
fn failure(e: &anyhow::Error) -> (String, MailprovExitCode) {
    let code = match e.downcast_ref::<mailprov_core::Error>().map(|e| e.root()) {
        Some(mailprov_core::Error::Config(_)) => MailprovExitCode::ConfigError,
        _ => MailprovExitCode::RuntimeError,
    };
    (e.to_string(), code)
}

/// Cancel `cancel` on the first interrupt signal
async fn cancel_on_interrupt(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to listen for interrupt: {}", e),
    }
}

async fn run(command: Command, cancel: &CancellationToken) -> Result<()> {
    match command {
        Command::Maddy { command } => match command {
            MaddyCommand::Install(args) => {
                let install = args.install_spec();
                let config = args.config.config_spec();
                install.validate()?;
                config.validate()?;

                let report = mailprov_core::acquire(&install, cancel).await?;
                if let Some(path) = &report.config_path {
                    info!("maddy config template at {}", path.display());
                }
                mailprov_core::configure(&config, cancel).await?;
                mailprov_core::enable_and_start(MADDY_UNIT, cancel).await?;
                Ok(())
            }
            MaddyCommand::Configure(args) => {
                mailprov_core::configure(&args.config_spec(), cancel).await?;
                Ok(())
            }
        },
        Command::Cloudflare(args) => run_cloudflare(args, cancel).await,
    }
}

async fn run_cloudflare(args: CloudflareArgs, cancel: &CancellationToken) -> Result<()> {
    let api = create_api(&args)?;

    match args.command {
        CloudflareCommand::Read(read) => {
            let records = mailprov_core::cancel::cancellable(
                cancel,
                "listing records",
                api.list_records(&read.query()),
            )
            .await?;
            for record in records {
                println!(
                    "{}: {} {} :: {}",
                    record.id.as_deref().unwrap_or_default(),
                    record.record_type,
                    record.name,
                    record.content
                );
            }
            Ok(())
        }
        CloudflareCommand::Maddy {
            command: CloudflareMaddyCommand::UpdateDns(update),
        } => {
            let reconciler = MailRecordReconciler::new(api);
            reconciler
                .update_all_mail_records(&update.mail_spec(), cancel)
                .await?;
            Ok(())
        }
    }
}

fn create_api(args: &CloudflareArgs) -> Result<Arc<dyn DnsApi>> {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    mailprov_provider_cloudflare::register(&registry);

    let api = registry.create_provider(&args.provider_config())?;
    info!("Using {} DNS provider", api.provider_name());
    Ok(Arc::from(api))
}
