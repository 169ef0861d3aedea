// # mailprov-core
//
// Core library for provisioning a maddy mail server and converging the DNS
// records mail delivery depends on.
//
// ## Architecture Overview
//
// - **acquire**: decide between a prebuilt download and a source build, then
//   install into the `install_root`/`install_prefix` layout
// - **patch**: line-oriented, crash-safe rewriting of config files
// - **configure**: domain substitution, certificate wiring and ownership
// - **service**: enable and start the installed unit
// - **DnsApi**: trait for listing and mutating records in one DNS zone
// - **mail**: MX/SPF/DKIM/DMARC/MTA-STS reconciliation against a DnsApi
// - **ProviderRegistry**: plugin-based registry for DNS providers
//
// ## Design Principles
//
// 1. **Explicit inputs**: every operation takes a spec struct built at the
//    boundary; the core never reads flags or environment variables
// 2. **Plugin-Based**: providers are registered dynamically, no hard-coded if-else
// 3. **Library-First**: the binary only binds arguments and sequences calls
// 4. **Cancellable**: long-running calls race a shared CancellationToken

pub mod acquire;
pub mod cancel;
pub mod config;
pub mod configure;
pub mod error;
pub mod mail;
pub mod patch;
pub mod process;
pub mod registry;
pub mod service;
pub mod traits;

// Re-export core types for convenience
pub use acquire::{AcquireReport, Platform, Strategy, acquire, acquire_on, select_strategy};
pub use config::{ConfigSpec, InstallSpec, ProviderConfig};
pub use configure::configure;
pub use error::{Error, Result, ResultExt};
pub use mail::{MailCategory, MailRecordReconciler, MailRecordsSpec};
pub use patch::{PatchOutcome, PatchRule, patch_file};
pub use registry::ProviderRegistry;
pub use service::enable_and_start;
pub use traits::{DnsApi, DnsApiFactory, Record, RecordQuery, RecordType};
