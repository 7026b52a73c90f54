//! Webhook-driven guest provisioning for Proxmox VE clusters.
//!
//! This crate automates one workflow end to end: clone a template into a new
//! guest, poll the asynchronous clone task with bounded retries, then
//! reconcile the guest's network and identity configuration by merging
//! partial updates into PVE's comma-separated inline config strings.
//!
//! Layers, leaves first:
//! - [`Transport`]: one HTTP attempt per call, bounded timeout, per-call TLS
//!   override, closed error taxonomy.
//! - [`InlineConfig`]: codec for the `key=value,...` micro-format, order
//!   preserving so partial merges never drop sibling keys.
//! - [`GuestLifecycle`]: typed request builders for clone, create, config
//!   fetch/update and task status.
//! - [`TaskPoller`]: bounded, cancellable polling to a three-way outcome.
//! - [`Provisioner`]: the clone → poll → reconcile sequence.
//! - [`webhook`]: thin adapter from inventory webhook events to the above.
//!
//! # Examples
//!
//! ```no_run
//! use vmforge::{GuestSpec, IpAssignment, Provisioner, PveCredential, PveEndpoint};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = PveEndpoint::new(
//!         "https://pve.example.com:8006".parse()?,
//!         "pve1",
//!         PveCredential::api_token("automation@pve!inventory", "secret"),
//!     )?;
//!
//!     let spec = GuestSpec {
//!         id: 100,
//!         name: "web-01".into(),
//!         storage: "local-lvm".into(),
//!         cores: 2,
//!         memory_mb: 2048,
//!         disk_gb: 32,
//!         bridge: "vmbr0".into(),
//!         ipv4: Some(IpAssignment {
//!             cidr: "10.0.0.20/24".into(),
//!             gateway: Some("10.0.0.1".into()),
//!         }),
//!         ipv6: None,
//!         nameservers: vec!["10.0.0.53".into()],
//!         ssh_keys: vec!["ssh-ed25519 AAAA ops".into()],
//!         rate_limit_mbps: None,
//!     };
//!
//!     let provisioner = Provisioner::new()?;
//!     provisioner.provision(&endpoint, 9000, &spec).await?;
//!     Ok(())
//! }
//! ```

mod core;
mod provision;
pub mod webhook;

pub use crate::core::domain::error::{
    EndpointError, OrchestrationError, PveError, PveResult, TransportError, TransportResult,
};
pub use crate::core::domain::inline_config::InlineConfig;
pub use crate::core::domain::model::{
    ExistingGuestConfig, GuestConfigUpdate, GuestSpec, IpAssignment, IpConfigUpdate,
    NetworkUpdate, PveCredential, PveEndpoint, TaskHandle, TaskState, TaskStatus,
};
pub use crate::core::infrastructure::transport::{
    RequestOptions, Transport, DEFAULT_TIMEOUT,
};
pub use crate::provision::lifecycle::GuestLifecycle;
pub use crate::provision::orchestrator::Provisioner;
pub use crate::provision::poller::{
    BudgetExhausted, PollOutcome, PollerConfig, TaskPoller, TaskStatusSource,
};
