//! Domain models for guest provisioning.
//!
//! All of these are request/response-scoped value objects: created for one
//! orchestration run and discarded afterwards. Nothing here is cached; the
//! cluster is the sole source of truth for guest state.

use serde::{Deserialize, Serialize};

/// One IP assignment: an address in CIDR notation plus an optional gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IpAssignment {
    /// Address in CIDR notation, e.g. `10.0.0.20/24` or `fd00::20/64`.
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

/// Desired shape of a new guest, supplied by the caller and read-only to the
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GuestSpec {
    /// Guest identifier, unique within the cluster.
    pub id: u32,
    pub name: String,
    /// Storage pool for the guest's disks.
    pub storage: String,
    /// CPU core count.
    pub cores: u32,
    /// Memory in MB.
    pub memory_mb: u64,
    /// Disk size in GB.
    pub disk_gb: u64,
    /// Bridge the primary network interface attaches to, e.g. `vmbr0`.
    pub bridge: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<IpAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<IpAssignment>,
    /// Nameservers in lookup order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    /// SSH public keys installed via cloud-init, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    /// Network rate limit in Mbps. The PVE API expects MB/s; the lifecycle
    /// layer divides by 8 on the way out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_mbps: Option<f64>,
}

/// Partial update applied to an existing guest. Only fields that are `Some`
/// are touched; everything else keeps its current value on the cluster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuestConfigUpdate {
    pub name: Option<String>,
    pub cores: Option<u32>,
    pub memory_mb: Option<u64>,
    pub nameservers: Option<Vec<String>>,
    pub ssh_keys: Option<Vec<String>>,
    pub network: Option<NetworkUpdate>,
    pub ip: Option<IpConfigUpdate>,
}

/// Partial update to the `net0` inline config field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkUpdate {
    pub bridge: Option<String>,
    /// Rate limit in Mbps, converted to MB/s on the wire.
    pub rate_limit_mbps: Option<f64>,
}

/// Partial update to the `ipconfig0` inline config field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IpConfigUpdate {
    pub ipv4: Option<IpAssignment>,
    pub ipv6: Option<IpAssignment>,
}

/// Snapshot of the guest configuration fields read before a partial update.
///
/// Every field is required: a response missing any of them (or carrying the
/// wrong type) is rejected as a schema mismatch rather than silently feeding
/// a corrupt merge. Fetched fresh before every reconciliation, never cached,
/// because other actors may mutate the cluster concurrently.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExistingGuestConfig {
    pub boot: String,
    #[serde(rename = "citype")]
    pub cloud_init_type: String,
    #[serde(rename = "ciuser")]
    pub cloud_init_user: String,
    pub cores: u32,
    pub cpu: String,
    pub digest: String,
    #[serde(rename = "ide2")]
    pub cloud_init_drive: String,
    #[serde(rename = "ipconfig0")]
    pub ip_config: String,
    pub memory: u64,
    pub meta: String,
    pub name: String,
    pub nameserver: String,
    #[serde(rename = "net0")]
    pub net: String,
    pub onboot: u8,
    pub ostype: String,
    #[serde(rename = "scsi0")]
    pub disk: String,
    pub scsihw: String,
    pub smbios1: String,
    pub sockets: u32,
    pub sshkeys: String,
    pub vmgenid: String,
}
