//! Typed request builders for the guest lifecycle endpoints.
//!
//! Each operation issues exactly one transport call (plus the fresh config
//! fetch that precedes a partial update) and validates the response shape
//! before returning a typed value. Schema mismatches are logged with the
//! full decoding diagnostic and surfaced as an opaque
//! [`PveError::Schema`] kind.

use crate::core::domain::error::{PveError, PveResult};
use crate::core::domain::inline_config::InlineConfig;
use crate::core::domain::model::{
    ExistingGuestConfig, GuestConfigUpdate, GuestSpec, IpAssignment, PveEndpoint, TaskHandle,
    TaskStatus,
};
use crate::core::infrastructure::transport::{RequestOptions, Transport};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error};

/// Default network rate limit in MB/s, applied when the spec leaves the
/// limit unset. 125 MB/s is 1 Gbps.
const DEFAULT_RATE_MBS: f64 = 125.0;

/// Standard `{ "data": ... }` envelope every PVE endpoint responds with.
#[derive(Debug, Deserialize)]
struct ResponseBase<T> {
    data: T,
}

/// Guest lifecycle operations bound to one transport and one endpoint.
///
/// Holds no state of its own; every read goes to the cluster.
pub struct GuestLifecycle<'a> {
    transport: &'a Transport,
    endpoint: &'a PveEndpoint,
}

impl<'a> GuestLifecycle<'a> {
    pub fn new(transport: &'a Transport, endpoint: &'a PveEndpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        let (name, value) = self.endpoint.auth_header();
        headers.insert(name, value);
        headers
    }

    /// Clones a template into a new guest.
    ///
    /// The server starts an asynchronous task; the returned [`TaskHandle`]
    /// must be polled to completion before the new guest is usable.
    pub async fn clone_template(
        &self,
        template_id: u32,
        spec: &GuestSpec,
    ) -> PveResult<TaskHandle> {
        let uri = self.endpoint.api_url(&format!(
            "nodes/{}/qemu/{}/clone",
            self.endpoint.node(),
            template_id
        ));
        let body = json!({
            "newid": spec.id,
            "node": self.endpoint.node(),
            "vmid": template_id,
            "full": true,
            "name": spec.name,
            "storage": spec.storage,
        });

        let value = self
            .transport
            .post(&uri, self.headers(), &body, RequestOptions::default())
            .await?;

        match value.get("data").and_then(Value::as_str) {
            Some(upid) => {
                debug!(guest_id = spec.id, upid, "clone task started");
                Ok(TaskHandle::new(upid))
            }
            None => {
                error!(
                    guest_id = spec.id,
                    response = %value,
                    "clone response did not contain a UPID string"
                );
                Err(PveError::Schema {
                    operation: "cloning a template",
                })
            }
        }
    }

    /// Creates a guest from scratch with a full creation payload.
    pub async fn create_guest(&self, spec: &GuestSpec) -> PveResult<Value> {
        let uri = self
            .endpoint
            .api_url(&format!("nodes/{}/qemu", self.endpoint.node()));
        let body = creation_payload(spec);
        self.transport
            .post(&uri, self.headers(), &body, RequestOptions::default())
            .await
            .map_err(PveError::from)
    }

    /// Fetches the current guest configuration, validated against the full
    /// expected schema.
    pub async fn fetch_existing_config(&self, guest_id: u32) -> PveResult<ExistingGuestConfig> {
        let uri = self.endpoint.api_url(&format!(
            "nodes/{}/qemu/{}/config",
            self.endpoint.node(),
            guest_id
        ));
        let value = self
            .transport
            .get(&uri, self.headers(), RequestOptions::default())
            .await?;
        decode_data("fetching the existing guest config", value)
    }

    /// Applies a partial configuration update.
    ///
    /// The existing configuration is fetched fresh first (the cluster is the
    /// sole source of truth); inline fields are merged through
    /// [`InlineConfig`] so keys the update does not mention keep their
    /// current values.
    pub async fn update_guest_config(
        &self,
        guest_id: u32,
        update: &GuestConfigUpdate,
    ) -> PveResult<Value> {
        let existing = self.fetch_existing_config(guest_id).await?;
        let body = update_payload(&existing, update);
        debug!(guest_id, fields = body.as_object().map(Map::len), "updating guest config");

        let uri = self.endpoint.api_url(&format!(
            "nodes/{}/qemu/{}/config",
            self.endpoint.node(),
            guest_id
        ));
        self.transport
            .post(&uri, self.headers(), &body, RequestOptions::default())
            .await
            .map_err(PveError::from)
    }

    /// Fetches one status snapshot of an asynchronous task.
    pub async fn fetch_task_status(&self, handle: &TaskHandle) -> PveResult<TaskStatus> {
        let uri = self.endpoint.api_url(&format!(
            "nodes/{}/tasks/{}/status",
            self.endpoint.node(),
            handle.upid()
        ));
        let value = self
            .transport
            .get(&uri, self.headers(), RequestOptions::default())
            .await?;
        decode_data("fetching task status", value)
    }

    /// Opens the VNC websocket handshake for a guest console.
    ///
    /// Certificate verification is skipped for this call; console proxying
    /// typically targets the node certificate directly, which is self-signed
    /// on most clusters.
    pub async fn vnc_websocket(
        &self,
        guest_id: u32,
        vnc_port: u16,
        vnc_ticket: &str,
    ) -> PveResult<Value> {
        let uri = self.endpoint.api_url(&format!(
            "nodes/{}/qemu/{}/vncwebsocket?port={}&vncticket={}",
            self.endpoint.node(),
            guest_id,
            vnc_port,
            urlencoding::encode(vnc_ticket)
        ));
        self.transport
            .get(&uri, self.headers(), RequestOptions::insecure_tls())
            .await
            .map_err(PveError::from)
    }
}

#[async_trait::async_trait]
impl crate::provision::poller::TaskStatusSource for GuestLifecycle<'_> {
    async fn task_status(&self, handle: &TaskHandle) -> PveResult<TaskStatus> {
        self.fetch_task_status(handle).await
    }
}

fn decode_data<T: DeserializeOwned>(operation: &'static str, value: Value) -> PveResult<T> {
    let response: ResponseBase<T> = serde_json::from_value(value).map_err(|e| {
        error!(operation, diagnostic = %e, "pve response schema mismatch");
        PveError::Schema { operation }
    })?;
    Ok(response.data)
}

/// Converts a caller-facing Mbps rate limit into the MB/s value the API
/// expects, falling back to the 125 MB/s default.
fn network_rate_mbs(rate_limit_mbps: Option<f64>) -> f64 {
    rate_limit_mbps
        .map(|mbps| mbps / 8.0)
        .unwrap_or(DEFAULT_RATE_MBS)
}

/// Percent-encodes SSH public keys the way the `sshkeys` field requires:
/// a single key encoded as-is, several keys each encoded and newline-joined.
pub(crate) fn encode_ssh_keys(keys: &[String]) -> String {
    keys.iter()
        .map(|key| urlencoding::encode(key).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

fn ip_config_value(ipv4: Option<&IpAssignment>, ipv6: Option<&IpAssignment>) -> Option<String> {
    let mut config = InlineConfig::default();
    if let Some(assignment) = ipv4 {
        config.set("ip", &assignment.cidr);
        if let Some(gateway) = &assignment.gateway {
            config.set("gw", gateway);
        }
    }
    if let Some(assignment) = ipv6 {
        config.set("ip6", &assignment.cidr);
        if let Some(gateway) = &assignment.gateway {
            config.set("gw6", gateway);
        }
    }
    if config.is_empty() {
        None
    } else {
        Some(config.serialize())
    }
}

/// Full creation payload with the fixed defaults: one socket, host CPU
/// passthrough, start on boot, boot from the cloned disk, cloud-init as
/// root with the nocloud datasource.
fn creation_payload(spec: &GuestSpec) -> Value {
    let mut body = Map::new();
    body.insert("vmid".into(), json!(spec.id));
    body.insert("name".into(), json!(spec.name));
    body.insert("cores".into(), json!(spec.cores));
    body.insert("sockets".into(), json!(1));
    body.insert("cpu".into(), json!("host"));
    body.insert("memory".into(), json!(spec.memory_mb));
    body.insert("scsihw".into(), json!("virtio-scsi-pci"));
    body.insert(
        "scsi0".into(),
        json!(format!("{}:{}", spec.storage, spec.disk_gb)),
    );
    body.insert("ide2".into(), json!(format!("{}:cloudinit", spec.storage)));
    body.insert("boot".into(), json!("order=scsi0"));
    body.insert("onboot".into(), json!(1));
    body.insert(
        "net0".into(),
        json!(format!(
            "virtio,bridge={},rate={}",
            spec.bridge,
            network_rate_mbs(spec.rate_limit_mbps)
        )),
    );
    if let Some(ip_config) = ip_config_value(spec.ipv4.as_ref(), spec.ipv6.as_ref()) {
        body.insert("ipconfig0".into(), json!(ip_config));
    }
    body.insert("ciuser".into(), json!("root"));
    body.insert("citype".into(), json!("nocloud"));
    if !spec.nameservers.is_empty() {
        body.insert("nameserver".into(), json!(spec.nameservers.join(" ")));
    }
    if !spec.ssh_keys.is_empty() {
        body.insert("sshkeys".into(), json!(encode_ssh_keys(&spec.ssh_keys)));
    }
    Value::Object(body)
}

/// Builds the update payload from a partial update, merging inline fields
/// against the freshly fetched existing configuration. Keys the update does
/// not mention keep their current values.
fn update_payload(existing: &ExistingGuestConfig, update: &GuestConfigUpdate) -> Value {
    let mut body = Map::new();
    if let Some(name) = &update.name {
        body.insert("name".into(), json!(name));
    }
    if let Some(cores) = update.cores {
        body.insert("cores".into(), json!(cores));
    }
    if let Some(memory_mb) = update.memory_mb {
        body.insert("memory".into(), json!(memory_mb));
    }
    if let Some(nameservers) = &update.nameservers {
        body.insert("nameserver".into(), json!(nameservers.join(" ")));
    }
    if let Some(keys) = &update.ssh_keys {
        body.insert("sshkeys".into(), json!(encode_ssh_keys(keys)));
    }
    if let Some(network) = &update.network {
        let mut config = InlineConfig::parse(&existing.net);
        if let Some(bridge) = &network.bridge {
            config.set("bridge", bridge);
        }
        if let Some(mbps) = network.rate_limit_mbps {
            config.set("rate", (mbps / 8.0).to_string());
        }
        body.insert("net0".into(), json!(config.serialize()));
    }
    if let Some(ip) = &update.ip {
        let mut config = InlineConfig::parse(&existing.ip_config);
        if let Some(assignment) = &ip.ipv4 {
            config.set("ip", &assignment.cidr);
            if let Some(gateway) = &assignment.gateway {
                config.set("gw", gateway);
            }
        }
        if let Some(assignment) = &ip.ipv6 {
            config.set("ip6", &assignment.cidr);
            if let Some(gateway) = &assignment.gateway {
                config.set("gw6", gateway);
            }
        }
        body.insert("ipconfig0".into(), json!(config.serialize()));
    }
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::error::TransportError;
    use crate::core::domain::model::guest::tests::existing_config_json;
    use crate::core::domain::model::{IpAssignment, NetworkUpdate, PveCredential, TaskState};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec() -> GuestSpec {
        GuestSpec {
            id: 100,
            name: "web-01".to_string(),
            storage: "local-lvm".to_string(),
            cores: 2,
            memory_mb: 2048,
            disk_gb: 32,
            bridge: "vmbr0".to_string(),
            ipv4: Some(IpAssignment {
                cidr: "10.0.0.20/24".to_string(),
                gateway: Some("10.0.0.1".to_string()),
            }),
            ipv6: None,
            nameservers: vec!["10.0.0.53".to_string(), "10.0.0.54".to_string()],
            ssh_keys: vec!["ssh-ed25519 AAAA ops".to_string()],
            rate_limit_mbps: None,
        }
    }

    fn endpoint(server: &MockServer) -> PveEndpoint {
        PveEndpoint::new(
            server.uri().parse().unwrap(),
            "pve1",
            PveCredential::api_token("automation@pve!inv", "s3cret"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn clone_template_returns_the_upid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve1/qemu/9000/clone"))
            .and(header(
                "Authorization",
                "PVEAPIToken=automation@pve!inv=s3cret",
            ))
            .and(body_partial_json(serde_json::json!({
                "newid": 100,
                "node": "pve1",
                "vmid": 9000,
                "full": true,
                "name": "web-01",
                "storage": "local-lvm",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": "UPID:pve1:0001ABCD:0012345:65F00001:qmclone:100:root@pam:"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = Transport::new().unwrap();
        let endpoint = endpoint(&server);
        let lifecycle = GuestLifecycle::new(&transport, &endpoint);

        let handle = lifecycle.clone_template(9000, &spec()).await.unwrap();
        assert_eq!(
            handle.upid(),
            "UPID:pve1:0001ABCD:0012345:65F00001:qmclone:100:root@pam:"
        );
    }

    #[tokio::test]
    async fn clone_template_without_upid_is_a_schema_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": 42})),
            )
            .mount(&server)
            .await;

        let transport = Transport::new().unwrap();
        let endpoint = endpoint(&server);
        let lifecycle = GuestLifecycle::new(&transport, &endpoint);

        let result = lifecycle.clone_template(9000, &spec()).await;
        assert!(matches!(result, Err(PveError::Schema { .. })));
    }

    #[tokio::test]
    async fn create_guest_applies_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve1/qemu"))
            .and(body_partial_json(serde_json::json!({
                "vmid": 100,
                "sockets": 1,
                "cpu": "host",
                "onboot": 1,
                "boot": "order=scsi0",
                "ciuser": "root",
                "citype": "nocloud",
                "net0": "virtio,bridge=vmbr0,rate=125",
                "ipconfig0": "ip=10.0.0.20/24,gw=10.0.0.1",
                "scsi0": "local-lvm:32",
                "ide2": "local-lvm:cloudinit",
                "nameserver": "10.0.0.53 10.0.0.54",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = Transport::new().unwrap();
        let endpoint = endpoint(&server);
        let lifecycle = GuestLifecycle::new(&transport, &endpoint);

        lifecycle.create_guest(&spec()).await.unwrap();
    }

    #[test]
    fn caller_rate_limit_is_converted_from_mbps() {
        let mut spec = spec();
        spec.rate_limit_mbps = Some(100.0);
        let body = creation_payload(&spec);
        assert_eq!(body["net0"], "virtio,bridge=vmbr0,rate=12.5");
    }

    #[test]
    fn ssh_keys_are_percent_encoded() {
        let one = vec!["ssh-ed25519 AAAA ops".to_string()];
        assert_eq!(encode_ssh_keys(&one), "ssh-ed25519%20AAAA%20ops");

        let two = vec![
            "ssh-ed25519 AAAA ops".to_string(),
            "ssh-rsa BBBB ci".to_string(),
        ];
        assert_eq!(
            encode_ssh_keys(&two),
            "ssh-ed25519%20AAAA%20ops\nssh-rsa%20BBBB%20ci"
        );
    }

    #[tokio::test]
    async fn fetch_existing_config_rejects_partial_responses() {
        let server = MockServer::start().await;
        let mut body = existing_config_json();
        body.as_object_mut().unwrap().remove("ipconfig0");
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes/pve1/qemu/100/config"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": body})),
            )
            .mount(&server)
            .await;

        let transport = Transport::new().unwrap();
        let endpoint = endpoint(&server);
        let lifecycle = GuestLifecycle::new(&transport, &endpoint);

        let result = lifecycle.fetch_existing_config(100).await;
        assert!(matches!(result, Err(PveError::Schema { .. })));
    }

    #[tokio::test]
    async fn update_merges_inline_fields_without_dropping_siblings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes/pve1/qemu/100/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": existing_config_json()
            })))
            .expect(1)
            .mount(&server)
            .await;
        // firewall=1 and rate=125 must survive the bridge swap.
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve1/qemu/100/config"))
            .and(body_partial_json(serde_json::json!({
                "net0": "virtio,bridge=vmbr1,firewall=1,rate=125",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": null})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = Transport::new().unwrap();
        let endpoint = endpoint(&server);
        let lifecycle = GuestLifecycle::new(&transport, &endpoint);

        let update = GuestConfigUpdate {
            network: Some(NetworkUpdate {
                bridge: Some("vmbr1".to_string()),
                rate_limit_mbps: None,
            }),
            ..Default::default()
        };
        lifecycle.update_guest_config(100, &update).await.unwrap();
    }

    #[test]
    fn update_payload_only_contains_requested_fields() {
        let existing: ExistingGuestConfig =
            serde_json::from_value(existing_config_json()).unwrap();
        let update = GuestConfigUpdate {
            memory_mb: Some(4096),
            ..Default::default()
        };
        let body = update_payload(&existing, &update);
        let fields = body.as_object().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["memory"], 4096);
    }

    #[tokio::test]
    async fn fetch_task_status_decodes_the_snapshot() {
        let server = MockServer::start().await;
        let upid = "UPID:pve1:0001ABCD:0012345:65F00001:qmclone:100:root@pam:";
        Mock::given(method("GET"))
            .and(path(format!("/api2/json/nodes/pve1/tasks/{upid}/status")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "id": "100",
                    "node": "pve1",
                    "pid": 4321,
                    "starttime": 1_700_000_000u64,
                    "status": "stopped",
                    "exitstatus": "OK"
                }
            })))
            .mount(&server)
            .await;

        let transport = Transport::new().unwrap();
        let endpoint = endpoint(&server);
        let lifecycle = GuestLifecycle::new(&transport, &endpoint);

        let status = lifecycle
            .fetch_task_status(&TaskHandle::new(upid))
            .await
            .unwrap();
        assert_eq!(status.status, TaskState::Stopped);
        assert!(status.is_success());
    }

    #[tokio::test]
    async fn transport_errors_pass_through_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let transport = Transport::new().unwrap();
        let endpoint = endpoint(&server);
        let lifecycle = GuestLifecycle::new(&transport, &endpoint);

        let result = lifecycle.fetch_existing_config(100).await;
        assert!(matches!(
            result,
            Err(PveError::Transport(TransportError::Forbidden))
        ));
    }
}
