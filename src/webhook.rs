//! Thin inbound adapter between inventory webhook events and the
//! orchestrator.
//!
//! The HTTP routing and request authentication in front of this module
//! belong to the hosting service; this adapter only validates the event
//! envelope, decodes the payload into typed values and forwards them.

use crate::core::domain::error::OrchestrationError;
use crate::core::domain::model::{GuestSpec, PveEndpoint};
use crate::provision::orchestrator::Provisioner;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors specific to the webhook boundary.
#[derive(Error, Debug)]
pub enum WebhookError {
    /// The `event` field is missing or not a string.
    #[error("event field is missing or not a string")]
    EventNotString,

    /// The `objectType` field is missing or not a string.
    #[error("objectType field is missing or not a string")]
    ObjectTypeNotString,

    /// The payload did not decode into a guest creation request.
    #[error("payload could not be decoded: {0}")]
    MalformedPayload(String),

    /// The provisioning run itself failed.
    #[error(transparent)]
    Provision(#[from] OrchestrationError),
}

/// Decoded payload of a guest creation event: the template to clone and the
/// desired guest shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GuestCreationPayload {
    pub template_id: u32,
    #[serde(flatten)]
    pub spec: GuestSpec,
}

/// Dispatches one inventory event.
///
/// Returns `Ok(None)` for event types this service does not handle; the
/// webhook sender fans out every inventory mutation and most are not ours.
pub async fn handle_inventory_event(
    provisioner: &Provisioner,
    endpoint: &PveEndpoint,
    event: &Value,
) -> Result<Option<()>, WebhookError> {
    let kind = event
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            warn!(event = %event, "inventory event has no usable event field");
            WebhookError::EventNotString
        })?;
    let object_type = event
        .get("objectType")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            warn!(event = kind, "inventory event has no usable objectType field");
            WebhookError::ObjectTypeNotString
        })?;

    match kind.to_lowercase().as_str() {
        "created" => {
            let payload = event.get("payload").unwrap_or(&Value::Null);
            handle_guest_creation_event(provisioner, endpoint, payload)
                .await
                .map(Some)
        }
        other => {
            debug!(event = other, object_type, "ignoring unhandled inventory event");
            Ok(None)
        }
    }
}

/// Entry point for `created` events: decodes the payload and runs one
/// provisioning sequence.
pub async fn handle_guest_creation_event(
    provisioner: &Provisioner,
    endpoint: &PveEndpoint,
    payload: &Value,
) -> Result<(), WebhookError> {
    let payload: GuestCreationPayload =
        serde_json::from_value(payload.clone()).map_err(|e| {
            warn!(diagnostic = %e, "guest creation payload did not decode");
            WebhookError::MalformedPayload(e.to_string())
        })?;

    provisioner
        .provision(endpoint, payload.template_id, &payload.spec)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::model::PveCredential;
    use serde_json::json;

    fn fixtures() -> (Provisioner, PveEndpoint) {
        let provisioner = Provisioner::new().unwrap();
        let endpoint = PveEndpoint::new(
            "https://pve.example.com:8006".parse().unwrap(),
            "pve1",
            PveCredential::ticket("PVE:user@pam:AAAA::sig"),
        )
        .unwrap();
        (provisioner, endpoint)
    }

    #[tokio::test]
    async fn non_string_event_is_rejected() {
        let (provisioner, endpoint) = fixtures();
        let event = json!({"event": 7, "objectType": "guest", "payload": {}});
        let result = handle_inventory_event(&provisioner, &endpoint, &event).await;
        assert!(matches!(result, Err(WebhookError::EventNotString)));
    }

    #[tokio::test]
    async fn non_string_object_type_is_rejected() {
        let (provisioner, endpoint) = fixtures();
        let event = json!({"event": "created", "payload": {}});
        let result = handle_inventory_event(&provisioner, &endpoint, &event).await;
        assert!(matches!(result, Err(WebhookError::ObjectTypeNotString)));
    }

    #[tokio::test]
    async fn unknown_event_types_are_ignored() {
        let (provisioner, endpoint) = fixtures();
        let event = json!({"event": "deleted", "objectType": "guest", "payload": {}});
        let result = handle_inventory_event(&provisioner, &endpoint, &event)
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_before_any_network_call() {
        let (provisioner, endpoint) = fixtures();
        let event = json!({
            "event": "Created",
            "objectType": "guest",
            "payload": {"template_id": "not-a-number"}
        });
        let result = handle_inventory_event(&provisioner, &endpoint, &event).await;
        assert!(matches!(result, Err(WebhookError::MalformedPayload(_))));
    }

    #[test]
    fn creation_payload_decodes_flattened_spec() {
        let payload: GuestCreationPayload = serde_json::from_value(json!({
            "template_id": 9000,
            "id": 100,
            "name": "web-01",
            "storage": "local-lvm",
            "cores": 2,
            "memory_mb": 2048,
            "disk_gb": 32,
            "bridge": "vmbr0",
            "nameservers": ["10.0.0.53"],
        }))
        .unwrap();
        assert_eq!(payload.template_id, 9000);
        assert_eq!(payload.spec.id, 100);
        assert_eq!(payload.spec.nameservers, vec!["10.0.0.53"]);
    }
}
