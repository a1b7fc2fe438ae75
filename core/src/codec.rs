//! JSON wire shapes exchanged with the bus and the store.
//!
//! Three payloads cross the process boundary:
//!
//! - [`Aggregate`]: inbound requests, terminal notifications, and the stored record
//! - [`ProvisionEvent`]: outbound instruction to provision one item
//! - [`ItemLifecycleEvent`]: inbound outcome of one provisioning attempt
//!
//! Every shape implements [`JsonCodec`], which supplies the byte-level
//! encode/decode used by the handlers and the store.

use crate::address::AddressPlan;
use crate::aggregate::{Aggregate, Item, Resolution};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Errors produced while encoding or decoding a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value could not be turned into JSON.
    #[error("Failed to encode {kind}: {reason}")]
    Encode {
        /// Payload kind
        kind: &'static str,
        /// Underlying serializer error
        reason: String,
    },

    /// The bytes are not a valid payload of the expected kind.
    #[error("Failed to decode {kind}: {reason}")]
    Decode {
        /// Payload kind
        kind: &'static str,
        /// Underlying deserializer error
        reason: String,
    },
}

/// A payload with a JSON wire form.
///
/// The default methods cover every implementor; only [`JsonCodec::KIND`]
/// needs to be supplied.
pub trait JsonCodec: Serialize + DeserializeOwned {
    /// Short name used in error messages and logs.
    const KIND: &'static str;

    /// Encode to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    fn to_json_bytes(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::Encode {
            kind: Self::KIND,
            reason: e.to_string(),
        })
    }

    /// Decode from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the bytes are not valid JSON for
    /// this payload.
    fn from_json_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            kind: Self::KIND,
            reason: e.to_string(),
        })
    }
}

impl JsonCodec for Aggregate {
    const KIND: &'static str = "aggregate";
}

/// Instruction to provision a single item.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionEvent {
    /// Provision subject, e.g. `network.create`
    #[serde(rename = "type")]
    pub kind: String,
    /// Service id of the owning aggregate
    pub service: String,
    /// Network type (the item's router type)
    pub network_type: String,
    /// Item name
    pub network_name: String,
    /// Planned netmask
    pub network_netmask: String,
    /// Planned first usable address
    pub network_start_address: String,
    /// Planned last usable address
    pub network_end_address: String,
    /// Planned gateway
    pub network_gateway: String,
    /// DNS servers
    #[serde(deserialize_with = "crate::aggregate::nullable")]
    pub network_dns: Vec<String>,
    /// Router name
    pub router_name: String,
    /// Router type
    #[serde(skip_serializing_if = "String::is_empty")]
    pub router_type: String,
    /// Router IP address
    pub router_ip: String,
    /// Client name
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_name: String,
    /// Datacenter type
    #[serde(skip_serializing_if = "String::is_empty")]
    pub datacenter_type: String,
    /// Datacenter name
    #[serde(skip_serializing_if = "String::is_empty")]
    pub datacenter_name: String,
    /// Datacenter username
    #[serde(skip_serializing_if = "String::is_empty")]
    pub datacenter_username: String,
    /// Datacenter password
    #[serde(skip_serializing_if = "String::is_empty")]
    pub datacenter_password: String,
    /// Datacenter region
    #[serde(skip_serializing_if = "String::is_empty")]
    pub datacenter_region: String,
    /// vCloud endpoint
    pub vcloud_url: String,
}

impl ProvisionEvent {
    /// Build the provision event for `item`, planning its addresses.
    ///
    /// A malformed range does not fail: the addressing fields are left empty.
    #[must_use]
    pub fn from_item(subject: &str, service: &str, item: &Item) -> Self {
        let plan = AddressPlan::for_range(&item.range);

        Self {
            kind: subject.to_string(),
            service: service.to_string(),
            network_type: item.router_type.clone(),
            network_name: item.name.clone(),
            network_netmask: plan.netmask,
            network_start_address: plan.start_address,
            network_end_address: plan.end_address,
            network_gateway: plan.gateway,
            network_dns: item.dns.clone(),
            router_name: item.router_name.clone(),
            router_type: item.router_type.clone(),
            router_ip: item.router_ip.clone(),
            client_name: item.client_name.clone(),
            datacenter_type: item.datacenter_type.clone(),
            datacenter_name: item.datacenter_name.clone(),
            datacenter_username: item.datacenter_username.clone(),
            datacenter_password: item.datacenter_password.clone(),
            datacenter_region: item.datacenter_region.clone(),
            vcloud_url: item.vcloud_url.clone(),
        }
    }
}

impl JsonCodec for ProvisionEvent {
    const KIND: &'static str = "provision event";
}

/// Error block of an item lifecycle event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPayload {
    /// Provisioner error code; accepts a JSON string or number
    #[serde(deserialize_with = "string_or_number")]
    pub code: String,
    /// Provisioner error message
    #[serde(deserialize_with = "crate::aggregate::nullable")]
    pub message: String,
}

/// Outcome of one provisioning attempt, received on `<item>.<op>.done|error`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemLifecycleEvent {
    /// Subject the provisioner answered on
    #[serde(rename = "type", deserialize_with = "crate::aggregate::nullable")]
    pub kind: String,
    /// Service id of the owning aggregate
    #[serde(deserialize_with = "crate::aggregate::nullable")]
    pub service: String,
    /// Provisioner-side identifier of the network
    #[serde(deserialize_with = "crate::aggregate::nullable")]
    pub network_id: String,
    /// Item name
    #[serde(deserialize_with = "crate::aggregate::nullable")]
    pub network_name: String,
    /// Provisioner-side identifier of the router
    #[serde(deserialize_with = "crate::aggregate::nullable")]
    pub router_id: String,
    /// Failure details (empty on success)
    #[serde(deserialize_with = "crate::aggregate::nullable")]
    pub error: ErrorPayload,
}

impl ItemLifecycleEvent {
    /// Translate into an item resolution.
    ///
    /// The subject, not the payload, decides success: `failed` is true for
    /// events received on an error subject.
    #[must_use]
    pub fn resolution(&self, failed: bool) -> Resolution {
        if failed {
            Resolution::Errored {
                code: self.error.code.clone(),
                message: self.error.message.clone(),
            }
        } else {
            Resolution::Completed
        }
    }
}

impl JsonCodec for ItemLifecycleEvent {
    const KIND: &'static str = "item lifecycle event";
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct CodeVisitor;

    impl de::Visitor<'_> for CodeVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or a number")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(CodeVisitor)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregateStatus, ItemStatus};

    fn network(name: &str, range: &str) -> Item {
        Item {
            range: range.to_string(),
            router_type: "vcloud".to_string(),
            router_name: "r1".to_string(),
            router_ip: "8.8.8.8".to_string(),
            client_name: "acme".to_string(),
            dns: vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()],
            datacenter_username: "admin".to_string(),
            vcloud_url: "https://vcloud".to_string(),
            ..Item::new(name, "dc-1")
        }
    }

    #[test]
    fn provision_event_maps_item_fields() {
        let event = ProvisionEvent::from_item("network.create", "svc-1", &network("web", "10.64.0.0/24"));

        assert_eq!(event.kind, "network.create");
        assert_eq!(event.service, "svc-1");
        assert_eq!(event.network_type, "vcloud");
        assert_eq!(event.router_type, "vcloud");
        assert_eq!(event.network_name, "web");
        assert_eq!(event.network_netmask, "255.255.255.0");
        assert_eq!(event.network_start_address, "10.64.0.5");
        assert_eq!(event.network_end_address, "10.64.0.250");
        assert_eq!(event.network_gateway, "10.64.0.1");
        assert_eq!(event.network_dns.len(), 2);
        assert_eq!(event.router_ip, "8.8.8.8");
        assert_eq!(event.datacenter_name, "dc-1");
        assert_eq!(event.datacenter_username, "admin");
    }

    #[test]
    fn provision_event_omits_empty_optional_fields() {
        let mut item = network("web", "10.64.0.0/24");
        item.client_name.clear();
        item.datacenter_username.clear();

        let json = serde_json::to_value(ProvisionEvent::from_item("network.create", "svc", &item)).unwrap();

        assert!(json.get("client_name").is_none());
        assert!(json.get("datacenter_username").is_none());
        assert!(json.get("datacenter_password").is_none());
        assert_eq!(json["router_name"], "r1");
        assert_eq!(json["vcloud_url"], "https://vcloud");
    }

    #[test]
    fn malformed_range_leaves_addresses_empty() {
        let event = ProvisionEvent::from_item("network.create", "svc", &network("web", "garbage"));

        assert!(event.network_netmask.is_empty());
        assert!(event.network_gateway.is_empty());
        assert_eq!(event.network_name, "web");
    }

    #[test]
    fn lifecycle_error_code_accepts_numbers_and_strings() {
        let numeric: ItemLifecycleEvent = serde_json::from_str(
            r#"{"type":"network.create.error","service":"svc","network_name":"web","error":{"code":500,"message":"boom"}}"#,
        )
        .unwrap();
        let textual: ItemLifecycleEvent =
            serde_json::from_str(r#"{"service":"svc","error":{"code":"E42","message":"x"}}"#).unwrap();
        let missing: ItemLifecycleEvent = serde_json::from_str(r#"{"service":"svc","network_name":"a"}"#).unwrap();

        assert_eq!(numeric.error.code, "500");
        assert_eq!(textual.error.code, "E42");
        assert_eq!(missing.error, ErrorPayload::default());
    }

    #[test]
    fn lifecycle_nulls_read_as_empty() {
        let event: ItemLifecycleEvent = serde_json::from_str(
            r#"{"type":"network.create.done","service":"svc","network_name":"web","network_id":null,"error":null}"#,
        )
        .unwrap();
        let partial: ItemLifecycleEvent =
            serde_json::from_str(r#"{"service":"svc","error":{"code":null,"message":null}}"#).unwrap();

        assert_eq!(event.network_name, "web");
        assert!(event.network_id.is_empty());
        assert_eq!(event.error, ErrorPayload::default());
        assert_eq!(partial.error, ErrorPayload::default());
    }

    #[test]
    fn resolution_follows_the_subject() {
        let event = ItemLifecycleEvent {
            error: ErrorPayload {
                code: "500".to_string(),
                message: "boom".to_string(),
            },
            ..ItemLifecycleEvent::default()
        };

        assert_eq!(event.resolution(false), Resolution::Completed);
        assert_eq!(
            event.resolution(true),
            Resolution::Errored {
                code: "500".to_string(),
                message: "boom".to_string(),
            }
        );
    }

    #[test]
    fn aggregate_survives_decode_encode_decode() {
        let raw = br#"{
            "service": "svc-1",
            "status": "processing",
            "error_code": "",
            "error_message": "",
            "sequential_processing": true,
            "networks": [
                {"name": "b", "datacenter_name": "dc", "range": "10.1.0.0/24", "status": "processed"},
                {"name": "a", "datacenter_name": "dc", "range": "10.2.0.0/24", "status": "", "vlan": 7}
            ]
        }"#;

        let first = Aggregate::from_json_bytes(raw).unwrap();
        let second = Aggregate::from_json_bytes(&first.to_json_bytes().unwrap()).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.status, AggregateStatus::Processing);
        assert_eq!(second.items[0].name, "b");
        assert_eq!(second.items[0].status, ItemStatus::Processing);
        assert_eq!(second.items[1].name, "a");
        assert_eq!(second.items[1].attributes["vlan"], 7);
    }

    #[test]
    fn undecodable_bytes_are_a_decode_error() {
        let error = Aggregate::from_json_bytes(b"not json").unwrap_err();

        assert!(matches!(error, CodecError::Decode { kind: "aggregate", .. }));
    }
}
