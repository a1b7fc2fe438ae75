//! Aggregate and item data model.
//!
//! An [`Aggregate`] is one create/delete operation over an ordered list of
//! [`Item`]s (networks). Both records are persisted as JSON and travel on the
//! bus, so every field keeps the wire name used by the provisioning services.
//!
//! # Status machine
//!
//! ```text
//! Item:       pending ──schedule──► processing ──done──►  completed
//!                                              └─error──► errored
//!
//! Aggregate:  pending ──► processing ──► completed   (every item completed)
//!                                   └──► error       (any item errored, or validation)
//! ```
//!
//! Item transitions are monotonic: a terminal item never changes status again.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message stored on an aggregate when at least one item failed.
pub const PARTIAL_FAILURE_MESSAGE: &str = "Some networks could not been successfully processed";

/// Processing status of a single item.
///
/// Wire values: `""` (pending), `"processing"`, `"completed"`, `"errored"`.
/// The legacy value `"processed"` reads as [`ItemStatus::Processing`]; any other
/// unknown value reads as pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum ItemStatus {
    /// Not yet scheduled
    #[default]
    Pending,
    /// Provision event published, waiting for the outcome
    Processing,
    /// Provisioned successfully (terminal)
    Completed,
    /// Provisioning failed (terminal)
    Errored,
}

impl ItemStatus {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }

    /// Whether the status is `completed` or `errored`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

impl From<String> for ItemStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "processing" | "processed" => Self::Processing,
            "completed" => Self::Completed,
            "errored" => Self::Errored,
            _ => Self::Pending,
        }
    }
}

impl From<Option<String>> for ItemStatus {
    fn from(value: Option<String>) -> Self {
        value.map(Self::from).unwrap_or_default()
    }
}

impl From<ItemStatus> for String {
    fn from(status: ItemStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Status of a whole aggregate.
///
/// Wire values: `""` (pending, `"pending"` is also accepted), `"processing"`,
/// `"completed"`, `"error"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum AggregateStatus {
    /// Received, nothing scheduled yet
    #[default]
    Pending,
    /// At least one item has been scheduled
    Processing,
    /// Every item completed (terminal)
    Completed,
    /// Validation failed or some item errored (terminal)
    Error,
}

impl AggregateStatus {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Whether the status is `completed` or `error`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl From<String> for AggregateStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "error" => Self::Error,
            _ => Self::Pending,
        }
    }
}

impl From<Option<String>> for AggregateStatus {
    fn from(value: Option<String>) -> Self {
        value.map(Self::from).unwrap_or_default()
    }
}

impl From<AggregateStatus> for String {
    fn from(status: AggregateStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Aggregate-level error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `0001`: an item failed validation when the request arrived
    Validation,
    /// `0002`: every item is terminal and at least one errored
    PartialFailure,
}

impl ErrorCode {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "0001",
            Self::PartialFailure => "0002",
        }
    }

    /// Parse a wire code; unknown codes yield `None`.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "0001" => Some(Self::Validation),
            "0002" => Some(Self::PartialFailure),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Option<ErrorCode>` as a plain string, `""` meaning no error.
mod error_code_wire {
    use super::ErrorCode;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)] // serde's `with` hands us `&Option<T>`
    pub fn serialize<S: Serializer>(code: &Option<ErrorCode>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(code.map_or("", ErrorCode::as_str))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ErrorCode>, D::Error> {
        let code = Option::<String>::deserialize(deserializer)?;
        Ok(code.as_deref().and_then(ErrorCode::parse))
    }
}

/// Treat an explicit JSON `null` like an absent field.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Reasons an item is rejected when the request arrives.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// The item has no name
    #[error("Network name can not be empty")]
    MissingName,

    /// The item names no datacenter
    #[error("Specifying a datacenter is necessary when creating a network")]
    MissingDatacenter,
}

/// How a provisioning attempt for one item ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The provisioner reported success
    Completed,
    /// The provisioner reported failure
    Errored {
        /// Provisioner error code
        code: String,
        /// Provisioner error message
        message: String,
    },
}

/// One network to create or delete.
///
/// Besides the fields the coordinator reads (`name`, `datacenter_name`,
/// `range`, `status`), everything is pass-through payload for the
/// provisioner. Request fields this type does not know are kept in
/// [`Item::attributes`] and written back unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    /// Network type
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub kind: String,
    /// Network name, unique within the aggregate
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    /// CIDR block, e.g. `10.64.0.0/24`
    #[serde(deserialize_with = "nullable")]
    pub range: String,
    /// Subnet
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub subnet: String,
    /// Netmask
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub netmask: String,
    /// First usable address
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub start_address: String,
    /// Last usable address
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub end_address: String,
    /// Gateway
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub gateway: String,
    /// DNS servers
    #[serde(deserialize_with = "nullable")]
    pub dns: Vec<String>,
    /// Router identifier
    #[serde(deserialize_with = "nullable")]
    pub router: String,
    /// Router type (also used as the network type of provision events)
    #[serde(deserialize_with = "nullable")]
    pub router_type: String,
    /// Router name
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub router_name: String,
    /// Router IP address
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub router_ip: String,
    /// Client name
    #[serde(deserialize_with = "nullable")]
    pub client_name: String,
    /// Datacenter type
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub datacenter_type: String,
    /// Datacenter name (required)
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub datacenter_name: String,
    /// Datacenter username
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub datacenter_username: String,
    /// Datacenter password
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub datacenter_password: String,
    /// Datacenter region
    #[serde(skip_serializing_if = "String::is_empty", deserialize_with = "nullable")]
    pub datacenter_region: String,
    /// vCloud endpoint
    #[serde(deserialize_with = "nullable")]
    pub vcloud_url: String,
    /// Processing status
    pub status: ItemStatus,
    /// Provisioner error code (only when errored)
    #[serde(deserialize_with = "nullable")]
    pub error_code: String,
    /// Provisioner error message (only when errored)
    #[serde(deserialize_with = "nullable")]
    pub error_message: String,
    /// Request fields not modelled above
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Item {
    /// Create a pending item with a name and datacenter.
    #[must_use]
    pub fn new(name: impl Into<String>, datacenter_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datacenter_name: datacenter_name.into(),
            ..Self::default()
        }
    }

    /// Check the fields every item must carry.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingName`] or
    /// [`ValidationError::MissingDatacenter`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.datacenter_name.is_empty() {
            return Err(ValidationError::MissingDatacenter);
        }
        Ok(())
    }

    /// Whether the item may be scheduled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }

    /// Whether the item is in flight.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.status == ItemStatus::Processing
    }

    /// Whether the item is `completed` or `errored`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the item as in flight. Terminal items are left untouched.
    pub fn start(&mut self) {
        if !self.is_terminal() {
            self.status = ItemStatus::Processing;
        }
    }

    /// Record the outcome of provisioning.
    ///
    /// Returns `false` (and changes nothing) when the item was already
    /// terminal, e.g. on a redelivered event.
    pub fn resolve(&mut self, resolution: Resolution) -> bool {
        if self.is_terminal() {
            return false;
        }
        match resolution {
            Resolution::Completed => {
                self.status = ItemStatus::Completed;
                self.error_code.clear();
                self.error_message.clear();
            },
            Resolution::Errored { code, message } => {
                self.status = ItemStatus::Errored;
                self.error_code = code;
                self.error_message = message;
            },
        }
        true
    }
}

/// One create/delete operation over an ordered list of items.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Aggregate {
    /// Logical service identifier (the store key is derived from it)
    #[serde(rename = "service", deserialize_with = "nullable")]
    pub service_id: String,
    /// Aggregate status
    pub status: AggregateStatus,
    /// Aggregate error code (only with [`AggregateStatus::Error`])
    #[serde(with = "error_code_wire")]
    pub error_code: Option<ErrorCode>,
    /// Aggregate error message (only with [`AggregateStatus::Error`])
    #[serde(deserialize_with = "nullable")]
    pub error_message: String,
    /// Items, in processing order
    #[serde(rename = "networks", deserialize_with = "nullable")]
    pub items: Vec<Item>,
    /// When true, at most one item is in flight at a time
    #[serde(deserialize_with = "nullable")]
    pub sequential_processing: bool,
}

impl Aggregate {
    /// Create a pending aggregate.
    #[must_use]
    pub fn new(service_id: impl Into<String>, items: Vec<Item>) -> Self {
        Self {
            service_id: service_id.into(),
            items,
            ..Self::default()
        }
    }

    /// Builder-style switch to sequential processing.
    #[must_use]
    pub fn sequential(mut self) -> Self {
        self.sequential_processing = true;
        self
    }

    /// Validate every item, returning the first failure in item order.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] of the first invalid item.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.items.iter().try_for_each(Item::validate)
    }

    /// Find an item by name.
    #[must_use]
    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.name == name)
    }

    /// Find an item by name, mutably.
    pub fn item_mut(&mut self, name: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.name == name)
    }

    /// Whether the aggregate reached `completed` or `error`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether any item errored.
    #[must_use]
    pub fn has_errored_items(&self) -> bool {
        self.items.iter().any(|item| item.status == ItemStatus::Errored)
    }

    /// Move to `processing`; error fields only belong to `error`.
    pub fn start(&mut self) {
        self.status = AggregateStatus::Processing;
        self.error_code = None;
        self.error_message.clear();
    }

    /// Move to `completed` and clear error fields.
    pub fn complete(&mut self) {
        self.status = AggregateStatus::Completed;
        self.error_code = None;
        self.error_message.clear();
    }

    /// Move to `error` with a code and message.
    pub fn fail(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.status = AggregateStatus::Error;
        self.error_code = Some(code);
        self.error_message = message.into();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_match_the_wire_contract() {
        assert_eq!(
            Item::new("", "dc").validate().unwrap_err().to_string(),
            "Network name can not be empty"
        );
        assert_eq!(
            Item::new("web", "").validate().unwrap_err().to_string(),
            "Specifying a datacenter is necessary when creating a network"
        );
        assert!(Item::new("web", "dc").validate().is_ok());
    }

    #[test]
    fn aggregate_validation_reports_first_invalid_item() {
        let aggregate = Aggregate::new(
            "svc",
            vec![Item::new("a", "dc"), Item::new("b", ""), Item::new("", "dc")],
        );

        assert_eq!(aggregate.validate(), Err(ValidationError::MissingDatacenter));
    }

    #[test]
    fn resolve_never_leaves_a_terminal_state() {
        let mut item = Item::new("a", "dc");
        item.start();
        assert!(item.resolve(Resolution::Errored {
            code: "500".to_string(),
            message: "boom".to_string(),
        }));

        assert!(!item.resolve(Resolution::Completed));
        item.start();

        assert_eq!(item.status, ItemStatus::Errored);
        assert_eq!(item.error_code, "500");
        assert_eq!(item.error_message, "boom");
    }

    #[test]
    fn status_wire_values() {
        assert_eq!(ItemStatus::from(String::new()), ItemStatus::Pending);
        assert_eq!(ItemStatus::from("processed".to_string()), ItemStatus::Processing);
        assert_eq!(ItemStatus::from("errored".to_string()), ItemStatus::Errored);
        assert_eq!(String::from(ItemStatus::Pending), "");

        assert_eq!(AggregateStatus::from("pending".to_string()), AggregateStatus::Pending);
        assert_eq!(AggregateStatus::from("error".to_string()), AggregateStatus::Error);
        assert_eq!(String::from(AggregateStatus::Completed), "completed");
    }

    #[test]
    fn aggregate_json_uses_wire_names() {
        let mut aggregate = Aggregate::new("svc", vec![Item::new("a", "dc")]).sequential();
        aggregate.fail(ErrorCode::Validation, "bad");

        let json = serde_json::to_value(&aggregate).unwrap();

        assert_eq!(json["service"], "svc");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_code"], "0001");
        assert_eq!(json["sequential_processing"], true);
        assert_eq!(json["networks"][0]["name"], "a");
        assert_eq!(json["networks"][0]["status"], "");
        assert!(json["networks"][0].get("netmask").is_none());
    }

    #[test]
    fn unknown_item_fields_pass_through() {
        let json = r#"{"name":"a","datacenter_name":"dc","client_id":"c-1","vlan":42}"#;

        let item: Item = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&item).unwrap();

        assert_eq!(item.attributes["client_id"], "c-1");
        assert_eq!(back["vlan"], 42);
    }

    #[test]
    fn null_lists_read_as_empty() {
        let aggregate: Aggregate =
            serde_json::from_str(r#"{"service":"svc","networks":[{"name":"a","dns":null}]}"#).unwrap();
        let empty: Aggregate = serde_json::from_str(r#"{"service":"svc","networks":null}"#).unwrap();

        assert!(aggregate.items[0].dns.is_empty());
        assert!(empty.items.is_empty());
    }

    #[test]
    fn null_scalars_read_as_defaults() {
        let json = r#"{"service":"svc","status":null,"error_code":null,"error_message":null,
            "sequential_processing":null,
            "networks":[{"name":"a","datacenter_name":"dc","status":null,"router":null,"vcloud_url":null}]}"#;

        let aggregate: Aggregate = serde_json::from_str(json).unwrap();

        assert_eq!(aggregate.service_id, "svc");
        assert_eq!(aggregate.status, AggregateStatus::Pending);
        assert!(!aggregate.sequential_processing);
        assert_eq!(aggregate.items[0].status, ItemStatus::Pending);
        assert!(aggregate.items[0].router.is_empty());
    }

    #[test]
    fn start_clears_error_fields() {
        let mut aggregate = Aggregate::new("svc", vec![]);
        aggregate.fail(ErrorCode::PartialFailure, "old failure");
        aggregate.start();

        assert_eq!(aggregate.status, AggregateStatus::Processing);
        assert_eq!(aggregate.error_code, None);
        assert!(aggregate.error_message.is_empty());
    }

    #[test]
    fn complete_clears_error_fields() {
        let mut aggregate = Aggregate::new("svc", vec![]);
        aggregate.fail(ErrorCode::PartialFailure, PARTIAL_FAILURE_MESSAGE);
        aggregate.complete();

        assert_eq!(aggregate.status, AggregateStatus::Completed);
        assert_eq!(aggregate.error_code, None);
        assert!(aggregate.error_message.is_empty());
    }
}
