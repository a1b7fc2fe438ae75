//! Test data builders.

use netsaga_core::aggregate::{Aggregate, Item};
use netsaga_core::codec::{ErrorPayload, ItemLifecycleEvent, JsonCodec};
use netsaga_core::subject::{Operation, ResourceKind, SubjectTable, Subjects};

/// Subjects of the `networks` create operation.
#[must_use]
pub fn create_subjects() -> Subjects {
    Subjects::new(&ResourceKind::networks(), Operation::Create)
}

/// Subjects of the `networks` delete operation.
#[must_use]
pub fn delete_subjects() -> Subjects {
    Subjects::new(&ResourceKind::networks(), Operation::Delete)
}

/// Subject table for the `networks` resource kind.
#[must_use]
pub fn subject_table() -> SubjectTable {
    SubjectTable::new(&ResourceKind::networks())
}

/// A valid, pending network in `10.<index>.0.0/24`.
#[must_use]
pub fn network(name: &str, index: u8) -> Item {
    Item {
        kind: "vcloud".to_string(),
        range: format!("10.{index}.0.0/24"),
        dns: vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()],
        router: "router-1".to_string(),
        router_type: "vcloud".to_string(),
        router_name: "gw".to_string(),
        client_name: "acme".to_string(),
        datacenter_type: "vcloud".to_string(),
        datacenter_username: "admin".to_string(),
        datacenter_password: "secret".to_string(),
        vcloud_url: "https://vcloud.example".to_string(),
        ..Item::new(name, "dc-1")
    }
}

/// A pending aggregate with `count` valid networks named `net-0`, `net-1`, ...
#[must_use]
pub fn aggregate(service: &str, count: u8) -> Aggregate {
    let items = (0..count).map(|index| network(&format!("net-{index}"), index)).collect();
    Aggregate::new(service, items)
}

/// JSON body of an aggregate request.
#[must_use]
pub fn request_payload(aggregate: &Aggregate) -> Vec<u8> {
    aggregate.to_json_bytes().unwrap_or_default()
}

/// JSON body of a successful item outcome.
#[must_use]
pub fn item_done(subject: &str, service: &str, name: &str) -> Vec<u8> {
    ItemLifecycleEvent {
        kind: subject.to_string(),
        service: service.to_string(),
        network_id: format!("id-{name}"),
        network_name: name.to_string(),
        ..ItemLifecycleEvent::default()
    }
    .to_json_bytes()
    .unwrap_or_default()
}

/// JSON body of a failed item outcome.
#[must_use]
pub fn item_error(subject: &str, service: &str, name: &str, code: &str, message: &str) -> Vec<u8> {
    ItemLifecycleEvent {
        kind: subject.to_string(),
        service: service.to_string(),
        network_name: name.to_string(),
        error: ErrorPayload {
            code: code.to_string(),
            message: message.to_string(),
        },
        ..ItemLifecycleEvent::default()
    }
    .to_json_bytes()
    .unwrap_or_default()
}
