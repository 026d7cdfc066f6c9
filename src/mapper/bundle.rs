//! Bundle envelope builders

use crate::fhir::{Bundle, BundleEntry, BundleRequest};
use serde_json::Value;
use uuid::Uuid;

/// Wrap resources in a transaction bundle (all-or-nothing)
pub fn build_transaction_bundle(resources: Vec<Value>) -> Bundle {
    build_bundle("transaction", resources)
}

/// Wrap resources in a batch bundle (entries processed independently)
pub fn build_batch_bundle(resources: Vec<Value>) -> Bundle {
    build_bundle("batch", resources)
}

fn build_bundle(bundle_type: &str, resources: Vec<Value>) -> Bundle {
    let mut bundle = Bundle::of_type(bundle_type);
    bundle.entry = resources.into_iter().map(to_entry).collect();
    bundle
}

/// Build one bundle entry
///
/// A resource that already carries an id is an update (`PUT {type}/{id}`);
/// anything else is a create (`POST {type}`) addressed by a urn:uuid
/// fullUrl so transaction-internal references can point at it.
fn to_entry(resource: Value) -> BundleEntry {
    let resource_type = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let id = resource
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let (full_url, request) = match id {
        Some(id) => (
            format!("{resource_type}/{id}"),
            BundleRequest {
                method: "PUT".to_string(),
                url: format!("{resource_type}/{id}"),
            },
        ),
        None => (
            format!("urn:uuid:{}", Uuid::new_v4()),
            BundleRequest {
                method: "POST".to_string(),
                url: resource_type,
            },
        ),
    };

    BundleEntry {
        full_url: Some(full_url),
        resource: Some(resource),
        request: Some(request),
        response: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_bundle_shape() {
        let bundle = build_transaction_bundle(vec![
            json!({"resourceType": "Patient", "gender": "female"}),
        ]);

        assert_eq!(bundle.resource_type, "Bundle");
        assert_eq!(bundle.r#type, "transaction");
        assert_eq!(bundle.entry.len(), 1);
    }

    #[test]
    fn test_resource_without_id_posts() {
        let bundle = build_batch_bundle(vec![json!({"resourceType": "Observation"})]);
        let request = bundle.entry[0].request.as_ref().unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "Observation");
        assert!(bundle.entry[0]
            .full_url
            .as_ref()
            .unwrap()
            .starts_with("urn:uuid:"));
    }

    #[test]
    fn test_resource_with_id_puts() {
        let bundle = build_batch_bundle(vec![json!({"resourceType": "Condition", "id": "c42"})]);
        let request = bundle.entry[0].request.as_ref().unwrap();

        assert_eq!(request.method, "PUT");
        assert_eq!(request.url, "Condition/c42");
        assert_eq!(bundle.entry[0].full_url.as_deref(), Some("Condition/c42"));
    }

    #[test]
    fn test_mixed_methods() {
        let bundle = build_transaction_bundle(vec![
            json!({"resourceType": "Patient", "id": "p1"}),
            json!({"resourceType": "Observation"}),
        ]);

        assert_eq!(bundle.entry[0].request.as_ref().unwrap().method, "PUT");
        assert_eq!(bundle.entry[1].request.as_ref().unwrap().method, "POST");
    }

    #[test]
    fn test_empty_id_treated_as_create() {
        let bundle = build_batch_bundle(vec![json!({"resourceType": "Patient", "id": ""})]);
        assert_eq!(bundle.entry[0].request.as_ref().unwrap().method, "POST");
    }
}
