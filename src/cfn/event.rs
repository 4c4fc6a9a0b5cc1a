//! # Lifecycle Events
//!
//! Typed view of a CloudFormation custom resource request.
//!
//! The payload is first read into a permissive wire struct so that an
//! unknown `RequestType` can still be answered on the event's `ResponseURL`;
//! only then is it narrowed into [`LifecycleEvent`].

use crate::error::HandlerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields shared by every request kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventContext {
    #[serde(default)]
    pub service_token: Option<String>,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub resource_type: Option<String>,
}

impl EventContext {
    /// Stack name parsed from the stack ARN
    /// (`arn:aws:cloudformation:<region>:<account>:stack/<name>/<guid>`)
    #[must_use]
    pub fn stack_name(&self) -> Option<&str> {
        self.stack_id.split('/').nth(1).filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub context: EventContext,
    pub resource_properties: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub context: EventContext,
    pub physical_resource_id: String,
    pub resource_properties: Value,
    pub old_resource_properties: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub context: EventContext,
    pub physical_resource_id: String,
    pub resource_properties: Value,
}

/// Exactly one lifecycle request per invocation
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Create(CreateRequest),
    Update(UpdateRequest),
    Delete(DeleteRequest),
}

impl LifecycleEvent {
    #[must_use]
    pub fn context(&self) -> &EventContext {
        match self {
            Self::Create(request) => &request.context,
            Self::Update(request) => &request.context,
            Self::Delete(request) => &request.context,
        }
    }

    #[must_use]
    pub fn request_type(&self) -> &'static str {
        match self {
            Self::Create(_) => "Create",
            Self::Update(_) => "Update",
            Self::Delete(_) => "Delete",
        }
    }

    /// Physical id carried by the event; Create events have none yet
    #[must_use]
    pub fn physical_resource_id(&self) -> Option<&str> {
        match self {
            Self::Create(_) => None,
            Self::Update(request) => Some(&request.physical_resource_id),
            Self::Delete(request) => Some(&request.physical_resource_id),
        }
    }
}

/// Wire shape of a request, before the request type is checked
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawEvent {
    #[serde(default)]
    pub request_type: String,
    #[serde(flatten)]
    pub context: EventContext,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: Value,
    #[serde(default)]
    pub old_resource_properties: Option<Value>,
}

impl RawEvent {
    /// Narrow the wire event into a typed lifecycle event
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::MalformedEvent`] for an unknown request type or
    /// when a field required by the request type is missing.
    pub fn into_lifecycle_event(self) -> Result<LifecycleEvent, HandlerError> {
        let Self {
            request_type,
            context,
            physical_resource_id,
            resource_properties,
            old_resource_properties,
        } = self;

        let require_physical_id = |id: Option<String>| {
            id.filter(|id| !id.is_empty()).ok_or_else(|| {
                HandlerError::MalformedEvent(format!(
                    "{request_type} request without PhysicalResourceId"
                ))
            })
        };

        match request_type.as_str() {
            "Create" => Ok(LifecycleEvent::Create(CreateRequest {
                context,
                resource_properties,
            })),
            "Update" => Ok(LifecycleEvent::Update(UpdateRequest {
                physical_resource_id: require_physical_id(physical_resource_id)?,
                old_resource_properties: old_resource_properties.ok_or_else(|| {
                    HandlerError::MalformedEvent(
                        "Update request without OldResourceProperties".to_string(),
                    )
                })?,
                context,
                resource_properties,
            })),
            "Delete" => Ok(LifecycleEvent::Delete(DeleteRequest {
                physical_resource_id: require_physical_id(physical_resource_id)?,
                context,
                resource_properties,
            })),
            other => Err(HandlerError::MalformedEvent(format!(
                "Unknown request type {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawEvent {
        serde_json::from_value(value).unwrap()
    }

    fn base(request_type: &str) -> Value {
        json!({
            "RequestType": request_type,
            "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:handler",
            "ResponseURL": "https://cloudformation-custom-resource-response.example/abc",
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/my-stack/1f2e",
            "RequestId": "req-1",
            "LogicalResourceId": "MyKeyPair",
            "ResourceType": "Custom::KeyPair",
            "ResourceProperties": { "Type": "rsa" }
        })
    }

    #[test]
    fn test_create_event_parses() {
        let event = raw(base("Create")).into_lifecycle_event().unwrap();
        assert_eq!(event.request_type(), "Create");
        assert_eq!(event.physical_resource_id(), None);
        assert_eq!(event.context().logical_resource_id, "MyKeyPair");
        assert_eq!(event.context().stack_name(), Some("my-stack"));
    }

    #[test]
    fn test_update_requires_old_properties() {
        let mut value = base("Update");
        value["PhysicalResourceId"] = json!("/a/priv");
        let err = raw(value).into_lifecycle_event().unwrap_err();
        assert!(matches!(err, HandlerError::MalformedEvent(_)));
    }

    #[test]
    fn test_delete_requires_physical_id() {
        let err = raw(base("Delete")).into_lifecycle_event().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed event: Delete request without PhysicalResourceId"
        );
    }

    #[test]
    fn test_unknown_request_type_is_malformed() {
        let err = raw(base("Replace")).into_lifecycle_event().unwrap_err();
        assert_eq!(err.to_string(), "Malformed event: Unknown request type Replace");
    }

    #[test]
    fn test_stack_name_missing_from_odd_stack_id() {
        let mut value = base("Create");
        value["StackId"] = json!("not-an-arn");
        let event = raw(value).into_lifecycle_event().unwrap();
        assert_eq!(event.context().stack_name(), None);
    }
}
