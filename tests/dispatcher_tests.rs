//! # Lifecycle Dispatcher Tests
//!
//! Routing, failure reporting and the one-callback-per-event rule, checked
//! against a scripted reconciler.

mod common;

use async_trait::async_trait;
use common::{create_event, delete_event, dispatcher, update_event, CallLog, RecordingReporter};
use custom_resource_handlers::cfn::{CreateRequest, DeleteRequest, ResponseStatus, UpdateRequest};
use custom_resource_handlers::constants::{CREATE_FAILED_MARKER, MAX_REASON_LENGTH};
use custom_resource_handlers::dispatcher::{
    CustomResourceHandler, DispatchError, Dispatcher, HandlerResponse, Outcome,
};
use custom_resource_handlers::error::{HandlerError, HandlerResult};
use serde_json::json;
use std::sync::Arc;

const RESOURCE_TYPE: &str = "Custom::Scripted";

#[derive(Debug, Clone)]
enum Behavior {
    Succeed(&'static str),
    Fail(String),
    Defer,
}

#[derive(Debug)]
struct ScriptedHandler {
    log: CallLog,
    behavior: Behavior,
}

impl ScriptedHandler {
    fn outcome(&self, operation: &str) -> HandlerResult<Outcome> {
        self.log.record(format!("handler.{operation}"));
        match &self.behavior {
            Behavior::Succeed(id) => Ok(HandlerResponse::new(*id)
                .with_data("Answer", 42)
                .into()),
            Behavior::Fail(message) => Err(HandlerError::validation(message.clone())),
            Behavior::Defer => Ok(Outcome::Deferred),
        }
    }
}

#[async_trait]
impl CustomResourceHandler for ScriptedHandler {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, _request: &CreateRequest) -> HandlerResult<Outcome> {
        self.outcome("create")
    }

    async fn update(&self, _request: &UpdateRequest) -> HandlerResult<Outcome> {
        self.outcome("update")
    }

    async fn delete(&self, _request: &DeleteRequest) -> HandlerResult<Outcome> {
        self.outcome("delete")
    }
}

fn setup(behavior: Behavior) -> (CallLog, Arc<RecordingReporter>, Dispatcher) {
    let log = CallLog::default();
    let reporter = Arc::new(RecordingReporter::default());
    let handler = Arc::new(ScriptedHandler {
        log: log.clone(),
        behavior,
    });
    let dispatcher = dispatcher(handler, &reporter);
    (log, reporter, dispatcher)
}

#[tokio::test]
async fn test_create_success_reports_handler_result() {
    let (log, reporter, dispatcher) = setup(Behavior::Succeed("res-1"));

    let result = dispatcher
        .dispatch(create_event(RESOURCE_TYPE, json!({})))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(log.calls(), vec!["handler.create"]);
    let (url, report) = reporter.reports().remove(0);
    assert_eq!(url, common::RESPONSE_URL);
    assert_eq!(report, result);
    assert_eq!(report.status, ResponseStatus::Success);
    assert_eq!(report.physical_resource_id, "res-1");
    assert_eq!(report.request_id, "create-request");
    assert_eq!(report.logical_resource_id, "Resource");
    assert_eq!(report.stack_id, common::STACK_ID);
    assert_eq!(report.data.unwrap()["Answer"], 42);
}

#[tokio::test]
async fn test_create_failure_reports_sentinel_id() {
    let (_log, reporter, dispatcher) = setup(Behavior::Fail("Type must be specified".to_string()));

    dispatcher
        .dispatch(create_event(RESOURCE_TYPE, json!({})))
        .await
        .unwrap();

    let report = reporter.only_report();
    assert_eq!(report.status, ResponseStatus::Failed);
    assert_eq!(report.physical_resource_id, CREATE_FAILED_MARKER);
    assert_eq!(report.reason.as_deref(), Some("Type must be specified"));
}

#[tokio::test]
async fn test_update_failure_keeps_original_id() {
    let (_log, reporter, dispatcher) = setup(Behavior::Fail("boom".to_string()));

    dispatcher
        .dispatch(update_event(RESOURCE_TYPE, "res-1", json!({}), json!({})))
        .await
        .unwrap();

    let report = reporter.only_report();
    assert_eq!(report.status, ResponseStatus::Failed);
    assert_eq!(report.physical_resource_id, "res-1");
}

#[tokio::test]
async fn test_delete_failure_keeps_original_id() {
    let (_log, reporter, dispatcher) = setup(Behavior::Fail("AccessDenied".to_string()));

    dispatcher
        .dispatch(delete_event(RESOURCE_TYPE, "res-1", json!({})))
        .await
        .unwrap();

    let report = reporter.only_report();
    assert_eq!(report.status, ResponseStatus::Failed);
    assert_eq!(report.physical_resource_id, "res-1");
    assert_eq!(report.reason.as_deref(), Some("AccessDenied"));
}

#[tokio::test]
async fn test_delete_of_failed_create_skips_reconciler() {
    let (log, reporter, dispatcher) = setup(Behavior::Fail("must not run".to_string()));

    dispatcher
        .dispatch(delete_event(RESOURCE_TYPE, CREATE_FAILED_MARKER, json!({})))
        .await
        .unwrap();

    assert!(log.calls().is_empty());
    let report = reporter.only_report();
    assert_eq!(report.status, ResponseStatus::Success);
    assert_eq!(report.physical_resource_id, CREATE_FAILED_MARKER);
}

#[tokio::test]
async fn test_unknown_request_type_is_reported_failed() {
    let (log, reporter, dispatcher) = setup(Behavior::Succeed("res-1"));

    let mut event = update_event(RESOURCE_TYPE, "res-1", json!({}), json!({}));
    event["RequestType"] = json!("Replace");
    dispatcher.dispatch(event).await.unwrap();

    assert!(log.calls().is_empty());
    let report = reporter.only_report();
    assert_eq!(report.status, ResponseStatus::Failed);
    assert_eq!(report.physical_resource_id, "res-1");
    assert_eq!(
        report.reason.as_deref(),
        Some("Malformed event: Unknown request type Replace")
    );
}

#[tokio::test]
async fn test_update_without_old_properties_is_reported_failed() {
    let (log, reporter, dispatcher) = setup(Behavior::Succeed("res-1"));

    let mut event = update_event(RESOURCE_TYPE, "res-1", json!({}), json!({}));
    event.as_object_mut().unwrap().remove("OldResourceProperties");
    dispatcher.dispatch(event).await.unwrap();

    assert!(log.calls().is_empty());
    assert_eq!(reporter.only_report().status, ResponseStatus::Failed);
}

#[tokio::test]
async fn test_deferred_outcome_sends_no_callback() {
    let (log, reporter, dispatcher) = setup(Behavior::Defer);

    let result = dispatcher
        .dispatch(create_event(RESOURCE_TYPE, json!({})))
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(log.calls(), vec!["handler.create"]);
    assert!(reporter.reports().is_empty());
}

#[tokio::test]
async fn test_event_without_response_url_is_an_error() {
    let (log, reporter, dispatcher) = setup(Behavior::Succeed("res-1"));

    let mut event = create_event(RESOURCE_TYPE, json!({}));
    event.as_object_mut().unwrap().remove("ResponseURL");
    let err = dispatcher.dispatch(event).await.unwrap_err();

    assert!(matches!(err, DispatchError::UnreadableEvent(_)));
    assert!(log.calls().is_empty());
    assert!(reporter.reports().is_empty());
}

#[tokio::test]
async fn test_rejected_callback_is_fatal_and_not_retried() {
    let (_log, reporter, dispatcher) = setup(Behavior::Succeed("res-1"));
    reporter.reject_with(403);

    let err = dispatcher
        .dispatch(create_event(RESOURCE_TYPE, json!({})))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "submitResponse failed: status code is 403"
    );
    assert_eq!(reporter.reports().len(), 1);
}

#[tokio::test]
async fn test_long_reasons_are_truncated() {
    let (_log, reporter, dispatcher) = setup(Behavior::Fail("x".repeat(10_000)));

    dispatcher
        .dispatch(create_event(RESOURCE_TYPE, json!({})))
        .await
        .unwrap();

    let reason = reporter.only_report().reason.unwrap();
    assert!(reason.len() <= MAX_REASON_LENGTH + 3);
    assert!(reason.ends_with("..."));
}
