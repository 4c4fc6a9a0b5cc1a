//! # Lifecycle Dispatcher
//!
//! Routes one lifecycle event to the matching reconciler operation and makes
//! sure the orchestrator hears back exactly once.
//!
//! ## Flow
//!
//! 1. Read the raw payload; without a `ResponseURL` nobody can be told, so
//!    an unreadable payload is the only case that ends without a callback
//! 2. Narrow into a [`LifecycleEvent`]; an unknown `RequestType` is reported
//!    as FAILED like any reconciler error
//! 3. Acknowledge a Delete of a never-created resource without calling the
//!    reconciler
//! 4. Run the reconciler and turn its outcome into a [`ReconciliationResult`]
//! 5. Deliver the result, unless the reconciler handed the callback off to a
//!    remote job ([`Outcome::Deferred`])

use crate::cfn::{
    CallbackError, CreateRequest, DeleteRequest, LifecycleEvent, RawEvent, ReconciliationResult,
    ResponseReporter, UpdateRequest,
};
use crate::constants::CREATE_FAILED_MARKER;
use crate::error::HandlerResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Successful reconciliation, reported by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    pub physical_resource_id: String,
    pub data: Map<String, Value>,
    pub reason: Option<String>,
    pub no_echo: bool,
}

impl HandlerResponse {
    pub fn new(physical_resource_id: impl Into<String>) -> Self {
        Self {
            physical_resource_id: physical_resource_id.into(),
            data: Map::new(),
            reason: None,
            no_echo: false,
        }
    }

    #[must_use]
    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_no_echo(mut self) -> Self {
        self.no_echo = true;
        self
    }
}

/// What the reconciler did with the event
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Reconciled; the dispatcher delivers the callback
    Completed(HandlerResponse),
    /// A remote job owns the callback; the dispatcher must stay silent
    Deferred,
}

impl From<HandlerResponse> for Outcome {
    fn from(response: HandlerResponse) -> Self {
        Self::Completed(response)
    }
}

/// One reconciler per custom resource type
#[async_trait]
pub trait CustomResourceHandler: Send + Sync {
    /// CloudFormation resource type served, e.g. `Custom::KeyPair`
    fn resource_type(&self) -> &'static str;

    async fn create(&self, request: &CreateRequest) -> HandlerResult<Outcome>;

    async fn update(&self, request: &UpdateRequest) -> HandlerResult<Outcome>;

    async fn delete(&self, request: &DeleteRequest) -> HandlerResult<Outcome>;
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload cannot even be answered (no `ResponseURL`, not an object)
    #[error("Unreadable lifecycle event: {0}")]
    UnreadableEvent(#[source] serde_json::Error),

    #[error(transparent)]
    Callback(#[from] CallbackError),
}

/// Lifecycle Dispatcher bound to one reconciler and one reporter
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn CustomResourceHandler>,
    reporter: Arc<dyn ResponseReporter>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("resource_type", &self.handler.resource_type())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        handler: Arc<dyn CustomResourceHandler>,
        reporter: Arc<dyn ResponseReporter>,
    ) -> Self {
        Self { handler, reporter }
    }

    /// Handle one lifecycle event end to end
    ///
    /// Returns the delivered result, or `None` when the callback was handed
    /// off to a remote job.
    ///
    /// # Errors
    ///
    /// Fails only when the payload carries no usable `ResponseURL` or the
    /// callback itself cannot be delivered. Reconciler failures are reported
    /// to the orchestrator as FAILED and are not errors here.
    pub async fn dispatch(
        &self,
        payload: Value,
    ) -> Result<Option<ReconciliationResult>, DispatchError> {
        debug!(event = %payload, "Received lifecycle event");

        let raw: RawEvent =
            serde_json::from_value(payload).map_err(DispatchError::UnreadableEvent)?;

        let span = info_span!(
            "custom_resource.dispatch",
            request_type = %raw.request_type,
            logical_resource_id = %raw.context.logical_resource_id,
            request_id = %raw.context.request_id,
            resource_type = self.handler.resource_type()
        );

        self.dispatch_raw(raw).instrument(span).await
    }

    async fn dispatch_raw(
        &self,
        raw: RawEvent,
    ) -> Result<Option<ReconciliationResult>, DispatchError> {
        let context = raw.context.clone();
        let is_create = raw.request_type == "Create";
        // Physical id to report if anything below fails
        let fallback_id = if is_create {
            CREATE_FAILED_MARKER.to_string()
        } else {
            raw.physical_resource_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| CREATE_FAILED_MARKER.to_string())
        };

        let outcome = match raw.into_lifecycle_event() {
            Ok(event) => self.reconcile(&event).await,
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(Outcome::Completed(response)) => {
                info!(
                    physical_resource_id = %response.physical_resource_id,
                    "Reconciliation succeeded"
                );
                ReconciliationResult::success(&context, response.physical_resource_id)
                    .with_reason(response.reason)
                    .with_data(Some(response.data))
                    .with_no_echo(response.no_echo)
            }
            Ok(Outcome::Deferred) => {
                info!("Callback handed off to the remote job");
                return Ok(None);
            }
            Err(e) => {
                let reason = e.reason();
                error!(physical_resource_id = %fallback_id, "Reconciliation failed: {}", reason);
                ReconciliationResult::failed(&context, fallback_id, &reason)
            }
        };

        if let Err(e) = self.reporter.report(&context.response_url, &result).await {
            error!("Failed to deliver {} response: {}", result.status.as_str(), e);
            return Err(e.into());
        }

        Ok(Some(result))
    }

    async fn reconcile(&self, event: &LifecycleEvent) -> HandlerResult<Outcome> {
        match event {
            LifecycleEvent::Create(request) => self.handler.create(request).await,
            LifecycleEvent::Update(request) => self.handler.update(request).await,
            LifecycleEvent::Delete(request)
                if request.physical_resource_id == CREATE_FAILED_MARKER =>
            {
                warn!("Resource was never created, nothing to delete");
                Ok(HandlerResponse::new(CREATE_FAILED_MARKER)
                    .with_reason("The resource has not been created yet")
                    .into())
            }
            LifecycleEvent::Delete(request) => self.handler.delete(request).await,
        }
    }
}
