//! # Response Reporter
//!
//! Serializes the outcome of a lifecycle event and delivers it to the
//! orchestrator with an HTTP PUT to the event's presigned `ResponseURL`.
//!
//! Only HTTP 200 counts as delivered. Any other status, or a transport
//! failure, is fatal for the invocation and is never retried here.

use crate::constants::MAX_REASON_LENGTH;
use crate::cfn::event::EventContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

impl ResponseStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Success => "SUCCESS",
            ResponseStatus::Failed => "FAILED",
        }
    }
}

/// Body of the callback to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReconciliationResult {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_echo: bool,
}

impl ReconciliationResult {
    #[must_use]
    pub fn success(context: &EventContext, physical_resource_id: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            reason: None,
            physical_resource_id: physical_resource_id.into(),
            stack_id: context.stack_id.clone(),
            request_id: context.request_id.clone(),
            logical_resource_id: context.logical_resource_id.clone(),
            data: None,
            no_echo: false,
        }
    }

    #[must_use]
    pub fn failed(
        context: &EventContext,
        physical_resource_id: impl Into<String>,
        reason: &str,
    ) -> Self {
        Self {
            status: ResponseStatus::Failed,
            reason: Some(truncate_reason(reason)),
            ..Self::success(context, physical_resource_id)
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason.map(|r| truncate_reason(&r));
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Option<Map<String, Value>>) -> Self {
        self.data = data.filter(|d| !d.is_empty());
        self
    }

    #[must_use]
    pub fn with_no_echo(mut self, no_echo: bool) -> Self {
        self.no_echo = no_echo;
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Cap a reason so the callback body stays inside CloudFormation's limit
#[must_use]
pub fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_REASON_LENGTH {
        return reason.to_string();
    }

    let mut end = MAX_REASON_LENGTH;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &reason[..end])
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("submitResponse failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("submitResponse failed: status code is {0}")]
    UnexpectedStatus(u16),

    #[error("submitResponse failed: cannot serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Delivers a [`ReconciliationResult`] to the orchestrator
#[async_trait]
pub trait ResponseReporter: Send + Sync {
    async fn report(
        &self,
        response_url: &str,
        result: &ReconciliationResult,
    ) -> Result<(), CallbackError>;
}

/// Reporter performing the HTTP PUT to the presigned response URL
#[derive(Debug, Clone)]
pub struct HttpResponseReporter {
    client: reqwest::Client,
}

impl HttpResponseReporter {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be constructed (TLS backend setup).
    pub fn new(timeout: Duration) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ResponseReporter for HttpResponseReporter {
    async fn report(
        &self,
        response_url: &str,
        result: &ReconciliationResult,
    ) -> Result<(), CallbackError> {
        let span = info_span!(
            "custom_resource.callback",
            status = result.status.as_str(),
            physical_resource_id = %result.physical_resource_id
        );

        async move {
            let body = serde_json::to_vec(result)?;

            let response = self
                .client
                .put(response_url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await?;

            let status = response.status();
            if status != reqwest::StatusCode::OK {
                return Err(CallbackError::UnexpectedStatus(status.as_u16()));
            }

            info!(
                "Delivered {} response for {}",
                result.status.as_str(),
                result.logical_resource_id
            );
            Ok(())
        }
        .instrument(span)
        .await
    }
}
