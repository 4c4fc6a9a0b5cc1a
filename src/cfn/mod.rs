//! # CloudFormation Custom Resource Protocol
//!
//! - `event`: lifecycle request parsing
//! - `response`: callback body and delivery
//! - `values`: string-or-scalar property coercion

pub mod event;
pub mod response;
pub mod values;

pub use event::{CreateRequest, DeleteRequest, EventContext, LifecycleEvent, RawEvent, UpdateRequest};
pub use response::{
    CallbackError, HttpResponseReporter, ReconciliationResult, ResponseReporter, ResponseStatus,
};
