//! # Prelude
//!
//! Commonly used types, for `use custom_resource_handlers::prelude::*;`.

pub use crate::cfn::{
    CallbackError, CreateRequest, DeleteRequest, EventContext, HttpResponseReporter,
    LifecycleEvent, ReconciliationResult, ResponseReporter, ResponseStatus, UpdateRequest,
};
pub use crate::config::HandlerConfig;
pub use crate::constants::CREATE_FAILED_MARKER;
pub use crate::dispatcher::{
    CustomResourceHandler, DispatchError, Dispatcher, HandlerResponse, Outcome,
};
pub use crate::error::{HandlerError, HandlerResult};
pub use crate::provider::{
    BuildService, LayerRegistry, ParameterKind, ParameterStore, ProviderError, ProviderResult,
    PublicKeyRegistry, SecretSource, UserPoolAdmin,
};
pub use crate::reconciler::{
    CloudFrontKeyPairHandler, CognitoUserHandler, KeyPairHandler, NodejsLayerHandler,
};
pub use crate::runtime::ResourceKind;
