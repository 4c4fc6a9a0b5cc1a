//! Common test utilities for the handler integration tests
//!
//! In-memory fakes of every capability trait. All fakes append to one shared
//! [`CallLog`] so tests can assert which backing-service calls were made, in
//! which order, and that none were made at all.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::anyhow;
use async_trait::async_trait;
use custom_resource_handlers::cfn::{CallbackError, ReconciliationResult, ResponseReporter};
use custom_resource_handlers::dispatcher::{CustomResourceHandler, Dispatcher};
use custom_resource_handlers::provider::{
    BuildRequest, BuildService, BuildState, LayerRegistry, ParameterKind, ParameterStore,
    ProviderError, ProviderResult, PublicKeyConfig, PublicKeyEntry, PublicKeyRegistry,
    SecretSource, UserPoolAdmin,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use zeroize::Zeroizing;

pub const RESPONSE_URL: &str = "https://cloudformation-custom-resource-response.example/presigned";
pub const STACK_ID: &str =
    "arn:aws:cloudformation:us-east-1:123456789012:stack/my-stack/5b6e2a40-0000-11ef-0000-000000000000";

/// Ordered record of backing-service calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Calls that change external state
    pub fn mutating_calls(&self) -> Vec<String> {
        const READ_ONLY: [&str; 5] = [
            "ssm.get ",
            "cloudfront.get ",
            "cloudfront.find ",
            "codebuild.state ",
            "secrets.get ",
        ];
        self.calls()
            .into_iter()
            .filter(|c| !READ_ONLY.iter().any(|prefix| c.starts_with(prefix)))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

// ---------------------------------------------------------------------------
// Parameter store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredParameter {
    pub value: String,
    pub kind: ParameterKind,
}

#[derive(Debug, Default)]
pub struct FakeParameterStore {
    log: CallLog,
    parameters: Mutex<BTreeMap<String, StoredParameter>>,
    fail_put: Mutex<Option<String>>,
}

impl FakeParameterStore {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub fn insert(&self, name: &str, value: &str, kind: ParameterKind) {
        self.parameters.lock().unwrap().insert(
            name.to_string(),
            StoredParameter {
                value: value.to_string(),
                kind,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<StoredParameter> {
        self.parameters.lock().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.parameters.lock().unwrap().keys().cloned().collect()
    }

    /// Make writes to `name` fail
    pub fn fail_put_of(&self, name: &str) {
        *self.fail_put.lock().unwrap() = Some(name.to_string());
    }
}

#[async_trait]
impl ParameterStore for FakeParameterStore {
    async fn put_parameter(
        &self,
        name: &str,
        value: &str,
        kind: ParameterKind,
        overwrite: bool,
    ) -> ProviderResult<()> {
        self.log
            .record(format!("ssm.put {name} {kind:?} overwrite={overwrite}"));

        if self.fail_put.lock().unwrap().as_deref() == Some(name) {
            return Err(anyhow!("ThrottlingException: Rate exceeded").into());
        }

        let mut parameters = self.parameters.lock().unwrap();
        if !overwrite && parameters.contains_key(name) {
            return Err(anyhow!("ParameterAlreadyExists: {name}").into());
        }
        parameters.insert(
            name.to_string(),
            StoredParameter {
                value: value.to_string(),
                kind,
            },
        );
        Ok(())
    }

    async fn get_parameter(&self, name: &str) -> ProviderResult<Zeroizing<String>> {
        self.log.record(format!("ssm.get {name}"));
        self.parameters
            .lock()
            .unwrap()
            .get(name)
            .map(|p| Zeroizing::new(p.value.clone()))
            .ok_or_else(|| ProviderError::not_found("Parameter", name))
    }

    async fn delete_parameter(&self, name: &str) -> ProviderResult<()> {
        self.log.record(format!("ssm.delete {name}"));
        self.parameters
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProviderError::not_found("Parameter", name))
    }
}

// ---------------------------------------------------------------------------
// CloudFront public keys
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakePublicKeyRegistry {
    log: CallLog,
    keys: Mutex<BTreeMap<String, PublicKeyEntry>>,
    next_id: Mutex<u32>,
    fail_create: Mutex<bool>,
}

impl FakePublicKeyRegistry {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub fn insert(&self, id: &str, config: PublicKeyConfig) {
        self.keys.lock().unwrap().insert(
            id.to_string(),
            PublicKeyEntry {
                id: id.to_string(),
                config,
                etag: "E1".to_string(),
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<PublicKeyEntry> {
        self.keys.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    pub fn fail_create(&self) {
        *self.fail_create.lock().unwrap() = true;
    }
}

#[async_trait]
impl PublicKeyRegistry for FakePublicKeyRegistry {
    async fn create_public_key(&self, config: &PublicKeyConfig) -> ProviderResult<String> {
        self.log.record(format!("cloudfront.create {}", config.name));

        if *self.fail_create.lock().unwrap() {
            return Err(anyhow!("InvalidArgument: The encoded key is not valid").into());
        }

        let mut keys = self.keys.lock().unwrap();
        if keys
            .values()
            .any(|k| k.config.caller_reference == config.caller_reference)
        {
            return Err(anyhow!("PublicKeyAlreadyExists").into());
        }

        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let id = format!("K{:04}", *next_id);
        keys.insert(
            id.clone(),
            PublicKeyEntry {
                id: id.clone(),
                config: config.clone(),
                etag: "E1".to_string(),
            },
        );
        Ok(id)
    }

    async fn get_public_key(&self, id: &str) -> ProviderResult<PublicKeyEntry> {
        self.log.record(format!("cloudfront.get {id}"));
        self.get(id)
            .ok_or_else(|| ProviderError::not_found("CloudFront public key", id))
    }

    async fn update_public_key(
        &self,
        id: &str,
        etag: &str,
        config: &PublicKeyConfig,
    ) -> ProviderResult<()> {
        self.log.record(format!("cloudfront.update {id}"));
        let mut keys = self.keys.lock().unwrap();
        let entry = keys
            .get_mut(id)
            .ok_or_else(|| ProviderError::not_found("CloudFront public key", id))?;
        if entry.etag != etag {
            return Err(anyhow!("PreconditionFailed").into());
        }
        if entry.config.encoded_key != config.encoded_key {
            return Err(anyhow!("IllegalUpdate: EncodedKey cannot be changed").into());
        }
        entry.config = config.clone();
        entry.etag = format!("{}+", entry.etag);
        Ok(())
    }

    async fn delete_public_key(&self, id: &str, etag: &str) -> ProviderResult<()> {
        self.log.record(format!("cloudfront.delete {id}"));
        let mut keys = self.keys.lock().unwrap();
        match keys.get(id) {
            None => Err(ProviderError::not_found("CloudFront public key", id)),
            Some(entry) if entry.etag != etag => Err(anyhow!("PreconditionFailed").into()),
            Some(_) => {
                keys.remove(id);
                Ok(())
            }
        }
    }

    async fn find_public_key_by_name(&self, name: &str) -> ProviderResult<Option<String>> {
        self.log.record(format!("cloudfront.find {name}"));
        Ok(self
            .keys
            .lock()
            .unwrap()
            .values()
            .find(|k| k.config.name == name)
            .map(|k| k.id.clone()))
    }
}

// ---------------------------------------------------------------------------
// Cognito user pool
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeUserPool {
    log: CallLog,
    users: Mutex<BTreeMap<(String, String), Option<String>>>,
    fail_set_password: Mutex<bool>,
    fail_delete: Mutex<bool>,
}

impl FakeUserPool {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub fn insert(&self, pool: &str, user: &str) {
        self.users
            .lock()
            .unwrap()
            .insert((pool.to_string(), user.to_string()), None);
    }

    pub fn exists(&self, pool: &str, user: &str) -> bool {
        self.users
            .lock()
            .unwrap()
            .contains_key(&(pool.to_string(), user.to_string()))
    }

    /// Permanent password of a user, if one was set
    pub fn password(&self, pool: &str, user: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .get(&(pool.to_string(), user.to_string()))
            .cloned()
            .flatten()
    }

    pub fn fail_set_password(&self) {
        *self.fail_set_password.lock().unwrap() = true;
    }

    pub fn fail_delete(&self) {
        *self.fail_delete.lock().unwrap() = true;
    }
}

#[async_trait]
impl UserPoolAdmin for FakeUserPool {
    async fn create_user(&self, user_pool_id: &str, username: &str) -> ProviderResult<()> {
        self.log
            .record(format!("cognito.create {user_pool_id}/{username}"));
        let key = (user_pool_id.to_string(), username.to_string());
        let mut users = self.users.lock().unwrap();
        if users.contains_key(&key) {
            return Err(anyhow!("UsernameExistsException: User account already exists").into());
        }
        users.insert(key, None);
        Ok(())
    }

    async fn set_permanent_password(
        &self,
        user_pool_id: &str,
        username: &str,
        password: &str,
    ) -> ProviderResult<()> {
        self.log
            .record(format!("cognito.set_password {user_pool_id}/{username}"));
        if *self.fail_set_password.lock().unwrap() {
            return Err(anyhow!(
                "InvalidPasswordException: Password does not conform to policy"
            )
            .into());
        }
        let key = (user_pool_id.to_string(), username.to_string());
        match self.users.lock().unwrap().get_mut(&key) {
            Some(slot) => {
                *slot = Some(password.to_string());
                Ok(())
            }
            None => Err(ProviderError::not_found("User", username)),
        }
    }

    async fn delete_user(&self, user_pool_id: &str, username: &str) -> ProviderResult<()> {
        self.log
            .record(format!("cognito.delete {user_pool_id}/{username}"));
        if *self.fail_delete.lock().unwrap() {
            return Err(anyhow!("InternalErrorException").into());
        }
        self.users
            .lock()
            .unwrap()
            .remove(&(user_pool_id.to_string(), username.to_string()))
            .map(|_| ())
            .ok_or_else(|| ProviderError::not_found("User", username))
    }
}

// ---------------------------------------------------------------------------
// Secrets Manager
// ---------------------------------------------------------------------------

pub const GENERATED_PASSWORD: &str = "Gen3rated!Passw0rd";

#[derive(Debug, Default)]
pub struct FakeSecretSource {
    log: CallLog,
    secrets: Mutex<BTreeMap<String, String>>,
}

impl FakeSecretSource {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub fn insert(&self, id: &str, value: &str) {
        self.secrets
            .lock()
            .unwrap()
            .insert(id.to_string(), value.to_string());
    }
}

#[async_trait]
impl SecretSource for FakeSecretSource {
    async fn get_secret_string(&self, secret_id: &str) -> ProviderResult<Zeroizing<String>> {
        self.log.record(format!("secrets.get {secret_id}"));
        self.secrets
            .lock()
            .unwrap()
            .get(secret_id)
            .map(|s| Zeroizing::new(s.clone()))
            .ok_or_else(|| ProviderError::not_found("Secret", secret_id))
    }

    async fn generate_password(
        &self,
        length: Option<u32>,
        exclude_characters: &str,
    ) -> ProviderResult<Zeroizing<String>> {
        self.log.record(format!(
            "secrets.generate length={length:?} exclude={exclude_characters}"
        ));
        Ok(Zeroizing::new(GENERATED_PASSWORD.to_string()))
    }
}

// ---------------------------------------------------------------------------
// CodeBuild
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeBuildService {
    log: CallLog,
    states: Mutex<VecDeque<BuildState>>,
    started: Mutex<Vec<BuildRequest>>,
    fail_start: Mutex<bool>,
}

impl FakeBuildService {
    /// Builds report `states` in order; the last one repeats
    pub fn new(log: &CallLog, states: Vec<BuildState>) -> Self {
        Self {
            log: log.clone(),
            states: Mutex::new(states.into()),
            ..Self::default()
        }
    }

    pub fn started(&self) -> Vec<BuildRequest> {
        self.started.lock().unwrap().clone()
    }

    pub fn fail_start(&self) {
        *self.fail_start.lock().unwrap() = true;
    }
}

#[async_trait]
impl BuildService for FakeBuildService {
    async fn start_build(&self, request: &BuildRequest) -> ProviderResult<String> {
        self.log
            .record(format!("codebuild.start {}", request.project_name));
        if *self.fail_start.lock().unwrap() {
            return Err(anyhow!("AccountLimitExceededException").into());
        }
        self.started.lock().unwrap().push(request.clone());
        Ok(format!("{}:build-1", request.project_name))
    }

    async fn build_state(&self, build_id: &str) -> ProviderResult<BuildState> {
        self.log.record(format!("codebuild.state {build_id}"));
        let mut states = self.states.lock().unwrap();
        let state = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().cloned()
        };
        state.ok_or_else(|| anyhow!("No scripted build state").into())
    }

    async fn stop_build(&self, build_id: &str) -> ProviderResult<()> {
        self.log.record(format!("codebuild.stop {build_id}"));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lambda layers
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeLayerRegistry {
    log: CallLog,
    versions: Mutex<BTreeSet<(String, i64)>>,
}

impl FakeLayerRegistry {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub fn insert(&self, layer_name: &str, version: i64) {
        self.versions
            .lock()
            .unwrap()
            .insert((layer_name.to_string(), version));
    }

    pub fn exists(&self, layer_name: &str, version: i64) -> bool {
        self.versions
            .lock()
            .unwrap()
            .contains(&(layer_name.to_string(), version))
    }
}

#[async_trait]
impl LayerRegistry for FakeLayerRegistry {
    async fn delete_layer_version(
        &self,
        layer_name: &str,
        version_number: i64,
    ) -> ProviderResult<()> {
        self.log
            .record(format!("lambda.delete {layer_name}:{version_number}"));
        if self
            .versions
            .lock()
            .unwrap()
            .remove(&(layer_name.to_string(), version_number))
        {
            Ok(())
        } else {
            Err(ProviderError::not_found(
                "Layer version",
                format!("{layer_name}:{version_number}"),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// Reporter that keeps every delivered response
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(String, ReconciliationResult)>>,
    reject_with: Mutex<Option<u16>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<(String, ReconciliationResult)> {
        self.reports.lock().unwrap().clone()
    }

    /// The single delivered response; panics unless exactly one was sent
    pub fn only_report(&self) -> ReconciliationResult {
        let reports = self.reports();
        assert_eq!(reports.len(), 1, "expected exactly one callback");
        reports[0].1.clone()
    }

    pub fn reject_with(&self, status: u16) {
        *self.reject_with.lock().unwrap() = Some(status);
    }
}

#[async_trait]
impl ResponseReporter for RecordingReporter {
    async fn report(
        &self,
        response_url: &str,
        result: &ReconciliationResult,
    ) -> Result<(), CallbackError> {
        self.reports
            .lock()
            .unwrap()
            .push((response_url.to_string(), result.clone()));
        match *self.reject_with.lock().unwrap() {
            Some(status) => Err(CallbackError::UnexpectedStatus(status)),
            None => Ok(()),
        }
    }
}

pub fn dispatcher(
    handler: Arc<dyn CustomResourceHandler>,
    reporter: &Arc<RecordingReporter>,
) -> Dispatcher {
    Dispatcher::new(handler, Arc::clone(reporter) as Arc<dyn ResponseReporter>)
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

fn base_event(request_type: &str, resource_type: &str, properties: Value) -> Value {
    json!({
        "RequestType": request_type,
        "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:handler",
        "ResponseURL": RESPONSE_URL,
        "StackId": STACK_ID,
        "RequestId": format!("{}-request", request_type.to_lowercase()),
        "LogicalResourceId": "Resource",
        "ResourceType": resource_type,
        "ResourceProperties": properties
    })
}

pub fn create_event(resource_type: &str, properties: Value) -> Value {
    base_event("Create", resource_type, properties)
}

pub fn update_event(
    resource_type: &str,
    physical_resource_id: &str,
    properties: Value,
    old_properties: Value,
) -> Value {
    let mut event = base_event("Update", resource_type, properties);
    event["PhysicalResourceId"] = json!(physical_resource_id);
    event["OldResourceProperties"] = old_properties;
    event
}

pub fn delete_event(resource_type: &str, physical_resource_id: &str, properties: Value) -> Value {
    let mut event = base_event("Delete", resource_type, properties);
    event["PhysicalResourceId"] = json!(physical_resource_id);
    event
}
