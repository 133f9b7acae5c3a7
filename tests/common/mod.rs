//! Shared test doubles for the orchestration tests: scripted collaborators
//! with call counters, a configurable capability handler, and a harness
//! wiring them into an orchestrator with fast retry budgets.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use provisio::{
    Capabilities, Collaborators, DeliveryRef, DeliveryRequest, ExternalApi, GitDelivery,
    HandlerContext, HandlerRegistry, InMemoryStateStore, JobError, JobHandler, JobRequest,
    JobType, MergeSettings, MergeStrategy, Orchestrator, Payload, RetryConfig, StatusEvent,
    StatusSink, StepBudgets, TenantDirectory,
};

pub struct MockTenantDirectory {
    pub display_name: String,
    pub fail: AtomicBool,
    pub calls: AtomicU32,
}

impl MockTenantDirectory {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            fail: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl TenantDirectory for MockTenantDirectory {
    async fn display_name(&self, tenant_id: &str) -> Result<String, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(JobError::Lookup(format!("tenant '{tenant_id}' not found")));
        }
        Ok(self.display_name.clone())
    }
}

/// External API double: pops scripted outcomes, then returns an `ok` map.
/// An optional gate keeps calls in flight until the test releases them.
pub struct ScriptedApi {
    script: Mutex<VecDeque<Result<Payload, JobError>>>,
    pub calls: AtomicU32,
    pub completed: AtomicU32,
    gate: Option<Arc<Notify>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            completed: AtomicU32::new(0),
            gate: None,
        }
    }

    pub fn with_gate(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn push_failure(&self, err: JobError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub fn push_failures(&self, err: JobError, count: u32) {
        for _ in 0..count {
            self.push_failure(err.clone());
        }
    }
}

#[async_trait]
impl ExternalApi for ScriptedApi {
    async fn call(
        &self,
        api_name: &str,
        _payload: &Value,
        _idempotency_key: &str,
    ) -> Result<Payload, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        let result = match scripted {
            Some(outcome) => outcome,
            None => {
                let mut ok = Payload::new();
                ok.insert("status".to_string(), json!("ok"));
                ok.insert("api".to_string(), json!(api_name));
                Ok(ok)
            }
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Git delivery double returning a fixed commit reference.
pub struct ScriptedDelivery {
    script: Mutex<VecDeque<Result<DeliveryRef, JobError>>>,
    pub calls: AtomicU32,
    pub last_request: Mutex<Option<DeliveryRequest>>,
}

impl ScriptedDelivery {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn push_failure(&self, err: JobError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub fn push_failures(&self, err: JobError, count: u32) {
        for _ in 0..count {
            self.push_failure(err.clone());
        }
    }
}

#[async_trait]
impl GitDelivery for ScriptedDelivery {
    async fn render_and_deliver(&self, request: DeliveryRequest) -> Result<DeliveryRef, JobError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        *self.last_request.lock().unwrap() = Some(request);
        match scripted {
            Some(outcome) => outcome,
            None => Ok(DeliveryRef::Commit("abc1234".to_string())),
        }
    }
}

/// Status sink double recording every event; can be told to fail.
pub struct RecordingSink {
    pub events: Mutex<Vec<StatusEvent>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn record(&self, event: &StatusEvent) -> Result<(), JobError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(JobError::Internal("status sink unavailable".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Handler with configurable capabilities that delegates its optional steps
/// to the injected collaborators, so the scripted doubles observe them.
pub struct TestHandler {
    caps: Capabilities,
    pub pre_check_error: Option<JobError>,
    pub post_action_fails: AtomicBool,
    pub wait_calls: AtomicU32,
    pub post_calls: AtomicU32,
}

pub const TEST_CATEGORY: &str = "test/resource";

impl TestHandler {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            pre_check_error: None,
            post_action_fails: AtomicBool::new(false),
            wait_calls: AtomicU32::new(0),
            post_calls: AtomicU32::new(0),
        }
    }

    pub fn failing_pre_checks(caps: Capabilities, err: JobError) -> Self {
        Self {
            pre_check_error: Some(err),
            ..Self::new(caps)
        }
    }
}

#[async_trait]
impl JobHandler for TestHandler {
    fn category(&self) -> &'static str {
        TEST_CATEGORY
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    async fn pre_checks(&self, _ctx: &HandlerContext) -> Result<(), JobError> {
        match &self.pre_check_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn commit_to_git(
        &self,
        ctx: &HandlerContext,
        git: &dyn GitDelivery,
        strategy: MergeStrategy,
    ) -> Result<Option<DeliveryRef>, JobError> {
        git.render_and_deliver(ctx.delivery_request(strategy))
            .await
            .map(Some)
    }

    async fn call_external_apis(
        &self,
        ctx: &HandlerContext,
        api: &dyn ExternalApi,
    ) -> Result<Option<Payload>, JobError> {
        let body = Value::Object(ctx.request.payload.clone());
        api.call("test_api", &body, &ctx.idempotency_key())
            .await
            .map(Some)
    }

    async fn wait_for_completion(
        &self,
        _ctx: &HandlerContext,
        _api: &dyn ExternalApi,
    ) -> Result<(), JobError> {
        self.wait_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn post_actions(&self, _ctx: &HandlerContext) -> Result<(), JobError> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        if self.post_action_fails.load(Ordering::SeqCst) {
            return Err(JobError::Upstream("notification service down".to_string()));
        }
        Ok(())
    }
}

pub fn fast_budgets() -> StepBudgets {
    let fast = RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
        timeout_secs: 5,
    };
    StepBudgets {
        lookup: fast.clone(),
        pre_checks: RetryConfig::single_attempt(5),
        delivery: fast.clone(),
        invoke: fast.clone(),
        wait: fast,
        post_actions: RetryConfig::single_attempt(5),
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub tenants: Arc<MockTenantDirectory>,
    pub api: Arc<ScriptedApi>,
    pub git: Arc<ScriptedDelivery>,
    pub sink: Arc<RecordingSink>,
    pub store: Arc<InMemoryStateStore>,
}

impl Harness {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::build(
            registry,
            Arc::new(InMemoryStateStore::new()),
            fast_budgets(),
            Arc::new(ScriptedApi::new()),
        )
    }

    pub fn with_store(registry: HandlerRegistry, store: Arc<InMemoryStateStore>) -> Self {
        Self::build(registry, store, fast_budgets(), Arc::new(ScriptedApi::new()))
    }

    pub fn with_budgets(registry: HandlerRegistry, budgets: StepBudgets) -> Self {
        Self::build(
            registry,
            Arc::new(InMemoryStateStore::new()),
            budgets,
            Arc::new(ScriptedApi::new()),
        )
    }

    pub fn with_api(registry: HandlerRegistry, api: Arc<ScriptedApi>) -> Self {
        Self::build(registry, Arc::new(InMemoryStateStore::new()), fast_budgets(), api)
    }

    pub fn with_api_and_budgets(
        registry: HandlerRegistry,
        api: Arc<ScriptedApi>,
        budgets: StepBudgets,
    ) -> Self {
        Self::build(registry, Arc::new(InMemoryStateStore::new()), budgets, api)
    }

    fn build(
        registry: HandlerRegistry,
        store: Arc<InMemoryStateStore>,
        budgets: StepBudgets,
        api: Arc<ScriptedApi>,
    ) -> Self {
        let tenants = Arc::new(MockTenantDirectory::new("Acme Corp"));
        let git = Arc::new(ScriptedDelivery::new());
        let sink = Arc::new(RecordingSink::new());
        let collaborators = Collaborators {
            tenants: tenants.clone(),
            api: api.clone(),
            git: git.clone(),
            status: sink.clone(),
        };
        let orchestrator = Orchestrator::new(
            registry,
            collaborators,
            store.clone(),
            budgets,
            MergeSettings::default(),
        );
        Self {
            orchestrator,
            tenants,
            api,
            git,
            sink,
            store,
        }
    }
}

pub fn registry_with(handler: Arc<dyn JobHandler>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(handler);
    registry
}

pub fn request(job_id: &str, category: &str) -> JobRequest {
    let mut payload = Payload::new();
    payload.insert("name".to_string(), json!("team-a"));
    JobRequest {
        job_id: job_id.to_string(),
        tenant_id: "acme".to_string(),
        category: category.to_string(),
        job_type: JobType::Create,
        payload,
    }
}
