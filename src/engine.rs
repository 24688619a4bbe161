//! Call routing engine - the main entry point for Callflow.
//!
//! The engine manages the lifecycle of routing flows and live calls,
//! including:
//! - Deploying and compiling flow definitions
//! - Starting one session task per call
//! - Routing carrier events to the right session
//! - Managing the event channel and graceful shutdown

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use crate::{
    CallflowError, Config, Result,
    common::{MemCache, Queue, Shutdown, Vars},
    events::{Channel, TelephonyEvent},
    model::{self, ExecutionPlan, Flow, PlanKey},
    queueing::QueueRegistry,
    rotation::RotationAllocator,
    runtime::{ExecutionContext, Interpreter, session::CallSession},
    services::{AdmissionGate, AllowAll, BillingEmitter, BuyerDirectory, DeclaredBuyers, FlowStore, LogBilling, MemoryFlowStore},
    utils,
};

/// Maximum number of live call sessions to index in memory.
const SESSION_CACHE_SIZE: usize = 65536;

/// The main call routing engine.
///
/// Engine is the central coordinator for Callflow, responsible for:
/// - Managing the tokio runtime for async execution
/// - Compiling flows into cached execution plans
/// - Spawning and indexing per-call session tasks
/// - Broadcasting call events for subscribers
///
/// # Example
///
/// ```rust,ignore
/// let engine = EngineBuilder::new().build()?;
/// engine.launch();
///
/// // Deploy a flow
/// engine.deploy("tenant-1", &flow)?;
///
/// // Start a call and feed it carrier events
/// let call_id = engine.start_call("tenant-1", "my-flow", "+15550100", "+15550199")?;
/// engine.ingest(event)?;
///
/// // Shutdown when done
/// engine.shutdown();
/// ```
pub struct Engine {
    config: Config,
    /// Event channel for broadcasting call events.
    channel: Arc<Channel>,
    /// Compiled plans keyed by (tenant id, flow id).
    plans: Arc<MemCache<PlanKey, Arc<ExecutionPlan>>>,
    /// Event queues of live calls, keyed by call id.
    sessions: Arc<MemCache<String, Arc<Queue<TelephonyEvent>>>>,
    /// Shared node semantics (allocator, queues, collaborators).
    interpreter: Arc<Interpreter>,
    /// Deploy target; always consulted before the external store.
    deployed: MemoryFlowStore,
    /// External source of published flows, if any.
    store: Option<Arc<dyn FlowStore>>,
    billing: Arc<dyn BillingEmitter>,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    /// Tokio runtime for async task execution.
    runtime: Arc<Runtime>,
    /// Shutdown coordinator for graceful termination.
    shutdown: Arc<Shutdown>,
}

impl Engine {
    /// Creates a new engine with the given configuration and default
    /// collaborators: in-memory flows, declared buyers, allow-all
    /// admission and log-only billing.
    pub fn new_with_config(config: Config) -> Self {
        let runtime = Arc::new(Builder::new_multi_thread().worker_threads(config.async_worker_thread_number.into()).enable_all().build().unwrap());
        Self::assemble(runtime, config, None, Arc::new(DeclaredBuyers), Arc::new(AllowAll), Arc::new(LogBilling))
    }

    pub(crate) fn assemble(
        runtime: Arc<Runtime>,
        config: Config,
        store: Option<Arc<dyn FlowStore>>,
        directory: Arc<dyn BuyerDirectory>,
        admission: Arc<dyn AdmissionGate>,
        billing: Arc<dyn BillingEmitter>,
    ) -> Self {
        let allocator = Arc::new(RotationAllocator::new(config.rotation.clone()));
        let interpreter = Arc::new(Interpreter::new(allocator, QueueRegistry::new(), directory, admission, config.default_ivr_timeout));
        let channel = Arc::new(Channel::new(runtime.clone()));

        Self {
            plans: Arc::new(MemCache::new(config.plan_cache_capacity)),
            sessions: Arc::new(MemCache::new(SESSION_CACHE_SIZE)),
            config,
            channel,
            interpreter,
            deployed: MemoryFlowStore::new(),
            store,
            billing,
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Starts the engine and begins dispatching events to subscribers.
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        self.channel.listen();
    }

    /// Gracefully shuts down the engine.
    ///
    /// Live sessions observe the shutdown signal, run their cleanup
    /// (queue leave, reservation release, billing) and exit.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        self.shutdown.shutdown();
        self.channel.shutdown();
    }

    /// Validates, compiles and caches a flow for a tenant.
    ///
    /// Compilation happens once per deploy; sessions only ever read the
    /// cached plan.
    pub fn deploy(
        &self,
        tenant_id: &str,
        flow: &Flow,
    ) -> Result<()> {
        let valid = model::validate(flow.clone())?;
        let plan = model::compile(&valid)?;
        self.plans.set((tenant_id.to_string(), plan.flow_id.clone()), Arc::new(plan));
        self.deployed.publish(tenant_id, valid.into_inner());
        Ok(())
    }

    /// Starts routing a new inbound call and returns its call id.
    ///
    /// The caller then feeds the call's carrier events through
    /// [`Engine::ingest`].
    pub fn start_call(
        &self,
        tenant_id: &str,
        flow_id: &str,
        from: &str,
        to: &str,
    ) -> Result<String> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(CallflowError::Engine("Engine is not running".to_string()));
        }

        let plan = self.plan_for(tenant_id, flow_id)?;
        let call_id = utils::longid();

        let variables = Vars::new()
            .with("caller", serde_json::json!({"number": from}))
            .with("callee", serde_json::json!({"number": to}));
        let ctx = ExecutionContext::new(
            call_id.clone(),
            tenant_id.to_string(),
            plan.flow_id.clone(),
            plan.flow_version.clone(),
            plan.entry_node_id.clone(),
            variables,
        );

        let events = Queue::new(self.config.session_queue_size);
        self.sessions.set(call_id.clone(), events.clone());

        let session = CallSession::new(
            ctx,
            plan,
            self.interpreter.clone(),
            events,
            self.channel.event_queue(),
            self.billing.clone(),
            self.shutdown.clone(),
        );

        let sessions = self.sessions.clone();
        let session_call_id = call_id.clone();
        self.runtime.spawn(async move {
            session.run().await;
            sessions.remove(&session_call_id);
        });

        Ok(call_id)
    }

    /// Routes a carrier event to the session of the call it belongs to.
    ///
    /// Events for unknown calls are dropped: carriers keep emitting for a
    /// short window after a call reaches its terminal state.
    pub fn ingest(
        &self,
        event: TelephonyEvent,
    ) -> Result<()> {
        let call_id = event.call_id().to_string();
        match self.sessions.get(&call_id) {
            Some(queue) => queue.send(event),
            None => {
                debug!(call_id, event = event.type_name(), "event for unknown call, dropping");
                Ok(())
            }
        }
    }

    /// Stops a live call as if the caller hung up.
    pub fn stop(
        &self,
        call_id: &str,
    ) -> Result<()> {
        let key = call_id.to_string();
        if let Some(queue) = self.sessions.get(&key) {
            queue.send(TelephonyEvent::CallEnded {
                call_id: key,
                reason: "normal".to_string(),
            })
        } else {
            Err(CallflowError::Session(format!("Call {} not found", call_id)))
        }
    }

    /// True while the call has a live session.
    pub fn is_active(
        &self,
        call_id: &str,
    ) -> bool {
        self.sessions.get(&call_id.to_string()).is_some()
    }

    /// Returns a reference to the event channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    /// Returns the rotation allocator, for counters and dashboards.
    pub fn allocator(&self) -> Arc<RotationAllocator> {
        self.interpreter.allocator().clone()
    }

    /// Cached plan, or compile from the deployed/external stores.
    fn plan_for(
        &self,
        tenant_id: &str,
        flow_id: &str,
    ) -> Result<Arc<ExecutionPlan>> {
        let key = (tenant_id.to_string(), flow_id.to_string());
        if let Some(plan) = self.plans.get(&key) {
            return Ok(plan);
        }

        let flow = match self.deployed.find(tenant_id, flow_id) {
            Some(flow) => Some(flow),
            None => match &self.store {
                Some(store) => self.runtime.block_on(store.published_flow(tenant_id, flow_id))?,
                None => None,
            },
        };
        let Some(flow) = flow else {
            return Err(CallflowError::Engine(format!("Flow {} is not deployed for tenant {}", flow_id, tenant_id)));
        };

        let valid = model::validate(flow)?;
        let plan = Arc::new(model::compile(&valid)?);
        self.plans.set(key, plan.clone());
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        builder::EngineBuilder,
        flows,
        model::HangupReason,
        services::CallSummary,
    };

    /// Billing emitter that hands each summary to the test thread.
    struct CaptureBilling(flume::Sender<CallSummary>);

    #[async_trait]
    impl BillingEmitter for CaptureBilling {
        async fn emit(
            &self,
            summary: CallSummary,
        ) -> Result<()> {
            let _ = self.0.send(summary);
            Ok(())
        }
    }

    fn engine_with_billing() -> (Engine, flume::Receiver<CallSummary>) {
        let (tx, rx) = flume::unbounded();
        let engine = EngineBuilder::new()
            .async_worker_thread_number(2)
            .billing_emitter(Arc::new(CaptureBilling(tx)))
            .build()
            .unwrap();
        engine.launch();
        (engine, rx)
    }

    fn summary_of(rx: &flume::Receiver<CallSummary>) -> CallSummary {
        rx.recv_timeout(Duration::from_secs(5)).expect("call should terminate")
    }

    #[test]
    fn test_simple_direct_route_scenario() {
        let (engine, billing) = engine_with_billing();
        engine.deploy("tenant-1", &flows::simple_direct_route()).unwrap();

        let call_id = engine.start_call("tenant-1", "simple-direct-route", "+15550100", "+15550199").unwrap();
        engine
            .ingest(TelephonyEvent::CallAnswered {
                call_id: call_id.clone(),
            })
            .unwrap();

        let summary = summary_of(&billing);
        assert_eq!(summary.call_id, call_id);
        assert_eq!(summary.reason, HangupReason::Normal);
        assert_eq!(summary.tags.get::<String>("route"), Some("direct".to_string()));
        assert_eq!(summary.tags.get::<String>("source"), Some("simple-flow".to_string()));
        assert_eq!(summary.tags.len(), 2);
        assert_eq!(summary.answered_buyer_id.as_deref(), Some("acme-insurance"));
        assert_eq!(summary.history.last().map(|h| h.node_id.as_str()), Some("hangup-1"));

        // the buyer slot is released and the daily counter kept
        assert_eq!(engine.allocator().live_concurrency("tenant-1", "buyer-1", "acme-insurance"), 0);
        assert_eq!(engine.allocator().calls_today("tenant-1", "buyer-1", "acme-insurance"), 1);
        engine.shutdown();
    }

    #[test]
    fn test_ivr_choice_routes_to_queue() {
        let (engine, billing) = engine_with_billing();
        engine.deploy("tenant-1", &flows::ivr_dtmf()).unwrap();

        let call_id = engine.start_call("tenant-1", "ivr-dtmf", "+15550100", "+15550199").unwrap();
        engine
            .ingest(TelephonyEvent::DtmfReceived {
                call_id: call_id.clone(),
                digits: "2".to_string(),
            })
            .unwrap();
        engine
            .ingest(TelephonyEvent::QueueConnected {
                call_id: call_id.clone(),
                agent_id: "agent-9".to_string(),
            })
            .unwrap();

        let summary = summary_of(&billing);
        assert_eq!(summary.reason, HangupReason::Normal);
        let visited: Vec<&str> = summary.history.iter().map(|h| h.node_id.as_str()).collect();
        assert_eq!(visited, vec!["ivr-1", "queue-support", "hangup-1"]);
        engine.shutdown();
    }

    #[test]
    fn test_ivr_timeout_falls_to_default() {
        let (engine, billing) = engine_with_billing();
        let flow = Flow::from_json(
            r#"{
            "id": "menu-timeout", "name": "Menu Timeout", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "ivr-1"},
            "nodes": [
                {
                    "id": "ivr-1", "type": "ivr",
                    "prompt": "menu.wav", "timeout": 1,
                    "choices": [{"digits": "1", "target": "hangup-choice"}],
                    "default": "hangup-default"
                },
                {"id": "hangup-choice", "type": "hangup", "reason": "normal"},
                {"id": "hangup-default", "type": "hangup", "reason": "normal"}
            ]
        }"#,
        )
        .unwrap();
        engine.deploy("tenant-1", &flow).unwrap();

        engine.start_call("tenant-1", "menu-timeout", "+15550100", "+15550199").unwrap();

        let summary = summary_of(&billing);
        assert_eq!(summary.reason, HangupReason::Normal);
        assert_eq!(summary.history.last().map(|h| h.node_id.as_str()), Some("hangup-default"));
        engine.shutdown();
    }

    #[test]
    fn test_all_busy_routes_to_on_all_busy() {
        let (engine, billing) = engine_with_billing();
        let flow = Flow::from_json(
            r#"{
            "id": "capped", "name": "Capped Buyer", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "buyer-1"},
            "nodes": [
                {
                    "id": "buyer-1", "type": "buyer",
                    "buyers": [{"id": "b1", "destination": "sip:b1@example.com", "maxConcurrency": 0}],
                    "onAllBusy": "hangup-busy"
                },
                {"id": "hangup-busy", "type": "hangup", "reason": "busy"}
            ]
        }"#,
        )
        .unwrap();
        engine.deploy("tenant-1", &flow).unwrap();

        engine.start_call("tenant-1", "capped", "+15550100", "+15550199").unwrap();

        let summary = summary_of(&billing);
        assert_eq!(summary.reason, HangupReason::Busy);
        assert_eq!(summary.history.last().map(|h| h.node_id.as_str()), Some("hangup-busy"));
        engine.shutdown();
    }

    #[test]
    fn test_whisper_reject_falls_back_to_backup_buyer() {
        let (engine, billing) = engine_with_billing();
        let flow = Flow::from_json(
            r#"{
            "id": "fallback-dial", "name": "Fallback Dial", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "fallback-1"},
            "nodes": [
                {
                    "id": "fallback-1", "type": "fallback",
                    "targets": ["buyer-a", "buyer-b"],
                    "onAllFailed": "hangup-failed"
                },
                {
                    "id": "buyer-a", "type": "buyer",
                    "buyers": [{"id": "b1", "destination": "sip:b1@example.com"}],
                    "next": "whisper-1"
                },
                {
                    "id": "whisper-1", "type": "whisper",
                    "calleePrompt": "Press 1 to accept", "timeout": 30,
                    "onAccept": "hangup-1", "onReject": "hangup-rejected"
                },
                {
                    "id": "buyer-b", "type": "buyer",
                    "buyers": [{"id": "b2", "destination": "sip:b2@example.com"}],
                    "next": "hangup-1"
                },
                {"id": "hangup-1", "type": "hangup", "reason": "normal"},
                {"id": "hangup-rejected", "type": "hangup", "reason": "rejected"},
                {"id": "hangup-failed", "type": "hangup", "reason": "error"}
            ]
        }"#,
        )
        .unwrap();
        engine.deploy("tenant-1", &flow).unwrap();

        let call_id = engine.start_call("tenant-1", "fallback-dial", "+15550100", "+15550199").unwrap();
        for event in [
            TelephonyEvent::CallAnswered {
                call_id: call_id.clone(),
            },
            TelephonyEvent::WhisperRejected {
                call_id: call_id.clone(),
            },
            TelephonyEvent::CallAnswered {
                call_id: call_id.clone(),
            },
        ] {
            engine.ingest(event).unwrap();
        }

        let summary = summary_of(&billing);
        assert_eq!(summary.reason, HangupReason::Normal);
        assert_eq!(summary.answered_buyer_id.as_deref(), Some("b2"));
        assert_eq!(summary.history.last().map(|h| h.node_id.as_str()), Some("hangup-1"));

        // the rejected attempt's slot was released when the fallback caught it
        assert_eq!(engine.allocator().live_concurrency("tenant-1", "buyer-a", "b1"), 0);
        assert_eq!(engine.allocator().live_concurrency("tenant-1", "buyer-b", "b2"), 0);
        engine.shutdown();
    }

    struct DenyAll;

    #[async_trait]
    impl crate::services::AdmissionGate for DenyAll {
        async fn check_admission(
            &self,
            _tenant_id: &str,
            _caller: &str,
            _buyer_id: &str,
        ) -> Result<crate::services::Admission> {
            Ok(crate::services::Admission::Denied {
                reason: "dnc".to_string(),
            })
        }
    }

    fn engine_with_deny_all() -> (Engine, flume::Receiver<CallSummary>) {
        let (tx, rx) = flume::unbounded();
        let engine = EngineBuilder::new()
            .async_worker_thread_number(2)
            .billing_emitter(Arc::new(CaptureBilling(tx)))
            .admission_gate(Arc::new(DenyAll))
            .build()
            .unwrap();
        engine.launch();
        (engine, rx)
    }

    #[test]
    fn test_admission_denial_routes_to_overflow() {
        let (engine, billing) = engine_with_deny_all();
        let flow = Flow::from_json(
            r#"{
            "id": "gated", "name": "Gated Buyer", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "buyer-1"},
            "nodes": [
                {
                    "id": "buyer-1", "type": "buyer",
                    "buyers": [{"id": "b1", "destination": "sip:b1@example.com"}],
                    "onAllBusy": "hangup-overflow"
                },
                {"id": "hangup-overflow", "type": "hangup", "reason": "busy"}
            ]
        }"#,
        )
        .unwrap();
        engine.deploy("tenant-1", &flow).unwrap();

        engine.start_call("tenant-1", "gated", "+15550100", "+15550199").unwrap();

        // the denial takes the capacity edge instead of ending the call
        let summary = summary_of(&billing);
        assert_eq!(summary.reason, HangupReason::Busy);
        assert_eq!(summary.history.last().map(|h| h.node_id.as_str()), Some("hangup-overflow"));
        assert_eq!(summary.answered_buyer_id, None);
        assert_eq!(engine.allocator().live_concurrency("tenant-1", "buyer-1", "b1"), 0);
        engine.shutdown();
    }

    #[test]
    fn test_admission_denial_without_edges_ends_call_and_frees_slot() {
        let (engine, billing) = engine_with_deny_all();
        engine.deploy("tenant-1", &flows::simple_direct_route()).unwrap();

        engine.start_call("tenant-1", "simple-direct-route", "+15550100", "+15550199").unwrap();

        let summary = summary_of(&billing);
        assert_eq!(summary.reason, HangupReason::Rejected);
        assert_eq!(summary.answered_buyer_id, None);
        // the denied reservation was released before the call ended
        assert_eq!(engine.allocator().live_concurrency("tenant-1", "buyer-1", "acme-insurance"), 0);
        engine.shutdown();
    }

    #[test]
    fn test_delay_fires_despite_stray_events() {
        let (engine, billing) = engine_with_billing();
        let flow = Flow::from_json(
            r#"{
            "id": "delayed", "name": "Delayed Hangup", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "wait-1"},
            "nodes": [
                {"id": "wait-1", "type": "timeout", "duration": 1, "next": "hangup-1"},
                {"id": "hangup-1", "type": "hangup", "reason": "normal"}
            ]
        }"#,
        )
        .unwrap();
        engine.deploy("tenant-1", &flow).unwrap();

        let call_id = engine.start_call("tenant-1", "delayed", "+15550100", "+15550199").unwrap();

        // keep poking the call with events the delay node ignores; the
        // deadline must hold regardless
        let started = std::time::Instant::now();
        let summary = loop {
            match billing.recv_timeout(Duration::from_millis(300)) {
                Ok(summary) => break summary,
                Err(_) => {
                    assert!(started.elapsed() < Duration::from_secs(3), "delay never fired");
                    let _ = engine.ingest(TelephonyEvent::DtmfReceived {
                        call_id: call_id.clone(),
                        digits: "5".to_string(),
                    });
                }
            }
        };
        assert_eq!(summary.reason, HangupReason::Normal);
        assert_eq!(summary.history.last().map(|h| h.node_id.as_str()), Some("hangup-1"));
        engine.shutdown();
    }

    #[test]
    fn test_caller_hangup_mid_queue_cleans_up() {
        let (engine, billing) = engine_with_billing();
        engine.deploy("tenant-1", &flows::ivr_dtmf()).unwrap();

        let call_id = engine.start_call("tenant-1", "ivr-dtmf", "+15550100", "+15550199").unwrap();
        engine
            .ingest(TelephonyEvent::DtmfReceived {
                call_id: call_id.clone(),
                digits: "1".to_string(),
            })
            .unwrap();
        engine
            .ingest(TelephonyEvent::CallEnded {
                call_id: call_id.clone(),
                reason: "normal".to_string(),
            })
            .unwrap();

        let summary = summary_of(&billing);
        assert_eq!(summary.reason, HangupReason::Normal);
        assert_eq!(summary.history.last().map(|h| h.node_id.as_str()), Some("queue-sales"));
        engine.shutdown();
    }

    #[test]
    fn test_start_call_requires_launch_and_deploy() {
        let (tx, _rx) = flume::unbounded();
        let engine = EngineBuilder::new()
            .async_worker_thread_number(2)
            .billing_emitter(Arc::new(CaptureBilling(tx)))
            .build()
            .unwrap();

        let err = engine.start_call("tenant-1", "nope", "+1", "+2").unwrap_err();
        assert!(matches!(err, CallflowError::Engine(_)));

        engine.launch();
        let err = engine.start_call("tenant-1", "nope", "+1", "+2").unwrap_err();
        assert!(matches!(err, CallflowError::Engine(_)));
        engine.shutdown();
    }

    #[test]
    fn test_deploy_rejects_invalid_flow() {
        let (engine, _billing) = engine_with_billing();
        let flow = Flow::from_json(
            r#"{
            "id": "broken", "name": "Broken", "version": "1.0.0",
            "entry": {"id": "entry-1", "type": "entry", "target": "tag-1"},
            "nodes": [{"id": "tag-1", "type": "tag", "tags": {}, "next": "missing"}]
        }"#,
        )
        .unwrap();

        let err = engine.deploy("tenant-1", &flow).unwrap_err();
        assert_eq!(
            err,
            CallflowError::DanglingReference {
                node_id: "tag-1".to_string(),
                target: "missing".to_string(),
            }
        );
        engine.shutdown();
    }

    #[test]
    fn test_stop_ends_a_live_call() {
        let (engine, billing) = engine_with_billing();
        engine.deploy("tenant-1", &flows::ivr_dtmf()).unwrap();

        let call_id = engine.start_call("tenant-1", "ivr-dtmf", "+15550100", "+15550199").unwrap();
        // wait until the session parks at the menu
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.stop(&call_id).is_err() {
            assert!(std::time::Instant::now() < deadline, "call never became stoppable");
            std::thread::sleep(Duration::from_millis(10));
        }

        let summary = summary_of(&billing);
        assert_eq!(summary.call_id, call_id);
        assert_eq!(summary.reason, HangupReason::Normal);
        engine.shutdown();
    }
}
