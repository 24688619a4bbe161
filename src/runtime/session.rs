//! Per-call session task.
//!
//! One `CallSession` drives one live call from its entry node to a
//! terminal outcome. The session owns the call's context exclusively and
//! is the only place that sleeps: node timers are cancellable
//! `tokio::select!` arms racing against the call's event queue and the
//! engine's shutdown signal.
//!
//! Whatever path the call exits through (hangup node, caller hangup,
//! dead end, engine shutdown), the session's cleanup runs exactly once:
//! it leaves any queue the call still waits in, releases any buyer slot
//! still held, publishes the terminal event and emits the billing
//! summary.

use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info};

use crate::{
    common::{BroadcastQueue, Queue, Shutdown},
    events::{CallEvent, EngineAction, Message, TelephonyEvent},
    model::{ExecutionPlan, HangupReason, Node, NodeId},
    runtime::{ExecutionContext, Interpreter, Step, TerminalOutcome, Transition, Wait},
    services::{BillingEmitter, CallSummary},
};

pub(crate) struct CallSession {
    ctx: ExecutionContext,
    plan: Arc<ExecutionPlan>,
    interpreter: Arc<Interpreter>,
    events: Arc<Queue<TelephonyEvent>>,
    out: Arc<BroadcastQueue<Message>>,
    billing: Arc<dyn BillingEmitter>,
    shutdown: Arc<Shutdown>,
}

impl CallSession {
    pub fn new(
        ctx: ExecutionContext,
        plan: Arc<ExecutionPlan>,
        interpreter: Arc<Interpreter>,
        events: Arc<Queue<TelephonyEvent>>,
        out: Arc<BroadcastQueue<Message>>,
        billing: Arc<dyn BillingEmitter>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            ctx,
            plan,
            interpreter,
            events,
            out,
            billing,
            shutdown,
        }
    }

    /// Run the call to its terminal outcome, then clean up.
    pub async fn run(mut self) -> TerminalOutcome {
        let outcome = self.drive().await;
        self.cleanup(&outcome).await;
        outcome
    }

    async fn drive(&mut self) -> TerminalOutcome {
        let mut next_id: NodeId = self.plan.entry_node_id.clone();

        loop {
            let Some(node) = self.plan.get(&next_id).cloned() else {
                // compiled plans are reference-checked, so this is a bug
                error!(call_id = %self.ctx.call_id, node_id = %next_id, "plan has no such node");
                return self.terminal(HangupReason::Error);
            };

            let step = match self.interpreter.enter(&mut self.ctx, &node).await {
                Ok(step) => step,
                Err(err) => {
                    error!(call_id = %self.ctx.call_id, node_id = %next_id, %err, "node execution failed");
                    Step {
                        events: Vec::new(),
                        transition: self.interpreter.finish(&mut self.ctx, HangupReason::Error),
                    }
                }
            };
            self.publish(step.events);

            // a wait can resolve into another wait at the same node, e.g.
            // a buyer answer that leaves the call bridged
            let mut transition = step.transition;
            loop {
                match transition {
                    Transition::Advance(id) => {
                        next_id = id;
                        break;
                    }
                    Transition::Terminal(reason) => return self.terminal(reason),
                    Transition::Wait(wait) => transition = self.wait_at(&node, wait).await,
                }
            }
        }
    }

    /// Park at a waiting node until an event, the node's timer or
    /// shutdown resolves it. The deadline is fixed when the wait starts;
    /// only IVR digit collection re-arms it (inter-digit timeout).
    async fn wait_at(
        &mut self,
        node: &Node,
        wait: Wait,
    ) -> Transition {
        let timeout = match &wait {
            Wait::Ivr {
                timeout,
            }
            | Wait::Queue {
                timeout,
            }
            | Wait::Whisper {
                timeout,
            } => *timeout,
            Wait::Delay {
                duration,
            } => Some(*duration),
            Wait::Record | Wait::Dialing | Wait::Bridged => None,
        };
        let inter_digit = matches!(wait, Wait::Ivr { .. });
        let mut deadline = deadline_after(timeout);

        loop {
            tokio::select! {
                _ = self.shutdown.wait() => {
                    info!(call_id = %self.ctx.call_id, "engine shutdown while call active");
                    return Transition::Terminal(HangupReason::Error);
                }
                event = self.events.next_async() => {
                    let Some(event) = event else {
                        // engine side of the queue dropped
                        return Transition::Terminal(HangupReason::Error);
                    };
                    if let TelephonyEvent::CallEnded { reason, .. } = &event {
                        // the leg is gone; no fallback can continue routing
                        return Transition::Terminal(reason.parse().unwrap_or(HangupReason::Normal));
                    }
                    let digit = matches!(event, TelephonyEvent::DtmfReceived { .. });
                    match self.interpreter.on_event(&mut self.ctx, node, &event) {
                        Ok(None) => {
                            if inter_digit && digit {
                                deadline = deadline_after(timeout);
                            }
                            continue;
                        }
                        Ok(Some(step)) => {
                            self.publish(step.events);
                            return step.transition;
                        }
                        Err(err) => {
                            error!(call_id = %self.ctx.call_id, %err, "event handling failed");
                            return self.interpreter.finish(&mut self.ctx, HangupReason::Error);
                        }
                    }
                }
                _ = timer_until(deadline) => {
                    debug!(call_id = %self.ctx.call_id, node_id = %self.ctx.current_node_id, "node timer expired");
                    match self.interpreter.on_timer(&mut self.ctx, node) {
                        Ok(step) => {
                            self.publish(step.events);
                            return step.transition;
                        }
                        Err(err) => {
                            error!(call_id = %self.ctx.call_id, %err, "timer handling failed");
                            return self.interpreter.finish(&mut self.ctx, HangupReason::Error);
                        }
                    }
                }
            }
        }
    }

    fn terminal(
        &self,
        reason: HangupReason,
    ) -> TerminalOutcome {
        TerminalOutcome {
            node_id: self.ctx.current_node_id.clone(),
            reason,
        }
    }

    async fn cleanup(
        &mut self,
        outcome: &TerminalOutcome,
    ) {
        if let Some(queue_id) = self.ctx.waiting_in_queue.take() {
            self.interpreter.queues().leave(&self.ctx.tenant_id, &queue_id);
        }
        if let Some(reservation) = self.ctx.reservation.take() {
            self.interpreter.allocator().release(&reservation);
        }

        self.publish(vec![CallEvent::Action(EngineAction::Hangup {
            reason: outcome.reason,
        })]);
        self.publish(vec![CallEvent::Terminated {
            reason: outcome.reason,
        }]);

        let summary = CallSummary {
            call_id: self.ctx.call_id.clone(),
            tenant_id: self.ctx.tenant_id.clone(),
            flow_id: self.ctx.flow_id.clone(),
            flow_version: self.ctx.flow_version.clone(),
            duration_ms: self.ctx.duration_ms(),
            answered_buyer_id: self.ctx.answered_buyer_id.clone(),
            recorded: self.ctx.recording_url.is_some(),
            reason: outcome.reason,
            tags: self.ctx.tags.clone(),
            history: self.ctx.history.clone(),
        };
        if let Err(err) = self.billing.emit(summary).await {
            error!(call_id = %self.ctx.call_id, %err, "billing emission failed");
        }
    }

    fn publish(
        &self,
        events: Vec<CallEvent>,
    ) {
        for event in events {
            let _ = self.out.send(Message {
                call_id: self.ctx.call_id.clone(),
                node_id: self.ctx.current_node_id.clone(),
                event,
            });
        }
    }
}

fn deadline_after(timeout: Option<u64>) -> Option<tokio::time::Instant> {
    timeout.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs))
}

fn timer_until(deadline: Option<tokio::time::Instant>) -> futures::future::BoxFuture<'static, ()> {
    match deadline {
        Some(at) => Box::pin(tokio::time::sleep_until(at)),
        None => Box::pin(std::future::pending()),
    }
}
