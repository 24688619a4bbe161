//! Node step semantics.
//!
//! The interpreter decides, for one call at one node, what to emit and
//! where to go next. It never sleeps and never blocks on the wire; the
//! session task owns timers and event delivery and feeds results back in
//! through [`Interpreter::on_event`] / [`Interpreter::on_timer`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    Result,
    events::{CallEvent, EngineAction, TelephonyEvent},
    expr,
    model::{HangupReason, IvrNode, Node, NodeId},
    queueing::QueueRegistry,
    rotation::{RotationAllocator, RotationDecision},
    runtime::context::{ExecutionContext, FallbackFrame},
    services::{Admission, AdmissionGate, BuyerDirectory},
};

/// What the session should do after the interpreter ran.
pub(crate) enum Transition {
    /// move to this node immediately
    Advance(NodeId),
    /// stay at the current node until an event or timer fires
    Wait(Wait),
    /// the call is over
    Terminal(HangupReason),
}

/// What the current node is waiting for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Wait {
    /// DTMF digits; the timer re-arms after each digit
    Ivr {
        timeout: Option<u64>,
    },
    /// agent connect or queue timeout
    Queue {
        timeout: Option<u64>,
    },
    /// recording completion or failure
    Record,
    /// callee accept or reject; a timeout counts as reject
    Whisper {
        timeout: Option<u64>,
    },
    /// buyer leg answer
    Dialing,
    /// bridged; nothing left to route until the call ends
    Bridged,
    /// pure delay
    Delay {
        duration: u64,
    },
}

/// Result of one interpreter step: events to publish, then a transition.
pub(crate) struct Step {
    pub events: Vec<CallEvent>,
    pub transition: Transition,
}

impl Step {
    fn new(transition: Transition) -> Self {
        Self {
            events: Vec::new(),
            transition,
        }
    }

    fn with(
        mut self,
        event: CallEvent,
    ) -> Self {
        self.events.push(event);
        self
    }
}

/// Stateless node-semantics executor shared by all sessions.
pub(crate) struct Interpreter {
    allocator: Arc<RotationAllocator>,
    queues: QueueRegistry,
    directory: Arc<dyn BuyerDirectory>,
    admission: Arc<dyn AdmissionGate>,
    /// applied to ivr nodes that don't set their own timeout
    default_ivr_timeout: u64,
}

impl Interpreter {
    pub fn new(
        allocator: Arc<RotationAllocator>,
        queues: QueueRegistry,
        directory: Arc<dyn BuyerDirectory>,
        admission: Arc<dyn AdmissionGate>,
        default_ivr_timeout: u64,
    ) -> Self {
        Self {
            allocator,
            queues,
            directory,
            admission,
            default_ivr_timeout,
        }
    }

    pub fn queues(&self) -> &QueueRegistry {
        &self.queues
    }

    pub fn allocator(&self) -> &Arc<RotationAllocator> {
        &self.allocator
    }

    /// Enter a node: record the visit, emit its actions and decide the
    /// transition.
    pub async fn enter(
        &self,
        ctx: &mut ExecutionContext,
        node: &Node,
    ) -> Result<Step> {
        ctx.visit(node);
        let entered = CallEvent::NodeEntered {
            node_type: node.type_name().to_string(),
        };

        let step = match node {
            Node::Entry(n) => Step::new(Transition::Advance(n.target.clone())),
            Node::Ivr(n) => {
                ctx.ivr_buffer.clear();
                Step::new(Transition::Wait(Wait::Ivr {
                    timeout: Some(n.timeout.unwrap_or(self.default_ivr_timeout)),
                }))
                .with(CallEvent::Action(EngineAction::Play {
                    url: n.prompt.clone(),
                }))
            }
            Node::If(n) => match expr::evaluate(&n.condition, &ctx.variables) {
                Ok(true) => Step::new(Transition::Advance(n.then.clone())),
                Ok(false) => {
                    let target = n.else_.as_ref().or(n.next.as_ref());
                    Step::new(self.edge_or_fail(ctx, target, HangupReason::Error))
                }
                Err(err) => {
                    warn!(call_id = %ctx.call_id, node_id = %n.id, %err, "condition evaluation failed");
                    Step::new(self.finish(ctx, HangupReason::Error))
                }
            },
            Node::Queue(n) => {
                if self.queues.try_join(&ctx.tenant_id, &n.queue_id, n.max_size) {
                    ctx.waiting_in_queue = Some(n.queue_id.clone());
                    Step::new(Transition::Wait(Wait::Queue {
                        timeout: n.timeout,
                    }))
                    .with(CallEvent::Action(EngineAction::QueueJoin {
                        queue_id: n.queue_id.clone(),
                        wait_url: n.wait_url.clone(),
                        timeout: n.timeout,
                        max_size: n.max_size,
                    }))
                } else {
                    let target = n.on_full.as_ref();
                    Step::new(self.edge_or_fail(ctx, target, HangupReason::Busy))
                }
            }
            Node::Buyer(n) => {
                let targets = self.directory.resolve(&ctx.tenant_id, n).await?;
                match self.allocator.reserve(&ctx.tenant_id, &n.id, n.strategy, &targets) {
                    RotationDecision::NoBuyers => {
                        let target = n.on_no_buyers.as_ref();
                        Step::new(self.edge_or_fail(ctx, target, HangupReason::Error)).with(CallEvent::NoBuyers)
                    }
                    RotationDecision::AllBusy => {
                        let target = n.on_all_busy.as_ref();
                        Step::new(self.edge_or_fail(ctx, target, HangupReason::Busy)).with(CallEvent::AllBusy)
                    }
                    RotationDecision::Reserved(reservation) => {
                        let caller = ctx
                            .variables
                            .get_path("caller.number")
                            .and_then(|v| v.as_str().map(str::to_string))
                            .unwrap_or_default();
                        match self.admission.check_admission(&ctx.tenant_id, &caller, &reservation.buyer_id).await? {
                            Admission::Allowed => {
                                let step = Step::new(Transition::Wait(Wait::Dialing))
                                    .with(CallEvent::BuyerReserved {
                                        buyer_id: reservation.buyer_id.clone(),
                                        destination: reservation.destination.clone(),
                                    })
                                    .with(CallEvent::Action(EngineAction::DialBuyer {
                                        buyer_id: reservation.buyer_id.clone(),
                                        destination: reservation.destination.clone(),
                                    }));
                                ctx.reservation = Some(reservation);
                                step
                            }
                            Admission::Denied {
                                reason,
                            } => {
                                self.allocator.release(&reservation);
                                // a denial routes like a capacity miss so
                                // overflow edges still apply; the event
                                // keeps the real cause
                                let target = n.on_all_busy.as_ref().or(n.on_no_buyers.as_ref());
                                Step::new(self.edge_or_fail(ctx, target, HangupReason::Rejected)).with(CallEvent::AdmissionDenied {
                                    reason,
                                })
                            }
                        }
                    }
                }
            }
            Node::Record(n) => Step::new(Transition::Wait(Wait::Record)).with(CallEvent::Action(EngineAction::RecordStart {
                format: n.format,
                channels: n.channels,
                beep: n.beep,
            })),
            Node::Tag(n) => {
                ctx.tags.merge(&n.tags);
                Step::new(self.edge_or_fail(ctx, n.next.as_ref(), HangupReason::Error))
            }
            Node::Whisper(n) => Step::new(Transition::Wait(Wait::Whisper {
                timeout: n.timeout,
            }))
            .with(CallEvent::Action(EngineAction::WhisperStart {
                caller_prompt: n.caller_prompt.clone(),
                callee_prompt: n.callee_prompt.clone(),
                timeout: n.timeout,
            })),
            Node::Timeout(n) => Step::new(Transition::Wait(Wait::Delay {
                duration: n.duration,
            })),
            Node::Fallback(n) => {
                if n.targets.is_empty() {
                    let target = n.on_all_failed.as_ref();
                    Step::new(self.edge_or_fail(ctx, target, HangupReason::Error))
                } else {
                    ctx.fallback_frames.push(FallbackFrame {
                        targets: n.targets.clone(),
                        attempt: 0,
                        on_all_failed: n.on_all_failed.clone(),
                    });
                    Step::new(Transition::Advance(n.targets[0].clone()))
                }
            }
            Node::Hangup(n) => Step::new(self.finish(ctx, n.reason)),
        };

        let mut events = vec![entered];
        events.extend(step.events);
        Ok(Step {
            events,
            transition: step.transition,
        })
    }

    /// React to a telephony event while the node waits. `None` keeps
    /// waiting (the timer re-arms).
    pub fn on_event(
        &self,
        ctx: &mut ExecutionContext,
        node: &Node,
        event: &TelephonyEvent,
    ) -> Result<Option<Step>> {
        let step = match (node, event) {
            (
                Node::Ivr(n),
                TelephonyEvent::DtmfReceived {
                    digits,
                    ..
                },
            ) => {
                ctx.ivr_buffer.push_str(digits);
                if let Some(key) = &n.finish_on_key
                    && let Some(at) = ctx.ivr_buffer.find(key.as_str())
                {
                    ctx.ivr_buffer.truncate(at);
                    Some(self.ivr_select(ctx, n))
                } else if let Some(max) = n.max_digits
                    && ctx.ivr_buffer.chars().count() >= max
                {
                    let keep: String = ctx.ivr_buffer.chars().take(max).collect();
                    ctx.ivr_buffer = keep;
                    Some(self.ivr_select(ctx, n))
                } else {
                    None
                }
            }
            (
                Node::Queue(n),
                TelephonyEvent::QueueConnected {
                    agent_id,
                    ..
                },
            ) => {
                self.queues.leave(&ctx.tenant_id, &n.queue_id);
                ctx.waiting_in_queue = None;
                // nested so conditions can read `agent.id`
                ctx.variables.set("agent", serde_json::json!({"id": agent_id}));
                let target = n.on_connect.as_ref().or(n.next.as_ref());
                match target {
                    Some(target) => Some(Step::new(Transition::Advance(target.clone()))),
                    None => Some(Step::new(Transition::Wait(Wait::Bridged))),
                }
            }
            (Node::Queue(n), TelephonyEvent::QueueTimeout { .. }) => {
                self.queues.leave(&ctx.tenant_id, &n.queue_id);
                ctx.waiting_in_queue = None;
                let target = n.on_timeout.as_ref();
                Some(Step::new(self.edge_or_fail(ctx, target, HangupReason::Timeout)))
            }
            (Node::Buyer(n), TelephonyEvent::CallAnswered { .. }) => {
                if let Some(reservation) = &ctx.reservation {
                    ctx.answered_buyer_id = Some(reservation.buyer_id.clone());
                }
                match n.next.as_ref() {
                    Some(target) => Some(Step::new(Transition::Advance(target.clone()))),
                    None => Some(Step::new(Transition::Wait(Wait::Bridged))),
                }
            }
            (
                Node::Record(n),
                TelephonyEvent::RecordingCompleted {
                    url,
                    ..
                },
            ) => {
                ctx.recording_url = Some(url.clone());
                let target = n.on_complete.as_ref().or(n.next.as_ref());
                Some(Step::new(self.edge_or_fail(ctx, target, HangupReason::Error)))
            }
            (
                Node::Record(n),
                TelephonyEvent::RecordingFailed {
                    error,
                    ..
                },
            ) => {
                warn!(call_id = %ctx.call_id, node_id = %n.id, %error, "recording failed");
                let target = n.on_error.as_ref();
                Some(Step::new(self.edge_or_fail(ctx, target, HangupReason::Error)))
            }
            (Node::Whisper(n), TelephonyEvent::WhisperAccepted { .. }) => {
                let target = n.on_accept.as_ref().or(n.next.as_ref());
                Some(Step::new(self.edge_or_fail(ctx, target, HangupReason::Error)))
            }
            (Node::Whisper(n), TelephonyEvent::WhisperRejected { .. }) => Some(self.whisper_reject(ctx, n)),
            _ => {
                debug!(
                    call_id = %ctx.call_id,
                    node_id = %ctx.current_node_id,
                    event = event.type_name(),
                    "event not applicable at current node, ignoring"
                );
                None
            }
        };
        Ok(step)
    }

    /// React to the current wait's timer expiring.
    pub fn on_timer(
        &self,
        ctx: &mut ExecutionContext,
        node: &Node,
    ) -> Result<Step> {
        let step = match node {
            Node::Ivr(n) => {
                if ctx.ivr_buffer.is_empty() {
                    match n.default.as_ref() {
                        Some(target) => Step::new(Transition::Advance(target.clone())),
                        None => Step::new(self.finish(ctx, HangupReason::Timeout)),
                    }
                } else {
                    // partial input counts as the final input
                    self.ivr_select(ctx, n)
                }
            }
            Node::Queue(n) => {
                self.queues.leave(&ctx.tenant_id, &n.queue_id);
                ctx.waiting_in_queue = None;
                let target = n.on_timeout.as_ref();
                Step::new(self.edge_or_fail(ctx, target, HangupReason::Timeout))
            }
            Node::Whisper(n) => self.whisper_reject(ctx, n),
            Node::Timeout(n) => Step::new(self.edge_or_fail(ctx, n.next.as_ref(), HangupReason::Error)),
            _ => Step::new(self.finish(ctx, HangupReason::Timeout)),
        };
        Ok(step)
    }

    /// Match the collected digits against the menu choices, exactly.
    fn ivr_select(
        &self,
        ctx: &mut ExecutionContext,
        node: &IvrNode,
    ) -> Step {
        let input = ctx.ivr_buffer.clone();
        ctx.variables.set("ivr", serde_json::json!({"input": input}));
        match node.choices.iter().find(|c| c.digits == input) {
            Some(choice) => Step::new(Transition::Advance(choice.target.clone())),
            None => {
                let target = node.default.as_ref();
                Step::new(self.edge_or_fail(ctx, target, HangupReason::Error))
            }
        }
    }

    /// Reject also covers whisper timeouts.
    fn whisper_reject(
        &self,
        ctx: &mut ExecutionContext,
        node: &crate::model::WhisperNode,
    ) -> Step {
        let target = node.on_reject.as_ref();
        Step::new(self.edge_or_fail(ctx, target, HangupReason::Rejected))
    }

    /// Follow an optional edge, or end the call with `reason`.
    fn edge_or_fail(
        &self,
        ctx: &mut ExecutionContext,
        target: Option<&NodeId>,
        reason: HangupReason,
    ) -> Transition {
        match target {
            Some(target) => Transition::Advance(target.clone()),
            None => self.finish(ctx, reason),
        }
    }

    /// Terminate with `reason`, unless a fallback scope catches the
    /// failure. A caught failure releases the attempt's buyer slot before
    /// the next target runs.
    pub(crate) fn finish(
        &self,
        ctx: &mut ExecutionContext,
        reason: HangupReason,
    ) -> Transition {
        if reason.is_failure()
            && let Some(next) = ctx.catch_failure()
        {
            if let Some(reservation) = ctx.reservation.take() {
                self.allocator.release(&reservation);
            }
            debug!(call_id = %ctx.call_id, reason = reason.as_ref(), target = %next, "fallback caught failed attempt");
            return Transition::Advance(next);
        }
        Transition::Terminal(reason)
    }
}
