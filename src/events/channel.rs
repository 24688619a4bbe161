use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tokio::runtime::Runtime;

use crate::{
    ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::Message,
};

macro_rules! dispatch_event {
    ($handles:expr, $(&$item:ident), +) => {
        let handlers = $handles.read().unwrap();
        for handle in handlers.iter() {
            (handle)($(&$item),+);
        }
    };
}

macro_rules! dispatch_event_async {
    ($handles:expr, $(&$item:ident), +) => {
        let handles = $handles.clone();

        tokio::spawn(async move {
            let handlers = handles.read().unwrap().clone();
            for handle in handlers.iter() {
                (handle)($(&$item),+).await;
            }
        });
    };
}

const EVENT_QUEUE_SIZE: usize = 2048;

pub type CallEventHandle = Arc<dyn Fn(&Message) + Send + Sync>;
pub type CallEventHandleAsync = Arc<dyn Fn(&Message) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// use the glob pattern to match the call id
    /// eg. call1*
    pub call_id: String,

    /// use the glob pattern to match the node id
    /// eg. buyer-*
    pub node_id: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            call_id: "*".to_string(),
            node_id: "*".to_string(),
        }
    }
}

#[allow(unused)]
impl ChannelOptions {
    pub fn new(
        call_id: String,
        node_id: String,
    ) -> Self {
        Self {
            call_id,
            node_id,
        }
    }

    pub fn with_call_id(call_id: String) -> Self {
        Self {
            call_id,
            node_id: "*".to_string(),
        }
    }

    pub fn with_node_id(node_id: String) -> Self {
        Self {
            call_id: "*".to_string(),
            node_id,
        }
    }
}

/// Broadcast channel for engine-emitted call events.
///
/// Subscribers register handlers through [`ChannelEvent`]; a background
/// task fans events out to every matching handler.
#[derive(Clone)]
pub struct Channel {
    event_queue: Arc<BroadcastQueue<Message>>,

    events: ShareLock<Vec<CallEventHandle>>,
    events_async: ShareLock<Vec<CallEventHandleAsync>>,

    runtime: Arc<Runtime>,
    shutdown: Arc<Shutdown>,
}

impl Channel {
    pub(crate) fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            event_queue: BroadcastQueue::new(EVENT_QUEUE_SIZE),
            events: Arc::new(RwLock::new(Vec::new())),
            events_async: Arc::new(RwLock::new(Vec::new())),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub(crate) fn event_queue(&self) -> Arc<BroadcastQueue<Message>> {
        self.event_queue.clone()
    }

    pub(crate) fn listen(&self) {
        let mut event_queue = self.event_queue.subscribe();
        let events = self.events.clone();
        let events_async = self.events_async.clone();

        let shutdown = self.shutdown.clone();
        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    Ok(e) = event_queue.recv() => {
                        let evt = e.clone();
                        dispatch_event!(events, &evt);
                        dispatch_event_async!(events_async, &e);
                    }
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

/// Glob-filtered subscription handle over a [`Channel`].
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    glob: (globset::GlobMatcher, globset::GlobMatcher),
}

#[allow(unused)]
impl ChannelEvent {
    /// Panics if either pattern in `options` is not a valid glob.
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Self {
        Self {
            channel,
            glob: (
                globset::Glob::new(&options.call_id).unwrap().compile_matcher(),
                globset::Glob::new(&options.node_id).unwrap().compile_matcher(),
            ),
        }
    }

    /// fires when a matching call reaches a terminal state
    pub fn on_terminated(
        &self,
        f: impl Fn(&Message) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if e.event.is_terminated() && is_match(&glob, e) {
                f(e);
            }
        }));
    }

    /// fires on every matching event
    pub fn on_event(
        &self,
        f: impl Fn(&Message) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if is_match(&glob, e) {
                f(e);
            }
        }));
    }

    pub fn on_event_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Message) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let glob = self.glob.clone();

        self.channel.events_async.write().unwrap().push(Arc::new(move |e| {
            if is_match(&glob, e) {
                f(e)
            } else {
                Box::pin(async {})
            }
        }));
    }
}

fn is_match(
    glob: &(globset::GlobMatcher, globset::GlobMatcher),
    e: &Message,
) -> bool {
    let (pat_call, pat_node) = glob;
    pat_call.is_match(&e.call_id) && pat_node.is_match(&e.node_id)
}
