//! Connects a [`PushClient`] to the engine.

use ops_push::{EventKind, HandlerId, PushClient};
use tokio::task::JoinHandle;

use crate::engine::EngineHandle;

/// Handles registered on the push client plus the state relay task.
pub struct PushBridge {
    pub handlers: Vec<HandlerId>,
    pub relay: JoinHandle<()>,
}

impl PushBridge {
    /// Remove the handlers and stop relaying connection state.
    pub fn detach(self, push: &PushClient) {
        for id in self.handlers {
            push.off(id);
        }
        self.relay.abort();
    }
}

/// Route every push event into the engine and mirror the connection state.
///
/// Must be called from within a tokio runtime.
pub fn attach_push(push: &PushClient, engine: &EngineHandle) -> PushBridge {
    let mut handlers = Vec::with_capacity(2);

    let h = engine.clone();
    handlers.push(push.on_any(move |ev| {
        h.ingest_push(ev.kind.as_str(), ev.data.clone());
    }));

    let h = engine.clone();
    handlers.push(push.on(EventKind::MaxReconnectAttemptsReached, move |_| {
        h.push_stalled();
    }));

    let mut state_rx = push.watch_state();
    let h = engine.clone();
    let relay = tokio::spawn(async move {
        loop {
            let state = *state_rx.borrow_and_update();
            if !h.set_connection(state) {
                break;
            }
            if state_rx.changed().await.is_err() {
                break;
            }
        }
    });

    PushBridge { handlers, relay }
}
