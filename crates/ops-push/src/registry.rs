//! Handler registry.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::frame::{EventKind, PushEvent};

pub type Handler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Returned by registration; pass to [`PushClient::off`][crate::PushClient::off].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Clone)]
enum Filter {
    Kind(EventKind),
    /// Every wire event; lifecycle events are not included.
    Any,
}

#[derive(Default)]
pub(crate) struct Registry {
    next: u64,
    entries: Vec<(HandlerId, Filter, Handler)>,
}

impl Registry {
    pub(crate) fn on(&mut self, kind: EventKind, handler: Handler) -> HandlerId {
        self.add(Filter::Kind(kind), handler)
    }

    pub(crate) fn on_any(&mut self, handler: Handler) -> HandlerId {
        self.add(Filter::Any, handler)
    }

    fn add(&mut self, filter: Filter, handler: Handler) -> HandlerId {
        self.next += 1;
        let id = HandlerId(self.next);
        self.entries.push((id, filter, handler));
        id
    }

    pub(crate) fn off(&mut self, id: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(h, _, _)| *h != id);
        self.entries.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Handlers for `kind`, in registration order.
    pub(crate) fn matching(&self, kind: &EventKind) -> Vec<Handler> {
        self.entries
            .iter()
            .filter(|(_, f, _)| match f {
                Filter::Kind(k) => k == kind,
                Filter::Any => !kind.is_lifecycle(),
            })
            .map(|(_, _, h)| Arc::clone(h))
            .collect()
    }
}

/// Run every handler, isolating panics. Returns the number that panicked.
pub(crate) fn invoke_all(handlers: &[Handler], event: &PushEvent) -> usize {
    let mut panicked = 0;
    for h in handlers {
        if catch_unwind(AssertUnwindSafe(|| h(event))).is_err() {
            panicked += 1;
            error!(kind = %event.kind, "push handler panicked; continuing with remaining handlers");
        }
    }
    panicked
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let c = Arc::new(AtomicUsize::new(0));
        let c2 = Arc::clone(&c);
        (
            c,
            Arc::new(move |_: &PushEvent| {
                c2.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn event(kind: EventKind) -> PushEvent {
        PushEvent::lifecycle(kind, chrono::Utc::now())
    }

    #[test]
    fn kind_and_wildcard_handlers_both_fire() {
        let mut r = Registry::default();
        let (a, ha) = counter();
        let (b, hb) = counter();
        r.on(EventKind::OrderUpdate, ha);
        r.on_any(hb);

        invoke_all(&r.matching(&EventKind::OrderUpdate), &event(EventKind::OrderUpdate));
        invoke_all(&r.matching(&EventKind::NewOrder), &event(EventKind::NewOrder));

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wildcard_skips_lifecycle() {
        let mut r = Registry::default();
        let (_, h) = counter();
        r.on_any(h);
        assert!(r.matching(&EventKind::Connected).is_empty());
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let mut r = Registry::default();
        r.on(EventKind::NewOrder, Arc::new(|_: &PushEvent| panic!("boom")));
        let (c, h) = counter();
        r.on(EventKind::NewOrder, h);

        let panicked = invoke_all(&r.matching(&EventKind::NewOrder), &event(EventKind::NewOrder));
        assert_eq!(panicked, 1);
        assert_eq!(c.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn off_removes_only_that_handler() {
        let mut r = Registry::default();
        let (_, h1) = counter();
        let (_, h2) = counter();
        let id = r.on(EventKind::NewOrder, h1);
        r.on(EventKind::NewOrder, h2);
        assert!(r.off(id));
        assert!(!r.off(id));
        assert_eq!(r.len(), 1);
    }
}
