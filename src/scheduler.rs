//! The client-side event-delivery scheduler collaborator (§6.2, §9). Maps
//! whatever UI change-detection zone a real frontend couples message
//! delivery to; protocol work never runs on it, only the final hop of
//! handing a decoded message to the application does.

/// A caller-supplied hop for delivering decoded messages. Headless targets
/// use `NoopScheduler`, which runs `fn` inline.
pub trait EventScheduler: Send + Sync {
    fn run_on_ui_scheduler(&self, f: Box<dyn FnOnce() + Send>);
}

/// The default scheduler for headless targets: delivery happens inline,
/// on whichever task polled the response stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl EventScheduler for NoopScheduler {
    fn run_on_ui_scheduler(&self, f: Box<dyn FnOnce() + Send>) {
        f();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn noop_scheduler_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let scheduler = NoopScheduler;
        let ran_clone = ran.clone();
        scheduler.run_on_ui_scheduler(Box::new(move || {
            ran_clone.store(true, Ordering::SeqCst);
        }));
        assert!(ran.load(Ordering::SeqCst));
    }
}
