//! Callback dispatch on a single affinity executor.
//!
//! Developer handlers are only ever invoked from the [`AffinityLoop`]. The
//! host either drives that loop on its designated thread
//! ([`AffinityLoop::run_blocking`]) or lets [`CallbackDispatcher::spawn`] run
//! it as a task on the current runtime.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use push_core::{OpenedResult, ReceivedNotification};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::PipelineError;

/// Handler for notifications received while the app is running.
pub type ReceivedHandler = Box<dyn FnMut(ReceivedNotification) + Send + 'static>;

/// Handler for notifications opened by the user.
pub type OpenedHandler = Box<dyn FnMut(OpenedResult) + Send + 'static>;

enum Command {
    Received(ReceivedNotification),
    Opened(OpenedResult),
    SetReceivedHandler(Option<ReceivedHandler>),
    SetOpenedHandler(Option<OpenedHandler>),
    Flush(oneshot::Sender<()>),
}

/// Handle for delivering events to developer handlers.
#[derive(Debug, Clone)]
pub struct CallbackDispatcher {
    tx: mpsc::UnboundedSender<Command>,
}

impl CallbackDispatcher {
    /// Create a dispatcher and the loop that must be driven to deliver its events.
    pub fn new() -> (Self, AffinityLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        let affinity = AffinityLoop {
            rx,
            received_handler: None,
            opened_handler: None,
            pending_opened: VecDeque::new(),
        };
        (Self { tx }, affinity)
    }

    /// Create a dispatcher whose loop runs as a task on the current runtime.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (dispatcher, affinity) = Self::new();
        let handle = tokio::spawn(affinity.run());
        (dispatcher, handle)
    }

    /// Deliver a received event. Dropped when no received handler is set.
    pub fn deliver_received(&self, event: ReceivedNotification) {
        self.send(Command::Received(event));
    }

    /// Deliver an opened event. Queued until an opened handler is set.
    pub fn deliver_opened(&self, event: OpenedResult) {
        self.send(Command::Opened(event));
    }

    /// Install the received handler, replacing any previous one.
    pub fn set_received_handler<F>(&self, handler: F)
    where
        F: FnMut(ReceivedNotification) + Send + 'static,
    {
        self.send(Command::SetReceivedHandler(Some(Box::new(handler))));
    }

    /// Install the opened handler and replay queued opened events in order.
    pub fn set_opened_handler<F>(&self, handler: F)
    where
        F: FnMut(OpenedResult) + Send + 'static,
    {
        self.send(Command::SetOpenedHandler(Some(Box::new(handler))));
    }

    /// Remove both handlers.
    pub fn clear_handlers(&self) {
        self.send(Command::SetReceivedHandler(None));
        self.send(Command::SetOpenedHandler(None));
    }

    /// Wait until every command sent before this call has been handled.
    pub async fn flush(&self) -> Result<(), PipelineError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(done_tx))
            .map_err(|_| PipelineError::DispatcherClosed)?;
        done_rx.await.map_err(|_| PipelineError::DispatcherClosed)
    }

    /// Whether the affinity loop is still running.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!("Callback loop closed, event discarded");
        }
    }
}

/// The executor that owns the handlers and invokes them.
pub struct AffinityLoop {
    rx: mpsc::UnboundedReceiver<Command>,
    received_handler: Option<ReceivedHandler>,
    opened_handler: Option<OpenedHandler>,
    pending_opened: VecDeque<OpenedResult>,
}

impl AffinityLoop {
    /// Run until every [`CallbackDispatcher`] handle is dropped.
    pub async fn run(mut self) {
        info!("Callback loop started");
        while let Some(command) = self.rx.recv().await {
            self.handle(command);
        }
        info!("Callback loop stopped");
    }

    /// Run on the calling thread, blocking it.
    ///
    /// Must not be called from inside an async context.
    pub fn run_blocking(mut self) {
        info!("Callback loop started on host thread");
        while let Some(command) = self.rx.blocking_recv() {
            self.handle(command);
        }
        info!("Callback loop stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Received(event) => match self.received_handler.as_mut() {
                Some(handler) => invoke("received", handler, event),
                None => debug!("No received handler set, dropping event"),
            },
            Command::Opened(event) => match self.opened_handler.as_mut() {
                Some(handler) => invoke("opened", handler, event),
                None => {
                    debug!(
                        "No opened handler set, queueing event ({} pending)",
                        self.pending_opened.len() + 1
                    );
                    self.pending_opened.push_back(event);
                }
            },
            Command::SetReceivedHandler(handler) => {
                self.received_handler = handler;
            }
            Command::SetOpenedHandler(handler) => {
                self.opened_handler = handler;
                if let Some(handler) = self.opened_handler.as_mut() {
                    while let Some(event) = self.pending_opened.pop_front() {
                        invoke("opened", handler, event);
                    }
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn invoke<E>(kind: &str, handler: &mut Box<dyn FnMut(E) + Send + 'static>, event: E) {
    if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
        error!("The {} handler panicked", kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use push_core::{DisplayType, NotificationAction, PresentationNotification};

    fn opened(id: &str) -> OpenedResult {
        OpenedResult {
            notification: received(id),
            action: NotificationAction::from_selected(None),
        }
    }

    fn received(id: &str) -> ReceivedNotification {
        ReceivedNotification {
            presentation_id: Some(1),
            payload: PresentationNotification {
                notification_id: Some(id.to_string()),
                ..Default::default()
            },
            grouped_notifications: Vec::new(),
            shown: true,
            is_app_in_focus: false,
            display_type: DisplayType::Notification,
        }
    }

    fn id_of(event: &OpenedResult) -> String {
        event.notification.payload.notification_id.clone().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_opened_replayed_in_order() {
        let (dispatcher, _handle) = CallbackDispatcher::spawn();
        dispatcher.deliver_opened(opened("a"));
        dispatcher.deliver_opened(opened("b"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher.set_opened_handler(move |event| sink.lock().unwrap().push(id_of(&event)));
        dispatcher.deliver_opened(opened("c"));
        dispatcher.flush().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_opened_not_replayed_twice() {
        let (dispatcher, _handle) = CallbackDispatcher::spawn();
        dispatcher.deliver_opened(opened("a"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher.set_opened_handler(move |event| sink.lock().unwrap().push(id_of(&event)));
        let sink = seen.clone();
        dispatcher.set_opened_handler(move |event| sink.lock().unwrap().push(id_of(&event)));
        dispatcher.flush().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_received_dropped_without_handler() {
        let (dispatcher, _handle) = CallbackDispatcher::spawn();
        dispatcher.deliver_received(received("early"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        dispatcher.set_received_handler(move |event| {
            sink.lock()
                .unwrap()
                .push(event.payload.notification_id.unwrap_or_default())
        });
        dispatcher.deliver_received(received("late"));
        dispatcher.flush().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["late"]);
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let (dispatcher, _handle) = CallbackDispatcher::spawn();

        let count = Arc::new(Mutex::new(0));
        let sink = count.clone();
        dispatcher.set_received_handler(move |event| {
            if event.payload.notification_id.as_deref() == Some("boom") {
                panic!("handler failure");
            }
            *sink.lock().unwrap() += 1;
        });

        dispatcher.deliver_received(received("boom"));
        dispatcher.deliver_received(received("ok"));
        dispatcher.flush().await.unwrap();

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(dispatcher.is_open());
    }

    #[test]
    fn test_run_blocking_on_host_thread() {
        let (dispatcher, affinity) = CallbackDispatcher::new();
        let host = std::thread::spawn(move || affinity.run_blocking());

        let handler_thread = Arc::new(Mutex::new(None));
        let sink = handler_thread.clone();
        dispatcher.set_opened_handler(move |_| {
            *sink.lock().unwrap() = Some(std::thread::current().id());
        });
        dispatcher.deliver_opened(opened("x"));

        let host_id = host.thread().id();
        drop(dispatcher);
        host.join().unwrap();

        assert_eq!(*handler_thread.lock().unwrap(), Some(host_id));
    }
}
