use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::channel::Channel;
use crate::history::HistoryRecorder;
use crate::logging::{TracingLogger, TransferLogger};
use crate::session::{SessionConfig, SessionEvent, SessionHandle, TransferSession};
use crate::state::Role;

/// Keeps at most one live session. Attaching a new channel tears down the
/// previous session before the new one starts.
#[derive(Clone)]
pub struct SessionSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    config: SessionConfig,
    history: Arc<dyn HistoryRecorder>,
    logger: Arc<dyn TransferLogger>,
    events: mpsc::UnboundedSender<SessionEvent>,
    active: Mutex<Option<ActiveSession>>,
}

struct ActiveSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl SessionSupervisor {
    /// Every session's events are forwarded to `events`.
    pub fn new(
        config: SessionConfig,
        history: Arc<dyn HistoryRecorder>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self::with_logger(config, history, events, Arc::new(TracingLogger))
    }

    pub fn with_logger(
        config: SessionConfig,
        history: Arc<dyn HistoryRecorder>,
        events: mpsc::UnboundedSender<SessionEvent>,
        logger: Arc<dyn TransferLogger>,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                config,
                history,
                logger,
                events,
                active: Mutex::new(None),
            }),
        }
    }

    /// Start a session on `channel`, preempting the current one.
    pub async fn attach<C: Channel>(&self, channel: C, role: Role) -> SessionHandle {
        let mut active = self.inner.active.lock().await;

        if let Some(previous) = active.take() {
            info!("session {} superseded by new {} channel", previous.handle.id(), role.as_str());
            previous.handle.disconnect();
            // The old session reports Disconnected before the new one says anything.
            let _ = previous.task.await;
        }

        let (session, handle) = TransferSession::with_logger(
            channel,
            role,
            self.inner.config.clone(),
            self.inner.history.clone(),
            self.inner.events.clone(),
            self.inner.logger.clone(),
        );
        let task = session.spawn();
        *active = Some(ActiveSession {
            handle: handle.clone(),
            task,
        });
        handle
    }

    /// Handle of the live session, if it is still connected.
    pub async fn current(&self) -> Option<SessionHandle> {
        let active = self.inner.active.lock().await;
        active
            .as_ref()
            .map(|a| a.handle.clone())
            .filter(SessionHandle::is_active)
    }

    /// Handle of session `id`, or `None` once it has been superseded or closed.
    /// Answers to a proposal go here, never to whatever session is current.
    pub async fn session(&self, id: Uuid) -> Option<SessionHandle> {
        self.current().await.filter(|handle| handle.id() == id)
    }

    /// Tear down the live session and wait for it to finish.
    pub async fn disconnect(&self) {
        let previous = self.inner.active.lock().await.take();
        if let Some(previous) = previous {
            previous.handle.disconnect();
            let _ = previous.task.await;
        }
    }
}
