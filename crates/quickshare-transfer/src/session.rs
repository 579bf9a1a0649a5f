/// One transfer session per connected channel.
///
/// The session task owns the channel and is the only place protocol state
/// changes. The application talks to it through a [`SessionHandle`] and
/// listens on an unbounded stream of [`SessionEvent`]s.
///
/// ```text
/// SessionHandle ── commands ──┐
///                             v
///   channel.recv() ──> TransferSession::run ──> channel.send()
///                             │
///                             └── SessionEvent (status, progress, files) ──> UI
/// ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use quickshare_types::{BatchProposal, Direction, HistoryRecord, PeerMessage};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::Channel;
use crate::error::TransferError;
use crate::history::HistoryRecorder;
use crate::logging::{TracingLogger, TransferEvent, TransferLog, TransferLogger};
use crate::negotiate::{BatchDecision, DecisionDraft, PendingBatch, Resolution, validate_proposal};
use crate::protocol::CHUNK_SIZE;
use crate::receiver::{BatchReceiver, ReceiverStep};
use crate::sender::BatchSender;
use crate::source::FileDescriptor;
use crate::state::{Role, SessionMachine, SessionState, Transition};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bytes per chunk message. Both peers must agree on it; larger inbound
    /// chunks are a protocol violation.
    pub chunk_size: usize,
    /// Upper bound on the close handshake during teardown.
    pub close_timeout: Duration,
}

impl SessionConfig {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            close_timeout: Duration::from_secs(2),
        }
    }
}

/// Everything the UI collaborator is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Human-readable status line.
    Status(String),
    /// Progress of the current file, 0-100.
    Progress(u8),
    /// Peer proposed a batch; answer on the handle whose id is `session`.
    ProposalReceived {
        session: Uuid,
        proposal: BatchProposal,
    },
    /// A complete file, ready for the download sink.
    FileReceived { name: String, data: Bytes },
    BatchSent { files: u32 },
    BatchReceived { files: u32 },
    BatchDenied,
    /// Fatal error that ended the session.
    Failed(String),
}

/// Shared plumbing for the session and its engines.
pub(crate) struct SessionContext {
    pub(crate) id: Uuid,
    pub(crate) chunk_size: usize,
    pub(crate) events: mpsc::UnboundedSender<SessionEvent>,
    pub(crate) history: Arc<dyn HistoryRecorder>,
    pub(crate) logger: Arc<dyn TransferLogger>,
    pub(crate) cancel: CancellationToken,
}

impl SessionContext {
    pub(crate) fn new(
        chunk_size: usize,
        events: mpsc::UnboundedSender<SessionEvent>,
        history: Arc<dyn HistoryRecorder>,
        logger: Arc<dyn TransferLogger>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            chunk_size,
            events,
            history,
            logger,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn status(&self, status: impl Into<String>) {
        self.emit(SessionEvent::Status(status.into()));
    }

    pub(crate) fn log(&self, event: TransferEvent) {
        self.logger.log(TransferLog {
            component: "session",
            session_id: self.id,
            event,
        });
    }

    /// Run `fut` unless the session is cancelled first.
    pub(crate) async fn guard<T>(
        &self,
        fut: impl Future<Output = Result<T, TransferError>>,
    ) -> Result<T, TransferError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransferError::channel("session cancelled")),
            result = fut => result,
        }
    }
}

enum Command {
    Propose {
        files: Vec<FileDescriptor>,
        reply: oneshot::Sender<Result<(), TransferError>>,
    },
    Decide {
        accepted: Vec<String>,
        reply: oneshot::Sender<Result<(), TransferError>>,
    },
}

/// Cloneable control surface for a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.state() != SessionState::Disconnected
    }

    /// Offer `files` to the peer. Fails locally for an empty or duplicate
    /// list, a busy session, or when the channel is gone.
    pub async fn propose_batch(&self, files: Vec<FileDescriptor>) -> Result<(), TransferError> {
        if files.is_empty() {
            return Err(TransferError::invalid_batch("no files selected"));
        }
        let (reply, rx) = oneshot::channel();
        self.request(Command::Propose { files, reply }, rx).await
    }

    /// Answer the pending proposal. An empty set declines the batch.
    pub async fn decide<I, S>(&self, accepted: I) -> Result<(), TransferError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let accepted = accepted.into_iter().map(Into::into).collect();
        let (reply, rx) = oneshot::channel();
        self.request(Command::Decide { accepted, reply }, rx).await
    }

    /// Answer with a finished per-file draft.
    pub async fn submit(&self, draft: DecisionDraft) -> Result<(), TransferError> {
        let accepted: Vec<String> = draft.accepted().map(|f| f.name.clone()).collect();
        self.decide(accepted).await
    }

    /// Tear the session down. Partial receives are discarded.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the session has reached `Disconnected`.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == SessionState::Disconnected).await;
    }

    async fn request(
        &self,
        command: Command,
        rx: oneshot::Receiver<Result<(), TransferError>>,
    ) -> Result<(), TransferError> {
        if self.commands.send(command).is_err() {
            return Err(TransferError::invalid_batch("no active channel"));
        }
        rx.await
            .unwrap_or_else(|_| Err(TransferError::invalid_batch("no active channel")))
    }
}

/// Why the run loop stopped.
enum Ending {
    Closed,
    Cancelled,
    Failed(TransferError),
}

pub struct TransferSession<C> {
    channel: C,
    machine: SessionMachine,
    ctx: SessionContext,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<SessionState>,
    close_timeout: Duration,
    /// Sender: files held until the decision arrives.
    pending: Option<PendingBatch>,
    /// Receiver: proposal awaiting the operator.
    proposal: Option<BatchProposal>,
    /// Receiver: active batch.
    receiver: Option<BatchReceiver>,
}

impl<C: Channel> TransferSession<C> {
    pub fn new(
        channel: C,
        role: Role,
        config: SessionConfig,
        history: Arc<dyn HistoryRecorder>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> (Self, SessionHandle) {
        Self::with_logger(channel, role, config, history, events, Arc::new(TracingLogger))
    }

    pub fn with_logger(
        channel: C,
        role: Role,
        config: SessionConfig,
        history: Arc<dyn HistoryRecorder>,
        events: mpsc::UnboundedSender<SessionEvent>,
        logger: Arc<dyn TransferLogger>,
    ) -> (Self, SessionHandle) {
        let ctx = SessionContext::new(config.chunk_size.max(1), events, history, logger);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        // Reads as Idle from the moment the handle exists; the task confirms it on start.
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let handle = SessionHandle {
            id: ctx.id,
            commands: commands_tx,
            cancel: ctx.cancel.clone(),
            state: state_rx,
        };
        let session = Self {
            channel,
            machine: SessionMachine::detached(role),
            ctx,
            commands,
            state_tx,
            close_timeout: config.close_timeout,
            pending: None,
            proposal: None,
            receiver: None,
        };
        (session, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let role = self.machine.role();
        self.ctx.log(TransferEvent::SessionStarted { role: role.as_str() });
        if let Err(e) = self.transition(Transition::Connected) {
            tracing::error!("session {} could not start: {}", self.ctx.id, e);
        }
        self.ctx.status(match role {
            Role::Responder => "Peer Connected!",
            Role::Initiator => "Connected!",
        });

        let ending = loop {
            let input = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => break Ending::Cancelled,
                Some(command) = self.commands.recv() => Input::Command(command),
                message = self.channel.recv() => Input::Message(message),
            };
            let result = match input {
                Input::Command(command) => self.handle_command(command).await,
                Input::Message(None) => break Ending::Closed,
                Input::Message(Some(Err(e))) => Err(e),
                Input::Message(Some(Ok(message))) => self.handle_message(message).await,
            };
            if let Err(e) = result {
                break if self.ctx.cancel.is_cancelled() {
                    Ending::Cancelled
                } else {
                    Ending::Failed(e)
                };
            }
        };

        self.teardown(ending).await;
    }

    async fn handle_command(&mut self, command: Command) -> Result<(), TransferError> {
        match command {
            Command::Propose { files, reply } => {
                let result = self.propose(files).await;
                reply_with(reply, &result);
                result.or_else(keep_session)
            }
            Command::Decide { accepted, reply } => {
                let result = self.decide(accepted).await;
                reply_with(reply, &result);
                result.or_else(keep_session)
            }
        }
    }

    async fn propose(&mut self, files: Vec<FileDescriptor>) -> Result<(), TransferError> {
        let state = self.machine.state();
        if state != SessionState::Idle {
            return Err(TransferError::invalid_batch(format!("session is {}", state)));
        }
        let (pending, proposal) = PendingBatch::propose(files)?;
        let (files, bytes) = (proposal.files.len(), proposal.total_bytes());

        self.send(PeerMessage::BatchRequest(proposal)).await?;
        self.pending = Some(pending);
        self.transition(Transition::Propose)
            .map_err(|e| TransferError::invalid_batch(e.to_string()))?;
        self.ctx.log(TransferEvent::BatchProposed { files, bytes });
        self.ctx.status("Waiting for approval...");
        Ok(())
    }

    async fn decide(&mut self, accepted: Vec<String>) -> Result<(), TransferError> {
        let Some(proposal) = self.proposal.take() else {
            return Err(TransferError::invalid_batch("no proposal awaiting a decision"));
        };
        // Names outside the proposal are ignored.
        let mut draft = DecisionDraft::new(proposal);
        for name in &accepted {
            draft.accept(name);
        }
        let proposed = draft.proposal().files.len();
        let decision = draft.finalize();
        let accepted_count = decision.accepted_count();

        self.send(decision.clone().into_message()).await?;
        self.ctx.log(TransferEvent::DecisionSent {
            accepted: accepted_count,
            proposed,
        });
        match decision {
            BatchDecision::Granted { accepted_names } => {
                self.receiver = Some(BatchReceiver::new(accepted_names, self.ctx.chunk_size));
                self.transition_or_violation(Transition::Decide { accepted: true })?;
                self.ctx.status(format!("Accepted {} of {} files", accepted_count, proposed));
            }
            BatchDecision::Denied => {
                self.transition_or_violation(Transition::Decide { accepted: false })?;
                self.ctx.status("Transfer declined");
            }
        }
        Ok(())
    }

    async fn handle_message(&mut self, message: PeerMessage) -> Result<(), TransferError> {
        match message {
            PeerMessage::BatchRequest(proposal) => {
                if self.machine.state() != SessionState::Idle {
                    return Err(TransferError::violation(format!(
                        "batch request while {}",
                        self.machine.state()
                    )));
                }
                validate_proposal(&proposal)?;
                self.transition_or_violation(Transition::ProposalReceived)?;
                self.ctx.log(TransferEvent::ProposalReceived {
                    files: proposal.files.len(),
                    bytes: proposal.total_bytes(),
                });
                self.ctx
                    .status(format!("Incoming batch: {} files", proposal.files.len()));
                self.proposal = Some(proposal.clone());
                self.ctx.emit(SessionEvent::ProposalReceived {
                    session: self.ctx.id,
                    proposal,
                });
                Ok(())
            }
            PeerMessage::PermissionGranted(grant) => {
                self.on_decision(BatchDecision::from_accepted(grant.accepted_files))
                    .await
            }
            PeerMessage::PermissionDenied => self.on_decision(BatchDecision::Denied).await,
            PeerMessage::FileMetadata(meta) => {
                let receiver = self.active_receiver("file-metadata")?;
                let step = receiver.on_metadata(meta)?;
                self.apply_steps(vec![step])
            }
            PeerMessage::Chunk(chunk) => {
                let len = chunk.payload.len();
                let receiver = self.active_receiver("chunk")?;
                let name = receiver.active().map(|m| m.name.clone()).unwrap_or_default();
                let received = receiver.buffered() + len as u64;
                let steps = receiver.on_chunk(chunk)?;
                self.ctx.log(TransferEvent::ChunkReceived { name, received, len });
                self.apply_steps(steps)
            }
        }
    }

    async fn on_decision(&mut self, decision: BatchDecision) -> Result<(), TransferError> {
        let pending = match (self.machine.state(), self.pending.take()) {
            (SessionState::AwaitingApproval, Some(pending)) => pending,
            (state, _) => {
                return Err(TransferError::violation(format!("decision while {}", state)));
            }
        };

        match pending.resolve(decision) {
            Resolution::Denied => {
                self.transition_or_violation(Transition::Denied)?;
                self.ctx.log(TransferEvent::BatchDenied);
                self.ctx.emit(SessionEvent::BatchDenied);
                self.ctx.status("Transfer declined");
            }
            Resolution::NothingAccepted => {
                self.transition_or_violation(Transition::Granted)?;
                self.transition_or_violation(Transition::BatchComplete)?;
                self.ctx.emit(SessionEvent::BatchSent { files: 0 });
                self.ctx.status("Nothing to send");
            }
            Resolution::Stream(files) => {
                self.transition_or_violation(Transition::Granted)?;
                self.ctx.status("Sending...");
                let outcome = BatchSender::new(&mut self.channel, &self.ctx)
                    .stream_batch(files)
                    .await?;
                self.transition_or_violation(Transition::BatchComplete)?;
                self.ctx.emit(SessionEvent::Progress(0));
                self.ctx.emit(SessionEvent::BatchSent {
                    files: outcome.files_sent,
                });
                self.ctx.status("File Sent!");
            }
        }
        Ok(())
    }

    fn active_receiver(&mut self, kind: &str) -> Result<&mut BatchReceiver, TransferError> {
        let state = self.machine.state();
        match (state, self.receiver.as_mut()) {
            (SessionState::Streaming(_), Some(receiver)) => Ok(receiver),
            _ => Err(TransferError::violation(format!("{} while {}", kind, state))),
        }
    }

    fn apply_steps(&mut self, steps: Vec<ReceiverStep>) -> Result<(), TransferError> {
        for step in steps {
            match step {
                ReceiverStep::Started(meta) => {
                    self.ctx.log(TransferEvent::FileStarted {
                        name: meta.name.clone(),
                        index: meta.index,
                        total: meta.total,
                        size: meta.size,
                    });
                    self.ctx.emit(SessionEvent::Progress(0));
                    self.ctx.status(format!("Receiving: {}", meta.name));
                }
                ReceiverStep::Progress(percent) => self.ctx.emit(SessionEvent::Progress(percent)),
                ReceiverStep::FileComplete { name, data } => {
                    self.ctx.log(TransferEvent::FileCompleted {
                        name: name.clone(),
                        size: data.len() as u64,
                    });
                    self.ctx
                        .history
                        .record(HistoryRecord::now(name.clone(), Direction::Received));
                    self.ctx.emit(SessionEvent::FileReceived { name, data });
                    self.ctx.status("File Received!");
                }
                ReceiverStep::BatchComplete { files } => {
                    self.receiver = None;
                    self.transition_or_violation(Transition::BatchComplete)?;
                    self.ctx.log(TransferEvent::BatchComplete { files });
                    self.ctx.emit(SessionEvent::BatchReceived { files });
                    self.ctx.status("Batch complete");
                    self.ctx.emit(SessionEvent::Progress(0));
                }
            }
        }
        Ok(())
    }

    async fn send(&mut self, message: PeerMessage) -> Result<(), TransferError> {
        self.ctx.guard(self.channel.send(message)).await
    }

    fn transition(
        &mut self,
        transition: Transition,
    ) -> Result<SessionState, crate::state::IllegalTransition> {
        let before = self.machine.state();
        let after = self.machine.apply(transition)?;
        if after != before {
            self.state_tx.send_replace(after);
            self.ctx.emit(SessionEvent::StateChanged(after));
        }
        Ok(after)
    }

    fn transition_or_violation(&mut self, transition: Transition) -> Result<(), TransferError> {
        self.transition(transition)
            .map(|_| ())
            .map_err(|e| TransferError::violation(e.to_string()))
    }

    async fn teardown(mut self, ending: Ending) {
        // No partial file survives the session.
        if let Some(receiver) = self.receiver.as_mut() {
            if receiver.buffered() > 0 {
                tracing::debug!(
                    "session {} discarding {} partial bytes",
                    self.ctx.id,
                    receiver.buffered()
                );
            }
            receiver.discard();
        }
        self.receiver = None;
        self.pending = None;
        self.proposal = None;
        // Bounded: a peer that stopped reading cannot stall teardown.
        if tokio::time::timeout(self.close_timeout, self.channel.close())
            .await
            .is_err()
        {
            tracing::warn!("session {} close handshake timed out", self.ctx.id);
        }

        let reason = match &ending {
            Ending::Closed => "channel closed".to_string(),
            Ending::Cancelled => "disconnected locally".to_string(),
            Ending::Failed(e) => e.to_string(),
        };
        if let Ending::Failed(e) = &ending {
            self.ctx.log(TransferEvent::Error {
                message: e.to_string(),
            });
            self.ctx.emit(SessionEvent::Failed(e.status()));
        }
        self.ctx.log(TransferEvent::Disconnected { reason });
        self.ctx.emit(SessionEvent::Progress(0));
        if let Err(e) = self.transition(Transition::ChannelClosed) {
            tracing::error!("session {}: {}", self.ctx.id, e);
        }
        self.ctx.status("Disconnected");

        // Fail whatever was queued behind the teardown.
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            let reply = match command {
                Command::Propose { reply, .. } | Command::Decide { reply, .. } => reply,
            };
            let _ = reply.send(Err(TransferError::invalid_batch("no active channel")));
        }
    }
}

enum Input {
    Command(Command),
    Message(Option<Result<PeerMessage, TransferError>>),
}

fn reply_with(
    reply: oneshot::Sender<Result<(), TransferError>>,
    result: &Result<(), TransferError>,
) {
    let answer = match result {
        Ok(()) => Ok(()),
        Err(TransferError::InvalidBatch(reason)) => {
            Err(TransferError::InvalidBatch(reason.clone()))
        }
        Err(e) => Err(TransferError::channel(e)),
    };
    let _ = reply.send(answer);
}

/// Local validation failures are reported to the caller only.
fn keep_session(e: TransferError) -> Result<(), TransferError> {
    if e.ends_session() { Err(e) } else { Ok(()) }
}
