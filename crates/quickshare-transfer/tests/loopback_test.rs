/// Integration test: two sessions talking over an in-process channel pair.
///
/// Each test wires a sender and a receiver (or a scripted raw peer) together,
/// drives the handles the way an application would, and checks the events,
/// the wire traffic and the history on both sides.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use quickshare_transfer::{
    Channel, FileDescriptor, History, MemoryChannel, NullLogger, Role, SessionConfig,
    SessionEvent, SessionHandle, SessionState, TransferError, TransferSession, memory_pair,
};
use quickshare_types::{
    BatchProposal, Chunk, Direction, FileEntry, FileMetadata, PeerMessage, PermissionGrant,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// Records everything a session puts on the wire.
struct Tap {
    inner: MemoryChannel,
    sent: Arc<Mutex<Vec<PeerMessage>>>,
}

impl Channel for Tap {
    async fn send(&mut self, message: PeerMessage) -> Result<(), TransferError> {
        self.sent.lock().unwrap().push(message.clone());
        self.inner.send(message).await
    }

    async fn recv(&mut self) -> Option<Result<PeerMessage, TransferError>> {
        self.inner.recv().await
    }

    async fn close(&mut self) {
        self.inner.close().await
    }
}

struct Peer {
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    history: History,
}

fn start<C: Channel>(channel: C, role: Role, chunk_size: usize) -> Peer {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let history = History::new();
    let (tx, events) = mpsc::unbounded_channel();
    let (session, handle) = TransferSession::with_logger(
        channel,
        role,
        SessionConfig::with_chunk_size(chunk_size),
        Arc::new(history.clone()),
        tx,
        Arc::new(NullLogger),
    );
    session.spawn();
    Peer { handle, events, history }
}

/// Sender with a wire tap, receiver on the other end.
fn connected(chunk_size: usize) -> (Peer, Peer, Arc<Mutex<Vec<PeerMessage>>>) {
    let (a, b) = memory_pair(16);
    let sent = Arc::new(Mutex::new(Vec::new()));
    let tap = Tap { inner: a, sent: sent.clone() };
    let sender = start(tap, Role::Initiator, chunk_size);
    let receiver = start(b, Role::Responder, chunk_size);
    (sender, receiver, sent)
}

/// Events up to and including the first one matching `pred`.
async fn collect_until(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    timeout(WAIT, async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.expect("event stream ended");
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn next_proposal(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> BatchProposal {
    let seen = collect_until(events, |e| matches!(e, SessionEvent::ProposalReceived { .. })).await;
    match seen.into_iter().last() {
        Some(SessionEvent::ProposalReceived { proposal, .. }) => proposal,
        other => panic!("unexpected {:?}", other),
    }
}

async fn recv_raw(channel: &mut MemoryChannel) -> PeerMessage {
    timeout(WAIT, channel.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
        .expect("channel error")
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn partial_acceptance_streams_only_granted_file() {
    let (mut sender, mut receiver, wire) = connected(16 * 1024);

    sender
        .handle
        .propose_batch(vec![
            FileDescriptor::from_bytes("a.txt", pattern(100)),
            FileDescriptor::from_bytes("b.txt", pattern(50)),
        ])
        .await
        .unwrap();
    assert_eq!(sender.handle.state(), SessionState::AwaitingApproval);

    let proposal = next_proposal(&mut receiver.events).await;
    assert_eq!(proposal.total_count, 2);
    assert_eq!(
        proposal.files,
        vec![
            FileEntry { name: "a.txt".into(), size: 100 },
            FileEntry { name: "b.txt".into(), size: 50 },
        ]
    );
    receiver.handle.decide(["b.txt"]).await.unwrap();

    collect_until(&mut sender.events, |e| matches!(e, SessionEvent::BatchSent { files: 1 })).await;
    let received = collect_until(&mut receiver.events, |e| {
        matches!(e, SessionEvent::BatchReceived { files: 1 })
    })
    .await;

    let files: Vec<_> = received
        .iter()
        .filter_map(|e| match e {
            SessionEvent::FileReceived { name, data } => Some((name.clone(), data.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(files, vec![("b.txt".to_string(), Bytes::from(pattern(50)))]);

    let wire = wire.lock().unwrap().clone();
    assert_eq!(wire.len(), 3);
    assert!(matches!(wire[0], PeerMessage::BatchRequest(_)));
    assert_eq!(
        wire[1],
        PeerMessage::FileMetadata(FileMetadata {
            name: "b.txt".into(),
            size: 50,
            index: 0,
            total: 1,
        })
    );
    match &wire[2] {
        PeerMessage::Chunk(chunk) => {
            assert_eq!(chunk.payload.len(), 50);
            assert!(chunk.last && chunk.is_last_in_batch);
        }
        other => panic!("unexpected {:?}", other),
    }

    let sent = sender.history.list();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name, "b.txt");
    assert_eq!(sent[0].direction, Direction::Sent);
    let got = receiver.history.list();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].direction, Direction::Received);

    assert_eq!(sender.handle.state(), SessionState::Idle);
    assert_eq!(receiver.handle.state(), SessionState::Idle);
}

#[tokio::test]
async fn whole_batch_arrives_intact_across_chunk_boundaries() {
    let (mut sender, mut receiver, wire) = connected(8);
    let sizes = [("exact", 24), ("ragged", 21), ("empty", 0), ("tiny", 1)];

    let files = sizes
        .iter()
        .map(|(name, len)| FileDescriptor::from_bytes(*name, pattern(*len)))
        .collect();
    sender.handle.propose_batch(files).await.unwrap();

    let proposal = next_proposal(&mut receiver.events).await;
    let names: Vec<String> = proposal.names().map(str::to_string).collect();
    receiver.handle.decide(names).await.unwrap();

    let received = collect_until(&mut receiver.events, |e| {
        matches!(e, SessionEvent::BatchReceived { .. })
    })
    .await;
    let files: Vec<_> = received
        .iter()
        .filter_map(|e| match e {
            SessionEvent::FileReceived { name, data } => Some((name.as_str(), data.len())),
            _ => None,
        })
        .collect();
    assert_eq!(files, vec![("exact", 24), ("ragged", 21), ("empty", 0), ("tiny", 1)]);
    assert!(received.contains(&SessionEvent::BatchReceived { files: 4 }));

    collect_until(&mut sender.events, |e| matches!(e, SessionEvent::BatchSent { files: 4 })).await;
    let chunks = wire
        .lock()
        .unwrap()
        .iter()
        .filter(|m| matches!(m, PeerMessage::Chunk(_)))
        .count();
    // 3 + 3 + 1 (empty final) + 1
    assert_eq!(chunks, 8);
    assert_eq!(receiver.history.len(), 4);
    assert_eq!(receiver.history.list()[0].name, "tiny");
}

#[tokio::test]
async fn denial_sends_nothing_and_returns_to_idle() {
    let (mut sender, mut receiver, wire) = connected(16 * 1024);

    sender
        .handle
        .propose_batch(vec![FileDescriptor::from_bytes("secret.pdf", pattern(10))])
        .await
        .unwrap();
    next_proposal(&mut receiver.events).await;
    receiver.handle.decide(Vec::<String>::new()).await.unwrap();

    collect_until(&mut sender.events, |e| *e == SessionEvent::BatchDenied).await;
    assert_eq!(sender.handle.state(), SessionState::Idle);
    assert_eq!(receiver.handle.state(), SessionState::Idle);

    let wire = wire.lock().unwrap().clone();
    assert_eq!(wire.len(), 1);
    assert!(sender.history.is_empty());

    // The session is reusable after a denial.
    sender
        .handle
        .propose_batch(vec![FileDescriptor::from_bytes("again.txt", pattern(3))])
        .await
        .unwrap();
    let proposal = next_proposal(&mut receiver.events).await;
    assert_eq!(proposal.names().collect::<Vec<_>>(), vec!["again.txt"]);
}

#[tokio::test]
async fn grant_naming_unknown_files_completes_without_streaming() {
    let (ours, mut peer) = memory_pair(16);
    let mut sender = start(ours, Role::Initiator, 1024);

    sender
        .handle
        .propose_batch(vec![FileDescriptor::from_bytes("a.txt", pattern(10))])
        .await
        .unwrap();
    assert!(matches!(recv_raw(&mut peer).await, PeerMessage::BatchRequest(_)));

    peer.send(PeerMessage::PermissionGranted(PermissionGrant {
        accepted_files: vec!["zzz".into()],
    }))
    .await
    .unwrap();

    collect_until(&mut sender.events, |e| matches!(e, SessionEvent::BatchSent { files: 0 })).await;
    assert_eq!(sender.handle.state(), SessionState::Idle);
    assert!(sender.history.is_empty());
    assert!(timeout(Duration::from_millis(100), peer.recv()).await.is_err());
}

#[tokio::test]
async fn local_validation_does_not_end_the_session() {
    let (ours, _peer) = memory_pair(16);
    let sender = start(ours, Role::Initiator, 1024);

    assert!(matches!(
        sender.handle.propose_batch(Vec::new()).await,
        Err(TransferError::InvalidBatch(_))
    ));
    assert!(matches!(
        sender
            .handle
            .propose_batch(vec![
                FileDescriptor::from_bytes("dup", pattern(1)),
                FileDescriptor::from_bytes("dup", pattern(2)),
            ])
            .await,
        Err(TransferError::InvalidBatch(_))
    ));
    assert!(matches!(
        sender.handle.decide(["nothing-pending"]).await,
        Err(TransferError::InvalidBatch(_))
    ));

    sender
        .handle
        .propose_batch(vec![FileDescriptor::from_bytes("ok", pattern(1))])
        .await
        .unwrap();
    // Busy until the peer answers.
    assert!(matches!(
        sender
            .handle
            .propose_batch(vec![FileDescriptor::from_bytes("later", pattern(1))])
            .await,
        Err(TransferError::InvalidBatch(_))
    ));
    assert_eq!(sender.handle.state(), SessionState::AwaitingApproval);
}

#[tokio::test]
async fn local_disconnect_mid_send_records_nothing() {
    let (ours, mut peer) = memory_pair(1);
    let mut sender = start(ours, Role::Initiator, 4);

    sender
        .handle
        .propose_batch(vec![FileDescriptor::from_bytes("big.bin", pattern(64))])
        .await
        .unwrap();
    assert!(matches!(recv_raw(&mut peer).await, PeerMessage::BatchRequest(_)));
    peer.send(PeerMessage::PermissionGranted(PermissionGrant {
        accepted_files: vec!["big.bin".into()],
    }))
    .await
    .unwrap();

    assert!(matches!(recv_raw(&mut peer).await, PeerMessage::FileMetadata(_)));
    assert!(matches!(recv_raw(&mut peer).await, PeerMessage::Chunk(_)));

    sender.handle.disconnect();
    timeout(WAIT, sender.handle.closed()).await.unwrap();

    let events = collect_until(&mut sender.events, |e| {
        *e == SessionEvent::Status("Disconnected".into())
    })
    .await;
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::BatchSent { .. })));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::Failed(_))));
    assert!(sender.history.is_empty());
    assert_eq!(sender.handle.state(), SessionState::Disconnected);

    // Commands after teardown fail locally.
    assert!(matches!(
        sender
            .handle
            .propose_batch(vec![FileDescriptor::from_bytes("x", pattern(1))])
            .await,
        Err(TransferError::InvalidBatch(_))
    ));
}

#[tokio::test]
async fn peer_loss_mid_receive_discards_partial_file() {
    let (ours, mut peer) = memory_pair(16);
    let mut receiver = start(ours, Role::Responder, 1024);

    peer.send(PeerMessage::BatchRequest(BatchProposal::new(vec![FileEntry {
        name: "photo.jpg".into(),
        size: 10,
    }])))
    .await
    .unwrap();
    next_proposal(&mut receiver.events).await;
    receiver.handle.decide(["photo.jpg"]).await.unwrap();
    assert!(matches!(recv_raw(&mut peer).await, PeerMessage::PermissionGranted(_)));

    peer.send(PeerMessage::FileMetadata(FileMetadata {
        name: "photo.jpg".into(),
        size: 10,
        index: 0,
        total: 1,
    }))
    .await
    .unwrap();
    peer.send(PeerMessage::Chunk(Chunk {
        payload: Bytes::from_static(b"12345"),
        last: false,
        is_last_in_batch: false,
    }))
    .await
    .unwrap();
    peer.close().await;

    let events = collect_until(&mut receiver.events, |e| {
        *e == SessionEvent::Status("Disconnected".into())
    })
    .await;
    assert!(events.contains(&SessionEvent::Status("Receiving: photo.jpg".into())));
    assert!(events.contains(&SessionEvent::Progress(50)));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::FileReceived { .. })));
    assert!(receiver.history.is_empty());
    assert_eq!(receiver.handle.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn unexpected_chunk_is_a_protocol_violation() {
    let (ours, mut peer) = memory_pair(16);
    let mut receiver = start(ours, Role::Responder, 1024);

    peer.send(PeerMessage::Chunk(Chunk {
        payload: Bytes::from_static(b"?"),
        last: true,
        is_last_in_batch: true,
    }))
    .await
    .unwrap();

    let events = collect_until(&mut receiver.events, |e| {
        *e == SessionEvent::Status("Disconnected".into())
    })
    .await;
    assert_eq!(events[0], SessionEvent::StateChanged(SessionState::Idle));
    assert_eq!(events[1], SessionEvent::Status("Peer Connected!".into()));
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Failed(_))));
    timeout(WAIT, receiver.handle.closed()).await.unwrap();
}

#[tokio::test]
async fn proposal_while_awaiting_approval_drops_the_session() {
    let (ours, mut peer) = memory_pair(16);
    let mut sender = start(ours, Role::Initiator, 1024);

    sender
        .handle
        .propose_batch(vec![FileDescriptor::from_bytes("mine", pattern(1))])
        .await
        .unwrap();
    assert!(matches!(recv_raw(&mut peer).await, PeerMessage::BatchRequest(_)));

    peer.send(PeerMessage::BatchRequest(BatchProposal::new(vec![FileEntry {
        name: "theirs".into(),
        size: 1,
    }])))
    .await
    .unwrap();

    let events = collect_until(&mut sender.events, |e| {
        *e == SessionEvent::Status("Disconnected".into())
    })
    .await;
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Failed(_))));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::ProposalReceived { .. })));
    assert!(timeout(WAIT, peer.recv()).await.unwrap().is_none());
}
