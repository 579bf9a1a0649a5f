mod config;
mod downloads;

use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use quickshare_gateway::{ListenerState, TungsteniteChannel, router};
use quickshare_transfer::{
    DecisionDraft, FileDescriptor, History, Role, SessionEvent, SessionState, SessionSupervisor,
    TransferSession,
};
use quickshare_types::BatchProposal;

use config::Config;
use downloads::DownloadDir;

const USAGE: &str = "usage: quickshare listen | quickshare send <ws-url> <file>...";

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Listen,
    Send { url: String, files: Vec<PathBuf> },
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Mode> {
    match args.next().as_deref() {
        Some("listen") => Ok(Mode::Listen),
        Some("send") => {
            let url = args.next().ok_or_else(|| anyhow!(USAGE))?;
            let files: Vec<PathBuf> = args.map(PathBuf::from).collect();
            if files.is_empty() {
                bail!(USAGE);
            }
            Ok(Mode::Send { url, files })
        }
        _ => bail!(USAGE),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "quickshare=debug,quickshare_transfer=info,quickshare_gateway=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let mode = parse_args(std::env::args().skip(1))?;
    let config = Config::from_env()?;

    match mode {
        Mode::Listen => listen(config).await,
        Mode::Send { url, files } => send(config, &url, files).await,
    }
}

async fn listen(config: Config) -> Result<()> {
    let downloads = DownloadDir::new(config.download_dir.clone())
        .await
        .with_context(|| format!("cannot create {}", config.download_dir.display()))?;

    let history = History::new();
    let (events_tx, events) = mpsc::unbounded_channel();
    let supervisor = SessionSupervisor::new(config.session(), Arc::new(history.clone()), events_tx);

    let app = router(ListenerState::new(config.peer_id.clone(), supervisor.clone()))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("QuickShare listening on ws://{}/{}", addr, config.peer_id);
    info!("Peer ID: {}", config.peer_id);

    let ui = tokio::spawn(operate_listener(
        events,
        supervisor.clone(),
        downloads,
        history,
        config.auto_accept,
    ));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    supervisor.disconnect().await;
    ui.abort();
    Ok(())
}

/// Listener side of the UI: answers proposals and saves incoming files.
async fn operate_listener(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    supervisor: SessionSupervisor,
    downloads: DownloadDir,
    history: History,
    auto_accept: bool,
) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Status(status) => info!("{}", status),
            SessionEvent::Progress(percent) => debug!("progress {}%", percent),
            SessionEvent::StateChanged(state) => debug!("session {}", state),
            SessionEvent::ProposalReceived { session, proposal } => {
                let draft = match decide(proposal, auto_accept).await {
                    Ok(draft) => draft,
                    Err(e) => {
                        warn!("Decision prompt failed, declining: {}", e);
                        DecisionDraft::new(BatchProposal::new(Vec::new()))
                    }
                };
                // A newer peer may have taken over while the operator was deciding.
                let Some(handle) = supervisor.session(session).await else {
                    warn!("Session {} was superseded, dropping its decision", session);
                    continue;
                };
                if let Err(e) = handle.submit(draft).await {
                    warn!("Decision not delivered: {}", e);
                }
            }
            SessionEvent::FileReceived { name, data } => match downloads.save(&name, &data).await {
                Ok(path) => info!("Saved {} ({} bytes)", path.display(), data.len()),
                Err(e) => error!("Cannot save {}: {}", name, e),
            },
            SessionEvent::BatchReceived { files } => {
                info!("Received {} files; {} transfers in history", files, history.len());
            }
            SessionEvent::Failed(reason) => warn!("{}", reason),
            SessionEvent::BatchSent { .. } | SessionEvent::BatchDenied => {}
        }
    }
}

async fn decide(proposal: BatchProposal, auto_accept: bool) -> Result<DecisionDraft> {
    let mut draft = DecisionDraft::new(proposal);
    if auto_accept {
        draft.accept_all();
        return Ok(draft);
    }
    let draft = tokio::task::spawn_blocking(move || prompt(draft)).await??;
    Ok(draft)
}

/// Ask the operator file by file on stdin.
fn prompt(mut draft: DecisionDraft) -> io::Result<DecisionDraft> {
    let entries = draft.proposal().files.clone();
    let mut stdout = io::stdout();
    let mut line = String::new();

    writeln!(stdout, "Incoming batch: {} files", entries.len())?;
    for entry in entries {
        write!(stdout, "  accept {} ({} bytes)? [y/N/a/q] ", entry.name, entry.size)?;
        stdout.flush()?;
        line.clear();
        io::stdin().lock().read_line(&mut line)?;
        match line.trim() {
            "y" | "Y" => {
                draft.accept(&entry.name);
            }
            "a" | "A" => {
                draft.accept_all();
                break;
            }
            "q" | "Q" => {
                draft.reject_all();
                break;
            }
            _ => {}
        }
    }
    Ok(draft)
}

async fn send(config: Config, url: &str, paths: Vec<PathBuf>) -> Result<()> {
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = FileDescriptor::open(path)
            .await
            .with_context(|| format!("cannot open {}", path.display()))?;
        files.push(file);
    }

    let channel = match TungsteniteChannel::connect(url).await {
        Ok(channel) => channel,
        Err(e) => {
            error!("{}", e.status());
            return Err(e.into());
        }
    };

    let history = History::new();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (session, handle) = TransferSession::new(
        channel,
        Role::Initiator,
        config.session(),
        Arc::new(history.clone()),
        events_tx,
    );
    let task = session.spawn();

    handle.propose_batch(files).await?;

    let outcome = loop {
        match events.recv().await {
            Some(SessionEvent::Status(status)) => info!("{}", status),
            Some(SessionEvent::Progress(percent)) => debug!("progress {}%", percent),
            Some(SessionEvent::BatchSent { files }) => break Ok(files),
            Some(SessionEvent::BatchDenied) => break Err(anyhow!("peer declined the batch")),
            Some(SessionEvent::Failed(reason)) => break Err(anyhow!(reason)),
            Some(SessionEvent::StateChanged(SessionState::Disconnected)) | None => {
                break Err(anyhow!("disconnected before the batch completed"));
            }
            Some(_) => {}
        }
    };

    handle.disconnect();
    let _ = task.await;

    let files = outcome?;
    info!("Sent {} of {} files", files, paths.len());
    for record in history.list() {
        info!("{} {} at {}", record.direction, record.name, record.timestamp);
    }
    Ok(())
}
