//! The UCI session: a full-duplex mediator between caller requests and an asynchronous,
//! line-streaming engine process.
//!
//! A single background task (spawned by [`UciSession::start`]) owns the read half of the
//! transport and routes every line to whichever completion handle is waiting for it. Callers
//! never read from the transport directly; they only ever await a handle that the reader task
//! resolves.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use derivative::Derivative;
use tokio::sync::{oneshot, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{instrument, trace, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::transport::EngineTransport;

pub mod proto;

pub use proto::UciInfoLine;

/// A search bound: either a fixed depth or a wall-clock budget.
///
/// `Duration::as_millis` always yields the *total* elapsed milliseconds, so building the `go`
/// command from it sidesteps a classic pitfall of reading only a sub-second component.
#[derive(Debug, Clone, Copy)]
pub enum Limit {
    Depth(u32),
    Time(Duration),
}

impl Limit {
    fn to_go_command(self) -> String {
        match self {
            Limit::Depth(d) => format!("go depth {d}"),
            Limit::Time(t) => format!("go movetime {}", t.as_millis()),
        }
    }
}

/// A single principal variation's final evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub depth: u32,
    pub rank: u32,
    pub score: String,
}

/// An ordered, non-empty collection of [`Evaluation`]s, one per multi-PV rank, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationCollection(Vec<Evaluation>);

impl EvaluationCollection {
    /// The rank-1 entry.
    pub fn best(&self) -> &Evaluation {
        &self.0[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Evaluation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Lifecycle state of a [`UciSession`]. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Starting,
    Handshaking,
    Ready,
    Searching,
    Terminated,
}

/// Folds successive `info` lines into the deepest-observed score per multi-PV rank.
#[derive(Debug, Default)]
struct Accumulator {
    active: bool,
    per_rank: BTreeMap<u32, (u32, String)>,
}

impl Accumulator {
    fn start(&mut self) {
        self.active = true;
        self.per_rank.clear();
    }

    fn stop(&mut self) {
        self.active = false;
    }

    fn fold(&mut self, info: &UciInfoLine) {
        if !self.active || !info.has_score() {
            return;
        }

        let rank = info.multi_pv.unwrap_or(1);
        let depth = info.depth.unwrap_or(0);
        let score = match (info.score_cp, info.score_mate) {
            (Some(cp), _) => cp.to_string(),
            (None, Some(mate)) => format!("mate {mate}"),
            (None, None) => return,
        };

        match self.per_rank.get(&rank) {
            Some((prev_depth, _)) if *prev_depth >= depth => (),
            _ => {
                self.per_rank.insert(rank, (depth, score));
            }
        }
    }

    fn snapshot(&self) -> Option<EvaluationCollection> {
        if self.per_rank.is_empty() {
            return None;
        }
        let evals = self
            .per_rank
            .iter()
            .map(|(rank, (depth, score))| Evaluation {
                depth: *depth,
                rank: *rank,
                score: score.clone(),
            })
            .collect();
        Some(EvaluationCollection(evals))
    }
}

/// The search outstanding on the engine, if any. Holds the SearchLock permit for its whole
/// lifetime: the permit is only released once this value is dropped, which happens when the
/// terminating `bestmove` is actually processed by the reader task -- not when a cancelled
/// caller gives up early.
enum PendingSearch {
    BestMove {
        tx: oneshot::Sender<Result<String>>,
        _permit: OwnedSemaphorePermit,
    },
    Evaluate {
        tx: oneshot::Sender<Result<EvaluationCollection>>,
        _permit: OwnedSemaphorePermit,
    },
}

/// Normalizes a LAN move for the `position moves` command: the SAN→LAN converter emits
/// `e7e8=Q`, but UCI engines expect the lowercase, no-`=` form `e7e8q`.
fn normalize_lan(mv: &str) -> String {
    mv.replace('=', "").to_lowercase()
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct UciSession {
    #[derivative(Debug = "ignore")]
    transport: Arc<dyn EngineTransport>,
    state: Mutex<SessionState>,
    handshake_tx: Mutex<Option<oneshot::Sender<Result<()>>>>,
    ready_tx: Mutex<Option<oneshot::Sender<Result<()>>>>,
    ready_semaphore: Semaphore,
    search_semaphore: Arc<Semaphore>,
    pending_search: Mutex<Option<PendingSearch>>,
    accumulator: Mutex<Accumulator>,
    #[derivative(Debug = "ignore")]
    reader_task: Mutex<Option<JoinHandle<()>>>,
    notify_disposed: Arc<Notify>,
}

impl Drop for UciSession {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.get_mut().ok().and_then(|t| t.take()) {
            task.abort();
        }
    }
}

impl UciSession {
    pub fn new(transport: Arc<dyn EngineTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            state: Mutex::new(SessionState::New),
            handshake_tx: Mutex::new(None),
            ready_tx: Mutex::new(None),
            ready_semaphore: Semaphore::new(1),
            search_semaphore: Arc::new(Semaphore::new(1)),
            pending_search: Mutex::new(None),
            accumulator: Mutex::new(Accumulator::default()),
            reader_task: Mutex::new(None),
            notify_disposed: Arc::new(Notify::new()),
        })
    }

    /// Spawns the background reader and transitions out of `New`.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !matches!(*state, SessionState::New) {
            return Err(Error::InitFailure("session already started".into()));
        }
        *state = SessionState::Starting;
        drop(state);

        let reader = Arc::clone(self);
        let task = tokio::spawn(async move { reader.reader_loop().await });
        *self.reader_task.lock().unwrap() = Some(task);
        Ok(())
    }

    async fn reader_loop(self: Arc<Self>) {
        loop {
            match self.transport.read_line().await {
                Ok(Some(line)) => self.handle_line(&line).await,
                Ok(None) => {
                    trace!("engine stdout closed");
                    break;
                }
                Err(err) => {
                    warn!(%err, "engine transport read failed");
                    break;
                }
            }
            if self.is_terminated() {
                break;
            }
        }
    }

    async fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if line == "uciok" {
            if let Some(tx) = self.handshake_tx.lock().unwrap().take() {
                self.set_state(SessionState::Ready);
                let _ = tx.send(Ok(()));
            }
        } else if line == "readyok" {
            if let Some(tx) = self.ready_tx.lock().unwrap().take() {
                let _ = tx.send(Ok(()));
            }
        } else if line.starts_with("bestmove") {
            self.handle_bestmove(line);
        } else if line.starts_with("info") {
            let info = proto::parse_info(line);
            self.accumulator.lock().unwrap().fold(&info);
        } else {
            trace!(line, "discarding unrecognized engine line");
        }
    }

    fn handle_bestmove(&self, line: &str) {
        let Some(pending) = self.pending_search.lock().unwrap().take() else {
            trace!(line, "bestmove with no pending search, discarding");
            return;
        };

        let parsed = proto::parse_bestmove(line);
        let snapshot = {
            let mut acc = self.accumulator.lock().unwrap();
            let snapshot = acc.snapshot();
            acc.stop();
            snapshot
        };

        match pending {
            PendingSearch::BestMove { tx, .. } => {
                let result = parsed
                    .ok_or_else(|| Error::ProtocolViolation(format!("malformed bestmove: {line}")));
                let _ = tx.send(result);
            }
            PendingSearch::Evaluate { tx, .. } => {
                let result = match parsed {
                    None => Err(Error::ProtocolViolation(format!(
                        "malformed bestmove: {line}"
                    ))),
                    Some(_) => snapshot.ok_or(Error::NoEvaluation),
                };
                let _ = tx.send(result);
            }
        }
        // `pending`'s SearchLock permit is released here, once the engine's bestmove has
        // actually been observed -- regardless of whether the caller already cancelled.

        if !self.is_terminated() {
            self.set_state(SessionState::Ready);
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    fn is_terminated(&self) -> bool {
        matches!(self.state(), SessionState::Terminated)
    }

    /// True from a successful [`UciSession::handshake`] until [`UciSession::dispose`].
    pub fn is_initialized(&self) -> bool {
        matches!(self.state(), SessionState::Ready | SessionState::Searching)
    }

    /// A clone of the notify fired exactly once when the session is disposed. The engine pool
    /// uses this to release checkout permits without the caller having to call back in.
    pub fn disposed_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.notify_disposed)
    }

    #[instrument(skip(self, cancel), err)]
    pub async fn handshake(&self, cancel: CancelToken) -> Result<()> {
        if self.is_terminated() {
            return Err(Error::Terminated);
        }
        self.set_state(SessionState::Handshaking);

        let (tx, rx) = oneshot::channel();
        *self.handshake_tx.lock().unwrap() = Some(tx);

        if let Err(err) = self.transport.write_line("uci").await {
            self.handshake_tx.lock().unwrap().take();
            return Err(Error::InitFailure(err.to_string()));
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                self.handshake_tx.lock().unwrap().take();
                self.set_state(SessionState::Starting);
                Err(Error::Cancelled)
            }
            res = rx => match res {
                Ok(inner) => inner,
                Err(_) => Err(Error::Terminated),
            },
        }
    }

    #[instrument(skip(self, cancel), err)]
    pub async fn wait_ready(&self, cancel: CancelToken) -> Result<()> {
        if self.is_terminated() {
            return Err(Error::Terminated);
        }
        let _permit = self
            .ready_semaphore
            .acquire()
            .await
            .map_err(|_| Error::Terminated)?;

        let (tx, rx) = oneshot::channel();
        *self.ready_tx.lock().unwrap() = Some(tx);

        if let Err(err) = self.transport.write_line("isready").await {
            self.ready_tx.lock().unwrap().take();
            return Err(err);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                self.ready_tx.lock().unwrap().take();
                Err(Error::Cancelled)
            }
            res = rx => match res {
                Ok(inner) => inner,
                Err(_) => Err(Error::Terminated),
            },
        }
    }

    async fn send_cancellable(&self, command: String, cancel: &CancelToken) -> Result<()> {
        if self.is_terminated() {
            return Err(Error::Terminated);
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = self.transport.write_line(&command) => res,
        }
    }

    pub async fn new_game(&self, cancel: CancelToken) -> Result<()> {
        self.send_cancellable("ucinewgame".to_owned(), &cancel).await
    }

    pub async fn set_position(
        &self,
        fen: Option<&str>,
        moves: &[String],
        cancel: CancelToken,
    ) -> Result<()> {
        if let Some(fen) = fen {
            if fen.is_empty() {
                return Err(Error::InvalidInput("FEN must not be empty".into()));
            }
        }

        let mut command = String::from("position ");
        match fen {
            Some(fen) => {
                command.push_str("fen ");
                command.push_str(fen);
            }
            None => command.push_str("startpos"),
        }

        if !moves.is_empty() {
            command.push_str(" moves");
            for mv in moves {
                command.push(' ');
                command.push_str(&normalize_lan(mv));
            }
        }

        self.send_cancellable(command, &cancel).await
    }

    pub async fn set_option(&self, name: &str, value: &str, cancel: CancelToken) -> Result<()> {
        self.send_cancellable(format!("setoption name {name} value {value}"), &cancel)
            .await
    }

    pub async fn set_multi_pv(&self, n: u32, cancel: CancelToken) -> Result<()> {
        if n < 1 {
            return Err(Error::InvalidInput("MultiPV must be >= 1".into()));
        }
        self.set_option("MultiPV", &n.to_string(), cancel).await
    }

    #[instrument(skip(self, cancel), err)]
    pub async fn get_best_move(&self, limit: Limit, cancel: CancelToken) -> Result<String> {
        if self.is_terminated() {
            return Err(Error::Terminated);
        }
        let permit = Arc::clone(&self.search_semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::Terminated)?;
        if self.is_terminated() {
            return Err(Error::Terminated);
        }

        let (tx, rx) = oneshot::channel();
        self.accumulator.lock().unwrap().start();
        *self.pending_search.lock().unwrap() = Some(PendingSearch::BestMove {
            tx,
            _permit: permit,
        });
        self.set_state(SessionState::Searching);

        if let Err(err) = self.transport.write_line(&limit.to_go_command()).await {
            self.pending_search.lock().unwrap().take();
            self.set_state(SessionState::Ready);
            return Err(err);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = self.transport.write_line("stop").await;
                Err(Error::Cancelled)
            }
            res = rx => match res {
                Ok(inner) => inner,
                Err(_) => Err(Error::Terminated),
            },
        }
    }

    #[instrument(skip(self, cancel), err)]
    pub async fn evaluate(&self, limit: Limit, cancel: CancelToken) -> Result<EvaluationCollection> {
        if self.is_terminated() {
            return Err(Error::Terminated);
        }
        let permit = Arc::clone(&self.search_semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::Terminated)?;
        if self.is_terminated() {
            return Err(Error::Terminated);
        }

        let (tx, rx) = oneshot::channel();
        self.accumulator.lock().unwrap().start();
        *self.pending_search.lock().unwrap() = Some(PendingSearch::Evaluate {
            tx,
            _permit: permit,
        });
        self.set_state(SessionState::Searching);

        if let Err(err) = self.transport.write_line(&limit.to_go_command()).await {
            self.pending_search.lock().unwrap().take();
            self.set_state(SessionState::Ready);
            return Err(err);
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = self.transport.write_line("stop").await;
                Err(Error::Cancelled)
            }
            res = rx => match res {
                Ok(inner) => inner,
                Err(_) => Err(Error::Terminated),
            },
        }
    }

    #[instrument(skip(self))]
    pub async fn dispose(&self) -> Result<()> {
        let already = {
            let mut state = self.state.lock().unwrap();
            let already = matches!(*state, SessionState::Terminated);
            *state = SessionState::Terminated;
            already
        };
        if already {
            return Ok(());
        }

        if let Some(tx) = self.handshake_tx.lock().unwrap().take() {
            let _ = tx.send(Err(Error::Terminated));
        }
        if let Some(tx) = self.ready_tx.lock().unwrap().take() {
            let _ = tx.send(Err(Error::Terminated));
        }
        if let Some(pending) = self.pending_search.lock().unwrap().take() {
            match pending {
                PendingSearch::BestMove { tx, .. } => {
                    let _ = tx.send(Err(Error::Terminated));
                }
                PendingSearch::Evaluate { tx, .. } => {
                    let _ = tx.send(Err(Error::Terminated));
                }
            }
        }

        self.transport.dispose().await?;
        self.notify_disposed.notify_one();

        if let Some(task) = self.reader_task.lock().unwrap().take() {
            task.abort();
        }

        Ok(())
    }
}
