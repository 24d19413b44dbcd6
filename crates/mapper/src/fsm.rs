//! The finite state machine driver.

use amber_storage::KeyValue;
use amber_tracker::{ChainFeed, RecordFeed};
use tokio::sync::watch;

use crate::loader::TrieLoader;
use crate::transitions::{State, Status, Transitions};
use crate::MapperError;

/// Requests a running [`Fsm`] to stop at the next safe boundary.
///
/// Suspended waits (for a header, for a record) resolve immediately; a
/// block that is mid-transition finishes its current transition first, so
/// the machine never stops between `Map` and `Forward`.
#[derive(Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        // Receivers may be gone if the FSM already returned.
        let _ = self.tx.send(true);
    }
}

/// Drives the transitions in a single task, yielding between states.
pub struct Fsm<S, C, E, L> {
    state: State,
    transitions: Transitions<S, C, E, L>,
    stop: watch::Receiver<bool>,
}

impl<S, C, E, L> Fsm<S, C, E, L>
where
    S: KeyValue,
    C: ChainFeed,
    E: RecordFeed,
    L: TrieLoader,
{
    pub fn new(state: State, transitions: Transitions<S, C, E, L>) -> (Self, StopHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                state,
                transitions,
                stop: rx,
            },
            StopHandle { tx },
        )
    }

    /// Run until stopped or until a fatal error.
    ///
    /// The open write batch is flushed on the way out, so the index ends
    /// at the last completed block boundary even on a fatal abort.
    pub async fn run(mut self) -> Result<(), MapperError> {
        let result = self.drive().await;
        if let Err(e) = self.transitions.writer().flush() {
            tracing::error!(error = %e, "final index flush failed");
        }
        result
    }

    async fn drive(&mut self) -> Result<(), MapperError> {
        loop {
            match self.state.status {
                Status::Initialize => self.transitions.initialize(&mut self.state)?,
                Status::Bootstrap => self.transitions.bootstrap(&mut self.state)?,
                Status::Resume => self.transitions.resume(&mut self.state)?,
                Status::Index => self.guarded(Status::Index).await?,
                Status::Update => self.transitions.update(&mut self.state)?,
                Status::Collect => self.guarded(Status::Collect).await?,
                Status::Map => self.transitions.map(&mut self.state)?,
                Status::Forward => self.transitions.forward(&mut self.state)?,
                Status::Stopped => {
                    tracing::info!(height = self.state.height, "indexer stopped");
                    return Ok(());
                }
            }

            // A stop requested between transitions takes effect before
            // the next one; otherwise just yield to the runtime.
            if *self.stop.borrow() {
                self.state.status = Status::Stopped;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Run a suspending transition under the stop signal; an aborted wait
    /// moves the machine to `Stopped`.
    async fn guarded(&mut self, status: Status) -> Result<(), MapperError> {
        let mut stop = self.stop.clone();
        let transitions = &self.transitions;
        let state = &mut self.state;
        let stopped = tokio::select! {
            result = async {
                match status {
                    Status::Index => transitions.index(state).await,
                    Status::Collect => transitions.collect(state).await,
                    _ => unreachable!("only waiting states are guarded"),
                }
            } => {
                result?;
                false
            }
            _ = stop.wait_for(|stopped| *stopped) => true,
        };
        if stopped {
            self.state.status = Status::Stopped;
        }
        Ok(())
    }

    /// The current indexed height, for observers.
    pub fn height(&self) -> u64 {
        self.state.height
    }
}
