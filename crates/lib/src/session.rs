//! Wiring between the host's two feeds and the engines they drive.
//!
//! A [`Session`] owns the shared-state [`Engine`] and the participant
//! [`Roster`], configures the roster as the state engine's foreign engine,
//! and tracks when both feeds have delivered their first update.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
};

use tracing::{debug, info};

use crate::{
    Result,
    config::EngineConfig,
    engine::{DeltaReport, Engine},
    roster::{Participant, Roster},
};

type ReadyCallback = Box<dyn FnOnce(&Engine, &Roster)>;

/// The state engine and roster of one host session.
///
/// ```
/// use std::{cell::Cell, collections::BTreeMap, rc::Rc};
/// use wavestate::{Participant, Session};
///
/// let session = Session::new().unwrap();
/// let fired = Rc::new(Cell::new(false));
/// let flag = fired.clone();
/// session.on_ready(move |_state, _roster| flag.set(true));
///
/// session.receive_state(&BTreeMap::new()).unwrap();
/// assert!(!fired.get());
/// session.receive_participants(&[Participant::new("joe")]).unwrap();
/// assert!(fired.get());
/// ```
pub struct Session {
    state: Engine,
    roster: Roster,
    pending: RefCell<Vec<ReadyCallback>>,
}

impl Session {
    /// Creates a session with a default state engine.
    pub fn new() -> Result<Self> {
        Self::with_engine(Engine::new())
    }

    /// Creates a session whose state engine uses `config`.
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Self::with_engine(Engine::builder().config(config).build()?)
    }

    /// Creates a session around an existing state engine.
    pub fn with_engine(state: Engine) -> Result<Self> {
        let roster = Roster::new();
        state.set_foreign_engine(roster.engine())?;
        Ok(Self {
            state,
            roster,
            pending: RefCell::new(Vec::new()),
        })
    }

    /// The shared-state engine.
    pub fn state(&self) -> &Engine {
        &self.state
    }

    /// The participant roster.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Returns true once both feeds have delivered an update.
    pub fn is_ready(&self) -> bool {
        self.state.is_ready() && self.roster.is_ready()
    }

    /// Applies a full state snapshot from the host.
    pub fn receive_state(&self, snapshot: &BTreeMap<String, String>) -> Result<DeltaReport> {
        let report = self.state.receive_snapshot(snapshot)?;
        self.notify_if_ready();
        Ok(report)
    }

    /// Applies a participant snapshot from the host.
    pub fn receive_participants(&self, participants: &[Participant]) -> Result<()> {
        self.roster.receive_participants(participants)?;
        self.notify_if_ready();
        Ok(())
    }

    /// Runs `callback` once both feeds are ready.
    ///
    /// Runs it immediately if they already are.
    pub fn on_ready(&self, callback: impl FnOnce(&Engine, &Roster) + 'static) {
        if self.is_ready() {
            callback(&self.state, &self.roster);
        } else {
            self.pending.borrow_mut().push(Box::new(callback));
        }
    }

    fn notify_if_ready(&self) {
        if !self.is_ready() {
            return;
        }
        let callbacks = std::mem::take(&mut *self.pending.borrow_mut());
        if callbacks.is_empty() {
            return;
        }
        info!(callbacks = callbacks.len(), "Session ready");
        for callback in callbacks {
            callback(&self.state, &self.roster);
        }
        debug!("Ready callbacks finished");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("roster", &self.roster)
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}
