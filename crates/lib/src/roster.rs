//! A read-only mirror of the participant list.
//!
//! The host's participant feed delivers full snapshots. [`Roster`] diffs each
//! snapshot against the previous one and applies the differences to objects
//! owned by a read-only [`Engine`], so the state engine can hold
//! [`Value::Foreign`] references to participants.
//!
//! Each participant becomes an object whose id is the participant id, with
//! the keys `id`, `displayName` and `thumbnailUrl`. A participant seen for the
//! first time is also published on the roster engine's root under its id;
//! register a key-value handler on the root to observe arrivals. Participants
//! are never removed.
//!
//! ```
//! use wavestate::{Participant, Roster, Value};
//!
//! let roster = Roster::new();
//! roster
//!     .receive_participants(&[Participant::new("joe").with_display_name("Joe")])
//!     .unwrap();
//!
//! let joe = roster.participant("joe").unwrap();
//! assert_eq!(joe.get("displayName"), Some(Value::from("Joe")));
//! assert!(roster.engine().is_read_only());
//! ```

use std::{cell::RefCell, collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Result,
    clock::SystemClock,
    config::EngineConfig,
    constants::{PARTICIPANT_DISPLAY_NAME, PARTICIPANT_ID, PARTICIPANT_THUMBNAIL_URL},
    engine::Engine,
    object::StateObject,
    value::Value,
};

/// One entry of the participant feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

impl Participant {
    /// Creates a participant with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            thumbnail_url: None,
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the thumbnail URL.
    pub fn with_thumbnail_url(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    fn fields(&self) -> [(&'static str, Option<&str>); 3] {
        [
            (PARTICIPANT_ID, Some(self.id.as_str())),
            (PARTICIPANT_DISPLAY_NAME, self.display_name.as_deref()),
            (PARTICIPANT_THUMBNAIL_URL, self.thumbnail_url.as_deref()),
        ]
    }
}

/// Mirrors the participant feed onto a read-only engine.
#[derive(Debug)]
pub struct Roster {
    engine: Engine,
    known: RefCell<BTreeMap<String, Participant>>,
}

impl Roster {
    /// Creates an empty roster backed by a new read-only engine.
    pub fn new() -> Self {
        Self {
            engine: Engine::assemble(EngineConfig::default(), true, Arc::new(SystemClock)),
            known: RefCell::new(BTreeMap::new()),
        }
    }

    /// The read-only engine owning the participant objects.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Returns true once a snapshot has been received.
    pub fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }

    /// The object mirroring participant `id`.
    pub fn participant(&self, id: &str) -> Option<StateObject> {
        if id.is_empty() {
            return None;
        }
        self.engine.object(id)
    }

    /// The last received state of every known participant, ordered by id.
    pub fn participants(&self) -> Vec<Participant> {
        self.known.borrow().values().cloned().collect()
    }

    /// Applies a snapshot of the participant feed.
    ///
    /// New participants get an object and are published on the root; known
    /// ones have each changed field applied. Participants missing from the
    /// snapshot are kept as they were.
    pub fn receive_participants(&self, participants: &[Participant]) -> Result<()> {
        let mut appeared = 0;
        let mut changed = 0;
        for participant in participants {
            if participant.id.is_empty() {
                debug!("Skipping participant without id");
                continue;
            }
            let previous = self.known.borrow().get(&participant.id).cloned();
            match previous {
                Some(previous) => {
                    if previous == *participant {
                        continue;
                    }
                    let object = self.engine.object_or_placeholder(&participant.id);
                    for ((key, old), (_, new)) in previous.fields().into_iter().zip(participant.fields())
                    {
                        if old != new {
                            object.receive_value(key, Value::from(new))?;
                            changed += 1;
                        }
                    }
                }
                None => {
                    // Fields land before anyone can observe the new object.
                    let object = self.engine.object_or_placeholder(&participant.id);
                    for (key, value) in participant.fields() {
                        if let Some(value) = value {
                            object.receive_value_silently(key, Value::from(value))?;
                        }
                    }
                    self.engine
                        .root()
                        .receive_value(&participant.id, Value::Local(object))?;
                    appeared += 1;
                }
            }
            self.known
                .borrow_mut()
                .insert(participant.id.clone(), participant.clone());
        }
        self.engine.mark_ready();
        debug!(appeared, changed, "Applied participant snapshot");
        Ok(())
    }

    /// Applies a snapshot given as a JSON array of participants.
    pub fn receive_participants_json(&self, json: &str) -> Result<()> {
        let participants: Vec<Participant> = serde_json::from_str(json)?;
        self.receive_participants(&participants)
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}
