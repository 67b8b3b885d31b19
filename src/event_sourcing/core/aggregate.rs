use std::collections::HashSet;

use super::event::{Event, Version};
use super::id_generator::{IdGenerator, DEFAULT_ID_ALPHABET, DEFAULT_ID_SIZE};

// ============================================================================
// Aggregate Root - Event Sourcing State Machine
// ============================================================================
//
// Key Principles:
// 1. Domain state is derived by folding events through `transition`
// 2. New events go to the uncommitted queue, stamped with the next version
// 3. Persisted events go to the committed log, and the root adopts their identity
// 4. A rejected transition leaves the root untouched
//
// The root is not synchronized. One writer per in-memory instance; concurrent
// writers of the same logical aggregate are arbitrated by the event store.
//
// ============================================================================

/// Domain fields of an aggregate and the function that folds events into them.
///
/// Implementations switch on [`Event::reason`], one arm per event kind, and
/// return `Err` for business-rule violations.
pub trait AggregateState: Clone + Send + Sync {
    /// Aggregate type recorded on every event this aggregate emits.
    const AGGREGATE_TYPE: &'static str;

    type Error: std::error::Error + Send + Sync + 'static;

    fn transition(&mut self, event: &Event) -> Result<(), Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum AggregateError<E> {
    #[error("transition rejected: {0}")]
    Transition(#[source] E),

    #[error("event duplication, event already exists: {aggregate_type}/{aggregate_id} version {version}")]
    DuplicateVersion {
        aggregate_id: String,
        aggregate_type: String,
        version: Version,
    },
}

type EventKey = (String, String, Version);

fn event_key(event: &Event) -> EventKey {
    (
        event.aggregate_id().to_string(),
        event.aggregate_type().to_string(),
        event.version(),
    )
}

/// Event-sourced aggregate: identity, version, committed and uncommitted
/// event lists, and the domain state `S` driven by them.
#[derive(Debug, Clone)]
pub struct AggregateRoot<S: AggregateState> {
    current_id: String,
    current_type: String,
    current_version: Version,
    committed_events: Vec<Event>,
    committed_index: HashSet<EventKey>,
    uncommitted_events: Vec<Event>,
    state: S,
}

impl<S: AggregateState> AggregateRoot<S> {
    /// Creates an empty aggregate whose identity is minted by `generator`.
    pub fn new(state: S, generator: &dyn IdGenerator) -> Self {
        Self::with_id(state, generator.generate(DEFAULT_ID_ALPHABET, DEFAULT_ID_SIZE))
    }

    pub fn with_id(state: S, id: impl Into<String>) -> Self {
        Self {
            current_id: id.into(),
            current_type: S::AGGREGATE_TYPE.to_string(),
            current_version: Version::EMPTY,
            committed_events: Vec::with_capacity(8),
            committed_index: HashSet::new(),
            uncommitted_events: Vec::new(),
            state,
        }
    }

    /// Rebuilds an aggregate from persisted history.
    ///
    /// An empty history yields an empty aggregate (version 0, empty id).
    pub fn rehydrate<I>(state: S, events: I) -> Result<Self, AggregateError<S::Error>>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut root = Self::with_id(state, String::new());
        for event in events {
            root.apply_committed(event)?;
        }
        Ok(root)
    }

    pub fn id(&self) -> &str {
        &self.current_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.current_type
    }

    pub fn version(&self) -> Version {
        self.current_version
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }

    /// Applies a new, not yet persisted event.
    ///
    /// On success the event is stamped with this aggregate's id, type and the
    /// next version, then queued as uncommitted.
    pub fn apply(&mut self, mut event: Event) -> Result<(), AggregateError<S::Error>> {
        self.state.transition(&event).map_err(AggregateError::Transition)?;

        self.current_version = self.current_version.next();

        event.set_aggregate_id(self.current_id.clone());
        event.set_aggregate_type(self.current_type.clone());
        event.set_version(self.current_version);
        self.uncommitted_events.push(event);

        Ok(())
    }

    /// Applies an event that is already persisted.
    ///
    /// The transition runs first, so a rejected event reports the transition
    /// error even when its version is also a duplicate. A duplicate
    /// `(id, type, version)` is then refused with `DuplicateVersion`; in that
    /// case the transition ran against a scratch copy of the state and the
    /// aggregate is left untouched.
    pub fn apply_committed(&mut self, event: Event) -> Result<(), AggregateError<S::Error>> {
        let key = event_key(&event);

        if self.committed_index.contains(&key) {
            let mut scratch = self.state.clone();
            scratch.transition(&event).map_err(AggregateError::Transition)?;

            tracing::warn!(
                aggregate_id = %key.0,
                aggregate_type = %key.1,
                version = %key.2,
                "Rejected duplicate committed event"
            );
            return Err(AggregateError::DuplicateVersion {
                aggregate_id: key.0,
                aggregate_type: key.1,
                version: key.2,
            });
        }

        self.state.transition(&event).map_err(AggregateError::Transition)?;

        self.current_id = key.0.clone();
        self.current_type = key.1.clone();
        self.current_version = key.2;
        self.committed_index.insert(key);
        self.committed_events.push(event);

        Ok(())
    }

    /// Snapshot of the committed log, oldest first.
    pub fn list_committed_events(&self) -> Vec<Event> {
        self.committed_events.clone()
    }

    /// Snapshot of the uncommitted queue in FIFO order.
    pub fn list_uncommitted_events(&self) -> Vec<Event> {
        self.uncommitted_events.clone()
    }

    pub fn has_uncommitted_events(&self) -> bool {
        !self.uncommitted_events.is_empty()
    }

    /// Marks a persisted event as committed.
    ///
    /// The uncommitted entry matching `event`'s aggregate id and version moves
    /// to the committed log. Returns `false` when nothing matched; that is not
    /// an error. An entry whose `(id, type, version)` is already in the
    /// committed log stays queued and `false` is returned.
    pub fn commit(&mut self, event: &Event) -> bool {
        let position = self
            .uncommitted_events
            .iter()
            .position(|pending| pending.aggregate_id() == event.aggregate_id() && pending.version() == event.version());

        let Some(position) = position else {
            return false;
        };

        let key = event_key(&self.uncommitted_events[position]);
        if !self.committed_index.insert(key) {
            tracing::warn!(
                aggregate_id = %event.aggregate_id(),
                version = %event.version(),
                "Refused to commit an event whose version is already committed"
            );
            return false;
        }

        let committed = self.uncommitted_events.remove(position);
        self.committed_events.push(committed);
        true
    }

    /// Commits every event of a saved batch. Returns how many matched.
    pub fn commit_all(&mut self, events: &[Event]) -> usize {
        events.iter().filter(|event| self.commit(event)).count()
    }
}

// ============================================================================
// Tests
// ============================================================================
