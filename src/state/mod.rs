//! Generic entity lifecycle
//!
//! Every identified entity moves `Pending → Active → Ended`. Only `Active`
//! accepts chunk, meta and child events. Error events never change the
//! phase and are tracked outside the lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NotStartedError, ViolationKind};
use crate::registry::EntityRef;

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Not yet started
    Pending,
    /// Start observed
    Active,
    /// End observed (or abandoned)
    Ended,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an entity reached `Ended`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Termination {
    /// An end event was observed
    #[default]
    Normal,
    /// The owner ended while this entity was still open
    Abnormal,
}

/// State machine of one entity, holding its start and end payloads
#[derive(Debug, Clone, PartialEq)]
pub struct Lifecycle<S, E> {
    entity: EntityRef,
    phase: Phase,
    start: Option<S>,
    end: Option<E>,
    termination: Termination,
}

impl<S, E> Lifecycle<S, E> {
    /// A `Pending` lifecycle for `entity`
    pub fn new(entity: EntityRef) -> Self {
        Self {
            entity,
            phase: Phase::Pending,
            start: None,
            end: None,
            termination: Termination::Normal,
        }
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    pub fn ended(&self) -> bool {
        self.phase == Phase::Ended
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Start payload, if the entity has started
    pub fn start_event_maybe(&self) -> Option<&S> {
        self.start.as_ref()
    }

    /// Start payload, failing before the entity has started
    pub fn start_event(&self) -> Result<&S, NotStartedError> {
        self.start.as_ref().ok_or_else(|| NotStartedError {
            entity: self.entity.clone(),
        })
    }

    pub fn end_event(&self) -> Option<&E> {
        self.end.as_ref()
    }

    /// Whether a start would be accepted
    pub fn check_start(&self) -> Result<(), ViolationKind> {
        match self.phase {
            Phase::Pending => Ok(()),
            Phase::Active | Phase::Ended => Err(ViolationKind::DuplicateStart),
        }
    }

    /// `Pending → Active`. On a duplicate start nothing changes; the first start wins.
    pub fn start(&mut self, start: S) -> Result<(), ViolationKind> {
        self.check_start()?;
        self.start = Some(start);
        self.phase = Phase::Active;
        Ok(())
    }

    /// Whether an end would be accepted without a violation
    pub fn check_end(&self) -> Result<(), ViolationKind> {
        match self.phase {
            Phase::Active => Ok(()),
            Phase::Pending => Err(ViolationKind::PrematureEnd),
            Phase::Ended => Err(ViolationKind::EventAfterEnd),
        }
    }

    /// `Active → Ended`.
    ///
    /// A premature end still moves the entity to `Ended` (with no start
    /// payload) and reports `PrematureEnd`. An end after `Ended` changes
    /// nothing.
    pub fn end(&mut self, end: E) -> Result<(), ViolationKind> {
        let outcome = self.check_end();
        if self.phase != Phase::Ended {
            self.end = Some(end);
            self.phase = Phase::Ended;
        }
        outcome
    }

    /// Whether chunk, meta or child events are accepted
    pub fn ensure_active(&self) -> Result<(), ViolationKind> {
        match self.phase {
            Phase::Active => Ok(()),
            Phase::Pending => Err(ViolationKind::NotActive),
            Phase::Ended => Err(ViolationKind::EventAfterEnd),
        }
    }

    /// Force `Ended` with an abnormal termination. Returns false if already ended.
    pub fn abandon(&mut self) -> bool {
        if self.phase == Phase::Ended {
            return false;
        }
        self.phase = Phase::Ended;
        self.termination = Termination::Abnormal;
        true
    }
}

#[cfg(test)]
mod tests;
