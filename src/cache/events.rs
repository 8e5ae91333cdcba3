//! Write events.
//!
//! The persistence layer reports every successful save and every pending
//! delete as a [`WriteEvent`]. The cache only looks at the entity type.

use std::fmt;

use uuid::Uuid;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// An entity was created or updated.
    Saved,
    /// An entity is about to be deleted.
    Deleting,
}

impl WriteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Deleting => "deleting",
        }
    }
}

/// A write to persistent state, identified by its `app.model` style entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    /// Unique identifier for log correlation (UUIDv4).
    pub id: Uuid,
    pub entity_type: String,
    pub kind: WriteKind,
}

impl WriteEvent {
    pub fn new(entity_type: impl Into<String>, kind: WriteKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: entity_type.into(),
            kind,
        }
    }

    pub fn saved(entity_type: impl Into<String>) -> Self {
        Self::new(entity_type, WriteKind::Saved)
    }

    pub fn deleting(entity_type: impl Into<String>) -> Self {
        Self::new(entity_type, WriteKind::Deleting)
    }
}

impl fmt::Display for WriteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity_type, self.kind.as_str())
    }
}
