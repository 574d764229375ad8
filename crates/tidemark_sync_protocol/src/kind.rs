//! Synchronized entity kinds.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a synchronized entity.
///
/// Each kind is a separate partition in a [`crate::DeltaSet`] and is backed
/// by its own local store. Wire names are plural snake case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A flashcard deck.
    #[serde(rename = "decks")]
    Deck,
    /// A single card inside a deck.
    #[serde(rename = "cards")]
    Card,
    /// An exam attempt.
    #[serde(rename = "exams")]
    Exam,
    /// A timed study session.
    #[serde(rename = "study_sessions")]
    StudySession,
}

impl EntityKind {
    /// All kinds, in partition order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Deck,
        EntityKind::Card,
        EntityKind::Exam,
        EntityKind::StudySession,
    ];

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Deck => "decks",
            EntityKind::Card => "cards",
            EntityKind::Exam => "exams",
            EntityKind::StudySession => "study_sessions",
        }
    }

    /// Returns true if records of this kind fall back to `completed_at`
    /// when they carry no `updated_at`.
    pub fn uses_completion_time(&self) -> bool {
        matches!(self, EntityKind::Exam | EntityKind::StudySession)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ProtocolError;

    /// Accepts the wire name or its singular form (`decks` or `deck`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decks" | "deck" => Ok(EntityKind::Deck),
            "cards" | "card" => Ok(EntityKind::Card),
            "exams" | "exam" => Ok(EntityKind::Exam),
            "study_sessions" | "study_session" => Ok(EntityKind::StudySession),
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert_eq!("exam".parse::<EntityKind>().unwrap(), EntityKind::Exam);
        assert!(matches!(
            "quizzes".parse::<EntityKind>(),
            Err(ProtocolError::UnknownKind(_))
        ));
    }

    #[test]
    fn kind_serde_uses_wire_name() {
        let json = serde_json::to_string(&EntityKind::StudySession).unwrap();
        assert_eq!(json, "\"study_sessions\"");
    }

    #[test]
    fn completion_time_kinds() {
        assert!(EntityKind::Exam.uses_completion_time());
        assert!(EntityKind::StudySession.uses_completion_time());
        assert!(!EntityKind::Deck.uses_completion_time());
        assert!(!EntityKind::Card.uses_completion_time());
    }
}
