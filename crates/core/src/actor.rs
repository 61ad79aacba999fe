use serde::{Deserialize, Serialize};

/// The principal responsible for a state-affecting action.
///
/// Every audit entry and every status transition records who performed it:
/// either an authenticated staff user or the system itself (scanner sweeps,
/// queue workers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    /// A human user identified by id and email.
    User {
        /// Stable user identifier.
        id: String,
        /// Email address at the time of the action.
        email: String,
    },
    /// An automated component acting on its own authority.
    System,
}

impl Actor {
    /// Create a user actor.
    pub fn user(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self::User {
            id: id.into(),
            email: email.into(),
        }
    }

    /// A short label for log lines and audit columns.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::User { email, .. } => email.clone(),
            Self::System => "system".to_owned(),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_label() {
        assert_eq!(Actor::System.label(), "system");
    }

    #[test]
    fn user_label_is_email() {
        let actor = Actor::user("u-1", "archivist@example.gov");
        assert_eq!(actor.label(), "archivist@example.gov");
        assert_eq!(actor.to_string(), "archivist@example.gov");
    }

    #[test]
    fn serde_roundtrip() {
        let actor = Actor::user("u-9", "a@b.gov");
        let json = serde_json::to_string(&actor).unwrap();
        let back: Actor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, actor);
    }
}
