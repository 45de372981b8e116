//! Sync mode policy.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SyncMode;

/// Which mapper hook a login runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// `import_attributes` on a freshly seeded user.
    Import,
    /// `update_attributes` on an existing user.
    Update,
    /// No mapper runs.
    None,
}

impl Phase {
    /// Returns the phase label used in logs and events.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Update => "update",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides the phase for a login from the link's sync mode.
///
/// | mode   | first login | subsequent login |
/// |--------|-------------|------------------|
/// | IMPORT | Import      | None             |
/// | LEGACY | Import      | None             |
/// | FORCE  | Import      | Update           |
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncModePolicy;

impl SyncModePolicy {
    /// Returns the phase for a login.
    #[must_use]
    pub const fn decide(mode: SyncMode, is_first_login: bool) -> Phase {
        match (mode, is_first_login) {
            (_, true) => Phase::Import,
            (SyncMode::Force, false) => Phase::Update,
            (SyncMode::Import | SyncMode::Legacy, false) => Phase::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_login_always_imports() {
        for mode in [SyncMode::Import, SyncMode::Legacy, SyncMode::Force] {
            assert_eq!(SyncModePolicy::decide(mode, true), Phase::Import, "{mode}");
        }
    }

    #[test]
    fn only_force_updates_on_subsequent_login() {
        assert_eq!(SyncModePolicy::decide(SyncMode::Force, false), Phase::Update);
        assert_eq!(SyncModePolicy::decide(SyncMode::Import, false), Phase::None);
        assert_eq!(SyncModePolicy::decide(SyncMode::Legacy, false), Phase::None);
    }
}
