//! Finality-provider lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a finality provider.
///
/// ```text
/// Created    --(register tx success)-->          Registered
/// Registered --(voting power > 0)-->             Active
/// Active     --(voting power == 0)-->            Inactive
/// Inactive   --(voting power > 0)-->             Active
/// any        --(jailed flag observed)-->         Jailed
/// Jailed     --(unjail tx success)-->            Inactive
/// any        --(slashed flag observed)-->        Slashed   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalityProviderStatus {
    /// Persisted locally, not yet registered on-chain
    Created,
    /// Registered on-chain, no voting power observed yet
    Registered,
    /// Has voting power; expected to vote
    Active,
    /// Registered but currently without voting power
    Inactive,
    /// Temporarily disabled by the chain; recoverable via unjail
    Jailed,
    /// Permanently disabled; no transition leaves this state
    Slashed,
}

impl FinalityProviderStatus {
    /// Whether no transition may ever leave this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Slashed)
    }

    /// Whether a finality provider in this status may run a live instance.
    ///
    /// Only registered providers that are not jailed or slashed are eligible.
    pub fn is_startable(&self) -> bool {
        matches!(self, Self::Registered | Self::Active | Self::Inactive)
    }

    /// Whether the store may move from `self` to `next`.
    ///
    /// Slashed is absorbing; every other transition is chain-driven and
    /// allowed (the chain is the authority on jailing and power).
    pub fn can_transition_to(&self, next: FinalityProviderStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        true
    }
}

impl fmt::Display for FinalityProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Registered => "REGISTERED",
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Jailed => "JAILED",
            Self::Slashed => "SLASHED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::FinalityProviderStatus as S;

    #[test]
    fn slashed_is_absorbing() {
        assert!(S::Slashed.is_terminal());
        assert!(!S::Slashed.can_transition_to(S::Active));
        assert!(!S::Slashed.can_transition_to(S::Inactive));
        assert!(S::Slashed.can_transition_to(S::Slashed));
    }

    #[test]
    fn startable_statuses() {
        assert!(S::Registered.is_startable());
        assert!(S::Active.is_startable());
        assert!(S::Inactive.is_startable());
        assert!(!S::Created.is_startable());
        assert!(!S::Jailed.is_startable());
        assert!(!S::Slashed.is_startable());
    }

    #[test]
    fn non_terminal_transitions_allowed() {
        assert!(S::Created.can_transition_to(S::Registered));
        assert!(S::Active.can_transition_to(S::Inactive));
        assert!(S::Jailed.can_transition_to(S::Inactive));
        assert!(S::Active.can_transition_to(S::Slashed));
    }
}
