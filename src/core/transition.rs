//! The transition triple connecting two states through a trigger.

use serde::{Deserialize, Serialize};

/// An immutable `(source, trigger, target)` triple.
///
/// A transition says: "while `source` is active, receiving `trigger` moves
/// the machine to `target`". Transitions are compared structurally: two
/// transitions are the same transition when all three fields compare equal
/// under the machine's configured comparers. Several transitions may share
/// the same `(source, trigger)` pair; guard conditions decide which one is
/// valid at evaluation time.
///
/// # Example
///
/// ```rust
/// use statewright::Transition;
///
/// let t = Transition::new("idle", "play", "running");
/// assert_eq!(t.source, "idle");
/// assert_eq!(t.target, "running");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition<S, T> {
    /// State the machine must be in for this transition to apply.
    pub source: S,
    /// Stimulus that fires the transition.
    pub trigger: T,
    /// State the machine moves to.
    pub target: S,
}

impl<S, T> Transition<S, T> {
    /// Create a transition from `source` through `trigger` to `target`.
    pub fn new(source: S, trigger: T, target: S) -> Self {
        Transition {
            source,
            trigger,
            target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_compare_structurally() {
        let a = Transition::new(1, 'x', 2);
        let b = Transition::new(1, 'x', 2);
        let c = Transition::new(1, 'y', 2);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn transition_fields_are_accessible() {
        let t = Transition::new("a", 1u8, "b");

        assert_eq!(t.source, "a");
        assert_eq!(t.trigger, 1);
        assert_eq!(t.target, "b");
    }
}
