//! Statewright: reentrant-safe plain and hierarchical state machines
//!
//! Statewright keeps two engines behind one vocabulary. The
//! [`PlainStateMachine`] holds exactly one active state; the
//! [`HierarchicalStateMachine`] activates a whole path of nested states from
//! a root down to a leaf. Both move along explicit `(source, trigger,
//! target)` transitions gated by guard conditions, deliver arbitrary events
//! to per-state handler chains, and are built to be driven from inside
//! their own callbacks: lifecycle calls issued by a behavior, guard or
//! handler are queued and run in order, never nested.
//!
//! # Core Concepts
//!
//! - **States**: caller-chosen ids paired with a [`StateBehavior`] object
//!   receiving enter/exit/update callbacks
//! - **Transitions**: explicit triples; a trigger fires the single valid
//!   one or reports ambiguity as an error
//! - **Guards**: predicates that must all pass for a transition to fire
//! - **Events**: bubble through handler chains until one handler consumes
//!   them
//!
//! # Example
//!
//! ```rust
//! use statewright::{PlainStateMachine, Transition};
//! use statewright::core::behavior::{behavior, guard};
//!
//! let machine = PlainStateMachine::new();
//! machine.add_state("closed", behavior(())).unwrap();
//! machine.add_state("open", behavior(())).unwrap();
//!
//! let push = Transition::new("closed", "push", "open");
//! machine.add_transition(push.clone()).unwrap();
//! machine.add_guard(push, guard(|| true)).unwrap();
//!
//! machine.start().unwrap();
//! assert!(machine.trigger("push").unwrap());
//! assert_eq!(machine.current_state(), Some("open"));
//! ```

pub mod core;
pub mod hierarchical;
pub mod plain;

mod collections;

// Re-export commonly used types
pub use crate::core::{EventHandler, FsmError, GuardCondition, StateBehavior, Transition};
pub use crate::hierarchical::HierarchicalStateMachine;
pub use crate::plain::PlainStateMachine;
