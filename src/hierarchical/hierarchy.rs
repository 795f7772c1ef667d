//! The parent/child structure over registered states.

use std::cell::RefCell;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::core::behavior::SharedBehavior;
use crate::core::comparer::SharedComparer;
use crate::core::error::FsmError;
use crate::core::lock::{LockFlag, LockGuard};

struct Node<S> {
    id: S,
    behavior: SharedBehavior,
    parent: Option<S>,
    children: Vec<S>,
    initial_child: Option<S>,
}

/// A forest of states. Every registered state starts as a root; `add_child`
/// grafts it under a parent. Parents reference children (and children their
/// parent) by id, never by ownership, so the structure stays a flat arena.
///
/// Invariants kept here: a node has at most one parent, the parent relation
/// is acyclic, and a node with children always has exactly one initial
/// child. Also owns the machine-level initial-state cell, protected list and
/// remove-lock, which work exactly like the flat machine's.
pub(crate) struct StateHierarchy<S, T> {
    nodes: RefCell<Vec<Node<S>>>,
    initial: RefCell<Option<S>>,
    protected: RefCell<Vec<S>>,
    remove_lock: LockFlag,
    comparer: SharedComparer<S>,
    _triggers: PhantomData<T>,
}

impl<S, T> StateHierarchy<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    pub fn new(comparer: SharedComparer<S>) -> Self {
        StateHierarchy {
            nodes: RefCell::new(Vec::new()),
            initial: RefCell::new(None),
            protected: RefCell::new(Vec::new()),
            remove_lock: LockFlag::new(),
            comparer,
            _triggers: PhantomData,
        }
    }

    /// The first state added becomes the machine initial state.
    pub fn add(&self, state: S, behavior: SharedBehavior) -> Result<(), FsmError<S, T>> {
        if self.contains(&state) {
            return Err(FsmError::DuplicateState(state));
        }

        if self.initial.borrow().is_none() {
            *self.initial.borrow_mut() = Some(state.clone());
        }
        self.nodes.borrow_mut().push(Node {
            id: state,
            behavior,
            parent: None,
            children: Vec::new(),
            initial_child: None,
        });

        Ok(())
    }

    /// Remove a state: it is detached from its parent and its children
    /// become roots. Clears the machine initial state when it pointed at the
    /// removed id.
    pub fn remove(&self, state: &S) -> Result<bool, FsmError<S, T>> {
        let Some(index) = self.index_of(state) else {
            return Ok(false);
        };

        if self.remove_lock.is_locked() {
            return Err(FsmError::StateLocked(state.clone()));
        }
        if self.is_protected(state) {
            return Err(FsmError::ProtectedState(state.clone()));
        }

        self.detach_from_parent_unchecked(state);

        let mut nodes = self.nodes.borrow_mut();
        let children = nodes[index].children.clone();
        for child in &children {
            if let Some(at) = Self::index_in(&nodes, &self.comparer, child) {
                nodes[at].parent = None;
            }
        }
        nodes.remove(index);
        drop(nodes);

        let was_initial = self
            .initial
            .borrow()
            .as_ref()
            .map(|initial| self.comparer.eq(initial, state))
            .unwrap_or(false);
        if was_initial {
            *self.initial.borrow_mut() = None;
        }

        Ok(true)
    }

    /// Graft `child` under `parent`. The first child grafted becomes the
    /// parent's initial child. Grafting an existing parent/child pair again
    /// is a no-op.
    pub fn add_child(&self, parent: &S, child: &S) -> Result<(), FsmError<S, T>> {
        if !self.contains(parent) {
            return Err(FsmError::UnknownState(parent.clone()));
        }
        if !self.contains(child) {
            return Err(FsmError::UnknownState(child.clone()));
        }
        if self.is_immediate_parent_of(parent, child) {
            return Ok(());
        }
        if self.comparer.eq(parent, child) {
            return Err(FsmError::ChildRejected {
                parent: parent.clone(),
                child: child.clone(),
                reason: "a state cannot be its own child",
            });
        }
        if self.parent_of(child)?.is_some() {
            return Err(FsmError::ChildRejected {
                parent: parent.clone(),
                child: child.clone(),
                reason: "child already has a parent",
            });
        }
        if self.is_ancestor_of(child, parent) {
            return Err(FsmError::ChildRejected {
                parent: parent.clone(),
                child: child.clone(),
                reason: "child is an ancestor of parent",
            });
        }

        let mut nodes = self.nodes.borrow_mut();
        let parent_index = Self::index_in(&nodes, &self.comparer, parent)
            .ok_or_else(|| FsmError::UnknownState(parent.clone()))?;
        nodes[parent_index].children.push(child.clone());
        if nodes[parent_index].initial_child.is_none() {
            nodes[parent_index].initial_child = Some(child.clone());
        }
        let child_index = Self::index_in(&nodes, &self.comparer, child)
            .ok_or_else(|| FsmError::UnknownState(child.clone()))?;
        nodes[child_index].parent = Some(parent.clone());

        Ok(())
    }

    /// Detach `child` from its parent, making it a root again. `Ok(false)`
    /// when the state already is a root. When the detached child was the
    /// parent's initial child, the first remaining child takes over.
    pub fn detach_from_parent(&self, child: &S) -> Result<bool, FsmError<S, T>> {
        if !self.contains(child) {
            return Err(FsmError::UnknownState(child.clone()));
        }
        if self.parent_of(child)?.is_none() {
            return Ok(false);
        }

        self.detach_from_parent_unchecked(child);
        Ok(true)
    }

    pub fn set_initial_child_of(&self, parent: &S, child: &S) -> Result<(), FsmError<S, T>> {
        if !self.contains(parent) {
            return Err(FsmError::UnknownState(parent.clone()));
        }
        if !self.contains(child) {
            return Err(FsmError::UnknownState(child.clone()));
        }
        if !self.is_immediate_parent_of(parent, child) {
            return Err(FsmError::InvalidHierarchy {
                parent: parent.clone(),
                child: child.clone(),
            });
        }

        let mut nodes = self.nodes.borrow_mut();
        if let Some(index) = Self::index_in(&nodes, &self.comparer, parent) {
            nodes[index].initial_child = Some(child.clone());
        }

        Ok(())
    }

    pub fn set_initial(&self, state: S) -> Result<(), FsmError<S, T>> {
        if !self.contains(&state) {
            return Err(FsmError::UnknownState(state));
        }

        *self.initial.borrow_mut() = Some(state);
        Ok(())
    }

    pub fn initial(&self) -> Option<S> {
        self.initial.borrow().clone()
    }

    pub fn contains(&self, state: &S) -> bool {
        self.index_of(state).is_some()
    }

    pub fn behavior_of(&self, state: &S) -> Result<SharedBehavior, FsmError<S, T>> {
        let nodes = self.nodes.borrow();
        Self::index_in(&nodes, &self.comparer, state)
            .map(|index| Rc::clone(&nodes[index].behavior))
            .ok_or_else(|| FsmError::UnknownState(state.clone()))
    }

    /// `None` for roots.
    pub fn parent_of(&self, state: &S) -> Result<Option<S>, FsmError<S, T>> {
        let nodes = self.nodes.borrow();
        Self::index_in(&nodes, &self.comparer, state)
            .map(|index| nodes[index].parent.clone())
            .ok_or_else(|| FsmError::UnknownState(state.clone()))
    }

    /// Immediate children in graft order.
    pub fn children_of(&self, state: &S) -> Result<Vec<S>, FsmError<S, T>> {
        let nodes = self.nodes.borrow();
        Self::index_in(&nodes, &self.comparer, state)
            .map(|index| nodes[index].children.clone())
            .ok_or_else(|| FsmError::UnknownState(state.clone()))
    }

    pub fn initial_child_of(&self, state: &S) -> Result<Option<S>, FsmError<S, T>> {
        let nodes = self.nodes.borrow();
        Self::index_in(&nodes, &self.comparer, state)
            .map(|index| nodes[index].initial_child.clone())
            .ok_or_else(|| FsmError::UnknownState(state.clone()))
    }

    pub fn roots(&self) -> Vec<S> {
        self.nodes
            .borrow()
            .iter()
            .filter(|node| node.parent.is_none())
            .map(|node| node.id.clone())
            .collect()
    }

    pub fn states(&self) -> Vec<S> {
        self.nodes.borrow().iter().map(|node| node.id.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_immediate_parent_of(&self, parent: &S, child: &S) -> bool {
        let nodes = self.nodes.borrow();
        Self::index_in(&nodes, &self.comparer, child)
            .and_then(|index| nodes[index].parent.as_ref().map(|p| self.comparer.eq(p, parent)))
            .unwrap_or(false)
    }

    /// Distinct states sharing a parent. Two roots are not siblings.
    pub fn are_siblings(&self, a: &S, b: &S) -> bool {
        if self.comparer.eq(a, b) {
            return false;
        }
        let nodes = self.nodes.borrow();
        let parent_a = Self::index_in(&nodes, &self.comparer, a)
            .and_then(|index| nodes[index].parent.clone());
        let parent_b = Self::index_in(&nodes, &self.comparer, b)
            .and_then(|index| nodes[index].parent.clone());

        match (parent_a, parent_b) {
            (Some(pa), Some(pb)) => self.comparer.eq(&pa, &pb),
            _ => false,
        }
    }

    /// Parents are siblings of one another.
    pub fn are_cousins(&self, a: &S, b: &S) -> bool {
        let nodes = self.nodes.borrow();
        let parent_a = Self::index_in(&nodes, &self.comparer, a)
            .and_then(|index| nodes[index].parent.clone());
        let parent_b = Self::index_in(&nodes, &self.comparer, b)
            .and_then(|index| nodes[index].parent.clone());
        drop(nodes);

        match (parent_a, parent_b) {
            (Some(pa), Some(pb)) => self.are_siblings(&pa, &pb),
            _ => false,
        }
    }

    /// Ancestor at any distance; a state is not its own ancestor.
    pub fn is_ancestor_of(&self, ancestor: &S, descendant: &S) -> bool {
        let nodes = self.nodes.borrow();
        let mut cursor = Self::index_in(&nodes, &self.comparer, descendant)
            .and_then(|index| nodes[index].parent.clone());

        while let Some(parent) = cursor {
            if self.comparer.eq(&parent, ancestor) {
                return true;
            }
            cursor = Self::index_in(&nodes, &self.comparer, &parent)
                .and_then(|index| nodes[index].parent.clone());
        }

        false
    }

    /// `descendant` is reached from `ancestor` by following initial children
    /// only.
    pub fn is_initial_descendant_of(&self, ancestor: &S, descendant: &S) -> bool {
        let mut cursor = {
            let nodes = self.nodes.borrow();
            Self::index_in(&nodes, &self.comparer, ancestor)
                .and_then(|index| nodes[index].initial_child.clone())
        };

        while let Some(next) = cursor {
            if self.comparer.eq(&next, descendant) {
                return true;
            }
            let nodes = self.nodes.borrow();
            cursor = Self::index_in(&nodes, &self.comparer, &next)
                .and_then(|index| nodes[index].initial_child.clone());
        }

        false
    }

    /// The chain from `state` down to a leaf, following initial children.
    /// Acyclicity of the parent relation guarantees termination.
    pub fn initial_chain_from(
        &self,
        state: &S,
    ) -> Result<Vec<(S, SharedBehavior)>, FsmError<S, T>> {
        let mut chain = Vec::new();
        let mut cursor = state.clone();

        loop {
            let behavior = self.behavior_of(&cursor)?;
            chain.push((cursor.clone(), behavior));
            match self.initial_child_of(&cursor)? {
                Some(next) => cursor = next,
                None => return Ok(chain),
            }
        }
    }

    pub fn protect(&self, state: S) {
        self.protected.borrow_mut().push(state);
    }

    pub fn unprotect(&self, state: &S) {
        let mut protected = self.protected.borrow_mut();
        if let Some(index) = protected.iter().position(|s| self.comparer.eq(s, state)) {
            protected.remove(index);
        }
    }

    pub fn is_protected(&self, state: &S) -> bool {
        self.protected
            .borrow()
            .iter()
            .any(|s| self.comparer.eq(s, state))
    }

    /// Freeze all removals for the duration of the returned guard.
    pub fn remove_lock(&self) -> LockGuard<'_> {
        self.remove_lock.lock()
    }

    fn detach_from_parent_unchecked(&self, child: &S) {
        let mut nodes = self.nodes.borrow_mut();
        let Some(child_index) = Self::index_in(&nodes, &self.comparer, child) else {
            return;
        };
        let Some(parent) = nodes[child_index].parent.take() else {
            return;
        };
        let Some(parent_index) = Self::index_in(&nodes, &self.comparer, &parent) else {
            return;
        };

        let children = &mut nodes[parent_index].children;
        if let Some(at) = children.iter().position(|c| self.comparer.eq(c, child)) {
            children.remove(at);
        }

        let was_initial = nodes[parent_index]
            .initial_child
            .as_ref()
            .map(|c| self.comparer.eq(c, child))
            .unwrap_or(false);
        if was_initial {
            // The first remaining child takes over so a branch node never
            // loses its initial child while it still has children.
            nodes[parent_index].initial_child = nodes[parent_index].children.first().cloned();
        }
    }

    fn index_of(&self, state: &S) -> Option<usize> {
        Self::index_in(&self.nodes.borrow(), &self.comparer, state)
    }

    fn index_in(nodes: &[Node<S>], comparer: &SharedComparer<S>, state: &S) -> Option<usize> {
        nodes.iter().position(|node| comparer.eq(&node.id, state))
    }
}
