//! Scenario tests for the hierarchical machine.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use statewright::core::behavior::{behavior, event_handler, guard};
use statewright::{FsmError, HierarchicalStateMachine, StateBehavior, Transition};

type Log = Rc<RefCell<Vec<String>>>;

struct Recorder {
    name: &'static str,
    log: Log,
}

impl StateBehavior for Recorder {
    fn enter(&mut self) {
        self.log.borrow_mut().push(format!("enter:{}", self.name));
    }
    fn exit(&mut self) {
        self.log.borrow_mut().push(format!("exit:{}", self.name));
    }
    fn update(&mut self) {
        self.log.borrow_mut().push(format!("update:{}", self.name));
    }
}

fn recorded_machine(
    ids: &[&'static str],
) -> (HierarchicalStateMachine<&'static str, &'static str>, Log) {
    let machine = HierarchicalStateMachine::new();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    for &id in ids {
        machine
            .add_state(
                id,
                behavior(Recorder {
                    name: id,
                    log: Rc::clone(&log),
                }),
            )
            .unwrap();
    }
    (machine, log)
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

#[test]
fn r_c1_c2_scenario() {
    let (machine, log) = recorded_machine(&["r", "c1", "c2"]);
    machine.add_child("r", "c1").unwrap();
    machine.add_child("r", "c2").unwrap();
    machine
        .add_transition(Transition::new("c1", "t", "c2"))
        .unwrap();

    machine.start().unwrap();
    assert_eq!(machine.active_path(), vec!["r", "c1"]);

    assert_eq!(machine.trigger("t"), Ok(true));

    assert_eq!(machine.active_path(), vec!["r", "c2"]);
    // The shared root is neither exited nor re-entered.
    assert_eq!(
        entries(&log),
        vec!["enter:r", "enter:c1", "exit:c1", "enter:c2"]
    );
}

#[test]
fn start_descends_the_initial_child_chain() {
    let (machine, log) = recorded_machine(&["r", "a", "a1", "a2"]);
    machine.add_child("r", "a").unwrap();
    machine.add_child("a", "a1").unwrap();
    machine.add_child("a", "a2").unwrap();
    machine.set_initial_child_of(&"a", &"a2").unwrap();

    machine.start().unwrap();

    assert_eq!(machine.active_path(), vec!["r", "a", "a2"]);
    assert_eq!(machine.current_leaf(), Some("a2"));
    assert_eq!(entries(&log), vec!["enter:r", "enter:a", "enter:a2"]);
}

#[test]
fn start_rejects_a_nested_initial_state() {
    let (machine, _) = recorded_machine(&["r", "c"]);
    machine.add_child("r", "c").unwrap();
    machine.set_initial_state("c").unwrap();

    assert_eq!(machine.start(), Err(FsmError::InitialStateNotRoot("c")));
    assert!(!machine.is_running());
}

#[test]
fn grafting_rules() {
    let (machine, _) = recorded_machine(&["a", "b", "c"]);
    machine.add_child("a", "b").unwrap();
    machine.add_child("b", "c").unwrap();

    // Duplicate grafts are quiet no-ops.
    machine.add_child("a", "b").unwrap();
    assert_eq!(machine.children_of(&"a"), Ok(vec!["b"]));

    assert!(matches!(
        machine.add_child("c", "a"),
        Err(FsmError::ChildRejected { .. })
    ));
    assert!(matches!(
        machine.add_child("c", "b"),
        Err(FsmError::ChildRejected { .. })
    ));
    assert_eq!(
        machine.add_child("a", "missing"),
        Err(FsmError::UnknownState("missing"))
    );

    assert_eq!(machine.parent_of(&"b"), Ok(Some("a")));
    assert_eq!(machine.roots(), vec!["a"]);
    assert!(machine.is_ancestor_of(&"a", &"c"));
    assert!(machine.is_initial_descendant_of(&"a", &"c"));
}

#[test]
fn detaching_restores_root_status() {
    let (machine, _) = recorded_machine(&["p", "c1", "c2"]);
    machine.add_child("p", "c1").unwrap();
    machine.add_child("p", "c2").unwrap();

    assert_eq!(machine.remove_child_from_parent(&"c1"), Ok(true));

    assert_eq!(machine.parent_of(&"c1"), Ok(None));
    assert_eq!(machine.initial_child_of(&"p"), Ok(Some("c2")));
    assert_eq!(machine.remove_child_from_parent(&"c1"), Ok(false));
}

#[test]
fn active_path_members_are_pinned() {
    let (machine, _) = recorded_machine(&["r", "c1", "c2"]);
    machine.add_child("r", "c1").unwrap();
    machine.add_child("r", "c2").unwrap();

    machine.start().unwrap();

    assert_eq!(machine.remove_state(&"r"), Err(FsmError::ProtectedState("r")));
    assert_eq!(
        machine.remove_state(&"c1"),
        Err(FsmError::ProtectedState("c1"))
    );
    assert_eq!(
        machine.remove_child_from_parent(&"c1"),
        Err(FsmError::ProtectedState("c1"))
    );

    // Inactive siblings stay fair game.
    assert_eq!(machine.remove_state(&"c2"), Ok(true));
}

#[test]
fn an_active_leaf_cannot_gain_its_first_child() {
    let (machine, _) = recorded_machine(&["r", "c", "extra"]);
    machine.add_child("r", "c").unwrap();

    machine.start().unwrap();
    assert_eq!(machine.active_path(), vec!["r", "c"]);

    assert!(matches!(
        machine.add_child("c", "extra"),
        Err(FsmError::ChildRejected { .. })
    ));

    // A parent that already has children may gain more while active.
    machine.add_child("r", "extra").unwrap();

    machine.stop().unwrap();
    machine.remove_child_from_parent(&"extra").unwrap();
    machine.add_child("c", "extra").unwrap();
}

#[test]
fn removing_a_state_cascades_and_orphans_children() {
    let (machine, _) = recorded_machine(&["r", "a", "a1"]);
    machine.add_child("r", "a").unwrap();
    machine.add_child("a", "a1").unwrap();
    let t = Transition::new("a", "t", "a");
    machine.add_transition(t.clone()).unwrap();
    machine.add_guard(t.clone(), guard(|| true)).unwrap();
    machine
        .add_event_handler("a", event_handler(|_| true))
        .unwrap();

    assert_eq!(machine.remove_state(&"a"), Ok(true));

    assert!(!machine.contains_transition(&t));
    assert_eq!(machine.transition_count(), 0);
    assert_eq!(machine.parent_of(&"a1"), Ok(None));
    assert_eq!(machine.children_of(&"r"), Ok(vec![]));
    assert!(matches!(
        machine.event_handlers_of(&"a"),
        Err(FsmError::UnknownState("a"))
    ));
}

#[test]
fn cross_level_transitions_never_fire() {
    let (machine, _) = recorded_machine(&["r", "a", "b", "a1"]);
    machine.add_child("r", "a").unwrap();
    machine.add_child("r", "b").unwrap();
    machine.add_child("a", "a1").unwrap();
    machine
        .add_transition(Transition::new("a1", "t", "b"))
        .unwrap();

    machine.start().unwrap();

    assert_eq!(machine.trigger("t"), Ok(false));
    assert_eq!(machine.active_path(), vec!["r", "a", "a1"]);
}

#[test]
fn triggers_bubble_from_the_leaf_outward() {
    let (machine, log) = recorded_machine(&["r", "a", "b", "a1", "a2"]);
    machine.add_child("r", "a").unwrap();
    machine.add_child("r", "b").unwrap();
    machine.add_child("a", "a1").unwrap();
    machine.add_child("a", "a2").unwrap();
    machine
        .add_transition(Transition::new("a1", "t", "a2"))
        .unwrap();
    machine
        .add_transition(Transition::new("a", "t", "b"))
        .unwrap();

    machine.start().unwrap();
    log.borrow_mut().clear();

    // The leaf's own transition shadows the parent's.
    assert_eq!(machine.trigger("t"), Ok(true));
    assert_eq!(machine.active_path(), vec!["r", "a", "a2"]);
    assert_eq!(entries(&log), vec!["exit:a1", "enter:a2"]);

    // With the leaf transition vetoed, the event reaches the parent.
    machine
        .add_transition(Transition::new("a2", "t", "a1"))
        .unwrap();
    machine
        .add_guard(Transition::new("a2", "t", "a1"), guard(|| false))
        .unwrap();
    log.borrow_mut().clear();

    assert_eq!(machine.trigger("t"), Ok(true));
    assert_eq!(machine.active_path(), vec!["r", "b"]);
    assert_eq!(entries(&log), vec!["exit:a2", "exit:a", "enter:b"]);
}

#[test]
fn events_exhaust_inner_chains_before_outer_ones() {
    let (machine, _) = recorded_machine(&["r", "c"]);
    machine.add_child("r", "c").unwrap();
    let calls = Rc::new(RefCell::new(Vec::new()));

    let outer = Rc::clone(&calls);
    machine
        .add_event_handler(
            "r",
            event_handler(move |_: &dyn Any| {
                outer.borrow_mut().push("outer");
                true
            }),
        )
        .unwrap();
    let inner_one = Rc::clone(&calls);
    machine
        .add_event_handler(
            "c",
            event_handler(move |_: &dyn Any| {
                inner_one.borrow_mut().push("inner:first");
                false
            }),
        )
        .unwrap();
    let inner_two = Rc::clone(&calls);
    machine
        .add_event_handler(
            "c",
            event_handler(move |event: &dyn Any| {
                inner_two.borrow_mut().push("inner:second");
                event.downcast_ref::<&str>().is_some()
            }),
        )
        .unwrap();

    machine.start().unwrap();

    // A consuming inner handler stops the bubbling before the root.
    assert_eq!(machine.send_event("ping"), Ok(true));
    assert_eq!(*calls.borrow(), vec!["inner:first", "inner:second"]);

    // An unconsumed event reaches the root chain.
    calls.borrow_mut().clear();
    assert_eq!(machine.send_event(42u32), Ok(true));
    assert_eq!(
        *calls.borrow(),
        vec!["inner:first", "inner:second", "outer"]
    );
}

#[test]
fn stop_unwinds_the_path_innermost_first() {
    let (machine, log) = recorded_machine(&["r", "a", "a1"]);
    machine.add_child("r", "a").unwrap();
    machine.add_child("a", "a1").unwrap();

    machine.start().unwrap();
    log.borrow_mut().clear();
    machine.stop().unwrap();

    assert_eq!(entries(&log), vec!["exit:a1", "exit:a", "exit:r"]);
    assert!(machine.active_path().is_empty());
    assert_eq!(machine.remove_state(&"r"), Ok(true));
}

#[test]
fn grafts_from_callbacks_wait_for_the_transition_in_flight() {
    let machine: HierarchicalStateMachine<&str, &str> = HierarchicalStateMachine::new();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    struct Grafting {
        machine: HierarchicalStateMachine<&'static str, &'static str>,
        log: Log,
    }

    impl StateBehavior for Grafting {
        fn enter(&mut self) {
            self.log.borrow_mut().push("enter:c2".to_string());
            // Deferred until the switch completes; c3 is not active, so the
            // graft itself is legal.
            self.machine.add_child("r", "c3").unwrap();
            assert_eq!(self.machine.parent_of(&"c3"), Ok(None));
            self.log.borrow_mut().push("queued-graft".to_string());
        }
    }

    for id in ["r", "c1", "c3"] {
        machine
            .add_state(
                id,
                behavior(Recorder {
                    name: id,
                    log: Rc::clone(&log),
                }),
            )
            .unwrap();
    }
    machine
        .add_state(
            "c2",
            behavior(Grafting {
                machine: machine.clone(),
                log: Rc::clone(&log),
            }),
        )
        .unwrap();
    machine.add_child("r", "c1").unwrap();
    machine.add_child("r", "c2").unwrap();
    machine
        .add_transition(Transition::new("c1", "t", "c2"))
        .unwrap();

    machine.start().unwrap();
    assert_eq!(machine.trigger("t"), Ok(true));

    // The graft landed once the queue drained.
    assert_eq!(machine.parent_of(&"c3"), Ok(Some("r")));
    assert_eq!(
        entries(&log),
        vec![
            "enter:r",
            "enter:c1",
            "exit:c1",
            "enter:c2",
            "queued-graft"
        ]
    );
}

#[test]
fn update_walks_the_path_outermost_first() {
    let (machine, log) = recorded_machine(&["r", "a", "a1"]);
    machine.add_child("r", "a").unwrap();
    machine.add_child("a", "a1").unwrap();

    machine.start().unwrap();
    log.borrow_mut().clear();
    machine.update().unwrap();

    assert_eq!(entries(&log), vec!["update:r", "update:a", "update:a1"]);
}

#[test]
fn lifecycle_completion_callbacks_observe_the_deferred_run() {
    let machine: HierarchicalStateMachine<&'static str, &'static str> =
        HierarchicalStateMachine::new();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    struct Stopper {
        machine: HierarchicalStateMachine<&'static str, &'static str>,
        log: Log,
    }

    impl StateBehavior for Stopper {
        fn enter(&mut self) {
            self.log.borrow_mut().push("enter:c".to_string());
            let log = Rc::clone(&self.log);
            self.machine
                .stop_with(move || log.borrow_mut().push("stopped".to_string()))
                .unwrap();
            // Deferred: the stop has not run while the enter callback does.
            assert_eq!(
                self.log.borrow().last().map(String::as_str),
                Some("enter:c")
            );
        }
        fn exit(&mut self) {
            self.log.borrow_mut().push("exit:c".to_string());
        }
    }

    machine
        .add_state(
            "r",
            behavior(Recorder {
                name: "r",
                log: Rc::clone(&log),
            }),
        )
        .unwrap();
    machine
        .add_state(
            "c",
            behavior(Stopper {
                machine: machine.clone(),
                log: Rc::clone(&log),
            }),
        )
        .unwrap();
    machine.add_child("r", "c").unwrap();

    let started = Rc::clone(&log);
    machine
        .start_with(move || started.borrow_mut().push("started".to_string()))
        .unwrap();

    assert!(!machine.is_running());
    assert_eq!(
        entries(&log),
        vec!["enter:r", "enter:c", "started", "exit:c", "exit:r", "stopped"]
    );

    let ticked = Rc::new(std::cell::Cell::new(false));
    let seen = Rc::clone(&ticked);
    machine.update_with(move || seen.set(true)).unwrap();
    assert!(ticked.get());
}
