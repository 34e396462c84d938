//! End-to-end engine behavior against the in-memory store.

use statekeep::{
    events, states, Args, Context, FailPoint, FsmError, HistoryIter, Machine, MachineBuilder,
    MachineRecord, MemoryStore, State, Store, StoreCheckpoint, StoreError, StoreTransaction,
    Transition,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

states! { LOCKED, UNLOCKED }
events! { COIN, PUSH }

fn transitions() -> Vec<Transition> {
    vec![
        Transition::new(LOCKED, COIN, UNLOCKED),
        Transition::new(UNLOCKED, PUSH, LOCKED),
    ]
}

fn persistent(store: &Arc<MemoryStore>, machine_id: &str) -> Machine {
    MachineBuilder::new()
        .initial(LOCKED)
        .transitions(transitions())
        .machine_id(machine_id)
        .store(store.clone())
        .build(&Context::background())
        .unwrap()
}

fn load(store: &Arc<MemoryStore>, machine_id: &str) -> Result<Machine, FsmError> {
    Machine::load_existing(
        &Context::background(),
        store.clone(),
        machine_id,
        transitions(),
    )
}

fn committed_state(store: &MemoryStore, machine_id: &str) -> State {
    store
        .find_machine(&Context::background(), machine_id)
        .unwrap()
        .unwrap()
        .current_state
}

#[test]
fn turnstile_scenario() {
    let store = Arc::new(MemoryStore::new());
    let machine = persistent(&store, "turnstile-01");
    let ctx = Context::background();

    let err = machine.transition(&ctx, &PUSH).unwrap_err();
    assert!(err.is_invalid_event());
    assert_eq!(machine.current_state(), LOCKED);

    assert_eq!(machine.transition(&ctx, &COIN).unwrap(), UNLOCKED);
    let history = machine.history(&ctx).unwrap();
    assert_eq!(history.len(), 1);
    let first = &history.records()[0];
    assert_eq!(
        (&first.from, &first.to, &first.event),
        (&LOCKED, &UNLOCKED, &COIN)
    );

    let err = machine.transition(&ctx, &COIN).unwrap_err();
    assert!(err.is_invalid_event());
    assert_eq!(machine.current_state(), UNLOCKED);

    assert_eq!(machine.transition(&ctx, &PUSH).unwrap(), LOCKED);
    let history = machine.history(&ctx).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.path(), vec![&LOCKED, &UNLOCKED, &LOCKED]);
    assert_eq!(committed_state(&store, "turnstile-01"), LOCKED);
}

#[test]
fn denied_transition_writes_no_history() {
    let store = Arc::new(MemoryStore::new());
    let machine = persistent(&store, "t");
    machine.register_guard(LOCKED, COIN, |_, _| false).unwrap();
    let ctx = Context::background();

    let err = machine.transition(&ctx, &COIN).unwrap_err();

    assert!(err.is_denied());
    assert_eq!(machine.current_state(), LOCKED);
    assert_eq!(store.history_len("t"), 0);
}

#[test]
fn failed_entry_action_reverts_and_skips_persistence() {
    let store = Arc::new(MemoryStore::new());
    let machine = persistent(&store, "t");
    machine.register_entry_action(UNLOCKED, |_, _| Err("display offline".into()));
    let ctx = Context::background();

    let err = machine.transition(&ctx, &COIN).unwrap_err();

    assert!(matches!(err, FsmError::EntryAction { ref state, .. } if *state == UNLOCKED));
    assert_eq!(machine.current_state(), LOCKED);
    assert_eq!(committed_state(&store, "t"), LOCKED);
    assert_eq!(store.history_len("t"), 0);
}

#[test]
fn every_store_failure_reverts_without_partial_commit() {
    let points = [
        FailPoint::Begin,
        FailPoint::TxFindMachine,
        FailPoint::AppendHistory,
        FailPoint::UpdateState,
        FailPoint::Commit,
    ];

    for point in points {
        let store = Arc::new(MemoryStore::new());
        let machine = persistent(&store, "t");
        let entered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&entered);
        machine.register_entry_action(UNLOCKED, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let ctx = Context::background();
        store.inject(point);
        let err = machine.transition(&ctx, &COIN).unwrap_err();

        assert!(err.is_persistence(), "{point}: {err}");
        assert!(!err.is_rollback_failure(), "{point}: {err}");
        assert_eq!(entered.load(Ordering::SeqCst), 1, "{point}");
        assert_eq!(machine.current_state(), LOCKED, "{point}");

        // A fresh read from the store sees nothing of the failed attempt.
        assert_eq!(committed_state(&store, "t"), LOCKED, "{point}");
        assert_eq!(store.history_len("t"), 0, "{point}");

        store.clear_faults();
        assert_eq!(machine.transition(&ctx, &COIN).unwrap(), UNLOCKED);
        assert_eq!(store.history_len("t"), 1, "{point}");
    }
}

#[test]
fn rollback_failure_is_reported_alongside_original_error() {
    let store = Arc::new(MemoryStore::new());
    let machine = persistent(&store, "t");
    store.inject(FailPoint::Commit);
    store.inject(FailPoint::Rollback);
    let ctx = Context::background();

    let err = machine.transition(&ctx, &COIN).unwrap_err();

    assert!(err.is_rollback_failure());
    let message = err.to_string();
    assert!(message.contains("injected failure at commit"), "{message}");
    assert!(
        message.contains("injected failure at rollback"),
        "{message}"
    );
    assert!(err.store_error().is_some());
    assert!(err.rollback_error().is_some());
    assert_eq!(machine.current_state(), LOCKED);
    assert_eq!(store.history_len("t"), 0);
}

#[test]
fn cancelled_context_fails_persistence_and_reverts() {
    let store = Arc::new(MemoryStore::new());
    let machine = persistent(&store, "t");
    let ctx = Context::background();
    ctx.cancel();

    let err = machine.transition(&ctx, &COIN).unwrap_err();

    assert!(err.store_error().is_some_and(|e| e.is_interrupted()));
    assert_eq!(machine.current_state(), LOCKED);
    assert_eq!(store.history_len("t"), 0);
}

#[test]
fn reconstruction_loads_committed_state() {
    let store = Arc::new(MemoryStore::new());
    let ctx = Context::background();
    persistent(&store, "t").transition(&ctx, &COIN).unwrap();

    let rebuilt = persistent(&store, "t");
    assert_eq!(rebuilt.current_state(), UNLOCKED);

    let loaded = load(&store, "t").unwrap();
    assert_eq!(loaded.current_state(), UNLOCKED);
    assert_eq!(loaded.history(&ctx).unwrap().len(), 1);
}

#[test]
fn load_existing_checks_preconditions_and_never_creates() {
    let store = Arc::new(MemoryStore::new());
    let ctx = Context::background();

    let err = load(&store, "").unwrap_err();
    assert!(err.is_precondition());

    let err = load(&store, "missing").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.machine_count(), 0);

    store.create_machine(&ctx, "present", &UNLOCKED).unwrap();
    store.inject(FailPoint::FindMachine);
    let err = load(&store, "present").unwrap_err();
    assert!(matches!(err, FsmError::LoadFailed { .. }));
}

#[test]
fn duplicate_transitions_fail_before_any_store_call() {
    let store = Arc::new(MemoryStore::new());
    store.inject(FailPoint::FindMachine);

    let mut table = transitions();
    table.push(Transition::new(LOCKED, COIN, LOCKED));

    let err = MachineBuilder::new()
        .initial(LOCKED)
        .transitions(table.clone())
        .machine_id("t")
        .store(store.clone())
        .build(&Context::background())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "duplicate transition defined from state LOCKED for event COIN"
    );

    let loaded = Machine::load_existing(&Context::background(), store.clone(), "t", table);
    assert!(loaded.unwrap_err().is_duplicate_transition());
    assert_eq!(store.machine_count(), 0);
}

/// Store whose lookups miss, as if another process inserts the record
/// between the lookup and the create.
struct LaggingLookup(MemoryStore);

impl Store for LaggingLookup {
    fn find_machine(
        &self,
        _ctx: &Context,
        _machine_id: &str,
    ) -> Result<Option<MachineRecord>, StoreError> {
        Ok(None)
    }

    fn create_machine(
        &self,
        ctx: &Context,
        machine_id: &str,
        initial: &State,
    ) -> Result<MachineRecord, StoreError> {
        self.0.create_machine(ctx, machine_id, initial)
    }

    fn begin<'a>(&'a self, ctx: &Context) -> Result<Box<dyn StoreTransaction + 'a>, StoreError> {
        self.0.begin(ctx)
    }

    fn query_history<'a>(
        &'a self,
        ctx: &Context,
        machine_id: &str,
    ) -> Result<HistoryIter<'a>, StoreError> {
        self.0.query_history(ctx, machine_id)
    }
}

#[test]
fn racing_creation_surfaces_as_load_failure() {
    let ctx = Context::background();
    let store = Arc::new(LaggingLookup(MemoryStore::new()));
    store.0.create_machine(&ctx, "t", &UNLOCKED).unwrap();

    let err = MachineBuilder::new()
        .initial(LOCKED)
        .transitions(transitions())
        .machine_id("t")
        .store(store.clone())
        .build(&ctx)
        .unwrap_err();

    assert!(matches!(err, FsmError::LoadFailed { .. }));
    assert!(err.store_error().is_some_and(|e| e.is_already_exists()));
    assert_eq!(store.0.machine_count(), 1);
}

#[test]
fn concurrent_transitions_are_serialized() {
    const THREADS: usize = 8;
    const ATTEMPTS: usize = 25;

    let store = Arc::new(MemoryStore::new());
    let machine = persistent(&store, "t");
    let successes = AtomicUsize::new(0);

    thread::scope(|scope| {
        for worker in 0..THREADS {
            let machine = &machine;
            let successes = &successes;
            scope.spawn(move || {
                let ctx = Context::background();
                for attempt in 0..ATTEMPTS {
                    let event = &[COIN, PUSH][(worker + attempt) % 2];
                    if machine.transition(&ctx, &event).is_ok() {
                        successes.fetch_add(1, Ordering::SeqCst);
                    }
                    let state = machine.current_state();
                    assert!(state == LOCKED || state == UNLOCKED);
                }
            });
        }
    });

    let successes = successes.load(Ordering::SeqCst);
    assert!(successes > 0);
    assert_eq!(store.history_len("t"), successes);
    assert_eq!(committed_state(&store, "t"), machine.current_state());

    let history = machine.history(&Context::background()).unwrap();
    for pair in history.records().windows(2) {
        assert_eq!(pair[0].to, pair[1].from);
    }
}

#[test]
fn hooks_receive_args_and_context() {
    let machine = Machine::new(LOCKED, transitions()).unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    machine
        .register_transition_callback(LOCKED, COIN, move |ctx, args| {
            ctx.check()?;
            let cents = args.find::<u32>().ok_or("no coin value")?;
            counter.fetch_add(*cents as usize, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    let ctx = Context::background();
    let err = machine.transition(&ctx, &COIN).unwrap_err();
    assert!(matches!(err, FsmError::Callback { .. }));

    machine
        .transition_with(&ctx, &COIN, &Args::new().with("slot-a").with(25_u32))
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 25);
}

#[test]
fn checkpointed_store_survives_restart() {
    let ctx = Context::background();
    let bytes = {
        let store = Arc::new(MemoryStore::new());
        let machine = persistent(&store, "t");
        machine.transition(&ctx, &COIN).unwrap();
        store.checkpoint().to_bytes().unwrap()
    };

    let checkpoint = StoreCheckpoint::from_bytes(&bytes).unwrap();
    let restored = Arc::new(MemoryStore::from_checkpoint(checkpoint).unwrap());
    let machine = persistent(&restored, "t");
    assert_eq!(machine.current_state(), UNLOCKED);

    machine.transition(&ctx, &PUSH).unwrap();
    let history = machine.history(&ctx).unwrap();
    assert_eq!(history.path(), vec![&LOCKED, &UNLOCKED, &LOCKED]);
}
