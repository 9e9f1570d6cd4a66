use std::cell::{Cell, RefCell};
use std::rc::Rc;

use reflow::macros::enclose;
use reflow::{
	batch, clear_error_handler, computed, effect, in_batch, set_effect_loop_limit,
	set_error_handler, Cleanup, Computed, Const, Effect, Error, Evaluation, Scope, Signal, Value,
};

mod mock;

use mock::Spy;

#[test]
fn signal_basics() {
	let a = Signal::new(10);
	assert_eq!(*a.get_once().unwrap(), 10);

	a.set(11).unwrap();
	assert_eq!(*a.get_once().unwrap(), 11);

	assert_eq!(a.replace(12).unwrap(), 11);
	a.update(|v| *v += 1).unwrap();
	assert_eq!(*a.get_once().unwrap(), 13);

	let b = Signal::<i32>::default();
	assert_eq!(*b.get_once().unwrap(), 0);

	let flag = Signal::new(false);
	flag.toggle().unwrap();
	assert!(*flag.get_once().unwrap());
	assert_eq!(format!("{flag:?}"), "true");
}

#[test]
fn effect_runs_eagerly_and_tracks() {
	let a = Signal::new(10);
	let b = a.map(|v| v + 10);

	assert_eq!(*b.get_once().unwrap(), 20);

	let mock = mock::SharedMock::new();
	mock.get().expect_trigger().times(1).return_const(());

	let _e = Effect::new(enclose!((a, b, mock) move |cx| {
		mock.get().trigger(*a.get(cx).unwrap() + *b.get(cx).unwrap());
	}));

	mock.get().checkpoint();
	mock.get().expect_trigger().times(1).return_const(());

	batch(enclose!((a) move || {
		a.set(20).unwrap();
		a.set(20).unwrap();
		a.set(20).unwrap();
	}))
	.unwrap();

	assert_eq!(*b.get_once().unwrap(), 30);
	mock.get().checkpoint();
}

#[test]
fn equality_short_circuit() {
	let a = Signal::new(1);

	let mock = mock::SharedMock::new();
	mock.get().expect_trigger().times(1).return_const(());

	let _e = Effect::new(enclose!((a, mock) move |cx| {
		mock.get().trigger(*a.get(cx).unwrap());
	}));

	mock.get().checkpoint();
	mock.get().expect_trigger().times(0).return_const(());

	a.set(1).unwrap();
	a.set(1).unwrap();

	mock.get().checkpoint();
}

#[test]
fn custom_equality() {
	// Only the parity of the value counts as a change.
	let a = Signal::with_equals(2, |old: &i32, new: &i32| old % 2 == new % 2);
	let runs = Rc::new(Cell::new(0));

	let _e = Effect::new(enclose!((a, runs) move |cx| {
		a.get(cx).unwrap();
		runs.set(runs.get() + 1);
	}));

	assert_eq!(runs.get(), 1);
	a.set(4).unwrap();
	assert_eq!(runs.get(), 1);
	// An equal write leaves the stored value untouched.
	assert_eq!(*a.get_once().unwrap(), 2);
	a.set(5).unwrap();
	assert_eq!(runs.get(), 2);
}

#[test]
fn computed_is_lazy() {
	let a = Signal::new(1);
	let calls = Rc::new(Cell::new(0));

	let c = Computed::new(enclose!((a, calls) move |cx| {
		calls.set(calls.get() + 1);
		*a.get(cx).unwrap() * 2
	}));

	let unrelated = Signal::new(0);
	unrelated.set(1).unwrap();
	a.set(2).unwrap();
	assert_eq!(calls.get(), 0);

	assert_eq!(*c.get_once().unwrap(), 4);
	assert_eq!(calls.get(), 1);
}

#[test]
fn computed_is_memoized() {
	let a = Signal::new(3);
	let calls = Rc::new(Cell::new(0));

	let c = Computed::new(enclose!((a, calls) move |cx| {
		calls.set(calls.get() + 1);
		*a.get(cx).unwrap() + 1
	}));

	assert_eq!(*c.get_once().unwrap(), 4);
	assert_eq!(*c.get_once().unwrap(), 4);
	assert_eq!(calls.get(), 1);

	let doubled = c.map(|v| v * 2);
	assert_eq!(*doubled.get_once().unwrap(), 8);
	assert_eq!(calls.get(), 1);

	a.set(4).unwrap();
	assert_eq!(*c.get_once().unwrap(), 5);
	assert_eq!(*doubled.get_once().unwrap(), 10);
	assert_eq!(calls.get(), 2);
}

#[test]
fn unchanged_computed_does_not_propagate() {
	let a = Signal::new(2);
	let parity = a.map(|v| v % 2);
	let runs = Rc::new(Cell::new(0));

	let _e = Effect::new(enclose!((parity, runs) move |cx| {
		parity.get(cx).unwrap();
		runs.set(runs.get() + 1);
	}));

	assert_eq!(runs.get(), 1);

	// The signal changes but the computed value does not, so
	// the effect must not re-run.
	a.set(4).unwrap();
	assert_eq!(runs.get(), 1);

	a.set(5).unwrap();
	assert_eq!(runs.get(), 2);
}

#[test]
fn glitch_free_diamond() {
	let s = Signal::new(1);
	let a = s.map(|v| v * 2);
	let b = s.map(|v| v + 1);

	let log = Rc::new(RefCell::new(Vec::new()));
	let _e = Effect::new(enclose!((a, b, log) move |cx| {
		log.borrow_mut()
			.push(*a.get(cx).unwrap() + *b.get(cx).unwrap());
	}));

	assert_eq!(*log.borrow(), vec![4]);

	s.set(10).unwrap();

	// Exactly one more run, and it never observes a mix of the
	// old and the new world.
	assert_eq!(*log.borrow(), vec![4, 31]);
}

#[test]
fn batches_coalesce_writes() {
	let s = Signal::new(0);
	let log = Rc::new(RefCell::new(Vec::new()));

	let _e = Effect::new(enclose!((s, log) move |cx| {
		log.borrow_mut().push(*s.get(cx).unwrap());
	}));

	assert!(!in_batch());
	batch(enclose!((s) move || {
		assert!(in_batch());
		s.set(1).unwrap();
		batch(enclose!((s) move || s.set(2).unwrap())).unwrap();
		assert!(in_batch());
	}))
	.unwrap();
	assert!(!in_batch());

	assert_eq!(*log.borrow(), vec![0, 2]);
}

#[test]
fn cleanup_runs_before_rerun_and_on_dispose() {
	let s = Signal::new(0);
	let events = Rc::new(RefCell::new(Vec::new()));

	let e = Effect::new(enclose!((s, events) move |cx| {
		let v = *s.get(cx).unwrap();
		events.borrow_mut().push(format!("run {v}"));
		Cleanup::new(enclose!((events) move || {
			events.borrow_mut().push(format!("cleanup {v}"));
		}))
	}));

	s.set(1).unwrap();
	e.dispose();
	e.dispose();

	assert_eq!(
		*events.borrow(),
		vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]
	);

	// Disposed effects stay quiet.
	s.set(2).unwrap();
	assert_eq!(events.borrow().len(), 4);
}

#[test]
fn cycle_is_detected() {
	let a_slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));

	let b = Computed::try_new(enclose!((a_slot) move |cx: &Evaluation| {
		match &*a_slot.borrow() {
			Some(a) => Ok(*a.get(cx)? + 1),
			None => Ok(0),
		}
	}));

	let a = Computed::try_new(enclose!((b) move |cx: &Evaluation| Ok(*b.get(cx)? + 1)));
	*a_slot.borrow_mut() = Some(a.clone());

	assert_eq!(a.get_once().unwrap_err(), Error::CycleDetected);
	// The node stays invalid, so the read can be retried.
	assert_eq!(a.get_once().unwrap_err(), Error::CycleDetected);
}

#[test]
fn computed_errors_are_not_cached() {
	let fail = Rc::new(Cell::new(true));
	let a = Signal::new(21);
	let calls = Rc::new(Cell::new(0));

	let c = Computed::try_new(enclose!((a, fail, calls) move |cx: &Evaluation| {
		calls.set(calls.get() + 1);
		let v = *a.get(cx)?;
		if fail.get() {
			Err(Error::run("not ready"))
		} else {
			Ok(v * 2)
		}
	}));

	assert_eq!(c.get_once().unwrap_err(), Error::Run("not ready".into()));
	assert_eq!(c.get_once().unwrap_err(), Error::Run("not ready".into()));
	assert_eq!(calls.get(), 2);

	fail.set(false);
	assert_eq!(*c.get_once().unwrap(), 42);
}

#[test]
fn effect_errors_do_not_starve_others() {
	let s = Signal::new(0);
	let order = Rc::new(RefCell::new(Vec::new()));

	let _bad = Effect::new(
		enclose!((s, order) move |cx: &Evaluation| -> Result<(), Error> {
			s.get(cx)?;
			order.borrow_mut().push("bad");
			Err(Error::run("boom"))
		}),
	);
	let _good = Effect::new(enclose!((s, order) move |cx: &Evaluation| {
		s.get(cx).unwrap();
		order.borrow_mut().push("good");
	}));

	assert_eq!(*order.borrow(), vec!["bad", "good"]);

	let error = s.set(1).unwrap_err();
	assert_eq!(error, Error::Run("boom".into()));
	assert_eq!(*order.borrow(), vec!["bad", "good", "bad", "good"]);
}

#[test]
fn error_handler_consumes_effect_errors() {
	let s = Signal::new(0);
	let seen = Rc::new(RefCell::new(Vec::new()));

	let _bad = Effect::new(
		enclose!((s) move |cx: &Evaluation| -> Result<(), Error> {
			s.get(cx)?;
			Err(Error::run("boom"))
		}),
	);

	set_error_handler(enclose!((seen) move |error| {
		seen.borrow_mut().push(error);
	}));

	s.set(1).unwrap();
	assert_eq!(*seen.borrow(), vec![Error::Run("boom".into())]);

	clear_error_handler();
	assert_eq!(s.set(2).unwrap_err(), Error::Run("boom".into()));
}

#[test]
fn effect_loop_limit() {
	set_effect_loop_limit(5);

	let s = Signal::new(0);
	let runs = Rc::new(Cell::new(0));

	let _e = Effect::new(enclose!((s, runs) move |cx| {
		let v = *s.get(cx).unwrap();
		runs.set(runs.get() + 1);
		if v > 0 && v < 100 {
			s.set(v + 1).unwrap();
		}
	}));

	assert_eq!(runs.get(), 1);

	let error = s.set(1).unwrap_err();
	assert_eq!(error, Error::EffectLoopLimitExceeded { limit: 5 });
	assert_eq!(runs.get(), 6);

	// The effect is suppressed, not disposed: the next external
	// write triggers it again.
	s.set(150).unwrap();
	assert_eq!(runs.get(), 7);
}

#[test]
fn writes_inside_effects_feed_the_same_flush() {
	let x = Signal::new(1);
	let y = Signal::new(0);
	let log = Rc::new(RefCell::new(Vec::new()));

	let _double = Effect::new(enclose!((x, y) move |cx| {
		let v = *x.get(cx).unwrap();
		y.set(v * 2).unwrap();
	}));
	let _watch = Effect::new(enclose!((y, log) move |cx| {
		log.borrow_mut().push(*y.get(cx).unwrap());
	}));

	assert_eq!(*log.borrow(), vec![2]);

	x.set(5).unwrap();
	assert_eq!(*log.borrow(), vec![2, 10]);
}

#[test]
fn untracked_reads_and_updates() {
	let tracked = Signal::new(0);
	let counter = Signal::new(0);
	let runs = Rc::new(Cell::new(0));

	let _e = Effect::new(enclose!((tracked, counter, runs) move |cx| {
		tracked.get(cx).unwrap();
		// An update goes through an untracked read, so the
		// effect never becomes its own dependent.
		counter.update(|v| *v += 1).unwrap();
		runs.set(runs.get() + 1);
	}));

	assert_eq!(runs.get(), 1);
	assert_eq!(*counter.get_once().unwrap(), 1);

	counter.set(10).unwrap();
	assert_eq!(runs.get(), 1);

	tracked.set(1).unwrap();
	assert_eq!(runs.get(), 2);
	assert_eq!(*counter.get_once().unwrap(), 11);
}

#[test]
fn dependencies_are_recomputed_every_run() {
	let flag = Signal::new(true);
	let a = Signal::new("a1");
	let b = Signal::new("b1");
	let runs = Rc::new(Cell::new(0));

	let _e = Effect::new(enclose!((flag, a, b, runs) move |cx| {
		if *flag.get(cx).unwrap() {
			a.get(cx).unwrap();
		} else {
			b.get(cx).unwrap();
		}
		runs.set(runs.get() + 1);
	}));

	assert_eq!(runs.get(), 1);

	b.set("b2").unwrap();
	assert_eq!(runs.get(), 1);

	a.set("a2").unwrap();
	assert_eq!(runs.get(), 2);

	flag.set(false).unwrap();
	assert_eq!(runs.get(), 3);

	// The edge to `a` is gone now.
	a.set("a3").unwrap();
	assert_eq!(runs.get(), 3);

	b.set("b3").unwrap();
	assert_eq!(runs.get(), 4);
}

#[test]
fn scope_teardown() {
	let scope = Scope::new();
	let s = Signal::new(0);
	let runs = Rc::new(Cell::new(0));
	let disposals = Rc::new(RefCell::new(Vec::new()));

	for id in 1..=3 {
		Effect::new_in(
			&scope,
			enclose!((s, runs, disposals) move |cx: &Evaluation| {
				s.get(cx).unwrap();
				runs.set(runs.get() + 1);
				Cleanup::new(enclose!((disposals) move || {
					disposals.borrow_mut().push(id);
				}))
			}),
		)
		.unwrap();
	}

	assert_eq!(runs.get(), 3);

	scope.destroy();
	scope.destroy();

	// Reverse registration order.
	assert_eq!(*disposals.borrow(), vec![3, 2, 1]);
	assert!(scope.is_destroyed());

	s.set(1).unwrap();
	assert_eq!(runs.get(), 3);

	assert_eq!(
		scope.own(Signal::new(0)).unwrap_err(),
		Error::UseAfterDispose
	);
	assert_eq!(
		Effect::new_in(&scope, |_: &Evaluation| {}).unwrap_err(),
		Error::UseAfterDispose
	);
}

#[test]
fn scopes_nest() {
	let parent = Scope::new();
	let child = parent.child().unwrap();

	let s = Signal::new(0);
	let runs = Rc::new(Cell::new(0));
	Effect::new_in(
		&child,
		enclose!((s, runs) move |cx: &Evaluation| {
			s.get(cx).unwrap();
			runs.set(runs.get() + 1);
		}),
	)
	.unwrap();

	let owned = Signal::new(7);
	parent.own(owned.clone()).unwrap();

	parent.destroy();
	assert!(child.is_destroyed());
	assert_eq!(owned.get_once().unwrap_err(), Error::UseAfterDispose);

	s.set(1).unwrap();
	assert_eq!(runs.get(), 1);

	assert!(parent.child().is_err());
}

#[test]
fn use_after_dispose() {
	let s = Signal::new(1);
	let c = s.map(|v| v * 2);
	assert_eq!(*c.get_once().unwrap(), 2);

	s.dispose();
	s.dispose();

	assert_eq!(s.get_once().unwrap_err(), Error::UseAfterDispose);
	assert_eq!(s.set(2).unwrap_err(), Error::UseAfterDispose);
	assert_eq!(s.replace(2).unwrap_err(), Error::UseAfterDispose);

	// The cached value survives, but a recompute reaching the
	// disposed signal fails.
	assert_eq!(*c.get_once().unwrap(), 2);

	let d = s.map(|v| v + 1);
	assert_eq!(d.get_once().unwrap_err(), Error::UseAfterDispose);

	c.dispose();
	assert_eq!(c.get_once().unwrap_err(), Error::UseAfterDispose);
}

#[test]
fn erased_values() {
	let s = Signal::new(1);
	let c = s.map(|v| v * 10);
	let k = Const::new(100);
	assert_eq!(*k.get(), 100);

	let values: Vec<Value<i32>> = vec![s.clone().into(), c.into(), k.into()];
	for value in &values {
		assert!(value.get_once().is_ok());
	}

	let total = Computed::try_new(enclose!((values) move |cx: &Evaluation| {
		let mut sum = 0;
		for value in &values {
			sum += *value.get(cx)?;
		}
		Ok(sum)
	}));

	assert_eq!(*total.get_once().unwrap(), 111);

	s.set(2).unwrap();
	assert_eq!(*total.get_once().unwrap(), 122);
}

#[test]
fn capture_macros() {
	let a = Signal::new(2);
	let doubled = computed!((a) cx => *a.get(cx).unwrap() * 2);
	assert_eq!(*doubled.get_once().unwrap(), 4);

	let runs = Rc::new(Cell::new(0));
	let _e = effect!((doubled, runs) cx => {
		doubled.get(cx).unwrap();
		runs.set(runs.get() + 1);
	});

	assert_eq!(runs.get(), 1);
	a.set(3).unwrap();
	assert_eq!(*doubled.get_once().unwrap(), 6);
	assert_eq!(runs.get(), 2);
}
