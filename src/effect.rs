use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::dependencies::Dependencies;
use crate::scheduler::{self, Reactive};
use crate::scope::{Dispose, Scope};
use crate::{Derived, Error, Evaluation, Invalid, State};

/// A cleanup callback captured from an effect run. It is called
/// exactly once: right before the next run of the same effect,
/// or on disposal, whichever comes first.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
	pub fn new(func: impl FnOnce() + 'static) -> Self {
		Cleanup(Box::new(func))
	}

	fn run(self) {
		(self.0)();
	}
}

/// Conversion for effect run functions, so they can return
/// nothing, a [`Cleanup`], or a fallible version of either.
pub trait IntoRunResult {
	fn into_run_result(self) -> Result<Option<Cleanup>, Error>;
}

impl IntoRunResult for () {
	fn into_run_result(self) -> Result<Option<Cleanup>, Error> {
		Ok(None)
	}
}

impl IntoRunResult for Cleanup {
	fn into_run_result(self) -> Result<Option<Cleanup>, Error> {
		Ok(Some(self))
	}
}

impl IntoRunResult for Option<Cleanup> {
	fn into_run_result(self) -> Result<Option<Cleanup>, Error> {
		Ok(self)
	}
}

impl IntoRunResult for Result<(), Error> {
	fn into_run_result(self) -> Result<Option<Cleanup>, Error> {
		self.map(|_| None)
	}
}

impl IntoRunResult for Result<Cleanup, Error> {
	fn into_run_result(self) -> Result<Option<Cleanup>, Error> {
		self.map(Some)
	}
}

impl IntoRunResult for Result<Option<Cleanup>, Error> {
	fn into_run_result(self) -> Result<Option<Cleanup>, Error> {
		self
	}
}

/// An eager subscriber. Runs once at creation to establish its
/// dependency set, then re-runs whenever a transitive dependency
/// actually changes. Never readable by other nodes.
#[derive(Clone)]
pub struct Effect {
	body: Rc<EffectBody>,
}

pub struct EffectBody {
	// Re-entrancy counter, scoped to one flush by the epoch.
	epoch: Cell<u64>,
	runs: Cell<u32>,
	// Set when the effect invalidates itself from within its own
	// run (it wrote one of its dependencies); picked up at the
	// end of the run to requeue it.
	retrigger: Cell<bool>,
	disposed: Cell<bool>,
	inner: RefCell<EffectInner>,
	this: Weak<EffectBody>,
}

struct EffectInner {
	state: State,
	#[allow(unused)]
	name: &'static str,
	func: Box<dyn Fn(&Evaluation) -> Result<Option<Cleanup>, Error>>,
	cleanup: Option<Cleanup>,
	dependencies: Dependencies,
}

impl Drop for EffectBody {
	fn drop(&mut self) {
		let refr = self.this.clone() as Weak<dyn Derived>;
		self.inner.get_mut().dependencies.detach(&refr);
	}
}

impl Effect {
	#[must_use]
	pub fn new<F, R>(func: F) -> Self
	where
		F: Fn(&Evaluation) -> R + 'static,
		R: IntoRunResult,
	{
		Self::new_with_name("<unnamed>", func)
	}

	#[must_use]
	pub fn new_with_name<F, R>(name: &'static str, func: F) -> Self
	where
		F: Fn(&Evaluation) -> R + 'static,
		R: IntoRunResult,
	{
		let effect = Effect {
			body: Rc::new_cyclic(|this| EffectBody {
				epoch: Cell::new(0),
				runs: Cell::new(0),
				retrigger: Cell::new(false),
				disposed: Cell::new(false),
				inner: RefCell::new(EffectInner {
					func: Box::new(move |ev| func(ev).into_run_result()),
					name,
					state: State::Invalid(Invalid::Definitely),
					cleanup: None,
					dependencies: Dependencies::new(),
				}),
				this: this.clone(),
			}),
		};

		// The initial run happens inside a batch, so writes made
		// by the run function are deferred and flushed once here.
		// Errors follow the scheduled-flush reporting path, since
		// creation may itself happen inside an open batch.
		if let Err(error) = scheduler::batch(|| effect.body.clone().run()) {
			scheduler::report(error);
		}

		effect
	}

	/// An effect owned by `scope`: it is disposed automatically
	/// when the scope is destroyed. Fails on a destroyed scope
	/// without running `func`.
	pub fn new_in<F, R>(scope: &Scope, func: F) -> Result<Self, Error>
	where
		F: Fn(&Evaluation) -> R + 'static,
		R: IntoRunResult,
	{
		if scope.is_destroyed() {
			return Err(Error::UseAfterDispose);
		}
		let effect = Effect::new(func);
		scope.own(effect.clone())?;
		Ok(effect)
	}

	/// Run the pending cleanup, unregister this effect from all
	/// of its dependencies and mark it inert. Idempotent; the
	/// effect never runs again afterwards.
	pub fn dispose(&self) {
		if self.body.disposed.replace(true) {
			return;
		}
		let Ok(mut inner) = self.body.inner.try_borrow_mut() else {
			// Disposed from inside its own run: the run loop sees
			// the flag and finalizes on its way out.
			return;
		};
		inner.state = State::Valid;
		let this = self.body.this.clone() as Weak<dyn Derived>;
		inner.dependencies.detach(&this);
		let cleanup = inner.cleanup.take();
		drop(inner);

		if let Some(cleanup) = cleanup {
			cleanup.run();
		}
	}
}

impl EffectBody {
	fn run(self: Rc<Self>) {
		if self.disposed.get() {
			return;
		}

		let mut inner = match self.inner.try_borrow_mut() {
			Ok(inner) => inner,
			Err(_) => {
				scheduler::report(Error::CycleDetected);
				return;
			}
		};

		let run_needed = match inner.state {
			State::Valid => false,
			State::Invalid(Invalid::Definitely) => true,
			State::Invalid(Invalid::Maybe) => match inner.dependencies.are_valid() {
				Ok(valid) => !valid,
				Err(error) => {
					scheduler::report(error);
					inner.state = State::Valid;
					return;
				}
			},
		};

		if !run_needed {
			inner.state = State::Valid;
			return;
		}

		let epoch = scheduler::epoch();
		if self.epoch.get() != epoch {
			self.epoch.set(epoch);
			self.runs.set(0);
		}
		self.runs.set(self.runs.get() + 1);

		let limit = scheduler::effect_loop_limit();
		if self.runs.get() > limit {
			if self.runs.get() == limit + 1 {
				scheduler::report(Error::EffectLoopLimitExceeded { limit });
			}
			inner.state = State::Valid;
			return;
		}

		if let Some(cleanup) = inner.cleanup.take() {
			cleanup.run();
		}

		let this = self.this.clone() as Weak<dyn Derived>;
		let evaluation = Evaluation::new(this.clone());
		let result = (inner.func)(&evaluation);
		inner.dependencies.swap(evaluation.take(), &this);
		inner.state = State::Valid;

		match result {
			Ok(cleanup) => inner.cleanup = cleanup,
			Err(error) => scheduler::report(error),
		}

		// The run disposed its own effect: finalize here, where
		// the inner borrow is available again.
		if self.disposed.get() {
			inner.dependencies.detach(&this);
			let cleanup = inner.cleanup.take();
			drop(inner);
			if let Some(cleanup) = cleanup {
				cleanup.run();
			}
			return;
		}

		// A write from inside the run invalidated this effect
		// while the borrow above was held: queue another pass.
		if self.retrigger.take() {
			inner.state = State::Invalid(Invalid::Definitely);
			drop(inner);
			scheduler::schedule(Rc::downgrade(&self) as Weak<dyn Reactive>);
		}
	}
}

impl Reactive for EffectBody {
	fn run(self: Rc<Self>) {
		EffectBody::run(self);
	}
}

impl Derived for EffectBody {
	fn invalidate(self: Rc<Self>, invalid: Invalid) {
		if self.disposed.get() {
			return;
		}
		match self.inner.try_borrow_mut() {
			Ok(mut inner) => {
				if matches!(inner.state, State::Valid) {
					inner.state = State::Invalid(invalid);
					drop(inner);
					scheduler::schedule(Rc::downgrade(&self) as Weak<dyn Reactive>);
				}
			}
			// The effect is running right now and wrote one of
			// its own dependencies.
			Err(_) => self.retrigger.set(true),
		}
	}
}

impl Dispose for Effect {
	fn dispose(&self) {
		Effect::dispose(self);
	}
}

impl std::fmt::Debug for Effect {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Effect")
			.field("name", &self.body.inner.borrow().name)
			.finish()
	}
}
