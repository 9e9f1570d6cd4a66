use std::cell::{Cell, Ref, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use crate::dependencies::{Dependencies, Subscribers};
use crate::scope::Dispose;
use crate::value::{Access, Value};
use crate::{Derived, Error, Evaluation, Invalid, Observable, State, Version};

/// A derived, memoized cell. Never evaluated until read; after
/// that, re-evaluated only when a dependency version check
/// proves the cached value stale.
pub struct Computed<T>
where
	T: 'static,
{
	body: Rc<ComputedBody<T>>,
}

impl<T> Clone for Computed<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub struct ComputedBody<T>
where
	T: 'static,
{
	value: RefCell<Option<T>>,
	version: Cell<Version>,
	// Set when this node is invalidated while its own evaluation
	// is running (a compute function wrote a signal, which it
	// must not do). Forces a re-run on the next read instead of
	// caching the inconsistent value as valid.
	stale: Cell<bool>,
	used_by: RefCell<Subscribers>,
	disposed: Cell<bool>,
	inner: RefCell<ComputedInner<T>>,
	this: Weak<ComputedBody<T>>,
}

struct ComputedInner<T>
where
	T: 'static,
{
	func: Box<dyn Fn(&Evaluation) -> Result<T, Error>>,
	equals: Box<dyn Fn(&T, &T) -> bool>,
	state: State,
	dependencies: Dependencies,
}

impl<T> Drop for ComputedBody<T>
where
	T: 'static,
{
	fn drop(&mut self) {
		let refr = self.this.clone() as Weak<dyn Derived>;
		self.inner.get_mut().dependencies.detach(&refr);
	}
}

impl<T> Computed<T>
where
	T: 'static,
{
	pub fn new<F>(func: F) -> Self
	where
		F: Fn(&Evaluation) -> T + 'static,
		T: PartialEq,
	{
		Computed::try_new(move |ev| Ok(func(ev)))
	}

	pub fn new_with_equals<F>(func: F, equals: impl Fn(&T, &T) -> bool + 'static) -> Self
	where
		F: Fn(&Evaluation) -> T + 'static,
	{
		Computed::try_new_with_equals(move |ev| Ok(func(ev)), equals)
	}

	/// A computed whose function can fail. Errors are never
	/// cached: the node stays invalid and the next read retries.
	pub fn try_new<F>(func: F) -> Self
	where
		F: Fn(&Evaluation) -> Result<T, Error> + 'static,
		T: PartialEq,
	{
		Computed::try_new_with_equals(func, T::eq)
	}

	pub fn try_new_with_equals<F>(func: F, equals: impl Fn(&T, &T) -> bool + 'static) -> Self
	where
		F: Fn(&Evaluation) -> Result<T, Error> + 'static,
	{
		Computed {
			body: Rc::new_cyclic(|this| ComputedBody {
				value: RefCell::new(None),
				version: Cell::new(Version::ZERO),
				stale: Cell::new(false),
				used_by: RefCell::new(Subscribers::new()),
				disposed: Cell::new(false),
				inner: RefCell::new(ComputedInner {
					func: Box::new(func),
					equals: Box::new(equals),
					state: State::Invalid(Invalid::Definitely),
					dependencies: Dependencies::new(),
				}),
				this: this.clone(),
			}),
		}
	}

	pub fn map<F, R>(&self, func: F) -> Computed<R>
	where
		F: Fn(&T) -> R + 'static,
		R: PartialEq + 'static,
	{
		let this = self.body.clone();
		Computed::try_new(move |ev| Ok(func(&*this.get(ev)?)))
	}

	/// Untracked read, still re-evaluating if stale.
	#[inline]
	pub fn get_once(&self) -> Result<Ref<'_, T>, Error> {
		self.body.get_once()
	}

	/// Tracked read: brings the value up to date and registers
	/// this computed as a dependency of the running evaluation.
	#[inline]
	pub fn get<'a>(&'a self, eval: &'a impl AsRef<Evaluation>) -> Result<Ref<'a, T>, Error> {
		self.body.get(eval.as_ref())
	}

	/// Unregister this node from every dependency and dependent
	/// and mark it inert. Idempotent.
	pub fn dispose(&self) {
		if self.body.disposed.replace(true) {
			return;
		}
		self.body.used_by.borrow_mut().clear();
		if let Ok(mut inner) = self.body.inner.try_borrow_mut() {
			let this = self.body.this.clone() as Weak<dyn Derived>;
			inner.dependencies.detach(&this);
		}
	}
}

impl<T> ComputedBody<T>
where
	T: 'static,
{
	fn cached(&self) -> Ref<'_, T> {
		// The caller just revalidated, so the cache is filled.
		Ref::map(self.value.borrow(), |v| v.as_ref().unwrap())
	}

	pub(crate) fn get_once(&self) -> Result<Ref<'_, T>, Error> {
		if self.disposed.get() {
			return Err(Error::UseAfterDispose);
		}
		{
			let mut inner = self
				.inner
				.try_borrow_mut()
				.map_err(|_| Error::CycleDetected)?;
			self.revalidate(&mut inner)?;
		}
		Ok(self.cached())
	}

	pub(crate) fn get<'a>(&'a self, eval: &'_ Evaluation) -> Result<Ref<'a, T>, Error> {
		if self.disposed.get() {
			return Err(Error::UseAfterDispose);
		}
		{
			let mut inner = self
				.inner
				.try_borrow_mut()
				.map_err(|_| Error::CycleDetected)?;
			self.revalidate(&mut inner)?;
		}

		eval.record(self.this.upgrade().unwrap(), self.version.get());
		self.used_by.borrow_mut().add(eval.parent());

		Ok(self.cached())
	}

	/// Bring the cached value up to date. `Invalid::Maybe` first
	/// rechecks dependency versions and skips the re-run when
	/// nothing actually changed; `Invalid::Definitely` re-runs
	/// unconditionally.
	fn revalidate(&self, inner: &mut ComputedInner<T>) -> Result<(), Error> {
		let run_needed = match inner.state {
			State::Valid => false,
			State::Invalid(Invalid::Definitely) => true,
			State::Invalid(Invalid::Maybe) => !inner.dependencies.are_valid()?,
		};

		if !run_needed {
			inner.state = State::Valid;
			return Ok(());
		}

		let this = self.this.clone() as Weak<dyn Derived>;
		let evaluation = Evaluation::new(this.clone());
		let result = (inner.func)(&evaluation);

		// Even a failed run read what it read: keep the edges in
		// sync so invalidation keeps reaching this node.
		inner.dependencies.swap(evaluation.take(), &this);

		let value = result?;

		let changed = match &*self.value.borrow() {
			Some(old) => !(inner.equals)(old, &value),
			None => true,
		};

		*self.value.borrow_mut() = Some(value);
		if changed {
			self.version.set(self.version.get().next());
		}

		inner.state = if self.stale.take() {
			State::Invalid(Invalid::Definitely)
		} else {
			State::Valid
		};

		Ok(())
	}
}

impl<T> Observable for ComputedBody<T>
where
	T: 'static,
{
	fn update(&self) -> Result<Version, Error> {
		if self.disposed.get() {
			return Ok(self.version.get());
		}
		let mut inner = self
			.inner
			.try_borrow_mut()
			.map_err(|_| Error::CycleDetected)?;
		self.revalidate(&mut inner)?;
		Ok(self.version.get())
	}

	fn version(&self) -> Version {
		self.version.get()
	}

	fn used_by(&self, derived: Weak<dyn Derived>) {
		self.used_by.borrow_mut().add(derived);
	}

	fn not_used_by(&self, derived: &Weak<dyn Derived>) {
		self.used_by.borrow_mut().remove(derived);
	}
}

impl<T> Derived for ComputedBody<T>
where
	T: 'static,
{
	fn invalidate(self: Rc<Self>, invalid: Invalid) {
		if self.disposed.get() {
			return;
		}
		match self.inner.try_borrow_mut() {
			Ok(mut inner) => {
				if matches!(inner.state, State::Valid) {
					inner.state = State::Invalid(invalid);
					drop(inner);
					self.used_by.borrow().invalidate(Invalid::Maybe);
				}
			}
			// Invalidated mid-evaluation.
			Err(_) => self.stale.set(true),
		}
	}
}

impl<T> Access<T> for ComputedBody<T>
where
	T: 'static,
{
	fn get(&self, eval: &Evaluation) -> Result<crate::value::Ref<'_, T>, Error> {
		ComputedBody::get(self, eval).map(crate::value::Ref::Cell)
	}

	fn get_once(&self) -> Result<crate::value::Ref<'_, T>, Error> {
		ComputedBody::get_once(self).map(crate::value::Ref::Cell)
	}
}

impl<T> Dispose for Computed<T>
where
	T: 'static,
{
	fn dispose(&self) {
		Computed::dispose(self);
	}
}

impl<T> From<Computed<T>> for Value<T>
where
	T: 'static,
{
	fn from(computed: Computed<T>) -> Self {
		Value::new(computed.body)
	}
}

impl<T> Debug for Computed<T>
where
	T: 'static + Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.get_once() {
			Ok(value) => value.fmt(f),
			Err(error) => f.write_fmt(format_args!("<{error:?}>")),
		}
	}
}
