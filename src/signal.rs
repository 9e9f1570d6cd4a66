use std::cell::{Cell, Ref, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use crate::dependencies::Subscribers;
use crate::evaluation::Evaluation;
use crate::scheduler;
use crate::scope::Dispose;
use crate::value::{Access, Value};
use crate::{Computed, Derived, Error, Invalid, Observable, Version};

/// A mutable reactive cell. Reads inside an evaluation register
/// a dependency edge; writes invalidate dependents and flush the
/// scheduler unless a batch is open.
pub struct Signal<T> {
	body: Rc<SignalBody<T>>,
}

impl<T> Clone for Signal<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub struct SignalBody<T> {
	value: RefCell<T>,
	version: Cell<Version>,
	equals: Box<dyn Fn(&T, &T) -> bool>,
	used_by: RefCell<Subscribers>,
	disposed: Cell<bool>,
	this: Weak<SignalBody<T>>,
}

impl<T> Default for Signal<T>
where
	T: Default + PartialEq + 'static,
{
	fn default() -> Self {
		Signal::new(Default::default())
	}
}

pub trait Toggle {
	fn toggle(&mut self);
}

impl Toggle for bool {
	fn toggle(&mut self) {
		*self = !*self;
	}
}

impl<T> Signal<T>
where
	T: 'static,
{
	pub fn new(value: T) -> Self
	where
		T: PartialEq,
	{
		Signal::with_equals(value, T::eq)
	}

	/// A signal with a custom change detector. `equals` decides
	/// on every write whether dependents have to be notified.
	pub fn with_equals(value: T, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
		Signal {
			body: Rc::new_cyclic(|this| SignalBody {
				value: RefCell::new(value),
				version: Cell::new(Version::ZERO),
				equals: Box::new(equals),
				used_by: RefCell::new(Subscribers::new()),
				disposed: Cell::new(false),
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

	/// Tracked read: registers this signal as a dependency of
	/// the evaluation that is currently running.
	#[inline]
	pub fn get(&self, eval: &impl AsRef<Evaluation>) -> Result<Ref<'_, T>, Error> {
		self.body.get(eval.as_ref())
	}

	/// Untracked read: no dependency edge is recorded.
	#[inline]
	pub fn get_once(&self) -> Result<Ref<'_, T>, Error> {
		self.body.get_once()
	}

	#[inline]
	pub fn set(&self, value: T) -> Result<(), Error> {
		self.body.replace(value).map(|_| ())
	}

	#[inline]
	pub fn replace(&self, value: T) -> Result<T, Error> {
		self.body.replace(value)
	}

	/// Apply `func` to the current value through an untracked
	/// read, so a writer never becomes its own dependent.
	#[inline]
	pub fn update(&self, func: impl FnOnce(&mut T)) -> Result<(), Error>
	where
		T: Clone,
	{
		let mut next = self.get_once()?.clone();
		func(&mut next);
		self.set(next)
	}

	#[inline]
	pub fn toggle(&self) -> Result<(), Error>
	where
		T: Toggle + Clone,
	{
		self.update(T::toggle)
	}

	/// Unregister every dependent and mark the signal inert.
	/// Idempotent; later reads and writes fail with
	/// `UseAfterDispose`.
	pub fn dispose(&self) {
		if self.body.disposed.replace(true) {
			return;
		}
		self.body.used_by.borrow_mut().clear();
	}
}

impl<T> SignalBody<T>
where
	T: 'static,
{
	pub(crate) fn get_once(&self) -> Result<Ref<'_, T>, Error> {
		if self.disposed.get() {
			return Err(Error::UseAfterDispose);
		}
		Ok(self.value.borrow())
	}

	pub(crate) fn get<'a>(&'a self, eval: &'_ Evaluation) -> Result<Ref<'a, T>, Error> {
		if self.disposed.get() {
			return Err(Error::UseAfterDispose);
		}

		eval.record(self.this.upgrade().unwrap(), self.version.get());
		self.used_by.borrow_mut().add(eval.parent());

		Ok(self.value.borrow())
	}

	pub(crate) fn replace(&self, value: T) -> Result<T, Error> {
		if self.disposed.get() {
			return Err(Error::UseAfterDispose);
		}

		let old = {
			let mut current = self.value.borrow_mut();
			if (self.equals)(&current, &value) {
				// Not a change: keep the stored value, hand the
				// equal one back, notify nobody.
				return Ok(value);
			}
			std::mem::replace(&mut *current, value)
		};

		self.version.set(self.version.get().next());
		self.used_by.borrow().invalidate(Invalid::Definitely);
		scheduler::after_write()?;

		Ok(old)
	}
}

impl<T: 'static> Observable for SignalBody<T> {
	fn update(&self) -> Result<Version, Error> {
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

impl<T> Access<T> for SignalBody<T>
where
	T: 'static,
{
	fn get(&self, eval: &Evaluation) -> Result<crate::value::Ref<'_, T>, Error> {
		SignalBody::get(self, eval).map(crate::value::Ref::Cell)
	}

	fn get_once(&self) -> Result<crate::value::Ref<'_, T>, Error> {
		SignalBody::get_once(self).map(crate::value::Ref::Cell)
	}
}

impl<T> Dispose for Signal<T>
where
	T: 'static,
{
	fn dispose(&self) {
		Signal::dispose(self);
	}
}

impl<T> From<Signal<T>> for Value<T>
where
	T: 'static,
{
	fn from(signal: Signal<T>) -> Self {
		Value::new(signal.body)
	}
}

impl<T> Debug for Signal<T>
where
	T: 'static + Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.get_once() {
			Ok(value) => value.fmt(f),
			Err(_) => f.write_str("<disposed>"),
		}
	}
}
