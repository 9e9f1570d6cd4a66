use std::ops::Deref;
use std::rc::Rc;

use crate::{Error, Evaluation, Observable};

/// A type-erased read handle over any observable producing `T`,
/// so consumers can hold signals, computed cells and constants
/// uniformly.
pub struct Value<T> {
	value: Rc<dyn Access<T>>,
}

impl<T> Clone for Value<T> {
	fn clone(&self) -> Self {
		Value {
			value: self.value.clone(),
		}
	}
}

impl<T> Value<T>
where
	T: 'static,
{
	pub fn new(value: Rc<dyn Access<T>>) -> Self {
		Value { value }
	}

	pub fn get(&self, eval: &impl AsRef<Evaluation>) -> Result<Ref<'_, T>, Error> {
		self.value.get(eval.as_ref())
	}

	pub fn get_once(&self) -> Result<Ref<'_, T>, Error> {
		self.value.get_once()
	}
}

pub enum Ref<'a, T> {
	Plain(&'a T),
	Cell(std::cell::Ref<'a, T>),
}

impl<'a, T> Deref for Ref<'a, T> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		match self {
			Ref::Plain(value) => value,
			Ref::Cell(guard) => guard.deref(),
		}
	}
}

pub trait Access<T>: Observable {
	fn get(&self, eval: &Evaluation) -> Result<Ref<'_, T>, Error>;
	fn get_once(&self) -> Result<Ref<'_, T>, Error>;
}
