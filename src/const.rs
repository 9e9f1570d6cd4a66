use std::rc::{Rc, Weak};

use crate::value::Access;
use crate::{Error, Evaluation, Observable, Version};

/// An observable that never changes. Its version never
/// advances, so dependents that read it never revalidate
/// against it.
pub struct Const<T> {
	body: Rc<ConstBody<T>>,
}

struct ConstBody<T> {
	value: T,
}

impl<T> Clone for Const<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Const<T> {
	pub fn new(value: T) -> Self {
		Const {
			body: Rc::new(ConstBody { value }),
		}
	}

	pub fn get(&self) -> &T {
		&self.body.value
	}
}

impl<T> Observable for ConstBody<T>
where
	T: 'static,
{
	fn update(&self) -> Result<Version, Error> {
		Ok(self.version())
	}

	fn version(&self) -> Version {
		Version::ZERO
	}

	fn used_by(&self, _: Weak<dyn crate::Derived>) {}
	fn not_used_by(&self, _: &Weak<dyn crate::Derived>) {}
}

impl<T> Access<T> for ConstBody<T>
where
	T: 'static,
{
	fn get(&self, _: &Evaluation) -> Result<crate::value::Ref<'_, T>, Error> {
		Ok(crate::value::Ref::Plain(&self.value))
	}

	fn get_once(&self) -> Result<crate::value::Ref<'_, T>, Error> {
		Ok(crate::value::Ref::Plain(&self.value))
	}
}

impl<T> From<Const<T>> for crate::Value<T>
where
	T: 'static,
{
	fn from(value: Const<T>) -> Self {
		crate::Value::new(value.body)
	}
}
