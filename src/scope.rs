use std::cell::RefCell;
use std::rc::Rc;

use crate::Error;

/// Anything with reactive lifetime: effects, signals, computed
/// cells and scopes themselves. `dispose` must be idempotent.
pub trait Dispose {
	fn dispose(&self);
}

/// A lifetime container. Handles registered with [`Scope::own`]
/// are disposed together, in reverse registration order, when
/// the scope is destroyed. Scopes nest into a strict tree: a
/// child scope is destroyed with its parent.
#[derive(Clone)]
pub struct Scope {
	inner: Rc<RefCell<ScopeInner>>,
}

struct ScopeInner {
	owned: Vec<Box<dyn Dispose>>,
	destroyed: bool,
}

impl Default for Scope {
	fn default() -> Self {
		Scope::new()
	}
}

impl Scope {
	pub fn new() -> Self {
		Scope {
			inner: Rc::new(RefCell::new(ScopeInner {
				owned: Vec::new(),
				destroyed: false,
			})),
		}
	}

	/// A nested scope, destroyed automatically when this scope
	/// is destroyed. Fails if this scope is already destroyed.
	pub fn child(&self) -> Result<Scope, Error> {
		let child = Scope::new();
		self.own(child.clone())?;
		Ok(child)
	}

	/// Register a handle for disposal on [`Scope::destroy`].
	/// A handle has at most one owner; registering it with two
	/// scopes only means its (idempotent) `dispose` runs twice.
	pub fn own(&self, handle: impl Dispose + 'static) -> Result<(), Error> {
		let mut inner = self.inner.borrow_mut();
		if inner.destroyed {
			return Err(Error::UseAfterDispose);
		}
		inner.owned.push(Box::new(handle));
		Ok(())
	}

	/// Dispose every owned handle in reverse registration order
	/// and mark the scope destroyed. Idempotent; later `own`
	/// calls fail with `UseAfterDispose`.
	pub fn destroy(&self) {
		let owned = {
			let mut inner = self.inner.borrow_mut();
			if inner.destroyed {
				return;
			}
			inner.destroyed = true;
			std::mem::take(&mut inner.owned)
		};

		for handle in owned.into_iter().rev() {
			handle.dispose();
		}
	}

	pub fn is_destroyed(&self) -> bool {
		self.inner.borrow().destroyed
	}
}

impl Dispose for Scope {
	fn dispose(&self) {
		self.destroy();
	}
}

impl std::fmt::Debug for Scope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let inner = self.inner.borrow();
		f.debug_struct("Scope")
			.field("owned", &inner.owned.len())
			.field("destroyed", &inner.destroyed)
			.finish()
	}
}
