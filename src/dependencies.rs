use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::{Derived, Error, Invalid, Observable, Version};

/// The forward edge set of a derived node: every observable it
/// read during its most recent run, together with the version
/// that was observed. Rebuilt from scratch on every run, so
/// conditional reads naturally retarget the edges.
pub struct Dependencies {
	based_on: SmallVec<[(Rc<dyn Observable>, Version); 4]>,
}

fn addr(observable: &Rc<dyn Observable>) -> *const () {
	Rc::as_ptr(observable) as *const ()
}

impl Default for Dependencies {
	fn default() -> Self {
		Dependencies::new()
	}
}

impl Dependencies {
	pub fn new() -> Self {
		Dependencies {
			based_on: SmallVec::new(),
		}
	}

	pub(crate) fn record(&mut self, observable: Rc<dyn Observable>, version: Version) {
		let key = addr(&observable);
		match self.based_on.iter_mut().find(|(o, _)| addr(o) == key) {
			Some(entry) => entry.1 = version,
			None => self.based_on.push((observable, version)),
		}
	}

	/// Check whether every dependency still sits at the version
	/// observed during the last run. Brings lazily invalidated
	/// dependencies up to date along the way, each at most once
	/// per flush thanks to their own valid-state cache.
	pub fn are_valid(&self) -> Result<bool, Error> {
		for (base, version) in self.based_on.iter() {
			if base.update()? != *version {
				return Ok(false);
			}
		}

		Ok(true)
	}

	/// Replace the edge set with the one captured by the latest
	/// run and unregister `parent` from every observable that is
	/// no longer read.
	pub fn swap(&mut self, next: Dependencies, parent: &Weak<dyn Derived>) {
		let prev = std::mem::replace(&mut self.based_on, next.based_on);

		for (old, _) in prev {
			let key = addr(&old);
			if !self.based_on.iter().any(|(new, _)| addr(new) == key) {
				old.not_used_by(parent);
			}
		}
	}

	/// Unregister `parent` from every dependency and drop all
	/// edges. Used on disposal; harmless on an already empty set.
	pub fn detach(&mut self, parent: &Weak<dyn Derived>) {
		for (base, _) in self.based_on.drain(..) {
			base.not_used_by(parent);
		}
	}
}

/// The reverse edge set of an observable: the derived nodes
/// that read it during their most recent run. Entries are weak,
/// so a subscriber dropped elsewhere never has its lifetime
/// extended by the graph.
pub(crate) struct Subscribers {
	list: SmallVec<[Weak<dyn Derived>; 4]>,
}

fn weak_addr(derived: &Weak<dyn Derived>) -> *const () {
	Weak::as_ptr(derived) as *const ()
}

impl Subscribers {
	pub fn new() -> Self {
		Subscribers {
			list: SmallVec::new(),
		}
	}

	pub fn add(&mut self, derived: Weak<dyn Derived>) {
		let key = weak_addr(&derived);
		if !self.list.iter().any(|d| weak_addr(d) == key) {
			self.list.push(derived);
		}
	}

	pub fn remove(&mut self, derived: &Weak<dyn Derived>) {
		let key = weak_addr(derived);
		self.list
			.retain(|d| weak_addr(d) != key && d.strong_count() > 0);
	}

	pub fn clear(&mut self) {
		self.list.clear();
	}

	pub fn invalidate(&self, invalid: Invalid) {
		for derived in &self.list {
			if let Some(derived) = derived.upgrade() {
				derived.invalidate(invalid);
			}
		}
	}
}
