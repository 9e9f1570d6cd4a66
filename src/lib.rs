pub mod macros;

mod computed;
mod r#const;
mod dependencies;
mod effect;
mod error;
mod evaluation;
mod scheduler;
mod scope;
mod signal;
mod value;

use std::rc::{Rc, Weak};

pub use computed::Computed;
pub use dependencies::Dependencies;
pub use effect::{Cleanup, Effect, IntoRunResult};
pub use error::Error;
pub use evaluation::Evaluation;
pub use r#const::Const;
pub use scheduler::{
	batch, clear_error_handler, in_batch, set_effect_loop_limit, set_error_handler, Reactive,
	DEFAULT_EFFECT_LOOP_LIMIT,
};
pub use scope::{Dispose, Scope};
pub use signal::{Signal, Toggle};
pub use value::{Access, Value};

pub trait Derived: 'static {
	/// Mark this node as possibly stale. `Invalid::Definitely`
	/// means a direct dependency changed its value,
	/// `Invalid::Maybe` means something changed further upstream
	/// and versions have to be rechecked before a re-run.
	fn invalidate(self: Rc<Self>, invalid: Invalid);
}

pub trait Observable: 'static {
	/// Bring this observable up to date and return the
	/// resulting version.
	fn update(&self) -> Result<Version, Error>;

	/// The version of the currently cached value.
	fn version(&self) -> Version;

	/// Notify this observable that `derived` started
	/// to listen.
	fn used_by(&self, derived: Weak<dyn Derived>);

	/// Notify this observable that `derived` stopped
	/// to listen.
	fn not_used_by(&self, derived: &Weak<dyn Derived>);
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum State {
	Valid,
	Invalid(Invalid),
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Invalid {
	Maybe,
	Definitely,
}

/// A per-node change counter, bumped only when the node's
/// equality function reports a real change. Dependents remember
/// the version they observed and compare against it to decide
/// whether they have to re-run.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Default)]
pub struct Version(u64);

impl Version {
	pub const ZERO: Version = Version(0);

	#[must_use]
	pub fn next(self) -> Version {
		Version(self.0 + 1)
	}
}
