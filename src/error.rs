use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// A node transitively tried to read itself while it was
	/// still evaluating. The node is left invalid, so a later
	/// read with the cycle removed will retry.
	#[error("cycle detected: a reactive node read itself during its own evaluation")]
	CycleDetected,

	/// An effect re-triggered itself more than `limit` times
	/// within a single flush. Further runs in that flush are
	/// suppressed; the effect stays active.
	#[error("effect re-ran more than {limit} times within a single batch")]
	EffectLoopLimitExceeded { limit: u32 },

	/// A disposed signal, computed, effect or destroyed scope
	/// was used.
	#[error("reactive node or scope used after disposal")]
	UseAfterDispose,

	/// An error raised by a user-supplied computation or effect
	/// function.
	#[error("{0}")]
	Run(String),
}

impl Error {
	pub fn run(message: impl Display) -> Self {
		Error::Run(message.to_string())
	}
}
