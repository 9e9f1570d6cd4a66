use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::Error;

/// An eagerly re-run node. Effects implement this; the
/// scheduler holds them weakly, so a dropped effect simply
/// falls out of the queue.
pub trait Reactive {
	fn run(self: Rc<Self>);
}

/// How many times a single effect may re-run within one flush
/// before it is suppressed with `EffectLoopLimitExceeded`.
pub const DEFAULT_EFFECT_LOOP_LIMIT: u32 = 100;

thread_local! {
	static DEPTH: Cell<u32> = Cell::new(0);
	static FLUSHING: Cell<bool> = Cell::new(false);
	static EPOCH: Cell<u64> = Cell::new(0);
	static QUEUE: RefCell<VecDeque<Weak<dyn Reactive>>> = RefCell::new(VecDeque::new());
	static ERRORS: RefCell<Vec<Error>> = RefCell::new(Vec::new());
	static HANDLER: RefCell<Option<Rc<dyn Fn(Error)>>> = RefCell::new(None);
	static LOOP_LIMIT: Cell<u32> = Cell::new(DEFAULT_EFFECT_LOOP_LIMIT);
}

/// True while writes are being coalesced: inside an open
/// `batch` or while the queue is being flushed. Writes made in
/// this window are picked up by the active flush instead of
/// starting a new one.
pub fn in_batch() -> bool {
	DEPTH.with(|d| d.get() > 0) || FLUSHING.with(|f| f.get())
}

/// Run `func` with effect flushing deferred until the outermost
/// batch closes, so several writes trigger at most one run per
/// affected effect. Errors raised by effects during the flush
/// surface here unless an error handler is installed.
pub fn batch<R>(func: impl FnOnce() -> R) -> Result<R, Error> {
	DEPTH.with(|d| d.set(d.get() + 1));
	let out = func();
	DEPTH.with(|d| d.set(d.get() - 1));

	if DEPTH.with(|d| d.get()) == 0 && !FLUSHING.with(|f| f.get()) {
		flush()?;
	}

	Ok(out)
}

pub fn set_effect_loop_limit(limit: u32) {
	LOOP_LIMIT.with(|l| l.set(limit.max(1)));
}

pub(crate) fn effect_loop_limit() -> u32 {
	LOOP_LIMIT.with(|l| l.get())
}

/// Install a handler that receives every error raised by effect
/// runs instead of having the first one returned from the write
/// or batch that triggered the flush.
pub fn set_error_handler(handler: impl Fn(Error) + 'static) {
	HANDLER.with(|h| *h.borrow_mut() = Some(Rc::new(handler)));
}

pub fn clear_error_handler() {
	HANDLER.with(|h| *h.borrow_mut() = None);
}

/// The current flush generation, used by effects to scope their
/// re-entrancy counters to a single flush.
pub(crate) fn epoch() -> u64 {
	EPOCH.with(|e| e.get())
}

pub(crate) fn schedule(reactive: Weak<dyn Reactive>) {
	QUEUE.with(|q| q.borrow_mut().push_back(reactive));
}

/// Called after a signal write that happened outside any batch:
/// opens the implicit flush right away.
pub(crate) fn after_write() -> Result<(), Error> {
	if in_batch() {
		Ok(())
	} else {
		flush()
	}
}

/// Deliver an error raised during an effect run. While a flush
/// is active the error is collected and dispatched after the
/// whole queue has settled, so one failing effect cannot starve
/// independent effects of their turn.
pub(crate) fn report(error: Error) {
	if FLUSHING.with(|f| f.get()) {
		ERRORS.with(|e| e.borrow_mut().push(error));
	} else if let Some(error) = deliver(error) {
		tracing::error!(%error, "unhandled reactive error");
	}
}

fn deliver(error: Error) -> Option<Error> {
	let handler = HANDLER.with(|h| h.borrow().clone());
	match handler {
		Some(handler) => {
			handler(error);
			None
		}
		None => Some(error),
	}
}

pub(crate) fn flush() -> Result<(), Error> {
	FLUSHING.with(|f| f.set(true));
	EPOCH.with(|e| e.set(e.get() + 1));
	tracing::trace!("flushing reactive queue");

	loop {
		let next = QUEUE.with(|q| q.borrow_mut().pop_front());
		let Some(reactive) = next else { break };
		if let Some(reactive) = reactive.upgrade() {
			reactive.run();
		}
	}

	FLUSHING.with(|f| f.set(false));

	let errors = ERRORS.with(|e| std::mem::take(&mut *e.borrow_mut()));
	let mut first = None;
	for error in errors {
		match deliver(error) {
			Some(error) if first.is_none() => first = Some(error),
			Some(error) => tracing::error!(%error, "unhandled reactive error"),
			None => {}
		}
	}

	match first {
		Some(error) => Err(error),
		None => Ok(()),
	}
}
