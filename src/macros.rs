pub use enclose::*;

/// A [`crate::Computed`] from a closure, with optional
/// clone-captured bindings: `computed!((a, b) cx => ...)`.
#[macro_export]
macro_rules! computed {
	(( $($d_tt:tt)* ) $ctx:ident => $($b:tt)*) => {
		$crate::Computed::new($crate::macros::enclose!(($( $d_tt )*) move |$ctx: &$crate::Evaluation| { $($b)* }))
	};
	($ctx:ident => $($b:tt)*) => {
		$crate::Computed::new(move |$ctx: &$crate::Evaluation| { $($b)* })
	};
}

/// An eagerly running [`crate::Effect`], with optional
/// clone-captured bindings: `effect!((a, b) cx => ...)`.
#[macro_export]
macro_rules! effect {
	(( $($d_tt:tt)* ) $ctx:ident => $($b:tt)*) => {
		$crate::Effect::new($crate::macros::enclose!(($( $d_tt )*) move |$ctx: &$crate::Evaluation| { $($b)* }))
	};
	($ctx:ident => $($b:tt)*) => {
		$crate::Effect::new(move |$ctx: &$crate::Evaluation| { $($b)* })
	};
}
