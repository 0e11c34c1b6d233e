/*!
The runtime core of the Garnet scripting language: its value model, object model, method
dispatch, argument binding and garbage-collected heap.

An evaluator drives a [`Runtime`](struct.Runtime.html) by sending messages:

	use garnet::prelude::*;

	let mut rt = Runtime::new();
	let env = rt.top_env();
	let sum = rt.send(&env, Val::Int(40), "+", &[Val::Int(2)], None)?;
	assert_eq!(sum, Val::Int(42));
	# Ok::<(), GError>(())
*/

pub use garnet_engine::*;

pub mod prelude {
	/*!
	The prelude: the types and traits needed to embed a runtime and to write native methods.
	*/

	#[doc(no_inline)]
	pub use crate::{
		bail, ensure, error, sym,

		ArgBindingSpec, Arr,
		BindingSource,
		Env, ErrorKind,
		FromVal,
		GError, GResult, Gc,
		Method, MethodBody, Module,
		Obj,
		Proc,
		Runtime, RuntimeBuilder,
		Source, Str, Sym,
		Tab, ToSym, ToVal,
		Val
	};
}
