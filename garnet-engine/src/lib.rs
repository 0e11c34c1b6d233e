#![forbid(unsafe_code)]

#![doc(html_root_url = "https://docs.rs/garnet/0.1")]

#[macro_use]
mod error;

mod val;
mod gc;
mod collections;
mod code;
mod env;
mod class;
mod vm;
mod dispatch;
mod binder;
mod wrap;
mod builtins;
mod engine;

pub use self::{
	binder::{ArgBindingSpec, BindingSource, Source},
	class::{Module, ModuleKind, Obj},
	code::{ClosureFn, Method, MethodBody, MethodObj, NativeFn, Proc, ProcFn},
	collections::{Arr, Flo, Str, Tab},
	engine::{
		CoreClasses, DEFAULT_RECURSION_LIMIT, Runtime, RuntimeBuilder, stock_syms, Sym, sym, ToSym
	},
	env::{Env, Globals},
	error::{ErrorKind, GError, GResult},
	gc::{
		Allocate, CellRef, Gc, GC_DEFAULT_RATIO, GC_DEFAULT_THRESHOLD, GC_MIN_RATIO, HeapStats,
		RootId, Visitor
	},
	val::{TypeTag, Val},
	wrap::{check_arity, FromVal, ToVal}
};

//used by the fatal!() macro
#[doc(hidden)]
pub use tracing;
