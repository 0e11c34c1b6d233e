use fnv::{FnvHashMap};
use smallvec::{SmallVec};
use std::cell::{RefCell};
use std::fmt::{self, Debug, Display, Formatter};
use std::io::{self, Write};
use std::marker::{PhantomData};
use std::ops::{Deref};
use std::rc::{Rc};
use std::thread;
use tracing::{warn};
use super::builtins;
use super::class::{Module, ModuleKind, Obj};
use super::code::{MethodBody, MethodObj, Method, Proc, ProcFn};
use super::collections::{Arr, Flo, Str, Tab};
use super::dispatch::{MethodCache};
use super::env::{Env, Globals};
use super::error::{GError, GResult};
use super::gc::{Allocate, CellRef, Gc, Heap, HeapStats, RootId, GC_DEFAULT_RATIO, GC_DEFAULT_THRESHOLD};
use super::val::{TypeTag, Val};
use super::vm::{Vm};

//-------------------------------------------------------------------------------------------------
// Sym, ToSym
//-------------------------------------------------------------------------------------------------

/**
An interned symbol.

Symbols are represented by a small `Copy` type (a 32-bit integer id). Two symbols are equal if
and only if their names are equal.

To convert a string into a symbol, call [`sym`](fn.sym.html).
*/

//the PhantomData is used to ensure that Syms are !Send and !Sync. the interner is thread-local,
//so a Sym's id is only meaningful on the thread which created it.

#[derive(PartialEq, Eq, Hash, Copy, Clone)]
pub struct Sym(pub(crate) u32, pub(crate) PhantomData<*mut ()>);

const MAX_SYM: u32 = 0xffffff;

struct SymTable {
	names: Vec<Rc<str>>,
	ids: FnvHashMap<Rc<str>, u32>
}

impl SymTable {
	fn new() -> SymTable {
		let mut table = SymTable {
			names: Vec::with_capacity(256),
			ids: FnvHashMap::default()
		};

		for name in STOCK_SYMS.iter() {
			table.intern(name);
		}

		table
	}

	fn intern(&mut self, name: &str) -> u32 {
		if let Some(id) = self.ids.get(name) {
			return *id
		}

		let id = self.names.len() as u32;
		if id > MAX_SYM {
			fatal!("symbol table exhausted: more than {} distinct symbols", MAX_SYM)
		}

		let name: Rc<str> = Rc::from(name);
		self.names.push(Rc::clone(&name));
		self.ids.insert(name, id);
		id
	}
}

thread_local! {
	static SYMS: RefCell<SymTable> = RefCell::new(SymTable::new());
}

///Interns a string, returning the corresponding symbol.
pub fn sym(name: &str) -> Sym {
	SYMS.with(|syms| Sym(syms.borrow_mut().intern(name), PhantomData))
}

impl Sym {
	pub fn name(&self) -> Rc<str> {
		SYMS.with(|syms| {
			match syms.borrow().names.get(self.0 as usize) {
				Some(name) => Rc::clone(name),
				None => fatal!("symbol {} was not interned on this thread", self.0)
			}
		})
	}

	pub fn to_u32(&self) -> u32 {
		self.0
	}
}

impl Display for Sym {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		write!(f, "{}", self.name())
	}
}

impl Debug for Sym {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		write!(f, "Sym({})", self.name())
	}
}

/**
A type which can be converted to a [`Sym`](struct.Sym.html).

This is mostly used to make APIs more ergonomic. For example, the `name` argument to
[`Runtime::send`](struct.Runtime.html#method.send) is a generic `S: ToSym`, which means that it
can receive either a symbol or a string:

	rt.send(&env, recv, stock_syms::INSPECT_SYM, &[], None)?;
	rt.send(&env, recv, "inspect", &[], None)?;
*/

pub trait ToSym {
	fn to_sym(&self) -> Sym;
}

impl<T> ToSym for T
where
	T: Deref,
	T::Target: ToSym
{
	fn to_sym(&self) -> Sym {
		(**self).to_sym()
	}
}

impl ToSym for Sym {
	fn to_sym(&self) -> Sym {
		*self
	}
}

impl ToSym for str {
	fn to_sym(&self) -> Sym {
		sym(self)
	}
}

//-------------------------------------------------------------------------------------------------
// stock_syms
//-------------------------------------------------------------------------------------------------

macro_rules! define_stock_syms(
	($(($sym_str:literal, $sym_name:ident)),+) => (
		#[derive(Copy, Clone, Debug)]
		#[allow(non_camel_case_types)]
		enum StockSym {
			$($sym_name),+,

			STOCK_SYM_COUNT
		}

		const STOCK_SYMS: [&str; StockSym::STOCK_SYM_COUNT as usize] = [
			$($sym_str),+
		];

		///Symbols which are interned before anything else, so that they're free to construct.
		pub mod stock_syms {
			use std::marker::{PhantomData};
			use super::{StockSym, Sym};

			$(
				pub const $sym_name: Sym = Sym(StockSym::$sym_name as u32, PhantomData);
			)+
		}
	);
);

define_stock_syms!(
	("initialize", INITIALIZE_SYM),
	("method_missing", METHOD_MISSING_SYM),
	("to_ary", TO_ARY_SYM),
	("coerce", COERCE_SYM),
	("call", CALL_SYM),
	("new", NEW_SYM),
	("inspect", INSPECT_SYM),
	("to_s", TO_S_SYM),
	("respond_to?", RESPOND_TO_SYM),
	("==", EQ_SYM),
	("+", ADD_SYM),
	("$__at_exit_handlers", AT_EXIT_HANDLERS_SYM)
);

use stock_syms::*;

//-------------------------------------------------------------------------------------------------
// CoreClasses
//-------------------------------------------------------------------------------------------------

macro_rules! define_core_classes(
	(
		root: ($root_field:ident, $root_name:literal),
		modules: [$(($mod_field:ident, $mod_name:literal)),+],
		classes: [$(($field:ident, $name:literal, $superclass:ident, $tag:ident)),+]
	) => (
		/**
		The classes and modules created by the runtime at bootstrap.

		All of them are bound as constants of `Object`, and all of them are gc roots.
		*/

		#[derive(Copy, Clone, Debug)]
		pub struct CoreClasses {
			pub $root_field: Gc<Module>,
			$(pub $mod_field: Gc<Module>,)+
			$(pub $field: Gc<Module>,)+
		}

		impl CoreClasses {
			fn build(heap: &mut Heap) -> CoreClasses {
				let $root_field = heap.alloc(
					Module::new(ModuleKind::Class, Some($root_name), None, TypeTag::Object)
				);

				$(
					let $mod_field = heap.alloc(
						Module::new(ModuleKind::Module, Some($mod_name), None, TypeTag::Object)
					);
				)+

				$(
					let $field = heap.alloc(
						Module::new(ModuleKind::Class, Some($name), Some($superclass), TypeTag::$tag)
					);
				)+

				CoreClasses {
					$root_field,
					$($mod_field,)+
					$($field,)+
				}
			}

			pub(crate) fn to_vec(&self) -> Vec<Gc<Module>> {
				vec![self.$root_field, $(self.$mod_field,)+ $(self.$field,)+]
			}
		}
	);
);

define_core_classes!(
	root: (basic_object, "BasicObject"),
	modules: [
		(kernel, "Kernel"),
		(comparable, "Comparable"),
		(enumerable, "Enumerable")
	],
	classes: [
		(object, "Object", basic_object, Object),
		(module, "Module", object, Module),
		(class, "Class", module, Module),
		(nil_class, "NilClass", object, Nil),
		(true_class, "TrueClass", object, True),
		(false_class, "FalseClass", object, False),
		(numeric, "Numeric", object, Object),
		(integer, "Integer", numeric, Integer),
		(float, "Float", numeric, Float),
		(symbol, "Symbol", object, Symbol),
		(string, "String", object, String),
		(array, "Array", object, Array),
		(hash, "Hash", object, Hash),
		(proc, "Proc", object, Proc),
		(method, "Method", object, Method),
		(exception, "Exception", object, Object),
		(script_error, "ScriptError", exception, Object),
		(standard_error, "StandardError", exception, Object),
		(name_error, "NameError", standard_error, Object),
		(no_method_error, "NoMethodError", name_error, Object),
		(argument_error, "ArgumentError", standard_error, Object),
		(type_error, "TypeError", standard_error, Object),
		(system_exit, "SystemExit", exception, Object),
		(system_stack_error, "SystemStackError", exception, Object)
	]
);

//the non-collectible instances: the top-level `self`, and the objects which stand in for nil,
//true and false whenever they need per-object state
struct Specials {
	main: Gc<Obj>,
	nil: Gc<Obj>,
	true_: Gc<Obj>,
	false_: Gc<Obj>
}

impl Specials {
	fn build(heap: &mut Heap, core: &CoreClasses) -> Specials {
		Specials {
			main: heap.alloc_pinned(Obj::new(core.object)),
			nil: heap.alloc_pinned(Obj::new(core.nil_class)),
			true_: heap.alloc_pinned(Obj::new(core.true_class)),
			false_: heap.alloc_pinned(Obj::new(core.false_class))
		}
	}
}

//-------------------------------------------------------------------------------------------------
// RuntimeBuilder
//-------------------------------------------------------------------------------------------------

///The default maximum depth of nested method and block invocations.
pub const DEFAULT_RECURSION_LIMIT: usize = 256;

/**
Configures and constructs a [`Runtime`](struct.Runtime.html).

	let rt = RuntimeBuilder::new()
		.gc_threshold(1024)
		.drain_at_shutdown(true)
		.build();
*/

pub struct RuntimeBuilder {
	gc_threshold: usize,
	gc_ratio: f32,
	drain_at_shutdown: bool,
	recursion_limit: usize,
	method_cache: bool,
	error_writer: Option<Box<dyn Write>>
}

impl RuntimeBuilder {
	pub fn new() -> RuntimeBuilder {
		RuntimeBuilder {
			gc_threshold: GC_DEFAULT_THRESHOLD,
			gc_ratio: GC_DEFAULT_RATIO,
			drain_at_shutdown: false,
			recursion_limit: DEFAULT_RECURSION_LIMIT,
			method_cache: true,
			error_writer: None
		}
	}

	///The number of live cells which triggers the first collection.
	pub fn gc_threshold(mut self, threshold: usize) -> RuntimeBuilder {
		self.gc_threshold = threshold;
		self
	}

	///The ratio of the next collection threshold to the number of cells which survive a
	///collection. Values below `GC_MIN_RATIO` are clamped.
	pub fn gc_ratio(mut self, ratio: f32) -> RuntimeBuilder {
		self.gc_ratio = ratio;
		self
	}

	///Free every cell, including non-collectible ones, when the `Runtime` is dropped.
	pub fn drain_at_shutdown(mut self, drain: bool) -> RuntimeBuilder {
		self.drain_at_shutdown = drain;
		self
	}

	pub fn recursion_limit(mut self, limit: usize) -> RuntimeBuilder {
		self.recursion_limit = limit;
		self
	}

	pub fn method_cache(mut self, enabled: bool) -> RuntimeBuilder {
		self.method_cache = enabled;
		self
	}

	///Where uncaught errors are reported. Defaults to stderr.
	pub fn error_writer(mut self, writer: Box<dyn Write>) -> RuntimeBuilder {
		self.error_writer = Some(writer);
		self
	}

	pub fn build(self) -> Runtime {
		let mut heap = Heap::new(self.gc_threshold, self.gc_ratio);
		let core = CoreClasses::build(&mut heap);
		let specials = Specials::build(&mut heap, &core);
		let globals = Rc::new(Globals::new());
		let top_env = Env::new_top(Rc::clone(&globals), Val::Obj(specials.main), core.object);

		let mut rt = Runtime {
			heap,
			vm: Vm::new(self.recursion_limit),
			cache: MethodCache::new(self.method_cache),
			hierarchy_generation: 0,
			core,
			specials,
			globals,
			top_env,
			drain_at_shutdown: self.drain_at_shutdown,
			error_writer: self.error_writer.unwrap_or_else(|| Box::new(io::stderr()))
		};

		if let Err(err) = rt.bootstrap() {
			fatal!("failed to bootstrap the runtime: {}", err)
		}

		rt
	}
}

impl Default for RuntimeBuilder {
	fn default() -> RuntimeBuilder {
		RuntimeBuilder::new()
	}
}

//-------------------------------------------------------------------------------------------------
// Runtime
//-------------------------------------------------------------------------------------------------

/**
The language runtime: a heap, a class hierarchy, a global-variable table and a call stack.

A process normally has a single `Runtime`. It's `!Send`: every value it produces is tied to the
thread which created it.
*/

pub struct Runtime {
	pub(crate) heap: Heap,
	pub(crate) vm: Vm,
	pub(crate) cache: MethodCache,
	pub(crate) hierarchy_generation: u64,
	core: CoreClasses,
	specials: Specials,
	globals: Rc<Globals>,
	top_env: Rc<Env>,
	drain_at_shutdown: bool,
	error_writer: Box<dyn Write>
}

impl Drop for Runtime {
	fn drop(&mut self) {
		if self.drain_at_shutdown {
			self.vm.truncate_frames(0);
			self.vm.release_handles(0, None);
			self.heap.drain();
		}
	}
}

impl Runtime {
	pub fn new() -> Runtime {
		RuntimeBuilder::new().build()
	}

	fn bootstrap(&mut self) -> GResult<()> {
		let core = self.core;

		for module in core.to_vec() {
			if let Some(name) = self.get(module).name() {
				self.const_set(core.object, &*name, Val::Module(module));
			}
		}

		self.include_once(core.object, core.kernel)?;
		self.include_once(core.numeric, core.comparable)?;
		self.include_once(core.string, core.comparable)?;
		self.include_once(core.array, core.enumerable)?;
		self.include_once(core.hash, core.enumerable)?;

		//builds the metaclass chain from BasicObject down to Class
		self.singleton_class(Val::Module(core.class))?;

		let handlers = self.arr(Vec::new());
		self.global_set(AT_EXIT_HANDLERS_SYM, Val::Arr(handlers));

		let main = Val::Obj(self.specials.main);
		self.define_singleton_method(main, INSPECT_SYM, MethodBody::Native(main_inspect), 0)?;
		self.define_singleton_method(main, TO_S_SYM, MethodBody::Native(main_inspect), 0)?;

		builtins::init(self)?;

		//everything allocated so far is reachable from the core classes or the globals
		self.vm.release_handles(0, None);
		Ok(())
	}

	pub fn core(&self) -> &CoreClasses {
		&self.core
	}

	///The top-level `self`.
	pub fn main(&self) -> Val {
		Val::Obj(self.specials.main)
	}

	///The top-level execution context, which every `run_main` call evaluates in.
	pub fn top_env(&self) -> Rc<Env> {
		Rc::clone(&self.top_env)
	}

	//---------------------------------------------------------------------------------------------
	// allocation
	//---------------------------------------------------------------------------------------------

	/**
	Moves a cell onto the heap, possibly running a collection first.

	The new cell is rooted by the innermost running call (or by the innermost
	[`scope`](#method.scope)) until that call returns.
	*/
	pub fn alloc<T>(&mut self, cell: T) -> Gc<T>
	where
		T: Allocate,
		Gc<T>: Into<Val>
	{
		if self.heap.should_collect() {
			self.collect();
		}

		let gc = self.heap.alloc(cell);
		self.vm.push_handle(gc.into());
		gc
	}

	pub fn arr(&mut self, elements: Vec<Val>) -> Gc<Arr> {
		let class = self.core.array;
		self.alloc(Arr::new(class, elements))
	}

	pub fn tab(&mut self) -> Gc<Tab> {
		let class = self.core.hash;
		self.alloc(Tab::new(class))
	}

	pub fn str(&mut self, text: &str) -> Gc<Str> {
		let class = self.core.string;
		self.alloc(Str::new(class, text.to_string()))
	}

	pub fn flo(&mut self, value: f64) -> Gc<Flo> {
		self.alloc(Flo::new(value))
	}

	///Allocates a plain object, without calling `initialize`.
	pub fn obj(&mut self, class: Gc<Module>) -> Gc<Obj> {
		self.alloc(Obj::new(class))
	}

	///Allocates a closure over `env`.
	pub fn proc<F>(&mut self, env: &Rc<Env>, arity: i32, lambda: bool, f: F) -> Gc<Proc>
	where
		F: Fn(&mut Runtime, &Rc<Env>, &[Val], Option<Val>) -> GResult<Val> + 'static
	{
		let body: ProcFn = Rc::new(f);
		self.alloc(Proc::new(Rc::clone(env), body, arity, lambda))
	}

	pub fn method_obj(&mut self, receiver: Val, method: Rc<Method>) -> Gc<MethodObj> {
		self.alloc(MethodObj::new(receiver, method))
	}

	///Dereferences a handle. Dereferencing a handle to a freed cell is fatal.
	pub fn get<T: Allocate>(&self, gc: Gc<T>) -> Rc<T> {
		self.heap.get(gc)
	}

	pub fn try_get<T: Allocate>(&self, gc: Gc<T>) -> Option<Rc<T>> {
		self.heap.try_get(gc)
	}

	///Returns `false` if `val` refers to a cell which has been freed. Immediates are always live.
	pub fn is_live(&self, val: Val) -> bool {
		match val.as_cell() {
			Ok(cell) => self.heap.is_live(cell),
			Err(_) => true
		}
	}

	//---------------------------------------------------------------------------------------------
	// collection
	//---------------------------------------------------------------------------------------------

	/**
	Runs a full collection, returning the number of cells freed.

	The roots are the core classes, the non-collectible cells, the global-variable table, the
	top-level `Env`, every `Env` on the call stack, every live handle scope, and every
	registered root.
	*/
	pub fn collect(&mut self) -> usize {
		let mut roots = Vec::with_capacity(256);

		for module in self.core.to_vec() {
			roots.push(Val::Module(module));
		}

		self.top_env.for_each_val(&mut |val| roots.push(val));
		self.globals.for_each_val(&mut |val| roots.push(val));
		self.vm.for_each_root(&mut |val| roots.push(val));

		let freed = self.heap.collect(&roots);
		self.cache.clear();
		freed
	}

	/**
	Runs `f` in a fresh handle scope.

	Cells allocated by `f` are rooted until it returns. Afterwards, only its result is kept
	rooted, by the enclosing call or scope; anything else which isn't reachable from some other
	root becomes collectable.

	A top-level scope has nothing enclosing it, so its result isn't kept at all. To hold onto
	it across allocations, pass it to [`root`](#method.root).
	*/
	pub fn scope<F>(&mut self, f: F) -> GResult<Val>
	where
		F: FnOnce(&mut Runtime) -> GResult<Val>
	{
		let mark = self.vm.handle_mark();

		self.vm.enter_scope();
		let result = f(self);
		self.vm.exit_scope();

		let keep = if self.vm.at_top_level() { None } else { result.as_ref().ok().copied() };
		self.vm.release_handles(mark, keep);
		result
	}

	/**
	Releases the handles held by cells which were allocated outside of any call or scope.

	Those cells stay collectable only once released; any which the embedder still needs should
	be passed to [`root`](#method.root) first. Inside a call or scope this does nothing, and
	returns `0`. Otherwise, returns the number of handles released.
	*/
	pub fn release_top_level_handles(&mut self) -> usize {
		if !self.vm.at_top_level() {
			return 0
		}

		let released = self.vm.handle_mark();
		self.vm.release_handles(0, None);
		released
	}

	///Keeps `val` alive until it's passed to [`unroot`](#method.unroot).
	pub fn root(&mut self, val: Val) -> RootId {
		self.heap.register_root(val)
	}

	pub fn unroot(&mut self, id: RootId) -> Option<Val> {
		self.heap.unregister_root(id)
	}

	pub fn heap_stats(&self) -> HeapStats {
		self.heap.stats()
	}

	pub fn gc_ratio(&self) -> f32 {
		self.heap.ratio()
	}

	pub fn gc_set_ratio(&mut self, ratio: f32) {
		self.heap.set_ratio(ratio)
	}

	//---------------------------------------------------------------------------------------------
	// globals and per-object state
	//---------------------------------------------------------------------------------------------

	pub fn global_get<S: ToSym>(&self, name: S) -> Val {
		self.globals.get(name.to_sym())
	}

	pub fn global_set<S: ToSym>(&self, name: S, val: Val) {
		self.globals.set(name.to_sym(), val)
	}

	//nil, true and false keep their instance variables in their canonical instances
	fn ivar_owner(&self, val: Val) -> GResult<Gc<Obj>> {
		match val {
			Val::Obj(obj) => Ok(obj),
			Val::Nil => Ok(self.specials.nil),
			Val::Bool(true) => Ok(self.specials.true_),
			Val::Bool(false) => Ok(self.specials.false_),
			_ => bail!(TypeError, "can't access instance variables of {:?}", val.type_tag())
		}
	}

	pub fn ivar_get<S: ToSym>(&self, val: Val, name: S) -> GResult<Val> {
		let owner = self.ivar_owner(val)?;
		Ok(self.get(owner).ivar_get(name))
	}

	pub fn ivar_set<S: ToSym>(&self, val: Val, name: S, value: Val) -> GResult<()> {
		let owner = self.ivar_owner(val)?;
		self.get(owner).ivar_set(name, value);
		Ok(())
	}

	//---------------------------------------------------------------------------------------------
	// errors and the top level
	//---------------------------------------------------------------------------------------------

	///The class which an error's kind names, if it's bound as a constant of `Object`.
	pub fn error_class(&self, err: &GError) -> Option<Gc<Module>> {
		match self.get(self.core.object).const_get(sym(&err.class_name())) {
			Some(Val::Module(class)) => Some(class),
			_ => None
		}
	}

	///Tests whether `err` would be rescued by a clause naming `module`.
	pub fn error_is_a(&self, err: &GError, module: Gc<Module>) -> bool {
		match self.error_class(err) {
			Some(class) => self.ancestry(class).contains(&module),
			None => false
		}
	}

	/**
	Runs `body`, and then runs `cleanup` whether `body` succeeded, failed or panicked.

	When `body` panics, the call stack and handle stack are first restored to their depth at
	the time `ensure` was called.
	*/
	pub fn ensure<R, B, C>(&mut self, body: B, cleanup: C) -> GResult<R>
	where
		B: FnOnce(&mut Runtime) -> GResult<R>,
		C: FnOnce(&mut Runtime)
	{
		let mut guard = EnsureGuard {
			depth: self.vm.depth(),
			scopes: self.vm.scope_depth(),
			mark: self.vm.handle_mark(),
			cleanup: Some(cleanup),
			rt: self
		};

		let result = body(&mut *guard.rt);
		drop(guard);
		result
	}

	///Registers a handler to be run by [`run_at_exit_handlers`](#method.run_at_exit_handlers).
	pub fn at_exit(&mut self, handler: Val) -> GResult<()> {
		ensure!(handler.is_proc() || handler.is_method(), TypeError,
		        "wrong argument type {} (expected Proc)", self.module_name(self.real_class_of(handler)));

		let handlers = match self.global_get(AT_EXIT_HANDLERS_SYM) {
			Val::Arr(arr) => arr,
			_ => {
				let arr = self.arr(Vec::new());
				self.global_set(AT_EXIT_HANDLERS_SYM, Val::Arr(arr));
				arr
			}
		};

		self.get(handlers).push(handler);
		Ok(())
	}

	/**
	Runs every registered at-exit handler, most recently registered first, and then forgets
	them.

	A handler which fails is reported, and doesn't prevent the remaining handlers from running.
	*/
	pub fn run_at_exit_handlers(&mut self) {
		let registered = match self.global_get(AT_EXIT_HANDLERS_SYM) {
			Val::Arr(arr) => arr,
			_ => return
		};

		//once detached from the globals, the old list is rooted here until every handler has run
		let mark = self.vm.handle_mark();
		self.vm.push_handle(Val::Arr(registered));

		let fresh = self.arr(Vec::new());
		self.global_set(AT_EXIT_HANDLERS_SYM, Val::Arr(fresh));

		let env = self.top_env();
		let handlers = self.get(registered).to_vec();
		for handler in handlers.into_iter().rev() {
			let result = self.scope(|rt| rt.call_value(&env, handler, &[], None));
			if let Err(err) = result {
				warn!(error = %err, "at_exit handler failed");
				self.print_error(&err);
			}
		}

		self.vm.release_handles(mark, None);
	}

	/**
	Runs `f` as the program's main body, and returns the process exit code.

	The at-exit handlers run however `f` finishes. A `SystemExit` error produces its clamped
	status; any other error is reported with its backtrace, producing status 1.
	*/
	pub fn run_main<F>(&mut self, f: F) -> i32
	where
		F: FnOnce(&mut Runtime, &Rc<Env>) -> GResult<Val>
	{
		let env = self.top_env();
		let result = self.scope(|rt| f(rt, &env));
		self.run_at_exit_handlers();

		match result {
			Ok(_) => 0,
			Err(err) if err.is_exit() => err.exit_code(),
			Err(err) => {
				self.print_error(&err);
				1
			}
		}
	}

	fn print_error(&mut self, err: &GError) {
		write!(self.error_writer, "{}", err.format_backtrace()).ok();
		self.error_writer.flush().ok();
	}

	//---------------------------------------------------------------------------------------------
	// inspection
	//---------------------------------------------------------------------------------------------

	///Dispatches `inspect` to `val`.
	pub fn inspect(&mut self, val: Val) -> GResult<String> {
		let env = self.top_env();
		match self.send(&env, val, INSPECT_SYM, &[], None)? {
			Val::Str(text) => Ok(self.get(text).text()),
			other => Ok(self.default_inspect(other))
		}
	}

	///Like [`inspect`](#method.inspect), but falls back to the default representation when
	///`inspect` fails, or when `val` doesn't answer `inspect` at all.
	pub fn inspect_str(&mut self, val: Val) -> String {
		//a BasicObject has no inspect, and dispatching it would recurse through NoMethodError
		if !self.respond_to(val, INSPECT_SYM) {
			return self.default_inspect(val)
		}

		match self.inspect(val) {
			Ok(text) => text,
			Err(_) => self.default_inspect(val)
		}
	}

	///The representation printed by `Kernel#inspect`. Never dispatches.
	pub fn default_inspect(&self, val: Val) -> String {
		let mut seen = SmallVec::<[CellRef; 8]>::new();
		let mut output = String::new();
		self.write_inspect(&mut output, val, &mut seen);
		output
	}

	fn write_inspect(&self, output: &mut String, val: Val, seen: &mut SmallVec<[CellRef; 8]>) {
		if let Ok(cell) = val.as_cell() {
			if seen.contains(&cell) {
				output.push_str(if val.is_tab() { "{...}" } else { "[...]" });
				return
			}
		}

		match val {
			Val::Nil => output.push_str("nil"),
			Val::Bool(b) => output.push_str(if b { "true" } else { "false" }),
			Val::Int(i) => output.push_str(&i.to_string()),
			Val::Sym(name) => output.push_str(&format!(":{}", name)),
			Val::Obj(obj) => {
				let class = self.module_name(self.get(obj).class());
				output.push_str(&format!("#<{}:0x{:016x}>", class, obj.erase().index()));
			}
			Val::Module(module) => output.push_str(&self.module_name(module)),
			Val::Arr(arr) => {
				seen.push(arr.erase());
				output.push('[');
				for (i, element) in self.get(arr).to_vec().into_iter().enumerate() {
					if i > 0 {
						output.push_str(", ");
					}

					self.write_inspect(output, element, seen);
				}
				output.push(']');
				seen.pop();
			}
			Val::Tab(tab) => {
				seen.push(tab.erase());
				output.push('{');
				for (i, (key, value)) in self.get(tab).entries().into_iter().enumerate() {
					if i > 0 {
						output.push_str(", ");
					}

					self.write_inspect(output, key, seen);
					output.push_str("=>");
					self.write_inspect(output, value, seen);
				}
				output.push('}');
				seen.pop();
			}
			Val::Str(text) => output.push_str(&format!("{:?}", self.get(text).text())),
			Val::Flo(flo) => output.push_str(&format!("{:?}", self.get(flo).value())),
			Val::Proc(proc) => {
				let kind = if self.get(proc).is_lambda() { " (lambda)" } else { "" };
				output.push_str(&format!("#<Proc:0x{:016x}{}>", proc.erase().index(), kind));
			}
			Val::Method(method_obj) => {
				let method = Rc::clone(self.get(method_obj).method());
				output.push_str(&format!("#<Method: {}#{}(*)>", self.module_name(method.owner()),
				                         method.name()));
			}
		}
	}
}

struct EnsureGuard<'a, C: FnOnce(&mut Runtime)> {
	rt: &'a mut Runtime,
	depth: usize,
	scopes: usize,
	mark: usize,
	cleanup: Option<C>
}

impl<'a, C: FnOnce(&mut Runtime)> Drop for EnsureGuard<'a, C> {
	fn drop(&mut self) {
		if thread::panicking() {
			self.rt.vm.truncate_frames(self.depth);
			self.rt.vm.truncate_scopes(self.scopes);
			self.rt.vm.release_handles(self.mark, None);
		}

		if let Some(cleanup) = self.cleanup.take() {
			cleanup(self.rt)
		}
	}
}

fn main_inspect(rt: &mut Runtime, _env: &Rc<Env>, _this: Val, _args: &[Val],
                _block: Option<Val>) -> GResult<Val> {
	Ok(Val::Str(rt.str("main")))
}
