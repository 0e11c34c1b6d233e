use fnv::{FnvHashMap};
use smallvec::{SmallVec};
use std::cell::{RefCell};
use std::rc::{Rc};
use super::class::{Module};
use super::code::{Method};
use super::engine::{Sym, ToSym};
use super::gc::{Gc, Visitor};
use super::val::{Val};

//-------------------------------------------------------------------------------------------------
// Globals
//-------------------------------------------------------------------------------------------------

/**
The global-variable table.

A single `Globals` is created when a [`Runtime`](struct.Runtime.html) is constructed, and shared
by every `Env` it creates. It lives until the runtime is dropped; it's never reset. Reading an
unset global produces `nil`.
*/

pub struct Globals {
	table: RefCell<FnvHashMap<Sym, Val>>
}

impl Globals {
	pub(crate) fn new() -> Globals {
		Globals {
			table: RefCell::new(FnvHashMap::default())
		}
	}

	pub fn get(&self, name: Sym) -> Val {
		self.table.borrow().get(&name).copied().unwrap_or(Val::Nil)
	}

	pub fn set(&self, name: Sym, val: Val) {
		self.table.borrow_mut().insert(name, val);
	}

	pub fn has(&self, name: Sym) -> bool {
		self.table.borrow().contains_key(&name)
	}

	pub fn remove(&self, name: Sym) -> Option<Val> {
		self.table.borrow_mut().remove(&name)
	}

	pub(crate) fn for_each_val(&self, f: &mut dyn FnMut(Val)) {
		for val in self.table.borrow().values() {
			f(*val)
		}
	}
}

//-------------------------------------------------------------------------------------------------
// Env
//-------------------------------------------------------------------------------------------------

/**
An execution context: one call frame.

Every method invocation and every block invocation gets its own `Env`. An `Env` records:

- Its lexical parent, for blocks and methods defined from blocks. Method frames have none.
- The current `self`.
- The method currently executing, which is what `super` resolves against. Block frames inherit
  it from their lexical parent.
- The lexical module, for constant lookup.
- The call's arguments and block, and a vector of local-variable slots for the evaluator.
- The runtime's global-variable table.

Frames are created and dropped in stack order by the dispatch engine, unless a `Proc` captures
one, in which case it lives as long as that `Proc`.
*/

pub struct Env {
	parent: Option<Rc<Env>>,
	self_val: Val,
	method: Option<Rc<Method>>,
	lexical_module: Gc<Module>,
	args: SmallVec<[Val; 4]>,
	block: Option<Val>,
	locals: RefCell<Vec<Val>>,
	globals: Rc<Globals>
}

impl Env {
	pub(crate) fn new_top(globals: Rc<Globals>, main: Val, object: Gc<Module>) -> Rc<Env> {
		Rc::new(Env {
			parent: None,
			self_val: main,
			method: None,
			lexical_module: object,
			args: SmallVec::new(),
			block: None,
			locals: RefCell::new(Vec::new()),
			globals
		})
	}

	pub(crate) fn new_method_frame(
		globals: Rc<Globals>,
		self_val: Val,
		method: Rc<Method>,
		args: &[Val],
		block: Option<Val>
	) -> Rc<Env> {
		let lexical_module = method.owner();
		Rc::new(Env {
			parent: None,
			self_val,
			method: Some(method),
			lexical_module,
			args: SmallVec::from_slice(args),
			block,
			locals: RefCell::new(Vec::new()),
			globals
		})
	}

	/**
	Creates a frame nested lexically within `parent`.

	When `rebind` is `Some`, the frame's `self` and current method are replaced: this is how a
	method defined from a block runs with the receiver as `self`, while still seeing the block's
	captured variables.
	*/
	pub(crate) fn new_block_frame(
		parent: &Rc<Env>,
		rebind: Option<(Val, Rc<Method>)>,
		args: &[Val],
		block: Option<Val>
	) -> Rc<Env> {
		let (self_val, method) = match rebind {
			Some((self_val, method)) => (self_val, Some(method)),
			None => (parent.self_val, None)
		};

		Rc::new(Env {
			parent: Some(Rc::clone(parent)),
			self_val,
			method,
			lexical_module: parent.lexical_module,
			args: SmallVec::from_slice(args),
			block,
			locals: RefCell::new(Vec::new()),
			globals: Rc::clone(&parent.globals)
		})
	}

	pub fn parent(&self) -> Option<&Rc<Env>> {
		self.parent.as_ref()
	}

	pub fn self_val(&self) -> Val {
		self.self_val
	}

	pub fn args(&self) -> &[Val] {
		&self.args
	}

	pub fn block(&self) -> Option<Val> {
		self.block
	}

	pub fn lexical_module(&self) -> Gc<Module> {
		self.lexical_module
	}

	///The method running in this frame or, for a block frame, in the nearest enclosing frame.
	pub fn current_method(&self) -> Option<Rc<Method>> {
		let mut env = self;
		loop {
			if let Some(method) = &env.method {
				return Some(Rc::clone(method))
			}

			match &env.parent {
				Some(parent) => env = parent,
				None => return None
			}
		}
	}

	///`true` for a block frame, including a method defined from a block.
	pub fn is_block(&self) -> bool {
		self.parent.is_some()
	}

	//---------------------------------------------------------------------------------------------
	// locals
	//---------------------------------------------------------------------------------------------

	///Reads local slot `index` in the frame `depth` levels up the lexical chain.
	pub fn var_get(&self, depth: usize, index: usize) -> Val {
		match self.ancestor(depth) {
			Some(env) => env.locals.borrow().get(index).copied().unwrap_or(Val::Nil),
			None => Val::Nil
		}
	}

	///Writes local slot `index` in the frame `depth` levels up the lexical chain. Returns `false`
	///when there's no such frame.
	pub fn var_set(&self, depth: usize, index: usize, val: Val) -> bool {
		match self.ancestor(depth) {
			Some(env) => {
				let mut locals = env.locals.borrow_mut();
				if index >= locals.len() {
					locals.resize(index + 1, Val::Nil);
				}

				locals[index] = val;
				true
			}
			None => false
		}
	}

	fn ancestor(&self, depth: usize) -> Option<&Env> {
		let mut env = self;
		for _ in 0 .. depth {
			env = env.parent.as_deref()?;
		}

		Some(env)
	}

	//---------------------------------------------------------------------------------------------
	// globals
	//---------------------------------------------------------------------------------------------

	pub fn global_get<S: ToSym>(&self, name: S) -> Val {
		self.globals.get(name.to_sym())
	}

	pub fn global_set<S: ToSym>(&self, name: S, val: Val) {
		self.globals.set(name.to_sym(), val)
	}

	pub fn globals(&self) -> &Rc<Globals> {
		&self.globals
	}

	//---------------------------------------------------------------------------------------------
	// collector support
	//---------------------------------------------------------------------------------------------

	pub(crate) fn for_each_val(&self, f: &mut dyn FnMut(Val)) {
		let mut env = Some(self);
		while let Some(cur) = env {
			f(cur.self_val);
			f(Val::Module(cur.lexical_module));
			if let Some(method) = &cur.method {
				method.for_each_val(f);
			}

			if let Some(block) = cur.block {
				f(block);
			}

			for val in cur.args.iter() {
				f(*val);
			}

			for val in cur.locals.borrow().iter() {
				f(*val);
			}

			env = cur.parent.as_deref();
		}
	}

	pub(crate) fn visit<V: Visitor>(&self, visitor: &mut V) {
		self.for_each_val(&mut |val| visitor.visit_val(&val));
	}
}
