use std::fmt::{self, Debug, Formatter};
use std::rc::{Rc};
use super::class::{Module};
use super::engine::{Runtime, Sym};
use super::env::{Env};
use super::error::{GResult};
use super::gc::{Allocate, Gc, Header, Visitor};
use super::val::{Val};

//-------------------------------------------------------------------------------------------------
// Method
//-------------------------------------------------------------------------------------------------

/**
A native method body.

Receives the runtime, the callee's fresh [`Env`](struct.Env.html), the receiver, the arguments
and the block (if any).
*/

pub type NativeFn = fn(&mut Runtime, &Rc<Env>, Val, &[Val], Option<Val>) -> GResult<Val>;

/**
A method body implemented by a Rust closure.

Closures are opaque to the collector. They may capture plain Rust data, but any `Val` they need
must be reachable through the receiver, the arguments or the `Env`.
*/

pub type ClosureFn = Rc<dyn Fn(&mut Runtime, &Rc<Env>, Val, &[Val], Option<Val>) -> GResult<Val>>;

#[derive(Clone)]
pub enum MethodBody {
	Native(NativeFn),
	Closure(ClosureFn),

	//a method defined from a proc: the proc's captured Env becomes the lexical parent of every
	//invocation, with `self` rebound to the receiver
	Proc(Gc<Proc>)
}

impl Debug for MethodBody {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			MethodBody::Native(_) => write!(f, "MethodBody::Native"),
			MethodBody::Closure(_) => write!(f, "MethodBody::Closure"),
			MethodBody::Proc(gc) => write!(f, "MethodBody::Proc({:?})", gc)
		}
	}
}

/**
An installed method.

Methods are immutable, and shared by `Rc`. Redefining a method replaces the method table's
entry; anyone still holding the old `Rc<Method>` (a bound `Method` object, or a frame which is
currently executing it) keeps a valid, callable definition.

Arity follows the usual convention: `n >= 0` accepts exactly `n` arguments, and `-(n + 1)`
accepts `n` or more.
*/

pub struct Method {
	name: Sym,
	owner: Gc<Module>,
	body: MethodBody,
	arity: i32
}

impl Method {
	pub(crate) fn new(name: Sym, owner: Gc<Module>, body: MethodBody, arity: i32) -> Method {
		Method {
			name,
			owner,
			body,
			arity
		}
	}

	pub fn name(&self) -> Sym {
		self.name
	}

	pub fn owner(&self) -> Gc<Module> {
		self.owner
	}

	pub fn body(&self) -> &MethodBody {
		&self.body
	}

	pub fn arity(&self) -> i32 {
		self.arity
	}

	pub(crate) fn visit_children<V: Visitor>(&self, visitor: &mut V) {
		visitor.visit(&self.owner);
		if let MethodBody::Proc(ref gc) = self.body {
			visitor.visit(gc);
		}
	}

	pub(crate) fn for_each_val(&self, f: &mut dyn FnMut(Val)) {
		f(Val::Module(self.owner));
		if let MethodBody::Proc(gc) = self.body {
			f(Val::Proc(gc));
		}
	}
}

impl Debug for Method {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("Method")
			.field("name", &self.name)
			.field("owner", &self.owner)
			.field("arity", &self.arity)
			.finish()
	}
}

//-------------------------------------------------------------------------------------------------
// Proc
//-------------------------------------------------------------------------------------------------

pub type ProcFn = Rc<dyn Fn(&mut Runtime, &Rc<Env>, &[Val], Option<Val>) -> GResult<Val>>;

/**
A closure: a body, plus the `Env` it captured.

The captured `Env` is kept alive by shared ownership for as long as the `Proc` cell exists, and
the collector traces through it. The body runs in a fresh `Env` whose lexical parent is the
captured one.
*/

pub struct Proc {
	header: Header,
	env: Rc<Env>,
	body: ProcFn,
	arity: i32,
	lambda: bool
}

impl Proc {
	pub(crate) fn new(env: Rc<Env>, body: ProcFn, arity: i32, lambda: bool) -> Proc {
		Proc {
			header: Header::new(),
			env,
			body,
			arity,
			lambda
		}
	}

	pub fn env(&self) -> &Rc<Env> {
		&self.env
	}

	pub fn body(&self) -> ProcFn {
		Rc::clone(&self.body)
	}

	pub fn arity(&self) -> i32 {
		self.arity
	}

	///Lambdas check their arity strictly; plain procs bind leniently.
	pub fn is_lambda(&self) -> bool {
		self.lambda
	}
}

impl Allocate for Proc {
	fn header(&self) -> &Header {
		&self.header
	}

	fn visit_children<V: Visitor>(&self, visitor: &mut V) {
		self.env.visit(visitor);
	}
}

//-------------------------------------------------------------------------------------------------
// MethodObj
//-------------------------------------------------------------------------------------------------

///A receiver bound to a specific method definition, as returned by `Kernel#method`.
pub struct MethodObj {
	header: Header,
	receiver: Val,
	method: Rc<Method>
}

impl MethodObj {
	pub(crate) fn new(receiver: Val, method: Rc<Method>) -> MethodObj {
		MethodObj {
			header: Header::new(),
			receiver,
			method
		}
	}

	pub fn receiver(&self) -> Val {
		self.receiver
	}

	pub fn method(&self) -> &Rc<Method> {
		&self.method
	}
}

impl Allocate for MethodObj {
	fn header(&self) -> &Header {
		&self.header
	}

	fn visit_children<V: Visitor>(&self, visitor: &mut V) {
		visitor.visit_val(&self.receiver);
		self.method.visit_children(visitor);
	}
}
