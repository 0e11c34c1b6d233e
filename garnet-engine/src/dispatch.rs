use fnv::{FnvHashMap};
use smallvec::{SmallVec};
use std::cell::{Cell, RefCell};
use std::rc::{Rc};
use tracing::{trace};
use super::class::{Module};
use super::code::{Method, MethodBody, Proc};
use super::engine::{stock_syms::*, Runtime, Sym, ToSym};
use super::env::{Env};
use super::error::{GResult};
use super::gc::{Gc};
use super::val::{Val};
use super::wrap::{check_method_arity};

//-------------------------------------------------------------------------------------------------
// MethodCache
//-------------------------------------------------------------------------------------------------

/*
dispatch is a pure function of the ancestry, the method tables and the method's name, so its
results can be memoized per (class, name). any change to a method table or to the ancestry of
any module clears the whole cache and bumps its generation. negative results are cached too.
*/

pub(crate) struct MethodCache {
	enabled: bool,
	entries: RefCell<FnvHashMap<(Gc<Module>, Sym), Option<Rc<Method>>>>,
	generation: Cell<u64>
}

impl MethodCache {
	pub(crate) fn new(enabled: bool) -> MethodCache {
		MethodCache {
			enabled,
			entries: RefCell::new(FnvHashMap::default()),
			generation: Cell::new(0)
		}
	}

	fn lookup(&self, class: Gc<Module>, name: Sym) -> Option<Option<Rc<Method>>> {
		if self.enabled {
			self.entries.borrow().get(&(class, name)).cloned()
		} else {
			None
		}
	}

	fn store(&self, class: Gc<Module>, name: Sym, method: Option<Rc<Method>>) {
		if self.enabled {
			self.entries.borrow_mut().insert((class, name), method);
		}
	}

	pub(crate) fn invalidate(&self) {
		self.generation.set(self.generation.get() + 1);
		self.entries.borrow_mut().clear();
		trace!(generation = self.generation.get(), "method cache invalidated");
	}

	//entries may refer to freed modules after a collection. they could never be hit again,
	//but there's no point in keeping them around
	pub(crate) fn clear(&self) {
		self.entries.borrow_mut().clear();
	}

	pub(crate) fn generation(&self) -> u64 {
		self.generation.get()
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.borrow().len()
	}
}

//labels a frame in an error's backtrace
enum FrameLabel<'a> {
	Method(&'a Method),
	Block
}

//-------------------------------------------------------------------------------------------------
// dispatch
//-------------------------------------------------------------------------------------------------

impl Runtime {
	/**
	Searches the ancestry of `class` for a method named `name`.

	When `start_after` is given, the search begins immediately after the ancestor which owns
	`start_after`; this is how `super` finds the next definition. When `exclude` is given, that
	particular definition is skipped.
	*/
	pub fn find_method<S: ToSym>(
		&self,
		class: Gc<Module>,
		name: S,
		start_after: Option<&Rc<Method>>,
		exclude: Option<&Rc<Method>>
	) -> Option<Rc<Method>> {
		let name = name.to_sym();
		let cacheable = start_after.is_none() && exclude.is_none();

		if cacheable {
			if let Some(cached) = self.cache.lookup(class, name) {
				return cached
			}
		}

		let ancestry = self.ancestry(class);
		let mut ancestors = ancestry.iter();

		if let Some(after) = start_after {
			let owner = after.owner();
			if !ancestors.by_ref().any(|ancestor| *ancestor == owner) {
				return None
			}
		}

		let mut found = None;
		for ancestor in ancestors {
			if let Some(method) = self.get(*ancestor).get_method(name) {
				if exclude.map_or(false, |excluded| Rc::ptr_eq(excluded, &method)) {
					continue
				}

				found = Some(method);
				break
			}
		}

		if cacheable {
			self.cache.store(class, name, found.clone());
		}

		found
	}

	///Tests whether `val` would answer a message named `name`.
	pub fn respond_to<S: ToSym>(&self, val: Val, name: S) -> bool {
		self.find_method(self.class_of(val), name, None, None).is_some()
	}

	/**
	Sends a message to `receiver`.

	When no method answers `name`, the message is passed to `method_missing` with `name`
	prepended to the arguments. When `method_missing` isn't defined either, this fails with a
	`NoMethodError`.
	*/
	pub fn send<S: ToSym>(
		&mut self,
		env: &Rc<Env>,
		receiver: Val,
		name: S,
		args: &[Val],
		block: Option<Val>
	) -> GResult<Val> {
		let name = name.to_sym();
		let class = self.class_of(receiver);

		if let Some(method) = self.find_method(class, name, None, None) {
			return self.call_method(env, receiver, &method, args, block)
		}

		if let Some(hook) = self.find_method(class, METHOD_MISSING_SYM, None, None) {
			let mut hook_args = SmallVec::<[Val; 8]>::with_capacity(args.len() + 1);
			hook_args.push(Val::Sym(name));
			hook_args.extend_from_slice(args);

			return self.call_method(env, receiver, &hook, &hook_args, block)
		}

		bail!(NoMethodError, "undefined method `{}' for {}", name, self.inspect_str(receiver))
	}

	///Sends a binary operator message, such as `+`.
	pub fn send_op<S: ToSym>(&mut self, env: &Rc<Env>, lhs: Val, op: S, rhs: Val) -> GResult<Val> {
		self.send(env, lhs, op, &[rhs], None)
	}

	/**
	Invokes a specific method definition with `receiver` as `self`, bypassing lookup.

	The argument count is checked against the method's arity. The method runs in a fresh `Env`;
	for a method defined from a `Proc`, that `Env` is nested within the `Proc`'s captured one.
	*/
	pub fn call_method(
		&mut self,
		env: &Rc<Env>,
		receiver: Val,
		method: &Rc<Method>,
		args: &[Val],
		block: Option<Val>
	) -> GResult<Val> {
		let frame = match method.body() {
			MethodBody::Proc(proc) => {
				let captured = Rc::clone(self.get(*proc).env());
				Env::new_block_frame(&captured, Some((receiver, Rc::clone(method))), args, block)
			}
			_ => {
				let globals = Rc::clone(env.globals());
				Env::new_method_frame(globals, receiver, Rc::clone(method), args, block)
			}
		};

		self.invoke(frame, FrameLabel::Method(method), |rt, frame| {
			check_method_arity(method.arity(), args.len())?;

			match method.body() {
				MethodBody::Native(f) => f(rt, frame, receiver, args, block),
				MethodBody::Closure(f) => f(rt, frame, receiver, args, block),
				MethodBody::Proc(proc) => {
					let body = rt.get(*proc).body();
					body(rt, frame, args, block)
				}
			}
		})
	}

	/**
	Invokes the next definition of the current method, searching `self_val`'s ancestry from
	just after the current method's owner.

	Fails with a `NoMethodError` if there's no current method, or no further definition.
	*/
	pub fn super_send(
		&mut self,
		env: &Rc<Env>,
		self_val: Val,
		args: &[Val],
		block: Option<Val>
	) -> GResult<Val> {
		let current = match env.current_method() {
			Some(current) => current,
			None => bail!(NoMethodError, "super called outside of method")
		};

		let class = self.class_of(self_val);
		match self.find_method(class, current.name(), Some(&current), None) {
			Some(next) => self.call_method(env, self_val, &next, args, block),
			None => {
				bail!(NoMethodError, "super: no superclass method `{}' for {}", current.name(),
				      self.inspect_str(self_val))
			}
		}
	}

	/**
	Calls a `Proc`, in a fresh `Env` nested within the one it captured.

	Lambdas check their argument count strictly. Plain procs accept any number of arguments.
	*/
	pub fn call_proc(
		&mut self,
		proc: Gc<Proc>,
		args: &[Val],
		block: Option<Val>
	) -> GResult<Val> {
		let cell = self.get(proc);
		if cell.is_lambda() {
			check_method_arity(cell.arity(), args.len())?;
		}

		let frame = Env::new_block_frame(cell.env(), None, args, block);
		let body = cell.body();
		self.invoke(frame, FrameLabel::Block, |rt, frame| body(rt, frame, args, block))
	}

	///Calls a `Proc` or a bound `Method` directly, or sends `call` to anything else.
	pub fn call_value(
		&mut self,
		env: &Rc<Env>,
		callable: Val,
		args: &[Val],
		block: Option<Val>
	) -> GResult<Val> {
		match callable {
			Val::Proc(proc) => self.call_proc(proc, args, block),
			Val::Method(method_obj) => {
				let cell = self.get(method_obj);
				self.call_method(env, cell.receiver(), cell.method(), args, block)
			}
			_ => self.send(env, callable, CALL_SYM, args, block)
		}
	}

	//runs `f` in a new frame. on exit, the frame is popped and the frame's handle scope is
	//released, keeping only the result. errors gain a backtrace entry for the frame.
	fn invoke<F>(&mut self, frame: Rc<Env>, label: FrameLabel, f: F) -> GResult<Val>
	where
		F: FnOnce(&mut Runtime, &Rc<Env>) -> GResult<Val>
	{
		let mark = self.vm.handle_mark();

		let result = match self.vm.push_frame(Rc::clone(&frame)) {
			Ok(()) => {
				let result = f(self, &frame);
				self.vm.pop_frame();
				result
			}
			Err(err) => Err(err)
		};

		self.vm.release_handles(mark, result.as_ref().ok().copied());

		result.map_err(|mut err| {
			err.push_frame(self.frame_label(&label));
			err
		})
	}

	fn frame_label(&self, label: &FrameLabel) -> String {
		let method = match label {
			FrameLabel::Method(method) => method,
			FrameLabel::Block => return "in `block'".to_string()
		};

		let owner = self.get(method.owner());
		match owner.attached() {
			Some(Val::Module(attached)) if owner.is_singleton() => {
				format!("in `{}.{}'", self.module_name(attached), method.name())
			}
			_ => format!("in `{}#{}'", self.module_name(method.owner()), method.name())
		}
	}

	///The depth of the call stack: zero at the top level.
	pub fn call_depth(&self) -> usize {
		self.vm.depth()
	}
}
