use std::rc::{Rc};
use super::env::{Env};
use super::error::{GResult};
use super::val::{Val};

//-------------------------------------------------------------------------------------------------
// Vm
//-------------------------------------------------------------------------------------------------

/*
the rust callstack and the garnet callstack are one and the same: each dispatched call is a
nested call to Runtime::invoke. to keep a runaway recursion from overflowing the native stack
(which would abort the process), we enforce a configurable recursion limit.

the vm keeps two parallel stacks, both of which are gc roots:

- `frames` holds the Env of every call which is currently running. an Env reaches its lexical
  parents, so this also roots every frame captured by a running block.
- `handles` holds every cell allocated since the outermost call began. each invocation records
  the stack's length on entry and truncates it on exit, keeping only its result; this is the
  precise replacement for scanning the native stack for references.

a result is only kept when something encloses the call or scope which produced it. at the top
level there's no enclosing scope to own it, so an embedder who wants to hold onto a top-level
result should root it.
*/

pub(crate) struct Vm {
	frames: Vec<Rc<Env>>,
	handles: Vec<Val>,
	scopes: usize,
	recursion_limit: usize
}

impl Vm {
	pub(crate) fn new(recursion_limit: usize) -> Vm {
		Vm {
			frames: Vec::with_capacity(32),
			handles: Vec::with_capacity(256),
			scopes: 0,
			recursion_limit
		}
	}

	pub(crate) fn push_frame(&mut self, env: Rc<Env>) -> GResult<()> {
		ensure!(self.frames.len() < self.recursion_limit, SystemStackError, "stack level too deep");
		self.frames.push(env);
		Ok(())
	}

	pub(crate) fn pop_frame(&mut self) -> Option<Rc<Env>> {
		self.frames.pop()
	}

	pub(crate) fn depth(&self) -> usize {
		self.frames.len()
	}

	pub(crate) fn truncate_frames(&mut self, depth: usize) {
		self.frames.truncate(depth)
	}

	//handle scopes

	pub(crate) fn handle_mark(&self) -> usize {
		self.handles.len()
	}

	pub(crate) fn enter_scope(&mut self) {
		self.scopes += 1;
	}

	pub(crate) fn exit_scope(&mut self) {
		self.scopes = self.scopes.saturating_sub(1);
	}

	pub(crate) fn scope_depth(&self) -> usize {
		self.scopes
	}

	pub(crate) fn truncate_scopes(&mut self, depth: usize) {
		self.scopes = self.scopes.min(depth);
	}

	//true when no call or scope is running, so there's nothing to own a kept result
	pub(crate) fn at_top_level(&self) -> bool {
		self.frames.is_empty() && self.scopes == 0
	}

	pub(crate) fn push_handle(&mut self, val: Val) {
		if !val.is_immediate() {
			self.handles.push(val)
		}
	}

	//pops every handle above `mark`, then re-pushes `keep` so that it stays rooted for the caller
	pub(crate) fn release_handles(&mut self, mark: usize, keep: Option<Val>) {
		self.handles.truncate(mark);
		if let Some(val) = keep {
			self.push_handle(val);
		}
	}

	//gc support

	pub(crate) fn for_each_root(&self, f: &mut dyn FnMut(Val)) {
		for val in &self.handles {
			f(*val);
		}

		for env in &self.frames {
			env.for_each_val(f);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::{Runtime};
	use crate::error::{ErrorKind};

	#[test]
	fn the_recursion_limit_is_enforced() {
		let rt = Runtime::new();
		let mut vm = Vm::new(2);

		vm.push_frame(rt.top_env()).unwrap();
		vm.push_frame(rt.top_env()).unwrap();
		let err = vm.push_frame(rt.top_env()).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::SystemStackError);
		assert_eq!(err.message(), "stack level too deep");

		assert!(vm.pop_frame().is_some());
		assert_eq!(vm.depth(), 1);
	}

	#[test]
	fn releasing_handles_keeps_only_the_result() {
		let mut rt = Runtime::new();
		let kept = rt.arr(vec![]);
		let dropped = rt.arr(vec![]);

		let mut vm = Vm::new(8);
		vm.push_handle(Val::Int(1));
		assert_eq!(vm.handle_mark(), 0);

		let mark = vm.handle_mark();
		vm.push_handle(Val::Arr(dropped));
		vm.push_handle(Val::Arr(kept));
		vm.release_handles(mark, Some(Val::Arr(kept)));

		let mut roots = Vec::new();
		vm.for_each_root(&mut |val| roots.push(val));
		assert_eq!(roots, vec![Val::Arr(kept)]);
	}

	#[test]
	fn only_the_top_level_has_no_owner() {
		let rt = Runtime::new();
		let mut vm = Vm::new(8);
		assert!(vm.at_top_level());

		vm.enter_scope();
		assert!(!vm.at_top_level());
		vm.exit_scope();
		assert!(vm.at_top_level());

		vm.push_frame(rt.top_env()).unwrap();
		assert!(!vm.at_top_level());
	}
}
