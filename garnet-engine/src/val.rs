use std::fmt::{self, Debug, Formatter};
use super::class::{Module, Obj};
use super::code::{MethodObj, Proc};
use super::collections::{Arr, Flo, Str, Tab};
use super::engine::{Sym};
use super::error::{GResult};
use super::gc::{CellRef, Gc};

//-------------------------------------------------------------------------------------------------
// Val
//-------------------------------------------------------------------------------------------------

/**
Any Garnet value.

A `Val` is either an immediate (nil, a boolean, a small integer or a symbol), which never touches
the heap, or a non-owning [`Gc`](struct.Gc.html) handle to a heap cell. `Val` is `Copy`: cloning
it never affects the lifetime of the cell it refers to. Only reachability from the root set keeps
a cell alive.

Equality is structural for immediates and identity for heap references.
*/

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum Val {
	Nil,
	Bool(bool),
	Int(i64),
	Sym(Sym),
	Obj(Gc<Obj>),
	Module(Gc<Module>),
	Arr(Gc<Arr>),
	Tab(Gc<Tab>),
	Str(Gc<Str>),
	Flo(Gc<Flo>),
	Proc(Gc<Proc>),
	Method(Gc<MethodObj>)
}

impl Default for Val {
	fn default() -> Val {
		Val::Nil
	}
}

/**
A value's representation tag.

The tag is derived from the `Val` handle alone, without dereferencing the heap, so it's cheap
enough to branch on in hot paths such as numeric coercion. Note that a `Module` tag covers both
classes and modules.
*/

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TypeTag {
	Nil,
	True,
	False,
	Integer,
	Symbol,
	Object,
	Module,
	Array,
	Hash,
	String,
	Float,
	Proc,
	Method
}

macro_rules! impl_val {
	($(($variant:ident, $type:ty, $tag:ident, $is_type:ident, $unwrap_type:ident)),+) => (
		impl Val {
			///Returns this value's representation tag.
			pub fn type_tag(&self) -> TypeTag {
				match *self {
					Val::Nil => TypeTag::Nil,
					Val::Bool(true) => TypeTag::True,
					Val::Bool(false) => TypeTag::False,
					$(Val::$variant(_) => TypeTag::$tag),+
				}
			}

			$(
				#[inline]
				pub fn $is_type(&self) -> bool {
					match *self {
						Val::$variant(_) => true,
						_ => false
					}
				}

				#[inline]
				pub fn $unwrap_type(self) -> $type {
					match self {
						Val::$variant(inner) => inner,
						_ => panic!("attempted to unwrap {:?} Val as {}", self.type_tag(),
						            stringify!($variant))
					}
				}
			)+
		}

		$(
			impl From<$type> for Val {
				fn from(inner: $type) -> Val {
					Val::$variant(inner)
				}
			}
		)+
	);
}

impl_val!(
	(Int, i64, Integer, is_int, unwrap_int),
	(Sym, Sym, Symbol, is_sym, unwrap_sym),
	(Obj, Gc<Obj>, Object, is_obj, unwrap_obj),
	(Module, Gc<Module>, Module, is_module, unwrap_module),
	(Arr, Gc<Arr>, Array, is_arr, unwrap_arr),
	(Tab, Gc<Tab>, Hash, is_tab, unwrap_tab),
	(Str, Gc<Str>, String, is_str, unwrap_str),
	(Flo, Gc<Flo>, Float, is_flo, unwrap_flo),
	(Proc, Gc<Proc>, Proc, is_proc, unwrap_proc),
	(Method, Gc<MethodObj>, Method, is_method, unwrap_method)
);

impl Val {
	#[inline]
	pub fn nil() -> Val {
		Val::Nil
	}

	#[inline]
	pub fn immediate_integer(i: i64) -> Val {
		Val::Int(i)
	}

	#[inline]
	pub fn immediate_bool(b: bool) -> Val {
		Val::Bool(b)
	}

	pub fn is_nil(&self) -> bool {
		matches!(*self, Val::Nil)
	}

	pub fn is_bool(&self) -> bool {
		matches!(*self, Val::Bool(_))
	}

	///Returns `true` for anything other than `nil` or `false`.
	pub fn is_truthy(&self) -> bool {
		!matches!(*self, Val::Nil | Val::Bool(false))
	}

	pub fn is_falsy(&self) -> bool {
		!self.is_truthy()
	}

	///Returns `true` if the value is stored inline, rather than on the heap.
	pub fn is_immediate(&self) -> bool {
		matches!(*self, Val::Nil | Val::Bool(_) | Val::Int(_) | Val::Sym(_))
	}

	/**
	Returns an untyped reference to the heap cell behind this value.

	Fails with a `TypeError` when the value is an immediate.
	*/
	pub fn as_cell(&self) -> GResult<CellRef> {
		match *self {
			Val::Nil | Val::Bool(_) | Val::Int(_) | Val::Sym(_) => {
				bail!(TypeError, "{:?} is an immediate value, not a heap cell", self.type_tag())
			}
			Val::Obj(gc) => Ok(gc.erase()),
			Val::Module(gc) => Ok(gc.erase()),
			Val::Arr(gc) => Ok(gc.erase()),
			Val::Tab(gc) => Ok(gc.erase()),
			Val::Str(gc) => Ok(gc.erase()),
			Val::Flo(gc) => Ok(gc.erase()),
			Val::Proc(gc) => Ok(gc.erase()),
			Val::Method(gc) => Ok(gc.erase())
		}
	}
}

impl From<bool> for Val {
	fn from(b: bool) -> Val {
		Val::Bool(b)
	}
}

impl From<()> for Val {
	fn from(_: ()) -> Val {
		Val::Nil
	}
}

impl Debug for Val {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match *self {
			Val::Nil => write!(f, "nil"),
			Val::Bool(b) => write!(f, "{}", b),
			Val::Int(i) => write!(f, "{}", i),
			Val::Sym(sym) => write!(f, ":{}", sym),
			Val::Obj(gc) => write!(f, "Obj({:?})", gc),
			Val::Module(gc) => write!(f, "Module({:?})", gc),
			Val::Arr(gc) => write!(f, "Arr({:?})", gc),
			Val::Tab(gc) => write!(f, "Tab({:?})", gc),
			Val::Str(gc) => write!(f, "Str({:?})", gc),
			Val::Flo(gc) => write!(f, "Flo({:?})", gc),
			Val::Proc(gc) => write!(f, "Proc({:?})", gc),
			Val::Method(gc) => write!(f, "Method({:?})", gc)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;
	use crate::engine::sym;

	#[test]
	fn immediates_compare_structurally() {
		assert_eq!(Val::immediate_integer(7), Val::Int(7));
		assert_eq!(Val::immediate_bool(false), Val::Bool(false));
		assert_eq!(Val::nil(), Val::Nil);
		assert_eq!(Val::Sym(sym("each")), Val::from(sym("each")));
		assert_ne!(Val::Int(1), Val::Bool(true));
	}

	#[test]
	fn type_tags_need_no_heap() {
		assert_eq!(Val::Nil.type_tag(), TypeTag::Nil);
		assert_eq!(Val::Bool(true).type_tag(), TypeTag::True);
		assert_eq!(Val::Bool(false).type_tag(), TypeTag::False);
		assert_eq!(Val::Int(-3).type_tag(), TypeTag::Integer);
		assert_eq!(Val::Sym(sym("x")).type_tag(), TypeTag::Symbol);
	}

	#[test]
	fn truthiness() {
		assert!(Val::Int(0).is_truthy());
		assert!(Val::Bool(true).is_truthy());
		assert!(Val::Nil.is_falsy());
		assert!(Val::Bool(false).is_falsy());
	}

	#[test]
	fn immediates_are_not_cells() {
		for val in &[Val::Nil, Val::Bool(true), Val::Int(1), Val::Sym(sym("a"))] {
			assert!(val.is_immediate());
			let err = val.as_cell().unwrap_err();
			assert_eq!(err.kind(), ErrorKind::TypeError);
		}
	}
}
