use std::rc::{Rc};
use super::class::{Module, Obj};
use super::code::{MethodObj, Proc};
use super::collections::{Arr, Tab};
use super::engine::{stock_syms::*, Runtime, Sym};
use super::env::{Env};
use super::error::{GResult};
use super::gc::{Gc};
use super::val::{Val};

/*
notes on the implementation:

native method bodies receive their arguments as a raw `&[Val]`. the FromVal trait converts one
of those into a rust type, failing with a TypeError in the usual "no implicit conversion" form.
ToVal goes the other way; it receives a `&mut Runtime` because some conversions (f64, &str,
vectors) have to allocate.

the implicit conversions which can run arbitrary code (to_ary and coerce) are methods on the
Runtime instead, since they need an Env to dispatch from. a missing capability never raises:
it selects the fallback branch.
*/

//-------------------------------------------------------------------------------------------------
// arity
//-------------------------------------------------------------------------------------------------

/**
Checks a native method's argument count against an inclusive range.

Passing `None` for `max` accepts any number of arguments from `min` upwards.

	check_arity(args, 1, Some(2))?;
*/

pub fn check_arity(args: &[Val], min: usize, max: Option<usize>) -> GResult<()> {
	let given = args.len();
	match max {
		Some(max) if min == max => {
			ensure!(given == min, ArgumentError,
			        "wrong number of arguments (given {}, expected {})", given, min)
		}
		Some(max) => {
			ensure!(given >= min && given <= max, ArgumentError,
			        "wrong number of arguments (given {}, expected {}..{})", given, min, max)
		}
		None => {
			ensure!(given >= min, ArgumentError,
			        "wrong number of arguments (given {}, expected {}+)", given, min)
		}
	}

	Ok(())
}

//n >= 0 is exact, -(n + 1) is "n or more"
pub(crate) fn check_method_arity(arity: i32, given: usize) -> GResult<()> {
	if arity >= 0 {
		ensure!(given == arity as usize, ArgumentError,
		        "wrong number of arguments (given {}, expected {})", given, arity);
	} else {
		let required = (-(arity + 1)) as usize;
		ensure!(given >= required, ArgumentError,
		        "wrong number of arguments (given {}, expected {}+)", given, required);
	}

	Ok(())
}

//-------------------------------------------------------------------------------------------------
// ToVal, FromVal
//-------------------------------------------------------------------------------------------------

/**
A type which can be converted from a Garnet value.

Native method bodies usually receive their arguments through
[`Runtime::arg`](struct.Runtime.html#method.arg), which uses this trait.

	let count = i64::from_val(rt, args[0])?;
	let label: Option<String> = rt.arg(args, 1)?;

A failed conversion produces a `TypeError`, for example
`no implicit conversion of String into Integer`.
*/

pub trait FromVal: Sized {
	fn from_val(rt: &Runtime, val: Val) -> GResult<Self>;
}

/**
A type which can be converted into a Garnet value.

	let val = "text".to_val(rt);
*/

pub trait ToVal {
	fn to_val(&self, rt: &mut Runtime) -> Val;
}

//the name used for `val` in conversion errors: nil, true and false are named by value, anything
//else by its class
pub(crate) fn conversion_name(rt: &Runtime, val: Val) -> String {
	match val {
		Val::Nil => "nil".to_string(),
		Val::Bool(b) => b.to_string(),
		_ => rt.module_name(rt.real_class_of(val))
	}
}

fn conversion_error<T>(rt: &Runtime, val: Val, target: &str) -> GResult<T> {
	bail!(TypeError, "no implicit conversion of {} into {}", conversion_name(rt, val), target)
}

impl FromVal for Val {
	#[inline(always)]
	fn from_val(_rt: &Runtime, val: Val) -> GResult<Val> {
		Ok(val)
	}
}

impl ToVal for Val {
	#[inline(always)]
	fn to_val(&self, _rt: &mut Runtime) -> Val {
		*self
	}
}

macro_rules! impl_from_val_variant(
	($(($t:ty, $variant:ident, $target:literal)),+) => (
		$(
			impl FromVal for $t {
				#[inline(always)]
				fn from_val(rt: &Runtime, val: Val) -> GResult<Self> {
					match val {
						Val::$variant(inner) => Ok(inner),
						val => conversion_error(rt, val, $target)
					}
				}
			}

			impl ToVal for $t {
				#[inline(always)]
				fn to_val(&self, _rt: &mut Runtime) -> Val {
					Val::$variant(*self)
				}
			}
		)+
	);
);

impl_from_val_variant!(
	(i64, Int, "Integer"),
	(bool, Bool, "true or false"),
	(Sym, Sym, "Symbol"),
	(Gc<Obj>, Obj, "Object"),
	(Gc<Module>, Module, "Module"),
	(Gc<Arr>, Arr, "Array"),
	(Gc<Tab>, Tab, "Hash"),
	(Gc<Proc>, Proc, "Proc"),
	(Gc<MethodObj>, Method, "Method")
);

impl FromVal for usize {
	fn from_val(rt: &Runtime, val: Val) -> GResult<usize> {
		match val {
			Val::Int(i) if i >= 0 => Ok(i as usize),
			Val::Int(i) => bail!(ArgumentError, "negative argument ({})", i),
			val => conversion_error(rt, val, "Integer")
		}
	}
}

//integers convert to floats implicitly, but not the other way around
impl FromVal for f64 {
	fn from_val(rt: &Runtime, val: Val) -> GResult<f64> {
		match val {
			Val::Flo(flo) => Ok(rt.get(flo).value()),
			Val::Int(i) => Ok(i as f64),
			val => conversion_error(rt, val, "Float")
		}
	}
}

impl ToVal for f64 {
	fn to_val(&self, rt: &mut Runtime) -> Val {
		Val::Flo(rt.flo(*self))
	}
}

impl FromVal for String {
	fn from_val(rt: &Runtime, val: Val) -> GResult<String> {
		match val {
			Val::Str(text) => Ok(rt.get(text).text()),
			val => conversion_error(rt, val, "String")
		}
	}
}

impl ToVal for str {
	fn to_val(&self, rt: &mut Runtime) -> Val {
		Val::Str(rt.str(self))
	}
}

impl ToVal for String {
	fn to_val(&self, rt: &mut Runtime) -> Val {
		Val::Str(rt.str(self))
	}
}

impl ToVal for () {
	fn to_val(&self, _rt: &mut Runtime) -> Val {
		Val::Nil
	}
}

impl<T: ToVal> ToVal for [T] {
	fn to_val(&self, rt: &mut Runtime) -> Val {
		let elements: Vec<Val> = self.iter().map(|element| element.to_val(rt)).collect();
		Val::Arr(rt.arr(elements))
	}
}

impl<T: ToVal> ToVal for Vec<T> {
	fn to_val(&self, rt: &mut Runtime) -> Val {
		self[..].to_val(rt)
	}
}

impl<'a, T: ToVal + ?Sized> ToVal for &'a T {
	fn to_val(&self, rt: &mut Runtime) -> Val {
		(**self).to_val(rt)
	}
}

//nil converts to None, so that optional arguments can be passed explicitly as nil
impl<T: FromVal> FromVal for Option<T> {
	fn from_val(rt: &Runtime, val: Val) -> GResult<Option<T>> {
		match val {
			Val::Nil => Ok(None),
			val => Ok(Some(T::from_val(rt, val)?))
		}
	}
}

impl<T: ToVal> ToVal for Option<T> {
	fn to_val(&self, rt: &mut Runtime) -> Val {
		match self {
			Some(inner) => inner.to_val(rt),
			None => Val::Nil
		}
	}
}

//-------------------------------------------------------------------------------------------------
// implicit conversions
//-------------------------------------------------------------------------------------------------

impl Runtime {
	/**
	Converts the argument at `index`. A missing argument converts from `nil`.
	*/
	pub fn arg<T: FromVal>(&self, args: &[Val], index: usize) -> GResult<T> {
		T::from_val(self, args.get(index).copied().unwrap_or(Val::Nil))
	}

	/**
	Implicitly converts `val` to an array.

	Arrays are returned as they are. A value which answers `to_ary` is converted by calling it;
	when the result is `nil`, or isn't an array and `raise_for_non_array` is `false`, the value
	is wrapped as `[val]` instead. Anything else is wrapped as `[val]`.

	With `raise_for_non_array`, a `to_ary` result which is neither an array nor `nil` fails with
	`can't convert X to Array (X#to_ary gives Y)`.
	*/
	pub fn to_ary(&mut self, env: &Rc<Env>, val: Val, raise_for_non_array: bool) -> GResult<Gc<Arr>> {
		if let Val::Arr(arr) = val {
			return Ok(arr)
		}

		if self.respond_to(val, TO_ARY_SYM) {
			match self.send(env, val, TO_ARY_SYM, &[], None)? {
				Val::Arr(arr) => return Ok(arr),
				Val::Nil => (),
				result if raise_for_non_array => {
					let class = self.module_name(self.real_class_of(val));
					bail!(TypeError, "can't convert {} to Array ({}#to_ary gives {})", class, class,
					      self.module_name(self.real_class_of(result)))
				}
				_ => ()
			}
		}

		Ok(self.arr(vec![val]))
	}

	///The array produced by a `*val` splat. Arrays are copied.
	pub fn splat(&mut self, env: &Rc<Env>, val: Val) -> GResult<Gc<Arr>> {
		match val {
			Val::Arr(arr) => {
				let elements = self.get(arr).to_vec();
				Ok(self.arr(elements))
			}
			val => self.to_ary(env, val, false)
		}
	}

	/**
	Numeric coercion.

	When `lhs` answers `coerce`, returns the two elements of `lhs.coerce(rhs)`, which must be a
	two-element array. Otherwise, returns `(rhs, lhs)` unchanged, so that the caller can report
	the failure.
	*/
	pub fn coerce(&mut self, env: &Rc<Env>, lhs: Val, rhs: Val) -> GResult<(Val, Val)> {
		if !self.respond_to(lhs, COERCE_SYM) {
			return Ok((rhs, lhs))
		}

		match self.send(env, lhs, COERCE_SYM, &[rhs], None)? {
			Val::Arr(pair) => {
				let pair = self.get(pair);
				ensure!(pair.len() == 2, TypeError, "coerce must return [x, y]");
				Ok((pair.get(0).unwrap_or(Val::Nil), pair.get(1).unwrap_or(Val::Nil)))
			}
			_ => bail!(TypeError, "coerce must return [x, y]")
		}
	}

	pub fn args_to_array(&mut self, args: &[Val]) -> Gc<Arr> {
		self.arr(args.to_vec())
	}

	/**
	Gathers a block's arguments into an array.

	A block which declares more than one parameter, but is yielded a single value, destructures
	that value: it's converted with [`to_ary`](#method.to_ary).
	*/
	pub fn block_args_to_array(
		&mut self,
		env: &Rc<Env>,
		signature_size: usize,
		args: &[Val]
	) -> GResult<Gc<Arr>> {
		if args.len() == 1 && signature_size > 1 {
			self.to_ary(env, args[0], true)
		} else {
			Ok(self.args_to_array(args))
		}
	}

	///The call's keyword hash: its last argument when that's a hash, or else a new empty hash.
	pub fn kwarg_hash(&mut self, args: &[Val]) -> Gc<Tab> {
		match args.last() {
			Some(Val::Tab(tab)) => *tab,
			_ => self.tab()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::engine::{sym};
	use crate::error::{ErrorKind};

	#[test]
	fn arity_messages() {
		let args = [Val::Int(1), Val::Int(2)];

		assert!(check_arity(&args, 2, Some(2)).is_ok());
		assert!(check_arity(&args, 1, None).is_ok());
		assert!(check_arity(&args, 0, Some(3)).is_ok());

		let err = check_arity(&args, 1, Some(1)).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ArgumentError);
		assert_eq!(err.message(), "wrong number of arguments (given 2, expected 1)");

		let err = check_arity(&args, 3, None).unwrap_err();
		assert_eq!(err.message(), "wrong number of arguments (given 2, expected 3+)");

		let err = check_arity(&args, 0, Some(1)).unwrap_err();
		assert_eq!(err.message(), "wrong number of arguments (given 2, expected 0..1)");

		assert!(check_method_arity(-1, 0).is_ok());
		assert!(check_method_arity(-3, 2).is_ok());
		assert!(check_method_arity(-3, 1).is_err());
		assert!(check_method_arity(0, 1).is_err());
	}

	#[test]
	fn from_val_conversions() {
		let mut rt = Runtime::new();
		let text = Val::Str(rt.str("hello"));
		let flo = Val::Flo(rt.flo(2.5));

		assert_eq!(i64::from_val(&rt, Val::Int(3)).unwrap(), 3);
		assert_eq!(f64::from_val(&rt, Val::Int(3)).unwrap(), 3.0);
		assert_eq!(f64::from_val(&rt, flo).unwrap(), 2.5);
		assert_eq!(String::from_val(&rt, text).unwrap(), "hello");
		assert_eq!(Sym::from_val(&rt, Val::Sym(sym("a"))).unwrap(), sym("a"));
		assert_eq!(<Option<i64>>::from_val(&rt, Val::Nil).unwrap(), None);

		let err = i64::from_val(&rt, text).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::TypeError);
		assert_eq!(err.message(), "no implicit conversion of String into Integer");

		let err = i64::from_val(&rt, Val::Nil).unwrap_err();
		assert_eq!(err.message(), "no implicit conversion of nil into Integer");

		let err = usize::from_val(&rt, Val::Int(-1)).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ArgumentError);

		let args = [Val::Int(7)];
		assert_eq!(rt.arg::<i64>(&args, 0).unwrap(), 7);
		assert_eq!(rt.arg::<Option<i64>>(&args, 1).unwrap(), None);
	}

	#[test]
	fn to_val_conversions() {
		let mut rt = Runtime::new();

		assert_eq!(5i64.to_val(&mut rt), Val::Int(5));
		assert_eq!(().to_val(&mut rt), Val::Nil);
		assert_eq!(None::<i64>.to_val(&mut rt), Val::Nil);

		let text = "abc".to_val(&mut rt);
		assert_eq!(String::from_val(&rt, text).unwrap(), "abc");

		let arr = vec![1i64, 2, 3].to_val(&mut rt).unwrap_arr();
		assert_eq!(rt.get(arr).to_vec(), vec![Val::Int(1), Val::Int(2), Val::Int(3)]);
	}

	#[test]
	fn to_ary_passes_arrays_through() {
		let mut rt = Runtime::new();
		let env = rt.top_env();
		let arr = rt.arr(vec![Val::Int(1)]);

		assert_eq!(rt.to_ary(&env, Val::Arr(arr), true).unwrap(), arr);

		let wrapped = rt.to_ary(&env, Val::Int(5), true).unwrap();
		assert_eq!(rt.get(wrapped).to_vec(), vec![Val::Int(5)]);

		let copy = rt.splat(&env, Val::Arr(arr)).unwrap();
		assert_ne!(copy, arr);
		assert_eq!(rt.get(copy).to_vec(), vec![Val::Int(1)]);
	}

	#[test]
	fn to_ary_calls_the_conversion_method() {
		let mut rt = Runtime::new();
		let env = rt.top_env();
		let object = rt.core().object;

		let pair = rt.define_class("Pair", object).unwrap();
		rt.define_closure(pair, "to_ary", 0, |rt, _, _, _, _| {
			Ok(Val::Arr(rt.arr(vec![Val::Int(1), Val::Int(2)])))
		});

		let empty = rt.define_class("Empty", object).unwrap();
		rt.define_closure(empty, "to_ary", 0, |_, _, _, _, _| Ok(Val::Nil));

		let broken = rt.define_class("Broken", object).unwrap();
		rt.define_closure(broken, "to_ary", 0, |_, _, _, _, _| Ok(Val::Int(3)));

		let val = Val::Obj(rt.obj(pair));
		let converted = rt.to_ary(&env, val, true).unwrap();
		assert_eq!(rt.get(converted).to_vec(), vec![Val::Int(1), Val::Int(2)]);

		let val = Val::Obj(rt.obj(empty));
		let converted = rt.to_ary(&env, val, true).unwrap();
		assert_eq!(rt.get(converted).to_vec(), vec![val]);

		let val = Val::Obj(rt.obj(broken));
		let err = rt.to_ary(&env, val, true).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::TypeError);
		assert_eq!(err.message(), "can't convert Broken to Array (Broken#to_ary gives Integer)");

		let converted = rt.to_ary(&env, val, false).unwrap();
		assert_eq!(rt.get(converted).to_vec(), vec![val]);
	}

	#[test]
	fn coerce_swaps_without_the_capability() {
		let mut rt = Runtime::new();
		let env = rt.top_env();

		let sym_val = Val::Sym(sym("x"));
		assert_eq!(rt.coerce(&env, sym_val, Val::Int(1)).unwrap(), (Val::Int(1), sym_val));
	}

	#[test]
	fn coerce_requires_a_pair() {
		let mut rt = Runtime::new();
		let env = rt.top_env();
		let object = rt.core().object;

		let good = rt.define_class("Good", object).unwrap();
		rt.define_closure(good, "coerce", 1, |rt, _, _, args, _| {
			Ok(Val::Arr(rt.arr(vec![Val::Int(10), args[0]])))
		});

		let bad = rt.define_class("Bad", object).unwrap();
		rt.define_closure(bad, "coerce", 1, |_, _, _, _, _| Ok(Val::Int(0)));

		let val = Val::Obj(rt.obj(good));
		assert_eq!(rt.coerce(&env, val, Val::Int(2)).unwrap(), (Val::Int(10), Val::Int(2)));

		let val = Val::Obj(rt.obj(bad));
		let err = rt.coerce(&env, val, Val::Int(2)).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::TypeError);
		assert_eq!(err.message(), "coerce must return [x, y]");
	}

	#[test]
	fn block_args_destructure_a_single_array() {
		let mut rt = Runtime::new();
		let env = rt.top_env();
		let pair = Val::Arr(rt.arr(vec![Val::Int(1), Val::Int(2)]));

		let args = rt.block_args_to_array(&env, 2, &[pair]).unwrap();
		assert_eq!(rt.get(args).to_vec(), vec![Val::Int(1), Val::Int(2)]);

		let args = rt.block_args_to_array(&env, 1, &[pair]).unwrap();
		assert_eq!(rt.get(args).to_vec(), vec![pair]);

		let args = rt.block_args_to_array(&env, 2, &[Val::Int(1), Val::Int(2)]).unwrap();
		assert_eq!(rt.get(args).len(), 2);
	}

	#[test]
	fn kwarg_hash_reuses_a_trailing_hash() {
		let mut rt = Runtime::new();
		let kwargs = rt.tab();

		assert_eq!(rt.kwarg_hash(&[Val::Int(1), Val::Tab(kwargs)]), kwargs);

		let fresh = rt.kwarg_hash(&[Val::Int(1)]);
		assert_ne!(fresh, kwargs);
		assert!(rt.get(fresh).is_empty());
	}
}
