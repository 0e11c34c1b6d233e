use std::rc::{Rc};
use super::class::{Module};
use super::code::{MethodBody, MethodObj, Proc};
use super::collections::{Arr, Str, Tab};
use super::engine::{stock_syms::*, sym, Runtime, Sym};
use super::env::{Env};
use super::error::{GError, GResult};
use super::gc::{Gc};
use super::val::{TypeTag, Val};
use super::wrap::{check_arity, conversion_name, FromVal};

/*
the native methods which the runtime itself depends on: object construction, the reflective
parts of Module and Kernel, the callable types, the top-level exit protocol, and enough of
Integer and Float to exercise numeric coercion. everything else belongs to collaborator
libraries, which bind their own methods with Runtime::define_native.
*/

pub(crate) fn init(rt: &mut Runtime) -> GResult<()> {
	let core = *rt.core();

	rt.define_native(core.basic_object, INITIALIZE_SYM, basic_object_initialize, 0);
	rt.define_native(core.basic_object, EQ_SYM, basic_object_eq, 1);

	rt.define_native(core.class, NEW_SYM, class_new, -1);
	rt.define_native(core.class, "superclass", class_superclass, 0);

	rt.define_native(core.module, "include", module_include, -2);
	rt.define_native(core.module, "ancestors", module_ancestors, 0);
	rt.define_native(core.module, "name", module_name, 0);
	rt.define_native(core.module, "const_get", module_const_get, 1);
	rt.define_native(core.module, "const_set", module_const_set, 2);
	rt.define_native(core.module, "define_method", module_define_method, -2);

	rt.define_native(core.kernel, "class", kernel_class, 0);
	rt.define_native(core.kernel, INSPECT_SYM, kernel_inspect, 0);
	rt.define_native(core.kernel, RESPOND_TO_SYM, kernel_respond_to, -2);
	rt.define_native(core.kernel, "is_a?", kernel_is_a, 1);
	rt.define_native(core.kernel, "method", kernel_method, 1);
	rt.define_native(core.kernel, "singleton_class", kernel_singleton_class, 0);
	rt.define_native(core.kernel, "at_exit", kernel_at_exit, 0);
	rt.define_native(core.kernel, "exit", kernel_exit, -1);

	rt.define_native(core.method, CALL_SYM, method_call, -1);
	rt.define_native(core.method, "owner", method_owner, 0);
	rt.define_native(core.method, "arity", method_arity, 0);
	rt.define_native(core.proc, CALL_SYM, proc_call, -1);

	rt.define_native(core.integer, ADD_SYM, integer_add, 1);
	rt.define_native(core.integer, COERCE_SYM, integer_coerce, 1);
	rt.define_native(core.float, ADD_SYM, float_add, 1);
	rt.define_native(core.float, COERCE_SYM, float_coerce, 1);

	Ok(())
}

//method names may be passed as symbols or strings
fn name_arg(rt: &mut Runtime, val: Val) -> GResult<Sym> {
	match val {
		Val::Sym(name) => Ok(name),
		Val::Str(text) => Ok(sym(&rt.get(text).text())),
		val => bail!(TypeError, "{} is not a symbol nor a string", rt.inspect_str(val))
	}
}

fn const_name_arg(rt: &mut Runtime, val: Val) -> GResult<Sym> {
	let name = name_arg(rt, val)?;
	let valid = name.name().chars().next().map_or(false, |c| c.is_ascii_uppercase());
	ensure!(valid, NameError, "wrong constant name {}", name);
	Ok(name)
}

fn module_arg(rt: &Runtime, val: Val, expected: &str) -> GResult<Gc<Module>> {
	match val {
		Val::Module(module) => Ok(module),
		val => bail!(TypeError, "wrong argument type {} (expected {})", conversion_name(rt, val),
		             expected)
	}
}

//-------------------------------------------------------------------------------------------------
// BasicObject
//-------------------------------------------------------------------------------------------------

fn basic_object_initialize(_rt: &mut Runtime, _env: &Rc<Env>, _this: Val, _args: &[Val],
                           _block: Option<Val>) -> GResult<Val> {
	Ok(Val::Nil)
}

fn basic_object_eq(_rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
                   _block: Option<Val>) -> GResult<Val> {
	Ok(Val::Bool(this == args[0]))
}

//-------------------------------------------------------------------------------------------------
// Class, Module
//-------------------------------------------------------------------------------------------------

/*
Class.new(superclass = Object) creates an anonymous class. on any other class, `new` allocates
an instance whose representation is chosen by the class's instance tag, and then sends it
`initialize` with the same arguments and block.
*/

fn class_new(rt: &mut Runtime, env: &Rc<Env>, this: Val, args: &[Val],
             block: Option<Val>) -> GResult<Val> {
	let class = Gc::<Module>::from_val(rt, this)?;
	let core = *rt.core();

	if class == core.class {
		check_arity(args, 0, Some(1))?;
		let superclass = match args.get(0) {
			Some(&val) => module_arg(rt, val, "Class")?,
			None => core.object
		};

		return Ok(Val::Module(rt.subclass(superclass, None, None)?))
	}

	let cell = rt.get(class);
	ensure!(!cell.is_singleton(), TypeError, "can't create instance of singleton class");

	let instance = match cell.instance_tag() {
		TypeTag::Object => Val::Obj(rt.obj(class)),
		TypeTag::Array => Val::Arr(rt.alloc(Arr::new(class, Vec::new()))),
		TypeTag::Hash => Val::Tab(rt.alloc(Tab::new(class))),
		TypeTag::String => Val::Str(rt.alloc(Str::new(class, String::new()))),
		_ => bail!(TypeError, "allocator undefined for {}", rt.module_name(class))
	};

	rt.send(env, instance, INITIALIZE_SYM, args, block)?;
	Ok(instance)
}

fn class_superclass(rt: &mut Runtime, _env: &Rc<Env>, this: Val, _args: &[Val],
                    _block: Option<Val>) -> GResult<Val> {
	let class = Gc::<Module>::from_val(rt, this)?;
	Ok(rt.get(class).superclass().map_or(Val::Nil, Val::Module))
}

//include(A, B) places A before B in the ancestry, so the arguments are included in reverse
fn module_include(rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
                  _block: Option<Val>) -> GResult<Val> {
	let module = Gc::<Module>::from_val(rt, this)?;

	let mut included = Vec::with_capacity(args.len());
	for &arg in args {
		included.push(module_arg(rt, arg, "Module")?);
	}

	for &other in included.iter().rev() {
		rt.include_once(module, other)?;
	}

	Ok(this)
}

fn module_ancestors(rt: &mut Runtime, _env: &Rc<Env>, this: Val, _args: &[Val],
                    _block: Option<Val>) -> GResult<Val> {
	let module = Gc::<Module>::from_val(rt, this)?;
	let ancestors: Vec<Val> = rt.ancestry(module).iter().map(|&m| Val::Module(m)).collect();
	Ok(Val::Arr(rt.arr(ancestors)))
}

//anonymous classes, and singleton classes, have no name
fn module_name(rt: &mut Runtime, _env: &Rc<Env>, this: Val, _args: &[Val],
               _block: Option<Val>) -> GResult<Val> {
	let module = rt.get(Gc::<Module>::from_val(rt, this)?);
	match module.name() {
		Some(name) if !module.is_singleton() => Ok(Val::Str(rt.str(&name))),
		_ => Ok(Val::Nil)
	}
}

fn module_const_get(rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
                    _block: Option<Val>) -> GResult<Val> {
	let module = Gc::<Module>::from_val(rt, this)?;
	let name = const_name_arg(rt, args[0])?;
	rt.const_find(module, name)
}

fn module_const_set(rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
                    _block: Option<Val>) -> GResult<Val> {
	let module = Gc::<Module>::from_val(rt, this)?;
	let name = const_name_arg(rt, args[0])?;
	rt.const_set(module, name, args[1]);
	Ok(args[1])
}

/*
define_method(name, body) or define_method(name) { ... }. a Proc body runs with `self` rebound
to the receiver. a Method lends its body and arity; the new method's owner is the receiver.
*/

fn module_define_method(rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
                        block: Option<Val>) -> GResult<Val> {
	check_arity(args, 1, Some(2))?;
	let module = Gc::<Module>::from_val(rt, this)?;
	let name = name_arg(rt, args[0])?;

	let (body, arity) = match args.get(1).copied().or(block) {
		Some(Val::Proc(proc)) => (MethodBody::Proc(proc), rt.get(proc).arity()),
		Some(Val::Method(method_obj)) => {
			let method = Rc::clone(rt.get(method_obj).method());
			(method.body().clone(), method.arity())
		}
		Some(val) => {
			bail!(TypeError, "wrong argument type {} (expected Proc/Method)",
			      conversion_name(rt, val))
		}
		None => bail!(ArgumentError, "tried to create Proc object without a block")
	};

	rt.define_method(module, name, body, arity);
	Ok(Val::Sym(name))
}

//-------------------------------------------------------------------------------------------------
// Kernel
//-------------------------------------------------------------------------------------------------

fn kernel_class(rt: &mut Runtime, _env: &Rc<Env>, this: Val, _args: &[Val],
                _block: Option<Val>) -> GResult<Val> {
	Ok(Val::Module(rt.real_class_of(this)))
}

fn kernel_inspect(rt: &mut Runtime, _env: &Rc<Env>, this: Val, _args: &[Val],
                  _block: Option<Val>) -> GResult<Val> {
	let text = rt.default_inspect(this);
	Ok(Val::Str(rt.str(&text)))
}

fn kernel_respond_to(rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
                     _block: Option<Val>) -> GResult<Val> {
	check_arity(args, 1, Some(2))?;
	let name = name_arg(rt, args[0])?;
	Ok(Val::Bool(rt.respond_to(this, name)))
}

fn kernel_is_a(rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
               _block: Option<Val>) -> GResult<Val> {
	match args[0] {
		Val::Module(module) => Ok(Val::Bool(rt.is_a(this, module))),
		_ => bail!(TypeError, "class or module required")
	}
}

fn kernel_method(rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
                 _block: Option<Val>) -> GResult<Val> {
	let name = name_arg(rt, args[0])?;
	match rt.find_method(rt.class_of(this), name, None, None) {
		Some(method) => Ok(Val::Method(rt.method_obj(this, method))),
		None => bail!(NameError, "undefined method `{}' for {}", name, rt.inspect_str(this))
	}
}

fn kernel_singleton_class(rt: &mut Runtime, _env: &Rc<Env>, this: Val, _args: &[Val],
                          _block: Option<Val>) -> GResult<Val> {
	Ok(Val::Module(rt.singleton_class(this)?))
}

fn kernel_at_exit(rt: &mut Runtime, _env: &Rc<Env>, _this: Val, _args: &[Val],
                  block: Option<Val>) -> GResult<Val> {
	match block {
		Some(handler) => {
			rt.at_exit(handler)?;
			Ok(handler)
		}
		None => bail!(ArgumentError, "called without a block")
	}
}

//exit(true) and exit() succeed, exit(false) fails, and any non-integer status exits with 1
fn kernel_exit(_rt: &mut Runtime, _env: &Rc<Env>, _this: Val, args: &[Val],
               _block: Option<Val>) -> GResult<Val> {
	check_arity(args, 0, Some(1))?;

	let status = match args.get(0) {
		None | Some(Val::Bool(true)) => Some(0),
		Some(Val::Bool(false)) => Some(1),
		Some(&Val::Int(status)) => Some(status),
		Some(_) => None
	};

	Err(GError::exit(status))
}

//-------------------------------------------------------------------------------------------------
// Method, Proc
//-------------------------------------------------------------------------------------------------

fn method_call(rt: &mut Runtime, env: &Rc<Env>, this: Val, args: &[Val],
               block: Option<Val>) -> GResult<Val> {
	rt.call_value(env, this, args, block)
}

fn method_owner(rt: &mut Runtime, _env: &Rc<Env>, this: Val, _args: &[Val],
                _block: Option<Val>) -> GResult<Val> {
	let method_obj = rt.get(Gc::<MethodObj>::from_val(rt, this)?);
	Ok(Val::Module(method_obj.method().owner()))
}

fn method_arity(rt: &mut Runtime, _env: &Rc<Env>, this: Val, _args: &[Val],
                _block: Option<Val>) -> GResult<Val> {
	let method_obj = rt.get(Gc::<MethodObj>::from_val(rt, this)?);
	Ok(Val::Int(method_obj.method().arity() as i64))
}

fn proc_call(rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
             block: Option<Val>) -> GResult<Val> {
	let proc = Gc::<Proc>::from_val(rt, this)?;
	rt.call_proc(proc, args, block)
}

//-------------------------------------------------------------------------------------------------
// Integer, Float
//-------------------------------------------------------------------------------------------------

//dispatches `lhs op rhs` through `rhs.coerce(lhs)`, for operands this type doesn't understand
fn coerced_op(rt: &mut Runtime, env: &Rc<Env>, lhs: Val, op: Sym, rhs: Val,
              target: &str) -> GResult<Val> {
	ensure!(rt.respond_to(rhs, COERCE_SYM), TypeError, "{} can't be coerced into {}",
	        conversion_name(rt, rhs), target);

	let (coerced_lhs, coerced_rhs) = rt.coerce(env, rhs, lhs)?;
	rt.send_op(env, coerced_lhs, op, coerced_rhs)
}

//there are no bignums: a sum which overflows i64 is promoted to a float
fn integer_add(rt: &mut Runtime, env: &Rc<Env>, this: Val, args: &[Val],
               _block: Option<Val>) -> GResult<Val> {
	let lhs = i64::from_val(rt, this)?;
	match args[0] {
		Val::Int(rhs) => match lhs.checked_add(rhs) {
			Some(sum) => Ok(Val::Int(sum)),
			None => Ok(Val::Flo(rt.flo(lhs as f64 + rhs as f64)))
		},
		Val::Flo(rhs) => {
			let sum = lhs as f64 + rt.get(rhs).value();
			Ok(Val::Flo(rt.flo(sum)))
		}
		rhs => coerced_op(rt, env, this, ADD_SYM, rhs, "Integer")
	}
}

fn integer_coerce(rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
                  _block: Option<Val>) -> GResult<Val> {
	let pair = match args[0] {
		Val::Int(_) => vec![args[0], this],
		Val::Flo(_) => {
			let lhs = f64::from_val(rt, args[0])?;
			let rhs = f64::from_val(rt, this)?;
			vec![Val::Flo(rt.flo(lhs)), Val::Flo(rt.flo(rhs))]
		}
		other => bail!(TypeError, "can't convert {} into Float", conversion_name(rt, other))
	};

	Ok(Val::Arr(rt.arr(pair)))
}

fn float_add(rt: &mut Runtime, env: &Rc<Env>, this: Val, args: &[Val],
             _block: Option<Val>) -> GResult<Val> {
	let lhs = f64::from_val(rt, this)?;
	match args[0] {
		rhs @ Val::Int(_) | rhs @ Val::Flo(_) => {
			let sum = lhs + f64::from_val(rt, rhs)?;
			Ok(Val::Flo(rt.flo(sum)))
		}
		rhs => coerced_op(rt, env, this, ADD_SYM, rhs, "Float")
	}
}

fn float_coerce(rt: &mut Runtime, _env: &Rc<Env>, this: Val, args: &[Val],
                _block: Option<Val>) -> GResult<Val> {
	let pair = match args[0] {
		Val::Int(i) => vec![Val::Flo(rt.flo(i as f64)), this],
		Val::Flo(_) => vec![args[0], this],
		other => bail!(TypeError, "can't convert {} into Float", conversion_name(rt, other))
	};

	Ok(Val::Arr(rt.arr(pair)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::{ErrorKind};

	fn send(rt: &mut Runtime, receiver: Val, name: &str, args: &[Val]) -> GResult<Val> {
		let env = rt.top_env();
		rt.send(&env, receiver, name, args, None)
	}

	fn float(rt: &Runtime, val: Val) -> f64 {
		f64::from_val(rt, val).unwrap()
	}

	#[test]
	fn new_allocates_and_initializes() {
		let mut rt = Runtime::new();
		let object = rt.core().object;
		let point = rt.define_class("Point", object).unwrap();
		rt.define_closure(point, "initialize", 2, |rt, _, this, args, _| {
			rt.ivar_set(this, "@x", args[0])?;
			rt.ivar_set(this, "@y", args[1])?;
			Ok(Val::Nil)
		});

		let p = send(&mut rt, Val::Module(point), "new", &[Val::Int(1), Val::Int(2)]).unwrap();
		assert_eq!(rt.real_class_of(p), point);
		assert_eq!(rt.ivar_get(p, "@y").unwrap(), Val::Int(2));

		let err = send(&mut rt, Val::Module(point), "new", &[]).unwrap_err();
		assert_eq!(err.message(), "wrong number of arguments (given 0, expected 2)");
	}

	#[test]
	fn new_honours_the_instance_tag() {
		let mut rt = Runtime::new();
		let array = rt.core().array;
		let list = rt.define_class("List", array).unwrap();

		let instance = send(&mut rt, Val::Module(list), "new", &[]).unwrap();
		assert!(instance.is_arr());
		assert_eq!(rt.real_class_of(instance), list);
		assert!(rt.is_a(instance, rt.core().enumerable));

		let integer = rt.core().integer;
		let err = send(&mut rt, Val::Module(integer), "new", &[]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::TypeError);
		assert_eq!(err.message(), "allocator undefined for Integer");
	}

	#[test]
	fn class_new_creates_anonymous_classes() {
		let mut rt = Runtime::new();
		let (class, object) = (rt.core().class, rt.core().object);

		let anon = send(&mut rt, Val::Module(class), "new", &[]).unwrap();
		assert_eq!(send(&mut rt, anon, "name", &[]).unwrap(), Val::Nil);
		assert_eq!(send(&mut rt, anon, "superclass", &[]).unwrap(), Val::Module(object));

		let name = Val::Sym(sym("Widget"));
		send(&mut rt, Val::Module(object), "const_set", &[name, anon]).unwrap();
		let text = send(&mut rt, anon, "name", &[]).unwrap();
		assert_eq!(String::from_val(&rt, text).unwrap(), "Widget");

		let err = send(&mut rt, Val::Module(class), "new", &[Val::Int(1)]).unwrap_err();
		assert_eq!(err.message(), "wrong argument type Integer (expected Class)");
	}

	#[test]
	fn include_preserves_argument_order() {
		let mut rt = Runtime::new();
		let object = rt.core().object;
		let c = rt.define_class("C", object).unwrap();
		let a = rt.define_module("A");
		let b = rt.define_module("B");

		send(&mut rt, Val::Module(c), "include", &[Val::Module(a), Val::Module(b)]).unwrap();
		let ancestors = send(&mut rt, Val::Module(c), "ancestors", &[]).unwrap();
		let ancestors = rt.get(ancestors.unwrap_arr()).to_vec();
		assert_eq!(&ancestors[.. 4], &[Val::Module(c), Val::Module(a), Val::Module(b),
		                               Val::Module(object)]);

		let err = send(&mut rt, Val::Module(c), "include", &[Val::Int(1)]).unwrap_err();
		assert_eq!(err.message(), "wrong argument type Integer (expected Module)");
	}

	#[test]
	fn constants_need_valid_names() {
		let mut rt = Runtime::new();
		let object = Val::Module(rt.core().object);

		let err = send(&mut rt, object, "const_set", &[Val::Sym(sym("lower")), Val::Int(1)]);
		assert_eq!(err.unwrap_err().message(), "wrong constant name lower");

		send(&mut rt, object, "const_set", &[Val::Sym(sym("Answer")), Val::Int(42)]).unwrap();
		let found = send(&mut rt, object, "const_get", &[Val::Sym(sym("Answer"))]).unwrap();
		assert_eq!(found, Val::Int(42));

		let err = send(&mut rt, object, "const_get", &[Val::Sym(sym("Question"))]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NameError);
	}

	#[test]
	fn define_method_accepts_blocks_and_method_objects() {
		let mut rt = Runtime::new();
		let object = rt.core().object;
		let a = rt.define_class("A", object).unwrap();
		let top = rt.top_env();

		let block = rt.proc(&top, 0, false, |_, _, _, _| Ok(Val::Int(7)));
		rt.send(&top, Val::Module(a), "define_method", &[Val::Sym(sym("seven"))],
		        Some(Val::Proc(block))).unwrap();

		let obj = Val::Obj(rt.obj(a));
		assert_eq!(send(&mut rt, obj, "seven", &[]).unwrap(), Val::Int(7));

		let bound = send(&mut rt, obj, "method", &[Val::Sym(sym("seven"))]).unwrap();
		send(&mut rt, Val::Module(a), "define_method", &[Val::Sym(sym("also")), bound]).unwrap();
		assert_eq!(send(&mut rt, obj, "also", &[]).unwrap(), Val::Int(7));

		let err = send(&mut rt, Val::Module(a), "define_method", &[Val::Sym(sym("x"))]);
		assert_eq!(err.unwrap_err().message(), "tried to create Proc object without a block");
	}

	#[test]
	fn kernel_reflection() {
		let mut rt = Runtime::new();
		let integer = Val::Module(rt.core().integer);
		let comparable = Val::Module(rt.core().comparable);

		assert_eq!(send(&mut rt, Val::Int(3), "class", &[]).unwrap(), integer);
		assert_eq!(send(&mut rt, Val::Int(3), "is_a?", &[comparable]).unwrap(), Val::Bool(true));
		assert_eq!(send(&mut rt, Val::Nil, "is_a?", &[comparable]).unwrap(), Val::Bool(false));

		let err = send(&mut rt, Val::Int(3), "is_a?", &[Val::Int(1)]).unwrap_err();
		assert_eq!(err.message(), "class or module required");

		let plus = Val::Sym(sym("+"));
		assert_eq!(send(&mut rt, Val::Int(3), "respond_to?", &[plus]).unwrap(), Val::Bool(true));
		assert_eq!(send(&mut rt, Val::Nil, "respond_to?", &[plus]).unwrap(), Val::Bool(false));

		let text = send(&mut rt, Val::Int(3), "inspect", &[]).unwrap();
		assert_eq!(String::from_val(&rt, text).unwrap(), "3");
	}

	#[test]
	fn method_objects_are_callable() {
		let mut rt = Runtime::new();
		let integer = rt.core().integer;

		let plus = send(&mut rt, Val::Int(40), "method", &[Val::Sym(sym("+"))]).unwrap();
		assert_eq!(send(&mut rt, plus, "call", &[Val::Int(2)]).unwrap(), Val::Int(42));
		assert_eq!(send(&mut rt, plus, "owner", &[]).unwrap(), Val::Module(integer));
		assert_eq!(send(&mut rt, plus, "arity", &[]).unwrap(), Val::Int(1));
		assert_eq!(rt.inspect(plus).unwrap(), "#<Method: Integer#+(*)>");

		let err = send(&mut rt, Val::Int(40), "method", &[Val::Sym(sym("nope"))]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::NameError);
	}

	#[test]
	fn exit_statuses() {
		let mut rt = Runtime::new();
		let main = rt.main();

		let cases = [
			(vec![], Some(0)),
			(vec![Val::Bool(true)], Some(0)),
			(vec![Val::Bool(false)], Some(1)),
			(vec![Val::Int(3)], Some(3)),
			(vec![Val::Sym(sym("x"))], None)
		];

		for (args, status) in cases.iter() {
			let err = send(&mut rt, main, "exit", args).unwrap_err();
			assert!(err.is_exit());
			assert_eq!(err.status(), *status);
		}

		let err = send(&mut rt, main, "at_exit", &[]).unwrap_err();
		assert_eq!(err.message(), "called without a block");
	}

	#[test]
	fn numeric_addition_and_coercion() {
		let mut rt = Runtime::new();

		assert_eq!(send(&mut rt, Val::Int(2), "+", &[Val::Int(3)]).unwrap(), Val::Int(5));

		let sum = send(&mut rt, Val::Int(i64::MAX), "+", &[Val::Int(1)]).unwrap();
		assert!(sum.is_flo());

		let half = Val::Flo(rt.flo(0.5));
		let sum = send(&mut rt, Val::Int(2), "+", &[half]).unwrap();
		assert_eq!(float(&rt, sum), 2.5);

		let sum = send(&mut rt, half, "+", &[Val::Int(1)]).unwrap();
		assert_eq!(float(&rt, sum), 1.5);

		let pair = send(&mut rt, Val::Int(1), "coerce", &[half]).unwrap();
		let pair = rt.get(pair.unwrap_arr()).to_vec();
		assert_eq!((float(&rt, pair[0]), float(&rt, pair[1])), (0.5, 1.0));

		let err = send(&mut rt, Val::Int(1), "+", &[Val::Nil]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::TypeError);
		assert_eq!(err.message(), "nil can't be coerced into Integer");
	}

	#[test]
	fn addition_dispatches_through_coerce() {
		let mut rt = Runtime::new();
		let object = rt.core().object;
		let meters = rt.define_class("Meters", object).unwrap();

		//Meters#coerce(n) answers [Meters(n), self]
		rt.define_closure(meters, "coerce", 1, |rt, _, this, args, _| {
			let class = rt.real_class_of(this);
			let wrapped = rt.obj(class);
			rt.ivar_set(Val::Obj(wrapped), "@n", args[0])?;
			Ok(Val::Arr(rt.arr(vec![Val::Obj(wrapped), this])))
		});

		rt.define_closure(meters, "+", 1, |rt, _, this, args, _| {
			let lhs = i64::from_val(rt, rt.ivar_get(this, "@n")?)?;
			let rhs = i64::from_val(rt, rt.ivar_get(args[0], "@n")?)?;
			Ok(Val::Int(lhs + rhs))
		});

		let five = rt.obj(meters);
		rt.ivar_set(Val::Obj(five), "@n", Val::Int(5)).unwrap();

		assert_eq!(send(&mut rt, Val::Int(2), "+", &[Val::Obj(five)]).unwrap(), Val::Int(7));
	}
}
