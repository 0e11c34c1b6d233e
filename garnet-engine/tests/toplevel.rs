use garnet_engine::{bail, sym, GResult, Runtime, RuntimeBuilder, Val};
use std::cell::{RefCell};
use std::io::{self, Write};
use std::rc::{Rc};

//an error writer whose output the test can inspect afterwards
#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Captured {
	fn text(&self) -> String {
		String::from_utf8_lossy(&self.0.borrow()).into_owned()
	}
}

impl Write for Captured {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.borrow_mut().extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

fn captured_runtime() -> (Runtime, Captured) {
	let captured = Captured::default();
	let rt = RuntimeBuilder::new().error_writer(Box::new(captured.clone())).build();
	(rt, captured)
}

fn exit_with(status: Val) -> i32 {
	let (mut rt, captured) = captured_runtime();
	let code = rt.run_main(|rt, env| {
		let main = rt.main();
		rt.send(env, main, "exit", &[status], None)
	});

	assert_eq!(captured.text(), "");
	code
}

#[test]
fn exit_codes() {
	let (mut rt, _) = captured_runtime();
	assert_eq!(rt.run_main(|_, _| Ok(Val::Nil)), 0);

	assert_eq!(exit_with(Val::Int(3)), 3);
	assert_eq!(exit_with(Val::Int(0)), 0);
	assert_eq!(exit_with(Val::Int(256)), 1);
	assert_eq!(exit_with(Val::Bool(true)), 0);
	assert_eq!(exit_with(Val::Bool(false)), 1);
	assert_eq!(exit_with(Val::Sym(sym("x"))), 1);
}

#[test]
fn uncaught_errors_print_a_backtrace() -> GResult<()> {
	let (mut rt, captured) = captured_runtime();
	let object = rt.core().object;
	let class = rt.define_class("A", object)?;

	rt.define_closure(class, "inner", 0, |_, _, _, _, _| bail!(TypeError, "oops"));
	rt.define_closure(class, "outer", 0, |rt, env, this, _, _| rt.send(env, this, "inner", &[], None));

	let code = rt.run_main(|rt, env| {
		let instance = Val::Obj(rt.obj(class));
		rt.send(env, instance, "outer", &[], None)
	});

	assert_eq!(code, 1);
	assert_eq!(captured.text(), "Traceback (most recent call last):\n\
	                             \x20       1: from in `A#outer'\n\
	                             in `A#inner': oops (TypeError)\n");
	Ok(())
}

#[test]
fn at_exit_handlers_run_in_reverse_on_every_exit() {
	for &failing in &[false, true] {
		let (mut rt, _) = captured_runtime();
		let order = Rc::new(RefCell::new(Vec::new()));

		let code = rt.run_main(|rt, env| {
			let main = rt.main();
			for i in 1 ..= 3 {
				let order = Rc::clone(&order);
				let handler = rt.proc(env, 0, false, move |_, _, _, _| {
					order.borrow_mut().push(i);
					Ok(Val::Nil)
				});
				rt.send(env, main, "at_exit", &[], Some(Val::Proc(handler)))?;
			}

			if failing {
				rt.send(env, main, "exit", &[Val::Int(7)], None)
			} else {
				Ok(Val::Nil)
			}
		});

		assert_eq!(code, if failing { 7 } else { 0 });
		assert_eq!(*order.borrow(), [3, 2, 1]);
	}
}

#[test]
fn a_failing_handler_does_not_stop_the_others() {
	let (mut rt, captured) = captured_runtime();
	let ran = Rc::new(RefCell::new(false));

	let code = rt.run_main(|rt, env| {
		let ran = Rc::clone(&ran);
		let first = rt.proc(env, 0, false, move |_, _, _, _| {
			*ran.borrow_mut() = true;
			Ok(Val::Nil)
		});
		let second = rt.proc(env, 0, false, |_, _, _, _| bail!(ArgumentError, "handler failed"));

		rt.at_exit(Val::Proc(first))?;
		rt.at_exit(Val::Proc(second))?;
		Ok(Val::Nil)
	});

	assert_eq!(code, 0);
	assert!(*ran.borrow());
	assert!(captured.text().contains("handler failed (ArgumentError)"));
}

#[test]
fn at_exit_rejects_non_callables() {
	let mut rt = Runtime::new();
	let err = rt.at_exit(Val::Int(1)).unwrap_err();
	assert_eq!(err.message(), "wrong argument type Integer (expected Proc)");
}

#[test]
fn handlers_survive_a_collection_while_exiting() {
	let (mut rt, _) = captured_runtime();
	let ran = Rc::new(RefCell::new(false));

	let code = rt.run_main(|rt, env| {
		let ran = Rc::clone(&ran);
		let first = rt.proc(env, 0, false, move |_, _, _, _| {
			*ran.borrow_mut() = true;
			Ok(Val::Nil)
		});
		let collecting = rt.proc(env, 0, false, |rt, _, _, _| {
			rt.collect();
			Ok(Val::Nil)
		});

		rt.at_exit(Val::Proc(first))?;
		rt.at_exit(Val::Proc(collecting))?;
		Ok(Val::Nil)
	});

	assert_eq!(code, 0);
	assert!(*ran.borrow());
}
