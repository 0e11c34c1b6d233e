use garnet::prelude::*;

fn counter_class(rt: &mut Runtime) -> GResult<Gc<Module>> {
	let object = rt.core().object;
	let counter = rt.define_class("Counter", object)?;

	rt.define_closure(counter, "initialize", 1, |rt, _, this, args, _| {
		let start: i64 = rt.arg(args, 0)?;
		rt.ivar_set(this, "@count", Val::Int(start))?;
		Ok(Val::Nil)
	});

	rt.define_closure(counter, "increment", -1, |rt, _, this, args, _| {
		let step: Option<i64> = rt.arg(args, 0)?;
		let current = rt.ivar_get(this, "@count")?;
		let count = i64::from_val(rt, current)?;
		let count = count + step.unwrap_or(1);
		rt.ivar_set(this, "@count", Val::Int(count))?;
		Ok(Val::Int(count))
	});

	rt.define_closure(counter, "method_missing", -2, |rt, _, _, args, _| {
		let name: Sym = rt.arg(args, 0)?;
		let reply = format!("no {} here", name);
		Ok(reply.to_val(rt))
	});

	Ok(counter)
}

#[test]
fn embedding_a_class() -> GResult<()> {
	let mut rt = Runtime::new();
	let env = rt.top_env();
	let counter = counter_class(&mut rt)?;

	let instance = rt.send(&env, Val::Module(counter), "new", &[Val::Int(10)], None)?;
	assert_eq!(rt.send(&env, instance, "increment", &[], None)?, Val::Int(11));
	assert_eq!(rt.send(&env, instance, "increment", &[Val::Int(5)], None)?, Val::Int(16));

	let reply = rt.send(&env, instance, "reset", &[], None)?;
	let reply: String = FromVal::from_val(&rt, reply)?;
	assert_eq!(reply, "no reset here");

	let err = rt.send(&env, instance, "increment", &[Val::Bool(true)], None).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::TypeError);
	assert_eq!(err.message(), "no implicit conversion of true into Integer");

	Ok(())
}

#[test]
fn constants_and_reflection() -> GResult<()> {
	let mut rt = Runtime::new();
	let env = rt.top_env();
	let counter = counter_class(&mut rt)?;
	let object = rt.core().object;

	let found = rt.send(&env, Val::Module(object), "const_get", &[Val::Sym(sym("Counter"))], None)?;
	assert_eq!(found, Val::Module(counter));

	let instance = rt.send(&env, Val::Module(counter), "new", &[Val::Int(0)], None)?;
	assert_eq!(rt.send(&env, instance, "is_a?", &[Val::Module(object)], None)?, Val::Bool(true));

	let responds = rt.send(&env, instance, "respond_to?", &[Val::Sym(sym("increment"))], None)?;
	assert_eq!(responds, Val::Bool(true));

	let err = rt.send(&env, Val::Module(object), "const_get", &[Val::Sym(sym("Missing"))], None)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::NameError);

	Ok(())
}

#[test]
fn native_values_convert_both_ways() -> GResult<()> {
	let mut rt = Runtime::new();

	let list = vec![1i64, 2, 3].to_val(&mut rt);
	let arr: Gc<Arr> = FromVal::from_val(&rt, list)?;
	assert_eq!(rt.get(arr).to_vec(), [Val::Int(1), Val::Int(2), Val::Int(3)]);

	let none: Option<i64> = FromVal::from_val(&rt, Val::Nil)?;
	assert_eq!(none, None);

	let text = "garnet".to_val(&mut rt);
	let back: String = FromVal::from_val(&rt, text)?;
	assert_eq!(back, "garnet");

	Ok(())
}
