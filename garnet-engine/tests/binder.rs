use garnet_engine::{
	bail, sym, ArgBindingSpec, BindingSource, ErrorKind, GResult, Runtime, Source, Val
};

fn ints(rt: &Runtime, val: Val) -> Vec<i64> {
	rt.get(val.unwrap_arr()).to_vec().into_iter().map(|val| val.unwrap_int()).collect()
}

//a block `|a, *b, c|` which answers `[a, b, c]`
fn splat_block(rt: &mut Runtime) -> Val {
	let top = rt.top_env();
	let proc = rt.proc(&top, -1, false, |rt, env, args, _| {
		let spec = ArgBindingSpec::new(BindingSource::Destructure)
			.required_left(1)
			.splat(true)
			.required_right(1);

		let arr = rt.block_args_to_array(env, spec.total_count(), args)?;
		let source = Source::Value(Val::Arr(arr));

		let a = spec.bind(rt, source, &[0], Val::Nil);
		let b = spec.bind_splat(rt, source, &[1]);
		let c = spec.bind(rt, source, &[-1], Val::Nil);
		Ok(Val::Arr(rt.arr(vec![a, Val::Arr(b), c])))
	});

	Val::Proc(proc)
}

#[test]
fn blocks_destructure_a_single_array_argument() -> GResult<()> {
	let mut rt = Runtime::new();
	let env = rt.top_env();
	let block = splat_block(&mut rt);

	let yielded = rt.arr(vec![Val::Int(1), Val::Int(2), Val::Int(3)]);
	let bound = rt.call_value(&env, block, &[Val::Arr(yielded)], None)?;
	let parts = rt.get(bound.unwrap_arr()).to_vec();
	assert_eq!(parts[0], Val::Int(1));
	assert_eq!(ints(&rt, parts[1]), [2]);
	assert_eq!(parts[2], Val::Int(3));

	let bound = rt.call_value(&env, block, &[Val::Int(1), Val::Int(2)], None)?;
	let parts = rt.get(bound.unwrap_arr()).to_vec();
	assert_eq!(parts[0], Val::Int(1));
	assert!(ints(&rt, parts[1]).is_empty());
	assert_eq!(parts[2], Val::Int(2));

	//a lone scalar binds to the first parameter only
	let bound = rt.call_value(&env, block, &[Val::Int(9)], None)?;
	let parts = rt.get(bound.unwrap_arr()).to_vec();
	assert_eq!(parts[0], Val::Int(9));
	assert!(ints(&rt, parts[1]).is_empty());
	assert_eq!(parts[2], Val::Nil);

	Ok(())
}

#[test]
fn blocks_destructure_through_to_ary() -> GResult<()> {
	let mut rt = Runtime::new();
	let env = rt.top_env();
	let object = rt.core().object;

	let pair = rt.define_class("Pair", object)?;
	rt.define_closure(pair, "to_ary", 0, |rt, _, _, _, _| {
		Ok(Val::Arr(rt.arr(vec![Val::Int(4), Val::Int(5), Val::Int(6)])))
	});

	let broken = rt.define_class("Broken", object)?;
	rt.define_closure(broken, "to_ary", 0, |_, _, _, _, _| Ok(Val::Int(5)));

	let block = splat_block(&mut rt);

	let instance = Val::Obj(rt.obj(pair));
	let bound = rt.call_value(&env, block, &[instance], None)?;
	let parts = rt.get(bound.unwrap_arr()).to_vec();
	assert_eq!(parts[0], Val::Int(4));
	assert_eq!(ints(&rt, parts[1]), [5]);
	assert_eq!(parts[2], Val::Int(6));

	let instance = Val::Obj(rt.obj(broken));
	let err = rt.call_value(&env, block, &[instance], None).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::TypeError);
	assert_eq!(err.message(), "can't convert Broken to Array (Broken#to_ary gives Integer)");

	Ok(())
}

#[test]
fn methods_bind_keywords_from_the_trailing_hash() -> GResult<()> {
	let mut rt = Runtime::new();
	let env = rt.top_env();
	let object = rt.core().object;

	//def pick(x, a:, b: 0) = [x, a, b, leftover keyword count]
	let class = rt.define_class("Picker", object)?;
	rt.define_closure(class, "pick", -2, |rt, _, _, args, _| {
		let spec = ArgBindingSpec::new(BindingSource::CallArgs)
			.required_left(1)
			.keywords(true);
		let source = Source::Args(args);

		let x = spec.bind(rt, source, &[0], Val::Nil);
		let a = spec.bind_keyword(rt, source, "a", None)?;
		let b = spec.bind_keyword(rt, source, "b", Some(Val::Int(0)))?;
		let rest = rt.kwarg_hash(args);
		let leftover = rt.get(rest).len() as i64;

		Ok(Val::Arr(rt.arr(vec![x, a, b, Val::Int(leftover)])))
	});

	let picker = Val::Obj(rt.obj(class));

	let kwargs = rt.tab();
	rt.get(kwargs).set(Val::Sym(sym("a")), Val::Int(5));
	let result = rt.send(&env, picker, "pick", &[Val::Int(1), Val::Tab(kwargs)], None)?;
	assert_eq!(ints(&rt, result), [1, 5, 0, 0]);
	assert!(rt.get(kwargs).is_empty());

	let kwargs = rt.tab();
	rt.get(kwargs).set(Val::Sym(sym("b")), Val::Int(2));
	let err = rt.send(&env, picker, "pick", &[Val::Int(1), Val::Tab(kwargs)], None).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::ArgumentError);
	assert_eq!(err.message(), "missing keyword: :a");
	assert_eq!(err.backtrace(), ["in `Picker#pick'"]);

	Ok(())
}

#[test]
fn splatted_values_are_copied() -> GResult<()> {
	let mut rt = Runtime::new();
	let env = rt.top_env();

	let original = rt.arr(vec![Val::Int(1), Val::Int(2)]);
	let copy = rt.splat(&env, Val::Arr(original))?;
	rt.get(copy).push(Val::Int(3));
	assert_eq!(rt.get(original).len(), 2);

	let wrapped = rt.splat(&env, Val::Int(7))?;
	assert_eq!(ints(&rt, Val::Arr(wrapped)), [7]);

	Ok(())
}

#[test]
fn native_methods_can_fail_with_their_own_errors() {
	fn refuse(_: &mut Runtime, _: &std::rc::Rc<garnet_engine::Env>, _: Val, _: &[Val],
	          _: Option<Val>) -> GResult<Val> {
		bail!(ArgumentError, "refused")
	}

	let mut rt = Runtime::new();
	let env = rt.top_env();
	let object = rt.core().object;
	rt.define_native(object, "refuse", refuse, 0);

	let main = rt.main();
	let err = rt.send(&env, main, "refuse", &[], None).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::ArgumentError);
	assert_eq!(err.message(), "refused");
}

#[test]
fn keyword_values_outlive_their_hash() -> GResult<()> {
	let mut rt = Runtime::new();
	let object = rt.core().object;
	rt.define_closure(object, "options", 0, |rt, _, _, _, _| {
		let tab = rt.tab();
		let text = rt.str("hello");
		rt.get(tab).set(Val::Sym(sym("a")), Val::Str(text));
		Ok(Val::Tab(tab))
	});

	rt.scope(|rt| {
		let env = rt.top_env();
		let main = rt.main();
		let kwargs = rt.send(&env, main, "options", &[], None)?;

		let spec = ArgBindingSpec::new(BindingSource::CallArgs).keywords(true);
		let args = [kwargs];
		let a = spec.bind_keyword(rt, Source::Args(&args), "a", None)?;
		assert!(rt.get(kwargs.unwrap_tab()).is_empty());

		rt.collect();
		assert!(rt.is_live(a));
		assert_eq!(rt.get(a.unwrap_str()).text(), "hello");
		Ok(Val::Nil)
	})?;

	Ok(())
}
