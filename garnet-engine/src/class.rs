use fnv::{FnvHashMap};
use smallvec::{SmallVec};
use std::cell::{Cell, RefCell};
use std::mem::{size_of};
use std::rc::{Rc};
use tracing::{trace};
use super::code::{ClosureFn, Method, MethodBody, NativeFn};
use super::engine::{Runtime, Sym, ToSym};
use super::env::{Env};
use super::error::{GResult};
use super::gc::{Allocate, Gc, Header, Visitor};
use super::val::{TypeTag, Val};

//-------------------------------------------------------------------------------------------------
// Obj
//-------------------------------------------------------------------------------------------------

/**
A plain object: an instance of some class, with its own instance variables.
*/

pub struct Obj {
	header: Header,
	class: Gc<Module>,
	singleton: Cell<Option<Gc<Module>>>,
	ivars: RefCell<FnvHashMap<Sym, Val>>
}

impl Obj {
	pub(crate) fn new(class: Gc<Module>) -> Obj {
		Obj {
			header: Header::new(),
			class,
			singleton: Cell::new(None),
			ivars: RefCell::new(FnvHashMap::default())
		}
	}

	///The object's class, ignoring any singleton class.
	pub fn class(&self) -> Gc<Module> {
		self.class
	}

	pub fn singleton(&self) -> Option<Gc<Module>> {
		self.singleton.get()
	}

	pub fn ivar_get<S: ToSym>(&self, name: S) -> Val {
		self.ivars.borrow().get(&name.to_sym()).copied().unwrap_or(Val::Nil)
	}

	pub fn ivar_set<S: ToSym>(&self, name: S, val: Val) {
		self.ivars.borrow_mut().insert(name.to_sym(), val);
	}

	pub fn ivar_names(&self) -> Vec<Sym> {
		self.ivars.borrow().keys().copied().collect()
	}
}

impl Allocate for Obj {
	fn header(&self) -> &Header {
		&self.header
	}

	fn visit_children<V: Visitor>(&self, visitor: &mut V) {
		visitor.visit(&self.class);
		if let Some(singleton) = self.singleton.get() {
			visitor.visit(&singleton);
		}

		for val in self.ivars.borrow().values() {
			visitor.visit_val(val);
		}
	}

	fn owned_memory_usage(&self) -> usize {
		self.ivars.borrow().capacity() * size_of::<(Sym, Val)>()
	}
}

//-------------------------------------------------------------------------------------------------
// Module
//-------------------------------------------------------------------------------------------------

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ModuleKind {
	Module,
	Class,
	Singleton
}

/**
A module or a class.

Classes are modules with a superclass (except `BasicObject`) which can be instantiated.
Singleton classes are classes attached to a single object; they're created lazily by
[`Runtime::singleton_class`](struct.Runtime.html#method.singleton_class) and can't be
subclassed.

Included modules are stored most-recent-first, which is also the order in which they're
searched.
*/

pub struct Module {
	header: Header,
	kind: ModuleKind,
	name: RefCell<Option<Rc<str>>>,
	superclass: Cell<Option<Gc<Module>>>,
	includes: RefCell<Vec<Gc<Module>>>,
	methods: RefCell<FnvHashMap<Sym, Rc<Method>>>,
	consts: RefCell<FnvHashMap<Sym, Val>>,
	singleton: Cell<Option<Gc<Module>>>,
	attached: Cell<Option<Val>>,
	lexical_parent: Cell<Option<Gc<Module>>>,
	instance_tag: TypeTag,
	is_final: Cell<bool>,

	//memoized linearization, tagged with the hierarchy generation it was computed in
	ancestry: RefCell<Option<(u64, Rc<[Gc<Module>]>)>>
}

impl Module {
	pub(crate) fn new(
		kind: ModuleKind,
		name: Option<&str>,
		superclass: Option<Gc<Module>>,
		instance_tag: TypeTag
	) -> Module {
		Module {
			header: Header::new(),
			kind,
			name: RefCell::new(name.map(Rc::from)),
			superclass: Cell::new(superclass),
			includes: RefCell::new(Vec::new()),
			methods: RefCell::new(FnvHashMap::default()),
			consts: RefCell::new(FnvHashMap::default()),
			singleton: Cell::new(None),
			attached: Cell::new(None),
			lexical_parent: Cell::new(None),
			instance_tag,
			is_final: Cell::new(kind == ModuleKind::Singleton),
			ancestry: RefCell::new(None)
		}
	}

	pub fn kind(&self) -> ModuleKind {
		self.kind
	}

	pub fn is_class(&self) -> bool {
		self.kind != ModuleKind::Module
	}

	pub fn is_singleton(&self) -> bool {
		self.kind == ModuleKind::Singleton
	}

	pub fn name(&self) -> Option<Rc<str>> {
		self.name.borrow().clone()
	}

	pub fn superclass(&self) -> Option<Gc<Module>> {
		self.superclass.get()
	}

	pub fn includes(&self) -> Vec<Gc<Module>> {
		self.includes.borrow().clone()
	}

	pub fn singleton(&self) -> Option<Gc<Module>> {
		self.singleton.get()
	}

	///For a singleton class, the object it belongs to.
	pub fn attached(&self) -> Option<Val> {
		self.attached.get()
	}

	pub fn lexical_parent(&self) -> Option<Gc<Module>> {
		self.lexical_parent.get()
	}

	///The representation used for instances created by `Class#new`.
	pub fn instance_tag(&self) -> TypeTag {
		self.instance_tag
	}

	pub fn is_final(&self) -> bool {
		self.is_final.get()
	}

	pub fn set_final(&self, is_final: bool) {
		self.is_final.set(is_final || self.is_singleton())
	}

	///Looks up a method in this module's own table, ignoring ancestors.
	pub fn get_method(&self, name: Sym) -> Option<Rc<Method>> {
		self.methods.borrow().get(&name).cloned()
	}

	pub fn method_names(&self) -> Vec<Sym> {
		self.methods.borrow().keys().copied().collect()
	}

	///Reads a constant from this module's own table.
	pub fn const_get(&self, name: Sym) -> Option<Val> {
		self.consts.borrow().get(&name).copied()
	}

	pub fn const_names(&self) -> Vec<Sym> {
		self.consts.borrow().keys().copied().collect()
	}
}

impl Allocate for Module {
	fn header(&self) -> &Header {
		&self.header
	}

	fn visit_children<V: Visitor>(&self, visitor: &mut V) {
		if let Some(superclass) = self.superclass.get() {
			visitor.visit(&superclass);
		}

		for module in self.includes.borrow().iter() {
			visitor.visit(module);
		}

		for method in self.methods.borrow().values() {
			method.visit_children(visitor);
		}

		for val in self.consts.borrow().values() {
			visitor.visit_val(val);
		}

		if let Some(singleton) = self.singleton.get() {
			visitor.visit(&singleton);
		}

		if let Some(attached) = self.attached.get() {
			visitor.visit_val(&attached);
		}

		if let Some(parent) = self.lexical_parent.get() {
			visitor.visit(&parent);
		}
	}

	fn owned_memory_usage(&self) -> usize {
		self.includes.borrow().capacity() * size_of::<Gc<Module>>() +
		self.methods.borrow().capacity() * size_of::<(Sym, Rc<Method>)>() +
		self.consts.borrow().capacity() * size_of::<(Sym, Val)>()
	}
}

//-------------------------------------------------------------------------------------------------
// object model operations
//-------------------------------------------------------------------------------------------------

impl Runtime {
	/**
	Creates a new class whose superclass is `superclass`.

	`tag` selects the representation of the new class's instances; by default it's inherited.
	Fails with a `TypeError` if `superclass` is a module, a singleton class, or final.
	*/
	pub fn subclass(
		&mut self,
		superclass: Gc<Module>,
		name: Option<&str>,
		tag: Option<TypeTag>
	) -> GResult<Gc<Module>> {
		let sup = self.get(superclass);
		ensure!(sup.is_class(), TypeError, "superclass must be a Class ({} given)",
		        self.module_name(superclass));
		ensure!(!sup.is_singleton(), TypeError, "can't make subclass of singleton class");
		ensure!(!sup.is_final(), TypeError, "can't make subclass of {}", self.module_name(superclass));

		let tag = tag.unwrap_or(sup.instance_tag());
		Ok(self.alloc(Module::new(ModuleKind::Class, name, Some(superclass), tag)))
	}

	///Creates a named class and binds it as a constant of `Object`.
	pub fn define_class(&mut self, name: &str, superclass: Gc<Module>) -> GResult<Gc<Module>> {
		let object = self.core().object;
		self.define_class_under(object, name, superclass)
	}

	///Creates a named class and binds it as a constant of `outer`.
	pub fn define_class_under(
		&mut self,
		outer: Gc<Module>,
		name: &str,
		superclass: Gc<Module>
	) -> GResult<Gc<Module>> {
		let class = self.subclass(superclass, None, None)?;
		self.const_set(outer, name, Val::Module(class));
		Ok(class)
	}

	///Creates a named module and binds it as a constant of `Object`.
	pub fn define_module(&mut self, name: &str) -> Gc<Module> {
		let module = self.alloc(Module::new(ModuleKind::Module, None, None, TypeTag::Object));
		let object = self.core().object;
		self.const_set(object, name, Val::Module(module));
		module
	}

	/**
	Includes `included` into `module`.

	Inclusion is idempotent: if `included` already appears in `module`'s ancestry, this is a
	no-op. Fails with a `TypeError` if `included` is a class, or an `ArgumentError` if the
	inclusion would create a cycle.
	*/
	pub fn include_once(&mut self, module: Gc<Module>, included: Gc<Module>) -> GResult<()> {
		ensure!(!self.get(included).is_class(), TypeError,
		        "wrong argument type Class (expected Module)");

		if self.ancestry(module).contains(&included) {
			return Ok(())
		}

		ensure!(!self.ancestry(included).contains(&module), ArgumentError,
		        "cyclic include detected");

		self.get(module).includes.borrow_mut().insert(0, included);
		self.invalidate_hierarchy();
		Ok(())
	}

	/**
	Returns the linearized ancestry of `module`: the module itself, then each included module's
	ancestry (most recently included first), then the superclass's ancestry, with duplicates
	dropped in favour of their first occurrence.

	The result is memoized until the next inclusion.
	*/
	pub fn ancestry(&self, module: Gc<Module>) -> Rc<[Gc<Module>]> {
		let cell = self.get(module);
		if let Some((generation, ancestry)) = &*cell.ancestry.borrow() {
			if *generation == self.hierarchy_generation {
				return Rc::clone(ancestry)
			}
		}

		let mut linear = SmallVec::<[Gc<Module>; 16]>::new();
		linear.push(module);

		let includes = cell.includes();
		let parents = includes.iter().copied().chain(cell.superclass());
		for parent in parents {
			for ancestor in self.ancestry(parent).iter() {
				if !linear.contains(ancestor) {
					linear.push(*ancestor);
				}
			}
		}

		let ancestry: Rc<[Gc<Module>]> = Rc::from(&linear[..]);
		*cell.ancestry.borrow_mut() = Some((self.hierarchy_generation, Rc::clone(&ancestry)));
		ancestry
	}

	pub(crate) fn invalidate_hierarchy(&mut self) {
		self.hierarchy_generation += 1;
		self.cache.invalidate();
		trace!(generation = self.hierarchy_generation, "class hierarchy changed");
	}

	//---------------------------------------------------------------------------------------------
	// constants
	//---------------------------------------------------------------------------------------------

	/**
	Binds a constant in `module`'s own table.

	Binding an anonymous module names it after the constant, and records `module` as its
	lexical parent.
	*/
	pub fn const_set<S: ToSym>(&mut self, module: Gc<Module>, name: S, val: Val) {
		let name = name.to_sym();

		if let Val::Module(bound) = val {
			let bound_cell = self.get(bound);
			if bound_cell.name().is_none() {
				let qualified = if module == self.core().object {
					name.name().to_string()
				} else {
					format!("{}::{}", self.module_name(module), name)
				};

				*bound_cell.name.borrow_mut() = Some(Rc::from(qualified));
				bound_cell.lexical_parent.set(Some(module));
			}
		}

		self.get(module).consts.borrow_mut().insert(name, val);
	}

	///Reads a constant from `module`'s own table, failing with a `NameError` when it's unbound.
	pub fn const_fetch<S: ToSym>(&self, module: Gc<Module>, name: S) -> GResult<Val> {
		let name = name.to_sym();
		match self.get(module).const_get(name) {
			Some(val) => Ok(val),
			None => {
				if module == self.core().object {
					bail!(NameError, "uninitialized constant {}", name)
				} else {
					bail!(NameError, "uninitialized constant {}::{}", self.module_name(module), name)
				}
			}
		}
	}

	/**
	Resolves a constant reference made from within `module`.

	Searches `module` and its lexical parents, then `module`'s ancestry, then `Object`'s
	ancestry. Fails with a `NameError` when the constant is bound nowhere.
	*/
	pub fn const_find<S: ToSym>(&self, module: Gc<Module>, name: S) -> GResult<Val> {
		let name = name.to_sym();

		let mut scope = Some(module);
		while let Some(cur) = scope {
			let cell = self.get(cur);
			if let Some(val) = cell.const_get(name) {
				return Ok(val)
			}

			scope = cell.lexical_parent();
		}

		let object = self.core().object;
		for start in [module, object].iter() {
			for ancestor in self.ancestry(*start).iter() {
				if let Some(val) = self.get(*ancestor).const_get(name) {
					return Ok(val)
				}
			}
		}

		bail!(NameError, "uninitialized constant {}", name)
	}

	//---------------------------------------------------------------------------------------------
	// singleton classes
	//---------------------------------------------------------------------------------------------

	/**
	Returns the singleton class of `val`, creating it if necessary.

	An object's singleton class inherits from the object's class. A class's singleton class
	inherits from the singleton class of its superclass (or from `Class`, for a root class), so
	class-level methods are inherited along with instance methods. A module's singleton class
	inherits from `Module`.

	`nil`, `true` and `false` answer their own classes. Other immediates, and the built-in
	collection types, can't have singleton classes.
	*/
	pub fn singleton_class(&mut self, val: Val) -> GResult<Gc<Module>> {
		match val {
			Val::Nil => Ok(self.core().nil_class),
			Val::Bool(true) => Ok(self.core().true_class),
			Val::Bool(false) => Ok(self.core().false_class),
			Val::Obj(gc) => {
				let obj = self.get(gc);
				if let Some(singleton) = obj.singleton() {
					return Ok(singleton)
				}

				let singleton = self.new_singleton(val, obj.class());
				obj.singleton.set(Some(singleton));
				Ok(singleton)
			}
			Val::Module(gc) => {
				let module = self.get(gc);
				if let Some(singleton) = module.singleton() {
					return Ok(singleton)
				}

				let superclass = if module.is_class() {
					match module.superclass() {
						Some(sup) => self.singleton_class(Val::Module(sup))?,
						None => self.core().class
					}
				} else {
					self.core().module
				};

				let singleton = self.new_singleton(val, superclass);
				module.singleton.set(Some(singleton));
				Ok(singleton)
			}
			_ => bail!(TypeError, "can't define singleton")
		}
	}

	fn new_singleton(&mut self, attached: Val, superclass: Gc<Module>) -> Gc<Module> {
		let name = format!("#<Class:{}>", self.default_inspect(attached));
		let singleton = Module::new(ModuleKind::Singleton, Some(&name), Some(superclass),
		                            TypeTag::Object);
		singleton.attached.set(Some(attached));

		trace!(%name, "created singleton class");
		self.alloc(singleton)
	}

	//---------------------------------------------------------------------------------------------
	// classes of values
	//---------------------------------------------------------------------------------------------

	///The class which dispatch starts from: the singleton class, if there is one.
	pub fn class_of(&self, val: Val) -> Gc<Module> {
		let core = self.core();
		match val {
			Val::Nil => core.nil_class,
			Val::Bool(true) => core.true_class,
			Val::Bool(false) => core.false_class,
			Val::Int(_) => core.integer,
			Val::Sym(_) => core.symbol,
			Val::Obj(gc) => {
				let obj = self.get(gc);
				obj.singleton().unwrap_or(obj.class())
			}
			Val::Module(gc) => {
				let module = self.get(gc);
				if let Some(singleton) = module.singleton() {
					return singleton
				}

				if !module.is_class() {
					return core.module
				}

				//a class without a singleton class of its own dispatches through the nearest
				//superclass which has one, exactly as if its singleton class had been created
				let mut ancestor = module.superclass();
				while let Some(cur) = ancestor {
					let cell = self.get(cur);
					if let Some(singleton) = cell.singleton() {
						return singleton
					}

					ancestor = cell.superclass();
				}

				core.class
			}
			Val::Arr(gc) => self.get(gc).class(),
			Val::Tab(gc) => self.get(gc).class(),
			Val::Str(gc) => self.get(gc).class(),
			Val::Flo(_) => core.float,
			Val::Proc(_) => core.proc,
			Val::Method(_) => core.method
		}
	}

	///The class reported by `Kernel#class`: singleton classes are skipped.
	pub fn real_class_of(&self, val: Val) -> Gc<Module> {
		let mut class = self.class_of(val);
		loop {
			let cell = self.get(class);
			match cell.superclass() {
				Some(sup) if cell.is_singleton() => class = sup,
				_ => return class
			}
		}
	}

	pub fn is_a(&self, val: Val, module: Gc<Module>) -> bool {
		self.ancestry(self.class_of(val)).contains(&module)
	}

	pub fn module_name(&self, module: Gc<Module>) -> String {
		let cell = self.get(module);
		match cell.name() {
			Some(name) => name.to_string(),
			None if cell.is_class() => format!("#<Class:0x{:08x}>", module.erase().index()),
			None => format!("#<Module:0x{:08x}>", module.erase().index())
		}
	}

	//---------------------------------------------------------------------------------------------
	// method tables
	//---------------------------------------------------------------------------------------------

	/**
	Installs a method in `module`'s table, replacing any previous definition of the same name.

	The replaced `Method` isn't modified, so existing handles to it remain callable.
	*/
	pub fn define_method<S: ToSym>(
		&mut self,
		module: Gc<Module>,
		name: S,
		body: MethodBody,
		arity: i32
	) -> Rc<Method> {
		let name = name.to_sym();
		let method = Rc::new(Method::new(name, module, body, arity));
		self.get(module).methods.borrow_mut().insert(name, Rc::clone(&method));
		self.cache.invalidate();
		method
	}

	pub fn define_native<S: ToSym>(
		&mut self,
		module: Gc<Module>,
		name: S,
		f: NativeFn,
		arity: i32
	) -> Rc<Method> {
		self.define_method(module, name, MethodBody::Native(f), arity)
	}

	pub fn define_closure<S, F>(&mut self, module: Gc<Module>, name: S, arity: i32, f: F) -> Rc<Method>
	where
		S: ToSym,
		F: Fn(&mut Runtime, &Rc<Env>, Val, &[Val], Option<Val>) -> GResult<Val> + 'static
	{
		let f: ClosureFn = Rc::new(f);
		self.define_method(module, name, MethodBody::Closure(f), arity)
	}

	///Installs a method in `val`'s singleton class.
	pub fn define_singleton_method<S: ToSym>(
		&mut self,
		val: Val,
		name: S,
		body: MethodBody,
		arity: i32
	) -> GResult<Rc<Method>> {
		let singleton = self.singleton_class(val)?;
		Ok(self.define_method(singleton, name, body, arity))
	}

	/**
	Binds `new_name` in `module` to the method currently answering `old_name`.

	Fails with a `NameError` when no ancestor of `module` defines `old_name`.
	*/
	pub fn alias_method<S1: ToSym, S2: ToSym>(
		&mut self,
		module: Gc<Module>,
		new_name: S1,
		old_name: S2
	) -> GResult<()> {
		let (new_name, old_name) = (new_name.to_sym(), old_name.to_sym());
		let method = match self.find_method(module, old_name, None, None) {
			Some(method) => method,
			None => {
				bail!(NameError, "undefined method `{}' for class `{}'", old_name,
				      self.module_name(module))
			}
		};

		self.get(module).methods.borrow_mut().insert(new_name, method);
		self.cache.invalidate();
		Ok(())
	}

	///Removes a method from `module`'s own table, failing with a `NameError` if it isn't there.
	pub fn remove_method<S: ToSym>(&mut self, module: Gc<Module>, name: S) -> GResult<()> {
		let name = name.to_sym();
		let removed = self.get(module).methods.borrow_mut().remove(&name);
		ensure!(removed.is_some(), NameError, "method `{}' not defined in {}", name,
		        self.module_name(module));

		self.cache.invalidate();
		Ok(())
	}
}
