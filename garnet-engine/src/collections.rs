use smallvec::{SmallVec};
use std::cell::{Ref, RefCell};
use std::mem::{size_of};
use super::class::{Module};
use super::gc::{Allocate, Gc, Header, Visitor};
use super::val::{Val};

//-------------------------------------------------------------------------------------------------
// Arr
//-------------------------------------------------------------------------------------------------

/**
The storage behind an `Array` instance.

`Arr` is the runtime's sequence type: it reports a length, supports indexed access, and can be
pushed to. The argument binder produces and consumes `Arr`s; collaborator library code is free to
build a full `Array` API on top of it.
*/

pub struct Arr {
	header: Header,
	class: Gc<Module>,
	elements: RefCell<Vec<Val>>
}

impl Arr {
	pub(crate) fn new(class: Gc<Module>, elements: Vec<Val>) -> Arr {
		Arr {
			header: Header::new(),
			class,
			elements: RefCell::new(elements)
		}
	}

	pub fn class(&self) -> Gc<Module> {
		self.class
	}

	pub fn len(&self) -> usize {
		self.elements.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.elements.borrow().is_empty()
	}

	pub fn get(&self, index: usize) -> Option<Val> {
		self.elements.borrow().get(index).copied()
	}

	pub fn last(&self) -> Option<Val> {
		self.elements.borrow().last().copied()
	}

	pub fn push(&self, val: Val) {
		self.elements.borrow_mut().push(val)
	}

	pub fn set(&self, index: usize, val: Val) {
		let mut elements = self.elements.borrow_mut();
		if index >= elements.len() {
			elements.resize(index + 1, Val::Nil);
		}

		elements[index] = val;
	}

	pub fn borrow(&self) -> Ref<Vec<Val>> {
		self.elements.borrow()
	}

	pub fn to_vec(&self) -> Vec<Val> {
		self.elements.borrow().clone()
	}

	pub(crate) fn to_smallvec(&self) -> SmallVec<[Val; 8]> {
		SmallVec::from_slice(&self.elements.borrow())
	}
}

impl Allocate for Arr {
	fn header(&self) -> &Header {
		&self.header
	}

	fn visit_children<V: Visitor>(&self, visitor: &mut V) {
		visitor.visit(&self.class);
		for val in self.elements.borrow().iter() {
			visitor.visit_val(val);
		}
	}

	fn owned_memory_usage(&self) -> usize {
		self.elements.borrow().capacity() * size_of::<Val>()
	}
}

//-------------------------------------------------------------------------------------------------
// Tab
//-------------------------------------------------------------------------------------------------

/**
The storage behind a `Hash` instance.

Entries keep their insertion order. Keys are compared with `Val` equality, which is identity for
heap references, so in practice keys are symbols or other immediates. Keyword arguments travel as
a trailing `Tab` with symbol keys.
*/

pub struct Tab {
	header: Header,
	class: Gc<Module>,
	entries: RefCell<Vec<(Val, Val)>>
}

impl Tab {
	pub(crate) fn new(class: Gc<Module>) -> Tab {
		Tab {
			header: Header::new(),
			class,
			entries: RefCell::new(Vec::new())
		}
	}

	pub fn class(&self) -> Gc<Module> {
		self.class
	}

	pub fn len(&self) -> usize {
		self.entries.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.borrow().is_empty()
	}

	pub fn get(&self, key: Val) -> Option<Val> {
		self.entries.borrow().iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
	}

	pub fn has(&self, key: Val) -> bool {
		self.entries.borrow().iter().any(|(k, _)| *k == key)
	}

	pub fn set(&self, key: Val, val: Val) {
		let mut entries = self.entries.borrow_mut();
		match entries.iter_mut().find(|(k, _)| *k == key) {
			Some(entry) => entry.1 = val,
			None => entries.push((key, val))
		}
	}

	pub fn remove(&self, key: Val) -> Option<Val> {
		let mut entries = self.entries.borrow_mut();
		let position = entries.iter().position(|(k, _)| *k == key)?;
		Some(entries.remove(position).1)
	}

	pub fn keys(&self) -> Vec<Val> {
		self.entries.borrow().iter().map(|(k, _)| *k).collect()
	}

	pub fn entries(&self) -> Vec<(Val, Val)> {
		self.entries.borrow().clone()
	}
}

impl Allocate for Tab {
	fn header(&self) -> &Header {
		&self.header
	}

	fn visit_children<V: Visitor>(&self, visitor: &mut V) {
		visitor.visit(&self.class);
		for (key, val) in self.entries.borrow().iter() {
			visitor.visit_val(key);
			visitor.visit_val(val);
		}
	}

	fn owned_memory_usage(&self) -> usize {
		self.entries.borrow().capacity() * size_of::<(Val, Val)>()
	}
}

//-------------------------------------------------------------------------------------------------
// Str, Flo
//-------------------------------------------------------------------------------------------------

///The storage behind a `String` instance.
pub struct Str {
	header: Header,
	class: Gc<Module>,
	text: RefCell<String>
}

impl Str {
	pub(crate) fn new(class: Gc<Module>, text: String) -> Str {
		Str {
			header: Header::new(),
			class,
			text: RefCell::new(text)
		}
	}

	pub fn class(&self) -> Gc<Module> {
		self.class
	}

	pub fn text(&self) -> String {
		self.text.borrow().clone()
	}

	pub fn push_str(&self, text: &str) {
		self.text.borrow_mut().push_str(text)
	}
}

impl Allocate for Str {
	fn header(&self) -> &Header {
		&self.header
	}

	fn visit_children<V: Visitor>(&self, visitor: &mut V) {
		visitor.visit(&self.class);
	}

	fn owned_memory_usage(&self) -> usize {
		self.text.borrow().capacity()
	}
}

///A boxed float. Floats are immutable, and always belong to the `Float` class.
pub struct Flo {
	header: Header,
	value: f64
}

impl Flo {
	pub(crate) fn new(value: f64) -> Flo {
		Flo {
			header: Header::new(),
			value
		}
	}

	pub fn value(&self) -> f64 {
		self.value
	}
}

impl Allocate for Flo {
	fn header(&self) -> &Header {
		&self.header
	}

	fn visit_children<V: Visitor>(&self, _visitor: &mut V) { }
}
