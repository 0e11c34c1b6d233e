use fnv::{FnvHashSet};
use std::cell::{Cell};
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::{PhantomData};
use std::mem::{size_of};
use std::rc::{Rc};
use tracing::{debug};
use super::class::{Module, Obj};
use super::code::{MethodObj, Proc};
use super::collections::{Arr, Flo, Str, Tab};
use super::val::{Val};

//the collector is a plain stop-the-world mark-and-sweep over an arena of slots. cells are
//addressed by (slot index, generation) pairs; a slot's generation is bumped whenever its cell is
//freed, so that a stale handle can never silently alias a newer cell.

//-------------------------------------------------------------------------------------------------
// Gc, CellRef
//-------------------------------------------------------------------------------------------------

/**
A non-owning handle to a heap cell of type `T`.

`Gc` is `Copy`, and holding one does not keep its cell alive: the heap owns every cell, and it
frees any cell which is unreachable from the root set when it collects. Dereferencing a handle
to a freed cell is a fatal error.
*/

pub struct Gc<T: Allocate> {
	index: u32,
	generation: u32,

	//the raw pointer makes Gc !Send and !Sync
	phantom: PhantomData<*mut T>
}

impl<T: Allocate> Gc<T> {
	fn new(index: u32, generation: u32) -> Gc<T> {
		Gc {
			index,
			generation,
			phantom: PhantomData
		}
	}

	#[inline]
	pub fn erase(&self) -> CellRef {
		CellRef {
			index: self.index,
			generation: self.generation
		}
	}
}

impl<T: Allocate> Clone for Gc<T> {
	fn clone(&self) -> Gc<T> {
		*self
	}
}

impl<T: Allocate> Copy for Gc<T> { }

impl<T: Allocate> PartialEq for Gc<T> {
	fn eq(&self, other: &Gc<T>) -> bool {
		self.index == other.index && self.generation == other.generation
	}
}

impl<T: Allocate> Eq for Gc<T> { }

impl<T: Allocate> Hash for Gc<T> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.index.hash(state);
		self.generation.hash(state);
	}
}

impl<T: Allocate> Debug for Gc<T> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		write!(f, "Gc<{}>({}#{})", T::TYPE_NAME, self.index, self.generation)
	}
}

///An untyped heap reference, as returned by [`Val::as_cell`](enum.Val.html#method.as_cell).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct CellRef {
	index: u32,
	generation: u32
}

impl CellRef {
	pub fn index(&self) -> u32 {
		self.index
	}
}

//-------------------------------------------------------------------------------------------------
// ErasedCell
//-------------------------------------------------------------------------------------------------

macro_rules! erased_cells {
	($($type_name:ident),+) => (

		#[doc(hidden)]
		pub trait Erase {
			const TYPE_NAME: &'static str;

			fn erase_cell(rc: Rc<Self>) -> ErasedCell where Self: Allocate;
			fn unerase_cell(erased: &ErasedCell) -> Option<Rc<Self>> where Self: Allocate;
		}

		$(impl Erase for $type_name {
			const TYPE_NAME: &'static str = stringify!($type_name);

			#[inline(always)]
			fn erase_cell(rc: Rc<$type_name>) -> ErasedCell {
				ErasedCell::$type_name(rc)
			}

			#[inline(always)]
			fn unerase_cell(erased: &ErasedCell) -> Option<Rc<$type_name>> {
				match erased {
					ErasedCell::$type_name(rc) => Some(Rc::clone(rc)),
					_ => None
				}
			}
		})+

		#[doc(hidden)]
		#[derive(Clone)]
		pub enum ErasedCell {
			$($type_name(Rc<$type_name>)),+
		}

		impl ErasedCell {
			fn header(&self) -> &Header {
				match *self {
					$(ErasedCell::$type_name(ref rc) => rc.header()),+
				}
			}

			fn type_name(&self) -> &'static str {
				match *self {
					$(ErasedCell::$type_name(_) => stringify!($type_name)),+
				}
			}

			fn visit_children<V: Visitor>(&self, visitor: &mut V) {
				match *self {
					$(ErasedCell::$type_name(ref rc) => rc.visit_children(visitor)),+
				}
			}

			fn memory_usage(&self) -> usize {
				match *self {
					$(ErasedCell::$type_name(ref rc) => rc.memory_usage()),+
				}
			}
		}
	);
}

erased_cells!(Obj, Module, Arr, Tab, Str, Flo, Proc, MethodObj);

//-------------------------------------------------------------------------------------------------
// Header, Allocate
//-------------------------------------------------------------------------------------------------

const MARK_BIT: u8 = 0x1;
const PINNED_BIT: u8 = 0x2;

/**
Per-cell collector state: the mark bit, and the non-collectible ("pinned") flag.

The header is an intrusive field of every cell type, so that marking can test and set it
through a shared reference.
*/

#[doc(hidden)]
pub struct Header {
	bits: Cell<u8>
}

impl Header {
	pub(crate) fn new() -> Header {
		Header {
			bits: Cell::new(0)
		}
	}

	#[inline]
	pub(crate) fn marked(&self) -> bool {
		self.bits.get() & MARK_BIT != 0
	}

	#[inline]
	fn mark(&self) {
		self.bits.set(self.bits.get() | MARK_BIT)
	}

	#[inline]
	fn unmark(&self) {
		self.bits.set(self.bits.get() & !MARK_BIT)
	}

	#[inline]
	pub(crate) fn pinned(&self) -> bool {
		self.bits.get() & PINNED_BIT != 0
	}

	fn pin(&self) {
		self.bits.set(self.bits.get() | PINNED_BIT)
	}
}

impl Debug for Header {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		write!(f, "Header(marked: {}, pinned: {})", self.marked(), self.pinned())
	}
}

/**
A type which can be stored on the garbage-collected heap.

`visit_children` must report every `Val` or `Gc` directly held by the cell. A missing edge
means a reachable cell can be freed.
*/

#[doc(hidden)]
pub trait Allocate: Sized + Erase {
	fn header(&self) -> &Header;

	fn visit_children<V: Visitor>(&self, visitor: &mut V);

	//heap memory exclusively owned by the cell: a Vec's buffer counts, an Rc's target doesn't
	fn owned_memory_usage(&self) -> usize {
		0
	}

	fn memory_usage(&self) -> usize {
		size_of::<Self>() + self.owned_memory_usage()
	}
}

//-------------------------------------------------------------------------------------------------
// Visitor
//-------------------------------------------------------------------------------------------------

#[doc(hidden)]
pub trait Visitor {
	fn visit_cell(&mut self, cell: CellRef);

	#[inline]
	fn visit<T: Allocate>(&mut self, gc: &Gc<T>) where Self: Sized {
		self.visit_cell(gc.erase())
	}

	#[inline]
	fn visit_val(&mut self, val: &Val) where Self: Sized {
		if let Ok(cell) = val.as_cell() {
			self.visit_cell(cell)
		}
	}
}

struct MarkingVisitor<'a> {
	slots: &'a [Slot],
	marking_stack: &'a mut Vec<u32>
}

impl<'a> Visitor for MarkingVisitor<'a> {
	#[inline]
	fn visit_cell(&mut self, cell: CellRef) {
		let slot = match self.slots.get(cell.index as usize) {
			Some(slot) if slot.generation == cell.generation => slot,
			_ => fatal!("a live cell refers to freed slot {}", cell.index)
		};

		if let Some(erased) = &slot.cell {
			let header = erased.header();
			if !header.marked() {
				header.mark();
				self.marking_stack.push(cell.index);
			}
		}
	}
}

//-------------------------------------------------------------------------------------------------
// RootStorage
//-------------------------------------------------------------------------------------------------

///A handle to a registered root, returned by [`Runtime::root`](struct.Runtime.html#method.root).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct RootId(u32);

//explicitly-registered roots. entries are reused through a free list, much like heap slots.
struct RootStorage {
	entries: Vec<Option<Val>>,
	free_entries: Vec<u32>
}

impl RootStorage {
	fn new() -> RootStorage {
		RootStorage {
			entries: Vec::new(),
			free_entries: Vec::new()
		}
	}

	fn register(&mut self, val: Val) -> RootId {
		match self.free_entries.pop() {
			Some(i) => {
				self.entries[i as usize] = Some(val);
				RootId(i)
			}
			None => {
				self.entries.push(Some(val));
				RootId((self.entries.len() - 1) as u32)
			}
		}
	}

	fn unregister(&mut self, id: RootId) -> Option<Val> {
		let entry = self.entries.get_mut(id.0 as usize)?;
		let val = entry.take();
		if val.is_some() {
			self.free_entries.push(id.0);
		}

		val
	}

	fn len(&self) -> usize {
		self.entries.len() - self.free_entries.len()
	}
}

//-------------------------------------------------------------------------------------------------
// Heap
//-------------------------------------------------------------------------------------------------

///The minimum value accepted by [`Runtime::gc_set_ratio`](struct.Runtime.html#method.gc_set_ratio).
pub const GC_MIN_RATIO: f32 = 1.2;

///The default ratio of the collection threshold to the population which survived the last collection.
pub const GC_DEFAULT_RATIO: f32 = 1.5;

///The default number of live cells which triggers the first collection.
pub const GC_DEFAULT_THRESHOLD: usize = 4096;

const MAX_SLOTS: usize = u32::MAX as usize;

struct Slot {
	generation: u32,
	cell: Option<ErasedCell>
}

/**
A snapshot of the collector's bookkeeping.
*/

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct HeapStats {
	///Cells currently allocated, including non-collectible cells.
	pub live: usize,

	///Non-collectible cells.
	pub pinned: usize,

	///Explicitly registered roots.
	pub roots: usize,

	pub collections: usize,

	///Cells freed by the most recent collection.
	pub last_freed: usize,

	///The live population at which the next collection triggers.
	pub threshold: usize,

	///Approximate bytes owned by live cells.
	pub memory_usage: usize
}

pub(crate) struct Heap {
	slots: Vec<Slot>,
	free_slots: Vec<u32>,
	marking_stack: Vec<u32>,
	root_storage: RootStorage,

	live: usize,
	pinned: usize,
	memory_usage: usize,

	initial_threshold: usize,
	threshold: usize,
	ratio: f32,
	collections: usize,
	last_freed: usize
}

impl Heap {
	pub(crate) fn new(threshold: usize, ratio: f32) -> Heap {
		Heap {
			slots: Vec::new(),
			free_slots: Vec::new(),
			marking_stack: Vec::new(),
			root_storage: RootStorage::new(),

			live: 0,
			pinned: 0,
			memory_usage: 0,

			initial_threshold: threshold,
			threshold,
			ratio: ratio.max(GC_MIN_RATIO),
			collections: 0,
			last_freed: 0
		}
	}

	pub(crate) fn alloc<T: Allocate>(&mut self, cell: T) -> Gc<T> {
		self.memory_usage += cell.memory_usage();
		let erased = T::erase_cell(Rc::new(cell));

		let gc = match self.free_slots.pop() {
			Some(index) => {
				let slot = &mut self.slots[index as usize];
				debug_assert!(slot.cell.is_none());
				slot.cell = Some(erased);
				Gc::new(index, slot.generation)
			}
			None => {
				if self.slots.len() >= MAX_SLOTS {
					fatal!("heap exhausted: more than {} live cells", MAX_SLOTS)
				}

				self.slots.push(Slot {
					generation: 0,
					cell: Some(erased)
				});

				Gc::new((self.slots.len() - 1) as u32, 0)
			}
		};

		self.live += 1;
		gc
	}

	///Allocates a cell which is exempt from collection. Only for process-lifetime singletons.
	pub(crate) fn alloc_pinned<T: Allocate>(&mut self, cell: T) -> Gc<T> {
		let gc = self.alloc(cell);
		self.get(gc).header().pin();
		self.pinned += 1;
		gc
	}

	pub(crate) fn try_get<T: Allocate>(&self, gc: Gc<T>) -> Option<Rc<T>> {
		match self.slots.get(gc.index as usize) {
			Some(Slot { generation, cell: Some(erased) }) if *generation == gc.generation => {
				T::unerase_cell(erased)
			}
			_ => None
		}
	}

	pub(crate) fn get<T: Allocate>(&self, gc: Gc<T>) -> Rc<T> {
		match self.try_get(gc) {
			Some(rc) => rc,
			None => fatal!("dereferenced a dangling {:?}", gc)
		}
	}

	pub(crate) fn is_live(&self, cell: CellRef) -> bool {
		match self.slots.get(cell.index as usize) {
			Some(slot) => slot.generation == cell.generation && slot.cell.is_some(),
			None => false
		}
	}

	pub(crate) fn should_collect(&self) -> bool {
		self.live >= self.threshold
	}

	pub(crate) fn ratio(&self) -> f32 {
		self.ratio
	}

	pub(crate) fn set_ratio(&mut self, ratio: f32) {
		self.ratio = ratio.max(GC_MIN_RATIO);
	}

	pub(crate) fn register_root(&mut self, val: Val) -> RootId {
		self.root_storage.register(val)
	}

	pub(crate) fn unregister_root(&mut self, id: RootId) -> Option<Val> {
		self.root_storage.unregister(id)
	}

	/**
	Runs a full mark-and-sweep collection, returning the number of cells freed.

	`roots` is the runtime's contribution to the root set; registered roots and pinned cells
	are added here.
	*/
	pub(crate) fn collect(&mut self, roots: &[Val]) -> usize {
		for slot in &self.slots {
			if let Some(erased) = &slot.cell {
				erased.header().unmark();
			}
		}

		//mark
		{
			let mut visitor = MarkingVisitor {
				slots: &self.slots,
				marking_stack: &mut self.marking_stack
			};

			for root in roots {
				visitor.visit_val(root);
			}

			for entry in &self.root_storage.entries {
				if let Some(root) = entry {
					visitor.visit_val(root);
				}
			}

			for (i, slot) in self.slots.iter().enumerate() {
				if let Some(erased) = &slot.cell {
					if erased.header().pinned() {
						visitor.visit_cell(CellRef { index: i as u32, generation: slot.generation });
					}
				}
			}

			while let Some(index) = visitor.marking_stack.pop() {
				let erased = match &visitor.slots[index as usize].cell {
					Some(erased) => erased.clone(),
					None => continue
				};

				erased.visit_children(&mut visitor);
			}
		}

		//sweep
		let mut freed = 0;
		let mut freed_types = FnvHashSet::default();
		for (i, slot) in self.slots.iter_mut().enumerate() {
			let collectable = match &slot.cell {
				Some(erased) => !erased.header().marked() && !erased.header().pinned(),
				None => false
			};

			if collectable {
				if let Some(erased) = slot.cell.take() {
					self.memory_usage = self.memory_usage.saturating_sub(erased.memory_usage());
					freed_types.insert(erased.type_name());
				}

				slot.generation = slot.generation.wrapping_add(1);
				self.free_slots.push(i as u32);
				freed += 1;
			}
		}

		self.live -= freed;
		self.collections += 1;
		self.last_freed = freed;
		self.threshold = self.initial_threshold.max((self.live as f32 * self.ratio).ceil() as usize);

		debug!(freed, live = self.live, threshold = self.threshold, ?freed_types,
		       "garbage collection finished");

		freed
	}

	///Frees every cell, including non-collectible ones, and forgets every registered root.
	pub(crate) fn drain(&mut self) -> usize {
		let drained = self.live;

		for (i, slot) in self.slots.iter_mut().enumerate() {
			if slot.cell.take().is_some() {
				slot.generation = slot.generation.wrapping_add(1);
				self.free_slots.push(i as u32);
			}
		}

		self.root_storage = RootStorage::new();
		self.live = 0;
		self.pinned = 0;
		self.memory_usage = 0;

		debug!(drained, "heap drained");
		drained
	}

	pub(crate) fn stats(&self) -> HeapStats {
		HeapStats {
			live: self.live,
			pinned: self.pinned,
			roots: self.root_storage.len(),
			collections: self.collections,
			last_freed: self.last_freed,
			threshold: self.threshold,
			memory_usage: self.memory_usage
		}
	}
}
