use smallvec::{SmallVec};
use tracing::{debug};
use super::engine::{Runtime, Sym, ToSym};
use super::error::{GResult};
use super::gc::{Gc};
use super::collections::{Arr};
use super::val::{Val};

//-------------------------------------------------------------------------------------------------
// ArgBindingSpec
//-------------------------------------------------------------------------------------------------

///Whether a parameter list is being bound to an array (multiple assignment), or to the raw
///arguments of a call.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BindingSource {
	Destructure,
	CallArgs
}

/**
The shape of a parameter list.

The binder is driven by this shape, plus a path of indices identifying one parameter. Parameters
are addressed as follows:

- Required parameters to the left of the optionals, and the optionals themselves, are addressed
  by their position in the parameter list.
- Required parameters after a splat are addressed by negative index from the end: the last
  parameter is `-1`.
- Without a splat, required parameters after the optionals are addressed by their position in
  the parameter list, and shift left by the number of optionals which go unfilled.

When keywords are enabled and call arguments are being bound, a trailing `Hash` argument holds the
keywords and is never bound to a positional parameter.

	//def f(a, *rest, b)
	let spec = ArgBindingSpec::new(BindingSource::CallArgs)
		.required_left(1)
		.splat(true)
		.required_right(1);
*/

#[derive(Clone, Debug)]
pub struct ArgBindingSpec {
	required_left: usize,
	optional: usize,
	required_right: usize,
	splat: bool,
	keywords: bool,
	right_to_left: bool,
	source: BindingSource
}

///The value being bound: either a call's argument list, or a single value to be destructured.
#[derive(Copy, Clone, Debug)]
pub enum Source<'a> {
	Args(&'a [Val]),
	Value(Val)
}

//one level of the path: either a sequence we can index, or a scalar which only answers index 0
enum Level {
	Seq(SmallVec<[Val; 8]>),
	Scalar(Val)
}

impl ArgBindingSpec {
	pub fn new(source: BindingSource) -> ArgBindingSpec {
		ArgBindingSpec {
			required_left: 0,
			optional: 0,
			required_right: 0,
			splat: false,
			keywords: false,
			right_to_left: false,
			source
		}
	}

	pub fn required_left(mut self, count: usize) -> ArgBindingSpec {
		self.required_left = count;
		self
	}

	pub fn optional(mut self, count: usize) -> ArgBindingSpec {
		self.optional = count;
		self
	}

	pub fn required_right(mut self, count: usize) -> ArgBindingSpec {
		self.required_right = count;
		self
	}

	pub fn splat(mut self, splat: bool) -> ArgBindingSpec {
		self.splat = splat;
		self
	}

	pub fn keywords(mut self, keywords: bool) -> ArgBindingSpec {
		self.keywords = keywords;
		self
	}

	///Fill optional parameters from the rightmost one, rather than the leftmost one.
	pub fn fill_right_to_left(mut self, right_to_left: bool) -> ArgBindingSpec {
		self.right_to_left = right_to_left;
		self
	}

	pub fn source(&self) -> BindingSource {
		self.source
	}

	///The number of positional parameters, not counting the splat.
	pub fn total_count(&self) -> usize {
		self.required_left + self.optional + self.required_right
	}

	pub fn required_count(&self) -> usize {
		self.required_left + self.required_right
	}

	fn strips_keywords(&self) -> bool {
		self.keywords && self.source == BindingSource::CallArgs
	}

	/**
	Returns the value bound to the parameter at `path`.

	Every index but the last is a plain index into a nested array (negative indices count from
	the end). The last index is interpreted according to this shape. When the path leads nowhere,
	`default` is returned instead.
	*/
	pub fn bind(&self, rt: &Runtime, source: Source, path: &[isize], default: Val) -> Val {
		let (last, outer) = match path.split_last() {
			Some(split) => split,
			None => return default
		};

		if self.optional > 0 && self.splat && self.required_right > 0 {
			debug!(spec = ?self, ?path, "binding optionals alongside a splat and trailing parameters");
		}

		let level = match self.descend(rt, source, outer) {
			Some(level) => level,
			None => return default
		};

		match level {
			Level::Scalar(val) => if *last == 0 { val } else { default },
			Level::Seq(seq) => {
				let positional = &seq[.. self.positional_len(&seq, outer.is_empty())];
				self.index_positional(positional, *last).unwrap_or(default)
			}
		}
	}

	/**
	Collects the splat parameter, which begins at the last index of `path`, into a new array.

	The splat takes every positional element from its start index up to the first trailing
	required parameter. When the source isn't a sequence, the splat is empty.
	*/
	pub fn bind_splat(&self, rt: &mut Runtime, source: Source, path: &[isize]) -> Gc<Arr> {
		let collected = match path.split_last() {
			Some((last, outer)) => match self.descend(rt, source, outer) {
				Some(Level::Seq(seq)) => {
					let positional = &seq[.. self.positional_len(&seq, outer.is_empty())];
					let end = positional.len().saturating_sub(self.required_right);
					let start = if *last < 0 { 0 } else { *last as usize };

					if start < end {
						positional[start .. end].to_vec()
					} else {
						Vec::new()
					}
				}
				_ => Vec::new()
			},
			None => Vec::new()
		};

		rt.arr(collected)
	}

	/**
	Binds a keyword parameter, removing it from the trailing keyword hash.

	Fails with an `ArgumentError` if the keyword is absent and there's no `default`. Keywords are
	only ever taken from call arguments: when destructuring, a trailing hash is positional.

	Once removed, the hash no longer keeps the value alive, so it's rooted by the current call
	or scope instead.
	*/
	pub fn bind_keyword<S: ToSym>(
		&self,
		rt: &mut Runtime,
		source: Source,
		name: S,
		default: Option<Val>
	) -> GResult<Val> {
		let name: Sym = name.to_sym();

		let found = if self.strips_keywords() {
			let tail = match source {
				Source::Args(args) => args.last().copied(),
				Source::Value(Val::Arr(arr)) => rt.get(arr).last(),
				Source::Value(_) => None
			};

			match tail {
				Some(Val::Tab(tab)) => rt.get(tab).remove(Val::Sym(name)),
				_ => None
			}
		} else {
			None
		};

		match (found, default) {
			(Some(val), _) => {
				rt.vm.push_handle(val);
				Ok(val)
			}
			(None, Some(default)) => Ok(default),
			(None, None) => bail!(ArgumentError, "missing keyword: :{}", name)
		}
	}

	//follows the outer indices of a path, without any shape-awareness
	fn descend(&self, rt: &Runtime, source: Source, outer: &[isize]) -> Option<Level> {
		let mut level = match source {
			Source::Args(args) => Level::Seq(SmallVec::from_slice(args)),
			Source::Value(val) => level_for(rt, val)
		};

		for &index in outer {
			level = match level {
				Level::Seq(seq) => {
					let position = if index < 0 { seq.len() as isize + index } else { index };
					if position < 0 {
						return None
					}

					level_for(rt, *seq.get(position as usize)?)
				}
				Level::Scalar(val) if index == 0 => Level::Scalar(val),
				Level::Scalar(_) => return None
			};
		}

		Some(level)
	}

	//the number of leading elements which are available to positional parameters
	fn positional_len(&self, seq: &[Val], top_level: bool) -> usize {
		match seq.last() {
			Some(Val::Tab(_)) if top_level && self.strips_keywords() => seq.len() - 1,
			_ => seq.len()
		}
	}

	//the shape-aware lookup for the last level of a path. `None` selects the default.
	fn index_positional(&self, positional: &[Val], index: isize) -> Option<Val> {
		let len = positional.len();
		let total = self.total_count();
		let left = self.required_left;
		let optional = self.optional;
		let available = len.saturating_sub(self.required_count()).min(optional);

		if index < 0 {
			//when there are too few elements, the window is anchored to the parameter list
			//rather than to the source, so missing trailing values degrade to the default.
			//unfilled optionals take no elements, so they shift the window left.
			let anchor = len.max(total) - (optional - available);
			let position = anchor as isize + index;
			if position < 0 {
				return None
			}

			return positional.get(position as usize).copied()
		}

		let index = index as usize;

		if index < left {
			positional.get(index).copied()
		} else if index < left + optional {
			let k = index - left;
			let unfilled = optional - available;

			let position = if self.right_to_left {
				if k < unfilled {
					return None
				}

				left + (k - unfilled)
			} else {
				if k >= available {
					return None
				}

				left + k
			};

			positional.get(position).copied()
		} else {
			positional.get(index - (optional - available)).copied()
		}
	}
}

fn level_for(rt: &Runtime, val: Val) -> Level {
	match val {
		Val::Arr(arr) => Level::Seq(rt.get(arr).to_smallvec()),
		val => Level::Scalar(val)
	}
}

//-------------------------------------------------------------------------------------------------
// take_leading
//-------------------------------------------------------------------------------------------------

impl Runtime {
	/**
	Returns a new array holding the first `count` elements of `seq` (or all of them, when there
	are fewer).

	Fails with an `ArgumentError` when `count` is negative.
	*/
	pub fn take_leading(&mut self, seq: Gc<Arr>, count: i64) -> GResult<Gc<Arr>> {
		ensure!(count >= 0, ArgumentError, "negative array size");

		let elements = self.get(seq);
		let taken: Vec<Val> = elements.borrow().iter().take(count as usize).copied().collect();
		Ok(self.arr(taken))
	}
}
