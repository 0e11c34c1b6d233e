use std::error::{Error};
use std::fmt::{self, Debug, Display, Formatter};
use super::engine::{Sym};

//-------------------------------------------------------------------------------------------------
// macros
//-------------------------------------------------------------------------------------------------

/**
Constructs a [`GError`](struct.GError.html) of the given kind, with a formatted message.

	let err = error!(TypeError, "no implicit conversion of {} into Integer", name);
*/

#[macro_export]
macro_rules! error {
	($kind:ident, $($arg:tt)+) => (
		$crate::GError::new($crate::ErrorKind::$kind, format!($($arg)+))
	);
}

/**
Returns early with a [`GError`](struct.GError.html) of the given kind.

	bail!(ArgumentError, "missing keyword: :{}", name)
*/

#[macro_export]
macro_rules! bail {
	($kind:ident, $($arg:tt)+) => (
		return Err($crate::error!($kind, $($arg)+))
	);
}

/**
Returns early with a [`GError`](struct.GError.html) of the given kind, unless the condition holds.

	ensure!(count >= 0, ArgumentError, "negative array size");
*/

#[macro_export]
macro_rules! ensure {
	($cond:expr, $kind:ident, $($arg:tt)+) => (
		if !$cond {
			$crate::bail!($kind, $($arg)+)
		}
	);
}

/**
Reports a broken invariant and aborts the process.

Fatal errors are never converted into a `GError`: there is nothing left to unwind into once the
object graph is known to be inconsistent, or once the heap can't grow any further.
*/

#[macro_export]
macro_rules! fatal {
	($($arg:tt)+) => ({
		let message = format!($($arg)+);
		$crate::tracing::error!(%message, "fatal runtime error");
		eprintln!("[FATAL] {}", message);
		::std::process::abort()
	});
}

//-------------------------------------------------------------------------------------------------
// ErrorKind
//-------------------------------------------------------------------------------------------------

/**
The kind of a language-level exception.

Each kind corresponds to a class in the core hierarchy; `Custom` names any other class, for
exceptions raised by collaborator code.
*/

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
	TypeError,
	NameError,
	NoMethodError,
	ArgumentError,
	SystemExit,
	SystemStackError,
	Custom(Sym)
}

impl ErrorKind {
	pub fn class_name(&self) -> String {
		match *self {
			ErrorKind::TypeError => "TypeError".to_string(),
			ErrorKind::NameError => "NameError".to_string(),
			ErrorKind::NoMethodError => "NoMethodError".to_string(),
			ErrorKind::ArgumentError => "ArgumentError".to_string(),
			ErrorKind::SystemExit => "SystemExit".to_string(),
			ErrorKind::SystemStackError => "SystemStackError".to_string(),
			ErrorKind::Custom(sym) => sym.name().to_string()
		}
	}
}

//-------------------------------------------------------------------------------------------------
// GError, GResult
//-------------------------------------------------------------------------------------------------

/**
The error type returned by every fallible runtime operation.

A `GError` models a language-level exception as it unwinds: its kind, its message, and the
backtrace it has accumulated so far. Frames are appended as the error propagates out of each
dispatched call, so `backtrace()[0]` is the innermost frame.
*/

#[derive(Clone)]
pub struct GError {
	kind: ErrorKind,
	message: String,
	backtrace: Vec<String>,

	//only meaningful for ErrorKind::SystemExit. None when the status wasn't an integer.
	status: Option<i64>
}

pub type GResult<T> = Result<T, GError>;

impl GError {
	pub fn new(kind: ErrorKind, message: String) -> GError {
		GError {
			kind,
			message,
			backtrace: Vec::new(),
			status: None
		}
	}

	///Constructs a `SystemExit` error carrying the given status.
	pub fn exit(status: Option<i64>) -> GError {
		GError {
			kind: ErrorKind::SystemExit,
			message: "exit".to_string(),
			backtrace: Vec::new(),
			status
		}
	}

	pub fn kind(&self) -> ErrorKind {
		self.kind
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn class_name(&self) -> String {
		self.kind.class_name()
	}

	///Innermost frame first.
	pub fn backtrace(&self) -> &[String] {
		&self.backtrace
	}

	pub fn is_exit(&self) -> bool {
		self.kind == ErrorKind::SystemExit
	}

	pub fn status(&self) -> Option<i64> {
		self.status
	}

	/**
	The process exit code for an uncaught error.

	`SystemExit` yields its status when it's an integer in the range `0..=255`, and `1` otherwise.
	Every other kind yields `1`.
	*/
	pub fn exit_code(&self) -> i32 {
		match (self.kind, self.status) {
			(ErrorKind::SystemExit, Some(status)) if (0 ..= 255).contains(&status) => status as i32,
			_ => 1
		}
	}

	pub(crate) fn push_frame(&mut self, frame: String) {
		self.backtrace.push(frame);
	}

	/**
	Renders the error the way an uncaught exception is reported at the top level.

		Traceback (most recent call last):
		        2: from in `A#outer'
		        1: from in `A#middle'
		in `A#inner': oops (RuntimeError)
	*/
	pub fn format_backtrace(&self) -> String {
		let mut output = String::new();

		if !self.backtrace.is_empty() {
			output.push_str("Traceback (most recent call last):\n");
			for i in (1 .. self.backtrace.len()).rev() {
				output.push_str(&format!("        {}: from {}\n", i, self.backtrace[i]));
			}
			output.push_str(&format!("{}: ", self.backtrace[0]));
		}

		output.push_str(&format!("{} ({})\n", self.message, self.class_name()));
		output
	}
}

impl Display for GError {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		write!(f, "{} ({})", self.message, self.class_name())
	}
}

impl Debug for GError {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("GError")
			.field("kind", &self.kind)
			.field("message", &self.message)
			.field("backtrace", &self.backtrace)
			.finish()
	}
}

impl Error for GError { }
