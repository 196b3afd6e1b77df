//! # Introduction
//!
//! cppstep compiles a subset of C++ into a tree of semantic constructs and
//! then executes that tree one observable step at a time against an explicit
//! stack/heap memory model.  It is built for teaching: every allocation,
//! lifetime transition, destructor call, and undefined-behavior event is
//! visible to whoever drives the simulation.
//!
//! ## Execution pipeline
//!
//! ```text
//! AST → Construct compilation → Program → Simulation → step events
//! ```
//!
//! 1. [`ast`] — the input AST, produced by an external parser (or built
//!    programmatically in tests).
//! 2. [`compiler`] — semantic analysis: name/entity resolution, standard
//!    conversions, overload resolution, initializer and deallocator
//!    selection.  Errors accumulate as notes on constructs; nothing throws.
//! 3. [`memory`] — the runtime memory model: stack frames, heap allocations
//!    with tombstones, temporary objects, and per-object lifetime tracking.
//! 4. [`runtime`] — the stepwise interpreter: an execution stack of runtime
//!    constructs driven by a two-phase `up_next`/`step_forward` loop.
//! 5. [`types`] — the C++ type model shared by all of the above.
//!
//! ## Supported C++ subset
//!
//! Types: `bool`, `char`, `int`, `double`, classes (single inheritance),
//! pointers, references, fixed-size arrays.
//! Constructs: the five initialization forms (default / value / direct /
//! copy / list), constructors and destructors, `new`/`delete`, `if`,
//! `while`, `for`, free functions with overloading.
//! Faults: use of indeterminate values, use-after-free, double free,
//! invalid delete, memory leaks — all reported as non-fatal simulation
//! events rather than as crashes.

pub mod ast;
pub mod compiler;
pub mod memory;
pub mod runtime;
pub mod types;
