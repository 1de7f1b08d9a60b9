//! # ratcalc
//!
//! An interactive arbitrary-precision calculator. All real arithmetic
//! is exact rational arithmetic; nothing is ever a float. Transcendental
//! functions take an explicit error bound `eps` and return a rational
//! within `0.75 * eps` of the true value, so a display rounding on top
//! never shows a wrong digit:
//!
//! ```text
//! ; config("display", 19)
//! ; cos(1, 1e-20)
//! .5403023058681397174
//! ```
//!
//! The surface language is C-flavored: `if`/`while`/`for`/`switch`,
//! user functions via `define`, matrices with caller-chosen index
//! bounds, lists, associative arrays, strings, and user object types
//! with operator overloading (`obj point { x, y }` plus a function
//! named `point_add` makes `a + b` work on points). Source text
//! compiles to bytecode executed by a stack VM; errors are ordinary
//! values that flow through expressions and can be trapped with
//! `try`/`catch` or inspected with `iserr`/`errno`.
//!
//! The `Engine` owns every piece of evaluation state (symbols,
//! functions, configuration, caches, open files); embedding the
//! calculator is three lines:
//!
//! ```
//! use ratcalc::engine::Engine;
//! let mut eng = Engine::new();
//! let v = eng.eval_str("2 ** 67 - 1;").unwrap().unwrap();
//! assert_eq!(v, ratcalc::value::Value::from_q("147573952589676412927".parse().unwrap()));
//! ```

pub mod assoc;
pub mod builtin;
pub mod code;
pub mod compile;
pub mod config;
pub mod cplx;
pub mod display;
pub mod engine;
pub mod errors;
pub mod fileio;
pub mod list;
pub mod matrix;
pub mod object;
pub mod qmath;
pub mod randstate;
pub mod round;
pub mod transc;
pub mod value;
pub mod vm;
pub mod zmath;

pub use engine::Engine;
pub use errors::{CalcError, CalcResult};
pub use value::Value;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
