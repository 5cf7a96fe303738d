//! A line-oriented desk calculator: floating-point arithmetic, persistent
//! variables, and user-defined `$`-functions whose bodies are stored as raw
//! text and re-tokenized on every call.
//!
//! There is no AST. The [`Lexer`] hands tokens to the [`Interpreter`] on
//! demand, and the interpreter's recursive-descent levels evaluate as they
//! parse. Calling a function swaps the interpreter's token source to the
//! stored body text and its active symbol table to the call's local table,
//! then restores both on the way out.

pub mod error;
pub mod eval;
pub mod lex;

pub use error::CalcError;
pub use eval::Interpreter;
pub use lex::{Lexer, Token};
