//! The schema sublanguage: a bracket-and-arrow DSL compiled into a validator
//! for decoded JSON payloads.
//!
//! ```text
//! [ x > str ]
//! [ x > [ y > int ] name > str ]
//! ```

mod ast;
mod lexer;
mod parser;
mod tokens;
mod validate;

pub use ast::{Literal, Node};
pub use validate::{Schema, ValidationError};
