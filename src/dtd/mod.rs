//! Provide the DTD stages of the pipeline: scanner, processor, validator, and the
//! grammar they share.

mod datatype;
mod grammar;
mod processor;
mod scanner;
mod validator;

pub use datatype::*;
pub use grammar::*;
pub use processor::*;
pub use scanner::*;
pub use validator::*;
