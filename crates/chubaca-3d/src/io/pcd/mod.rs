mod parser;
pub use parser::*;

mod writer;
pub use writer::*;
