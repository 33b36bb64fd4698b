/// Locating schema constructors in a source and building field descriptors.
pub mod extract;
pub(crate) mod lexer;
/// Schema and field types.
pub mod model;
pub(crate) mod parser;
