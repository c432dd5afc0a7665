pub use kiln_base::hashing::{HashMap, HashSet};
pub use kiln_schema::*;

mod error;
pub use error::*;

mod single_object;
pub use single_object::*;

mod object_format;
pub use object_format::*;

mod source_document;
pub use source_document::*;

#[cfg(test)]
mod tests;
