pub use kiln_base::hashing::{HashMap, HashSet};

mod error;
pub use error::*;

mod value;
pub use value::Value;

mod record;
pub use record::*;

mod record_type_builder;
pub use record_type_builder::*;

mod schema_set;
pub use schema_set::*;

#[cfg(test)]
mod tests;
