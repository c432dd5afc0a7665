#[cfg(feature = "kiln-base")]
pub use kiln_base as base;

#[cfg(feature = "kiln-schema")]
pub use kiln_schema as schema;

#[cfg(feature = "kiln-data")]
pub use kiln_data as data;

#[cfg(feature = "kiln-pipeline")]
pub use kiln_pipeline as pipeline;

#[cfg(feature = "kiln-loader")]
pub use kiln_loader as loader;
