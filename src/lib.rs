pub mod aggregate;
pub mod base_nodes;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod export;
pub mod graph;
pub mod interactions;
pub mod interval_set;
pub mod io;
pub mod local_context;
pub mod loops;
pub mod merge;
pub mod node_attributes;
pub mod overlaps;
pub mod overlaps_two_pointer;
pub mod pipeline;
pub mod prepare;
pub mod reference;
pub mod ruomics_structs;
pub mod sorts;
pub mod stats;
pub mod vocab;

#[cfg(feature = "python")]
pub mod numpy_bindings;
