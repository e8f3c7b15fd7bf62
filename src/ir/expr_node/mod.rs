// Query expression node model
//
// - node_types: the Expr enum, its payload structs and auxiliary structures
// - node_impl: accessors, construction helpers and Display/Debug

pub mod node_types;
pub mod node_impl;

pub use node_types::*;
