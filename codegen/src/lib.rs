//! Retargetable machine-code generation library.
//!
//! This crate compiles one function at a time from a typed SSA intermediate
//! representation down to machine code, relocation records and trap tables
//! for a selected target architecture. The main entry point is
//! [`Context::compile`](crate::Context::compile), given a target obtained
//! from [`isa::lookup`](crate::isa::lookup).

#![deny(missing_docs)]
#![warn(trivial_numeric_casts)]

pub use crate::context::Context;
pub use crate::result::{CodegenError, CodegenResult};

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[macro_use]
mod macros;

pub mod binemit;
pub mod cursor;
pub mod dominator_tree;
pub mod flowgraph;
pub mod ir;
pub mod isa;
pub mod legalizer;
pub mod loop_analysis;
pub mod machinst;
pub mod regalloc;
pub mod settings;
pub mod verifier;

mod constant_folding;
mod context;
mod dce;
mod fx;
mod result;
mod simple_gvn;

pub use anvil_entity as entity;
