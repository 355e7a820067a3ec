//! RSI — the R-Sharp intermediate representation and back end
//!
//! The crate covers the whole middle/back end pipeline:
//! - the linear three-address IR ([`ir`])
//! - IR generation from the typed AST ([`gen`])
//! - the pass runner and the legalization pass pipeline ([`pass`], [`passes`])
//! - liveness analysis ([`liveness`])
//! - graph-coloring register allocation ([`graph`], [`regalloc`])
//! - textual assembly emission for x86-64 (NASM) and AArch64 ([`emit`])

pub mod arch;
pub mod display;
pub mod emit;
pub mod gen;
pub mod graph;
pub mod ir;
pub mod liveness;
pub mod pass;
pub mod passes;
pub mod regalloc;

pub use arch::*;
pub use display::*;
pub use gen::*;
pub use ir::*;
pub use pass::*;
pub use passes::*;
