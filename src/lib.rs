//! `wasm-rulegen`: rule-guided WebAssembly module generation for
//! differential testing of Wasm engines.
//!
//! The crate is organized the way the teacher splits interpreter concerns:
//! [`rulegen_core`] carries the engine-agnostic value/instruction model and
//! is `no_std` + `alloc`; this crate adds file IO, rule loading, sampling
//! policy, and binary emission on top of it, and is `std`-only (§10.1).

extern crate alloc;

pub mod condition;
pub mod config;
pub mod emit;
pub mod error;
pub mod frame;
pub mod module;
pub mod rules;
pub mod sampler;
pub mod wrapper;

pub use condition::{Condition, ConditionExpr};
pub use config::{Config, ConfigBuilder};
pub use error::{ConfigError, Error, InternalInvariantError, Result, RuleLoadError};
pub use module::{Module, ModuleContext};
pub use rules::RuleStore;

pub use rulegen_core::{
    Arena, BlockType, Immediate, Index, Instruction, InstructionSignature, InstructionTable,
    MemArg, OperandKind, PrngSource, RandomnessSource, StreamSource, TargetType, ValueType,
    BLOCKED_OPCODES, NAN_PRODUCING_OPCODES,
};
