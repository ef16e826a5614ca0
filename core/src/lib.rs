#![cfg_attr(not(feature = "std"), no_std)]

//! Shared building blocks for `wasm-rulegen`.
//!
//! This crate holds the parts of the generator that have no dependency on
//! file IO, rule loading, or sampling policy: the Wasm value/instruction
//! model (§3 of the design), the static [`InstructionTable`], an index-based
//! [`arena::Arena`] allocator, and the [`rng::RandomnessSource`] trait with
//! its two implementations. Everything here is `no_std` + `alloc`
//! compatible, mirroring how the teacher crate splits its engine-agnostic
//! value types into `wasmi_core`.

extern crate alloc;

pub mod arena;
pub mod instr;
pub mod rng;
pub mod table;
pub mod value;

pub use arena::{Arena, Index};
pub use instr::{BlockType, Immediate, Instruction, MemArg, OperandKind};
pub use rng::{PrngSource, RandomnessSource, StreamSource};
pub use table::{InstructionSignature, InstructionTable, BLOCKED_OPCODES, NAN_PRODUCING_OPCODES};
pub use value::{TargetType, ValueType};
