//! Module-level generation state (§4.4, C5).
//!
//! `ModuleContext` is the allocation authority a running [`crate::frame`]
//! generation consults whenever it needs a fresh global, a memory/table
//! parameter slot, or a deduplicated function type: the same role the
//! teacher's `ModuleBuilder` plays for a hand-assembled module, except here
//! every allocation is driven by `RandomnessSource` instead of a user's
//! builder calls.

use alloc::vec::Vec;

use rulegen_core::{Immediate, Instruction, RandomnessSource, ValueType};

use crate::config::Config;
use crate::frame::{Frame, FrameKind};
use crate::rules::RuleStore;
use crate::sampler::{perturb_float, perturb_int, sample_const_float, sample_const_int};

/// A function signature, deduplicated in `ModuleContext::types` the way
/// the teacher's `DedupArena` deduplicates `FuncType`s in its type section.
#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub rets: Vec<ValueType>,
}

/// One generated function: its signature, its locals beyond `args`, and the
/// frame holding its body.
#[derive(Debug, Clone)]
pub struct Function {
    pub args: Vec<ValueType>,
    pub locals: Vec<ValueType>,
    pub body: Frame,
    pub is_main: bool,
}

impl Function {
    /// Allocates a fresh local of type `ty`, returning its local index
    /// (`args ++ locals`, per §3's invariant on local index space).
    pub fn alloc_local(&mut self, ty: ValueType) -> u32 {
        let idx = self.args.len() + self.locals.len();
        self.locals.push(ty);
        idx as u32
    }

    pub fn local_type(&self, idx: u32) -> ValueType {
        let idx = idx as usize;
        if idx < self.args.len() {
            self.args[idx]
        } else {
            self.locals[idx - self.args.len()]
        }
    }
}

/// One module-level global: its type and the `InstrNode`-materialized
/// instruction sequence producing its initializer.
#[derive(Debug, Clone)]
pub struct Global {
    pub ty: ValueType,
    pub init: Vec<Instruction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemParam {
    pub ty: ValueType,
    pub byte_offset: u32,
    pub is_load: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableParam {
    pub ty: ValueType,
    pub table_index: u32,
    pub is_load: bool,
}

/// The fully generated module, ready for `crate::emit`.
#[derive(Debug, Clone)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub funcs: Vec<Function>,
    pub globals: Vec<Global>,
    pub memory_pages: u32,
    pub table_size: u32,
    pub mem_params: Vec<MemParam>,
    pub table_params: Vec<TableParam>,
}

/// Allocation services shared by every frame in the module being generated
/// (§4.4). Holds the module under construction plus the shared
/// `RuleStore`/`Config`; the `RandomnessSource` is threaded through
/// explicitly rather than stored, matching §5's single-threaded-state
/// policy.
pub struct ModuleContext<'a> {
    pub config: &'a Config,
    pub rules: &'a RuleStore,
    pub module: Module,
}

impl<'a> ModuleContext<'a> {
    pub fn new(config: &'a Config, rules: &'a RuleStore) -> Self {
        Self {
            config,
            rules,
            module: Module {
                types: Vec::new(),
                funcs: Vec::new(),
                globals: Vec::new(),
                memory_pages: config.memory_pages,
                table_size: config.table_size,
                mem_params: Vec::new(),
                table_params: Vec::new(),
            },
        }
    }

    /// Deduplicated append to the type table (§4.4); returns the type
    /// index for use as a `call_indirect`/blocktype immediate.
    pub fn alloc_type(&mut self, params: Vec<ValueType>, rets: Vec<ValueType>) -> u32 {
        let candidate = FuncType { params, rets };
        if let Some(idx) = self.module.types.iter().position(|t| *t == candidate) {
            return idx as u32;
        }
        self.module.types.push(candidate);
        (self.module.types.len() - 1) as u32
    }

    /// With probability `p_reuse_global`, reuse an existing global of type
    /// `ty`; otherwise allocate one with a random initializer. Returns the
    /// global index, the `global.set` instruction, and the `global.get`
    /// instruction (§4.4).
    pub fn alloc_global<R: RandomnessSource>(
        &mut self,
        ty: ValueType,
        rng: &mut R,
    ) -> (u32, Instruction, Instruction) {
        let existing: Vec<u32> = self
            .module
            .globals
            .iter()
            .enumerate()
            .filter(|(_, g)| g.ty == ty)
            .map(|(idx, _)| idx as u32)
            .collect();
        let idx = if !existing.is_empty() && rng.choice_prob(self.config.p_reuse_global) {
            *rng.choice_arr(&existing)
        } else {
            let init = self.initial_value_instrs(ty, rng);
            self.module.globals.push(Global { ty, init });
            (self.module.globals.len() - 1) as u32
        };
        (
            idx,
            Instruction::new("global.set", alloc::vec![Immediate::Index(idx)]),
            Instruction::new("global.get", alloc::vec![Immediate::Index(idx)]),
        )
    }

    fn initial_value_instrs<R: RandomnessSource>(&self, ty: ValueType, rng: &mut R) -> Vec<Instruction> {
        alloc::vec![const_instruction(ty, self.config, rng)]
    }

    /// Reserves a 16-byte slot in linear memory (§4.4), up to
    /// `Config::max_mem_params`. Returns the pre/post instruction sequences
    /// that wrap a load/store of `ty` at that offset with alignment 1.
    pub fn alloc_mem_param(&mut self, ty: ValueType, is_load: bool) -> (Vec<Instruction>, Vec<Instruction>) {
        let idx = self.module.mem_params.len() as u32;
        let byte_offset = (idx * 16).min((self.config.max_mem_params().saturating_sub(1)) * 16);
        self.module.mem_params.push(MemParam {
            ty,
            byte_offset,
            is_load,
        });
        let opcode = if is_load {
            alloc::format!("{ty}.load")
        } else {
            alloc::format!("{ty}.store")
        };
        let memarg = Immediate::MemArg(rulegen_core::MemArg {
            align: 0,
            offset: byte_offset,
        });
        (Vec::new(), alloc::vec![Instruction::new(opcode, alloc::vec![memarg])])
    }

    /// Reserves a table slot (§4.4). `funcref` round-trips through
    /// `table.get`/`table.set`; `externref` loads emit `ref.null extern`
    /// and stores emit `drop` since the table only ever holds funcrefs.
    pub fn alloc_table_param(&mut self, ty: ValueType, is_load: bool) -> Vec<Instruction> {
        let idx = self.module.table_params.len() as u32;
        let table_index = idx % self.module.table_size.max(1);
        self.module.table_params.push(TableParam {
            ty,
            table_index,
            is_load,
        });
        match (ty, is_load) {
            (ValueType::FuncRef, true) => alloc::vec![Instruction::new(
                "table.get",
                alloc::vec![Immediate::Index(table_index)]
            )],
            (ValueType::FuncRef, false) => alloc::vec![Instruction::new(
                "table.set",
                alloc::vec![Immediate::Index(table_index)]
            )],
            (_, true) => alloc::vec![Instruction::new(
                "ref.null",
                alloc::vec![Immediate::RefType(ValueType::ExternRef)]
            )],
            (_, false) => alloc::vec![Instruction::bare("drop")],
        }
    }

    /// Orchestrates §4.4's `generate()`: builds the root function, whose
    /// signature becomes the module's exported `main`.
    pub fn generate<R: RandomnessSource>(&mut self, rng: &mut R) {
        let func = self.generate_function(random_arg_signature(self.config, rng), rng);
        self.module.funcs.push(Function { is_main: true, ..func });
    }

    /// Generates one complete function with the given argument signature
    /// (§4.5's `function` frame kind), without registering it as `main`.
    /// Used both for the root function and for callees created on demand
    /// by the `call` structure extension (§4.5 step 1).
    pub fn generate_function<R: RandomnessSource>(&mut self, args: Vec<ValueType>, rng: &mut R) -> Function {
        let mut func = Function {
            args: args.clone(),
            locals: Vec::new(),
            body: Frame::new(FrameKind::Function),
            is_main: false,
        };
        let mut frame = Frame::new(FrameKind::Function);
        frame.init_fabricated(self.config, rng);
        frame.generate(self, &mut func, args, rng);
        func.body = frame;
        func
    }
}

/// Fabricates a small, non-reference-typed argument signature for `main`
/// (§4.5 `init`: funcref/externref are forbidden at the root).
fn random_arg_signature<R: RandomnessSource>(config: &Config, rng: &mut R) -> Vec<ValueType> {
    let mut args = Vec::new();
    loop {
        let choices: Vec<ValueType> = ValueType::ALL_NON_REF
            .into_iter()
            .filter(|ty| !config.is_blacklisted(*ty))
            .collect();
        if choices.is_empty() || !rng.choice_prob(config.p_multiret) {
            break;
        }
        args.push(*rng.choice_arr(&choices));
        if args.len() >= 4 {
            break;
        }
    }
    args
}

fn const_instruction<R: RandomnessSource>(ty: ValueType, config: &Config, rng: &mut R) -> Instruction {
    match ty {
        ValueType::I32 => {
            let raw = sample_const_int(rng, config, 32) as i64;
            let value = perturb_int(rng, config, raw, i32::MIN as i64, i32::MAX as i64) as i32;
            Instruction::new("i32.const", alloc::vec![Immediate::I32(value)])
        }
        ValueType::I64 => {
            let raw = sample_const_int(rng, config, 64) as i64;
            let value = perturb_int(rng, config, raw, i64::MIN, i64::MAX);
            Instruction::new("i64.const", alloc::vec![Immediate::I64(value)])
        }
        ValueType::F32 => {
            let raw = sample_const_float(rng, config, false) as f32 as f64;
            let value = perturb_float(rng, config, raw) as f32;
            Instruction::new("f32.const", alloc::vec![Immediate::F32Bits(value.to_bits())])
        }
        ValueType::F64 => {
            let raw = sample_const_float(rng, config, true);
            let value = perturb_float(rng, config, raw);
            Instruction::new("f64.const", alloc::vec![Immediate::F64Bits(value.to_bits())])
        }
        ValueType::V128 => Instruction::new("v128.const", alloc::vec![Immediate::V128Bits(0)]),
        ValueType::FuncRef => Instruction::new("ref.null", alloc::vec![Immediate::RefType(ValueType::FuncRef)]),
        ValueType::ExternRef => Instruction::new("ref.null", alloc::vec![Immediate::RefType(ValueType::ExternRef)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rulegen_core::{InstructionTable, PrngSource};

    #[test]
    fn alloc_type_deduplicates() {
        let config = Config::default();
        let table = InstructionTable::new();
        let rules = RuleStore::from_instruction_table(&table);
        let mut ctx = ModuleContext::new(&config, &rules);
        let a = ctx.alloc_type(alloc::vec![ValueType::I32], alloc::vec![ValueType::I32]);
        let b = ctx.alloc_type(alloc::vec![ValueType::I32], alloc::vec![ValueType::I32]);
        assert_eq!(a, b);
        assert_eq!(ctx.module.types.len(), 1);
    }

    #[test]
    fn alloc_mem_param_stays_within_budget() {
        let config = Config::default();
        let table = InstructionTable::new();
        let rules = RuleStore::from_instruction_table(&table);
        let mut ctx = ModuleContext::new(&config, &rules);
        let (_, post) = ctx.alloc_mem_param(ValueType::I32, true);
        assert_eq!(post.len(), 1);
        assert_eq!(ctx.module.mem_params.len(), 1);
    }

    #[test]
    fn generate_produces_one_main_function() {
        let config = Config::default();
        let table = InstructionTable::new();
        let rules = RuleStore::from_instruction_table(&table);
        let mut ctx = ModuleContext::new(&config, &rules);
        let mut rng = PrngSource::new(StdRng::seed_from_u64(0));
        ctx.generate(&mut rng);
        assert_eq!(ctx.module.funcs.len(), 1);
        assert!(ctx.module.funcs[0].is_main);
    }
}
