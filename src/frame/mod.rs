//! The recursive generation state machine (§4.5, C6).
//!
//! A [`Frame`] is the generation context for one function body or one
//! structured-control block. `generate` repeatedly either opens a nested
//! structure, appends an exit extension (`br`/`br_if`/`return`), or
//! extends the value stack by one more produced value, until a termination
//! draw succeeds or the structural recursion limit is hit; `close`
//! reconciles whatever stack shape generation stopped at with the frame's
//! declared `params`.
//!
//! One simplification versus the full state machine, preserving
//! well-typedness: rule instantiation always allocates a fresh local for
//! every rule parameter rather than eliding `local.set`/`local.get` pairs
//! for single-use arguments (no observable behavior difference, slightly
//! larger bodies).

use alloc::vec::Vec;

use rulegen_core::{Immediate, Instruction, OperandKind, RandomnessSource, TargetType, ValueType, NAN_PRODUCING_OPCODES};

use crate::config::Config;
use crate::module::{Function, ModuleContext};
use crate::rules::extract::BodyNode;
use crate::sampler::{perturb_float, perturb_int, sample_const_float, sample_const_int, OperandResolver};

/// Which of the five structural roles (§9) a frame plays. Behavior
/// differences collapse to a small match rather than a subclass per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

/// One production in a frame's body: the stack shape immediately before
/// it, and the instructions it contributed. Frames accumulate these in
/// execution order as generation proceeds; `close`'s discard/pad
/// reconciliation records are appended last, matching when they run.
#[derive(Debug, Clone)]
pub struct Record {
    pub pre_stack: Vec<ValueType>,
    pub instrs: Vec<Instruction>,
}

/// The label an ancestor frame exposes to `br`/`br_if`/`return` inside a
/// nested frame: its branch-target stack shape and whether it's a `loop`
/// (whose params are fixed on entry rather than at close).
#[derive(Debug, Clone)]
struct AncestorLabel {
    stack_goal: Vec<ValueType>,
    is_loop: bool,
}

/// Generation context for one function body or control-flow block (§3's
/// Frame, §4.5's FrameContext).
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    pub params: Vec<ValueType>,
    pub rets: Vec<ValueType>,
    pub stack: Vec<ValueType>,
    pub records: Vec<Record>,
}

impl Frame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            params: Vec::new(),
            rets: Vec::new(),
            stack: Vec::new(),
            records: Vec::new(),
        }
    }

    /// `init` for a root function with no externally supplied return
    /// target: fabricates a random non-empty-or-empty return signature,
    /// drawing one more element with probability `p_multiret` per step
    /// (§4.5 `init`). funcref/externref are excluded at the root.
    pub fn init_fabricated<R: RandomnessSource>(&mut self, config: &Config, rng: &mut R) {
        let mut rets = Vec::new();
        loop {
            let choices: Vec<ValueType> = ValueType::ALL_NON_REF
                .into_iter()
                .filter(|ty| !config.is_blacklisted(*ty))
                .collect();
            if choices.is_empty() {
                break;
            }
            if !rets.is_empty() && !rng.choice_prob(config.p_multiret) {
                break;
            }
            rets.push(*rng.choice_arr(&choices));
            if rng.choice_prob(0.3) {
                break;
            }
        }
        self.rets = rets.clone();
        self.stack = rets;
    }

    /// `init` for a nested frame opened with an explicit popped-suffix
    /// stack (§4.5 step 1): no fabrication, `rets = stack = first_stack`.
    pub fn init_with(&mut self, first_stack: Vec<ValueType>) {
        self.rets = first_stack.clone();
        self.stack = first_stack;
    }

    /// The branch target stack shape for this frame (§8 `get_stack_goal`):
    /// `params` for a `loop` (the back-edge target is the head), `rets`
    /// for everything else.
    pub fn stack_goal(&self) -> &[ValueType] {
        match self.kind {
            FrameKind::Loop => &self.params,
            _ => &self.rets,
        }
    }

    /// Entry point for a function body (the only frame kind `generate` is
    /// called on directly; block/loop/if children run `generate_inner` +
    /// `close` from their parent's `open_*` instead). `args` fixes
    /// `params` to the function's own parameter locals, since a function
    /// frame has no incoming stack unlike a block, and generation closes
    /// against `rets`, already fixed by `init_fabricated`/`init_with`.
    pub fn generate<R: RandomnessSource>(
        &mut self,
        ctx: &mut ModuleContext,
        func: &mut Function,
        args: Vec<ValueType>,
        rng: &mut R,
    ) {
        self.params = args;
        let mut ancestors = Vec::new();
        self.generate_inner(ctx, func, &mut ancestors, 0, rng);
        let target = self.rets.clone();
        self.close(ctx, func, target, rng);
    }

    fn generate_inner<R: RandomnessSource>(
        &mut self,
        ctx: &mut ModuleContext,
        func: &mut Function,
        ancestors: &mut Vec<AncestorLabel>,
        depth: u32,
        rng: &mut R,
    ) {
        loop {
            if rng.choice_prob(1.0 - ctx.config.p_struct_exit) {
                break;
            }
            if depth < ctx.config.max_depth && rng.choice_prob(ctx.config.p_struct_gen) {
                self.open_structure(ctx, func, ancestors, depth, rng);
                continue;
            }
            if !ancestors.is_empty() && rng.choice_prob(ctx.config.p_br_if) {
                self.emit_br_if(ancestors, rng);
                continue;
            }
            if !ancestors.is_empty() && rng.choice_prob(ctx.config.p_br_table) {
                self.emit_br_table(ctx.config, ancestors, rng);
                continue;
            }
            if rng.choice_prob(ctx.config.p_br) {
                self.emit_br_or_return(ancestors, rng);
                if self.kind != FrameKind::Function || !ancestors.is_empty() {
                    continue;
                }
            }
            self.extend_stack(ctx, func, rng);
        }
    }

    /// §4.5 step 1: opens `block`/`loop`/`if`, `unreachable`, or `call`.
    fn open_structure<R: RandomnessSource>(
        &mut self,
        ctx: &mut ModuleContext,
        func: &mut Function,
        ancestors: &mut Vec<AncestorLabel>,
        depth: u32,
        rng: &mut R,
    ) {
        #[derive(Clone, Copy)]
        enum Choice {
            Block,
            Loop,
            If,
            Call,
            Unreachable,
        }
        let mut options = alloc::vec![Choice::Block, Choice::Loop];
        if !self.stack.is_empty() || rng.choice_prob(0.5) {
            options.push(Choice::If);
        }
        if rng.choice_prob(ctx.config.p_call) {
            options.push(Choice::Call);
        }
        if rng.choice_prob(ctx.config.p_unreachable) {
            options.push(Choice::Unreachable);
        }
        match *rng.choice_arr(&options) {
            Choice::Block => self.open_block_like(ctx, func, ancestors, depth, FrameKind::Block, rng),
            Choice::Loop => self.open_block_like(ctx, func, ancestors, depth, FrameKind::Loop, rng),
            Choice::If => self.open_if(ctx, func, ancestors, depth, rng),
            Choice::Call => self.open_call(ctx, func, rng),
            Choice::Unreachable => self.emit_unreachable(rng),
        }
    }

    fn pop_suffix<R: RandomnessSource>(&mut self, config: &Config, rng: &mut R) -> Vec<ValueType> {
        let mut popped = Vec::new();
        while let Some(top) = self.stack.last().copied() {
            if !rng.choice_prob(config.p_struct_ret) {
                break;
            }
            popped.push(top);
            self.stack.pop();
        }
        popped.reverse();
        popped
    }

    fn open_block_like<R: RandomnessSource>(
        &mut self,
        ctx: &mut ModuleContext,
        func: &mut Function,
        ancestors: &mut Vec<AncestorLabel>,
        depth: u32,
        kind: FrameKind,
        rng: &mut R,
    ) {
        let popped = self.pop_suffix(ctx.config, rng);
        let mut child = Frame::new(kind);
        child.init_with(popped.clone());
        if kind == FrameKind::Loop {
            child.params = popped.clone();
        }
        ancestors.push(AncestorLabel {
            stack_goal: child.stack_goal().to_vec(),
            is_loop: kind == FrameKind::Loop,
        });
        child.generate_inner(ctx, func, ancestors, depth + 1, rng);
        child.close(ctx, func, popped.clone(), rng);
        ancestors.pop();

        let block_type = ctx.alloc_type(child.params.clone(), child.rets.clone());
        let opener = if kind == FrameKind::Loop { "loop" } else { "block" };
        self.append_structured(opener, block_type, child, popped);
    }

    fn open_if<R: RandomnessSource>(
        &mut self,
        ctx: &mut ModuleContext,
        func: &mut Function,
        ancestors: &mut Vec<AncestorLabel>,
        depth: u32,
        rng: &mut R,
    ) {
        let popped = self.pop_suffix(ctx.config, rng);
        let mut then_frame = Frame::new(FrameKind::If);
        then_frame.init_with(popped.clone());
        ancestors.push(AncestorLabel {
            stack_goal: then_frame.stack_goal().to_vec(),
            is_loop: false,
        });
        then_frame.generate_inner(ctx, func, ancestors, depth + 1, rng);
        then_frame.close(ctx, func, popped.clone(), rng);
        ancestors.pop();

        let non_trivial = !then_frame.rets.is_empty();
        let else_frame = if non_trivial || !rng.choice_prob(ctx.config.p_skip_else) {
            let mut else_frame = Frame::new(FrameKind::Else);
            else_frame.init_with(popped.clone());
            ancestors.push(AncestorLabel {
                stack_goal: else_frame.stack_goal().to_vec(),
                is_loop: false,
            });
            else_frame.generate_inner(ctx, func, ancestors, depth + 1, rng);
            else_frame.close(ctx, func, then_frame.rets.clone(), rng);
            ancestors.pop();
            Some(else_frame)
        } else {
            None
        };

        let block_type = ctx.alloc_type(then_frame.params.clone(), then_frame.rets.clone());
        self.stack.push(ValueType::I32);
        let discriminant = const_i32(rng, ctx.config);
        let pre_stack = self.stack.clone();
        self.stack.pop();
        for ty in &popped {
            self.stack.push(*ty);
        }
        let then_instrs = flatten(&then_frame);
        let mut instrs = alloc::vec![discriminant];
        instrs.push(Instruction::new("if", alloc::vec![blocktype_immediate(&then_frame.params, &then_frame.rets, block_type)]));
        instrs.extend(then_instrs);
        if let Some(else_frame) = &else_frame {
            instrs.push(Instruction::bare("else"));
            instrs.extend(flatten(else_frame));
        }
        instrs.push(Instruction::bare("end"));
        for ty in &then_frame.rets {
            self.stack.push(*ty);
        }
        self.records.push(Record { pre_stack, instrs });
    }

    fn append_structured(&mut self, opener: &str, block_type: u32, child: Frame, popped: Vec<ValueType>) {
        let pre_stack = self.stack.clone();
        for ty in &popped {
            debug_assert_eq!(self.stack.pop(), Some(*ty));
        }
        let mut instrs = alloc::vec![Instruction::new(
            opener,
            alloc::vec![blocktype_immediate(&child.params, &child.rets, block_type)]
        )];
        instrs.extend(flatten(&child));
        instrs.push(Instruction::bare("end"));
        for ty in &child.rets {
            self.stack.push(*ty);
        }
        self.records.push(Record { pre_stack, instrs });
    }

    fn open_call<R: RandomnessSource>(&mut self, ctx: &mut ModuleContext, func: &mut Function, rng: &mut R) {
        let want_rets: Vec<ValueType> = self.stack.last().copied().into_iter().collect();
        let reusable: Vec<usize> = ctx
            .module
            .funcs
            .iter()
            .enumerate()
            .filter(|(_, f)| func_rets(f) == want_rets)
            .map(|(idx, _)| idx)
            .collect();

        let (func_idx, params, rets) = if !reusable.is_empty() && rng.choice_prob(ctx.config.p_reuse_func) {
            let idx = *rng.choice_arr(&reusable);
            let callee = &ctx.module.funcs[idx];
            (idx as u32, callee.args.clone(), func_rets(callee))
        } else {
            let args = random_small_signature(ctx.config, rng);
            let callee = ctx.generate_function(args.clone(), rng);
            let rets = func_rets(&callee);
            ctx.module.funcs.push(callee);
            ((ctx.module.funcs.len() - 1) as u32, args, rets)
        };

        let pre_stack = self.stack.clone();
        let mut instrs = Vec::new();
        for ty in &params {
            instrs.push(gen_argconst_instr(*ty, ctx, rng));
            self.stack.push(*ty);
        }
        for _ in &params {
            self.stack.pop();
        }
        if rng.choice_prob(ctx.config.p_call_indirect) {
            let table_instrs = ctx.alloc_table_param(ValueType::FuncRef, false);
            instrs.push(Instruction::new("ref.func", alloc::vec![Immediate::Index(func_idx)]));
            instrs.extend(table_instrs);
            let idx_const = const_i32(rng, ctx.config);
            instrs.push(idx_const);
            let type_idx = ctx.alloc_type(params, rets.clone());
            instrs.push(Instruction::new(
                "call_indirect",
                alloc::vec![Immediate::Index(type_idx), Immediate::Index(0)],
            ));
        } else {
            instrs.push(Instruction::new("call", alloc::vec![Immediate::Index(func_idx)]));
        }
        for ty in &rets {
            self.stack.push(*ty);
        }
        let _ = func;
        self.records.push(Record { pre_stack, instrs });
    }

    fn emit_unreachable<R: RandomnessSource>(&mut self, rng: &mut R) {
        let _ = rng;
        let pre_stack = self.stack.clone();
        self.records.push(Record {
            pre_stack,
            instrs: alloc::vec![Instruction::bare("unreachable")],
        });
        self.stack.clear();
    }

    fn emit_br_if<R: RandomnessSource>(&mut self, ancestors: &[AncestorLabel], rng: &mut R) {
        let Some(label) = matching_label(ancestors, &self.stack) else {
            return;
        };
        if self.stack.is_empty() {
            return;
        }
        self.stack.push(ValueType::I32);
        let pre_stack = self.stack.clone();
        self.stack.pop();
        let _ = rng;
        self.records.push(Record {
            pre_stack,
            instrs: alloc::vec![const_i32_always_nonzero(), Instruction::new(
                "br_if",
                alloc::vec![Immediate::Index(label as u32)]
            )],
        });
    }

    /// §4.5 step 2's `br_table`: picks a default label the way `br`/`br_if`
    /// do (`matching_label`), then independently offers every ancestor
    /// whose goal also matches (or is a loop back-edge) as an alternative,
    /// so the table can carry more than one real target.
    fn emit_br_table<R: RandomnessSource>(&mut self, config: &Config, ancestors: &[AncestorLabel], rng: &mut R) {
        let Some(default_label) = matching_label(ancestors, &self.stack) else {
            return;
        };
        let depth = ancestors.len();
        let mut labels = Vec::new();
        for (i, label) in ancestors.iter().enumerate() {
            let goal_matches = label.stack_goal.len() <= self.stack.len()
                && self.stack[self.stack.len() - label.stack_goal.len()..] == label.stack_goal[..];
            if (goal_matches || label.is_loop) && rng.choice_prob(0.5) {
                labels.push((depth - 1 - i) as u32);
            }
        }
        self.stack.push(ValueType::I32);
        let pre_stack = self.stack.clone();
        self.stack.pop();
        self.records.push(Record {
            pre_stack,
            instrs: alloc::vec![
                const_i32(rng, config),
                Instruction::new(
                    "br_table",
                    alloc::vec![Immediate::Indices(labels), Immediate::Index(default_label as u32)],
                ),
            ],
        });
    }

    fn emit_br_or_return<R: RandomnessSource>(&mut self, ancestors: &[AncestorLabel], rng: &mut R) {
        let pre_stack = self.stack.clone();
        if ancestors.is_empty() || rng.choice_prob(0.3) {
            self.records.push(Record {
                pre_stack,
                instrs: alloc::vec![Instruction::bare("return")],
            });
            return;
        }
        if let Some(label) = matching_label(ancestors, &self.stack) {
            self.records.push(Record {
                pre_stack,
                instrs: alloc::vec![Instruction::new("br", alloc::vec![Immediate::Index(label as u32)])],
            });
        }
    }

    /// §4.5 step 3: extend the stack by one value, either by instantiating
    /// a rule for a chosen target type, reading/writing a local or global
    /// (`gen_var`), or materializing a function argument / typed constant
    /// (`gen_argconst`).
    fn extend_stack<R: RandomnessSource>(&mut self, ctx: &mut ModuleContext, func: &mut Function, rng: &mut R) {
        let target = self.choose_target_type(ctx.config, rng);

        let branch = rng.choice_prob(ctx.config.p_argconst + ctx.config.p_var_gen);
        if !branch {
            self.instantiate_rule(ctx, func, target, rng);
            return;
        }
        if rng.choice_prob(ctx.config.p_argconst / (ctx.config.p_argconst + ctx.config.p_var_gen).max(1e-9)) {
            self.gen_argconst(ctx, target, rng);
        } else {
            self.gen_var(ctx, func, target, rng);
        }
    }

    fn choose_target_type<R: RandomnessSource>(&mut self, config: &Config, rng: &mut R) -> TargetType {
        if !self.stack.is_empty() && rng.choice_prob(config.p_stack_pop) {
            return TargetType::Value(self.stack[self.stack.len() - 1]);
        }
        let choices: Vec<ValueType> = ValueType::ALL.into_iter().filter(|ty| !config.is_blacklisted(*ty)).collect();
        if choices.is_empty() || rng.choice_prob(0.2) {
            return TargetType::NoOut;
        }
        TargetType::Value(*rng.choice_arr(&choices))
    }

    /// §4.5 step 2: instantiates a rule for `target`. Each rule parameter
    /// is materialized into its own fresh local with `gen_argconst_instr`
    /// rather than popped from the running stack, trading away stack-value
    /// reuse for a generation scheme with no stack-matching edge cases.
    fn instantiate_rule<R: RandomnessSource>(
        &mut self,
        ctx: &mut ModuleContext,
        func: &mut Function,
        target: TargetType,
        rng: &mut R,
    ) {
        let Some(rule) = ctx.rules.get_rule(target, ctx.config.p_use_typing, rng).cloned() else {
            self.gen_argconst(ctx, target, rng);
            return;
        };

        let pre_stack = self.stack.clone();
        let mut instrs = Vec::new();

        let mut arg_locals = Vec::new();
        for param_ty in &rule.param_types {
            let local_idx = func.alloc_local(*param_ty);
            instrs.push(gen_argconst_instr(*param_ty, ctx, rng));
            instrs.push(Instruction::new("local.set", alloc::vec![Immediate::Index(local_idx)]));
            arg_locals.push(local_idx);
        }

        let mut resolver = OperandResolver::new(&rule.conds);
        for node in &rule.body {
            match node {
                BodyNode::Arg(idx) => {
                    let local_idx = *arg_locals.get(*idx as usize).unwrap_or(&0);
                    instrs.push(Instruction::new("local.get", alloc::vec![Immediate::Index(local_idx)]));
                }
                BodyNode::Op { opcode, opargs } => {
                    let kinds = ctx.rules.immediate_kinds(opcode);
                    let align_candidates = ctx.rules.align_candidates(opcode);
                    let mut immediates = Vec::new();
                    for (slot_idx, slot) in opargs.iter().enumerate() {
                        let immediate = match kinds.and_then(|ks| ks.get(slot_idx)).copied() {
                            Some(kind) => {
                                let value = resolver.sample_bounded(rng, oparg_bitwidth(kind), *slot);
                                materialize_oparg(kind, value, align_candidates, rng)
                            }
                            None => {
                                let bitwidth = operand_bitwidth(opcode);
                                let value = resolver.sample_bounded(rng, bitwidth, *slot);
                                legacy_materialize_immediate(opcode, bitwidth, value)
                            }
                        };
                        immediates.push(immediate);
                    }
                    instrs.push(Instruction::new(opcode.clone(), immediates));
                }
            }
        }

        let terminal_is_nan_producing = rule
            .terminal_opcode()
            .map(|op| NAN_PRODUCING_OPCODES.contains(&op))
            .unwrap_or(false);
        if terminal_is_nan_producing && ctx.config.canonicalize_nans {
            if let Some(ret_ty) = rule.ret_types.first().copied() {
                instrs.extend(canonicalization_gadget(func, ret_ty));
            }
        }

        for ret_ty in &rule.ret_types {
            self.stack.push(*ret_ty);
        }
        self.records.push(Record { pre_stack, instrs });
    }

    fn gen_argconst<R: RandomnessSource>(&mut self, ctx: &mut ModuleContext, target: TargetType, rng: &mut R) {
        let TargetType::Value(ty) = target else {
            return;
        };
        let pre_stack = self.stack.clone();
        let instr = gen_argconst_instr(ty, ctx, rng);
        self.stack.push(ty);
        self.records.push(Record {
            pre_stack,
            instrs: alloc::vec![instr],
        });
    }

    fn gen_var<R: RandomnessSource>(&mut self, ctx: &mut ModuleContext, func: &mut Function, target: TargetType, rng: &mut R) {
        let TargetType::Value(ty) = target else {
            return;
        };
        let pre_stack = self.stack.clone();
        let instr = if rng.choice_prob(ctx.config.p_reuse_global) {
            let (_, _, get) = ctx.alloc_global(ty, rng);
            get
        } else {
            let existing: Vec<u32> = (0..func.args.len() + func.locals.len())
                .map(|i| i as u32)
                .filter(|&i| func.local_type(i) == ty)
                .collect();
            let local_idx = if !existing.is_empty() {
                *rng.choice_arr(&existing)
            } else {
                func.alloc_local(ty)
            };
            Instruction::new("local.get", alloc::vec![Immediate::Index(local_idx)])
        };
        self.stack.push(ty);
        self.records.push(Record {
            pre_stack,
            instrs: alloc::vec![instr],
        });
    }

    /// §4.5 "Close & reconciliation": forces `stack` to match `target`,
    /// materializing missing values with `gen_argconst` and discarding
    /// excess ones as staged locals.
    fn close<R: RandomnessSource>(&mut self, ctx: &mut ModuleContext, func: &mut Function, target: Vec<ValueType>, rng: &mut R) {
        let common_prefix = self
            .stack
            .iter()
            .zip(target.iter())
            .take_while(|(a, b)| a == b)
            .count();
        while self.stack.len() > common_prefix {
            let popped = self.stack.pop().unwrap();
            let pre_stack = {
                let mut s = self.stack.clone();
                s.push(popped);
                s
            };
            let local_idx = func.alloc_local(popped);
            self.records.push(Record {
                pre_stack,
                instrs: alloc::vec![Instruction::new("local.set", alloc::vec![Immediate::Index(local_idx)])],
            });
        }
        while self.stack.len() < target.len() {
            let ty = target[self.stack.len()];
            self.gen_argconst(ctx, TargetType::Value(ty), rng);
        }
        self.rets = target.clone();
        if matches!(self.kind, FrameKind::Block | FrameKind::If | FrameKind::Else) {
            self.params = target;
        }
    }
}

fn matching_label(ancestors: &[AncestorLabel], stack: &[ValueType]) -> Option<usize> {
    let depth = ancestors.len();
    for (i, label) in ancestors.iter().enumerate().rev() {
        let goal_matches = label.stack_goal.len() <= stack.len()
            && stack[stack.len() - label.stack_goal.len()..] == label.stack_goal[..];
        if goal_matches || label.is_loop {
            return Some(depth - 1 - i);
        }
    }
    None
}

fn func_rets(func: &Function) -> Vec<ValueType> {
    func.body.rets.clone()
}

fn flatten(frame: &Frame) -> Vec<Instruction> {
    frame.records.iter().flat_map(|r| r.instrs.clone()).collect()
}

fn blocktype_immediate(params: &[ValueType], rets: &[ValueType], type_idx: u32) -> Immediate {
    if params.is_empty() && rets.is_empty() {
        Immediate::BlockType(rulegen_core::BlockType::Empty)
    } else if params.is_empty() && rets.len() == 1 {
        Immediate::BlockType(rulegen_core::BlockType::Value(rets[0]))
    } else {
        Immediate::BlockType(rulegen_core::BlockType::FuncType(type_idx))
    }
}

fn random_small_signature<R: RandomnessSource>(config: &Config, rng: &mut R) -> Vec<ValueType> {
    let mut args = Vec::new();
    let choices: Vec<ValueType> = ValueType::ALL_NON_REF.into_iter().filter(|ty| !config.is_blacklisted(*ty)).collect();
    if choices.is_empty() {
        return args;
    }
    while args.len() < 3 && rng.choice_prob(0.4) {
        args.push(*rng.choice_arr(&choices));
    }
    args
}

/// §4.5 step 5: literal immediates (not sampled against an operand
/// condition set) get a perturbation pass. `const_i32_always_nonzero`
/// is exempt: it backs `br_if`'s discriminant, and nudging it could
/// produce a zero that breaks the always-taken invariant callers rely on.
fn gen_argconst_instr<R: RandomnessSource>(ty: ValueType, ctx: &mut ModuleContext, rng: &mut R) -> Instruction {
    match ty {
        ValueType::I32 => {
            let raw = sample_const_int(rng, ctx.config, 32) as i64;
            let value = perturb_int(rng, ctx.config, raw, i32::MIN as i64, i32::MAX as i64) as i32;
            Instruction::new("i32.const", alloc::vec![Immediate::I32(value)])
        }
        ValueType::I64 => {
            let raw = sample_const_int(rng, ctx.config, 64) as i64;
            let value = perturb_int(rng, ctx.config, raw, i64::MIN, i64::MAX);
            Instruction::new("i64.const", alloc::vec![Immediate::I64(value)])
        }
        ValueType::F32 => {
            let raw = sample_const_float(rng, ctx.config, false) as f32 as f64;
            let value = perturb_float(rng, ctx.config, raw) as f32;
            Instruction::new("f32.const", alloc::vec![Immediate::F32Bits(value.to_bits())])
        }
        ValueType::F64 => {
            let raw = sample_const_float(rng, ctx.config, true);
            let value = perturb_float(rng, ctx.config, raw);
            Instruction::new("f64.const", alloc::vec![Immediate::F64Bits(value.to_bits())])
        }
        ValueType::V128 => Instruction::new("v128.const", alloc::vec![Immediate::V128Bits(0)]),
        ValueType::FuncRef => Instruction::new("ref.null", alloc::vec![Immediate::RefType(ValueType::FuncRef)]),
        ValueType::ExternRef => Instruction::new("ref.null", alloc::vec![Immediate::RefType(ValueType::ExternRef)]),
    }
}

fn const_i32<R: RandomnessSource>(rng: &mut R, config: &Config) -> Instruction {
    let raw = sample_const_int(rng, config, 32) as i64;
    let value = perturb_int(rng, config, raw, i32::MIN as i64, i32::MAX as i64) as i32;
    Instruction::new("i32.const", alloc::vec![Immediate::I32(value)])
}

fn const_i32_always_nonzero() -> Instruction {
    Instruction::new("i32.const", alloc::vec![Immediate::I32(1)])
}

/// Sampling bitwidth for an oparg slot whose `OperandKind` is known:
/// lane indices are single bytes, `MemArg`'s offset half and plain
/// indices are 32-bit, wide types are 64 or 128.
fn oparg_bitwidth(kind: OperandKind) -> u32 {
    match kind {
        OperandKind::I64 | OperandKind::F64 => 64,
        OperandKind::LaneIdx16 | OperandKind::Byte16 => 128,
        OperandKind::LaneIdx => 8,
        OperandKind::I32
        | OperandKind::F32
        | OperandKind::MemArg
        | OperandKind::TableIdx
        | OperandKind::FuncIdx
        | OperandKind::TypeIdx
        | OperandKind::LabelIdx
        | OperandKind::RefType
        | OperandKind::BlockType => 32,
    }
}

/// Materializes a sampled oparg value as the `Immediate` variant its
/// declared `OperandKind` demands (review: `memarg` needs `align,offset`,
/// not a bare LEB; lane/table/func indices need their own variants).
fn materialize_oparg<R: RandomnessSource>(
    kind: OperandKind,
    value: i128,
    align_candidates: Option<&[u32]>,
    rng: &mut R,
) -> Immediate {
    match kind {
        OperandKind::I32 => Immediate::I32(value as i32),
        OperandKind::I64 => Immediate::I64(value as i64),
        OperandKind::F32 => Immediate::F32Bits(value as u32),
        OperandKind::F64 => Immediate::F64Bits(value as u64),
        OperandKind::MemArg => {
            let align = align_candidates
                .filter(|candidates| !candidates.is_empty())
                .map(|candidates| *rng.choice_arr(candidates))
                .unwrap_or(0);
            Immediate::MemArg(rulegen_core::MemArg { align, offset: value as u32 })
        }
        OperandKind::TableIdx | OperandKind::FuncIdx | OperandKind::TypeIdx | OperandKind::LabelIdx => {
            Immediate::Index(value as u32)
        }
        OperandKind::LaneIdx => Immediate::LaneIdx(value as u8),
        OperandKind::LaneIdx16 | OperandKind::Byte16 => {
            Immediate::LaneIdx16(value.to_le_bytes()[..16].try_into().unwrap())
        }
        OperandKind::RefType => Immediate::RefType(ValueType::FuncRef),
        OperandKind::BlockType => Immediate::BlockType(rulegen_core::BlockType::Empty),
    }
}

fn operand_bitwidth(opcode: &str) -> u32 {
    if opcode.starts_with("i64") || opcode.starts_with("f64") {
        64
    } else if opcode.contains("v128") || opcode.contains('x') {
        128
    } else {
        32
    }
}

/// Fallback for opcodes the rule store didn't catalogue an
/// `OperandKind` schema for (corpus-extracted rules predating the
/// schema, or any opcode `from_instruction_table` never saw).
fn legacy_materialize_immediate(opcode: &str, bitwidth: u32, value: i128) -> Immediate {
    if opcode.ends_with(".shuffle") {
        return Immediate::LaneIdx16(value.to_le_bytes()[..16].try_into().unwrap());
    }
    match bitwidth {
        128 => Immediate::V128Bits(value as u128),
        64 => Immediate::I64(value as i64),
        _ => Immediate::I32(value as i32),
    }
}

/// §4.5 step 6: the float-NaN canonicalization gadget.
fn canonicalization_gadget(func: &mut Function, ty: ValueType) -> Vec<Instruction> {
    let local_idx = func.alloc_local(ty);
    let (const_instr, eq_opcode, select_opcode) = match ty {
        ValueType::F32 => (
            Instruction::new("f32.const", alloc::vec![Immediate::F32Bits(0x7fc0_0000)]),
            "f32.eq",
            "select",
        ),
        ValueType::F64 => (
            Instruction::new("f64.const", alloc::vec![Immediate::F64Bits(0x7ff8_0000_0000_0000)]),
            "f64.eq",
            "select",
        ),
        ValueType::V128 => (
            Instruction::new("v128.const", alloc::vec![Immediate::V128Bits(0x7fc0_0000_7fc0_0000_7fc0_0000_7fc0_0000)]),
            "f32x4.eq",
            "v128.bitselect",
        ),
        _ => return Vec::new(),
    };
    alloc::vec![
        Instruction::new("local.tee", alloc::vec![Immediate::Index(local_idx)]),
        const_instr,
        Instruction::new("local.get", alloc::vec![Immediate::Index(local_idx)]),
        Instruction::new("local.get", alloc::vec![Immediate::Index(local_idx)]),
        Instruction::bare(eq_opcode),
        Instruction::bare(select_opcode),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleStore;
    use rand::{rngs::StdRng, SeedableRng};
    use rulegen_core::{InstructionTable, PrngSource};

    fn test_ctx<'a>(config: &'a Config, rules: &'a RuleStore) -> ModuleContext<'a> {
        ModuleContext::new(config, rules)
    }

    #[test]
    fn generated_function_body_closes_onto_its_return_signature() {
        let mut config = Config::default();
        config.max_depth = 2;
        let table = InstructionTable::new();
        let rules = RuleStore::from_instruction_table(&table);
        let mut ctx = test_ctx(&config, &rules);
        let mut rng = PrngSource::new(StdRng::seed_from_u64(99));
        ctx.generate(&mut rng);
        let func = &ctx.module.funcs[0];
        assert_eq!(func.body.stack, func.body.rets);
        assert_eq!(func.body.params, func.args);
    }

    #[test]
    fn canonicalization_gadget_has_six_instructions_for_f32() {
        let mut func = Function {
            args: Vec::new(),
            locals: Vec::new(),
            body: Frame::new(FrameKind::Function),
            is_main: false,
        };
        let gadget = canonicalization_gadget(&mut func, ValueType::F32);
        assert_eq!(gadget.len(), 6);
    }

    #[test]
    fn matching_label_prefers_innermost_loop() {
        let ancestors = alloc::vec![
            AncestorLabel { stack_goal: alloc::vec![ValueType::I32], is_loop: false },
            AncestorLabel { stack_goal: Vec::new(), is_loop: true },
        ];
        let label = matching_label(&ancestors, &alloc::vec![ValueType::I64]);
        assert_eq!(label, Some(0));
    }

    #[test]
    fn oparg_materializes_memarg_as_align_and_offset_not_a_bare_leb() {
        let table = InstructionTable::new();
        let rules = RuleStore::from_instruction_table(&table);
        let kinds = rules.immediate_kinds("i32.load").expect("i32.load is catalogued");
        assert_eq!(kinds, &[OperandKind::MemArg]);
        let candidates = rules.align_candidates("i32.load").expect("has align candidates");
        let mut rng = PrngSource::new(StdRng::seed_from_u64(7));
        let imm = materialize_oparg(OperandKind::MemArg, 12, Some(candidates), &mut rng);
        match imm {
            Immediate::MemArg(m) => assert_eq!(m.offset, 12),
            other => panic!("expected MemArg, got {other:?}"),
        }
    }

    #[test]
    fn oparg_materializes_table_and_func_indices_as_index_not_i32() {
        let mut rng = PrngSource::new(StdRng::seed_from_u64(3));
        assert_eq!(materialize_oparg(OperandKind::TableIdx, 2, None, &mut rng), Immediate::Index(2));
        assert_eq!(materialize_oparg(OperandKind::FuncIdx, 5, None, &mut rng), Immediate::Index(5));
        assert_eq!(materialize_oparg(OperandKind::LaneIdx, 9, None, &mut rng), Immediate::LaneIdx(9));
    }

    #[test]
    fn generate_inner_can_produce_a_br_table() {
        let mut config = Config::default();
        config.max_depth = 3;
        config.p_br_table = 1.0;
        config.p_struct_gen = 1.0;
        let table = InstructionTable::new();
        let rules = RuleStore::from_instruction_table(&table);
        let mut ctx = test_ctx(&config, &rules);
        let mut rng = PrngSource::new(StdRng::seed_from_u64(11));
        ctx.generate(&mut rng);
        let func = &ctx.module.funcs[0];
        let saw_br_table = func
            .body
            .records
            .iter()
            .flat_map(|r| &r.instrs)
            .any(|i| i.opcode == "br_table");
        assert!(saw_br_table, "expected at least one br_table in a deep, br_table-forced body");
    }
}
