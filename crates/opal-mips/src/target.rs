//! The MIPS32 [`Target`] implementation.

use opal_codegen::{CodeBuffer, FrameLayout, Target};
use opal_ir::{BlockId, Func};
use opal_opt::Rules;

use crate::{
    emit::emit_func,
    regs,
    rules::{MipsBlockRules, MipsLowerRules},
};

/// 32-bit big-endian MIPS.
pub struct MipsTarget;

static LOWER_RULES: MipsLowerRules = MipsLowerRules;
static BLOCK_RULES: MipsBlockRules = MipsBlockRules;

impl Target for MipsTarget {
    fn name(&self) -> &'static str {
        "mips"
    }

    fn ptr_size(&self) -> u32 {
        4
    }

    fn int_regs(&self) -> &'static [u8] {
        regs::ALLOCATABLE_GPRS
    }

    fn float_regs(&self) -> &'static [u8] {
        regs::ALLOCATABLE_FPRS
    }

    fn is_caller_saved(&self, reg: u8) -> bool {
        regs::is_caller_saved(reg)
    }

    fn lower_rules(&self) -> &dyn Rules {
        &LOWER_RULES
    }

    fn block_rules(&self) -> &dyn Rules {
        &BLOCK_RULES
    }

    fn emit(&self, f: &Func, frame: &FrameLayout, order: &[BlockId]) -> CodeBuffer {
        emit_func(f, frame, order)
    }
}
