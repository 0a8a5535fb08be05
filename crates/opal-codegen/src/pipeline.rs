//! The per-function compilation pipeline.
//!
//! Deterministic and total: a function either runs every pass and emits
//! instructions, or a pass detects an internal inconsistency and aborts.
//! Passes own the whole graph while they run; there is no suspension
//! point, so a driver that wants to cancel does it between functions.

use opal_ir::{check_func, debug, Func, Symbol, Type};
use opal_opt::{apply_rules, copyelim, cse, deadcode, schedule, GenericRules};

use crate::{
    blockrewrite::rewrite_blocks,
    frame::FrameLayout,
    layout::layout_order,
    obj::ObjectSink,
    regalloc::regalloc,
    stackalloc::stackalloc,
    target::Target,
};

/// Compile one function to machine code and hand it to `sink`.
///
/// `auto` allocates fresh stack slots on behalf of the front end; the
/// stack allocator calls it for spill slots with no source name.
pub fn compile_func(
    f: &mut Func,
    target: &dyn Target,
    auto: &mut dyn FnMut(Type) -> Symbol,
    sink: &mut dyn ObjectSink,
) {
    #[cfg(debug_assertions)]
    check_func(f);
    debug!("compile {}: {} blocks, {} values", f.name, f.num_blocks(), f.num_values());

    // Generic rewriting and the dataflow passes alternate until neither
    // finds anything: dead-code removal can prune a phi input and make a
    // phi trivial for the next rewrite round. Rules append their helper
    // values at the block tail; scheduling restores define-before-use
    // order.
    loop {
        let fired = apply_rules(f, &GenericRules);
        schedule(f);
        deadcode(f);
        copyelim(f);
        if !fired {
            break;
        }
    }
    cse(f);
    deadcode(f);

    // Instruction selection, then the same alternation.
    loop {
        let fired = apply_rules(f, target.lower_rules());
        schedule(f);
        copyelim(f);
        deadcode(f);
        if !fired {
            break;
        }
    }

    // Terminator folding.
    rewrite_blocks(f, target.block_rules());
    deadcode(f);

    #[cfg(debug_assertions)]
    check_func(f);

    // Allocation and emission.
    debug!("compile {}: lowered to {} values", f.name, f.num_values());
    regalloc(f, target);
    stackalloc(f, auto);
    let frame = FrameLayout::compute(f);
    debug!("compile {}: frame {} bytes", f.name, frame.frame_size);
    let order = layout_order(f);
    let code = target.emit(f, &frame, &order);
    sink.define_func(&f.name, code);
}
