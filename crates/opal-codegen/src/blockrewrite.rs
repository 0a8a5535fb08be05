//! Block-terminator rewriting driver.
//!
//! Applies a target's block rules to fixpoint: condition values fold into
//! block kinds, inverted conditions swap kinds, and constant controls
//! collapse to `first`. Value-level rules do not run here; the engine
//! proper handles those.

use opal_ir::Func;
use opal_opt::Rules;

const MAX_PASSES: usize = 1000;

pub fn rewrite_blocks(f: &mut Func, rules: &dyn Rules) {
    let mut passes = 0;
    loop {
        let mut changed = false;
        let rpo = f.reverse_postorder();
        for &b in &rpo {
            if rules.rewrite_block(f, b) {
                changed = true;
            }
        }
        if !changed {
            return;
        }
        passes += 1;
        if passes > MAX_PASSES {
            let entry = f.entry;
            f.fatal(entry, format_args!("block rewrite did not terminate"));
        }
    }
}
