//! Textual form of the IR.
//!
//! The printed form parses back through [`crate::parse_func`], which is what
//! tests lean on for readable fixtures.

use alloc::format;
use alloc::string::String;

use crate::{
    func::Func,
    ids::BlockId,
    value::Aux,
};

pub fn block_to_string(f: &Func, b: BlockId) -> String {
    let mut out = String::new();
    let block = f.block(b);
    out.push_str(&format!("{}: {}", b, block.kind));
    if !block.controls.is_empty() {
        out.push_str(" (");
        for (i, c) in block.controls.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("{}", c));
        }
        out.push(')');
    }
    if !block.succs.is_empty() {
        out.push_str(" ->");
        for e in &block.succs {
            out.push_str(&format!(" {}", e.block));
        }
    }
    out.push('\n');
    for &v in &block.values {
        let data = f.value(v);
        out.push_str(&format!("  {} = {}.{}", v, data.op, data.ty));
        if data.aux_int != 0 || data.is_const() {
            out.push_str(&format!(" [{}]", data.aux_int));
        }
        if let Aux::Sym(s) = data.aux {
            out.push_str(&format!(" {{{}}}", s.0));
        }
        for (i, a) in data.args.iter().enumerate() {
            if i == 0 {
                out.push(' ');
            } else {
                out.push_str(", ");
            }
            out.push_str(&format!("{}", a));
        }
        out.push('\n');
    }
    out
}

pub fn func_to_string(f: &Func) -> String {
    let mut out = format!("function %{} {{\n", f.name);
    for b in f.blocks.keys() {
        out.push_str(&block_to_string(f, b));
    }
    out.push_str("}\n");
    out
}

impl core::fmt::Display for Func {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        fmt.write_str(&func_to_string(self))
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use crate::{BlockKind, Func, Op, Type};

    #[test]
    fn test_print_simple_func() {
        let mut f = Func::new("answer");
        let exit = f.add_block(BlockKind::Exit);
        f.add_edge(f.entry, exit);
        let mem = f.new_value(f.entry, Op::InitMem, Type::MEM, &[]);
        let c = f.new_value_i(f.entry, Op::Const32, Type::I32, 40, &[]);
        f.set_control(exit, mem);
        let _ = c;

        let text = f.to_string();
        assert!(text.contains("function %answer {"));
        assert!(text.contains("b0: plain -> b1"));
        assert!(text.contains("v0 = initmem.mem"));
        assert!(text.contains("v1 = const32.i32 [40]"));
        assert!(text.contains("b1: exit (v0)"));
    }
}
