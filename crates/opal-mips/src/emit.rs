//! Linearization of the allocated SSA graph into MIPS32 machine code.
//!
//! Blocks are emitted in layout order; each value dispatches on its op to
//! an emission routine. Terminators become branches, with the branch to
//! the next block in layout order elided. Forward branches are emitted
//! with a zero offset and patched once every block's start is known.
//! Every branch and jump gets an explicit `nop` delay slot.

use alloc::vec;
use alloc::vec::Vec;

use opal_codegen::{CodeBuffer, FrameLayout, LineEntry, Reloc, SafePoint};
use opal_ir::{
    Aux, BlockId, BlockKind, EntityRef, Func, LocalSlot, Location, Op, SourcePos, ValueId,
};

use crate::{
    encode::{encode, patch_branch_offset},
    inst::Inst,
    regs,
};

pub fn emit_func(f: &Func, frame: &FrameLayout, order: &[BlockId]) -> CodeBuffer {
    let mut e = Emitter {
        f,
        frame,
        buf: CodeBuffer::new(),
        block_start: vec![None; f.num_blocks()],
        fixups: Vec::new(),
        last_pos: SourcePos::NONE,
    };

    e.prologue();
    for (i, &b) in order.iter().enumerate() {
        e.block_start[b.index()] = Some(e.buf.len());
        for &v in &f.block(b).values {
            e.emit_value(v);
        }
        let next = order.get(i + 1).copied();
        e.terminator(b, next);
    }
    e.patch_branches();
    e.buf
}

struct Emitter<'a> {
    f: &'a Func,
    frame: &'a FrameLayout,
    buf: CodeBuffer,
    block_start: Vec<Option<usize>>,
    /// (word offset, target block) pairs awaiting the second pass.
    fixups: Vec<(usize, BlockId)>,
    last_pos: SourcePos,
}

impl<'a> Emitter<'a> {
    fn push(&mut self, inst: Inst) -> usize {
        self.buf.push(encode(inst))
    }

    fn branch(&mut self, inst: Inst, target: BlockId) {
        let at = self.push(inst);
        self.fixups.push((at, target));
        self.push(Inst::Nop);
    }

    fn patch_branches(&mut self) {
        for &(at, target) in &self.fixups {
            let start = match self.block_start[target.index()] {
                Some(s) => s,
                None => self
                    .f
                    .fatal(target, format_args!("branch to unemitted block {}", target)),
            };
            // Offset is relative to the instruction after the branch.
            let rel = start as i64 - (at as i64 + 1);
            if rel < i16::MIN as i64 || rel > i16::MAX as i64 {
                self.f
                    .fatal(target, format_args!("branch span {} out of range", rel));
            }
            let patched = patch_branch_offset(self.buf.words[at], rel as i16);
            self.buf.patch(at, patched);
        }
    }

    // ---- Frame plumbing ----

    fn prologue(&mut self) {
        let size = self.frame.frame_size as i64;
        if size > 0 {
            self.push(Inst::Addiu {
                rt: regs::SP,
                rs: regs::SP,
                imm: imm16(self.f, -size),
            });
        }
        if self.frame.has_calls {
            self.push(Inst::Sw {
                rt: regs::RA,
                base: regs::SP,
                off: imm16(self.f, self.frame.ra_offset()),
            });
        }
    }

    fn epilogue(&mut self) {
        if self.frame.has_calls {
            self.push(Inst::Lw {
                rt: regs::RA,
                base: regs::SP,
                off: imm16(self.f, self.frame.ra_offset()),
            });
        }
        let size = self.frame.frame_size as i64;
        if size > 0 {
            self.push(Inst::Addiu {
                rt: regs::SP,
                rs: regs::SP,
                imm: imm16(self.f, size),
            });
        }
        self.push(Inst::Jr { rs: regs::RA });
        self.push(Inst::Nop);
    }

    // ---- Operand plumbing ----

    fn reg(&self, v: ValueId) -> u8 {
        if self.f.value(v).op == Op::Sp {
            return regs::SP;
        }
        match self.f.home(v) {
            Some(Location::Reg(r)) => r,
            other => {
                let b = self.f.value(v).block;
                self.f
                    .fatal(b, format_args!("{} has no register (home {:?})", v, other))
            }
        }
    }

    fn slot(&self, v: ValueId) -> LocalSlot {
        match self.f.home(v) {
            Some(Location::Slot(slot)) => slot,
            other => {
                let b = self.f.value(v).block;
                self.f
                    .fatal(b, format_args!("{} has no stack slot (home {:?})", v, other))
            }
        }
    }

    fn slot_off(&self, v: ValueId) -> i16 {
        imm16(self.f, self.frame.slot_offset(self.f, self.slot(v)))
    }

    fn note_pos(&mut self, v: ValueId) {
        let pos = self.f.value(v).pos;
        if pos != SourcePos::NONE && pos != self.last_pos {
            self.last_pos = pos;
            let offset = self.buf.len();
            self.buf.lines.push(LineEntry { offset, pos });
        }
    }

    // ---- Values ----

    fn emit_value(&mut self, v: ValueId) {
        self.note_pos(v);
        let data = self.f.value(v);
        match data.op {
            // No code: definitions the frame already holds, or pure
            // bookkeeping.
            Op::InitMem | Op::Sp | Op::Arg | Op::Phi | Op::Invalid => {}

            Op::StoreReg => self.emit_storereg(v),
            Op::LoadReg => self.emit_loadreg(v),
            Op::Copy => self.emit_copy(v),

            Op::MipsMovwConst => self.emit_movwconst(self.reg(v), data.aux_int as i32),
            Op::MipsMovfConst => {
                self.emit_movwconst(regs::AT, data.aux_int as i32);
                self.push(Inst::Mtc1 {
                    rt: regs::AT,
                    fs: self.reg(v),
                });
            }
            Op::MipsMovwAddr => {
                let sym = match data.aux {
                    Aux::Sym(sym) => sym,
                    _ => self
                        .f
                        .fatal(data.block, format_args!("movwaddr without symbol: {}", v)),
                };
                let off = self.frame.sym_offset(self.f, sym);
                self.push(Inst::Addiu {
                    rt: self.reg(v),
                    rs: self.reg(data.args[0]),
                    imm: imm16(self.f, off),
                });
            }

            Op::MipsAdd => self.r3(v, |rd, rs, rt| Inst::Addu { rd, rs, rt }),
            Op::MipsSub => self.r3(v, |rd, rs, rt| Inst::Subu { rd, rs, rt }),
            Op::MipsMul => self.r3(v, |rd, rs, rt| Inst::Mul { rd, rs, rt }),
            Op::MipsAnd => self.r3(v, |rd, rs, rt| Inst::And { rd, rs, rt }),
            Op::MipsOr => self.r3(v, |rd, rs, rt| Inst::Or { rd, rs, rt }),
            Op::MipsXor => self.r3(v, |rd, rs, rt| Inst::Xor { rd, rs, rt }),
            Op::MipsNor => self.r3(v, |rd, rs, rt| Inst::Nor { rd, rs, rt }),
            Op::MipsNeg => {
                let rd = self.reg(v);
                let rs = self.reg(data.args[0]);
                self.push(Inst::Subu {
                    rd,
                    rs: regs::ZERO,
                    rt: rs,
                });
            }

            Op::MipsAddConst => self.i2(v, |rt, rs, imm| Inst::Addiu { rt, rs, imm }),
            Op::MipsAndConst => self.i2u(v, |rt, rs, imm| Inst::Andi { rt, rs, imm }),
            Op::MipsOrConst => self.i2u(v, |rt, rs, imm| Inst::Ori { rt, rs, imm }),
            Op::MipsXorConst => self.i2u(v, |rt, rs, imm| Inst::Xori { rt, rs, imm }),

            Op::MipsSll => self.shift_var(v, |rd, rt, rs| Inst::Sllv { rd, rt, rs }),
            Op::MipsSrl => self.shift_var(v, |rd, rt, rs| Inst::Srlv { rd, rt, rs }),
            Op::MipsSra => self.shift_var(v, |rd, rt, rs| Inst::Srav { rd, rt, rs }),
            Op::MipsSllConst => self.shift_const(v, |rd, rt, sa| Inst::Sll { rd, rt, sa }),
            Op::MipsSrlConst => self.shift_const(v, |rd, rt, sa| Inst::Srl { rd, rt, sa }),
            Op::MipsSraConst => self.shift_const(v, |rd, rt, sa| Inst::Sra { rd, rt, sa }),

            Op::MipsDiv => {
                let rs = self.reg(data.args[0]);
                let rt = self.reg(data.args[1]);
                self.push(Inst::Div { rs, rt });
            }
            Op::MipsDivu => {
                let rs = self.reg(data.args[0]);
                let rt = self.reg(data.args[1]);
                self.push(Inst::Divu { rs, rt });
            }
            Op::Select0 => {
                let rd = self.reg(v);
                self.push(Inst::Mfhi { rd });
            }
            Op::Select1 => {
                let rd = self.reg(v);
                self.push(Inst::Mflo { rd });
            }

            Op::MipsCmovz => {
                // Destination already holds arg0; write arg1 when arg2 is
                // zero.
                let rd = self.reg(v);
                let rs = self.reg(data.args[1]);
                let rt = self.reg(data.args[2]);
                self.push(Inst::Movz { rd, rs, rt });
            }

            Op::MipsSgt => {
                let rd = self.reg(v);
                let x = self.reg(data.args[0]);
                let y = self.reg(data.args[1]);
                self.push(Inst::Slt { rd, rs: y, rt: x });
            }
            Op::MipsSgtu => {
                let rd = self.reg(v);
                let x = self.reg(data.args[0]);
                let y = self.reg(data.args[1]);
                self.push(Inst::Sltu { rd, rs: y, rt: x });
            }
            Op::MipsSgtConst => {
                // 1 if c > x, i.e. x < c.
                let rd = self.reg(v);
                let x = self.reg(data.args[0]);
                self.push(Inst::Slti {
                    rt: rd,
                    rs: x,
                    imm: imm16(self.f, data.aux_int),
                });
            }
            Op::MipsSgtuConst => {
                let rd = self.reg(v);
                let x = self.reg(data.args[0]);
                self.push(Inst::Sltiu {
                    rt: rd,
                    rs: x,
                    imm: imm16(self.f, data.aux_int),
                });
            }
            Op::MipsSgtZero => {
                let rd = self.reg(v);
                let x = self.reg(data.args[0]);
                self.push(Inst::Slt {
                    rd,
                    rs: regs::ZERO,
                    rt: x,
                });
            }
            Op::MipsSgtuZero => {
                let rd = self.reg(v);
                let x = self.reg(data.args[0]);
                self.push(Inst::Sltu {
                    rd,
                    rs: regs::ZERO,
                    rt: x,
                });
            }

            Op::MipsMovbLoad => self.load(v, |rt, base, off| Inst::Lb { rt, base, off }),
            Op::MipsMovbuLoad => self.load(v, |rt, base, off| Inst::Lbu { rt, base, off }),
            Op::MipsMovhLoad => self.load(v, |rt, base, off| Inst::Lh { rt, base, off }),
            Op::MipsMovhuLoad => self.load(v, |rt, base, off| Inst::Lhu { rt, base, off }),
            Op::MipsMovwLoad => self.load(v, |rt, base, off| Inst::Lw { rt, base, off }),
            Op::MipsMovfLoad => {
                let ft = self.reg(v);
                let base = self.reg(data.args[0]);
                let off = imm16(self.f, data.aux_int);
                self.push(Inst::Lwc1 { ft, base, off });
            }
            Op::MipsMovbStore => self.store(v, |rt, base, off| Inst::Sb { rt, base, off }),
            Op::MipsMovhStore => self.store(v, |rt, base, off| Inst::Sh { rt, base, off }),
            Op::MipsMovwStore => self.store(v, |rt, base, off| Inst::Sw { rt, base, off }),
            Op::MipsMovfStore => {
                let base = self.reg(data.args[0]);
                let ft = self.reg(data.args[1]);
                let off = imm16(self.f, data.aux_int);
                self.push(Inst::Swc1 { ft, base, off });
            }

            Op::MipsAddF => self.fp3(v, |fd, fs, ft| Inst::AddS { fd, fs, ft }),
            Op::MipsSubF => self.fp3(v, |fd, fs, ft| Inst::SubS { fd, fs, ft }),
            Op::MipsMulF => self.fp3(v, |fd, fs, ft| Inst::MulS { fd, fs, ft }),
            Op::MipsDivF => self.fp3(v, |fd, fs, ft| Inst::DivS { fd, fs, ft }),
            Op::MipsNegF => {
                let fd = self.reg(v);
                let fs = self.reg(data.args[0]);
                self.push(Inst::NegS { fd, fs });
            }
            Op::MipsCmpEqF => {
                let fs = self.reg(data.args[0]);
                let ft = self.reg(data.args[1]);
                self.push(Inst::CEqS { fs, ft });
            }
            Op::MipsCmpGtF => {
                // x > y via c.lt.s y, x.
                let x = self.reg(data.args[0]);
                let y = self.reg(data.args[1]);
                self.push(Inst::CLtS { fs: y, ft: x });
            }
            Op::MipsCmpGeF => {
                let x = self.reg(data.args[0]);
                let y = self.reg(data.args[1]);
                self.push(Inst::CLeS { fs: y, ft: x });
            }
            Op::MipsFpFlagTrue => {
                // rd = 1, skipped back to 0 when the flag is clear. The
                // +2 hops over the delay slot and the clearing addiu.
                let rd = self.reg(v);
                self.push(Inst::Addiu {
                    rt: rd,
                    rs: regs::ZERO,
                    imm: 1,
                });
                self.push(Inst::Bc1t { off: 2 });
                self.push(Inst::Nop);
                self.push(Inst::Addiu {
                    rt: rd,
                    rs: regs::ZERO,
                    imm: 0,
                });
            }
            Op::MipsFpFlagFalse => {
                let rd = self.reg(v);
                self.push(Inst::Addiu {
                    rt: rd,
                    rs: regs::ZERO,
                    imm: 1,
                });
                self.push(Inst::Bc1f { off: 2 });
                self.push(Inst::Nop);
                self.push(Inst::Addiu {
                    rt: rd,
                    rs: regs::ZERO,
                    imm: 0,
                });
            }
            Op::MipsMovwF => {
                let rs = self.reg(data.args[0]);
                let fd = self.reg(v);
                self.push(Inst::Mtc1 {
                    rt: rs,
                    fs: regs::FP_SCRATCH,
                });
                self.push(Inst::CvtSW {
                    fd,
                    fs: regs::FP_SCRATCH,
                });
            }
            Op::MipsTruncFW => {
                let fs = self.reg(data.args[0]);
                let rd = self.reg(v);
                self.push(Inst::TruncWS {
                    fd: regs::FP_SCRATCH,
                    fs,
                });
                self.push(Inst::Mfc1 {
                    rt: rd,
                    fs: regs::FP_SCRATCH,
                });
            }

            Op::MipsCallStatic => {
                let sym = match data.aux {
                    Aux::Sym(sym) => sym,
                    _ => self
                        .f
                        .fatal(data.block, format_args!("call without symbol: {}", v)),
                };
                let offset = self.push(Inst::Jal { target: 0 });
                self.buf.relocs.push(Reloc { offset, sym });
                self.buf.safepoints.push(SafePoint {
                    offset,
                    live_ptr_offsets: self.frame.pointer_slots(self.f),
                });
                self.push(Inst::Nop);
            }
            Op::MipsLoweredNilCheck => {
                // Touch the first byte; a nil pointer faults here with the
                // right pc.
                let rs = self.reg(data.args[0]);
                self.push(Inst::Lbu {
                    rt: regs::AT,
                    base: rs,
                    off: 0,
                });
            }
            Op::MipsLoweredZero => {
                let ptr = self.reg(data.args[0]);
                let size = data.aux_int;
                let mut off = 0i64;
                while off + 4 <= size {
                    self.push(Inst::Sw {
                        rt: regs::ZERO,
                        base: ptr,
                        off: imm16(self.f, off),
                    });
                    off += 4;
                }
                while off < size {
                    self.push(Inst::Sb {
                        rt: regs::ZERO,
                        base: ptr,
                        off: imm16(self.f, off),
                    });
                    off += 1;
                }
            }
            Op::MipsLoweredMove => {
                let dst = self.reg(data.args[0]);
                let src = self.reg(data.args[1]);
                let size = data.aux_int;
                let mut off = 0i64;
                while off + 4 <= size {
                    self.push(Inst::Lw {
                        rt: regs::AT,
                        base: src,
                        off: imm16(self.f, off),
                    });
                    self.push(Inst::Sw {
                        rt: regs::AT,
                        base: dst,
                        off: imm16(self.f, off),
                    });
                    off += 4;
                }
                while off < size {
                    self.push(Inst::Lbu {
                        rt: regs::AT,
                        base: src,
                        off: imm16(self.f, off),
                    });
                    self.push(Inst::Sb {
                        rt: regs::AT,
                        base: dst,
                        off: imm16(self.f, off),
                    });
                    off += 1;
                }
            }

            other => {
                let b = data.block;
                self.f.fatal(
                    b,
                    format_args!("op {} survived to emission in {}", other, v),
                )
            }
        }
    }

    fn emit_movwconst(&mut self, rd: u8, c: i32) {
        if (-0x8000..=0x7fff).contains(&(c as i64)) {
            self.push(Inst::Addiu {
                rt: rd,
                rs: regs::ZERO,
                imm: c as i16,
            });
        } else {
            let hi = ((c as u32) >> 16) as u16;
            let lo = (c as u32 & 0xffff) as u16;
            self.push(Inst::Lui { rt: rd, imm: hi });
            if lo != 0 {
                self.push(Inst::Ori {
                    rt: rd,
                    rs: rd,
                    imm: lo,
                });
            }
        }
    }

    fn emit_storereg(&mut self, v: ValueId) {
        let data = self.f.value(v);
        let src = self.reg(data.args[0]);
        let off = self.slot_off(v);
        let ty = data.ty;
        let inst = if ty.is_float() {
            Inst::Swc1 {
                ft: src,
                base: regs::SP,
                off,
            }
        } else {
            match ty.size {
                1 => Inst::Sb {
                    rt: src,
                    base: regs::SP,
                    off,
                },
                2 => Inst::Sh {
                    rt: src,
                    base: regs::SP,
                    off,
                },
                _ => Inst::Sw {
                    rt: src,
                    base: regs::SP,
                    off,
                },
            }
        };
        self.push(inst);
    }

    fn emit_loadreg(&mut self, v: ValueId) {
        let data = self.f.value(v);
        let dst = self.reg(v);
        let off = self.slot_off(data.args[0]);
        let ty = data.ty;
        let inst = if ty.is_float() {
            Inst::Lwc1 {
                ft: dst,
                base: regs::SP,
                off,
            }
        } else {
            match (ty.size, ty.signed) {
                (1, true) => Inst::Lb {
                    rt: dst,
                    base: regs::SP,
                    off,
                },
                (1, false) => Inst::Lbu {
                    rt: dst,
                    base: regs::SP,
                    off,
                },
                (2, true) => Inst::Lh {
                    rt: dst,
                    base: regs::SP,
                    off,
                },
                (2, false) => Inst::Lhu {
                    rt: dst,
                    base: regs::SP,
                    off,
                },
                _ => Inst::Lw {
                    rt: dst,
                    base: regs::SP,
                    off,
                },
            }
        };
        self.push(inst);
    }

    fn emit_copy(&mut self, v: ValueId) {
        let data = self.f.value(v);
        let src = data.args[0];
        if data.ty.is_float() {
            let fd = self.reg(v);
            let fs = self.reg(src);
            if fd != fs {
                self.push(Inst::MovS { fd, fs });
            }
        } else {
            let rd = self.reg(v);
            let rs = self.reg(src);
            if rd != rs {
                self.push(Inst::Addu {
                    rd,
                    rs,
                    rt: regs::ZERO,
                });
            }
        }
    }

    fn r3(&mut self, v: ValueId, make: impl Fn(u8, u8, u8) -> Inst) {
        let data = self.f.value(v);
        let rd = self.reg(v);
        let rs = self.reg(data.args[0]);
        let rt = self.reg(data.args[1]);
        self.push(make(rd, rs, rt));
    }

    fn fp3(&mut self, v: ValueId, make: impl Fn(u8, u8, u8) -> Inst) {
        let data = self.f.value(v);
        let fd = self.reg(v);
        let fs = self.reg(data.args[0]);
        let ft = self.reg(data.args[1]);
        self.push(make(fd, fs, ft));
    }

    fn i2(&mut self, v: ValueId, make: impl Fn(u8, u8, i16) -> Inst) {
        let data = self.f.value(v);
        let rt = self.reg(v);
        let rs = self.reg(data.args[0]);
        self.push(make(rt, rs, imm16(self.f, data.aux_int)));
    }

    fn i2u(&mut self, v: ValueId, make: impl Fn(u8, u8, u16) -> Inst) {
        let data = self.f.value(v);
        let rt = self.reg(v);
        let rs = self.reg(data.args[0]);
        let c = data.aux_int;
        if !(0..=0xffff).contains(&c) {
            self.f
                .fatal(data.block, format_args!("immediate {} out of range in {}", c, v));
        }
        self.push(make(rt, rs, c as u16));
    }

    fn shift_var(&mut self, v: ValueId, make: impl Fn(u8, u8, u8) -> Inst) {
        let data = self.f.value(v);
        let rd = self.reg(v);
        let rt = self.reg(data.args[0]);
        let rs = self.reg(data.args[1]);
        self.push(make(rd, rt, rs));
    }

    fn shift_const(&mut self, v: ValueId, make: impl Fn(u8, u8, u8) -> Inst) {
        let data = self.f.value(v);
        let rd = self.reg(v);
        let rt = self.reg(data.args[0]);
        let sa = (data.aux_int & 31) as u8;
        self.push(make(rd, rt, sa));
    }

    fn load(&mut self, v: ValueId, make: impl Fn(u8, u8, i16) -> Inst) {
        let data = self.f.value(v);
        let rt = self.reg(v);
        let base = self.reg(data.args[0]);
        self.push(make(rt, base, imm16(self.f, data.aux_int)));
    }

    fn store(&mut self, v: ValueId, make: impl Fn(u8, u8, i16) -> Inst) {
        let data = self.f.value(v);
        let base = self.reg(data.args[0]);
        let rt = self.reg(data.args[1]);
        self.push(make(rt, base, imm16(self.f, data.aux_int)));
    }

    // ---- Terminators ----

    fn terminator(&mut self, b: BlockId, next: Option<BlockId>) {
        let block = self.f.block(b);
        match block.kind {
            BlockKind::Exit => self.epilogue(),
            BlockKind::Plain | BlockKind::Call | BlockKind::First => {
                let target = block.succs[0].block;
                if next != Some(target) {
                    self.branch(Inst::B { off: 0 }, target);
                }
            }
            BlockKind::Eq => self.cond_branch(b, next, |rs| Inst::Beq { rs, rt: 0, off: 0 }),
            BlockKind::Ne => self.cond_branch(b, next, |rs| Inst::Bne { rs, rt: 0, off: 0 }),
            BlockKind::Lez => self.cond_branch(b, next, |rs| Inst::Blez { rs, off: 0 }),
            BlockKind::Gtz => self.cond_branch(b, next, |rs| Inst::Bgtz { rs, off: 0 }),
            BlockKind::Ltz => self.cond_branch(b, next, |rs| Inst::Bltz { rs, off: 0 }),
            BlockKind::Gez => self.cond_branch(b, next, |rs| Inst::Bgez { rs, off: 0 }),
            BlockKind::Fpt => self.fp_branch(b, next, Inst::Bc1t { off: 0 }),
            BlockKind::Fpf => self.fp_branch(b, next, Inst::Bc1f { off: 0 }),
            BlockKind::If => self
                .f
                .fatal(b, format_args!("generic If survived to emission")),
        }
    }

    fn cond_branch(&mut self, b: BlockId, next: Option<BlockId>, make: impl Fn(u8) -> Inst) {
        let block = self.f.block(b);
        let ctrl = self.reg(block.controls[0]);
        let taken = block.succs[0].block;
        let fallthrough = block.succs[1].block;
        self.branch(make(ctrl), taken);
        if next != Some(fallthrough) {
            self.branch(Inst::B { off: 0 }, fallthrough);
        }
    }

    fn fp_branch(&mut self, b: BlockId, next: Option<BlockId>, inst: Inst) {
        let block = self.f.block(b);
        let taken = block.succs[0].block;
        let fallthrough = block.succs[1].block;
        self.branch(inst, taken);
        if next != Some(fallthrough) {
            self.branch(Inst::B { off: 0 }, fallthrough);
        }
    }
}

fn imm16(f: &Func, c: i64) -> i16 {
    if !(-0x8000..=0x7fff).contains(&c) {
        let entry = f.entry;
        f.fatal(entry, format_args!("immediate {} does not fit 16 bits", c));
    }
    c as i16
}
