//! Tree-to-SSA lowering.
//!
//! The builder walks statements in source order keeping a per-block map
//! from variable to current value. Reads in a block with no local
//! definition leave a `FwdRef` placeholder; once every block is built, a
//! fixup pass replaces each placeholder with a phi over its predecessors,
//! or a copy when all predecessors agree.
//!
//! Memory is an ordinary variable to the builder: loads read it, stores
//! and calls write it, and the fixup pass merges it at joins like anything
//! else.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use opal_ir::{
    Aux, BlockId, BlockKind, EntityRef, Func, LocalSlot, Op, SourcePos, Symbol, Type, TypeClass,
    ValueId,
};

use crate::{
    frontend::Frontend,
    tree::{BinOp, CmpOp, Expr, FuncDecl, Stmt, UnOp, VarId},
};

/// A source-level error found during lowering. The function is abandoned;
/// sibling functions are unaffected.
#[derive(Debug, Clone)]
pub struct BuildError {
    pub pos: SourcePos,
    pub message: String,
}

/// Key of the reserved memory variable in the builder's def maps.
const MEM_KEY: u32 = u32::MAX;

/// Lower one function declaration to SSA.
pub fn build_func(decl: &FuncDecl, fe: &mut dyn Frontend) -> Result<Func, BuildError> {
    let mut b = Builder::new(decl, fe);
    b.setup();
    for stmt in &decl.body {
        b.stmt(stmt)?;
    }
    b.finish();
    Ok(b.f)
}

struct Builder<'a> {
    f: Func,
    decl: &'a FuncDecl,
    fe: &'a mut dyn Frontend,
    cur: BlockId,
    /// End-of-block variable state, indexed by block.
    defvars: Vec<BTreeMap<u32, ValueId>>,
    fwdrefs: Vec<ValueId>,
    labels: BTreeMap<u32, BlockId>,
    sp: ValueId,
    init_mem: ValueId,
    /// Addressed parameters get a fresh local slot; the incoming argument
    /// area is never aliased by a movable address.
    param_slot: BTreeMap<u32, Symbol>,
}

impl<'a> Builder<'a> {
    fn new(decl: &'a FuncDecl, fe: &'a mut dyn Frontend) -> Self {
        let mut f = Func::new(&decl.name);
        let entry = f.entry;
        let init_mem = f.new_value(entry, Op::InitMem, Type::MEM, &[]);
        let sp = f.new_value(entry, Op::Sp, Type::PTR, &[]);
        Self {
            f,
            decl,
            fe,
            cur: entry,
            defvars: vec![BTreeMap::new()],
            fwdrefs: Vec::new(),
            labels: BTreeMap::new(),
            sp,
            init_mem,
            param_slot: BTreeMap::new(),
        }
    }

    fn setup(&mut self) {
        let entry = self.f.entry;
        self.defvars[0].insert(MEM_KEY, self.init_mem);
        for param in &self.decl.params {
            let var = &self.decl.vars[param.var.0 as usize];
            let arg = self
                .f
                .new_value_a(entry, Op::Arg, var.ty, Aux::Sym(var.sym), &[]);
            self.f.value_mut(arg).aux_int = param.abi_offset;
            if var.addr_taken {
                // Addressed parameters are copied into a fresh local slot
                // at entry; every later access goes through that slot.
                let slot_sym = self.fe.auto(var.ty);
                self.param_slot.insert(param.var.0, slot_sym);
                let addr = self.slot_addr(slot_sym, var.ty);
                self.store(var.ty, addr, arg);
            } else {
                self.write_var(param.var, arg);
            }
        }
    }

    fn finish(&mut self) {
        // Fall off the end: an implicit void return.
        self.terminate_if_open(self.cur);
        // Blocks abandoned after goto/return, plus any label never reached
        // by fallthrough.
        for b in self.f.blocks.keys().collect::<Vec<_>>() {
            self.terminate_if_open(b);
        }
        self.resolve_fwdrefs();
    }

    fn terminate_if_open(&mut self, b: BlockId) {
        if self.f.block(b).kind == BlockKind::Plain && self.f.block(b).succs.is_empty() {
            let saved = self.cur;
            self.cur = b;
            let mem = self.read_mem();
            self.f.reset_block(b, BlockKind::Exit);
            self.f.set_control(b, mem);
            self.cur = saved;
        }
    }

    // ---- Variable access ----

    fn defvars_mut(&mut self, b: BlockId) -> &mut BTreeMap<u32, ValueId> {
        while self.defvars.len() < self.f.num_blocks() {
            self.defvars.push(BTreeMap::new());
        }
        &mut self.defvars[b.index()]
    }

    fn write_var(&mut self, var: VarId, v: ValueId) {
        let decl = &self.decl.vars[var.0 as usize];
        let slot = LocalSlot {
            sym: decl.sym,
            ty: decl.ty,
            off: 0,
        };
        self.f.add_named_value(slot, v);
        let cur = self.cur;
        self.defvars_mut(cur).insert(var.0, v);
    }

    fn read_var(&mut self, var: VarId) -> ValueId {
        let ty = self.decl.vars[var.0 as usize].ty;
        let cur = self.cur;
        self.lookup_var(cur, var.0, ty)
    }

    fn read_mem(&mut self) -> ValueId {
        let cur = self.cur;
        self.lookup_var(cur, MEM_KEY, Type::MEM)
    }

    fn write_mem(&mut self, v: ValueId) {
        let cur = self.cur;
        self.defvars_mut(cur).insert(MEM_KEY, v);
    }

    /// The current value of a variable at (the end of) `b`, creating a
    /// forward reference when `b` has no local definition. Used while the
    /// CFG is still growing, so it never looks past the block itself.
    fn lookup_var(&mut self, b: BlockId, key: u32, ty: Type) -> ValueId {
        if let Some(&v) = self.defvars_mut(b).get(&key) {
            return v;
        }
        let fwd = self.f.new_value_i(b, Op::FwdRef, ty, key as i64, &[]);
        self.defvars_mut(b).insert(key, fwd);
        self.fwdrefs.push(fwd);
        fwd
    }

    /// Like `lookup_var`, but for the fixup pass once every edge exists:
    /// walks single-predecessor chains so a variable that merely passes
    /// through a region does not pick up placeholder merges, and caches
    /// the answer at every block it crossed.
    fn lookup_var_outgoing(&mut self, b: BlockId, key: u32, ty: Type) -> ValueId {
        let mut cur = b;
        let mut steps = 0;
        loop {
            if let Some(&v) = self.defvars_mut(cur).get(&key) {
                if cur != b {
                    self.defvars_mut(b).insert(key, v);
                }
                return v;
            }
            let preds = &self.f.block(cur).preds;
            if preds.len() != 1 || steps > self.f.num_blocks() {
                break;
            }
            cur = preds[0].block;
            steps += 1;
        }
        let fwd = self.f.new_value_i(cur, Op::FwdRef, ty, key as i64, &[]);
        self.defvars_mut(cur).insert(key, fwd);
        if cur != b {
            self.defvars_mut(b).insert(key, fwd);
        }
        self.fwdrefs.push(fwd);
        fwd
    }

    // ---- FwdRef resolution ----

    fn resolve_fwdrefs(&mut self) {
        while let Some(v) = self.fwdrefs.pop() {
            if self.f.value(v).op != Op::FwdRef {
                continue;
            }
            let b = self.f.value(v).block;
            let key = self.f.value(v).aux_int as u32;
            let ty = self.f.value(v).ty;
            let preds: Vec<BlockId> = self.f.block(b).preds.iter().map(|e| e.block).collect();

            if preds.is_empty() {
                self.resolve_dead_ref(v, ty);
                continue;
            }

            let mut args = Vec::with_capacity(preds.len());
            for p in preds {
                args.push(self.lookup_var_outgoing(p, key, ty));
            }

            // All predecessors agreeing (ignoring self-reference through a
            // loop) means no merge is needed.
            let mut unique: Option<ValueId> = None;
            let mut trivial = true;
            for &a in &args {
                if a == v {
                    continue;
                }
                match unique {
                    None => unique = Some(a),
                    Some(u) if u == a => {}
                    Some(_) => {
                        trivial = false;
                        break;
                    }
                }
            }

            match (trivial, unique) {
                (true, Some(u)) => {
                    self.f.reset_value(v, Op::Copy);
                    self.f.value_mut(v).args.push(u);
                }
                _ => {
                    self.f.reset_value(v, Op::Phi);
                    self.f.value_mut(v).args = args;
                }
            }
        }
    }

    /// A reference in a block with no predecessors: the block is dead, so
    /// any well-typed value will do.
    fn resolve_dead_ref(&mut self, v: ValueId, ty: Type) {
        if ty.is_mem() {
            let init = self.init_mem;
            self.f.reset_value(v, Op::Copy);
            self.f.value_mut(v).args.push(init);
            return;
        }
        let op = match ty.class {
            TypeClass::Bool => Op::ConstBool,
            TypeClass::Ptr => Op::ConstNil,
            TypeClass::Float => Op::Const32F,
            _ => match ty.size {
                1 => Op::Const8,
                2 => Op::Const16,
                _ => Op::Const32,
            },
        };
        self.f.reset_value(v, op);
    }

    // ---- Statements ----

    fn stmt(&mut self, s: &Stmt) -> Result<(), BuildError> {
        match s {
            Stmt::Assign(pos, var, e) => {
                let v = self.expr(e, *pos)?;
                let decl = &self.decl.vars[var.0 as usize];
                if decl.addr_taken {
                    let (sym, ty) = (self.var_slot_sym(*var), decl.ty);
                    let addr = self.slot_addr(sym, ty);
                    self.store(ty, addr, v);
                } else {
                    self.write_var(*var, v);
                }
                Ok(())
            }
            Stmt::StoreInd(pos, dst, src, ty) => {
                let p = self.expr(dst, *pos)?;
                let v = self.expr(src, *pos)?;
                self.store(*ty, p, v);
                Ok(())
            }
            Stmt::If(pos, cond, then_stmts, else_stmts) => {
                self.stmt_if(*pos, cond, then_stmts, else_stmts)
            }
            Stmt::While(pos, cond, body) => self.stmt_while(*pos, cond, body),
            Stmt::Return(pos, e) => self.stmt_return(*pos, e.as_ref()),
            Stmt::Discard(pos, e) => {
                self.expr(e, *pos)?;
                Ok(())
            }
            Stmt::Block(stmts) => {
                for s in stmts {
                    self.stmt(s)?;
                }
                Ok(())
            }
            Stmt::Label(_, l) => {
                let b = self.label_block(*l);
                self.f.add_edge(self.cur, b);
                self.cur = b;
                Ok(())
            }
            Stmt::Goto(_, l) => {
                let b = self.label_block(*l);
                self.f.add_edge(self.cur, b);
                self.cur = self.f.add_block(BlockKind::Plain);
                Ok(())
            }
        }
    }

    fn stmt_if(
        &mut self,
        pos: SourcePos,
        cond: &Expr,
        then_stmts: &[Stmt],
        else_stmts: &[Stmt],
    ) -> Result<(), BuildError> {
        let c = self.expr(cond, pos)?;
        let head = self.cur;
        self.f.reset_block(head, BlockKind::If);
        self.f.set_control(head, c);

        let then_b = self.f.add_block(BlockKind::Plain);
        self.f.add_edge(head, then_b);

        if else_stmts.is_empty() {
            let join = self.f.add_block(BlockKind::Plain);
            self.f.add_edge(head, join);
            self.cur = then_b;
            for s in then_stmts {
                self.stmt(s)?;
            }
            self.f.add_edge(self.cur, join);
            self.cur = join;
        } else {
            let else_b = self.f.add_block(BlockKind::Plain);
            self.f.add_edge(head, else_b);
            let join = self.f.add_block(BlockKind::Plain);

            self.cur = then_b;
            for s in then_stmts {
                self.stmt(s)?;
            }
            self.f.add_edge(self.cur, join);

            self.cur = else_b;
            for s in else_stmts {
                self.stmt(s)?;
            }
            self.f.add_edge(self.cur, join);

            self.cur = join;
        }
        Ok(())
    }

    fn stmt_while(&mut self, pos: SourcePos, cond: &Expr, body: &[Stmt]) -> Result<(), BuildError> {
        let head = self.f.add_block(BlockKind::Plain);
        self.f.add_edge(self.cur, head);
        self.cur = head;

        let c = self.expr(cond, pos)?;
        // The condition may itself have opened new blocks; branch from
        // wherever it left us.
        let test = self.cur;
        self.f.reset_block(test, BlockKind::If);
        self.f.set_control(test, c);

        let body_b = self.f.add_block(BlockKind::Plain);
        let exit_b = self.f.add_block(BlockKind::Plain);
        self.f.add_edge(test, body_b);
        self.f.add_edge(test, exit_b);

        self.cur = body_b;
        for s in body {
            self.stmt(s)?;
        }
        self.f.add_edge(self.cur, head);

        self.cur = exit_b;
        Ok(())
    }

    fn stmt_return(&mut self, pos: SourcePos, e: Option<&Expr>) -> Result<(), BuildError> {
        if let Some(e) = e {
            let v = self.expr(e, pos)?;
            match self.decl.result {
                Some((sym, ty)) => {
                    let addr = self.slot_addr(sym, ty);
                    self.store(ty, addr, v);
                }
                None => {
                    self.fe.error(pos, "return value in a void function");
                    return Err(BuildError {
                        pos,
                        message: String::from("return value in a void function"),
                    });
                }
            }
        }
        let mem = self.read_mem();
        let b = self.cur;
        self.f.reset_block(b, BlockKind::Exit);
        self.f.set_control(b, mem);
        self.cur = self.f.add_block(BlockKind::Plain);
        Ok(())
    }

    fn label_block(&mut self, l: u32) -> BlockId {
        if let Some(&b) = self.labels.get(&l) {
            return b;
        }
        let b = self.f.add_block(BlockKind::Plain);
        self.labels.insert(l, b);
        b
    }

    // ---- Expressions ----

    fn expr(&mut self, e: &Expr, pos: SourcePos) -> Result<ValueId, BuildError> {
        match e {
            Expr::ConstI(ty, c) => {
                let op = match (ty.class, ty.size) {
                    (TypeClass::Bool, _) => Op::ConstBool,
                    (_, 1) => Op::Const8,
                    (_, 2) => Op::Const16,
                    _ => Op::Const32,
                };
                Ok(self.f.new_value_i(self.cur, op, *ty, *c, &[]))
            }
            Expr::ConstF(bits) => {
                Ok(self
                    .f
                    .new_value_i(self.cur, Op::Const32F, Type::F32, *bits as i64, &[]))
            }
            Expr::Nil => Ok(self.f.new_value(self.cur, Op::ConstNil, Type::PTR, &[])),
            Expr::Var(var) => {
                let decl = &self.decl.vars[var.0 as usize];
                if decl.addr_taken {
                    let (sym, ty) = (self.var_slot_sym(*var), decl.ty);
                    let addr = self.slot_addr(sym, ty);
                    Ok(self.load(ty, addr))
                } else {
                    Ok(self.read_var(*var))
                }
            }
            Expr::Unary(op, arg) => {
                let a = self.expr(arg, pos)?;
                let ty = self.f.value(a).ty;
                let ir_op = match (op, ty.is_float()) {
                    (UnOp::Neg, false) => Op::Neg32,
                    (UnOp::Neg, true) => Op::Neg32F,
                    (UnOp::Com, _) => Op::Com32,
                    (UnOp::Not, _) => Op::Not,
                };
                let rty = if *op == UnOp::Not { Type::BOOL } else { ty };
                Ok(self.f.new_value(self.cur, ir_op, rty, &[a]))
            }
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, pos),
            Expr::Cmp(op, lhs, rhs) => self.cmp(*op, lhs, rhs, pos),
            Expr::Deref(p, ty) => {
                let ptr = self.expr(p, pos)?;
                let ptr = self.nil_check(ptr);
                Ok(self.load(*ty, ptr))
            }
            Expr::AddrOf(var) => {
                let ty = self.decl.vars[var.0 as usize].ty;
                let sym = self.var_slot_sym(*var);
                Ok(self.slot_addr(sym, ty))
            }
            Expr::Field(p, off, ty) => {
                let ptr = self.expr(p, pos)?;
                let ptr = self.nil_check(ptr);
                let fp = self
                    .f
                    .new_value_i(self.cur, Op::OffPtr, Type::PTR, *off, &[ptr]);
                Ok(self.load(*ty, fp))
            }
            Expr::Index(p, idx, elem_ty) => {
                let ptr = self.expr(p, pos)?;
                let ptr = self.nil_check(ptr);
                let i = self.expr(idx, pos)?;
                let size =
                    self.f
                        .new_value_i(self.cur, Op::Const32, Type::I32, elem_ty.size as i64, &[]);
                let off = self.f.new_value(self.cur, Op::Mul32, Type::I32, &[i, size]);
                let ep = self
                    .f
                    .new_value(self.cur, Op::AddPtr, Type::PTR, &[ptr, off]);
                Ok(self.load(*elem_ty, ep))
            }
            Expr::Call(sym, args, ret) => self.call(*sym, args, *ret, pos),
            Expr::Conv(inner, to) => {
                let v = self.expr(inner, pos)?;
                let from = self.f.value(v).ty;
                self.conv(v, from, *to)
            }
        }
    }

    fn binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: SourcePos,
    ) -> Result<ValueId, BuildError> {
        let a = self.expr(lhs, pos)?;
        let b = self.expr(rhs, pos)?;
        let ty = self.f.value(a).ty;

        if matches!(op, BinOp::Div | BinOp::Mod) {
            let rv = self.f.value(b);
            if rv.is_const() && rv.aux_int == 0 {
                self.fe.error(pos, "division by zero");
                return Err(BuildError {
                    pos,
                    message: String::from("division by zero"),
                });
            }
        }

        let ir_op = match (op, ty.class, ty.size, ty.signed) {
            (BinOp::Add, TypeClass::Float, _, _) => Op::Add32F,
            (BinOp::Sub, TypeClass::Float, _, _) => Op::Sub32F,
            (BinOp::Mul, TypeClass::Float, _, _) => Op::Mul32F,
            (BinOp::Div, TypeClass::Float, _, _) => Op::Div32F,
            (BinOp::Add, TypeClass::Ptr, _, _) => Op::AddPtr,
            (BinOp::Add, _, 1, _) => Op::Add8,
            (BinOp::Add, _, 2, _) => Op::Add16,
            (BinOp::Add, _, _, _) => Op::Add32,
            (BinOp::Sub, _, 1, _) => Op::Sub8,
            (BinOp::Sub, _, 2, _) => Op::Sub16,
            (BinOp::Sub, _, _, _) => Op::Sub32,
            (BinOp::Mul, _, _, _) => Op::Mul32,
            (BinOp::Div, _, _, true) => Op::Div32,
            (BinOp::Div, _, _, false) => Op::Div32u,
            (BinOp::Mod, _, _, true) => Op::Mod32,
            (BinOp::Mod, _, _, false) => Op::Mod32u,
            (BinOp::And, _, 1, _) => Op::And8,
            (BinOp::And, _, 2, _) => Op::And16,
            (BinOp::And, _, _, _) => Op::And32,
            (BinOp::Or, _, 1, _) => Op::Or8,
            (BinOp::Or, _, 2, _) => Op::Or16,
            (BinOp::Or, _, _, _) => Op::Or32,
            (BinOp::Xor, _, 1, _) => Op::Xor8,
            (BinOp::Xor, _, 2, _) => Op::Xor16,
            (BinOp::Xor, _, _, _) => Op::Xor32,
            (BinOp::Shl, _, _, _) => Op::Lsh32x32,
            (BinOp::Shr, _, _, true) => Op::Rsh32x32,
            (BinOp::Shr, _, _, false) => Op::Rsh32Ux32,
        };
        Ok(self.f.new_value(self.cur, ir_op, ty, &[a, b]))
    }

    fn cmp(
        &mut self,
        op: CmpOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: SourcePos,
    ) -> Result<ValueId, BuildError> {
        let a = self.expr(lhs, pos)?;
        let b = self.expr(rhs, pos)?;
        let ty = self.f.value(a).ty;

        if ty.is_ptr() {
            let eq = self.f.new_value(self.cur, Op::EqPtr, Type::BOOL, &[a, b]);
            return Ok(match op {
                CmpOp::Eq => eq,
                CmpOp::Ne => self.f.new_value(self.cur, Op::Not, Type::BOOL, &[eq]),
                _ => {
                    self.f
                        .fatal(self.cur, format_args!("ordered comparison of pointers"))
                }
            });
        }

        let ir_op = if ty.is_float() {
            match op {
                CmpOp::Eq => Op::Eq32F,
                CmpOp::Ne => Op::Neq32F,
                CmpOp::Lt => Op::Less32F,
                CmpOp::Le => Op::Leq32F,
                CmpOp::Gt => Op::Greater32F,
                CmpOp::Ge => Op::Geq32F,
            }
        } else if ty.signed || ty.is_boolean() {
            match op {
                CmpOp::Eq => Op::Eq32,
                CmpOp::Ne => Op::Neq32,
                CmpOp::Lt => Op::Less32,
                CmpOp::Le => Op::Leq32,
                CmpOp::Gt => Op::Greater32,
                CmpOp::Ge => Op::Geq32,
            }
        } else {
            match op {
                CmpOp::Eq => Op::Eq32,
                CmpOp::Ne => Op::Neq32,
                CmpOp::Lt => Op::Less32U,
                CmpOp::Le => Op::Leq32U,
                CmpOp::Gt => Op::Greater32U,
                CmpOp::Ge => Op::Geq32U,
            }
        };
        Ok(self.f.new_value(self.cur, ir_op, Type::BOOL, &[a, b]))
    }

    fn conv(&mut self, v: ValueId, from: Type, to: Type) -> Result<ValueId, BuildError> {
        if from == to {
            return Ok(v);
        }
        let op = match (from.class, to.class) {
            (TypeClass::Int, TypeClass::Float) => Op::Cvt32to32F,
            (TypeClass::Float, TypeClass::Int) => Op::Cvt32Fto32,
            (TypeClass::Int, TypeClass::Int) | (TypeClass::Bool, TypeClass::Int) => {
                if to.size > from.size {
                    match (from.size, from.signed) {
                        (1, true) => Op::SignExt8to32,
                        (1, false) => Op::ZeroExt8to32,
                        (2, true) => Op::SignExt16to32,
                        (2, false) => Op::ZeroExt16to32,
                        _ => Op::Copy,
                    }
                } else if to.size < from.size {
                    match to.size {
                        1 => Op::Trunc32to8,
                        _ => Op::Trunc32to16,
                    }
                } else {
                    // Same width, signedness change only.
                    Op::Copy
                }
            }
            _ => self.f.fatal(
                self.cur,
                format_args!("unsupported conversion {} -> {}", from, to),
            ),
        };
        Ok(self.f.new_value(self.cur, op, to, &[v]))
    }

    fn call(
        &mut self,
        sym: Symbol,
        args: &[Expr],
        ret: Option<Type>,
        pos: SourcePos,
    ) -> Result<ValueId, BuildError> {
        // Arguments go to the outgoing area at the bottom of the frame.
        let mut off: i64 = 0;
        for arg in args {
            let v = self.expr(arg, pos)?;
            let ty = self.f.value(v).ty;
            let slot = self
                .f
                .new_value_i(self.cur, Op::OffPtr, Type::PTR, off, &[self.sp]);
            self.store(ty, slot, v);
            off += 4;
        }

        let mem = self.read_mem();
        let call = self
            .f
            .new_value_a(self.cur, Op::StaticCall, Type::MEM, Aux::Sym(sym), &[mem]);
        self.f.value_mut(call).aux_int = off;
        self.write_mem(call);

        match ret {
            Some(ty) => {
                let slot = self
                    .f
                    .new_value_i(self.cur, Op::OffPtr, Type::PTR, off, &[self.sp]);
                Ok(self.load(ty, slot))
            }
            // Void calls still need a value for Discard; hand back the call.
            None => Ok(call),
        }
    }

    // ---- Memory helpers ----

    fn var_slot_sym(&self, var: VarId) -> Symbol {
        match self.param_slot.get(&var.0) {
            Some(&sym) => sym,
            None => self.decl.vars[var.0 as usize].sym,
        }
    }

    fn slot_addr(&mut self, sym: Symbol, ty: Type) -> ValueId {
        let sp = self.sp;
        let addr = self
            .f
            .new_value_a(self.cur, Op::Addr, Type::PTR, Aux::Sym(sym), &[sp]);
        // The object size rides along so frame layout can reserve the
        // addressed local without asking the front end again.
        self.f.value_mut(addr).aux_int = ty.size as i64;
        addr
    }

    fn load(&mut self, ty: Type, ptr: ValueId) -> ValueId {
        let mem = self.read_mem();
        self.f.new_value(self.cur, Op::Load, ty, &[ptr, mem])
    }

    fn store(&mut self, ty: Type, ptr: ValueId, v: ValueId) {
        let mem = self.read_mem();
        let st = self
            .f
            .new_value_a(self.cur, Op::Store, Type::MEM, Aux::Ty(ty), &[ptr, v, mem]);
        self.write_mem(st);
    }

    fn nil_check(&mut self, ptr: ValueId) -> ValueId {
        // Dereference of a local slot address can never fault.
        if self.f.value(ptr).op == Op::Addr {
            return ptr;
        }
        let mem = self.read_mem();
        self.f
            .new_value(self.cur, Op::NilCheck, Type::VOID, &[ptr, mem]);
        ptr
    }
}

trait BlockIdExt {
    fn index_usize(self) -> usize;
}

impl BlockIdExt for BlockId {
    fn index_usize(self) -> usize {
        opal_ir::EntityRef::index(self)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;

    use opal_ir::{check_func, BlockKind, Op, SourcePos, Symbol, Type};

    use super::*;
    use crate::tree::{Param, VarDecl};

    /// A frontend good enough for builder tests: fresh symbols from a
    /// counter, errors collected.
    pub struct TestFrontend {
        next_sym: u32,
        pub errors: Vec<String>,
    }

    impl TestFrontend {
        pub fn new() -> Self {
            Self {
                next_sym: 1000,
                errors: Vec::new(),
            }
        }
    }

    impl Frontend for TestFrontend {
        fn auto(&mut self, _ty: Type) -> Symbol {
            self.next_sym += 1;
            Symbol(self.next_sym)
        }

        fn split_slot(&mut self, parent: Symbol, off: i64, _ty: Type) -> Symbol {
            Symbol(parent.0 * 1000 + off as u32)
        }

        fn syslook(&mut self, name: &str) -> Symbol {
            Symbol(9000 + name.len() as u32)
        }

        fn error(&mut self, _pos: SourcePos, msg: &str) {
            self.errors.push(msg.to_string());
        }
    }

    fn var(name: &str, sym: u32, ty: Type) -> VarDecl {
        VarDecl {
            name: name.to_string(),
            ty,
            sym: Symbol(sym),
            addr_taken: false,
        }
    }

    fn pos() -> SourcePos {
        SourcePos(1)
    }

    #[test]
    fn test_straightline_assign() {
        // x = 14; y = 26; x = x + y; return x
        let decl = FuncDecl {
            name: "add".to_string(),
            vars: vec![var("x", 1, Type::I32), var("y", 2, Type::I32)],
            params: vec![],
            result: Some((Symbol(3), Type::I32)),
            body: vec![
                Stmt::Assign(pos(), VarId(0), Expr::ConstI(Type::I32, 14)),
                Stmt::Assign(pos(), VarId(1), Expr::ConstI(Type::I32, 26)),
                Stmt::Assign(
                    pos(),
                    VarId(0),
                    Expr::Binary(
                        BinOp::Add,
                        alloc::boxed::Box::new(Expr::Var(VarId(0))),
                        alloc::boxed::Box::new(Expr::Var(VarId(1))),
                    ),
                ),
                Stmt::Return(pos(), Some(Expr::Var(VarId(0)))),
            ],
            pos: pos(),
        };
        let mut fe = TestFrontend::new();
        let f = build_func(&decl, &mut fe).expect("build should succeed");
        check_func(&f);

        let adds = f
            .values
            .values()
            .filter(|v| v.op == Op::Add32)
            .count();
        assert_eq!(adds, 1);
        assert!(fe.errors.is_empty());
    }

    #[test]
    fn test_if_join_creates_phi() {
        // if c { x = 1 } else { x = 2 }; return x
        let decl = FuncDecl {
            name: "sel".to_string(),
            vars: vec![var("c", 1, Type::BOOL), var("x", 2, Type::I32)],
            params: vec![Param {
                var: VarId(0),
                abi_offset: 0,
            }],
            result: Some((Symbol(3), Type::I32)),
            body: vec![
                Stmt::If(
                    pos(),
                    Expr::Var(VarId(0)),
                    vec![Stmt::Assign(pos(), VarId(1), Expr::ConstI(Type::I32, 1))],
                    vec![Stmt::Assign(pos(), VarId(1), Expr::ConstI(Type::I32, 2))],
                ),
                Stmt::Return(pos(), Some(Expr::Var(VarId(1)))),
            ],
            pos: pos(),
        };
        let mut fe = TestFrontend::new();
        let f = build_func(&decl, &mut fe).expect("build should succeed");
        check_func(&f);

        let phis: Vec<_> = f.values.values().filter(|v| v.op == Op::Phi).collect();
        assert_eq!(phis.len(), 1, "one phi for x at the join");
        assert_eq!(phis[0].args.len(), 2);
    }

    #[test]
    fn test_loop_phi_and_backedge() {
        // i = 0; while i < 10 { i = i + 1 }; return i
        let decl = FuncDecl {
            name: "count".to_string(),
            vars: vec![var("i", 1, Type::I32)],
            params: vec![],
            result: Some((Symbol(2), Type::I32)),
            body: vec![
                Stmt::Assign(pos(), VarId(0), Expr::ConstI(Type::I32, 0)),
                Stmt::While(
                    pos(),
                    Expr::Cmp(
                        CmpOp::Lt,
                        alloc::boxed::Box::new(Expr::Var(VarId(0))),
                        alloc::boxed::Box::new(Expr::ConstI(Type::I32, 10)),
                    ),
                    vec![Stmt::Assign(
                        pos(),
                        VarId(0),
                        Expr::Binary(
                            BinOp::Add,
                            alloc::boxed::Box::new(Expr::Var(VarId(0))),
                            alloc::boxed::Box::new(Expr::ConstI(Type::I32, 1)),
                        ),
                    )],
                ),
                Stmt::Return(pos(), Some(Expr::Var(VarId(0)))),
            ],
            pos: pos(),
        };
        let mut fe = TestFrontend::new();
        let f = build_func(&decl, &mut fe).expect("build should succeed");
        check_func(&f);

        // The loop variable needs a real phi in the header.
        let int_phis = f
            .values
            .values()
            .filter(|v| v.op == Op::Phi && v.ty == Type::I32)
            .count();
        assert_eq!(int_phis, 1);
    }

    #[test]
    fn test_addr_taken_var_uses_memory() {
        // p-taken x: x = 5; return x  -- must go through the slot.
        let decl = FuncDecl {
            name: "slot".to_string(),
            vars: vec![VarDecl {
                name: "x".to_string(),
                ty: Type::I32,
                sym: Symbol(1),
                addr_taken: true,
            }],
            params: vec![],
            result: Some((Symbol(2), Type::I32)),
            body: vec![
                Stmt::Assign(pos(), VarId(0), Expr::ConstI(Type::I32, 5)),
                Stmt::Return(pos(), Some(Expr::Var(VarId(0)))),
            ],
            pos: pos(),
        };
        let mut fe = TestFrontend::new();
        let f = build_func(&decl, &mut fe).expect("build should succeed");
        check_func(&f);

        let loads = f.values.values().filter(|v| v.op == Op::Load).count();
        let stores = f.values.values().filter(|v| v.op == Op::Store).count();
        assert!(loads >= 1, "read of an addressed var loads its slot");
        // One store for x, one for the result slot.
        assert!(stores >= 2);
        assert!(
            !f.values.values().any(|v| v.op == Op::Phi),
            "addressed vars never become SSA phis"
        );
    }

    #[test]
    fn test_deref_inserts_nil_check() {
        // return *p
        let decl = FuncDecl {
            name: "deref".to_string(),
            vars: vec![var("p", 1, Type::PTR)],
            params: vec![Param {
                var: VarId(0),
                abi_offset: 0,
            }],
            result: Some((Symbol(2), Type::I32)),
            body: vec![Stmt::Return(
                pos(),
                Some(Expr::Deref(
                    alloc::boxed::Box::new(Expr::Var(VarId(0))),
                    Type::I32,
                )),
            )],
            pos: pos(),
        };
        let mut fe = TestFrontend::new();
        let f = build_func(&decl, &mut fe).expect("build should succeed");
        check_func(&f);

        assert_eq!(
            f.values.values().filter(|v| v.op == Op::NilCheck).count(),
            1
        );
        assert_eq!(f.values.values().filter(|v| v.op == Op::Load).count(), 1);
    }

    #[test]
    fn test_index_scales_by_element_size() {
        // store p[i] into x: load via p + i*4
        let decl = FuncDecl {
            name: "index".to_string(),
            vars: vec![
                var("p", 1, Type::PTR),
                var("i", 2, Type::I32),
                var("x", 3, Type::I32),
            ],
            params: vec![
                Param {
                    var: VarId(0),
                    abi_offset: 0,
                },
                Param {
                    var: VarId(1),
                    abi_offset: 4,
                },
            ],
            result: None,
            body: vec![Stmt::Assign(
                pos(),
                VarId(2),
                Expr::Index(
                    alloc::boxed::Box::new(Expr::Var(VarId(0))),
                    alloc::boxed::Box::new(Expr::Var(VarId(1))),
                    Type::I32,
                ),
            )],
            pos: pos(),
        };
        let mut fe = TestFrontend::new();
        let f = build_func(&decl, &mut fe).expect("build should succeed");
        check_func(&f);

        let muls: Vec<_> = f.values.values().filter(|v| v.op == Op::Mul32).collect();
        assert_eq!(muls.len(), 1);
        // Scaled by the element size.
        let scale = muls[0].args[1];
        assert_eq!(f.value(scale).aux_int, 4);
        assert_eq!(f.values.values().filter(|v| v.op == Op::AddPtr).count(), 1);
    }

    #[test]
    fn test_store_indirect_threads_memory() {
        // *p = 9
        let decl = FuncDecl {
            name: "sind".to_string(),
            vars: vec![var("p", 1, Type::PTR)],
            params: vec![Param {
                var: VarId(0),
                abi_offset: 0,
            }],
            result: None,
            body: vec![Stmt::StoreInd(
                pos(),
                Expr::Var(VarId(0)),
                Expr::ConstI(Type::I32, 9),
                Type::I32,
            )],
            pos: pos(),
        };
        let mut fe = TestFrontend::new();
        let f = build_func(&decl, &mut fe).expect("build should succeed");
        check_func(&f);

        let stores: Vec<_> = f.values.values().filter(|v| v.op == Op::Store).collect();
        assert_eq!(stores.len(), 1);
        assert_eq!(f.value(stores[0].args[2]).op, Op::InitMem);
    }

    #[test]
    fn test_division_by_literal_zero_reports() {
        let decl = FuncDecl {
            name: "bad".to_string(),
            vars: vec![var("x", 1, Type::I32)],
            params: vec![],
            result: Some((Symbol(2), Type::I32)),
            body: vec![Stmt::Assign(
                pos(),
                VarId(0),
                Expr::Binary(
                    BinOp::Div,
                    alloc::boxed::Box::new(Expr::ConstI(Type::I32, 1)),
                    alloc::boxed::Box::new(Expr::ConstI(Type::I32, 0)),
                ),
            )],
            pos: pos(),
        };
        let mut fe = TestFrontend::new();
        let result = build_func(&decl, &mut fe);
        assert!(result.is_err());
        assert_eq!(fe.errors, vec!["division by zero".to_string()]);
    }

    #[test]
    fn test_goto_label_flow() {
        // goto L; (dead assign); L: return 7
        let decl = FuncDecl {
            name: "jump".to_string(),
            vars: vec![var("x", 1, Type::I32)],
            params: vec![],
            result: Some((Symbol(2), Type::I32)),
            body: vec![
                Stmt::Goto(pos(), 0),
                Stmt::Assign(pos(), VarId(0), Expr::ConstI(Type::I32, 1)),
                Stmt::Label(pos(), 0),
                Stmt::Return(pos(), Some(Expr::ConstI(Type::I32, 7))),
            ],
            pos: pos(),
        };
        let mut fe = TestFrontend::new();
        let f = build_func(&decl, &mut fe).expect("build should succeed");
        check_func(&f);

        // Exactly one reachable exit carrying the return.
        let exits = f
            .blocks
            .values()
            .filter(|b| b.kind == BlockKind::Exit)
            .count();
        assert!(exits >= 1);
    }

    #[test]
    fn test_mem_is_threaded_through_stores() {
        let decl = FuncDecl {
            name: "mems".to_string(),
            vars: vec![VarDecl {
                name: "x".to_string(),
                ty: Type::I32,
                sym: Symbol(1),
                addr_taken: true,
            }],
            params: vec![],
            result: None,
            body: vec![
                Stmt::Assign(pos(), VarId(0), Expr::ConstI(Type::I32, 1)),
                Stmt::Assign(pos(), VarId(0), Expr::ConstI(Type::I32, 2)),
            ],
            pos: pos(),
        };
        let mut fe = TestFrontend::new();
        let f = build_func(&decl, &mut fe).expect("build should succeed");
        check_func(&f);

        // Second store's memory argument is the first store.
        let stores: Vec<_> = f
            .values
            .iter()
            .filter(|(_, v)| v.op == Op::Store)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(stores.len(), 2);
        let second = f.value(stores[1]);
        assert_eq!(second.args[2], stores[0]);
    }
}
