//! The opcode enumeration and its static info table.
//!
//! `Op` spans both generic (architecture-independent) operations and the
//! MIPS32 operations the rewrite rules lower them to. The table records,
//! per op: argument count, commutativity, the two-address constraint
//! (`result_in_arg0`), call-ness, and whether the op has an observable side
//! effect beyond its result.

/// Static properties of an [`Op`].
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    /// Fixed argument count, or -1 for variable (phis).
    pub arg_len: i8,
    pub commutative: bool,
    /// Two-address constraint: the result register must equal arg 0's.
    pub result_in_arg0: bool,
    pub call: bool,
    /// Kept alive by dead-code elimination regardless of uses.
    pub effect: bool,
}

macro_rules! ops {
    ($( $variant:ident = $name:literal, $args:literal $(, $flag:ident)* ;)*) => {
        /// The closed set of operations.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Op {
            $( $variant, )*
        }

        impl Op {
            pub const ALL: &'static [Op] = &[ $( Op::$variant, )* ];

            /// Static properties of this op.
            pub const fn info(self) -> OpInfo {
                match self {
                    $( Op::$variant => {
                        #[allow(unused_mut)]
                        let mut info = OpInfo {
                            name: $name,
                            arg_len: $args,
                            commutative: false,
                            result_in_arg0: false,
                            call: false,
                            effect: false,
                        };
                        $( info.$flag = true; )*
                        info
                    } )*
                }
            }

            /// Look an op up by its table name. Used by the text parser.
            pub fn from_name(name: &str) -> Option<Op> {
                for &op in Op::ALL {
                    if op.info().name.as_bytes() == name.as_bytes() {
                        return Some(op);
                    }
                }
                None
            }
        }
    };
}

ops! {
    // Bookkeeping.
    Invalid = "invalid", 0;
    Copy = "copy", 1;
    Phi = "phi", -1;
    FwdRef = "fwdref", 0;
    Arg = "arg", 0;
    Sp = "sp", 0;
    InitMem = "initmem", 0;
    Select0 = "select0", 1;
    Select1 = "select1", 1;
    StoreReg = "storereg", 1;
    LoadReg = "loadreg", 1;

    // Constants. The constant lives in aux_int.
    Const8 = "const8", 0;
    Const16 = "const16", 0;
    Const32 = "const32", 0;
    Const32F = "const32f", 0;
    ConstBool = "constbool", 0;
    ConstNil = "constnil", 0;

    // Integer arithmetic.
    Add8 = "add8", 2, commutative;
    Add16 = "add16", 2, commutative;
    Add32 = "add32", 2, commutative;
    Sub8 = "sub8", 2;
    Sub16 = "sub16", 2;
    Sub32 = "sub32", 2;
    AddPtr = "addptr", 2;
    Mul32 = "mul32", 2, commutative;
    Div32 = "div32", 2;
    Div32u = "div32u", 2;
    Mod32 = "mod32", 2;
    Mod32u = "mod32u", 2;

    // Float arithmetic.
    Add32F = "add32f", 2, commutative;
    Sub32F = "sub32f", 2;
    Mul32F = "mul32f", 2, commutative;
    Div32F = "div32f", 2;
    Neg32F = "neg32f", 1;

    // Bitwise.
    And8 = "and8", 2, commutative;
    And16 = "and16", 2, commutative;
    And32 = "and32", 2, commutative;
    Or8 = "or8", 2, commutative;
    Or16 = "or16", 2, commutative;
    Or32 = "or32", 2, commutative;
    Xor8 = "xor8", 2, commutative;
    Xor16 = "xor16", 2, commutative;
    Xor32 = "xor32", 2, commutative;
    Com32 = "com32", 1;
    Neg32 = "neg32", 1;
    Not = "not", 1;
    Lsh32x32 = "lsh32x32", 2;
    Rsh32x32 = "rsh32x32", 2;
    Rsh32Ux32 = "rsh32ux32", 2;

    // Comparisons producing a bool.
    Eq32 = "eq32", 2, commutative;
    Eq32F = "eq32f", 2, commutative;
    EqPtr = "eqptr", 2, commutative;
    Neq32 = "neq32", 2, commutative;
    Neq32F = "neq32f", 2, commutative;
    Less32 = "less32", 2;
    Less32U = "less32u", 2;
    Less32F = "less32f", 2;
    Leq32 = "leq32", 2;
    Leq32U = "leq32u", 2;
    Leq32F = "leq32f", 2;
    Greater32 = "greater32", 2;
    Greater32U = "greater32u", 2;
    Greater32F = "greater32f", 2;
    Geq32 = "geq32", 2;
    Geq32U = "geq32u", 2;
    Geq32F = "geq32f", 2;

    // Conversions.
    SignExt8to32 = "signext8to32", 1;
    SignExt16to32 = "signext16to32", 1;
    ZeroExt8to32 = "zeroext8to32", 1;
    ZeroExt16to32 = "zeroext16to32", 1;
    Trunc32to8 = "trunc32to8", 1;
    Trunc32to16 = "trunc32to16", 1;
    Cvt32to32F = "cvt32to32f", 1;
    Cvt32Fto32 = "cvt32fto32", 1;

    // Memory. Loads take (ptr, mem); stores take (ptr, val, mem) and
    // produce the new mem.
    Load = "load", 2;
    Store = "store", 3, effect;
    Move = "move", 3, effect;
    Zero = "zero", 2, effect;
    Addr = "addr", 1;
    OffPtr = "offptr", 1;
    IsNonNil = "isnonnil", 1;
    NilCheck = "nilcheck", 2, effect;
    StaticCall = "staticcall", 1, call, effect;

    // MIPS32 integer ops.
    MipsAdd = "mips_add", 2, commutative;
    MipsAddConst = "mips_addconst", 1;
    MipsSub = "mips_sub", 2;
    MipsMul = "mips_mul", 2, commutative;
    MipsDiv = "mips_div", 2;
    MipsDivu = "mips_divu", 2;
    MipsAnd = "mips_and", 2, commutative;
    MipsAndConst = "mips_andconst", 1;
    MipsOr = "mips_or", 2, commutative;
    MipsOrConst = "mips_orconst", 1;
    MipsXor = "mips_xor", 2, commutative;
    MipsXorConst = "mips_xorconst", 1;
    MipsNor = "mips_nor", 2, commutative;
    MipsNeg = "mips_neg", 1;
    MipsSll = "mips_sll", 2;
    MipsSllConst = "mips_sllconst", 1;
    MipsSrl = "mips_srl", 2;
    MipsSrlConst = "mips_srlconst", 1;
    MipsSra = "mips_sra", 2;
    MipsSraConst = "mips_sraconst", 1;

    // Conditional move: arg2 == 0 picks arg1, otherwise arg0 survives.
    // The hardware writes the destination only on the zero case, so the
    // destination register must start out holding arg0.
    MipsCmovz = "mips_cmovz", 3, result_in_arg0;

    // MIPS32 comparisons. SGT-style: 1 if arg0 > arg1.
    MipsSgt = "mips_sgt", 2;
    MipsSgtConst = "mips_sgtconst", 1;
    MipsSgtZero = "mips_sgtzero", 1;
    MipsSgtu = "mips_sgtu", 2;
    MipsSgtuConst = "mips_sgtuconst", 1;
    MipsSgtuZero = "mips_sgtuzero", 1;

    // MIPS32 float ops and the FP condition flag.
    MipsAddF = "mips_addf", 2, commutative;
    MipsSubF = "mips_subf", 2;
    MipsMulF = "mips_mulf", 2, commutative;
    MipsDivF = "mips_divf", 2;
    MipsNegF = "mips_negf", 1;
    MipsCmpEqF = "mips_cmpeqf", 2, commutative;
    MipsCmpGtF = "mips_cmpgtf", 2;
    MipsCmpGeF = "mips_cmpgef", 2;
    MipsFpFlagTrue = "mips_fpflagtrue", 1;
    MipsFpFlagFalse = "mips_fpflagfalse", 1;
    MipsMovwF = "mips_movwf", 1;
    MipsTruncFW = "mips_truncfw", 1;

    // MIPS32 constants, addresses, and memory.
    MipsMovwConst = "mips_movwconst", 0;
    MipsMovfConst = "mips_movfconst", 0;
    MipsMovwAddr = "mips_movwaddr", 1;
    MipsMovbLoad = "mips_movbload", 2;
    MipsMovbuLoad = "mips_movbuload", 2;
    MipsMovhLoad = "mips_movhload", 2;
    MipsMovhuLoad = "mips_movhuload", 2;
    MipsMovwLoad = "mips_movwload", 2;
    MipsMovfLoad = "mips_movfload", 2;
    MipsMovbStore = "mips_movbstore", 3, effect;
    MipsMovhStore = "mips_movhstore", 3, effect;
    MipsMovwStore = "mips_movwstore", 3, effect;
    MipsMovfStore = "mips_movfstore", 3, effect;

    // MIPS32 pseudo-ops lowered late.
    MipsCallStatic = "mips_callstatic", 1, call, effect;
    MipsLoweredNilCheck = "mips_nilcheck", 2, effect;
    MipsLoweredZero = "mips_loweredzero", 2, effect;
    MipsLoweredMove = "mips_loweredmove", 3, effect;
}

impl Op {
    pub fn is_commutative(self) -> bool {
        self.info().commutative
    }

    pub fn is_call(self) -> bool {
        self.info().call
    }

    pub fn has_effect(self) -> bool {
        self.info().effect
    }

    /// Whether this op is a constant whose value is `aux_int`.
    pub fn is_const(self) -> bool {
        matches!(
            self,
            Op::Const8
                | Op::Const16
                | Op::Const32
                | Op::Const32F
                | Op::ConstBool
                | Op::ConstNil
                | Op::MipsMovwConst
                | Op::MipsMovfConst
        )
    }

    /// Memory-reading MIPS ops whose displacement lives in `aux_int`.
    pub fn is_mips_load(self) -> bool {
        matches!(
            self,
            Op::MipsMovbLoad
                | Op::MipsMovbuLoad
                | Op::MipsMovhLoad
                | Op::MipsMovhuLoad
                | Op::MipsMovwLoad
                | Op::MipsMovfLoad
        )
    }

    /// Memory-writing MIPS ops whose displacement lives in `aux_int`.
    pub fn is_mips_store(self) -> bool {
        matches!(
            self,
            Op::MipsMovbStore | Op::MipsMovhStore | Op::MipsMovwStore | Op::MipsMovfStore
        )
    }
}

impl core::fmt::Display for Op {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.info().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_arg_len() {
        assert_eq!(Op::Add32.info().arg_len, 2);
        assert_eq!(Op::Phi.info().arg_len, -1);
        assert_eq!(Op::Store.info().arg_len, 3);
        assert_eq!(Op::Const32.info().arg_len, 0);
    }

    #[test]
    fn test_flags() {
        assert!(Op::Add32.is_commutative());
        assert!(!Op::Sub32.is_commutative());
        assert!(Op::StaticCall.is_call());
        assert!(Op::Store.has_effect());
        assert!(!Op::Load.has_effect());
    }

    #[test]
    fn test_from_name_roundtrip() {
        for &op in Op::ALL {
            assert_eq!(Op::from_name(op.info().name), Some(op));
        }
        assert_eq!(Op::from_name("nosuchop"), None);
    }

    #[test]
    fn test_mips_mem_classes() {
        assert!(Op::MipsMovwLoad.is_mips_load());
        assert!(Op::MipsMovbStore.is_mips_store());
        assert!(!Op::MipsAdd.is_mips_load());
    }
}
