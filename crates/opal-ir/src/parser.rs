//! Parser for the textual IR form.
//!
//! Accepts exactly what [`crate::print`] emits. Tests use this to write
//! readable fixtures; it is not the assembler's input language.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{map, map_res, opt, recognize},
    multi::separated_list1,
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::{
    block::BlockKind,
    func::Func,
    ids::{BlockId, ValueId},
    op::Op,
    sym::Symbol,
    types::Type,
    value::{Aux, ValueData},
};

/// Parse failure with the 1-based source line.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

struct ParsedValue {
    id: u32,
    op: Op,
    ty: Type,
    aux_int: i64,
    aux_sym: Option<u32>,
    args: Vec<u32>,
}

struct ParsedBlock {
    id: u32,
    kind: BlockKind,
    controls: Vec<u32>,
    succs: Vec<u32>,
    values: Vec<ParsedValue>,
}

fn ident(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')(input)
}

fn number_u32(input: &str) -> IResult<&str, u32> {
    map_res(digit1, |s: &str| s.parse::<u32>())(input)
}

fn number_i64(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
        s.parse::<i64>()
    })(input)
}

fn vref(input: &str) -> IResult<&str, u32> {
    preceded(char('v'), number_u32)(input)
}

fn bref(input: &str) -> IResult<&str, u32> {
    preceded(char('b'), number_u32)(input)
}

fn type_name(name: &str) -> Option<Type> {
    Some(match name {
        "i8" => Type::I8,
        "i16" => Type::I16,
        "i32" => Type::I32,
        "u8" => Type::U8,
        "u16" => Type::U16,
        "u32" => Type::U32,
        "f32" => Type::F32,
        "bool" => Type::BOOL,
        "ptr" => Type::PTR,
        "mem" => Type::MEM,
        "flags" => Type::FLAGS,
        "tuple" => Type::TUPLE,
        "void" => Type::VOID,
        _ => return None,
    })
}

fn block_kind(name: &str) -> Option<BlockKind> {
    Some(match name {
        "plain" => BlockKind::Plain,
        "if" => BlockKind::If,
        "exit" => BlockKind::Exit,
        "call" => BlockKind::Call,
        "first" => BlockKind::First,
        "eq" => BlockKind::Eq,
        "ne" => BlockKind::Ne,
        "ltz" => BlockKind::Ltz,
        "lez" => BlockKind::Lez,
        "gtz" => BlockKind::Gtz,
        "gez" => BlockKind::Gez,
        "fpt" => BlockKind::Fpt,
        "fpf" => BlockKind::Fpf,
        _ => return None,
    })
}

/// `vN = op.ty [aux_int] {sym} v1, v2`
fn value_line(input: &str) -> IResult<&str, ParsedValue> {
    let (input, id) = preceded(space0, vref)(input)?;
    let (input, _) = delimited(space0, char('='), space0)(input)?;
    let (input, op_name) = ident(input)?;
    let (input, _) = char('.')(input)?;
    let (input, ty_name) = ident(input)?;
    let (input, aux_int) = opt(preceded(
        space1,
        delimited(char('['), number_i64, char(']')),
    ))(input)?;
    let (input, aux_sym) = opt(preceded(
        space1,
        delimited(char('{'), number_u32, char('}')),
    ))(input)?;
    let (input, args) = opt(preceded(
        space1,
        separated_list1(delimited(space0, char(','), space0), vref),
    ))(input)?;

    let op = Op::from_name(op_name).ok_or_else(|| {
        nom::Err::Error(nom::error::Error::new(op_name, nom::error::ErrorKind::Tag))
    })?;
    let ty = type_name(ty_name).ok_or_else(|| {
        nom::Err::Error(nom::error::Error::new(ty_name, nom::error::ErrorKind::Tag))
    })?;
    Ok((
        input,
        ParsedValue {
            id,
            op,
            ty,
            aux_int: aux_int.unwrap_or(0),
            aux_sym,
            args: args.unwrap_or_default(),
        },
    ))
}

/// `bN: kind (v0, v1) -> b1 b2`
fn block_header(input: &str) -> IResult<&str, ParsedBlock> {
    let (input, id) = bref(input)?;
    let (input, _) = pair(char(':'), space1)(input)?;
    let (input, kind_name) = ident(input)?;
    let (input, controls) = opt(preceded(
        space1,
        delimited(
            char('('),
            separated_list1(delimited(space0, char(','), space0), vref),
            char(')'),
        ),
    ))(input)?;
    let (input, succs) = opt(preceded(
        delimited(space0, tag("->"), space0),
        separated_list1(space1, bref),
    ))(input)?;

    let kind = block_kind(kind_name).ok_or_else(|| {
        nom::Err::Error(nom::error::Error::new(
            kind_name,
            nom::error::ErrorKind::Tag,
        ))
    })?;
    Ok((
        input,
        ParsedBlock {
            id,
            kind,
            controls: controls.unwrap_or_default(),
            succs: succs.unwrap_or_default(),
            values: Vec::new(),
        },
    ))
}

fn header_line(input: &str) -> IResult<&str, &str> {
    delimited(
        tag("function %"),
        map(
            take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
            |s| s,
        ),
        preceded(space1, char('{')),
    )(input)
}

enum Line {
    Header(String),
    Block(ParsedBlock),
    Value(ParsedValue),
    End,
}

fn classify(line: &str) -> Result<Option<Line>, ()> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed == "}" {
        return Ok(Some(Line::End));
    }
    if let Ok((rest, name)) = header_line(trimmed) {
        if rest.trim().is_empty() {
            return Ok(Some(Line::Header(String::from(name))));
        }
        return Err(());
    }
    if let Ok((rest, block)) = block_header(trimmed) {
        if rest.trim().is_empty() {
            return Ok(Some(Line::Block(block)));
        }
        return Err(());
    }
    if let Ok((rest, value)) = value_line(trimmed) {
        if rest.trim().is_empty() {
            return Ok(Some(Line::Value(value)));
        }
        return Err(());
    }
    Err(())
}

/// Parse one function from its textual form.
pub fn parse_func(input: &str) -> Result<Func, ParseError> {
    let mut name: Option<String> = None;
    let mut blocks: Vec<ParsedBlock> = Vec::new();

    for (lineno, raw) in input.lines().enumerate() {
        let line = lineno + 1;
        match classify(raw) {
            Ok(None) => {}
            Ok(Some(Line::Header(n))) => {
                if name.is_some() {
                    return Err(ParseError {
                        line,
                        message: String::from("duplicate function header"),
                    });
                }
                name = Some(n);
            }
            Ok(Some(Line::Block(b))) => blocks.push(b),
            Ok(Some(Line::Value(v))) => match blocks.last_mut() {
                Some(b) => b.values.push(v),
                None => {
                    return Err(ParseError {
                        line,
                        message: String::from("value before first block"),
                    })
                }
            },
            Ok(Some(Line::End)) => {}
            Err(()) => {
                return Err(ParseError {
                    line,
                    message: format!("unrecognized line: {:?}", raw.trim()),
                })
            }
        }
    }

    let name = name.ok_or(ParseError {
        line: 0,
        message: String::from("missing function header"),
    })?;
    if blocks.is_empty() || blocks[0].id != 0 {
        return Err(ParseError {
            line: 0,
            message: String::from("function must start with block b0"),
        });
    }

    build(&name, blocks)
}

fn build(name: &str, parsed: Vec<ParsedBlock>) -> Result<Func, ParseError> {
    let mut f = Func::new(name);

    let max_block = parsed.iter().map(|b| b.id).max().unwrap_or(0);
    while (f.num_blocks() as u32) <= max_block {
        f.add_block(BlockKind::Plain);
    }

    let max_value = parsed
        .iter()
        .flat_map(|b| b.values.iter())
        .map(|v| v.id)
        .max();
    if let Some(max_value) = max_value {
        while (f.num_values() as u32) <= max_value {
            let entry = f.entry;
            f.values.push(ValueData::new(Op::Invalid, Type::VOID, entry));
        }
    }

    for pb in &parsed {
        let b = BlockId::new(pb.id);
        f.block_mut(b).kind = pb.kind;
        for succ in &pb.succs {
            if *succ > max_block {
                return Err(ParseError {
                    line: 0,
                    message: format!("edge to undefined block b{}", succ),
                });
            }
            f.add_edge(b, BlockId::new(*succ));
        }
        for pv in &pb.values {
            let v = ValueId::new(pv.id);
            let data = f.value_mut(v);
            if data.op != Op::Invalid {
                return Err(ParseError {
                    line: 0,
                    message: format!("value v{} defined twice", pv.id),
                });
            }
            data.op = pv.op;
            data.ty = pv.ty;
            data.aux_int = pv.aux_int;
            data.aux = match pv.aux_sym {
                Some(s) => Aux::Sym(Symbol(s)),
                None => Aux::None,
            };
            data.args = pv.args.iter().map(|&a| ValueId::new(a)).collect();
            data.block = b;
            f.block_mut(b).values.push(v);
        }
    }

    for pb in &parsed {
        let b = BlockId::new(pb.id);
        for c in &pb.controls {
            f.set_control(b, ValueId::new(*c));
        }
    }

    Ok(f)
}
