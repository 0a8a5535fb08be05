//! Emission output: the code buffer and the object sink it flows into.

use alloc::string::String;
use alloc::vec::Vec;

use opal_ir::{SourcePos, Symbol};

/// A call or address reference to be resolved by the linker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reloc {
    /// Word offset of the instruction to patch.
    pub offset: usize,
    pub sym: Symbol,
}

/// One instruction-offset-to-source-line record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    pub offset: usize,
    pub pos: SourcePos,
}

/// GC metadata for one safepoint (a call site): frame offsets of
/// pointer-typed slots live across it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePoint {
    pub offset: usize,
    pub live_ptr_offsets: Vec<i64>,
}

/// Machine code plus metadata for one function.
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    pub words: Vec<u32>,
    pub relocs: Vec<Reloc>,
    pub lines: Vec<LineEntry>,
    pub safepoints: Vec<SafePoint>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one instruction word, returning its offset.
    pub fn push(&mut self, word: u32) -> usize {
        self.words.push(word);
        self.words.len() - 1
    }

    /// Patch a previously emitted word.
    pub fn patch(&mut self, offset: usize, word: u32) {
        self.words[offset] = word;
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Where finished functions go. The concrete object-file writer lives in
/// the build driver; tests use [`VecSink`].
pub trait ObjectSink {
    fn define_func(&mut self, name: &str, code: CodeBuffer);
}

/// An in-memory sink.
#[derive(Debug, Default)]
pub struct VecSink {
    pub funcs: Vec<(String, CodeBuffer)>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectSink for VecSink {
    fn define_func(&mut self, name: &str, code: CodeBuffer) {
        self.funcs.push((String::from(name), code));
    }
}
