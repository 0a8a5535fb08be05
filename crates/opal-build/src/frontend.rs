//! The frontend helper interface.

use opal_ir::{SourcePos, Symbol, Type};

/// Services the backend requests from the front end on demand.
///
/// The backend never allocates frontend objects itself: fresh stack slots,
/// aggregate sub-slots, and runtime helpers all come from here, and source
/// errors flow back through `error` so the driver can keep compiling
/// sibling functions.
pub trait Frontend {
    /// Allocate a fresh local slot of the given type.
    fn auto(&mut self, ty: Type) -> Symbol;

    /// A slot describing the subfield of `parent` at `off`.
    fn split_slot(&mut self, parent: Symbol, off: i64, ty: Type) -> Symbol;

    /// Look up a runtime helper by name.
    fn syslook(&mut self, name: &str) -> Symbol;

    /// Report a source-level error at `pos`.
    fn error(&mut self, pos: SourcePos, msg: &str);

    /// Optional diagnostic logging.
    fn log(&mut self, _msg: &str) {}
}
