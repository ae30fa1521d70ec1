//! Opaque parser interface the AST store consumes (§4.5, §9).
//!
//! The core never invokes a grammar directly — it consumes whatever
//! tree a parser hands it through [`ParseTree`], expressed as a
//! streaming `(node, enter/leave)` event iterator rather than a
//! recursive callback tree, per the design notes' "invert to a
//! streaming iterator" guidance. The default backend never produces a
//! tree (a parse failure degrades to "no structure", never a panic);
//! the real tree-sitter backend lives behind the `tree-sitter-parsing`
//! feature, off by default, exactly like the teacher's own parsing
//! module split.

use crate::types::ByteRange;

#[cfg(feature = "tree-sitter-parsing")]
mod tree_sitter_backend;
#[cfg(feature = "tree-sitter-parsing")]
pub use tree_sitter_backend::TreeSitterParser;

/// One syntax node's kind tag and byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub kind: String,
    pub range: ByteRange,
}

/// A single step of a depth-first walk over a parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Enter(NodeInfo),
    Leave(NodeInfo),
}

/// An opaque parsed tree. Backends own however they actually represent
/// nodes; the only thing the rest of the crate ever asks for is the
/// event stream.
pub trait ParseTree: Send + Sync {
    fn language(&self) -> &str;
    fn events(&self) -> Vec<NodeEvent>;
}

/// Something that turns source bytes into a [`ParseTree`]. A failed
/// parse returns `None` — the caller treats the file as having no
/// extractable structure (§7 "a failed parser yields a null AST").
pub trait Parser: Send + Sync {
    fn parse(&self, content: &[u8], language: &str) -> Option<Box<dyn ParseTree>>;
}

/// Backend that never produces a tree. Used whenever no real grammar
/// is wired in — compiling and testing the crate never requires the
/// `tree-sitter-parsing` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullParser;

impl Parser for NullParser {
    fn parse(&self, _content: &[u8], _language: &str) -> Option<Box<dyn ParseTree>> {
        None
    }
}
