//! Method layers: typed registration, normalization to a uniform shape and
//! composition into per-model stacks.

pub mod layer;
pub mod signature;

pub use layer::{CallFrame, Layer, LayerFn, LayerNode, MethodStack};
pub(crate) use layer::{MethodDecl, normalize};
pub use signature::{ArgKind, MethodArg, MethodArgs, Signature, Variadic};
