use std::fmt;
use std::sync::Arc;

use crate::core::{Result, Value};
use crate::records::RecordCollection;

use super::signature::{MethodArg, MethodArgs, Signature};

/// A layer normalized to the uniform `(receiver, args) -> value` shape.
pub type LayerFn = Arc<dyn Fn(&RecordCollection, Vec<Value>) -> Result<Value> + Send + Sync>;

/// Normalize a typed layer so the stack can be walked generically.
pub(crate) fn normalize<A, R, F>(f: F) -> LayerFn
where
    A: MethodArgs,
    R: MethodArg,
    F: Fn(&RecordCollection, A) -> Result<R> + Send + Sync + 'static,
{
    Arc::new(move |rs: &RecordCollection, args: Vec<Value>| {
        let args = A::from_values(args)?;
        f(rs, args).map(MethodArg::into_value)
    })
}

/// One contributed implementation of a method, tagged with the model or mixin
/// that contributed it.
#[derive(Clone)]
pub struct Layer {
    pub(crate) origin: String,
    pub(crate) func: LayerFn,
}

impl Layer {
    pub(crate) fn new(origin: &str, func: LayerFn) -> Self {
        Self {
            origin: origin.to_string(),
            func,
        }
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layer({})", self.origin)
    }
}

/// Declared but not yet composed method: signature plus layers, bottom first.
#[derive(Clone, Debug)]
pub(crate) struct MethodDecl {
    pub(crate) signature: Signature,
    pub(crate) layers: Vec<Layer>,
}

/// A composed layer holding the captured next layer down.
pub struct LayerNode {
    origin: String,
    func: LayerFn,
    next: Option<Arc<LayerNode>>,
}

impl LayerNode {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn next(&self) -> Option<&Arc<LayerNode>> {
        self.next.as_ref()
    }

    pub(crate) fn invoke(
        self: &Arc<Self>,
        method: &Arc<str>,
        rs: &RecordCollection,
        args: Vec<Value>,
    ) -> Result<Value> {
        let frame = CallFrame {
            method: Arc::clone(method),
            node: Arc::clone(self),
        };
        let receiver = rs.push_frame(frame);
        (self.func)(&receiver, args)
    }
}

/// Entry of the per-handle call stack used to resolve `super_call`.
#[derive(Clone)]
pub struct CallFrame {
    pub(crate) method: Arc<str>,
    pub(crate) node: Arc<LayerNode>,
}

impl CallFrame {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn layer(&self) -> &LayerNode {
        &self.node
    }
}

impl fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.method, self.node.origin)
    }
}

/// Frozen stack of layers of one method on one model.
pub struct MethodStack {
    name: Arc<str>,
    signature: Signature,
    top: Option<Arc<LayerNode>>,
}

impl MethodStack {
    /// Compose `layers` (bottom first) into a linked chain where every node
    /// captures the one beneath it.
    pub(crate) fn compose(name: &str, signature: Signature, layers: Vec<Layer>) -> Self {
        let top = layers.into_iter().fold(None, |next, layer| {
            Some(Arc::new(LayerNode {
                origin: layer.origin,
                func: layer.func,
                next,
            }))
        });
        Self {
            name: Arc::from(name),
            signature,
            top,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn top(&self) -> Option<&Arc<LayerNode>> {
        self.top.as_ref()
    }

    /// Origins of the layers from top to bottom.
    pub fn origins(&self) -> Vec<&str> {
        let mut origins = Vec::new();
        let mut node = self.top.as_ref();
        while let Some(current) = node {
            origins.push(current.origin());
            node = current.next();
        }
        origins
    }

    pub fn depth(&self) -> usize {
        self.origins().len()
    }
}

impl fmt::Debug for MethodStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodStack")
            .field("name", &self.name)
            .field("signature", &self.signature.to_string())
            .field("layers", &self.origins())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> LayerFn {
        Arc::new(|_rs: &RecordCollection, _args: Vec<Value>| Ok(Value::Null))
    }

    #[test]
    fn test_compose_puts_last_layer_on_top() {
        let stack = MethodStack::compose(
            "greet",
            Signature::of::<(), String>(),
            vec![Layer::new("Base", noop()), Layer::new("MixinA", noop()), Layer::new("User", noop())],
        );
        assert_eq!(stack.origins(), vec!["User", "MixinA", "Base"]);
        assert_eq!(stack.depth(), 3);
        assert!(stack.top().unwrap().next().unwrap().next().unwrap().next().is_none());
    }

    #[test]
    fn test_empty_stack() {
        let stack = MethodStack::compose("noop", Signature::of::<(), ()>(), Vec::new());
        assert!(stack.top().is_none());
        assert!(stack.origins().is_empty());
    }
}
