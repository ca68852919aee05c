//! Backward operation trait

use super::Tensor;

/// A node on the gradient tape.
///
/// Implementations read the gradient accumulated on their result and push
/// the local gradient into each input that requires one. They never recurse:
/// [`backward`](super::backward) visits every node exactly once, after all
/// of its consumers have run.
pub trait BackwardOp {
    /// Tensors this node was computed from
    fn inputs(&self) -> Vec<&Tensor>;

    /// Perform backward pass
    fn backward(&self);
}
