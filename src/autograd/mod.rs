//! Tape-based autograd engine
//!
//! Every differentiable op produces a [`Tensor`] carrying a [`BackwardOp`]
//! node. Quantizers plug into the same tape by registering nodes whose
//! backward rule is chosen analytically instead of derived from the forward
//! formula.

mod backward;
mod dense;
mod ops;
mod tensor;


pub use backward::BackwardOp;
pub use dense::{conv2d, linear, Conv2dShape};
pub use ops::*;
pub(crate) use ops::{max_abs, sign};
pub use tensor::{GradCell, Tensor};

use std::collections::HashSet;
use std::rc::Rc;

/// Perform backward pass on a tensor
///
/// Nodes run in reverse topological order, so a tensor consumed more than
/// once has its gradient fully accumulated before its own node runs.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        // Initialize with ones for scalar loss
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    let Some(root) = tensor.backward_op() else {
        return;
    };
    let order = topological_order(root);
    tracing::trace!(nodes = order.len(), "backward pass");
    for op in order.iter().rev() {
        op.backward();
    }
}

/// Nodes reachable from `root`, each once, with every node placed after the
/// nodes that produced its inputs.
fn topological_order(root: Rc<dyn BackwardOp>) -> Vec<Rc<dyn BackwardOp>> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![(root, false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node_id(&node)) {
            continue;
        }
        stack.push((Rc::clone(&node), true));
        for input in node.inputs() {
            if let Some(op) = input.backward_op() {
                if !visited.contains(&node_id(&op)) {
                    stack.push((op, false));
                }
            }
        }
    }

    order
}

fn node_id(op: &Rc<dyn BackwardOp>) -> *const () {
    Rc::as_ptr(op) as *const ()
}
