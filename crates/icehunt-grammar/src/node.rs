//! The grammar program tree.

use std::collections::HashSet;
use std::rc::Rc;

/// Shared handle to a tree node. Identity (not structural equality) is what
/// the engine keys on: `Rc::ptr_eq` decides whether two handles name the
/// same node.
pub type NodeRef = Rc<Node>;

/// One node of a grammar program tree: a literal text fragment plus an
/// ordered list of children.
///
/// A *fixed* node is immutable under mutation — the keywords and
/// punctuation a production stamps out stay frozen, while its slots remain
/// open for further expansion.
#[derive(Debug)]
pub struct Node {
    text: String,
    children: Vec<NodeRef>,
    fixed: bool,
}

impl Node {
    /// An empty, expandable node — the seed of every grammar test case.
    pub fn empty() -> NodeRef {
        Rc::new(Node {
            text: String::new(),
            children: Vec::new(),
            fixed: false,
        })
    }

    /// An expandable leaf carrying default text that renders until the leaf
    /// is expanded away.
    pub fn slot(text: impl Into<String>) -> NodeRef {
        Rc::new(Node {
            text: text.into(),
            children: Vec::new(),
            fixed: false,
        })
    }

    /// A frozen literal fragment; never selected for mutation.
    pub fn fixed(text: impl Into<String>) -> NodeRef {
        Rc::new(Node {
            text: text.into(),
            children: Vec::new(),
            fixed: true,
        })
    }

    /// An interior node over an ordered child sequence.
    pub fn seq(children: Vec<NodeRef>) -> NodeRef {
        Rc::new(Node {
            text: String::new(),
            children,
            fixed: false,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[NodeRef] {
        &self.children
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Structural primitive: a new node equal to `self` with child `i`
    /// replaced by `child`. Every other child is shared with the receiver.
    pub fn set_child(&self, i: usize, child: NodeRef) -> NodeRef {
        let mut children = self.children.clone();
        children[i] = child;
        Rc::new(Node {
            text: self.text.clone(),
            children,
            fixed: self.fixed,
        })
    }

    /// Render the subtree: this node's fragment followed by the rendered
    /// children, in order.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.size());
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(&self.text);
        for child in &self.children {
            child.render_into(out);
        }
    }

    /// Textual size when flattened (used to report how large test cases
    /// have grown).
    pub fn size(&self) -> usize {
        self.text.len() + self.children.iter().map(|c| c.size()).sum::<usize>()
    }
}

/// Return a new root identical to `root` except that the single occurrence
/// of `target` (by identity) is replaced by `replacement`.
///
/// Only the spine from the root down to the match is copied; siblings are
/// shared. The walk short-circuits after the first child whose subtree
/// changed, so a tree holding several identity-equal references to `target`
/// would only have the first matching path rewritten. Trees built through
/// [`MutationTable::mutate`](crate::rules::MutationTable::mutate) allocate
/// every node fresh, so the single-occurrence contract holds there by
/// construction.
///
/// If `target` does not occur under `root`, the original root is returned
/// unchanged (identity-equal to the input).
pub fn replace(root: &NodeRef, target: &NodeRef, replacement: &NodeRef) -> NodeRef {
    if Rc::ptr_eq(root, target) {
        return Rc::clone(replacement);
    }

    for i in 0..root.children.len() {
        let child = &root.children[i];
        let new_child = replace(child, target, replacement);
        if !Rc::ptr_eq(&new_child, child) {
            return root.set_child(i, new_child);
        }
    }

    Rc::clone(root)
}

/// Every expandable leaf of the tree: childless and not fixed.
///
/// Agenda traversal with an identity-keyed visited set; the order of the
/// result is unspecified and the caller picks uniformly at random.
pub fn find_leaves(root: &NodeRef) -> Vec<NodeRef> {
    let mut result = Vec::new();
    let mut seen: HashSet<usize> = HashSet::new();
    let mut todo = vec![Rc::clone(root)];

    while let Some(n) = todo.pop() {
        if !seen.insert(Rc::as_ptr(&n) as usize) {
            continue;
        }

        if n.children.is_empty() && !n.fixed {
            result.push(Rc::clone(&n));
        }

        todo.extend(n.children.iter().cloned());
    }

    result
}
