//! A plain tree of nodes with depth-first search helpers.
//!
//! Used for markup documents handed to the import collaborator, where
//! nested elements (for example embedded `image` tags) must be found and
//! annotated in document order.

use serde::{Deserialize, Serialize};

/// A node carrying `value` and an ordered list of children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node<T> {
    /// Payload.
    pub value: T,
    /// Children, in document order.
    pub children: Vec<Self>,
}

impl<T> Node<T> {
    /// A node without children.
    #[must_use]
    pub const fn leaf(value: T) -> Self {
        Self {
            value,
            children: Vec::new(),
        }
    }

    /// A node with the given children.
    #[must_use]
    pub const fn with_children(value: T, children: Vec<Self>) -> Self {
        Self { value, children }
    }

    /// Append a child, returning `self` for chaining.
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Total number of nodes in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(Self::len).sum::<usize>()
    }

    /// Always `false`: a tree has at least its root.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Pre-order iterator over every node.
    pub fn iter(&self) -> DepthFirst<'_, T> {
        DepthFirst { stack: vec![self] }
    }

    /// References to every node whose value matches `pred`, in
    /// pre-order (parents before children, siblings left to right).
    pub fn collect_depth_first(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<&Self> {
        self.iter().filter(|n| pred(&n.value)).collect()
    }

    /// Visit every matching node mutably, in pre-order.
    pub fn for_each_match_mut(
        &mut self,
        pred: &mut impl FnMut(&T) -> bool,
        visit: &mut impl FnMut(&mut T),
    ) {
        if pred(&self.value) {
            visit(&mut self.value);
        }
        for child in &mut self.children {
            child.for_each_match_mut(pred, visit);
        }
    }

    /// Transform every value, keeping the shape.
    #[must_use]
    pub fn map<U>(self, f: &mut impl FnMut(T) -> U) -> Node<U> {
        Node {
            value: f(self.value),
            children: self.children.into_iter().map(|c| c.map(f)).collect(),
        }
    }
}

/// Pre-order traversal; see [`Node::iter`].
#[derive(Debug)]
pub struct DepthFirst<'a, T> {
    stack: Vec<&'a Node<T>>,
}

impl<'a, T> Iterator for DepthFirst<'a, T> {
    type Item = &'a Node<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

impl<'a, T> IntoIterator for &'a Node<T> {
    type Item = &'a Node<T>;
    type IntoIter = DepthFirst<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
