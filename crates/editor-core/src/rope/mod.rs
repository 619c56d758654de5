//! Height-balanced rope used as the text-mutation engine for edited lines.
//!
//! Positions are counted in chars. Out-of-range positions clamp: inserting
//! past the end appends, deleting past the end truncates, and splitting past
//! the end leaves the right side empty.

mod node;

use node::{Link, Node};

/// Default maximum leaf length, in chars.
pub const LEAF_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct Rope {
    root: Link,
    leaf_size: usize,
}

impl Default for Rope {
    fn default() -> Self {
        Self::new()
    }
}

/*

====================
===== CREATION =====
====================

*/

impl Rope {
    #[must_use]
    pub fn new() -> Self {
        Self::with_leaf_size(LEAF_SIZE)
    }

    /// Empty rope whose leaves hold at most `leaf_size` chars (at least one).
    #[must_use]
    pub fn with_leaf_size(leaf_size: usize) -> Self {
        Self {
            root: None,
            leaf_size: leaf_size.max(1),
        }
    }

    #[must_use]
    pub fn from_text(text: &str, leaf_size: usize) -> Self {
        let mut rope = Self::with_leaf_size(leaf_size);
        rope.root = node::build(node::chunk_leaves(text, rope.leaf_size));
        rope
    }
}

impl From<&str> for Rope {
    fn from(text: &str) -> Self {
        Self::from_text(text, LEAF_SIZE)
    }
}

impl From<String> for Rope {
    fn from(text: String) -> Self {
        Self::from_text(&text, LEAF_SIZE)
    }
}

/*

=====================
===== MUTATIONS =====
=====================

*/

impl Rope {
    /// Inserts `text` before char `index`.
    pub fn insert(&mut self, index: usize, text: &str) {
        if text.is_empty() {
            return;
        }

        let (left, right) = node::split(self.root.take(), index);
        let middle = node::build(node::chunk_leaves(text, self.leaf_size));

        self.root = node::concat(node::concat(left, middle), right);
    }

    /// Removes `length` chars starting at char `index`.
    pub fn delete(&mut self, index: usize, length: usize) {
        if length == 0 {
            return;
        }

        let (left, rest) = node::split(self.root.take(), index);
        let (_, right) = node::split(rest, length);

        self.root = node::concat(left, right);
    }

    /// Splits into the first `index` chars and the rest. Both halves keep this
    /// rope's leaf size.
    #[must_use]
    pub fn split(self, index: usize) -> (Rope, Rope) {
        let (left, right) = node::split(self.root, index);

        (
            Rope {
                root: left,
                leaf_size: self.leaf_size,
            },
            Rope {
                root: right,
                leaf_size: self.leaf_size,
            },
        )
    }

    /// Appends `other` to `self`. The result keeps `self`'s leaf size.
    #[must_use]
    pub fn concat(self, other: Rope) -> Rope {
        Rope {
            root: node::concat(self.root, other.root),
            leaf_size: self.leaf_size,
        }
    }
}

/*

==========================
===== INLINE GETTERS =====
==========================

*/

impl Rope {
    /// Length in chars.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.root.as_ref().map_or(0, |root| root.len())
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Tree height; 0 for an empty rope, 1 for a single leaf.
    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        node::height(&self.root)
    }

    #[inline]
    #[must_use]
    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.chunks().count()
    }

    /// Leaf fragments in order.
    #[must_use]
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            stack: self.root.as_deref().into_iter().collect(),
        }
    }

    /// Flattens the rope into one string.
    #[must_use]
    pub fn get_text(&self) -> String {
        let mut out = String::new();
        for chunk in self.chunks() {
            out.push_str(chunk);
        }
        out
    }

    /// True when every branch's children differ in height by at most one and
    /// every cached weight and total matches its subtree.
    #[cfg(test)]
    fn is_balanced(&self) -> bool {
        fn check(node: &Node) -> Option<(usize, usize)> {
            match node {
                Node::Leaf { text, chars } => {
                    (text.chars().count() == *chars).then_some((*chars, 1))
                }
                Node::Branch {
                    left,
                    right,
                    weight,
                    total,
                    height,
                } => {
                    let (left_len, left_height) = check(left)?;
                    let (right_len, right_height) = check(right)?;
                    let ok = left_height.abs_diff(right_height) <= 1
                        && *weight == left_len
                        && *total == left_len + right_len
                        && *height == 1 + left_height.max(right_height);

                    ok.then_some((*total, *height))
                }
            }
        }

        self.root.as_deref().is_none_or(|root| check(root).is_some())
    }
}

impl std::fmt::Display for Rope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for chunk in self.chunks() {
            f.write_str(chunk)?;
        }
        Ok(())
    }
}

/// In-order iterator over a rope's leaf fragments.
pub struct Chunks<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node {
                Node::Leaf { text, .. } => return Some(text),
                Node::Branch { left, right, .. } => {
                    self.stack.push(right);
                    self.stack.push(left);
                }
            }
        }

        None
    }
}
