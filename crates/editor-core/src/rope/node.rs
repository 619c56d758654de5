//! AVL-balanced rope nodes.
//!
//! Every subtree is exclusively owned by its parent. Rotations and joins take
//! their inputs by value and hand back a freshly assembled subtree, so no node
//! is ever observable half-rotated.

pub(crate) type Link = Option<Box<Node>>;

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Leaf {
        text: String,
        /// Length of `text` in chars.
        chars: usize,
    },
    Branch {
        left: Box<Node>,
        right: Box<Node>,
        /// Total length of `left`, used to route index lookups.
        weight: usize,
        total: usize,
        height: usize,
    },
}

/*

====================
===== CREATION =====
====================

*/

impl Node {
    pub(crate) fn leaf(text: String) -> Box<Node> {
        let chars = text.chars().count();

        Box::new(Node::Leaf { text, chars })
    }

    /// Joins two subtrees under a new branch and computes its caches. Does not
    /// rebalance.
    pub(crate) fn branch(left: Box<Node>, right: Box<Node>) -> Box<Node> {
        let weight = left.len();
        let total = weight + right.len();
        let height = 1 + std::cmp::max(left.height(), right.height());

        Box::new(Node::Branch {
            left,
            right,
            weight,
            total,
            height,
        })
    }
}

/*

==========================
===== INLINE GETTERS =====
==========================

*/

impl Node {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        match self {
            Node::Leaf { chars, .. } => *chars,
            Node::Branch { total, .. } => *total,
        }
    }

    #[inline]
    pub(crate) fn height(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Branch { height, .. } => *height,
        }
    }

    #[inline]
    pub(crate) fn balance_factor(&self) -> isize {
        match self {
            Node::Leaf { .. } => 0,
            #[allow(clippy::cast_possible_wrap)]
            Node::Branch { left, right, .. } => left.height() as isize - right.height() as isize,
        }
    }
}

#[inline]
pub(crate) fn height(link: &Link) -> usize {
    link.as_ref().map_or(0, |node| node.height())
}

/*

=====================
===== ROTATIONS =====
=====================

*/

/// `(a, b), c` becomes `a, (b, c)`.
pub(crate) fn rotate_right(node: Box<Node>) -> Box<Node> {
    match *node {
        Node::Branch { left, right, .. } => match *left {
            Node::Branch {
                left: a, right: b, ..
            } => Node::branch(a, Node::branch(b, right)),
            leaf @ Node::Leaf { .. } => Node::branch(Box::new(leaf), right),
        },
        leaf @ Node::Leaf { .. } => Box::new(leaf),
    }
}

/// `a, (b, c)` becomes `(a, b), c`.
pub(crate) fn rotate_left(node: Box<Node>) -> Box<Node> {
    match *node {
        Node::Branch { left, right, .. } => match *right {
            Node::Branch {
                left: b, right: c, ..
            } => Node::branch(Node::branch(left, b), c),
            leaf @ Node::Leaf { .. } => Node::branch(left, Box::new(leaf)),
        },
        leaf @ Node::Leaf { .. } => Box::new(leaf),
    }
}

/// Brings a branch whose children are balanced, and whose balance factor is
/// within `[-2, 2]`, back into `[-1, 1]`.
pub(crate) fn balance(node: Box<Node>) -> Box<Node> {
    let factor = node.balance_factor();

    if (-1..=1).contains(&factor) {
        return node;
    }

    match *node {
        Node::Branch { left, right, .. } if factor > 1 => {
            let left = if left.balance_factor() < 0 {
                rotate_left(left)
            } else {
                left
            };

            rotate_right(Node::branch(left, right))
        }
        Node::Branch { left, right, .. } => {
            let right = if right.balance_factor() > 0 {
                rotate_right(right)
            } else {
                right
            };

            rotate_left(Node::branch(left, right))
        }
        leaf @ Node::Leaf { .. } => Box::new(leaf),
    }
}

/*

========================
===== JOIN / SPLIT =====
========================

*/

/// Concatenates two balanced trees into one balanced tree.
///
/// When the heights differ by more than one, the shorter tree is joined into
/// the taller one's facing spine and every level is rebalanced on the way up,
/// which keeps the cost at O(height difference).
pub(crate) fn join(a: Box<Node>, b: Box<Node>) -> Box<Node> {
    let (ha, hb) = (a.height(), b.height());

    if ha > hb + 1 {
        return match *a {
            Node::Branch { left, right, .. } => balance(Node::branch(left, join(right, b))),
            leaf @ Node::Leaf { .. } => Node::branch(Box::new(leaf), b),
        };
    }

    if hb > ha + 1 {
        return match *b {
            Node::Branch { left, right, .. } => balance(Node::branch(join(a, left), right)),
            leaf @ Node::Leaf { .. } => Node::branch(a, Box::new(leaf)),
        };
    }

    Node::branch(a, b)
}

pub(crate) fn concat(a: Link, b: Link) -> Link {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(join(a, b)),
    }
}

/// Partitions `link` at char `index`: the left part holds the first `index`
/// chars. Indices past the end put everything on the left.
pub(crate) fn split(link: Link, index: usize) -> (Link, Link) {
    let Some(node) = link else {
        return (None, None);
    };

    if index == 0 {
        return (None, Some(node));
    }
    if index >= node.len() {
        return (Some(node), None);
    }

    match *node {
        Node::Leaf { text, .. } => {
            let at = byte_offset(&text, index);
            let (left, right) = text.split_at(at);

            (Some(Node::leaf(left.to_owned())), Some(Node::leaf(right.to_owned())))
        }
        Node::Branch {
            left,
            right,
            weight,
            ..
        } => {
            if index < weight {
                let (left_left, left_right) = split(Some(left), index);

                (left_left, concat(left_right, Some(right)))
            } else {
                let (right_left, right_right) = split(Some(right), index - weight);

                (concat(Some(left), right_left), right_right)
            }
        }
    }
}

/// Builds a balanced tree over `leaves`, keeping their order.
pub(crate) fn build(mut leaves: Vec<Box<Node>>) -> Link {
    match leaves.len() {
        0 => None,
        1 => leaves.pop(),
        len => {
            let right = leaves.split_off(len / 2);

            concat(build(leaves), build(right))
        }
    }
}

/// Cuts `text` into leaves of at most `leaf_size` chars.
pub(crate) fn chunk_leaves(text: &str, leaf_size: usize) -> Vec<Box<Node>> {
    let leaf_size = leaf_size.max(1);
    let mut leaves = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let at = byte_offset(rest, leaf_size);
        let (head, tail) = rest.split_at(at);

        leaves.push(Box::new(Node::Leaf {
            text: head.to_owned(),
            chars: head.chars().count(),
        }));
        rest = tail;
    }

    leaves
}

/// Byte offset of char `index` in `text`, or its length if `index` is past the end.
#[inline]
fn byte_offset(text: &str, index: usize) -> usize {
    text.char_indices()
        .nth(index)
        .map_or(text.len(), |(offset, _)| offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(link: &Link) -> String {
        fn walk(node: &Node, out: &mut String) {
            match node {
                Node::Leaf { text, .. } => out.push_str(text),
                Node::Branch { left, right, .. } => {
                    walk(left, out);
                    walk(right, out);
                }
            }
        }

        let mut out = String::new();
        if let Some(node) = link {
            walk(node, &mut out);
        }
        out
    }

    fn leaves_of(text: &str) -> Vec<Box<Node>> {
        chunk_leaves(text, 1)
    }

    #[test]
    fn branch_caches_weight_total_height() {
        let node = Node::branch(Node::leaf("ab".into()), Node::leaf("cde".into()));

        match *node {
            Node::Branch {
                weight,
                total,
                height,
                ..
            } => {
                assert_eq!(weight, 2);
                assert_eq!(total, 5);
                assert_eq!(height, 2);
            }
            Node::Leaf { .. } => panic!("expected a branch"),
        }
    }

    #[test]
    fn rotations_preserve_order() {
        let left_heavy = Node::branch(
            Node::branch(Node::leaf("a".into()), Node::leaf("b".into())),
            Node::leaf("c".into()),
        );
        let rotated = rotate_right(left_heavy);

        assert_eq!(text_of(&Some(rotated.clone())), "abc");
        assert_eq!(rotated.balance_factor(), -1);

        let back = rotate_left(rotated);

        assert_eq!(text_of(&Some(back.clone())), "abc");
        assert_eq!(back.balance_factor(), 1);
    }

    #[test]
    fn join_tall_and_short_stays_balanced() {
        let tall = build(leaves_of(&"x".repeat(64))).unwrap();
        let short = Node::leaf("y".into());
        let joined = join(tall, short);

        assert!(joined.balance_factor().abs() <= 1);
        assert_eq!(joined.len(), 65);
        assert!(text_of(&Some(joined)).ends_with("xy"));
    }

    #[test]
    fn double_rotation_when_child_leans_the_other_way() {
        // Right child leans left: a single left rotation would not fix it.
        let node = Node::branch(
            Node::leaf("a".into()),
            Node::branch(
                Node::branch(Node::leaf("b".into()), Node::leaf("c".into())),
                Node::leaf("d".into()),
            ),
        );
        let balanced = balance(node);

        assert_eq!(balanced.height(), 3);
        assert_eq!(balanced.balance_factor(), 0);
        assert_eq!(text_of(&Some(balanced)), "abcd");
    }

    #[test]
    fn split_leaf_on_char_boundary() {
        let (left, right) = split(Some(Node::leaf("héllo".into())), 2);

        assert_eq!(text_of(&left), "hé");
        assert_eq!(text_of(&right), "llo");
    }

    #[test]
    fn split_at_edges_yields_none() {
        let (left, right) = split(Some(Node::leaf("abc".into())), 0);
        assert!(left.is_none());
        assert_eq!(text_of(&right), "abc");

        let (left, right) = split(Some(Node::leaf("abc".into())), 99);
        assert_eq!(text_of(&left), "abc");
        assert!(right.is_none());

        assert!(matches!(split(None, 3), (None, None)));
    }

    #[test]
    fn chunk_leaves_respects_size() {
        let leaves = chunk_leaves("abcdefg", 3);
        let texts: Vec<String> = leaves
            .into_iter()
            .map(|leaf| text_of(&Some(leaf)))
            .collect();

        assert_eq!(texts, vec!["abc", "def", "g"]);
        assert!(chunk_leaves("", 3).is_empty());
    }

    #[test]
    fn build_is_balanced_and_ordered() {
        let tree = build(leaves_of("abcdefghijklmnopq"));

        assert_eq!(text_of(&tree), "abcdefghijklmnopq");
        assert_eq!(height(&tree), 6);
    }
}
