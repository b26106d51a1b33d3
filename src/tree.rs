//! Free tree — component C.
//!
//! A left-leaning red-black tree of free blocks ordered by the Triple-Key:
//! `(size, alignment quality, address)`. Grounded directly on
//! `original_source/arena.h`'s `insert`/`balance`/`detach`/`bestFit`: same
//! rotation/flip shapes, same "plain BST unlink plus one `balance()` call
//! at the root" detach strategy (the LLRB color invariants are allowed to
//! drift slightly after a delete; the next insert repairs them, per
//! spec.md §4.C/§9).

use core::cmp::Ordering;

use crate::block::Block;
use crate::header::Color;

fn key_cmp(a: Block, b: Block) -> Ordering {
    a.size()
        .cmp(&b.size())
        .then_with(|| a.alignment_quality().cmp(&b.alignment_quality()))
        .then_with(|| a.addr().cmp(&b.addr()))
}

fn is_red(node: Option<Block>) -> bool {
    matches!(node, Some(b) if b.color() == Color::Red)
}

fn rotate_left(node: Block) -> Block {
    let x = node.right().expect("rotate_left requires a right child");
    node.set_right(x.left());
    x.set_left(Some(node));
    x.set_color(node.color());
    node.set_color(Color::Red);
    x
}

fn rotate_right(node: Block) -> Block {
    let x = node.left().expect("rotate_right requires a left child");
    node.set_left(x.right());
    x.set_right(Some(node));
    x.set_color(node.color());
    node.set_color(Color::Red);
    x
}

fn flip_colors(node: Block) {
    let flip = |c: Color| match c {
        Color::Red => Color::Black,
        Color::Black => Color::Red,
    };
    node.set_color(flip(node.color()));
    if let Some(l) = node.left() {
        l.set_color(flip(l.color()));
    }
    if let Some(r) = node.right() {
        r.set_color(flip(r.color()));
    }
}

fn balance(mut node: Block) -> Block {
    if is_red(node.right()) && !is_red(node.left()) {
        node = rotate_left(node);
    }
    if is_red(node.left()) && is_red(node.left().unwrap().left()) {
        node = rotate_right(node);
    }
    if is_red(node.left()) && is_red(node.right()) {
        flip_colors(node);
    }
    node
}

/// Recursive LLRB insert. Returns the new subtree root.
pub(crate) fn insert(root: Option<Block>, new_block: Block) -> Block {
    let Some(root) = root else {
        new_block.set_left(None);
        new_block.set_right(None);
        new_block.set_color(Color::Red);
        return new_block;
    };

    match key_cmp(new_block, root) {
        Ordering::Less | Ordering::Equal => {
            root.set_left(Some(insert(root.left(), new_block)));
        }
        Ordering::Greater => {
            root.set_right(Some(insert(root.right(), new_block)));
        }
    }

    balance(root)
}

/// Walks the tree for the smallest block whose payload, once aligned up to
/// `alignment`, still has room for `size` bytes. See spec.md §4.C: a node
/// whose raw size is large enough but whose padding need is too big for
/// the fit is *not* a dead end — the secondary (alignment-quality) key
/// guarantees the right subtree holds equal-or-larger, better-aligned
/// candidates.
pub(crate) fn find_best_fit(root: Option<Block>, size: usize, alignment: usize) -> Option<Block> {
    let mut best: Option<Block> = None;
    let mut current = root;

    while let Some(node) = current {
        if node.size() < size {
            current = node.right();
            continue;
        }

        let payload = node.addr() + crate::header::BlockHeader::SIZE;
        let aligned = crate::util::align_up(payload, alignment);
        let padding = aligned - payload;

        if node.size() >= size + padding {
            let better = match best {
                None => true,
                Some(b) => node.size() < b.size(),
            };
            if better {
                best = Some(node);
            }
            current = node.left();
        } else {
            current = node.right();
        }
    }

    best
}

/// Finds `target` by its Triple-Key and unlinks it from the tree, returning
/// the new root (or `None` if the tree is now empty).
pub(crate) fn detach(root: Option<Block>, target: Block) -> Option<Block> {
    let mut parent: Option<Block> = None;
    let mut current = root;

    while let Some(node) = current {
        if node == target {
            break;
        }
        parent = Some(node);
        current = match key_cmp(target, node) {
            Ordering::Less | Ordering::Equal => node.left(),
            Ordering::Greater => node.right(),
        };
    }

    let Some(found) = current else {
        return root;
    };
    debug_assert!(found == target);

    let replacement = if found.right().is_none() {
        found.left()
    } else if found.left().is_none() {
        found.right()
    } else {
        let mut min_parent = found;
        let mut min_node = found.right().unwrap();
        while let Some(l) = min_node.left() {
            min_parent = min_node;
            min_node = l;
        }

        if min_parent != found {
            min_parent.set_left(min_node.right());
            min_node.set_right(found.right());
        }
        min_node.set_left(found.left());
        Some(min_node)
    };

    match parent {
        Some(p) => {
            if p.left() == Some(target) {
                p.set_left(replacement);
            } else {
                p.set_right(replacement);
            }
        }
        None => {
            // `replacement` becomes the new root below.
        }
    }

    target.set_left(None);
    target.set_right(None);
    target.set_color(Color::Red);

    let new_root = if parent.is_some() { root } else { replacement };
    new_root.map(balance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_block(buf: &mut [u8], offset: usize, size: usize) -> Block {
        let addr = buf.as_mut_ptr() as usize + offset;
        assert_eq!(addr % core::mem::align_of::<usize>(), 0);
        Block::init_free(addr, size, 8)
    }

    #[test]
    fn insert_and_best_fit_picks_smallest_sufficient() {
        let mut buf = vec![0u8; 4096];
        let a = make_block(&mut buf, 0, 32);
        let b = make_block(&mut buf, 64, 64);
        let c = make_block(&mut buf, 192, 128);

        let mut root = insert(None, a);
        root = insert(Some(root), b);
        root = insert(Some(root), c);

        let best = find_best_fit(Some(root), 50, 1).expect("should find a fit");
        assert_eq!(best.size(), 64);
    }

    #[test]
    fn detach_removes_target_and_keeps_rest_reachable() {
        let mut buf = vec![0u8; 4096];
        let a = make_block(&mut buf, 0, 32);
        let b = make_block(&mut buf, 64, 64);
        let c = make_block(&mut buf, 192, 128);

        let mut root = insert(None, a);
        root = insert(Some(root), b);
        root = insert(Some(root), c);

        let root = detach(Some(root), b);
        let best = find_best_fit(root, 50, 1);
        assert_eq!(best.unwrap().size(), 128);
    }
}
