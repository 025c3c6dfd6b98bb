//! Reuse of mask allocations across compilations.
//!
//! Heavy users compile short-lived masks per request; recycling the nodes
//! keeps the store capacity they grew. [`Pool::recycle`] takes the mask
//! *by value*, so handing a tree back statically ends every borrow of it
//! and reuse-after-recycle does not compile. Masks shared through the
//! [`Registry`](crate::Registry) live behind `Arc`s and are never
//! recycled.
//!
//! A pool is single-threaded by design; keep one per worker (or wrap one
//! in the locking of your choice).

use crate::mask::Mask;

/// Retention bound; recycling beyond it drops the surplus nodes.
const POOL_KEEP: usize = 256;

/// A free list of zeroed mask nodes.
#[derive(Debug, Default)]
pub struct Pool {
    free: Vec<Mask>,
}

impl Pool {
    pub fn new() -> Pool {
        Pool::default()
    }

    /// Nodes currently held.
    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Take one zeroed node, reusing retained capacity when stock exists.
    pub fn acquire(&mut self) -> Mask {
        self.free.pop().unwrap_or_default()
    }

    /// Dismantle `mask`: every node in the tree is reset and returned to
    /// the free list, up to the retention bound.
    pub fn recycle(&mut self, mask: Mask) {
        let mut pending = vec![mask];
        while let Some(mut node) = pending.pop() {
            node.detach_children(&mut |child| pending.push(*child));
            node.reset();
            if self.free.len() < POOL_KEEP {
                self.free.push(node);
            }
        }
    }
}
