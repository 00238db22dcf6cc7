//! Broad-phase pair management
//!
//! Wraps the dynamic tree with a move buffer: proxies that were created or
//! re-inserted since the last update are queried against the tree and the
//! resulting candidate pairs are reported once each.

use rigid2d_math::Vec2;

use crate::dynamic_tree::{DynamicTree, ProxyId};
use crate::shapes::{Aabb, RayCastInput};

#[derive(Clone, Debug)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    proxy_count: usize,
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<(ProxyId, ProxyId)>,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            proxy_count: 0,
            move_buffer: Vec::new(),
            pair_buffer: Vec::new(),
        }
    }

    /// Create a proxy; it will be paired on the next update
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> ProxyId {
        let id = self.tree.create_proxy(aabb, user_data);
        self.proxy_count += 1;
        self.move_buffer.push(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) {
        self.move_buffer.retain(|&m| m != id);
        self.proxy_count -= 1;
        self.tree.destroy_proxy(id);
    }

    /// Update a proxy's AABB; buffered for pairing if it was re-inserted
    pub fn move_proxy(&mut self, id: ProxyId, aabb: &Aabb, displacement: Vec2) {
        if self.tree.move_proxy(id, aabb, displacement) {
            self.move_buffer.push(id);
        }
    }

    /// Force a proxy to be re-paired on the next update
    pub fn touch_proxy(&mut self, id: ProxyId) {
        self.move_buffer.push(id);
    }

    pub fn fat_aabb(&self, id: ProxyId) -> &Aabb {
        self.tree.fat_aabb(id)
    }

    pub fn user_data(&self, id: ProxyId) -> Option<T> {
        self.tree.user_data(id)
    }

    /// Whether the fat AABBs of two proxies overlap
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.fat_aabb(a).overlaps(self.tree.fat_aabb(b))
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    /// Report each new candidate pair once, in sorted proxy order
    pub fn update_pairs<F>(&mut self, mut callback: F)
    where
        F: FnMut(T, T),
    {
        self.pair_buffer.clear();

        let moved = std::mem::take(&mut self.move_buffer);
        for &query_proxy in &moved {
            let tree = &self.tree;
            let pairs = &mut self.pair_buffer;
            let fat = *tree.fat_aabb(query_proxy);
            tree.query(&fat, |proxy| {
                // A proxy cannot form a pair with itself
                if proxy != query_proxy {
                    pairs.push((proxy.min(query_proxy), proxy.max(query_proxy)));
                }
                true
            });
        }
        self.move_buffer = moved;
        self.move_buffer.clear();

        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(a, b) in &self.pair_buffer {
            if let (Some(data_a), Some(data_b)) = (self.tree.user_data(a), self.tree.user_data(b)) {
                callback(data_a, data_b);
            }
        }
    }

    /// Proxies whose fat AABB overlaps `aabb`; the callback returns `false` to stop
    pub fn query<F>(&self, aabb: &Aabb, callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        self.tree.query(aabb, callback);
    }

    /// Ray cast through the tree, see [`DynamicTree::ray_cast`]
    pub fn ray_cast<F>(&self, input: &RayCastInput, callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f32,
    {
        self.tree.ray_cast(input, callback);
    }
}
