/*!
Longest-prefix-match index over IPv4 and IPv6 prefixes.

The index is a pair of Patricia tries (one per address family) keyed on the
network-order bits of each prefix up to its mask length. Nodes either carry
a prefix and an optional user payload, or are internal *glue* nodes created
where two prefixes diverge. Glue nodes are an implementation detail: they
never show up in lookups or iteration.

Nodes live in an arena and are addressed by [NodeId]. A node's id is stable
until the node is explicitly removed, which makes it usable as a key into
side tables (the view keeps its (prefix, peer) cells in exactly such a
table).
*/

use crate::models::{AddrFamily, NetworkPrefix};
use std::fmt::{Display, Formatter};

const MAX_BITS: u8 = 128;

/// Stable handle to a node in the prefix index arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const MIN: NodeId = NodeId(u32::MIN);
    pub const MAX: NodeId = NodeId(u32::MAX);

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Node<T> {
    /// Branching depth: mask length for prefix nodes, first-differing bit for
    /// glue nodes.
    bit: u8,
    /// `None` marks a glue node.
    prefix: Option<NetworkPrefix>,
    payload: Option<T>,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

/// The prefix index: two Patricia tries sharing one node arena.
pub struct PatriciaTree<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<NodeId>,
    head4: Option<NodeId>,
    head6: Option<NodeId>,
    v4_prefixes: u64,
    v6_prefixes: u64,
}

fn bit_set(addr: &[u8; 16], bit: u8) -> bool {
    addr[(bit >> 3) as usize] & (0x80 >> (bit & 0x07)) != 0
}

/// Compare the first `mask` bits of two addresses.
fn bits_equal(a: &[u8; 16], b: &[u8; 16], mask: u8) -> bool {
    let n = (mask / 8) as usize;
    if a[..n] != b[..n] {
        return false;
    }
    if mask % 8 == 0 {
        return true;
    }
    let m = 0xffu8 << (8 - mask % 8);
    (a[n] & m) == (b[n] & m)
}

impl<T> Default for PatriciaTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PatriciaTree<T> {
    pub fn new() -> Self {
        PatriciaTree {
            nodes: Vec::new(),
            free: Vec::new(),
            head4: None,
            head6: None,
            v4_prefixes: 0,
            v6_prefixes: 0,
        }
    }

    fn node(&self, id: NodeId) -> &Node<T> {
        self.nodes[id.index()]
            .as_ref()
            .expect("node id must reference a live node")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        self.nodes[id.index()]
            .as_mut()
            .expect("node id must reference a live node")
    }

    fn alloc(&mut self, node: Node<T>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.index()] = Some(node);
                id
            }
            None => {
                let id = NodeId(self.nodes.len() as u32);
                self.nodes.push(Some(node));
                id
            }
        }
    }

    fn dealloc(&mut self, id: NodeId) -> Node<T> {
        let node = self.nodes[id.index()]
            .take()
            .expect("node id must reference a live node");
        self.free.push(id);
        node
    }

    fn head(&self, family: AddrFamily) -> Option<NodeId> {
        match family {
            AddrFamily::Ipv4 => self.head4,
            AddrFamily::Ipv6 => self.head6,
        }
    }

    fn set_head(&mut self, family: AddrFamily, head: Option<NodeId>) {
        match family {
            AddrFamily::Ipv4 => self.head4 = head,
            AddrFamily::Ipv6 => self.head6 = head,
        }
    }

    fn bump_count(&mut self, family: AddrFamily, delta: i64) {
        let count = match family {
            AddrFamily::Ipv4 => &mut self.v4_prefixes,
            AddrFamily::Ipv6 => &mut self.v6_prefixes,
        };
        *count = count.checked_add_signed(delta).expect("prefix count overflow");
    }

    /// Number of prefixes (not nodes) currently indexed for a family.
    pub fn prefix_count(&self, family: AddrFamily) -> u64 {
        match family {
            AddrFamily::Ipv4 => self.v4_prefixes,
            AddrFamily::Ipv6 => self.v6_prefixes,
        }
    }

    /// The prefix stored at `id`, or `None` for glue nodes.
    pub fn prefix(&self, id: NodeId) -> Option<&NetworkPrefix> {
        self.node(id).prefix.as_ref()
    }

    pub fn payload(&self, id: NodeId) -> Option<&T> {
        self.node(id).payload.as_ref()
    }

    pub fn payload_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id).payload.as_mut()
    }

    /// Attach a payload to a prefix node, returning the previous one.
    pub fn set_payload(&mut self, id: NodeId, payload: T) -> Option<T> {
        self.node_mut(id).payload.replace(payload)
    }

    /// Inserts `pfx`, returning the node that holds it. Inserting a prefix
    /// that is already present returns the existing node unchanged.
    pub fn insert(&mut self, pfx: NetworkPrefix) -> NodeId {
        let family = pfx.family();
        debug_assert!(pfx.mask_len() <= family.max_bits());

        let head = match self.head(family) {
            Some(head) => head,
            None => {
                let id = self.alloc(Node {
                    bit: pfx.mask_len(),
                    prefix: Some(pfx),
                    payload: None,
                    parent: None,
                    left: None,
                    right: None,
                });
                self.set_head(family, Some(id));
                self.bump_count(family, 1);
                return id;
            }
        };

        let bitlen = pfx.mask_len();
        let addr = pfx.octets();

        // Walk down until we either run off the tree or stop at a prefix node
        // at least as deep as the new mask. Glue nodes always have two
        // children, so the walk can only end on a prefix node.
        let mut it = head;
        loop {
            let node = self.node(it);
            if node.bit >= bitlen && node.prefix.is_some() {
                break;
            }
            let next = if node.bit < MAX_BITS && bit_set(&addr, node.bit) {
                node.right
            } else {
                node.left
            };
            match next {
                Some(child) => it = child,
                None => break,
            }
        }

        // First bit where the new prefix differs from the one we stopped at.
        let stop = self.node(it);
        let test_addr = stop
            .prefix
            .as_ref()
            .expect("descent must stop on a prefix node")
            .octets();
        let check_bit = stop.bit.min(bitlen);
        let mut differ_bit = check_bit;
        for i in 0..((check_bit as usize + 7) / 8) {
            let r = addr[i] ^ test_addr[i];
            if r == 0 {
                continue;
            }
            differ_bit = (i as u8) * 8 + r.leading_zeros() as u8;
            break;
        }
        if differ_bit > check_bit {
            differ_bit = check_bit;
        }

        // Climb back up to the branch point.
        let mut it = it;
        while let Some(parent) = self.node(it).parent {
            if self.node(parent).bit < differ_bit {
                break;
            }
            it = parent;
        }

        if differ_bit == bitlen && self.node(it).bit == bitlen {
            if self.node(it).prefix.is_some() {
                // exact node found
                return it;
            }
            // a glue node sits exactly at the right depth: promote it
            self.node_mut(it).prefix = Some(pfx);
            self.bump_count(family, 1);
            return it;
        }

        let new_node = self.alloc(Node {
            bit: bitlen,
            prefix: Some(pfx),
            payload: None,
            parent: None,
            left: None,
            right: None,
        });
        self.bump_count(family, 1);

        if self.node(it).bit == differ_bit {
            // append as a child of `it`
            self.node_mut(new_node).parent = Some(it);
            let go_right = self.node(it).bit < MAX_BITS && bit_set(&addr, self.node(it).bit);
            if go_right {
                debug_assert!(self.node(it).right.is_none());
                self.node_mut(it).right = Some(new_node);
            } else {
                debug_assert!(self.node(it).left.is_none());
                self.node_mut(it).left = Some(new_node);
            }
            return new_node;
        }

        if bitlen == differ_bit {
            // the new node becomes the parent of `it`
            if bitlen < MAX_BITS && bit_set(&test_addr, bitlen) {
                self.node_mut(new_node).right = Some(it);
            } else {
                self.node_mut(new_node).left = Some(it);
            }
            let old_parent = self.node(it).parent;
            self.node_mut(new_node).parent = old_parent;
            self.replace_child(family, old_parent, it, new_node);
            self.node_mut(it).parent = Some(new_node);
            return new_node;
        }

        // the prefixes diverge below both: branch through a fresh glue node
        let glue = self.alloc(Node {
            bit: differ_bit,
            prefix: None,
            payload: None,
            parent: self.node(it).parent,
            left: None,
            right: None,
        });
        if differ_bit < MAX_BITS && bit_set(&addr, differ_bit) {
            self.node_mut(glue).right = Some(new_node);
            self.node_mut(glue).left = Some(it);
        } else {
            self.node_mut(glue).right = Some(it);
            self.node_mut(glue).left = Some(new_node);
        }
        self.node_mut(new_node).parent = Some(glue);
        let old_parent = self.node(glue).parent;
        self.replace_child(family, old_parent, it, glue);
        self.node_mut(it).parent = Some(glue);
        new_node
    }

    /// Point `parent`'s child link (or the tree head) away from `old` to `new`.
    fn replace_child(
        &mut self,
        family: AddrFamily,
        parent: Option<NodeId>,
        old: NodeId,
        new: NodeId,
    ) {
        match parent {
            None => {
                debug_assert_eq!(self.head(family), Some(old));
                self.set_head(family, Some(new));
            }
            Some(parent) => {
                if self.node(parent).right == Some(old) {
                    self.node_mut(parent).right = Some(new);
                } else {
                    debug_assert_eq!(self.node(parent).left, Some(old));
                    self.node_mut(parent).left = Some(new);
                }
            }
        }
    }

    /// Finds the node holding exactly `pfx` (same address bits and mask
    /// length), if any.
    pub fn search_exact(&self, pfx: &NetworkPrefix) -> Option<NodeId> {
        let mut it = self.head(pfx.family())?;
        let bitlen = pfx.mask_len();
        let addr = pfx.octets();

        while self.node(it).bit < bitlen {
            let node = self.node(it);
            let next = if bit_set(&addr, node.bit) {
                node.right
            } else {
                node.left
            };
            it = next?;
        }

        let node = self.node(it);
        let found = node.prefix.as_ref()?;
        if node.bit > bitlen {
            return None;
        }
        debug_assert_eq!(node.bit, bitlen);
        bits_equal(&found.octets(), &addr, bitlen).then_some(it)
    }

    /// Removes the prefix held by `node`, returning its payload.
    ///
    /// A node with two children merely loses its prefix and becomes glue; a
    /// leaf is deleted outright, collapsing a lone-child glue parent with it;
    /// a node with one child is spliced out.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let family = match self.node(id).prefix {
            Some(pfx) => pfx.family(),
            // glue nodes cannot be removed explicitly
            None => return None,
        };

        let (left, right) = (self.node(id).left, self.node(id).right);

        if left.is_some() && right.is_some() {
            let node = self.node_mut(id);
            node.prefix = None;
            let payload = node.payload.take();
            self.bump_count(family, -1);
            return payload;
        }

        if left.is_none() && right.is_none() {
            let node = self.dealloc(id);
            self.bump_count(family, -1);

            let parent = match node.parent {
                None => {
                    debug_assert_eq!(self.head(family), Some(id));
                    self.set_head(family, None);
                    return node.payload;
                }
                Some(parent) => parent,
            };

            let sibling = if self.node(parent).right == Some(id) {
                self.node_mut(parent).right = None;
                self.node(parent).left
            } else {
                debug_assert_eq!(self.node(parent).left, Some(id));
                self.node_mut(parent).left = None;
                self.node(parent).right
            };

            if self.node(parent).prefix.is_some() {
                return node.payload;
            }

            // a glue node with a single child is pointless: splice it out
            let sibling = sibling.expect("glue node must have had two children");
            let grandparent = self.node(parent).parent;
            self.replace_child(family, grandparent, parent, sibling);
            self.node_mut(sibling).parent = grandparent;
            self.dealloc(parent);
            return node.payload;
        }

        // exactly one child: splice this node out
        let child = left.or(right).expect("one child must exist");
        let node = self.dealloc(id);
        self.bump_count(family, -1);
        self.node_mut(child).parent = node.parent;
        self.replace_child(family, node.parent, id, child);
        node.payload
    }

    fn collect_more_specifics(&self, node: Option<NodeId>, first_layer: bool, out: &mut Vec<NodeId>) {
        let id = match node {
            Some(id) => id,
            None => return,
        };
        if self.node(id).prefix.is_some() {
            out.push(id);
            if first_layer {
                return;
            }
        }
        self.collect_more_specifics(self.node(id).left, first_layer, out);
        self.collect_more_specifics(self.node(id).right, first_layer, out);
    }

    /// All prefixes strictly contained in the one at `id`, pre-order.
    pub fn more_specifics(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_more_specifics(self.node(id).left, false, &mut out);
        self.collect_more_specifics(self.node(id).right, false, &mut out);
        out
    }

    /// The first layer of descendant prefixes below `id` (each subtree is cut
    /// at its shallowest prefix node).
    pub fn more_specifics_first_layer(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_more_specifics(self.node(id).left, true, &mut out);
        self.collect_more_specifics(self.node(id).right, true, &mut out);
        out
    }

    /// All prefixes strictly containing the one at `id`, nearest first.
    pub fn less_specifics(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut it = self.node(id).parent;
        while let Some(id) = it {
            if self.node(id).prefix.is_some() {
                out.push(id);
            }
            it = self.node(id).parent;
        }
        out
    }

    /// The set of shallowest prefixes of a family: every indexed prefix is
    /// covered by exactly one of them.
    pub fn minimum_coverage(&self, family: AddrFamily) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_more_specifics(self.head(family), true, &mut out);
        out
    }

    fn count_subnets_below(&self, node: Option<NodeId>, subnet_size: u8) -> u64 {
        let id = match node {
            Some(id) => id,
            None => return 0,
        };
        let node = self.node(id);
        match &node.prefix {
            None => {
                // a glue node at or below the target size covers one subnet,
                // whether or not the prefixes underneath fill it
                if node.bit >= subnet_size {
                    1
                } else {
                    self.count_subnets_below(node.left, subnet_size)
                        + self.count_subnets_below(node.right, subnet_size)
                }
            }
            Some(pfx) => {
                // everything below this point is covered by the prefix itself
                if pfx.mask_len() >= subnet_size {
                    1
                } else {
                    let diff = subnet_size - pfx.mask_len();
                    if diff >= 64 {
                        u64::MAX
                    } else {
                        1u64 << diff
                    }
                }
            }
        }
    }

    /// Number of /`subnet_size` subnets covered by the indexed prefixes of a
    /// family. A prefix already at or below the subnet size counts as one.
    pub fn count_subnets(&self, family: AddrFamily, subnet_size: u8) -> u64 {
        debug_assert!(subnet_size <= family.max_bits());
        self.count_subnets_below(self.head(family), subnet_size)
    }

    /// Iterate all prefixes in bit-string order, IPv4 first.
    pub fn iter(&self) -> PrefixIter<'_, T> {
        PrefixIter {
            tree: self,
            stack: Vec::new(),
            pending_heads: vec![self.head6, self.head4],
            started: false,
        }
    }

    /// Insert every prefix of `src` into this index. Payloads are not copied.
    pub fn merge(&mut self, src: &PatriciaTree<T>) {
        for (_, pfx) in src.iter() {
            self.insert(pfx);
        }
    }

    /// Drop every node of both families.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head4 = None;
        self.head6 = None;
        self.v4_prefixes = 0;
        self.v6_prefixes = 0;
    }
}

/// In-order iterator over prefix nodes; glue nodes are skipped.
pub struct PrefixIter<'a, T> {
    tree: &'a PatriciaTree<T>,
    stack: Vec<NodeId>,
    pending_heads: Vec<Option<NodeId>>,
    started: bool,
}

impl<'a, T> PrefixIter<'a, T> {
    fn push_left_spine(&mut self, mut node: Option<NodeId>) {
        while let Some(id) = node {
            self.stack.push(id);
            node = self.tree.node(id).left;
        }
    }
}

impl<'a, T> Iterator for PrefixIter<'a, T> {
    type Item = (NodeId, NetworkPrefix);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.started {
                self.started = true;
                let head = self.pending_heads.pop().flatten();
                self.push_left_spine(head);
            }
            match self.stack.pop() {
                Some(id) => {
                    self.push_left_spine(self.tree.node(id).right);
                    if let Some(pfx) = self.tree.node(id).prefix {
                        return Some((id, pfx));
                    }
                }
                None => {
                    if self.pending_heads.is_empty() {
                        return None;
                    }
                    let head = self.pending_heads.pop().flatten();
                    self.push_left_spine(head);
                }
            }
        }
    }
}
