//! Persistent hash map
//!
//! A hash-array-mapped trie with `Arc`-shared nodes. Every update copies only
//! the path from the root to the touched leaf (at most 13 nodes for a 64-bit
//! hash consumed 5 bits per level) and shares everything else with the map it
//! was derived from. Earlier versions stay valid and unchanged, so readers can
//! hold any snapshot while a writer derives the next one.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const BITS_PER_LEVEL: u32 = 5;
const LEVEL_MASK: u64 = (1 << BITS_PER_LEVEL) - 1;

enum Node<K, V> {
    /// Up to 32 children, present slots flagged in `bitmap`
    Branch {
        bitmap: u32,
        children: Vec<Arc<Node<K, V>>>,
    },
    /// Entries whose keys share the full 64-bit hash
    Leaf { hash: u64, entries: Vec<(K, V)> },
}

enum Removal<K, V> {
    NotFound,
    Removed(Option<Arc<Node<K, V>>>),
}

fn hash_key<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn slot(hash: u64, shift: u32) -> u32 {
    ((hash >> shift) & LEVEL_MASK) as u32
}

fn position(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

pub struct PersistentMap<K, V> {
    root: Option<Arc<Node<K, V>>>,
    len: usize,
}

impl<K, V> PersistentMap<K, V> {
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            stack: self.root.as_deref().into_iter().collect(),
            current: <&[(K, V)]>::default().iter(),
            remaining: self.len,
        }
    }

    /// True when both maps share the same root node
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> PersistentMap<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = hash_key(key);
        let mut node = self.root.as_deref()?;
        let mut shift = 0;
        loop {
            match node {
                Node::Branch { bitmap, children } => {
                    let bit: u32 = 1 << slot(hash, shift);
                    if bitmap & bit == 0 {
                        return None;
                    }
                    node = children[position(*bitmap, bit)].as_ref();
                    shift += BITS_PER_LEVEL;
                }
                Node::Leaf { hash: leaf_hash, entries } => {
                    if *leaf_hash != hash {
                        return None;
                    }
                    return entries.iter().find(|(k, _)| k == key).map(|(_, v)| v);
                }
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// New map with `key` bound to `value`; `self` is left untouched
    pub fn insert(&self, key: K, value: V) -> Self {
        let hash = hash_key(&key);
        match &self.root {
            None => Self {
                root: Some(Arc::new(Node::Leaf {
                    hash,
                    entries: vec![(key, value)],
                })),
                len: 1,
            },
            Some(root) => {
                let (root, added) = insert_node(root, hash, 0, key, value);
                Self {
                    root: Some(root),
                    len: self.len + usize::from(added),
                }
            }
        }
    }

    /// New map without `key`, or `None` if `key` is absent
    pub fn remove(&self, key: &K) -> Option<Self> {
        let root = self.root.as_ref()?;
        match remove_node(root, hash_key(key), 0, key) {
            Removal::NotFound => None,
            Removal::Removed(root) => Some(Self {
                root,
                len: self.len - 1,
            }),
        }
    }
}

fn insert_node<K: Eq + Clone, V: Clone>(
    node: &Arc<Node<K, V>>,
    hash: u64,
    shift: u32,
    key: K,
    value: V,
) -> (Arc<Node<K, V>>, bool) {
    match node.as_ref() {
        Node::Branch { bitmap, children } => {
            let bit: u32 = 1 << slot(hash, shift);
            let index = position(*bitmap, bit);
            let mut children = children.clone();
            let added = if bitmap & bit == 0 {
                children.insert(index, Arc::new(Node::Leaf { hash, entries: vec![(key, value)] }));
                true
            } else {
                let (child, added) = insert_node(&children[index], hash, shift + BITS_PER_LEVEL, key, value);
                children[index] = child;
                added
            };
            (
                Arc::new(Node::Branch {
                    bitmap: bitmap | bit,
                    children,
                }),
                added,
            )
        }
        Node::Leaf { hash: leaf_hash, entries } if *leaf_hash == hash => {
            let mut entries = entries.clone();
            let added = match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => {
                    entry.1 = value;
                    false
                }
                None => {
                    entries.push((key, value));
                    true
                }
            };
            (Arc::new(Node::Leaf { hash, entries }), added)
        }
        Node::Leaf { hash: leaf_hash, .. } => {
            let fresh = Arc::new(Node::Leaf { hash, entries: vec![(key, value)] });
            (merge_leaves(shift, Arc::clone(node), *leaf_hash, fresh, hash), true)
        }
    }
}

/// Branch holding two leaves with distinct hashes, nested until they diverge
fn merge_leaves<K, V>(
    shift: u32,
    a: Arc<Node<K, V>>,
    a_hash: u64,
    b: Arc<Node<K, V>>,
    b_hash: u64,
) -> Arc<Node<K, V>> {
    let a_slot = slot(a_hash, shift);
    let b_slot = slot(b_hash, shift);
    let node = if a_slot == b_slot {
        Node::Branch {
            bitmap: 1 << a_slot,
            children: vec![merge_leaves(shift + BITS_PER_LEVEL, a, a_hash, b, b_hash)],
        }
    } else {
        let children = if a_slot < b_slot { vec![a, b] } else { vec![b, a] };
        Node::Branch {
            bitmap: (1 << a_slot) | (1 << b_slot),
            children,
        }
    };
    Arc::new(node)
}

fn remove_node<K: Eq + Clone, V: Clone>(node: &Arc<Node<K, V>>, hash: u64, shift: u32, key: &K) -> Removal<K, V> {
    match node.as_ref() {
        Node::Branch { bitmap, children } => {
            let bit: u32 = 1 << slot(hash, shift);
            if bitmap & bit == 0 {
                return Removal::NotFound;
            }
            let index = position(*bitmap, bit);
            let replacement = match remove_node(&children[index], hash, shift + BITS_PER_LEVEL, key) {
                Removal::NotFound => return Removal::NotFound,
                Removal::Removed(replacement) => replacement,
            };

            let mut children = children.clone();
            let bitmap = match replacement {
                Some(child) => {
                    children[index] = child;
                    *bitmap
                }
                None => {
                    children.remove(index);
                    bitmap & !bit
                }
            };

            // Collapse branches that no longer discriminate anything
            match children.len() {
                0 => Removal::Removed(None),
                1 if matches!(children[0].as_ref(), Node::Leaf { .. }) => Removal::Removed(children.pop()),
                _ => Removal::Removed(Some(Arc::new(Node::Branch { bitmap, children }))),
            }
        }
        Node::Leaf { hash: leaf_hash, entries } => {
            if *leaf_hash != hash {
                return Removal::NotFound;
            }
            let Some(index) = entries.iter().position(|(k, _)| k == key) else {
                return Removal::NotFound;
            };
            if entries.len() == 1 {
                return Removal::Removed(None);
            }
            let mut entries = entries.clone();
            entries.remove(index);
            Removal::Removed(Some(Arc::new(Node::Leaf { hash, entries })))
        }
    }
}

impl<K, V> Clone for PersistentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for PersistentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V: Clone + PartialEq> PartialEq for PersistentMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Hash + Eq + Clone, V: Clone + Eq> Eq for PersistentMap<K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PersistentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> FromIterator<(K, V)> for PersistentMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter().fold(Self::new(), |map, (k, v)| map.insert(k, v))
    }
}

/// Iterator over entries in trie order
pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
    current: std::slice::Iter<'a, (K, V)>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((k, v)) = self.current.next() {
                self.remaining -= 1;
                return Some((k, v));
            }
            match self.stack.pop()? {
                Node::Branch { children, .. } => {
                    self.stack.extend(children.iter().rev().map(|child| child.as_ref()));
                }
                Node::Leaf { entries, .. } => self.current = entries.iter(),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<'a, K, V> IntoIterator for &'a PersistentMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
