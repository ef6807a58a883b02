//! A table of dense integer key to value, the arena that graph nodes and
//! their per-pass state live in.

use std::marker::PhantomData;

pub trait Index: From<usize> {
    fn index(&self) -> usize;
}

/// A map of a dense integer key to value, implemented as a vector.
/// Keys are only ever handed out by `push`, so every key of the right type
/// that came from this map is in range.
pub struct DenseMap<K, V> {
    vec: Vec<V>,
    key_type: PhantomData<K>,
}

impl<K, V> Default for DenseMap<K, V> {
    fn default() -> Self {
        DenseMap {
            vec: Vec::new(),
            key_type: PhantomData,
        }
    }
}

impl<K: Index, V> std::ops::Index<K> for DenseMap<K, V> {
    type Output = V;

    fn index(&self, k: K) -> &Self::Output {
        &self.vec[k.index()]
    }
}

impl<K: Index, V> std::ops::IndexMut<K> for DenseMap<K, V> {
    fn index_mut(&mut self, k: K) -> &mut Self::Output {
        &mut self.vec[k.index()]
    }
}

impl<K: Index, V> DenseMap<K, V> {
    /// Builds a map with one value per key in `0..len`.
    pub fn from_fn(len: usize, mut f: impl FnMut(K) -> V) -> Self {
        DenseMap {
            vec: (0..len).map(|i| f(K::from(i))).collect(),
            key_type: PhantomData,
        }
    }

    pub fn push(&mut self, val: V) -> K {
        let id = K::from(self.vec.len());
        self.vec.push(val);
        id
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    pub fn all_ids(&self) -> impl Iterator<Item = K> {
        (0..self.vec.len()).map(K::from)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.vec.iter().enumerate().map(|(i, v)| (K::from(i), v))
    }

    pub fn values(&self) -> std::slice::Iter<'_, V> {
        self.vec.iter()
    }
}

impl<K: Index, V: Clone> DenseMap<K, V> {
    pub fn new_sized(len: usize, default: V) -> Self {
        DenseMap {
            vec: vec![default; len],
            key_type: PhantomData,
        }
    }
}
