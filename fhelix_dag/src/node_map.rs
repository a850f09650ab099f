use crate::{Dag, NodeIndex};

#[derive(Debug, Clone)]
/**
 * A dense side table keyed by [`NodeIndex`].
 *
 * Maps are sized to the owning DAG's index watermark at construction and
 * grow on demand when a later-allocated index is touched, so the observable
 * invariant `len >= index + 1` holds for every index that is read or
 * written. Values are `V::default()` until assigned.
 */
pub struct NodeMap<V> {
    values: Vec<V>,
}

impl<V: Default + Clone> NodeMap<V> {
    /**
     * Creates a map sized to `dag`'s current index watermark.
     */
    pub fn new(dag: &Dag) -> Self {
        Self {
            values: vec![V::default(); dag.node_bound()],
        }
    }

    /**
     * The table length.
     */
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /**
     * True when no index has ever been allocated.
     */
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn grow_to(&mut self, index: NodeIndex) {
        if index.index() >= self.values.len() {
            self.values.resize(index.index() + 1, V::default());
        }
    }

    /**
     * Reads the value for `index`.
     */
    pub fn get(&self, index: NodeIndex) -> V {
        self.values
            .get(index.index())
            .cloned()
            .unwrap_or_default()
    }

    /**
     * Mutable access to the value for `index`, growing the table if the
     * index is past the end.
     */
    pub fn get_mut(&mut self, index: NodeIndex) -> &mut V {
        self.grow_to(index);
        &mut self.values[index.index()]
    }

    /**
     * Writes the value for `index`.
     */
    pub fn set(&mut self, index: NodeIndex, value: V) {
        *self.get_mut(index) = value;
    }

    /**
     * Resets every entry to `V::default()`.
     */
    pub fn clear(&mut self) {
        for v in self.values.iter_mut() {
            *v = V::default();
        }
    }
}

#[derive(Debug, Clone)]
/**
 * A dense side table whose entries are populated lazily by passes.
 * [`has`](NodeMapOptional::has) distinguishes "never written" from any
 * default value.
 */
pub struct NodeMapOptional<V> {
    values: NodeMap<Option<V>>,
}

impl<V: Clone> NodeMapOptional<V> {
    /**
     * Creates a map sized to `dag`'s current index watermark.
     */
    pub fn new(dag: &Dag) -> Self {
        Self {
            values: NodeMap::new(dag),
        }
    }

    /**
     * The table length.
     */
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /**
     * True when no index has ever been allocated.
     */
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /**
     * True once a value was written for `index`.
     */
    pub fn has(&self, index: NodeIndex) -> bool {
        self.values.get(index).is_some()
    }

    /**
     * Reads the value for `index`.
     *
     * # Panics
     * If no value was ever written for `index`.
     */
    pub fn at(&self, index: NodeIndex) -> V {
        self.values
            .get(index)
            .unwrap_or_else(|| panic!("no value recorded for node {index}"))
    }

    /**
     * Reads the value for `index`, if one was written.
     */
    pub fn get(&self, index: NodeIndex) -> Option<V> {
        self.values.get(index)
    }

    /**
     * Writes the value for `index`.
     */
    pub fn set(&mut self, index: NodeIndex, value: V) {
        self.values.set(index, Some(value));
    }

    /**
     * Removes and returns the value for `index`.
     */
    pub fn take(&mut self, index: NodeIndex) -> Option<V> {
        self.values.get_mut(index).take()
    }

    /**
     * Resets the entry for `index` to unwritten.
     */
    pub fn unset(&mut self, index: NodeIndex) {
        *self.values.get_mut(index) = None;
    }

    /**
     * Resets every entry to unwritten.
     */
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataType, Op};

    #[test]
    fn maps_cover_every_allocated_index() {
        let mut dag = Dag::new("map", 4).unwrap();
        let a = dag.make_input("a", DataType::Cipher);

        let mut map: NodeMap<u32> = NodeMap::new(&dag);
        assert!(map.len() >= a.index() + 1);

        // Indices allocated after the map was created grow it on access.
        let b = dag.make_node(Op::Negate, &[a]);
        map.set(b, 7);
        assert!(map.len() >= b.index() + 1);
        assert_eq!(map.get(b), 7);
        assert_eq!(map.get(a), 0);
    }

    #[test]
    fn optional_maps_track_population() {
        let mut dag = Dag::new("map", 4).unwrap();
        let a = dag.make_input("a", DataType::Cipher);

        let mut map: NodeMapOptional<u32> = NodeMapOptional::new(&dag);
        assert!(!map.has(a));

        map.set(a, 60);
        assert!(map.has(a));
        assert_eq!(map.at(a), 60);

        map.clear();
        assert!(!map.has(a));
    }
}
