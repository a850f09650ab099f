use crate::{Dag, DagRef, Error, NodeIndex, Op, Result};

/*
 * DAG groups: several independent DAGs sharing one index space so they can
 * later share one key set and one parameter choice. Group behavior lives
 * on Dag itself (a children map), not on a subclass.
 */

impl Dag {
    /**
     * Attaches `child` to this group under `name`.
     *
     * The child's minimum node index must not precede this group's next
     * index; build children after calling
     * [`set_next_node_index`](Dag::set_next_node_index) with the group's
     * counter. Input names must be unique across the whole group, and a
     * child must have at least one input and one output.
     *
     * On success the group's slot count rises to the largest child's, every
     * child's scale drops to the smallest child's, and the shared index
     * counter advances past all children.
     */
    pub fn add_child(
        &mut self,
        name: impl Into<String>,
        child: DagRef,
    ) -> Result<()> {
        let name = name.into();

        {
            let c = child.borrow();

            if c.min_node_index() < self.next_node_index() {
                return Err(Error::GroupIndexOverlap {
                    group: self.next_node_index(),
                    child: c.min_node_index(),
                });
            }

            if self.children.contains_key(&name) {
                return Err(Error::GroupDuplicateDag(name));
            }

            if c.local_inputs().is_empty() || c.local_outputs().is_empty() {
                return Err(Error::EmptyChildDag);
            }

            for input_name in c.local_inputs().keys() {
                if self.group_inputs.contains_key(input_name) {
                    return Err(Error::GroupDuplicateInput(
                        input_name.clone(),
                    ));
                }
            }

            for (input_name, node) in c.local_inputs() {
                self.group_inputs.insert(input_name.clone(), *node);
            }
            for (output_name, node) in c.local_outputs() {
                self.group_outputs.insert(output_name.clone(), *node);
            }

            let vec_size = self.vec_size().max(c.vec_size());
            self.set_vec_size(vec_size)?;

            if c.scale < self.scale {
                self.scale = c.scale;
            }
        }

        // Children silently adopt the group minimum scale.
        let scale = self.scale;
        child.borrow_mut().scale = scale;
        for sibling in self.children.values() {
            sibling.borrow_mut().scale = scale;
        }

        self.children.insert(name, child);
        self.update_group_index();

        Ok(())
    }

    /**
     * Looks up a child DAG by name.
     */
    pub fn child(&self, name: &str) -> Option<DagRef> {
        self.children.get(name).cloned()
    }

    /**
     * The group's children in name order.
     */
    pub fn children(&self) -> impl Iterator<Item = (&String, &DagRef)> {
        self.children.iter()
    }

    /**
     * The number of attached children.
     */
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /**
     * Finds the child that owns `index`, if any.
     */
    pub fn owner_of(&self, index: NodeIndex) -> Option<DagRef> {
        self.children
            .values()
            .find(|c| c.borrow().contains(index))
            .cloned()
    }

    /**
     * Re-synchronizes the shared index counter: every member of the group,
     * the group itself included, advances to the largest next-index among
     * them. Run this after any member allocates nodes.
     */
    pub fn update_group_index(&mut self) {
        let mut total = self.next_node_index();

        for child in self.children.values() {
            total = total.max(child.borrow().next_node_index());
        }

        for child in self.children.values() {
            child.borrow_mut().set_next_node_index(total);
        }

        self.set_next_node_index(total);
    }
}

/**
 * Creates a node through a group handle. When the first operand belongs to
 * a child, construction is forwarded to that child so the node lands in
 * the sub-DAG that owns its inputs; otherwise the node is created in the
 * group's own graph. Either way the shared index counter is
 * re-synchronized.
 */
pub fn group_make_node(
    group: &DagRef,
    op: Op,
    operands: &[NodeIndex],
) -> NodeIndex {
    let owner = {
        let g = group.borrow();
        operands.first().and_then(|first| {
            if g.contains(*first) {
                None
            } else {
                g.owner_of(*first)
            }
        })
    };

    let node = match owner {
        Some(child) => child.borrow_mut().make_node(op, operands),
        None => group.borrow_mut().make_node(op, operands),
    };

    group.borrow_mut().update_group_index();
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataType;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn leaf_dag(name: &str, from: u64) -> DagRef {
        let mut dag = Dag::new(name, 4).unwrap();
        dag.set_next_node_index(from);
        let x = dag.make_input(format!("{name}_in"), DataType::Cipher);
        let mul = dag.make_node(Op::Mul, &[x, x]);
        dag.make_output(format!("{name}_out"), mul);
        Rc::new(RefCell::new(dag))
    }

    #[test]
    fn children_share_one_index_space() {
        let mut group = Dag::new_group("g", 4).unwrap();

        let a = leaf_dag("a", 0);
        group.add_child("a", a.clone()).unwrap();

        let next = group.next_node_index();
        assert_eq!(next, a.borrow().next_node_index());

        let b = leaf_dag("b", next);
        group.add_child("b", b.clone()).unwrap();

        assert_eq!(
            group.next_node_index(),
            b.borrow().next_node_index()
        );
        assert_eq!(
            a.borrow().next_node_index(),
            b.borrow().next_node_index()
        );
    }

    #[test]
    fn overlapping_indices_are_rejected() {
        let mut group = Dag::new_group("g", 4).unwrap();

        group.add_child("a", leaf_dag("a", 0)).unwrap();

        // A second child also starting at index 0 overlaps the first.
        let err = group.add_child("b", leaf_dag("b", 0)).unwrap_err();
        assert!(matches!(err, Error::GroupIndexOverlap { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut group = Dag::new_group("g", 4).unwrap();

        group.add_child("a", leaf_dag("a", 0)).unwrap();
        let next = group.next_node_index();

        let err = group.add_child("a", leaf_dag("c", next)).unwrap_err();
        assert!(matches!(err, Error::GroupDuplicateDag(_)));
    }

    #[test]
    fn duplicate_input_names_are_rejected() {
        let mut group = Dag::new_group("g", 4).unwrap();

        group.add_child("a", leaf_dag("a", 0)).unwrap();
        let next = group.next_node_index();

        // Same input name as child "a".
        let clash = {
            let mut dag = Dag::new("clash", 4).unwrap();
            dag.set_next_node_index(next);
            let x = dag.make_input("a_in", DataType::Cipher);
            dag.make_output("clash_out", x);
            Rc::new(RefCell::new(dag))
        };

        let err = group.add_child("b", clash).unwrap_err();
        assert!(matches!(err, Error::GroupDuplicateInput(_)));
    }

    #[test]
    fn empty_children_are_rejected() {
        let mut group = Dag::new_group("g", 4).unwrap();
        let empty = Rc::new(RefCell::new(Dag::new("empty", 4).unwrap()));

        let err = group.add_child("empty", empty).unwrap_err();
        assert!(matches!(err, Error::EmptyChildDag));
    }

    #[test]
    fn group_inputs_union_children() {
        let mut group = Dag::new_group("g", 4).unwrap();

        group.add_child("a", leaf_dag("a", 0)).unwrap();
        let next = group.next_node_index();
        group.add_child("b", leaf_dag("b", next)).unwrap();

        let names: Vec<_> = group.inputs().keys().cloned().collect();
        assert_eq!(names, vec!["a_in".to_string(), "b_in".to_string()]);
    }

    #[test]
    fn group_make_node_dispatches_to_owner() {
        let mut group = Dag::new_group("g", 4).unwrap();
        let a = leaf_dag("a", 0);
        let a_input = *a.borrow().local_inputs().values().next().unwrap();
        group.add_child("a", a.clone()).unwrap();

        let group = Rc::new(RefCell::new(group));
        let node = group_make_node(&group, Op::Negate, &[a_input]);

        assert!(a.borrow().contains(node));
        assert!(group.borrow().next_node_index() > node.raw());
    }
}
