use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::rc::Rc;

use petgraph::{algo::is_isomorphic_matching, Graph};

use crate::attr::{
    AttrList, ConstValue, ConstValueInt64, EncodeAtScale, Range,
    RescaleDivisor, Rotation, Type, Uint32Const,
};
use crate::{
    ConstantValue, DagRef, DataType, Error, Node, NodeIndex, Op, Result,
    DEFAULT_SCALE,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/**
 * Selects which sub-messages a DAG emits when serialized. Artifacts can be
 * split across parties: a key-generation party needs `genkey_info`, an
 * evaluating party needs `exe_ctx`, and so on.
 */
pub struct DagSerializePara {
    /**
     * Emit the node graph and computation logic.
     */
    pub need_node_info: bool,

    /**
     * Emit the scheme parameters needed to generate keys.
     */
    pub need_genkey_info: bool,

    /**
     * Emit the per-input encoding signature.
     */
    pub need_sig_info: bool,

    /**
     * Emit the public evaluation context (evaluation keys).
     */
    pub need_exe_ctx: bool,

    /**
     * Emit the encryption context (public key).
     */
    pub need_encrypt_ctx: bool,

    /**
     * Emit the decryption context (secret key).
     */
    pub need_decrypt_ctx: bool,
}

impl DagSerializePara {
    /**
     * Creates a parameter set from the six flags in declaration order.
     */
    pub fn new(
        need_node_info: bool,
        need_genkey_info: bool,
        need_sig_info: bool,
        need_exe_ctx: bool,
        need_encrypt_ctx: bool,
        need_decrypt_ctx: bool,
    ) -> Self {
        Self {
            need_node_info,
            need_genkey_info,
            need_sig_info,
            need_exe_ctx,
            need_encrypt_ctx,
            need_decrypt_ctx,
        }
    }

    /**
     * A parameter set with every flag raised.
     */
    pub fn all() -> Self {
        Self::new(true, true, true, true, true, true)
    }
}

#[derive(Debug)]
/**
 * The intermediate representation of an FHE program: a DAG of typed
 * operation nodes with named inputs and outputs.
 *
 * Nodes live in an arena indexed by [`NodeIndex`]; operand and use lists
 * hold indices rather than pointers, and side tables
 * ([`NodeMap`](crate::NodeMap)) are dense vectors over the same index
 * space. Source and sink sets are maintained eagerly by every mutation:
 * sources are exactly the nodes with no operands and sinks exactly the
 * nodes with no uses.
 *
 * A `Dag` doubles as a DAG group when children are attached via
 * [`add_child`](Dag::add_child): group-versus-single behavior is a field,
 * not a subclass.
 */
pub struct Dag {
    name: String,
    vec_size: u32,
    nodes: Vec<Option<Node>>,
    next_node_index: u64,
    min_node_index: u64,
    sources: BTreeSet<NodeIndex>,
    sinks: BTreeSet<NodeIndex>,
    inputs: BTreeMap<String, NodeIndex>,
    outputs: BTreeMap<String, NodeIndex>,

    pub(crate) children: BTreeMap<String, DagRef>,
    pub(crate) group_inputs: BTreeMap<String, NodeIndex>,
    pub(crate) group_outputs: BTreeMap<String, NodeIndex>,
    is_group: bool,

    /**
     * Default scale in bits for sources and the rescale waterline.
     */
    pub scale: u32,

    /**
     * Security level in bits; one of 128, 192, or 256.
     */
    pub sec_level: u32,

    /**
     * Selects the quantum-safe standard-parameter tables.
     */
    pub quantum_safe: bool,

    /**
     * Enables the executor's bootstrapping hook on backends that support
     * it.
     */
    pub enable_bootstrap: bool,

    /**
     * Maximum ciphertext multiplication depth after reduction balancing,
     * filled in by compilation.
     */
    pub after_reduction_depth: u32,

    /**
     * Set when any 64-bit integer constant enters the graph; steers scheme
     * selection toward BFV.
     */
    pub has_int64: bool,

    /**
     * Set when any double constant enters the graph. Defaults to true, so
     * programs without integer constants compile for CKKS.
     */
    pub has_double: bool,

    /**
     * Set when a `Div` node is created; routes the program to the
     * small-integer backend.
     */
    pub short_int: bool,

    /**
     * Selects which artifacts serialization includes.
     */
    pub serialize_options: DagSerializePara,
}

impl Dag {
    /**
     * Creates an empty DAG. `vec_size` is the slot count and must be a
     * non-zero power of two.
     */
    pub fn new(name: impl Into<String>, vec_size: u32) -> Result<Self> {
        if vec_size == 0 || !vec_size.is_power_of_two() {
            return Err(Error::BadVecSize(vec_size as u64));
        }

        Ok(Self {
            name: name.into(),
            vec_size,
            nodes: Vec::new(),
            next_node_index: 0,
            min_node_index: u64::MAX,
            sources: BTreeSet::new(),
            sinks: BTreeSet::new(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            children: BTreeMap::new(),
            group_inputs: BTreeMap::new(),
            group_outputs: BTreeMap::new(),
            is_group: false,
            scale: DEFAULT_SCALE,
            sec_level: 128,
            quantum_safe: false,
            enable_bootstrap: false,
            after_reduction_depth: 0,
            has_int64: false,
            has_double: true,
            short_int: false,
            serialize_options: DagSerializePara::default(),
        })
    }

    /**
     * Creates an empty DAG group. Children attach via
     * [`add_child`](Dag::add_child) and share this DAG's index space.
     */
    pub fn new_group(name: impl Into<String>, vec_size: u32) -> Result<Self> {
        let mut dag = Self::new(name, vec_size)?;
        dag.is_group = true;
        Ok(dag)
    }

    /**
     * The DAG's name.
     */
    pub fn name(&self) -> &str {
        &self.name
    }

    /**
     * Renames the DAG.
     */
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /**
     * The slot count.
     */
    pub fn vec_size(&self) -> u32 {
        self.vec_size
    }

    /**
     * Changes the slot count. Must remain a non-zero power of two.
     */
    pub fn set_vec_size(&mut self, vec_size: u32) -> Result<()> {
        if vec_size == 0 || !vec_size.is_power_of_two() {
            return Err(Error::BadVecSize(vec_size as u64));
        }
        self.vec_size = vec_size;
        Ok(())
    }

    /**
     * True when this DAG was created as a group.
     */
    pub fn is_group(&self) -> bool {
        self.is_group
    }

    /**
     * The index the next created node will receive.
     */
    pub fn next_node_index(&self) -> u64 {
        self.next_node_index
    }

    /**
     * The smallest index allocated by this DAG, or `u64::MAX` before any
     * node exists. Groups use this to check that children occupy disjoint
     * index ranges.
     */
    pub fn min_node_index(&self) -> u64 {
        self.min_node_index
    }

    /**
     * Moves the index counter forward. Callers must do this before
     * building a DAG that will join a group, so the new child's indices do
     * not collide with its siblings'.
     */
    pub fn set_next_node_index(&mut self, next: u64) {
        if next > self.next_node_index {
            self.next_node_index = next;
            self.nodes.resize(next as usize, None);
        }
    }

    /**
     * One past the largest index in use; the length every node-indexed
     * side table must reach.
     */
    pub fn node_bound(&self) -> usize {
        self.next_node_index as usize
    }

    fn allocate_index(&mut self) -> NodeIndex {
        let index = self.next_node_index;
        self.next_node_index += 1;
        self.min_node_index = self.min_node_index.min(index);
        self.nodes.resize(self.next_node_index as usize, None);
        NodeIndex::new(index)
    }

    /**
     * Creates a node. The node starts as both a source and a sink; adding
     * operands immediately demotes it and its operands as appropriate.
     *
     * Creating a `Div` node marks the DAG `short_int`.
     */
    pub fn make_node(&mut self, op: Op, operands: &[NodeIndex]) -> NodeIndex {
        let index = self.allocate_index();
        self.nodes[index.index()] = Some(Node::new(op));
        self.sources.insert(index);
        self.sinks.insert(index);

        if op == Op::Div {
            self.short_int = true;
        }

        if !operands.is_empty() {
            self.set_operands(index, operands.to_vec());
        }

        index
    }

    /**
     * The node at `index`, or `None` if it was removed or belongs to a
     * different DAG of the same group.
     */
    pub fn get(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.index()).and_then(|n| n.as_ref())
    }

    /**
     * Mutable access to the node at `index`.
     */
    pub fn get_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        self.nodes.get_mut(index.index()).and_then(|n| n.as_mut())
    }

    /**
     * The node at `index`.
     *
     * # Panics
     * If no node lives at `index`.
     */
    pub fn node(&self, index: NodeIndex) -> &Node {
        self.get(index)
            .unwrap_or_else(|| panic!("no node at index {index}"))
    }

    /**
     * Mutable access to the node at `index`.
     *
     * # Panics
     * If no node lives at `index`.
     */
    pub fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        self.get_mut(index)
            .unwrap_or_else(|| panic!("no node at index {index}"))
    }

    /**
     * True if a node lives at `index` in this DAG.
     */
    pub fn contains(&self, index: NodeIndex) -> bool {
        self.get(index).is_some()
    }

    /**
     * Iterates over the indices of all live nodes in this DAG, in index
     * order.
     */
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| {
            n.as_ref().map(|_| NodeIndex::new(i as u64))
        })
    }

    /**
     * The number of live nodes.
     */
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /**
     * The nodes with no operands, in index order.
     */
    pub fn sources(&self) -> Vec<NodeIndex> {
        self.sources.iter().copied().collect()
    }

    /**
     * The nodes with no uses, in index order.
     */
    pub fn sinks(&self) -> Vec<NodeIndex> {
        self.sinks.iter().copied().collect()
    }

    /**
     * The named input nodes. For groups this is the union over children.
     */
    pub fn inputs(&self) -> &BTreeMap<String, NodeIndex> {
        if self.is_group {
            &self.group_inputs
        } else {
            &self.inputs
        }
    }

    /**
     * The named output nodes. For groups this is the union over children.
     */
    pub fn outputs(&self) -> &BTreeMap<String, NodeIndex> {
        if self.is_group {
            &self.group_outputs
        } else {
            &self.outputs
        }
    }

    /**
     * Looks up an input node by name.
     */
    pub fn input(&self, name: &str) -> Result<NodeIndex> {
        self.inputs()
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownInput(name.to_string()))
    }

    pub(crate) fn local_inputs(&self) -> &BTreeMap<String, NodeIndex> {
        &self.inputs
    }

    pub(crate) fn local_outputs(&self) -> &BTreeMap<String, NodeIndex> {
        &self.outputs
    }

    pub(crate) fn register_input(&mut self, name: String, node: NodeIndex) {
        self.inputs.insert(name, node);
    }

    pub(crate) fn register_output(&mut self, name: String, node: NodeIndex) {
        self.outputs.insert(name, node);
    }

    /*
     * Edge mutation. Every method keeps the source/sink sets and the
     * use-lists in lockstep with the operand lists.
     */

    fn add_use(&mut self, node: NodeIndex, user: NodeIndex) {
        if self.node(node).uses.is_empty() {
            self.sinks.remove(&node);
        }
        self.node_mut(node).uses.push(user);
    }

    fn erase_use(&mut self, node: NodeIndex, user: NodeIndex) {
        let pos = self.node(node).uses.iter().position(|u| *u == user);
        if let Some(pos) = pos {
            let n = self.node_mut(node);
            n.uses.remove(pos);
            let now_empty = n.uses.is_empty();
            if now_empty {
                self.sinks.insert(node);
            }
        }
    }

    /**
     * Appends `operand` to `node`'s operand list.
     */
    pub fn add_operand(&mut self, node: NodeIndex, operand: NodeIndex) {
        if self.node(node).operands.is_empty() {
            self.sources.remove(&node);
        }
        self.node_mut(node).operands.push(operand);
        self.add_use(operand, node);
    }

    /**
     * Removes the first occurrence of `operand` from `node`'s operand
     * list. Returns whether anything was removed.
     */
    pub fn erase_operand(
        &mut self,
        node: NodeIndex,
        operand: NodeIndex,
    ) -> bool {
        let n = self.node_mut(node);
        if let Some(pos) = n.operands.iter().position(|o| *o == operand) {
            n.operands.remove(pos);
            let now_empty = n.operands.is_empty();
            self.erase_use(operand, node);
            if now_empty {
                self.sources.insert(node);
            }
            true
        } else {
            false
        }
    }

    /**
     * Removes every operand of `node`.
     */
    pub fn erase_all_operands(&mut self, node: NodeIndex) {
        let operands = std::mem::take(&mut self.node_mut(node).operands);
        for operand in operands {
            self.erase_use(operand, node);
        }
        self.sources.insert(node);
    }

    /**
     * Replaces every occurrence of `old` in `node`'s operand list with
     * `new`. Returns whether anything was replaced.
     */
    pub fn replace_operand(
        &mut self,
        node: NodeIndex,
        old: NodeIndex,
        new: NodeIndex,
    ) -> bool {
        let mut count = 0;
        let n = self.node_mut(node);
        for slot in n.operands.iter_mut() {
            if *slot == old {
                *slot = new;
                count += 1;
            }
        }
        // One use-list entry per operand position.
        for _ in 0..count {
            self.erase_use(old, node);
            self.add_use(new, node);
        }
        count > 0
    }

    /**
     * Replaces `node`'s whole operand list.
     */
    pub fn set_operands(&mut self, node: NodeIndex, operands: Vec<NodeIndex>) {
        let old = std::mem::take(&mut self.node_mut(node).operands);
        if old.is_empty() {
            self.sources.remove(&node);
        }
        for operand in old {
            self.erase_use(operand, node);
        }
        for operand in &operands {
            self.add_use(*operand, node);
        }
        let now_empty = operands.is_empty();
        self.node_mut(node).operands = operands;
        if now_empty {
            self.sources.insert(node);
        }
    }

    /**
     * Redirects every use of `node` to `new`.
     */
    pub fn replace_all_uses_with(&mut self, node: NodeIndex, new: NodeIndex) {
        self.replace_uses_with_if(node, new, |_| true);
    }

    /**
     * Redirects every use of `node` to `new`, except uses by `new` itself.
     * This is the splice used when inserting a node directly after
     * `node`.
     */
    pub fn replace_other_uses_with(
        &mut self,
        node: NodeIndex,
        new: NodeIndex,
    ) {
        self.replace_uses_with_if(node, new, |use_| use_ != new);
    }

    fn replace_uses_with_if(
        &mut self,
        node: NodeIndex,
        new: NodeIndex,
        predicate: impl Fn(NodeIndex) -> bool,
    ) {
        let uses = self.node(node).uses.clone();
        for use_ in uses {
            if predicate(use_) {
                self.replace_operand(use_, node, new);
            }
        }
    }

    /**
     * Deletes the node at `index`, detaching it from its operands first.
     * The node must have no remaining uses; its index is never reused.
     */
    pub fn remove_node(&mut self, index: NodeIndex) {
        debug_assert_eq!(self.node(index).num_uses(), 0);
        self.erase_all_operands(index);
        self.sources.remove(&index);
        self.sinks.remove(&index);
        self.nodes[index.index()] = None;
    }

    /*
     * Builders. Each presets the attributes its operation requires.
     */

    /**
     * Creates an `Input` node carrying the declared type and registers it
     * under `name`.
     */
    pub fn make_input(
        &mut self,
        name: impl Into<String>,
        ty: DataType,
    ) -> NodeIndex {
        let node = self.make_node(Op::Input, &[]);
        self.node_mut(node).set::<Type>(ty);
        self.inputs.insert(name.into(), node);
        node
    }

    /**
     * Creates an `Output` node over `src` and registers it under `name`.
     */
    pub fn make_output(
        &mut self,
        name: impl Into<String>,
        src: NodeIndex,
    ) -> NodeIndex {
        let node = self.make_node(Op::Output, &[src]);
        self.outputs.insert(name.into(), node);
        node
    }

    /**
     * Creates a `Constant` node over a prebuilt double constant.
     */
    pub fn make_constant(
        &mut self,
        value: Rc<ConstantValue<f64>>,
    ) -> NodeIndex {
        self.has_double = true;
        let node = self.make_node(Op::Constant, &[]);
        self.node_mut(node).set::<ConstValue>(value);
        node
    }

    /**
     * Creates a `Constant` node over a prebuilt 64-bit integer constant.
     */
    pub fn make_int64_constant(
        &mut self,
        value: Rc<ConstantValue<i64>>,
    ) -> NodeIndex {
        self.has_int64 = true;
        let node = self.make_node(Op::Constant, &[]);
        self.node_mut(node).set::<ConstValueInt64>(value);
        node
    }

    /**
     * Creates a dense double constant sized to this DAG's slot count.
     */
    pub fn make_dense_constant(
        &mut self,
        values: Vec<f64>,
    ) -> Result<NodeIndex> {
        let value = ConstantValue::dense(self.vec_size as usize, values)?;
        Ok(self.make_constant(Rc::new(value)))
    }

    /**
     * Creates a dense 64-bit integer constant sized to this DAG's slot
     * count.
     */
    pub fn make_int64_dense_constant(
        &mut self,
        values: Vec<i64>,
    ) -> Result<NodeIndex> {
        let value = ConstantValue::dense(self.vec_size as usize, values)?;
        Ok(self.make_int64_constant(Rc::new(value)))
    }

    /**
     * Creates a constant with `value` in every slot.
     */
    pub fn make_uniform_constant(&mut self, value: f64) -> NodeIndex {
        self.make_dense_constant(vec![value])
            .expect("a single value divides every slot count")
    }

    /**
     * Creates a `U32Constant` node.
     */
    pub fn make_u32_constant(&mut self, value: u32) -> NodeIndex {
        let node = self.make_node(Op::U32Constant, &[]);
        self.node_mut(node).set::<Uint32Const>(value);
        node
    }

    /**
     * Creates a left rotation of `src` by `amount` slots.
     */
    pub fn make_left_rotation(
        &mut self,
        src: NodeIndex,
        amount: u32,
    ) -> NodeIndex {
        let node = self.make_node(Op::RotateLeftConst, &[src]);
        self.node_mut(node).set::<Rotation>(amount);
        node
    }

    /**
     * Creates a right rotation of `src` by `amount` slots.
     */
    pub fn make_right_rotation(
        &mut self,
        src: NodeIndex,
        amount: u32,
    ) -> NodeIndex {
        let node = self.make_node(Op::RotateRightConst, &[src]);
        self.node_mut(node).set::<Rotation>(amount);
        node
    }

    /**
     * Creates a `Rescale` of `src` that divides out `rescale_by` bits.
     */
    pub fn make_rescale(
        &mut self,
        src: NodeIndex,
        rescale_by: u32,
    ) -> NodeIndex {
        let node = self.make_node(Op::Rescale, &[src]);
        self.node_mut(node).set::<RescaleDivisor>(rescale_by);
        node
    }

    /**
     * Seeds the baseline `EncodeAtScale` on every source and the `Range`
     * on every output from the DAG's default scale. Compilation runs this
     * before the scheme-specific passes.
     */
    pub fn set_scale_range(&mut self) {
        let scale = self.scale;
        for source in self.sources() {
            self.node_mut(source).set::<EncodeAtScale>(scale);
        }
        for output in self.local_outputs().values().copied().collect::<Vec<_>>()
        {
            self.node_mut(output).set::<Range>(scale);
        }
    }

    /**
     * Renders the DAG in DOT format for visualization.
     */
    pub fn to_dot(&self) -> String {
        use std::fmt::Write;

        let mut s = String::new();
        let _ = writeln!(s, "digraph \"{}\" {{", self.name);

        for index in self.post_order() {
            let node = self.node(index);
            let mut label = node.op.name().to_string();
            if let Some(divisor) = node.get::<RescaleDivisor>() {
                label.push_str(&format!("({divisor})"));
            }
            if let Some(rotation) = node.get::<Rotation>() {
                label.push_str(&format!("({rotation})"));
            }
            if let Some(ty) = node.get::<Type>() {
                label.push_str(&format!(" : {ty}"));
            }
            let _ = writeln!(s, "{index} [label=\"{label}\"];");
            for (i, operand) in node.operands().iter().enumerate() {
                let _ = writeln!(s, "{operand} -> {index} [label=\"{i}\"];");
            }
        }

        s.push_str("}\n");
        s
    }

    /**
     * The live nodes reachable from the sinks, operands before users.
     * This is the order serialization finalizes nodes in.
     */
    pub fn post_order(&self) -> Vec<NodeIndex> {
        let mut order = Vec::new();
        let mut seen = BTreeSet::new();
        let mut work: Vec<(bool, NodeIndex)> =
            self.sinks().into_iter().map(|s| (true, s)).collect();

        while let Some((visit, index)) = work.pop() {
            if seen.contains(&index) {
                continue;
            }

            if visit {
                work.push((false, index));
                for operand in self.node(index).operands() {
                    work.push((true, *operand));
                }
            } else {
                seen.insert(index);
                order.push(index);
            }
        }

        order
    }

    fn to_petgraph(&self) -> Graph<(Op, AttrList), usize> {
        let mut graph = Graph::new();
        let mut map = BTreeMap::new();

        for index in self.node_indices() {
            let node = self.node(index);
            let id = graph.add_node((node.op, node.attrs.clone()));
            map.insert(index, id);
        }

        for index in self.node_indices() {
            for (pos, operand) in
                self.node(index).operands().iter().enumerate()
            {
                graph.add_edge(map[operand], map[&index], pos);
            }
        }

        graph
    }
}

impl std::ops::Index<NodeIndex> for Dag {
    type Output = Node;

    fn index(&self, index: NodeIndex) -> &Node {
        self.node(index)
    }
}

impl PartialEq for Dag {
    /**
     * Structural equality: same slot count, same input and output names,
     * and isomorphic operation graphs with equal node attributes and
     * operand positions. Node indices are allowed to differ, so a
     * serialize/deserialize round trip compares equal.
     */
    fn eq(&self, b: &Self) -> bool {
        if self.vec_size != b.vec_size {
            return false;
        }

        if self.inputs().keys().ne(b.inputs().keys())
            || self.outputs().keys().ne(b.outputs().keys())
        {
            return false;
        }

        is_isomorphic_matching(
            &self.to_petgraph(),
            &b.to_petgraph(),
            |n1, n2| n1 == n2,
            |e1, e2| e1 == e2,
        )
    }
}
