use std::collections::{HashMap, HashSet};

use crate::{errors::GraphError, types::ComponentId};

/// Stable address of a [Node] inside a [GraphArena]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(usize);

/// One vertex of a dependency graph
///
/// Children are kept in the order the provider declared them, parents are
/// every node which adopted this node as a child.
#[derive(Debug, Clone)]
pub struct Node {
    id: ComponentId,
    children: Vec<NodeIndex>,
    parents: Vec<NodeIndex>,
}
impl Node {
    fn new(id: ComponentId) -> Self {
        Node {
            id,
            children: Vec::new(),
            parents: Vec::new(),
        }
    }

    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    pub fn parents(&self) -> &[NodeIndex] {
        &self.parents
    }
}

/// Knowledge about registered components the graph is built from
pub trait DependencySource {
    /// Ordered dependencies of a registered component - None if no provider is registered
    fn dependencies_of(&self, id: &ComponentId) -> Option<Vec<ComponentId>>;

    /// Whether an instance of the component already exists
    fn is_initialized(&self, id: &ComponentId) -> bool;

    fn is_registered(&self, id: &ComponentId) -> bool {
        self.dependencies_of(id).is_some()
    }
}

/// Storage of all dependency graphs of a container
///
/// Graphs are memoized per identifier: every registered component owns exactly one node,
/// a dependency shared by many dependents is the same node with many parents.
/// Memoized graphs stay valid as long as no providers are registered after they were built.
#[derive(Debug, Default)]
pub struct GraphArena {
    nodes: Vec<Node>,
    memoized: HashMap<ComponentId, NodeIndex>,
}

impl GraphArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    /// If the index belongs to another arena or was released
    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root node of the memoized graph of a component
    pub fn memoized(&self, id: &ComponentId) -> Option<NodeIndex> {
        self.memoized.get(id).copied()
    }

    pub fn graph(&self, root: NodeIndex) -> DependencyGraph<'_> {
        DependencyGraph { arena: self, root }
    }

    /// Adds a free node - it is neither memoized nor linked
    pub fn insert(&mut self, id: impl Into<ComponentId>) -> NodeIndex {
        let index = NodeIndex(self.nodes.len());
        self.nodes.push(Node::new(id.into()));
        index
    }

    /// Memoizes a node without dependencies, or returns the existing one
    pub fn insert_leaf(&mut self, id: impl Into<ComponentId>) -> NodeIndex {
        let id = id.into();
        if let Some(existing) = self.memoized(&id) {
            return existing;
        }
        let index = self.insert(id.clone());
        self.memoized.insert(id, index);
        index
    }

    /// Links `child` below `parent`
    ///
    /// Fails if `parent` is `child` itself or one of its dependents, the link would close a cycle.
    pub fn adopt_child(&mut self, parent: NodeIndex, child: NodeIndex) -> Result<(), GraphError> {
        let required = self.nodes[child.0].id.clone();
        tracing::trace!("Adopting '{}' by '{}'", required, self.nodes[parent.0].id);

        if let Some(chain) = self.requesting_chain(parent, &required) {
            return Err(GraphError::CyclicDependency { required, chain });
        }

        self.nodes[child.0].parents.push(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Walks all ancestors of `from` (inclusive) looking for `required`
    ///
    /// Returns the chain from the ancestor carrying `required` down to `from`.
    fn requesting_chain(
        &self,
        from: NodeIndex,
        required: &ComponentId,
    ) -> Option<Vec<ComponentId>> {
        if required.is_container() {
            return None;
        }

        // ancestor -> the dependent we reached it from
        let mut reached_from: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut visited = HashSet::from([from]);
        let mut to_check = vec![from];

        while let Some(current) = to_check.pop() {
            if self.nodes[current.0].id == *required {
                let mut chain = vec![self.nodes[current.0].id.clone()];
                let mut cursor = current;
                while let Some(&dependent) = reached_from.get(&cursor) {
                    chain.push(self.nodes[dependent.0].id.clone());
                    cursor = dependent;
                }
                return Some(chain);
            }

            for &ancestor in &self.nodes[current.0].parents {
                if visited.insert(ancestor) {
                    reached_from.insert(ancestor, current);
                    to_check.push(ancestor);
                }
            }
        }

        None
    }

    /// Builds the memoized graph of a component, reusing memoized subgraphs
    ///
    /// Components without a provider become leaves, callers are expected to check
    /// the root is registered. A failed build leaves the arena untouched.
    pub fn build(
        &mut self,
        id: &ComponentId,
        source: &impl DependencySource,
    ) -> Result<NodeIndex, GraphError> {
        if let Some(existing) = self.memoized(id) {
            return Ok(existing);
        }

        let Some(dependencies) = source.dependencies_of(id) else {
            return Ok(self.insert_leaf(id));
        };

        let checkpoint = self.nodes.len();
        let root = self.insert_leaf(id);
        match self.expand(vec![(root, dependencies)], source) {
            Ok(()) => {
                tracing::debug!(
                    "Built dependency graph for '{}' [{} nodes in arena]",
                    id,
                    self.nodes.len()
                );
                Ok(root)
            }
            Err(err) => {
                self.rollback(checkpoint);
                Err(err)
            }
        }
    }

    /// Builds a graph whose root is not memoized
    ///
    /// Used for components constructed without registration. The dependencies are
    /// memoized as usual. Release the root with [GraphArena::release] once done.
    pub fn build_detached(
        &mut self,
        id: &ComponentId,
        dependencies: Vec<ComponentId>,
        source: &impl DependencySource,
    ) -> Result<NodeIndex, GraphError> {
        let mut children = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            check_satisfied(&dependency, id, source)?;
            children.push(self.build(&dependency, source)?);
        }

        let checkpoint = self.nodes.len();
        let root = self.insert(id.clone());
        for child in children {
            if let Err(err) = self.adopt_child(root, child) {
                self.rollback(checkpoint);
                return Err(err);
            }
        }

        Ok(root)
    }

    /// Removes a detached root built by [GraphArena::build_detached]
    ///
    /// Nodes built after the root keep their indices, so a root which is not the last
    /// node is only unlinked from its children and its slot stays unused.
    pub fn release(&mut self, root: NodeIndex) {
        if self.memoized.get(&self.nodes[root.0].id) == Some(&root) {
            tracing::warn!("Refusing to release memoized node '{}'", self.nodes[root.0].id);
            return;
        }

        if root.0 + 1 == self.nodes.len() {
            self.rollback(root.0);
            return;
        }

        for child in std::mem::take(&mut self.nodes[root.0].children) {
            self.nodes[child.0].parents.retain(|parent| *parent != root);
        }
    }

    /// Processes the worklist of (node, declared dependencies)
    fn expand(
        &mut self,
        mut worklist: Vec<(NodeIndex, Vec<ComponentId>)>,
        source: &impl DependencySource,
    ) -> Result<(), GraphError> {
        while let Some((node, dependencies)) = worklist.pop() {
            let requester = self.nodes[node.0].id.clone();

            for dependency in dependencies {
                check_satisfied(&dependency, &requester, source)?;

                let child = match self.memoized(&dependency) {
                    Some(existing) => existing,
                    None => {
                        let child = self.insert_leaf(dependency.clone());
                        if let Some(nested) = source.dependencies_of(&dependency) {
                            worklist.push((child, nested));
                        }
                        child
                    }
                };

                self.adopt_child(node, child)?;
            }
        }

        Ok(())
    }

    /// Drops every node from `len` onward together with all links to them
    fn rollback(&mut self, len: usize) {
        self.nodes.truncate(len);
        self.memoized.retain(|_, index| index.0 < len);
        for node in &mut self.nodes {
            node.parents.retain(|parent| parent.0 < len);
            node.children.retain(|child| child.0 < len);
        }
    }
}

fn check_satisfied(
    dependency: &ComponentId,
    required_by: &ComponentId,
    source: &impl DependencySource,
) -> Result<(), GraphError> {
    if source.is_initialized(dependency) || source.is_registered(dependency) {
        return Ok(());
    }

    Err(GraphError::UnsatisfiedDependency {
        dependency: dependency.clone(),
        required_by: required_by.clone(),
    })
}

/// A dependency graph rooted at one node of a [GraphArena]
#[derive(Clone, Copy)]
pub struct DependencyGraph<'a> {
    arena: &'a GraphArena,
    root: NodeIndex,
}
impl<'a> DependencyGraph<'a> {
    pub fn root(&self) -> &'a Node {
        self.arena.node(self.root)
    }

    pub fn root_index(&self) -> NodeIndex {
        self.root
    }

    /// Every node, children before their parent, ending with the root
    ///
    /// A node shared by several parents is yielded once below each of them.
    pub fn iter(&self) -> impl Iterator<Item = &'a Node> + 'a {
        self.iter_filtered(|_| true)
    }

    /// Like [DependencyGraph::iter], but nodes rejected by `descend` are yielded
    /// without visiting their children
    pub fn iter_filtered<F>(&self, descend: F) -> Traversal<'a, F>
    where
        F: FnMut(&Node) -> bool,
    {
        Traversal {
            arena: self.arena,
            order: PostOrder::new(self.root),
            descend,
        }
    }
}

/// Lazy post-order iterator over a [DependencyGraph]
pub struct Traversal<'a, F> {
    arena: &'a GraphArena,
    order: PostOrder,
    descend: F,
}
impl<'a, F: FnMut(&Node) -> bool> Iterator for Traversal<'a, F> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let arena = self.arena;
        self.order
            .advance(arena, &mut self.descend)
            .map(|index| arena.node(index))
    }
}

/// Post-order traversal state, independent of any borrow of the arena
///
/// Stepping with [PostOrder::advance] allows releasing locks on the arena between steps.
#[derive(Debug, Clone)]
pub struct PostOrder {
    ancestors: Vec<Frame>,
    cursor: Cursor,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeIndex,
    next_child: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Visit this node, descending into its children if allowed
    Descend(NodeIndex),
    /// Continue with the next sibling, or yield the parent
    Backtrack,
    Done,
}

impl PostOrder {
    pub fn new(root: NodeIndex) -> Self {
        PostOrder {
            ancestors: Vec::new(),
            cursor: Cursor::Descend(root),
        }
    }

    pub fn is_done(&self) -> bool {
        self.cursor == Cursor::Done
    }

    /// Returns the next node whose children were all yielded before
    pub fn advance(
        &mut self,
        arena: &GraphArena,
        mut descend: impl FnMut(&Node) -> bool,
    ) -> Option<NodeIndex> {
        loop {
            match self.cursor {
                Cursor::Descend(index) => {
                    let node = arena.node(index);
                    if !node.children.is_empty() && descend(node) {
                        self.ancestors.push(Frame {
                            node: index,
                            next_child: 1,
                        });
                        self.cursor = Cursor::Descend(node.children[0]);
                    } else {
                        self.cursor = Cursor::Backtrack;
                        return Some(index);
                    }
                }
                Cursor::Backtrack => {
                    let Some(frame) = self.ancestors.last_mut() else {
                        self.cursor = Cursor::Done;
                        return None;
                    };

                    match arena.node(frame.node).children.get(frame.next_child) {
                        Some(&sibling) => {
                            frame.next_child += 1;
                            self.cursor = Cursor::Descend(sibling);
                        }
                        None => {
                            let finished = frame.node;
                            self.ancestors.pop();
                            return Some(finished);
                        }
                    }
                }
                Cursor::Done => return None,
            }
        }
    }
}
