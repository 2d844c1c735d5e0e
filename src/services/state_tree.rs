use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ChoiceEffects, WorldContext};

/// Index of a node in the state tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// One point in the generation history.
#[derive(Debug, Clone)]
pub struct StateTreeNode {
    pub id: NodeId,
    /// Owned world context; never shared with another node
    pub context: WorldContext,
    pub situation_id: Option<String>,
    pub arc_id: Option<String>,
    pub parent: Option<NodeId>,
    /// Choice that led here from the parent
    pub via_choice: Option<String>,
    pub children: IndexMap<String, NodeId>,
    pub created_at_step: u32,
}

impl StateTreeNode {
    pub fn new(
        context: WorldContext,
        situation_id: Option<String>,
        arc_id: Option<String>,
        created_at_step: u32,
    ) -> Self {
        Self {
            id: NodeId(0),
            context,
            situation_id,
            arc_id,
            parent: None,
            via_choice: None,
            children: IndexMap::new(),
            created_at_step,
        }
    }
}

/// Arena-allocated navigation tree over world context snapshots.
///
/// Edges mirror generation order only: a choice that loops back or converges
/// in the content graph never adds a tree edge.
#[derive(Debug, Clone)]
pub struct StateTree {
    nodes: Vec<StateTreeNode>,
    current: NodeId,
}

impl StateTree {
    pub fn new(root: StateTreeNode) -> Self {
        let mut root = root;
        root.id = NodeId(0);
        root.parent = None;
        root.via_choice = None;
        Self {
            nodes: vec![root],
            current: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Bind the root node to the world root situation.
    pub fn bind_root(&mut self, situation_id: &str, arc_id: Option<String>) {
        let root = &mut self.nodes[0];
        root.situation_id = Some(situation_id.to_string());
        root.arc_id = arc_id;
        root.context.world_root = Some(situation_id.to_string());
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> DomainResult<&StateTreeNode> {
        self.nodes.get(id.0).ok_or(DomainError::NodeNotFound(id.0))
    }

    pub fn current_node(&self) -> &StateTreeNode {
        &self.nodes[self.current.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &StateTreeNode> {
        self.nodes.iter()
    }

    /// Attach `child` under `parent` via `choice_id` and return its id.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        choice_id: &str,
        mut child: StateTreeNode,
    ) -> DomainResult<NodeId> {
        let parent_node = self.node(parent)?;
        if parent_node.children.contains_key(choice_id) {
            return Err(DomainError::DuplicateChild {
                node: parent.0,
                choice_id: choice_id.to_string(),
            });
        }
        let id = NodeId(self.nodes.len());
        child.id = id;
        child.parent = Some(parent);
        child.via_choice = Some(choice_id.to_string());
        child.children.clear();
        self.nodes.push(child);
        self.nodes[parent.0]
            .children
            .insert(choice_id.to_string(), id);
        Ok(id)
    }

    pub fn navigate_up(&mut self) -> DomainResult<NodeId> {
        let parent = self.current_node().parent.ok_or(DomainError::NoParent)?;
        self.current = parent;
        Ok(parent)
    }

    /// Move to the child reached by `choice_id`, or the first child when `None`.
    pub fn navigate_down(&mut self, choice_id: Option<&str>) -> DomainResult<NodeId> {
        let node = self.current_node();
        let child = match choice_id {
            Some(choice) => node
                .children
                .get(choice)
                .copied()
                .ok_or_else(|| DomainError::NoSuchChild(choice.to_string()))?,
            None => node
                .children
                .values()
                .next()
                .copied()
                .ok_or_else(|| DomainError::NoSuchChild("<any>".to_string()))?,
        };
        self.current = child;
        Ok(child)
    }

    pub fn navigate_to(&mut self, id: NodeId) -> DomainResult<NodeId> {
        self.node(id)?;
        self.current = id;
        Ok(id)
    }

    /// Choice ids from the root to the current node.
    pub fn path_to_root(&self) -> Vec<String> {
        self.path_of(self.current)
    }

    /// Choice ids from the root to `id`.
    pub fn path_of(&self, id: NodeId) -> Vec<String> {
        let mut path = Vec::new();
        let mut cursor = self.nodes.get(id.0);
        while let Some(node) = cursor {
            if let Some(choice) = &node.via_choice {
                path.push(choice.clone());
            }
            cursor = node.parent.and_then(|p| self.nodes.get(p.0));
        }
        path.reverse();
        path
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.path_of(id).len()
    }

    /// First node, in creation order, showing `situation_id`.
    pub fn find_node_with_situation(&self, situation_id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.situation_id.as_deref() == Some(situation_id))
            .map(|n| n.id)
    }

    /// World context reached by following `path` from the root.
    pub fn context_at_path<S: AsRef<str>>(&self, path: &[S]) -> DomainResult<&WorldContext> {
        let mut node = &self.nodes[0];
        for choice in path {
            let next = node
                .children
                .get(choice.as_ref())
                .ok_or_else(|| DomainError::NoSuchChild(choice.as_ref().to_string()))?;
            node = &self.nodes[next.0];
        }
        Ok(&node.context)
    }

    /// Append the entities of `effects` to one node's own context.
    pub fn append_entities(&mut self, id: NodeId, effects: &ChoiceEffects) -> DomainResult<()> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or(DomainError::NodeNotFound(id.0))?;
        node.context = node.context.with_additions(effects);
        Ok(())
    }
}
