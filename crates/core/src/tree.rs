//! The ownership tree of delegated tasks.
//!
//! Tasks live in an arena and refer to each other by [`TaskId`]. A task
//! owns its children in the order they were attached; the parent link is
//! only an id, so the tree never holds a second owner of any task.

use std::fmt::{self, Display};
use std::sync::Arc;

use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::surface::{Anchor, Surface};
use crate::task::Task;

/// Identifies a task in a [`DelegationTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

struct Node {
    task: Task,
    parent: Option<TaskId>,
    children: Vec<TaskId>,
    anchor: Option<Anchor>,
}

/// An arena of tasks linked into a strict tree.
pub struct DelegationTree {
    nodes: Vec<Node>,
    max_depth: usize,
}

impl DelegationTree {
    /// Creates an empty tree with the default depth limit.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Creates an empty tree.
    #[inline]
    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            nodes: Vec::new(),
            max_depth: config.max_depth,
        }
    }

    /// Adds a detached task and returns its id.
    pub fn insert(&mut self, task: Task) -> TaskId {
        let id = TaskId(self.nodes.len());
        trace!("inserted `{}` as {id}", task.name());
        self.nodes.push(Node {
            task,
            parent: None,
            children: Vec::new(),
            anchor: None,
        });
        id
    }

    /// Appends `child` to the children of `parent`.
    ///
    /// Fails if either task is unknown, if `child` is `parent` or one of
    /// its ancestors, or if `child` already has a parent. On success the
    /// parent's surface is handed to every task of the child's subtree
    /// that has none.
    pub fn attach(&mut self, parent: TaskId, child: TaskId) -> Result<()> {
        self.node(parent)?;
        self.node(child)?;

        let mut steps = 0;
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                warn!("refusing to attach {child} under {parent}: cycle");
                return Err(Error::CycleDetected { parent, child });
            }
            steps += 1;
            if steps > self.max_depth {
                return Err(Error::DelegationDepthExceeded(self.max_depth));
            }
            cursor = self.node(id)?.parent;
        }
        if self.node(child)?.parent.is_some() {
            return Err(Error::AlreadyAttached(child));
        }

        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        debug!("attached {child} under {parent}");

        if let Some(surface) = self.node(parent)?.task.surface().cloned() {
            for id in self.preorder(child) {
                let task = &mut self.node_mut(id)?.task;
                if task.surface().is_none() {
                    task.set_surface(Arc::clone(&surface));
                }
            }
        }
        Ok(())
    }

    /// Returns the parent of `id`, if attached.
    #[inline]
    pub fn parent(&self, id: TaskId) -> Option<TaskId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    /// Returns the children of `id` in attach order.
    #[inline]
    pub fn children(&self, id: TaskId) -> &[TaskId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    /// Finds the child of `id` whose agent is called `name`.
    pub fn find_child(&self, id: TaskId, name: &str) -> Option<TaskId> {
        self.children(id).iter().copied().find(|&child| {
            self.task(child)
                .is_some_and(|task| task.name().eq_ignore_ascii_case(name))
        })
    }

    /// Returns how many ancestors `id` has.
    pub fn depth(&self, id: TaskId) -> Result<usize> {
        let mut depth = 0;
        let mut cursor = self.node(id)?.parent;
        while let Some(parent) = cursor {
            depth += 1;
            if depth > self.max_depth {
                return Err(Error::DelegationDepthExceeded(self.max_depth));
            }
            cursor = self.node(parent)?.parent;
        }
        Ok(depth)
    }

    /// Returns the anchor of the nearest ancestor of `id` that has one, or
    /// `None` if no ancestor has interacted yet.
    pub fn resolve_anchor(&self, id: TaskId) -> Result<Option<Anchor>> {
        let mut steps = 0;
        let mut cursor = self.node(id)?.parent;
        while let Some(parent) = cursor {
            steps += 1;
            if steps > self.max_depth {
                return Err(Error::DelegationDepthExceeded(self.max_depth));
            }
            let node = self.node(parent)?;
            if let Some(anchor) = &node.anchor {
                return Ok(Some(anchor.clone()));
            }
            cursor = node.parent;
        }
        Ok(None)
    }

    /// Records the last interaction step of `id`.
    #[inline]
    pub fn set_anchor(&mut self, id: TaskId, anchor: Anchor) -> Result<()> {
        self.node_mut(id)?.anchor = Some(anchor);
        Ok(())
    }

    /// Returns the last interaction step of `id`.
    #[inline]
    pub fn anchor(&self, id: TaskId) -> Option<&Anchor> {
        self.nodes.get(id.0).and_then(|node| node.anchor.as_ref())
    }

    /// Returns `root` and its descendants in pre-order.
    pub fn preorder(&self, root: TaskId) -> Vec<TaskId> {
        let mut order = Vec::new();
        if self.nodes.get(root.0).is_none() {
            return order;
        }
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if order.len() >= self.nodes.len() {
                // Only reachable if the links were corrupted into a cycle.
                break;
            }
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    /// Gives `surface` to every task of the subtree rooted at `root`.
    pub fn inject_surface(
        &mut self,
        root: TaskId,
        surface: Arc<dyn Surface>,
    ) -> Result<()> {
        self.node(root)?;
        for id in self.preorder(root) {
            self.node_mut(id)?.task.set_surface(Arc::clone(&surface));
        }
        Ok(())
    }

    /// Returns the task with the given id.
    #[inline]
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.nodes.get(id.0).map(|node| &node.task)
    }

    /// Returns the task with the given id, mutably.
    #[inline]
    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.nodes.get_mut(id.0).map(|node| &mut node.task)
    }

    /// Returns the number of tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree has no tasks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    fn node(&self, id: TaskId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::TaskNotFound(id))
    }

    #[inline]
    fn node_mut(&mut self, id: TaskId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(Error::TaskNotFound(id))
    }
}

impl Default for DelegationTree {
    fn default() -> Self {
        Self::new()
    }
}
