//! Dependency-aware scheduler for asset and stack work.
//!
//! A [`WorkGraph`] is an arena of [`WorkNode`]s addressed by stable string
//! ids (`build:<asset>`, `publish:<asset>`, `stack:<name>`) with adjacency
//! lists of dependency indexes. [`WorkGraph::run`] starts every node whose
//! dependencies completed, bounded by a per-kind ceiling, and skips the
//! descendants of anything that fails. In-flight work is never cancelled.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

mod builder;

pub use builder::{StackPlan, strip_published_assets};

/// Kind of work a node performs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeKind {
    /// Build an asset.
    AssetBuild,
    /// Publish a built asset.
    AssetPublish,
    /// Deploy a stack.
    StackDeploy,
}

impl NodeKind {
    /// Prefix used in node ids.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::AssetBuild => "build",
            Self::AssetPublish => "publish",
            Self::StackDeploy => "stack",
        }
    }

    /// Id of the node of this kind for `subject`.
    #[must_use]
    pub fn node_id(self, subject: &str) -> String {
        format!("{}:{subject}", self.prefix())
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AssetBuild => "asset-build",
            Self::AssetPublish => "asset-publish",
            Self::StackDeploy => "stack-deploy",
        })
    }
}

/// Lifecycle of a node within one run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Waiting for dependencies or capacity.
    Pending,
    /// Executing.
    Running,
    /// Finished successfully, or satisfied before the run.
    Completed,
    /// Executed and failed.
    Failed,
    /// Not executed because a dependency failed or was skipped.
    Skipped,
}

impl NodeState {
    /// The node will not change state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// One unit of work.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkNode {
    /// Stable id.
    pub id: String,
    /// Kind of work.
    pub kind: NodeKind,
    /// Asset id or stack name the node acts on.
    pub subject: String,
    /// Current state.
    pub state: NodeState,
    dependencies: Vec<usize>,
}

/// Errors raised while building or running a [`WorkGraph`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GraphError {
    /// A node id was added twice.
    #[error("work graph already contains node {id}")]
    DuplicateNode {
        /// Offending id.
        id: String,
    },
    /// An edge names a node that does not exist.
    #[error("work graph has no node {id}")]
    UnknownNode {
        /// Missing id.
        id: String,
    },
    /// A stack references an asset missing from the manifest.
    #[error("stack {stack} references unknown asset {asset}")]
    UnknownAsset {
        /// Referencing stack.
        stack: String,
        /// Missing asset id.
        asset: String,
    },
    /// Some nodes can never become ready.
    #[error("dependency cycle between {}", nodes.join(", "))]
    Cycle {
        /// Ids of the stuck nodes.
        nodes: Vec<String>,
    },
    /// A ceiling of zero would never start any node of that kind.
    #[error("concurrency for {kind} must be at least 1")]
    InvalidConcurrency {
        /// Kind with the zero ceiling.
        kind: NodeKind,
    },
    /// A node failed during the run.
    #[error("{node} failed: {message}")]
    NodeFailed {
        /// Id of the first failing node.
        node: String,
        /// Failure message.
        message: String,
    },
}

/// Maximum number of simultaneously running nodes per kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConcurrencyLimits {
    /// Asset builds.
    pub asset_build: usize,
    /// Asset publishes.
    pub asset_publish: usize,
    /// Stack deployments.
    pub stack_deploy: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            asset_build: 1,
            asset_publish: 8,
            stack_deploy: 1,
        }
    }
}

impl ConcurrencyLimits {
    /// Ceiling for `kind`.
    #[must_use]
    pub const fn limit(&self, kind: NodeKind) -> usize {
        match kind {
            NodeKind::AssetBuild => self.asset_build,
            NodeKind::AssetPublish => self.asset_publish,
            NodeKind::StackDeploy => self.stack_deploy,
        }
    }

    fn validate(&self) -> Result<(), GraphError> {
        [
            NodeKind::AssetBuild,
            NodeKind::AssetPublish,
            NodeKind::StackDeploy,
        ]
        .into_iter()
        .find(|kind| self.limit(*kind) == 0)
        .map_or(Ok(()), |kind| Err(GraphError::InvalidConcurrency { kind }))
    }
}

/// Future returned by node executors.
pub type NodeFuture<'a, E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'a>>;

/// Performs the work of one node kind.
pub trait NodeExecutor<E>: Send + Sync {
    /// Executes `node`.
    fn execute<'a>(&'a self, node: &'a WorkNode) -> NodeFuture<'a, E>;
}

/// The executor used for each node kind.
pub struct Executors<'a, E> {
    /// Runs asset builds.
    pub asset_build: &'a dyn NodeExecutor<E>,
    /// Runs asset publishes.
    pub asset_publish: &'a dyn NodeExecutor<E>,
    /// Runs stack deployments.
    pub stack_deploy: &'a dyn NodeExecutor<E>,
}

impl<'a, E> Executors<'a, E> {
    const fn for_kind(&self, kind: NodeKind) -> &'a dyn NodeExecutor<E> {
        match kind {
            NodeKind::AssetBuild => self.asset_build,
            NodeKind::AssetPublish => self.asset_publish,
            NodeKind::StackDeploy => self.stack_deploy,
        }
    }
}

/// Terminal state of every node after a run.
#[derive(Debug)]
pub struct RunReport<E> {
    /// Nodes in insertion order.
    pub nodes: Vec<WorkNode>,
    /// Failures in the order they settled.
    pub failures: Vec<(String, E)>,
}

impl<E> RunReport<E> {
    /// Every node completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The first failure to settle.
    #[must_use]
    pub fn first_failure(&self) -> Option<(&str, &E)> {
        self.failures
            .first()
            .map(|(node, error)| (node.as_str(), error))
    }

    /// Terminal state of the node with `id`.
    #[must_use]
    pub fn state(&self, id: &str) -> Option<NodeState> {
        self.nodes
            .iter()
            .find(|node| node.id == id)
            .map(|node| node.state)
    }

    /// Failure recorded for the node with `id`.
    #[must_use]
    pub fn failure(&self, id: &str) -> Option<&E> {
        self.failures
            .iter()
            .find(|(node, _)| node == id)
            .map(|(_, error)| error)
    }

    /// Converts the first failure into a [`GraphError::NodeFailed`].
    ///
    /// # Errors
    ///
    /// Returns the first failure when any node failed.
    pub fn check(&self) -> Result<(), GraphError>
    where
        E: fmt::Display,
    {
        self.first_failure().map_or(Ok(()), |(node, error)| {
            Err(GraphError::NodeFailed {
                node: node.to_owned(),
                message: error.to_string(),
            })
        })
    }
}

#[derive(Default)]
struct Slots {
    asset_build: usize,
    asset_publish: usize,
    stack_deploy: usize,
}

impl Slots {
    const fn count_mut(&mut self, kind: NodeKind) -> &mut usize {
        match kind {
            NodeKind::AssetBuild => &mut self.asset_build,
            NodeKind::AssetPublish => &mut self.asset_publish,
            NodeKind::StackDeploy => &mut self.stack_deploy,
        }
    }
}

/// Arena of work nodes with dependency edges.
#[derive(Clone, Debug, Default)]
pub struct WorkGraph {
    nodes: Vec<WorkNode>,
    index: HashMap<String, usize>,
}

impl WorkGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pending node and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateNode`] when the id already exists.
    pub fn add_node(&mut self, kind: NodeKind, subject: &str) -> Result<String, GraphError> {
        let id = kind.node_id(subject);
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateNode { id });
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(WorkNode {
            id: id.clone(),
            kind,
            subject: subject.to_owned(),
            state: NodeState::Pending,
            dependencies: Vec::new(),
        });
        Ok(id)
    }

    /// Makes `node` wait for `dependency`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] when either id is missing.
    pub fn add_dependency(&mut self, node: &str, dependency: &str) -> Result<(), GraphError> {
        let target = self.position(dependency)?;
        let source = self.position(node)?;
        if let Some(found) = self.nodes.get_mut(source)
            && !found.dependencies.contains(&target)
        {
            found.dependencies.push(target);
        }
        Ok(())
    }

    /// Whether a node with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Nodes in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &[WorkNode] {
        &self.nodes
    }

    /// Looks a node up by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&WorkNode> {
        self.index.get(id).and_then(|index| self.nodes.get(*index))
    }

    /// Ids of the direct dependencies of `id`.
    #[must_use]
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.node(id)
            .map(|node| {
                node.dependencies
                    .iter()
                    .filter_map(|dep| self.nodes.get(*dep))
                    .map(|dep| dep.id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Marks a node as satisfied before the run starts.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] when the id is missing.
    pub fn mark_completed(&mut self, id: &str) -> Result<(), GraphError> {
        let position = self.position(id)?;
        if let Some(node) = self.nodes.get_mut(position) {
            node.state = NodeState::Completed;
        }
        Ok(())
    }

    /// Whether `from` reaches `to` by following dependency edges.
    #[must_use]
    pub fn depends_transitively(&self, from: &str, to: &str) -> bool {
        let (Some(start), Some(goal)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![*start];
        while let Some(current) = stack.pop() {
            if current == *goal {
                return true;
            }
            if let Some(flag) = seen.get_mut(current) {
                if *flag {
                    continue;
                }
                *flag = true;
            }
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.dependencies.iter().copied());
            }
        }
        false
    }

    /// Rejects graphs whose pending nodes can never all become ready.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] naming the nodes left unresolved.
    pub fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut resolved: Vec<bool> = self
            .nodes
            .iter()
            .map(|node| node.state.is_terminal())
            .collect();
        loop {
            let mut progressed = false;
            for (position, node) in self.nodes.iter().enumerate() {
                if resolved.get(position).copied().unwrap_or(true) {
                    continue;
                }
                let ready = node
                    .dependencies
                    .iter()
                    .all(|dep| resolved.get(*dep).copied().unwrap_or(false));
                if ready && let Some(flag) = resolved.get_mut(position) {
                    *flag = true;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        let stuck: Vec<String> = self
            .nodes
            .iter()
            .zip(&resolved)
            .filter(|(_, done)| !**done)
            .map(|(node, _)| node.id.clone())
            .collect();
        if stuck.is_empty() {
            Ok(())
        } else {
            Err(GraphError::Cycle { nodes: stuck })
        }
    }

    /// Runs every pending node through `executors`.
    ///
    /// The run ends once every node is terminal. Node failures are recorded
    /// in the returned report rather than raised, so callers still see the
    /// outcome of independent branches.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidConcurrency`] for a zero ceiling and
    /// [`GraphError::Cycle`] when some nodes can never start.
    pub async fn run<E: Send>(
        mut self,
        executors: &Executors<'_, E>,
        limits: ConcurrencyLimits,
    ) -> Result<RunReport<E>, GraphError> {
        limits.validate()?;
        self.check_acyclic()?;

        let mut failures = Vec::new();
        let mut slots = Slots::default();
        let mut in_flight = FuturesUnordered::new();

        loop {
            self.propagate_skips();
            for position in self.ready_nodes() {
                let Some(node) = self.nodes.get_mut(position) else {
                    continue;
                };
                let running = slots.count_mut(node.kind);
                if *running >= limits.limit(node.kind) {
                    continue;
                }
                *running += 1;
                node.state = NodeState::Running;
                debug!(node = %node.id, "starting node");
                let executor = executors.for_kind(node.kind);
                let snapshot = node.clone();
                in_flight.push(async move {
                    let result = executor.execute(&snapshot).await;
                    (position, result)
                });
            }

            let Some((position, result)) = in_flight.next().await else {
                break;
            };
            let Some(node) = self.nodes.get_mut(position) else {
                continue;
            };
            let running = slots.count_mut(node.kind);
            *running = running.saturating_sub(1);
            match result {
                Ok(()) => {
                    debug!(node = %node.id, "node completed");
                    node.state = NodeState::Completed;
                }
                Err(err) => {
                    warn!(node = %node.id, "node failed");
                    node.state = NodeState::Failed;
                    failures.push((node.id.clone(), err));
                }
            }
        }

        let stuck: Vec<String> = self
            .nodes
            .iter()
            .filter(|node| !node.state.is_terminal())
            .map(|node| node.id.clone())
            .collect();
        if !stuck.is_empty() {
            return Err(GraphError::Cycle { nodes: stuck });
        }
        info!(
            nodes = self.nodes.len(),
            failed = failures.len(),
            "work graph finished"
        );
        Ok(RunReport {
            nodes: self.nodes,
            failures,
        })
    }

    fn position(&self, id: &str) -> Result<usize, GraphError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode { id: id.to_owned() })
    }

    fn dependency_states(&self, node: &WorkNode) -> impl Iterator<Item = NodeState> {
        node.dependencies
            .iter()
            .filter_map(|dep| self.nodes.get(*dep))
            .map(|dep| dep.state)
    }

    fn ready_nodes(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.state == NodeState::Pending)
            .filter(|(_, node)| {
                self.dependency_states(node)
                    .all(|state| state == NodeState::Completed)
            })
            .map(|(position, _)| position)
            .collect()
    }

    fn propagate_skips(&mut self) {
        loop {
            let doomed: Vec<usize> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(_, node)| node.state == NodeState::Pending)
                .filter(|(_, node)| {
                    self.dependency_states(node)
                        .any(|state| matches!(state, NodeState::Failed | NodeState::Skipped))
                })
                .map(|(position, _)| position)
                .collect();
            if doomed.is_empty() {
                return;
            }
            for position in doomed {
                if let Some(node) = self.nodes.get_mut(position) {
                    info!(node = %node.id, "skipping node after dependency failure");
                    node.state = NodeState::Skipped;
                }
            }
        }
    }
}
