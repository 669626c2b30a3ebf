//! Construction of the work graph from the selected stacks.

use std::collections::BTreeSet;

use tracing::{info, warn};

use super::{GraphError, NodeKind, NodeState, WorkGraph};
use crate::assets::{AssetManifest, AssetPublisher};

/// What the graph needs to know about one selected stack.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StackPlan {
    /// Stack name.
    pub name: String,
    /// Ids of the assets the template references.
    pub assets: Vec<String>,
    /// Stacks that must deploy first.
    pub depends_on: Vec<String>,
}

impl WorkGraph {
    /// Builds the graph for `stacks`.
    ///
    /// Each referenced asset gets one build and one publish node, shared by
    /// every stack that references it. Dependencies on stacks outside
    /// `stacks` are ignored. With `prebuild` disabled, a stack's asset
    /// builds also wait for everything the stack itself waits for, so they
    /// run just before the stack.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownAsset`] for asset ids missing from
    /// `assets` and [`GraphError::DuplicateNode`] for repeated stack names.
    pub fn build(
        stacks: &[StackPlan],
        assets: &[AssetManifest],
        prebuild: bool,
    ) -> Result<Self, GraphError> {
        let known: BTreeSet<&str> = assets.iter().map(|asset| asset.id.as_str()).collect();
        let selected: BTreeSet<&str> = stacks.iter().map(|stack| stack.name.as_str()).collect();
        let mut graph = Self::new();

        for stack in stacks {
            let stack_node = graph.add_node(NodeKind::StackDeploy, &stack.name)?;
            for asset in &stack.assets {
                if !known.contains(asset.as_str()) {
                    return Err(GraphError::UnknownAsset {
                        stack: stack.name.clone(),
                        asset: asset.clone(),
                    });
                }
                let publish = NodeKind::AssetPublish.node_id(asset);
                if !graph.contains(&publish) {
                    let build = graph.add_node(NodeKind::AssetBuild, asset)?;
                    graph.add_node(NodeKind::AssetPublish, asset)?;
                    graph.add_dependency(&publish, &build)?;
                }
                graph.add_dependency(&stack_node, &publish)?;
            }
        }

        for stack in stacks {
            let stack_node = NodeKind::StackDeploy.node_id(&stack.name);
            for dependency in &stack.depends_on {
                if selected.contains(dependency.as_str()) {
                    graph.add_dependency(&stack_node, &NodeKind::StackDeploy.node_id(dependency))?;
                }
            }
        }

        if !prebuild {
            for stack in stacks {
                graph.defer_builds(stack)?;
            }
        }
        Ok(graph)
    }

    fn defer_builds(&mut self, stack: &StackPlan) -> Result<(), GraphError> {
        let stack_node = NodeKind::StackDeploy.node_id(&stack.name);
        let own_publishes: BTreeSet<String> = stack
            .assets
            .iter()
            .map(|asset| NodeKind::AssetPublish.node_id(asset))
            .collect();
        let waits_for: Vec<String> = self
            .dependencies(&stack_node)
            .into_iter()
            .filter(|dep| !own_publishes.contains(*dep))
            .map(str::to_owned)
            .collect();
        for asset in &stack.assets {
            let build = NodeKind::AssetBuild.node_id(asset);
            for dependency in &waits_for {
                // A shared asset may already feed this dependency.
                if self.depends_transitively(dependency, &build) {
                    continue;
                }
                self.add_dependency(&build, dependency)?;
            }
        }
        Ok(())
    }
}

/// Marks the build and publish nodes of already-published assets as
/// completed, returning how many assets were stripped.
///
/// Nothing is stripped when `force_republish` is set. A failing publication
/// check leaves the asset in the graph.
pub async fn strip_published_assets<P>(
    graph: &mut WorkGraph,
    publisher: &P,
    assets: &[AssetManifest],
    force_republish: bool,
) -> usize
where
    P: AssetPublisher + ?Sized,
{
    if force_republish {
        return 0;
    }
    let mut stripped = 0;
    for asset in assets {
        let publish = NodeKind::AssetPublish.node_id(&asset.id);
        if graph.node(&publish).map(|node| node.state) != Some(NodeState::Pending) {
            continue;
        }
        match publisher.is_published(asset).await {
            Ok(true) => {
                let build = NodeKind::AssetBuild.node_id(&asset.id);
                if graph.mark_completed(&build).is_ok() && graph.mark_completed(&publish).is_ok() {
                    info!(asset = %asset.id, "asset already published");
                    stripped += 1;
                }
            }
            Ok(false) => {}
            Err(err) => {
                warn!(asset = %asset.id, error = %err, "could not check whether asset is published");
            }
        }
    }
    stripped
}
