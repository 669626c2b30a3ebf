//! Behavioural tests for work-graph scheduling through the public API.

use std::sync::{Mutex, PoisonError};

use rstest::rstest;
use stackdeploy::graph::{
    ConcurrencyLimits, Executors, NodeExecutor, NodeFuture, NodeState, StackPlan, WorkGraph,
    WorkNode,
};
use stackdeploy::{AssetManifest, CommandSpec, GraphError};

#[derive(Default)]
struct Journal {
    order: Mutex<Vec<String>>,
    failing: Option<String>,
}

impl Journal {
    fn order(&self) -> Vec<String> {
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.order().iter().position(|entry| entry == id)
    }
}

impl NodeExecutor<String> for Journal {
    fn execute<'a>(&'a self, node: &'a WorkNode) -> NodeFuture<'a, String> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.order
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(node.id.clone());
            if self.failing.as_deref() == Some(node.id.as_str()) {
                return Err(format!("{} exploded", node.kind));
            }
            Ok(())
        })
    }
}

fn executors(journal: &Journal) -> Executors<'_, String> {
    Executors {
        asset_build: journal,
        asset_publish: journal,
        stack_deploy: journal,
    }
}

fn plan(name: &str, assets: &[&str], depends_on: &[&str]) -> StackPlan {
    StackPlan {
        name: name.to_owned(),
        assets: assets.iter().map(|id| (*id).to_owned()).collect(),
        depends_on: depends_on.iter().map(|dep| (*dep).to_owned()).collect(),
    }
}

fn asset(id: &str) -> AssetManifest {
    AssetManifest {
        id: id.to_owned(),
        build: Some(CommandSpec::new("make", [id])),
        publish: CommandSpec::new("upload", [id]),
        published_check: None,
    }
}

#[rstest]
#[case::prebuilt(true)]
#[case::just_in_time(false)]
#[tokio::test]
async fn dependencies_are_respected(#[case] prebuild: bool) {
    let graph = WorkGraph::build(
        &[plan("db", &[], &[]), plan("api", &["image"], &["db"])],
        &[asset("image")],
        prebuild,
    )
    .expect("graph builds");
    let journal = Journal::default();

    let report = graph
        .run(&executors(&journal), ConcurrencyLimits::default())
        .await
        .expect("run finishes");

    assert!(report.is_success());
    assert!(journal.position("build:image") < journal.position("publish:image"));
    assert!(journal.position("publish:image") < journal.position("stack:api"));
    assert!(journal.position("stack:db") < journal.position("stack:api"));
    if !prebuild {
        assert!(journal.position("stack:db") < journal.position("build:image"));
    }
}

#[rstest]
#[tokio::test]
async fn stack_failure_skips_transitive_dependents() {
    let graph = WorkGraph::build(
        &[
            plan("network", &[], &[]),
            plan("cluster", &[], &["network"]),
            plan("app", &[], &["cluster"]),
            plan("monitoring", &[], &[]),
        ],
        &[],
        true,
    )
    .expect("graph builds");
    let journal = Journal {
        failing: Some(String::from("stack:network")),
        ..Journal::default()
    };

    let report = graph
        .run(&executors(&journal), ConcurrencyLimits::default())
        .await
        .expect("run finishes");

    assert_eq!(report.state("stack:cluster"), Some(NodeState::Skipped));
    assert_eq!(report.state("stack:app"), Some(NodeState::Skipped));
    assert_eq!(report.state("stack:monitoring"), Some(NodeState::Completed));
    assert_eq!(journal.order().len(), 2);
    assert_eq!(
        report.check(),
        Err(GraphError::NodeFailed {
            node: String::from("stack:network"),
            message: String::from("stack-deploy exploded"),
        })
    );
}
