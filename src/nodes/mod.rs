pub mod common;
pub mod flow;
pub mod activity;

use crate::runtime::graph::NodeKind;
use crate::runtime::node::NodeBehavior;

static START: common::StartNode = common::StartNode;
static END: common::EndNode = common::EndNode;
static USER_TASK: activity::UserTaskNode = activity::UserTaskNode;
static SUB_PROCESS: activity::SubProcessNode = activity::SubProcessNode;
static FORK: flow::ForkNode = flow::ForkNode;
static JOIN: flow::JoinNode = flow::JoinNode;

/// The behaviour that runs when a token enters a node of the given kind.
pub fn behavior_for(kind: &NodeKind) -> &'static dyn NodeBehavior {
    match kind {
        NodeKind::Start => &START,
        NodeKind::End => &END,
        NodeKind::UserTask { .. } => &USER_TASK,
        NodeKind::SubProcess => &SUB_PROCESS,
        NodeKind::Fork { .. } => &FORK,
        NodeKind::Join { .. } => &JOIN,
    }
}
