use uuid::Uuid;
use tracing::debug;
use crate::compiler::splicer::IdMapping;
use crate::error::Error;
use crate::runtime::definition::Definition;
use crate::runtime::executor::Agenda;
use crate::runtime::tree::{Instance, JoinCounter, StagedTree, TreeError, TreeMutation};

/// Where the freshly inserted nodes start running.
#[derive(Debug, Clone)]
pub struct InjectionRoots {
    /// Entry nodes of the insertion.
    pub nodes: Vec<String>,
    /// Scope pointer the new tokens live under.
    pub parent: Uuid,
    /// Join gateway created by the splice; its counter is armed before anything runs.
    pub join: Option<String>,
}

#[derive(Debug)]
pub struct MigrationResult {
    /// Working copy with every mutation applied, ready to be committed.
    pub staged: StagedTree,
    /// Pointers created while running the injected roots.
    pub created: Vec<Uuid>,
    pub rebound: usize,
}

/// Moves `instance` onto `definition` and starts the injected roots. Nothing is
/// written; the caller commits `staged` as one unit.
pub fn migrate(
    instance: &Instance,
    mapping: &IdMapping,
    definition: &Definition,
    roots: &InjectionRoots,
) -> Result<MigrationResult, Error> {
    let graph = definition.graph.as_ref();
    let mut staged = StagedTree::new(instance.clone());
    staged.push(TreeMutation::Retarget { definition: definition.id.clone() })?;

    let mut rebound = 0;
    for pointer in instance.pointers.values() {
        let conflict = || Error::MigrationConflict {
            pointer: pointer.id,
            node: pointer.node_id.clone(),
        };
        let target = mapping.resolve(&pointer.node_id).ok_or_else(conflict)?;
        if !graph.contains(target) {
            return Err(conflict());
        }
        if target != pointer.node_id {
            staged.push(TreeMutation::Rebind { pointer: pointer.id, node: target.to_string() })?;
            rebound += 1;
        }
    }

    if instance.pointer(roots.parent).is_none() {
        return Err(TreeError::UnknownPointer(roots.parent).into());
    }

    if let Some(join) = &roots.join {
        let expected = graph.incoming(join).len();
        staged.push(TreeMutation::ArmJoin(JoinCounter::new(roots.parent, join, expected)))?;
        debug!(join = %join, scope = %roots.parent, expected, "Join counter armed");
    }

    let mut agenda = Agenda::new(graph, staged);
    for node in &roots.nodes {
        agenda.enter(node, roots.parent);
    }
    agenda.run()?;
    let (staged, created) = agenda.finish();

    debug!(
        instance_id = %instance.id,
        definition = %definition.id,
        rebound,
        created = created.len(),
        "Migration staged"
    );
    Ok(MigrationResult { staged, created, rebound })
}
