use std::collections::VecDeque;
use uuid::Uuid;
use tracing::debug;
use crate::error::{Error, GraphError};
use crate::nodes::behavior_for;
use crate::runtime::graph::Graph;
use crate::runtime::syscall::Syscall;
use crate::runtime::tree::{ExecutionPointer, Instance, StagedTree, TreeError, TreeMutation};

/// A token in flight: about to enter `node` inside the scope pointer `parent`.
#[derive(Debug, Clone)]
struct Token {
    node: String,
    parent: Uuid,
}

#[derive(Debug)]
enum Command {
    Jump(Vec<String>),
    Wait,
    OpenScope(String),
    Join { expected: usize, next: Vec<String> },
    Terminate,
}

struct StepSyscall {
    commands: Vec<Command>,
}

impl Syscall for StepSyscall {
    fn jump(&mut self, targets: Vec<String>) {
        self.commands.push(Command::Jump(targets));
    }

    fn wait(&mut self) {
        self.commands.push(Command::Wait);
    }

    fn open_scope(&mut self, start: String) {
        self.commands.push(Command::OpenScope(start));
    }

    fn join(&mut self, expected: usize, next: Vec<String>) {
        self.commands.push(Command::Join { expected, next });
    }

    fn terminate(&mut self) {
        self.commands.push(Command::Terminate);
    }
}

/// Drives tokens through a graph until every one of them rests on a wait state,
/// recording each tree change on a staged copy.
pub struct Agenda<'g> {
    graph: &'g Graph,
    tree: StagedTree,
    queue: VecDeque<Token>,
    spawned: Vec<Uuid>,
}

impl<'g> Agenda<'g> {
    pub fn new(graph: &'g Graph, tree: StagedTree) -> Self {
        Self {
            graph,
            tree,
            queue: VecDeque::new(),
            spawned: Vec::new(),
        }
    }

    pub fn view(&self) -> &Instance {
        self.tree.view()
    }

    pub fn push(&mut self, mutation: TreeMutation) -> Result<(), Error> {
        self.tree.push(mutation)?;
        Ok(())
    }

    /// Queues a token that will enter `node` under the scope pointer `parent`.
    pub fn enter(&mut self, node: &str, parent: Uuid) {
        self.queue.push_back(Token {
            node: node.to_string(),
            parent,
        });
    }

    /// Moves the token parked on `pointer` along the node's outgoing flows.
    pub fn complete(&mut self, pointer: Uuid) -> Result<(), Error> {
        let p = self.tree.view().pointer(pointer)
            .cloned()
            .ok_or(TreeError::UnknownPointer(pointer))?;
        let parent = p.parent.ok_or(TreeError::UnknownPointer(pointer))?;
        self.push(TreeMutation::Remove { pointer })?;
        self.leave_node(&p.node_id, parent)
    }

    pub fn run(&mut self) -> Result<(), Error> {
        while let Some(token) = self.queue.pop_front() {
            self.step(token)?;
        }
        Ok(())
    }

    /// The staged tree and the pointers created while running.
    pub fn finish(self) -> (StagedTree, Vec<Uuid>) {
        (self.tree, self.spawned)
    }

    fn step(&mut self, token: Token) -> Result<(), Error> {
        let graph = self.graph;
        let node = graph.node(&token.node)
            .ok_or_else(|| GraphError::invalid(&graph.id, format!("token entered unknown node '{}'", token.node)))?;
        let behavior = behavior_for(&node.kind);
        debug!(node = %node.id, kind = behavior.name(), scope = %token.parent, "Token entered node");

        let mut syscall = StepSyscall { commands: Vec::new() };
        behavior.execute(node, graph, &mut syscall)?;

        for command in syscall.commands {
            match command {
                Command::Jump(targets) => self.jump(targets, token.parent)?,
                Command::Wait => {
                    self.spawn(&token.node, token.parent)?;
                }
                Command::OpenScope(start) => {
                    let scope = self.spawn(&token.node, token.parent)?;
                    self.enter(&start, scope);
                }
                Command::Join { expected, next } => {
                    self.push(TreeMutation::Arrive {
                        scope: token.parent,
                        join: token.node.clone(),
                        expected,
                    })?;
                    let complete = self.tree.view()
                        .join(token.parent, &token.node)
                        .is_some_and(|c| c.is_complete());
                    if complete {
                        debug!(join = %token.node, scope = %token.parent, "Join complete");
                        self.push(TreeMutation::ReleaseJoin {
                            scope: token.parent,
                            join: token.node.clone(),
                        })?;
                        self.jump(next, token.parent)?;
                    }
                }
                Command::Terminate => self.terminate(token.parent)?,
            }
        }
        Ok(())
    }

    fn spawn(&mut self, node: &str, parent: Uuid) -> Result<Uuid, Error> {
        let pointer = ExecutionPointer {
            id: Uuid::new_v4(),
            instance_id: self.tree.view().id,
            parent: Some(parent),
            node_id: node.to_string(),
        };
        let id = pointer.id;
        self.push(TreeMutation::Spawn(pointer))?;
        self.spawned.push(id);
        Ok(id)
    }

    fn jump(&mut self, targets: Vec<String>, parent: Uuid) -> Result<(), Error> {
        if targets.is_empty() {
            return self.terminate(parent);
        }
        for target in targets {
            self.enter(&target, parent);
        }
        Ok(())
    }

    fn leave_node(&mut self, node: &str, parent: Uuid) -> Result<(), Error> {
        let targets = self.graph.successors(node);
        self.jump(targets, parent)
    }

    /// Completes `scope` once nothing is left running inside it.
    fn terminate(&mut self, scope: Uuid) -> Result<(), Error> {
        let view = self.tree.view();
        if view.has_children(scope) || self.queue.iter().any(|t| t.parent == scope) {
            return Ok(());
        }
        let Some(pointer) = view.pointer(scope).cloned() else {
            return Ok(());
        };

        self.push(TreeMutation::Remove { pointer: scope })?;
        match pointer.parent {
            None => {
                debug!(instance_id = %pointer.instance_id, "Root scope completed");
                Ok(())
            }
            Some(parent) => {
                debug!(sub_process = %pointer.node_id, "Sub-process scope completed");
                self.leave_node(&pointer.node_id, parent)
            }
        }
    }
}
