pub mod graph;
pub mod definition;
pub mod tree;
pub mod engine;
pub mod executor;
pub mod migrator;
pub mod node;
pub mod syscall;
pub mod storage;
pub mod tasks;
