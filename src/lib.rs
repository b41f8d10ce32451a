pub mod compiler;
pub mod config;
pub mod dsl;
pub mod error;
pub mod injection;
pub mod nodes;
pub mod runtime;
