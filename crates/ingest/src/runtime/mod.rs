//! Runtime module — binary lifecycle: boot, CLI run, shutdown.

pub mod boot;
pub mod cli;
pub mod stop;
