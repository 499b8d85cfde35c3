//! Process bootstrap shared by the `api`, `engine`, and `server` binaries.

pub mod bootstrap;
