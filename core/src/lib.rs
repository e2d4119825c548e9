//! Grep-backed LSP endpoint for C/C++ workspaces: lexical symbol lookup over
//! a supervised `grep` child process with declaration-shape ranking.

pub mod docs;
pub mod error;
mod handlers;
pub mod heuristics;
pub mod paths;
pub mod rank;
pub mod search;
pub mod server;
pub mod transport;
pub mod uri;

pub use error::RpcError;
pub use search::GrepMatch;
pub use server::Server;
