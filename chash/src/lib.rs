//! chash - Concurrent Salary Directory
//!
//! An in-memory, hash-ordered name → salary directory shared by one worker per
//! queued command, with a single reader/writer lock arbitrating access.

pub mod batch;
pub mod cli;
pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod guard;
pub mod key;
pub mod results;
pub mod settings;
pub mod store;
pub mod telemetry;

pub use dispatcher::Dispatcher;
pub use guard::Directory;
pub use store::OrderedStore;
