//! Database module for PostgreSQL persistence.
//!
//! Each table family backs one engine collaborator: forms and submissions
//! the schema provider and submission source, sheets the tabular store,
//! mappings the mapping store and the activity log the notifier.

mod activity;
mod forms;
mod mappings;
mod pool;
mod sheets;

pub use activity::*;
pub use forms::*;
pub use mappings::*;
pub use pool::*;
pub use sheets::*;
