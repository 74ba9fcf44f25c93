//! CLI command handlers, one per file.

mod checksum;
mod fetch;
mod locate;
mod purge;

pub use checksum::run_checksum;
pub use fetch::run_fetch;
pub use locate::run_locate;
pub use purge::run_purge;
