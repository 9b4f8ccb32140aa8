// fplwiz application layer: upstream HTTP client, response cache, snapshot
// parsing and JSON reports for the command-line tool.

pub mod cache;
pub mod report;
pub mod snapshot;
pub mod source;
