// Library root: the decision engine and everything it needs, exposed for
// the command-line app and integration tests.

pub mod captaincy;
pub mod config;
pub mod engine;
pub mod fixtures;
pub mod history;
pub mod insights;
pub mod model;
pub mod optimize;
pub mod scoring;
pub mod squad;
pub mod transfers;
