pub mod lineup;
pub mod model;
pub mod solver;
pub mod wildcard;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum OptimizeError {
    #[error("no feasible {0} satisfies the constraints")]
    Infeasible(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
