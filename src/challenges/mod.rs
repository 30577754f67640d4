// Challenge handling for the lookup form: validation, solving, page classification and the retrieval loop.

pub mod core;
pub mod detectors;
pub mod pipeline;
pub mod solvers;
