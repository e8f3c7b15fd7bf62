pub mod evaluator;
pub mod fixtures;
pub mod generator;
