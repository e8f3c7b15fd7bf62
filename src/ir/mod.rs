pub mod classify;
pub mod context;
pub mod equality;
pub mod expr_node;
pub mod identity;
pub mod interceptor;
pub mod operators;
pub mod pipeline;
