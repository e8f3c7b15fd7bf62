pub mod config;
pub mod error;
pub mod ir;
pub mod logging;

pub use config::InterceptorConfig;
pub use error::{InterceptError, Result};
pub use ir::context::{ContextFrame, ContextStack};
pub use ir::equality::StructuralComparer;
pub use ir::expr_node::{Expr, ExprKind, ExprVariant};
pub use ir::interceptor::{Hookable, Interceptor, Subscription};
