//! Lisa Dialog
//!
//! Per-session conversation state: the append-only step log, the
//! ask/answer protocol with its deadline timer, variable stores, and
//! guarded handler invocation.

pub mod context;
pub mod engine;
pub mod error;
pub mod handler;
pub mod question;
pub mod step;
pub mod vars;

pub use context::{DialogContext, Turn};
pub use engine::{DialogEngine, DialogSettings};
pub use error::DialogError;
pub use handler::{Handler, HandlerCall, HandlerResolver, ResolvedHandler};
pub use question::{AnswerCallback, Question};
pub use step::{Chain, Step, StepId, StepKind, StepLog};
pub use vars::VarStore;
