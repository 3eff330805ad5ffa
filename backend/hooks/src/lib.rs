pub mod builtin;
pub mod pipeline;
pub mod registry;
pub mod types;

pub use builtin::{default_answer_rule, register_builtin_actions, DefaultAnswer, LogRule, RegexRewrite};
pub use pipeline::RulePipeline;
pub use registry::{ActionRegistry, RuleSet};
pub use types::{DispatchRule, RuleAction, RuleError, RuleRecord};
