pub mod antibot;
pub mod selector_policy;

pub use selector_policy::SelectorPolicy;
