pub mod error;
pub mod event;
pub mod kind;
pub mod namespace;
pub mod request;
pub mod scope;
pub mod value;

pub use error::ValidationError;
pub use kind::{Direction, RuleKind, ValueShape, Verb, KEY_PREFIX};
pub use namespace::EntityLevel;
pub use request::{BulkForm, BulkRequest, ElementaryOp, RuleForm, RuleRequest, SingleRequest};
pub use scope::{AuditScope, Scope, ScopeFields, ScopeName};
pub use value::{ElementaryRule, PortSpec};
