//! Transform specs, the Lua sandbox that runs generated code, and the
//! preview engine.

mod engine;
mod operations;
mod sandbox;
mod spec;

pub use engine::{PreviewEngine, PreviewOutcome};
pub use operations::{
    CellTransform, RowAudit, TransformChange, TransformFault, TransformOutput, TransformResult,
};
pub use sandbox::{lua_quote, LuaTransform, SandboxLimits};
pub use spec::{Classification, Example, TransformSpec};
