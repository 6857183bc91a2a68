//! Fit decoded JSON into strongly typed Rust values, and explain precisely
//! where and why a value does not fit.
//!
//! ```ignore
//! let story: Story = json_fit::fit(&payload)?;
//! ```
//!
//! Types opt in through [`Fit`]. A failed fit produces a [`Node`] tree
//! mirroring the input, which the [`report`] module renders as annotated
//! JSON5. Types can also be declared at runtime in a [`Schema`] document.
pub mod classify;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod fitter;
pub mod narrows;
pub mod node;
pub mod path_de;
pub mod report;
pub mod schema;
pub mod serialize;

pub use classify::{classify, Describer, EnumBuilder, Fit, Narrow, RecordBuilder, UnionBuilder};
pub use context::{Context, RootRef};
pub use descriptor::{
    FieldValues, HookError, Kind, PrimitiveKind, Rejection, TypeDescriptor, TypeRef,
};
pub use error::{ClassifyError, FitError, PathError, SchemaError, SerializeError};
pub use fitter::{Config, Fitter, Trace};
pub use narrows::Timestamp;
pub use node::{Attempt, Children, FitIssue, LocatedIssue, Node, Path, PathSegment};
pub use report::{Formatter, Json5Formatter, LogReporter, Reporter};
pub use schema::Schema;
pub use serialize::{serialize, to_json_string};

use serde_json::Value;

/// Fits `value` into `T`, logging a rendered report when it does not fit.
pub fn fit<T: Fit>(value: &Value) -> Result<T, FitError> {
    Fitter::reporting().fit(value)
}

/// [`fit`] with injected context values.
pub fn fit_with_context<T: Fit>(value: &Value, context: &Context) -> Result<T, FitError> {
    Fitter::reporting().fit_with(value, context)
}
