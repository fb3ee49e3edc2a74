//! Model abstraction and a reference classifier

mod linear;
mod model;
mod param;
mod probe;

pub use linear::LinearClassifier;
pub use model::{BackwardOptions, ForwardContext, Model, ModelOutput, OutputGrad};
pub use param::Parameter;
pub use probe::AttentionProbe;
