mod reassembly;
mod source;

pub use reassembly::*;
pub use source::*;
