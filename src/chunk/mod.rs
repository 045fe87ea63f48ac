mod message;
mod reader;

pub use message::*;
pub use reader::*;
