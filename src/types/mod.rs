pub mod market;
pub mod stream;

pub use market::*;
pub use stream::*;
