pub mod connector;
pub mod holder;
pub mod pool;
pub mod token;

pub use connector::*;
pub use holder::*;
pub use pool::*;
pub use token::*;
