mod contract;
mod error;
mod hex;
mod logging;

pub use contract::*;
pub use error::*;
pub use hex::*;
pub use logging::*;
