pub mod keys;
pub mod payload;
pub mod rates;

pub use keys::*;
pub use payload::*;
pub use rates::*;
