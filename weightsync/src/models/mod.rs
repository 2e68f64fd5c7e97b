mod identity;
mod snapshot;
mod weight;

pub use identity::*;
pub use snapshot::*;
pub use weight::*;
