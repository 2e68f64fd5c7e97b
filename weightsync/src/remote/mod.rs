mod api;
mod traits;

pub use api::GarminConnectClient;
pub use traits::WeightSource;
