mod polygon;

pub use polygon::{CustodialKeyProvider, PolygonClient, PolygonConfig, StaticKeyProvider};
