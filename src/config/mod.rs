mod loader;

pub use loader::{Config, EndpointsConfig, MusixmatchConfig};
