mod loader;
mod logging;
mod ring;
mod root;
mod session;

pub use loader::load_from_path;
pub use logging::LoggingConfig;
pub use ring::{RingBufferConfig, MIN_RING_CAPACITY};
pub use root::Config;
pub use session::SessionConfig;
