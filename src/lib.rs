pub mod color;
pub mod config;
pub mod engine;
pub mod segments;
pub mod template;
pub mod terminal;
pub mod themes;
pub mod utils;

pub use config::{load_config, Config};
pub use engine::Engine;
pub use segments::{Environment, Flags, Provider, ProviderRegistry, Segment};
pub use terminal::Shell;
pub use utils::{init_logging, CacheStore};
