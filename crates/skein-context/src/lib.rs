pub mod fifo;
pub mod lru;
pub mod noop;
pub mod strategy;
pub mod summarize;
pub mod turns;

pub use fifo::{FifoConfig, FifoStrategy};
pub use lru::LruStrategy;
pub use noop::NoopStrategy;
pub use strategy::{send_view, ContextStrategy, StrategyRequest, StrategyResponse};
pub use summarize::{SummarizeConfig, SummarizeStrategy};
