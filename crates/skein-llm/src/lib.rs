pub mod converter;
pub mod mock;
pub mod openai;
pub mod registry;
pub mod sse;
pub mod summarizer;

pub use mock::{MockBackend, MockReply};
pub use openai::OpenAiCompatBackend;
pub use registry::connect;
pub use summarizer::RemoteSummarizer;
