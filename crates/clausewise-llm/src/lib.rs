//! External service plumbing: time, rate limiting, retry, HTTP clients and
//! the local embedding/rerank fallbacks.

pub mod backend;
pub mod clock;
pub mod guard;
pub mod hash_embed;
pub mod limiter;
pub mod openai;
pub mod rerank;
pub mod retry;

pub use backend::{select_backend, BackendStats, SelectedBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::ServiceGuard;
pub use hash_embed::HashEmbedder;
pub use limiter::SlidingWindowLimiter;
pub use openai::OpenAiCompatClient;
pub use rerank::TermOverlapScorer;
pub use retry::{retry, RetryPolicy};
