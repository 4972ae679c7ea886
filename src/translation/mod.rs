/*!
 * Translation request handling.
 *
 * This module contains everything between a detected piece of content and a
 * provider call. It is split into several submodules:
 *
 * - `core`: the event-driven pipeline tying the parts together
 * - `cache`: TTL and LRU bounded translation cache with durable mirroring
 * - `rate_limiter`: sliding-window admission control
 * - `queue`: serial provider-call queue with quota-aware retries
 * - `batch`: batched translation of content already on screen
 */

// Re-export main types for easier usage
pub use self::batch::{BatchSummary, BatchTranslator};
pub use self::cache::{CacheKey, CacheStats, StoreLoad, TranslationCache};
pub use self::core::{EventOutcome, PipelineParts, TranslationPipeline};
pub use self::queue::{QueuePolicy, QueuedTask, TranslationQueue};
pub use self::rate_limiter::SlidingWindowLimiter;

// Submodules
pub mod batch;
pub mod cache;
pub mod core;
pub mod queue;
pub mod rate_limiter;
