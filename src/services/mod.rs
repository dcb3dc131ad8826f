// SynthGuard Core Services
// Signal extraction, budgets, caching and the detection cascade

pub mod backends;
pub mod config_store;
pub mod detection;
pub mod fingerprint;
pub mod metadata;
pub mod pixels;
pub mod providers;
pub mod rate_limiter;
pub mod result_cache;
pub mod text_processor;

pub use backends::{InferenceBackend, SharedBackend};
pub use config_store::*;
pub use providers::*;
pub use rate_limiter::{BucketLimits, TierRateLimiters, TokenBucket};
pub use result_cache::ResultCache;
pub use text_processor::{compute_text_statistics, TextStatistics};

// Re-export the detection entry points
pub use detection::{
    AudioContent,
    ByteFetcher,
    Content,
    Detector,
    DetectorOptions,
    FrameSource,
    ImageContent,
    Pipeline,
    VideoContent,
};
