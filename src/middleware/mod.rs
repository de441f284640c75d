pub mod body_limit;
pub mod errors;
pub mod origin;
pub mod rate_limit;
pub mod readiness;
pub mod security_headers;
pub mod static_files;

pub use body_limit::{body_limit_layer, uniform_payload_too_large};
pub use errors::{format_errors, handle_panic, ErrorPolicy};
pub use origin::{reject_disallowed_origin, OriginPolicy};
pub use rate_limit::{
    client_identity, rate_limit, MemoryRateLimitStore, RateDecision, RateLimitStore, RateLimiter,
    RatePolicy, RateTier,
};
pub use readiness::{require_ready, Readiness};
pub use security_headers::security_headers;
pub use static_files::static_routes;
