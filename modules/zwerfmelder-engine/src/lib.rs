//! The stateful core of the report engine.
//!
//! `ReportService` composes the pure domain logic with a repository, rate
//! limiting, burst detection and tracking tokens into the end-to-end report
//! intake and operator read paths. Persistence sits behind the `Repository`
//! trait; `MemoryRepository` is the shipped implementation and the test
//! double in one.

pub mod clock;
pub mod identity;
pub mod locks;
pub mod memory;
pub mod repository;
pub mod service;
pub mod throttle;
pub mod tracking;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryRepository;
pub use repository::Repository;
pub use service::{ReportService, ServiceOptions};
pub use throttle::{BurstTracker, RateLimiter};
pub use tracking::TrackingTokens;
