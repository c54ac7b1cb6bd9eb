/// Runtime Execution Engine
///
/// This module owns a live graph and executes it:
/// - Structural mutation of nodes and links under one lock
/// - Reactive value propagation along links
/// - The periodic tick pass and the background scheduler driving it
/// - Injected monotonic time

// Graph engine: structural API, queries and the tick pass
pub mod engine;

// Depth-first, cycle-safe value propagation
pub mod propagation;

// Background tick scheduler service
pub mod scheduler;

// Monotonic time sources
pub mod clock;

// Re-export main types
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use engine::{Engine, EngineErrorRecord, TickReport};
pub use propagation::PropagationReport;
pub use scheduler::TickSchedulerService;
