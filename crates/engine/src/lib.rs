pub mod context;
pub mod fanout;
pub mod horizon;
pub mod scheduler;
pub mod service;

pub use context::{Clock, EngineContext, FixedClock, SystemClock};
pub use fanout::{PropertyPushReport, RateFanOut};
pub use horizon::HorizonGenerator;
pub use scheduler::{EntityTickResult, Scheduler, TickReport};
pub use service::{NewBooking, OverrideChange, PricingService};
