pub mod adapter;
pub mod beds24;
pub mod cloudbeds;
pub mod mock;
pub mod registry;
pub mod smoobu;

pub use adapter::{
    PmsAdapter, PmsError, PropertySettings, PushOutcome, RateUpdate, RemoteProperty, Reservation,
};
pub use beds24::Beds24Adapter;
pub use cloudbeds::CloudbedsAdapter;
pub use mock::{MockAdapter, RecordedPush};
pub use registry::AdapterRegistry;
pub use smoobu::SmoobuAdapter;
