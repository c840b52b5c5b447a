pub mod booking;
pub mod forecast;
pub mod group;
pub mod integration;
pub mod price_override;
pub mod property;
pub mod quota;
pub mod recommendation;
pub mod status;
pub mod summary;
