pub mod agent;
pub mod shipment;
pub mod timestamp;
pub mod user;
