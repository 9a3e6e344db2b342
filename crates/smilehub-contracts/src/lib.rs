pub mod analysis;
pub mod catalog;
pub mod events;
pub mod media;
pub mod models;
pub mod specialists;
