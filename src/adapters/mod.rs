// Adapters layer: concrete implementations of the domain ports.

mod listeners;

pub mod local_store;
pub mod memory_page;
pub mod memory_store;
