//! Storage backends for the CobroCharging engine
//!
//! In-memory implementations of the tariff and account store traits, plus
//! JSON bootstrap loading to seed them at startup.

pub mod bootstrap;
pub mod memory;

pub use bootstrap::{apply, load, BootstrapData, TimingSpec};
pub use memory::{MemoryAccountStore, MemoryTariffStore};
