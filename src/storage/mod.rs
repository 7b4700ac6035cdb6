//! Storage implementations for resource repositories

pub mod in_memory;

pub use in_memory::InMemoryResourceRepository;
