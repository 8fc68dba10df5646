pub mod connection_pool;
pub mod connection_pool_registry;
