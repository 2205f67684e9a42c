pub mod kv_store;
pub mod mirror_client;
