pub mod api_server;
pub mod certificate_store;
pub mod credential_store;
pub mod session_tokens;
