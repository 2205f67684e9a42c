pub mod certificate;
pub mod credential;
