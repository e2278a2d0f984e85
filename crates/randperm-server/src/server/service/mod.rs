pub mod error;
pub mod handler;
pub mod protocol;
pub mod random;
pub mod session;
pub mod stream;
