pub mod exchange;
pub mod message;
pub mod order;
pub mod stream;
