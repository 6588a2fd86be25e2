#![forbid(unsafe_code)]

pub mod message_id;
pub mod utils;
