#![forbid(unsafe_code)]

pub mod gate;
pub mod model;
pub mod seek;
pub mod time;

pub use time::Clock;
