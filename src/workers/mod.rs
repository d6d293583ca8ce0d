pub mod acquisition;
pub mod monitor;
pub mod writer;
