pub mod garden;
pub mod log;
pub mod sync;
