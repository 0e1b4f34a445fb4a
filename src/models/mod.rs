pub mod common;
pub mod sector;
pub mod update;
