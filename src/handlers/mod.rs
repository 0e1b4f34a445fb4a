pub mod sector;
pub mod stock;
pub mod update;
