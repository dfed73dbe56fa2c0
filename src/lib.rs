pub mod error;
pub mod field;
pub mod medium;
pub mod multilayer;
pub mod settings;
pub mod snell;
pub mod sweep;
pub mod table;
pub mod transfer;

#[cfg(test)]
mod testing;
