pub mod accounts;
pub mod adapters;
pub mod config;
pub mod error;
pub mod web;

#[cfg(test)]
mod testing;
