//! Provider adapters implementing [`PriceSource`](crate::PriceSource).

pub mod yahoo;

pub use yahoo::YahooAdapter;
