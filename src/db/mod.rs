pub mod counters;
pub mod models;

pub use counters::CounterStore;
