pub mod adc;
pub mod hsio;
pub mod timers;

pub use adc::Adc;
pub use hsio::Hsio;
pub use timers::{Timer1, Timer2};
