pub mod elm327;
pub mod fake;
pub mod kcan;
pub mod kl_tty;
pub mod kl_usb;

pub use elm327::Elm327;
pub use fake::FakeAdapter;
pub use kcan::KPlusCan;
pub use kl_tty::KlTty;
pub use kl_usb::KlUsbChip;
