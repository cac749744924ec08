//! Hardware-Independent Layer traits: the interfaces capsules program
//! against instead of touching peripherals directly. Only the traits the
//! 6LoWPAN/TCP/socket core actually calls are kept here; the rest of
//! Tock's HIL (GPIO, ADC, UART, ...) is out of scope for this repository.

pub mod radio;
pub mod time;
