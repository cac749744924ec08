//! Time sources: a free-running counter (`Time`) and a one-shot alarm
//! (`Alarm`) a capsule can arm to be woken later. The reassembly reaper and
//! the TCP retransmission timer are both built on `Alarm`.

/// A clock's tick rate, in Hz.
pub trait Frequency {
    fn frequency() -> u32;
}

/// A 1 MHz tick rate; the adaptation engine timestamps fragments with it
/// (`first_seen_microseconds` in each reassembly entry).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Freq1MHz;
impl Frequency for Freq1MHz {
    fn frequency() -> u32 {
        1_000_000
    }
}

/// A 1 Hz tick rate, convenient for the TCP timer's second-granularity
/// schedules (`TCP_TIMER_RESOLUTION`, `TCP_ACK_MAX_TIMEOUT`, ...).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Freq1Hz;
impl Frequency for Freq1Hz {
    fn frequency() -> u32 {
        1
    }
}

/// A free-running counter a capsule can read without arming anything.
pub trait Time {
    type Frequency: Frequency;

    /// The current tick count; wraps according to the platform's counter
    /// width. Callers compare elapsed time with wrapping subtraction.
    fn now(&self) -> u32;
}

/// Receives the single callback an `Alarm` fires when it expires.
pub trait AlarmClient {
    fn fired(&self);
}

/// A one-shot alarm a capsule arms for a future tick and that calls back
/// into an `AlarmClient` once, at or after that tick.
pub trait Alarm {
    type Frequency: Frequency;

    fn now(&self) -> u32;
    fn set_alarm(&self, tics: u32);
    fn get_alarm(&self) -> u32;
    fn disable(&self);
    fn is_enabled(&self) -> bool;
}
