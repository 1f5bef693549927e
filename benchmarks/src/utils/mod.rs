use std::num::ParseIntError;
use std::str::FromStr;
use std::time::Duration;

pub mod multi_thread;

pub fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1000.
}

pub fn seconds_as_str_to_duration(input: &str) -> Result<Duration, ParseIntError> {
    Ok(Duration::from_secs(u64::from_str(input)?))
}
