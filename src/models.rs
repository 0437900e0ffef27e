/// Core data types shared by the decoder, history buffer and persistence
use std::fmt;

/// Default valid temperature range in °C
pub const TEMPERATURE_RANGE: ValidRange = ValidRange::new(-40.0, 85.0);
/// Default valid pressure range in hPa
pub const PRESSURE_RANGE: ValidRange = ValidRange::new(300.0, 1100.0);

/// One timestamped sample received from the device.
///
/// The timestamp is the engine's receipt time in unix seconds; the device
/// never transmits its own clock.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub temperature: f32,
    pub pressure: f32,
    pub timestamp: i64,
}

impl Reading {
    pub fn new(temperature: f32, pressure: f32, timestamp: i64) -> Self {
        Reading {
            temperature,
            pressure,
            timestamp,
        }
    }

    /// Value of one measured quantity
    pub fn value(&self, quantity: Quantity) -> f32 {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Pressure => self.pressure,
        }
    }

    /// Barometric altitude estimate in metres against standard sea level pressure
    pub fn altitude(&self) -> f32 {
        44330.0 * (1.0 - (self.pressure / 1013.25).powf(0.1903))
    }
}

/// The two quantities the device reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Temperature,
    Pressure,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Temperature => f.write_str("temperature"),
            Quantity::Pressure => f.write_str("pressure"),
        }
    }
}

/// Inclusive range of accepted values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidRange {
    pub min: f32,
    pub max: f32,
}

impl ValidRange {
    pub const fn new(min: f32, max: f32) -> Self {
        ValidRange { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Accepted ranges for both quantities. Values outside are rejected, never clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub temperature: ValidRange,
    pub pressure: ValidRange,
}

impl Limits {
    pub fn range(&self, quantity: Quantity) -> ValidRange {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Pressure => self.pressure,
        }
    }

    pub fn accepts(&self, reading: &Reading) -> bool {
        self.temperature.contains(reading.temperature) && self.pressure.contains(reading.pressure)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            temperature: TEMPERATURE_RANGE,
            pressure: PRESSURE_RANGE,
        }
    }
}

/// Summary of the readings inside the live statistics window
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Statistics {
    pub min_temp: f32,
    pub max_temp: f32,
    pub avg_temp: f32,
    pub min_press: f32,
    pub max_press: f32,
    pub avg_press: f32,
    pub count: usize,
}
