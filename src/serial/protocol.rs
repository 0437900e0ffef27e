/// Line protocol decoder for the sensor's ASCII output
///
/// The device prints free-text lines such as `Temp: 23.5 C` and
/// `Pres: 1012.3 hPa`. A line containing the case-sensitive marker `Temp`
/// carries a temperature, one containing `Pres` carries a pressure; the value
/// is the first signed decimal number after the marker. Once both quantities
/// have been seen (in either order, possibly across several chunks) one
/// `Reading` is emitted, stamped with the time the completing line was
/// processed.
use log::{debug, warn};

use crate::error::ProtocolError;
use crate::models::{Limits, Quantity, Reading};

/// Maximum number of bytes held for an unterminated line
pub const LINE_BUFFER_SIZE: usize = 256;

const TEMPERATURE_MARKER: &str = "Temp";
const PRESSURE_MARKER: &str = "Pres";

/// Everything one chunk produced
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Decoded {
    pub readings: Vec<Reading>,
    pub rejected: Vec<ProtocolError>,
}

pub struct LineDecoder {
    limits: Limits,
    partial: Vec<u8>,
    temperature: Option<f32>,
    pressure: Option<f32>,
}

impl LineDecoder {
    pub fn new(limits: Limits) -> Self {
        LineDecoder {
            limits,
            partial: Vec::with_capacity(LINE_BUFFER_SIZE),
            temperature: None,
            pressure: None,
        }
    }

    /// Bytes held from an unterminated line
    pub fn pending_bytes(&self) -> usize {
        self.partial.len()
    }

    /// Discard any partial line and half-complete reading
    pub fn reset(&mut self) {
        self.partial.clear();
        self.temperature = None;
        self.pressure = None;
    }

    /// Consume a chunk of bytes received at unix time `now`
    ///
    /// If the unterminated tail grows past `LINE_BUFFER_SIZE` it is thrown
    /// away and reported as `ProtocolError::Overflow`.
    pub fn feed(&mut self, chunk: &[u8], now: i64) -> Decoded {
        let mut decoded = Decoded::default();
        self.partial.extend_from_slice(chunk);

        let mut consumed = 0;
        while let Some(offset) = self.partial[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + offset;
            let line = String::from_utf8_lossy(&self.partial[consumed..end]).into_owned();
            consumed = end + 1;

            match self.process_line(line.trim_end_matches('\r')) {
                Ok(None) => {}
                Ok(Some(quantity)) => {
                    debug!("Accepted {} from line {:?}", quantity, line);
                    if let (Some(temperature), Some(pressure)) = (self.temperature, self.pressure) {
                        decoded.readings.push(Reading::new(temperature, pressure, now));
                        self.temperature = None;
                        self.pressure = None;
                    }
                }
                Err(e) => {
                    warn!("{}", e);
                    decoded.rejected.push(e);
                }
            }
        }
        self.partial.drain(..consumed);

        if self.partial.len() > LINE_BUFFER_SIZE {
            let discarded = self.partial.len();
            self.partial.clear();
            let e = ProtocolError::Overflow { discarded };
            warn!("{}", e);
            decoded.rejected.push(e);
        }

        decoded
    }

    fn process_line(&mut self, line: &str) -> Result<Option<Quantity>, ProtocolError> {
        if line.trim().is_empty() {
            return Ok(None);
        }

        let (quantity, rest) = if let Some(pos) = line.find(TEMPERATURE_MARKER) {
            (Quantity::Temperature, &line[pos + TEMPERATURE_MARKER.len()..])
        } else if let Some(pos) = line.find(PRESSURE_MARKER) {
            (Quantity::Pressure, &line[pos + PRESSURE_MARKER.len()..])
        } else {
            return Err(ProtocolError::UnrecognizedLine(line.to_string()));
        };

        let value = first_number(rest).ok_or_else(|| ProtocolError::MissingValue {
            quantity,
            line: line.to_string(),
        })?;

        let range = self.limits.range(quantity);
        if !range.contains(value) {
            return Err(ProtocolError::OutOfRange {
                quantity,
                value,
                min: range.min,
                max: range.max,
            });
        }

        match quantity {
            Quantity::Temperature => self.temperature = Some(value),
            Quantity::Pressure => self.pressure = Some(value),
        }
        Ok(Some(quantity))
    }
}

/// First signed decimal number in `text`, e.g. `-12.5` or `1e3`
pub fn first_number(text: &str) -> Option<f32> {
    let bytes = text.as_bytes();
    let digit_at = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);

    let start = (0..bytes.len()).find(|&i| match bytes[i] {
        b'0'..=b'9' => true,
        b'.' => digit_at(i + 1),
        b'-' | b'+' => digit_at(i + 1) || (bytes.get(i + 1) == Some(&b'.') && digit_at(i + 2)),
        _ => false,
    })?;

    let mut end = start;
    if matches!(bytes[end], b'-' | b'+') {
        end += 1;
    }
    while digit_at(end) {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while digit_at(end) {
            end += 1;
        }
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'-' | b'+')) {
            exp += 1;
        }
        if digit_at(exp) {
            while digit_at(exp) {
                exp += 1;
            }
            end = exp;
        }
    }

    text[start..end].parse().ok()
}
