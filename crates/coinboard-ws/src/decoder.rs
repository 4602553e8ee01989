//! Frame decoding.

use std::fmt::Display;

/// Turns a text frame into a typed update.
///
/// `Ok(None)` means the frame was understood but carries no update
/// (subscription acks, heartbeats). An `Err` drops that frame only; the
/// connection stays up.
pub trait MessageDecoder: Send + 'static {
    type Output: Send + 'static;
    type Error: Display;

    fn decode(&mut self, text: &str) -> Result<Option<Self::Output>, Self::Error>;
}

/// Passes frames through as untyped JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl MessageDecoder for JsonDecoder {
    type Output = serde_json::Value;
    type Error = serde_json::Error;

    fn decode(&mut self, text: &str) -> Result<Option<Self::Output>, Self::Error> {
        serde_json::from_str(text).map(Some)
    }
}
