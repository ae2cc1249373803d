/// Decoding of the sensor's text telemetry notifications
use crate::error::PayloadError;
use crate::models::Reading;

const FIELD_COUNT: usize = 5;

/// Decode one notification into a reading
///
/// The wearable sends ASCII text of the form `temperature,audio,x,y,z`,
/// e.g. `22,3,-1,0,2`. Whitespace around fields (including a trailing
/// newline) is ignored. Any other deviation rejects the whole payload so
/// that a partial reading is never produced.
///
/// # Arguments
/// * `data` - Raw bytes delivered by the telemetry characteristic
///
/// # Returns
/// The decoded reading, or why the payload was rejected
pub fn decode_payload(data: &[u8]) -> Result<Reading, PayloadError> {
    let text = std::str::from_utf8(data).map_err(|_| PayloadError::InvalidUtf8)?;

    let fields: Vec<&str> = text.split(',').collect();
    if fields.len() != FIELD_COUNT {
        return Err(PayloadError::FieldCount(fields.len()));
    }

    let mut values = [0i32; FIELD_COUNT];
    for (index, (slot, token)) in values.iter_mut().zip(&fields).enumerate() {
        *slot = token
            .trim()
            .parse()
            .map_err(|_| PayloadError::InvalidField {
                index,
                token: token.to_string(),
            })?;
    }

    let [temperature, audio, x, y, z] = values;
    Ok(Reading {
        temperature,
        audio,
        x,
        y,
        z,
    })
}
