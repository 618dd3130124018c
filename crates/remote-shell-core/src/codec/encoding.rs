//! Base64 transform for stream payloads.
//!
//! Both directions work against an explicitly sized buffer and fail rather
//! than grow or truncate when the transform does not fit its bound.

use ::base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::error::CodecError;

/// Slack reserved for `=` padding.
const PADDING_SLACK: usize = 2;

/// Slack reserved for the string terminator the receiver expects.
pub const TERMINATOR_SLACK: usize = 1;

/// Worst-case size of the encoding buffer for `len` input bytes.
///
/// `ceil(len * 4 / 3)` plus padding and terminator slack.
#[must_use]
pub fn encoded_bound(len: usize) -> Option<usize> {
    len.checked_mul(4)
        .map(|n| n.div_ceil(3) + PADDING_SLACK + TERMINATOR_SLACK)
}

/// Encode `input` as padded standard base64.
///
/// # Errors
/// `Allocation` if the bounded buffer cannot be reserved, `EncodeOverflow`
/// if the encoding would leave no room for the terminator within the bound.
pub fn encode(input: &[u8]) -> Result<String, CodecError> {
    let bound = encoded_bound(input.len()).ok_or(CodecError::Allocation(usize::MAX))?;
    let needed = ::base64::encoded_len(input.len(), true)
        .ok_or(CodecError::EncodeOverflow { bound })?;
    if needed + TERMINATOR_SLACK > bound {
        return Err(CodecError::EncodeOverflow { bound });
    }

    let mut out = String::new();
    out.try_reserve_exact(bound)
        .map_err(|_| CodecError::Allocation(bound))?;
    BASE64.encode_string(input, &mut out);
    Ok(out)
}

/// Decode padded standard base64 text.
///
/// The destination is sized to the input length; decoding never writes past
/// it and never truncates silently.
///
/// # Errors
/// `Decode` on malformed text or if the output would exceed the bound.
pub fn decode(text: impl AsRef<[u8]>) -> Result<Vec<u8>, CodecError> {
    let text = text.as_ref();
    let mut out = Vec::new();
    out.try_reserve_exact(text.len())
        .map_err(|_| CodecError::Allocation(text.len()))?;
    out.resize(text.len(), 0);

    let written = BASE64.decode_slice(text, &mut out)?;
    out.truncate(written);
    Ok(out)
}
