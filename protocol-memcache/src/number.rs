//! ASCII decimal helpers shared by the encoders and parsers.

use bytes::BufMut;

use crate::ParseError;

/// Append `n` in ASCII decimal.
pub(crate) fn put_decimal<B: BufMut>(buf: &mut B, mut n: u64) {
    let mut digits = [0u8; 20];
    let mut at = digits.len();
    loop {
        at -= 1;
        digits[at] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }
    buf.put_slice(&digits[at..]);
}

/// Number of bytes `put_decimal` writes for `n`.
pub(crate) fn decimal_len(mut n: u64) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}

pub(crate) fn parse_u64(field: &[u8]) -> Result<u64, ParseError> {
    if field.is_empty() || field.len() > 20 {
        return Err(ParseError::InvalidNumber);
    }
    field.iter().try_fold(0u64, |acc, &b| {
        if !b.is_ascii_digit() {
            return Err(ParseError::InvalidNumber);
        }
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or(ParseError::InvalidNumber)
    })
}

pub(crate) fn parse_u32(field: &[u8]) -> Result<u32, ParseError> {
    u32::try_from(parse_u64(field)?).map_err(|_| ParseError::InvalidNumber)
}

pub(crate) fn parse_usize(field: &[u8]) -> Result<usize, ParseError> {
    usize::try_from(parse_u64(field)?).map_err(|_| ParseError::InvalidNumber)
}
