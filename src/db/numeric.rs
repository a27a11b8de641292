//! Lossy `NUMERIC` decoding.
//!
//! sqlx only decodes `NUMERIC` through the optional decimal crates. The matrix
//! only ever needs an `f64`, so the wire format is decoded straight into one.

use std::fmt::Write;

use sqlx::error::BoxDynError;
use sqlx::postgres::{PgTypeInfo, PgValueFormat, PgValueRef, Postgres};
use sqlx::{Decode, Type, TypeInfo};

const SIGN_POS: u16 = 0x0000;
const SIGN_NEG: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_PINF: u16 = 0xD000;
const SIGN_NINF: u16 = 0xF000;

/// A `NUMERIC` value rounded to the nearest `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericF64(pub f64);

impl Type<Postgres> for NumericF64 {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("numeric")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        ty.name().eq_ignore_ascii_case("numeric")
    }
}

impl<'r> Decode<'r, Postgres> for NumericF64 {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Binary => decode_binary(value.as_bytes()?).map(NumericF64),
            PgValueFormat::Text => Ok(NumericF64(parse_text(value.as_str()?)?)),
        }
    }
}

/// Decodes the binary send format: four big-endian 16-bit header words
/// (ndigits, weight, sign, dscale) followed by `ndigits` base-10000 digits.
pub(crate) fn decode_binary(buf: &[u8]) -> Result<f64, BoxDynError> {
    if buf.len() < 8 {
        return Err(format!("numeric value too short: {} bytes", buf.len()).into());
    }

    let word = |i: usize| u16::from_be_bytes([buf[2 * i], buf[2 * i + 1]]);
    let ndigits = word(0) as usize;
    let weight = word(1) as i16 as i32;
    let sign = word(2);

    match sign {
        SIGN_NAN => return Ok(f64::NAN),
        SIGN_PINF => return Ok(f64::INFINITY),
        SIGN_NINF => return Ok(f64::NEG_INFINITY),
        SIGN_POS | SIGN_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{other:04x}").into()),
    }

    if buf.len() < 8 + 2 * ndigits {
        return Err(format!(
            "numeric value truncated: {} digits declared, {} bytes present",
            ndigits,
            buf.len()
        )
        .into());
    }

    // Rebuild the decimal text and let the float parser round it once:
    // 0.<d0><d1>... scaled by 10000^(weight + 1).
    let mut text = String::with_capacity(8 + 4 * ndigits);
    if sign == SIGN_NEG {
        text.push('-');
    }
    text.push_str("0.");
    for i in 0..ndigits {
        write!(text, "{:04}", word(4 + i))?;
    }
    if ndigits == 0 {
        text.push('0');
    }
    write!(text, "e{}", 4 * (weight + 1))?;

    Ok(text.parse::<f64>()?)
}

fn parse_text(s: &str) -> Result<f64, BoxDynError> {
    match s {
        "NaN" => Ok(f64::NAN),
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        other => Ok(other.parse::<f64>()?),
    }
}
