//! Canonical decimal ASCII for the integer writers, encoded on the stack.

const fn max_digits(mut value: u128) -> usize {
	let mut digits = 0;
	while value != 0 {
		value /= 10;
		digits += 1;
	}
	digits
}

/// Longest `u32` rendering.
pub const U32_MAX_CHARS: usize = max_digits(u32::MAX as u128);
/// Longest `i32` rendering, sign included.
pub const I32_MAX_CHARS: usize = max_digits(i32::MAX as u128) + 1;
/// Longest `u64` rendering.
pub const U64_MAX_CHARS: usize = max_digits(u64::MAX as u128);
/// Longest `i64` rendering, sign included.
pub const I64_MAX_CHARS: usize = max_digits(i64::MAX as u128) + 1;

// Writes the digits of `value` right-aligned into `out` and returns the index
// of the first one.
fn digits_into(mut value: u64, out: &mut [u8]) -> usize {
	let mut pos = out.len();
	loop {
		pos -= 1;
		// `value % 10` always fits in a byte.
		out[pos] = b'0' + (value % 10) as u8;
		value /= 10;
		if value == 0 {
			return pos;
		}
	}
}

fn signed_into(negative: bool, magnitude: u64, out: &mut [u8]) -> usize {
	let mut pos = digits_into(magnitude, out);
	if negative {
		pos -= 1;
		out[pos] = b'-';
	}
	pos
}

/// Encode `value` into `out`, returning the used tail.
pub fn encode_u32(value: u32, out: &mut [u8; U32_MAX_CHARS]) -> &[u8] {
	let start = digits_into(u64::from(value), out);
	&out[start..]
}

/// Encode `value` into `out`, returning the used tail.
pub fn encode_i32(value: i32, out: &mut [u8; I32_MAX_CHARS]) -> &[u8] {
	let start =
		signed_into(value < 0, u64::from(value.unsigned_abs()), out);
	&out[start..]
}

/// Encode `value` into `out`, returning the used tail.
pub fn encode_u64(value: u64, out: &mut [u8; U64_MAX_CHARS]) -> &[u8] {
	let start = digits_into(value, out);
	&out[start..]
}

/// Encode `value` into `out`, returning the used tail.
pub fn encode_i64(value: i64, out: &mut [u8; I64_MAX_CHARS]) -> &[u8] {
	let start = signed_into(value < 0, value.unsigned_abs(), out);
	&out[start..]
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn widths() {
		assert_eq!(U32_MAX_CHARS, 10);
		assert_eq!(I32_MAX_CHARS, 11);
		assert_eq!(U64_MAX_CHARS, 20);
		assert_eq!(I64_MAX_CHARS, 20);
	}

	#[test]
	fn extremes() {
		assert_eq!(encode_u32(0, &mut [0; U32_MAX_CHARS]), b"0");
		assert_eq!(encode_u32(u32::MAX, &mut [0; U32_MAX_CHARS]), b"4294967295");
		assert_eq!(encode_i32(i32::MIN, &mut [0; I32_MAX_CHARS]), b"-2147483648");
		assert_eq!(encode_i32(-7, &mut [0; I32_MAX_CHARS]), b"-7");
		assert_eq!(
			encode_u64(u64::MAX, &mut [0; U64_MAX_CHARS]),
			b"18446744073709551615"
		);
		assert_eq!(
			encode_i64(i64::MIN, &mut [0; I64_MAX_CHARS]),
			b"-9223372036854775808"
		);
		assert_eq!(encode_i64(42, &mut [0; I64_MAX_CHARS]), b"42");
	}
}
