//! Bit masks and sub-byte shifting over byte buffers.
//!
//! Buffers are little-endian bit strings: bit 0 of byte 0 is the least
//! significant bit of the whole buffer.

/// Returns a byte with the `n` low bits set.
///
/// # Panics
///
/// Panics if `n` is not in `1..=8`.
#[inline]
pub fn right_bit_mask(n: u8) -> u8 {
    assert!((1..=8).contains(&n), "bit mask width {n} out of range");
    (0xFFu16 >> (8 - n)) as u8
}

/// Returns a byte with the `n` high bits set.
///
/// # Panics
///
/// Panics if `n` is not in `1..=8`.
#[inline]
pub fn left_bit_mask(n: u8) -> u8 {
    assert!((1..=8).contains(&n), "bit mask width {n} out of range");
    (0xFF00u16 >> n) as u8
}

/// Shifts the whole buffer right by `shift` bits (less than 8).
///
/// The low bits of byte `i + 1` move into the high bits of byte `i`.
pub fn shift_right(buf: &mut [u8], shift: u8) {
    debug_assert!(shift < 8);
    if shift == 0 {
        return;
    }
    let carry_mask = right_bit_mask(shift);
    for i in 0..buf.len() {
        buf[i] >>= shift;
        if let Some(&next) = buf.get(i + 1) {
            buf[i] |= (next & carry_mask) << (8 - shift);
        }
    }
}

/// Shifts the whole buffer left by `byte_bits` bits and stores the low
/// `byte_bits` bits of `byte` in the freed low bits of the first byte.
///
/// Bits shifted out of the last byte are lost.
pub fn prepend_bits(buf: &mut [u8], byte: u8, byte_bits: u8) {
    debug_assert!(byte_bits <= 8);
    if byte_bits == 0 || buf.is_empty() {
        return;
    }
    if byte_bits == 8 {
        buf.rotate_right(1);
        buf[0] = byte;
        return;
    }
    let carry_mask = left_bit_mask(byte_bits);
    for i in (0..buf.len()).rev() {
        buf[i] <<= byte_bits;
        if i > 0 {
            buf[i] |= (buf[i - 1] & carry_mask) >> (8 - byte_bits);
        }
    }
    buf[0] |= byte & right_bit_mask(byte_bits);
}

/// Extracts a non-zero `hash_bits`-wide window from `hash`.
///
/// The window starts at bit 0 and slides up by 8 bits while it yields 0.
/// `hash_bits` is a multiple of 8 in `8..=32` and `hash` is non-zero, so
/// the result is always non-zero.
pub fn truncate_hash_nonzero(hash: u32, hash_bits: u8) -> u32 {
    debug_assert!(hash != 0);
    debug_assert!(hash_bits % 8 == 0 && (8..=32).contains(&hash_bits));
    let mask = (1u64 << hash_bits) - 1;
    let mut offset = 0u32;
    loop {
        let window = ((hash as u64) >> offset) & mask;
        if window != 0 || offset >= 32 {
            return window as u32;
        }
        offset += 8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_masks() {
        assert_eq!(right_bit_mask(1), 0x01);
        assert_eq!(right_bit_mask(3), 0x07);
        assert_eq!(right_bit_mask(8), 0xFF);
        assert_eq!(left_bit_mask(1), 0x80);
        assert_eq!(left_bit_mask(3), 0xE0);
        assert_eq!(left_bit_mask(8), 0xFF);
    }

    #[test]
    #[should_panic]
    fn test_mask_zero_width_panics() {
        right_bit_mask(0);
    }

    #[test]
    #[should_panic]
    fn test_mask_wide_panics() {
        left_bit_mask(9);
    }

    #[test]
    fn test_shift_right_carries() {
        let mut buf = [0b1000_0000, 0b0000_0011];
        shift_right(&mut buf, 2);
        assert_eq!(buf, [0b1110_0000, 0b0000_0000]);

        let mut unchanged = [0xAB, 0xCD];
        shift_right(&mut unchanged, 0);
        assert_eq!(unchanged, [0xAB, 0xCD]);
    }

    #[test]
    fn test_prepend_bits() {
        let mut buf = [0b1100_0001, 0b0000_0000];
        prepend_bits(&mut buf, 0b0000_0101, 3);
        assert_eq!(buf, [0b0000_1101, 0b0000_0110]);

        let mut whole = [0x11, 0x22];
        prepend_bits(&mut whole, 0x33, 8);
        assert_eq!(whole, [0x33, 0x11]);
    }

    #[test]
    fn test_truncate_slides_past_zero_byte() {
        assert_eq!(truncate_hash_nonzero(0x0000_AB00, 8), 0xAB);
        assert_eq!(truncate_hash_nonzero(0x1200_0000, 16), 0x1200);
        assert_eq!(truncate_hash_nonzero(0x0000_0001, 32), 1);
    }

    proptest! {
        #[test]
        fn prop_truncate_nonzero(hash in 1u32.., bytes in 1u8..=4) {
            prop_assert_ne!(truncate_hash_nonzero(hash, bytes * 8), 0);
        }

        #[test]
        fn prop_shift_undoes_prepend(buf in proptest::collection::vec(any::<u8>(), 1..8), bits in 1u8..8) {
            let mut shifted = buf.clone();
            let last = shifted.len() - 1;
            // keep the top bits of the last byte clear so nothing is lost
            shifted[last] &= right_bit_mask(8 - bits);
            let original = shifted.clone();
            prepend_bits(&mut shifted, 0xFF, bits);
            prop_assert_eq!(shifted[0] & right_bit_mask(bits), right_bit_mask(bits));
            shift_right(&mut shifted, bits);
            prop_assert_eq!(shifted, original);
        }
    }
}
