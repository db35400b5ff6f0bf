use bytes::Buf;

pub trait BufReadBytesExt {
    fn get_bytes<const N: usize>(&mut self) -> [u8; N];

    /// Reads `N` bytes and interprets them as a NUL-padded ASCII string.
    fn get_padded_str<const N: usize>(&mut self) -> String {
        trim_padded_str(&self.get_bytes::<N>())
    }
}

impl<B: Buf> BufReadBytesExt for B {
    fn get_bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut data: [u8; N] = [0; N];
        self.copy_to_slice(&mut data[..]);
        data
    }
}

/// Decodes a fixed-width text field. Sondes pad these with NUL bytes.
pub fn trim_padded_str(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim()
        .to_owned()
}

/// Normalizes an angle in degrees into `[0, 360)`.
#[inline(always)]
pub fn normalize_degrees(angle: f64) -> f64 {
    let angle = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if angle >= 360.0 { 0.0 } else { angle }
}

#[cfg(test)]
mod tests {
    use crate::util::{
        BufReadBytesExt,
        normalize_degrees,
        trim_padded_str,
    };

    #[test]
    fn it_reads_padded_strings() {
        let mut buffer = &b"S4610487\0\0rest"[..];
        assert_eq!(buffer.get_padded_str::<10>(), "S4610487");
        assert_eq!(buffer, b"rest");
        assert_eq!(trim_padded_str(b"\0\0\0"), "");
    }

    #[test]
    fn it_normalizes_angles() {
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(725.0), 5.0);
        assert_eq!(normalize_degrees(-1e-20), 0.0);
    }
}
