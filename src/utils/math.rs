//! Math utility functions

/// Argmax - index and value of the maximum element.
///
/// The first occurrence wins on ties. NaN entries never win.
pub fn argmax(x: &[f32]) -> Option<(usize, f32)> {
    x.iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (idx, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((idx, v)),
        })
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f32, places: u32) -> f32 {
    let factor = 10f64.powi(places as i32);
    ((value as f64 * factor).round() / factor) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax() {
        let x = vec![1.0, 5.0, 3.0, 2.0];
        assert_eq!(argmax(&x), Some((1, 5.0)));
    }

    #[test]
    fn test_argmax_first_wins_ties() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some((1, 0.4)));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN, 0.1]), Some((1, 0.1)));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.87654, 3), 0.877);
        assert_eq!(round_to(0.12345, 2), 0.12);
        assert_eq!(round_to(1.0, 3), 1.0);
    }
}
