use crate::config::SensorRanges;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::Rng;

pub const IMAGE_FORMAT: &str = "png";
pub const IMAGE_WIDTH: u32 = 10;
pub const IMAGE_HEIGHT: u32 = 10;

// 10x10 red PNG standing in for a camera frame.
const DUMMY_PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\n\x00\x00\x00\n\
\x08\x02\x00\x00\x00\x02P\xd5\xe3\x00\x00\x00\x19IDAT\x18\x95c\xf8\
\xcf\xc0\x00\x02F\x86\xa1\x18\xb0\x02\x00\x00\xff\xff\x03\x00\x08\
\xfc\x02\x00\x0c\x8b\x8b\xa4\x00\x00\x00\x00IEND\xaeB`\x82";

/// Temperature in °C, two decimals.
pub fn temperature(rng: &mut impl Rng, ranges: &SensorRanges) -> f64 {
    round_to(rng.gen_range(ranges.temp_min..=ranges.temp_max), 2)
}

/// Pressure in hPa, one decimal.
pub fn pressure(rng: &mut impl Rng, ranges: &SensorRanges) -> f64 {
    round_to(rng.gen_range(ranges.pressure_min..=ranges.pressure_max), 1)
}

/// PIR sensor: 1 when movement was seen, 0 otherwise.
pub fn movement(rng: &mut impl Rng, ranges: &SensorRanges) -> u8 {
    u8::from(rng.gen_bool(ranges.movement_probability))
}

pub fn dummy_image() -> String {
    STANDARD.encode(DUMMY_PNG)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ranges(movement_probability: f64) -> SensorRanges {
        SensorRanges {
            temp_min: 18.0,
            temp_max: 30.0,
            pressure_min: 990.0,
            pressure_max: 1020.0,
            movement_probability,
        }
    }

    #[test]
    fn test_temperature_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let ranges = ranges(0.15);

        for _ in 0..10_000 {
            let value = temperature(&mut rng, &ranges);
            assert!((18.0..=30.0).contains(&value), "temperature {}", value);
        }
    }

    #[test]
    fn test_pressure_within_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        let ranges = ranges(0.15);

        for _ in 0..10_000 {
            let value = pressure(&mut rng, &ranges);
            assert!((990.0..=1020.0).contains(&value), "pressure {}", value);
        }
    }

    #[test]
    fn test_readings_are_rounded() {
        let mut rng = StdRng::seed_from_u64(3);
        let ranges = ranges(0.15);

        let t = temperature(&mut rng, &ranges);
        assert!(((t * 100.0).round() - t * 100.0).abs() < 1e-6);

        let p = pressure(&mut rng, &ranges);
        assert!(((p * 10.0).round() - p * 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ranges = ranges(0.15);
        ranges.temp_min = 21.5;
        ranges.temp_max = 21.5;

        assert_eq!(temperature(&mut rng, &ranges), 21.5);
    }

    #[test]
    fn test_movement_frequency_converges() {
        let mut rng = StdRng::seed_from_u64(42);
        let ranges = ranges(0.15);
        let trials = 100_000;

        let hits: u32 = (0..trials)
            .map(|_| u32::from(movement(&mut rng, &ranges)))
            .sum();
        let observed = hits as f64 / trials as f64;

        assert!(
            (observed - 0.15).abs() < 0.01,
            "observed movement rate {}",
            observed
        );
    }

    #[test]
    fn test_movement_extremes() {
        let mut rng = StdRng::seed_from_u64(5);

        assert!((0..100).all(|_| movement(&mut rng, &ranges(1.0)) == 1));
        assert!((0..100).all(|_| movement(&mut rng, &ranges(0.0)) == 0));
    }

    #[test]
    fn test_dummy_image_is_png() {
        let decoded = STANDARD.decode(dummy_image()).unwrap();

        assert_eq!(&decoded[..8], b"\x89PNG\r\n\x1a\n");
        assert!(decoded.ends_with(b"IEND\xaeB`\x82"));
    }
}
