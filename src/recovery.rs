use crate::{
    atmosphere::AtmosphericLight,
    error::DehazeError,
    image::RgbImage,
    transmission::{Refined, TransmissionMap},
};

/// Invert the haze model `I = J * t + A * (1 - t)` for the scene radiance `J`.
///
/// Every channel of the result is clipped to [0, 1]. `transmission` is
/// already floored, so no further floor is applied here.
///
/// Returns an error if `transmission` does not match the shape of `image`.
pub fn recover_scene(
    image: &RgbImage,
    light: &AtmosphericLight,
    transmission: &TransmissionMap<Refined>,
) -> Result<RgbImage, DehazeError> {
    DehazeError::check_shape(image.dims(), transmission.dims())?;

    let a = light.color();
    let t = transmission.map().as_slice();
    Ok(image.par_map_indexed(|i, px| {
        [0, 1, 2].map(|c| ((px[c] - a[c]) / t[i] + a[c]).clamp(0.0, 1.0))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use approx::assert_relative_eq;
    use quickcheck::quickcheck;

    quickcheck! {
        fn haze_free_round_trip(bytes: Vec<u8>, a: (u8, u8, u8)) -> bool {
            if bytes.len() < 3 {
                return true;
            }

            let cols = bytes.len() / 3;
            let image = RgbImage::from_rgb8(&bytes[..cols * 3], 1, cols).unwrap();
            let light = AtmosphericLight::new([a.0, a.1, a.2].map(|v| v as f64 / 255.));
            let transmission = TransmissionMap::filled(1, cols, 1.0)
                .into_floored(0.25)
                .unwrap();

            let recovered = recover_scene(&image, &light, &transmission).unwrap();
            recovered
                .as_slice()
                .iter()
                .zip(image.as_slice())
                .all(|(j, i)| (0..3).all(|c| (j[c] - i[c]).abs() < 1e-12))
        }

        fn output_is_clipped(bytes: Vec<u8>, t: u8) -> bool {
            if bytes.len() < 3 {
                return true;
            }

            let cols = bytes.len() / 3;
            let image = RgbImage::from_rgb8(&bytes[..cols * 3], 1, cols).unwrap();
            let light = AtmosphericLight::new([1e-6, 0.5, 1.0]);
            let floor = (t as f64 + 1.0) / 1e4;
            let transmission = TransmissionMap::filled(1, cols, 0.0)
                .into_floored(floor)
                .unwrap();

            recover_scene(&image, &light, &transmission)
                .unwrap()
                .as_slice()
                .iter()
                .flatten()
                .all(|v| (0.0..=1.0).contains(v))
        }
    }

    #[test]
    fn inverts_haze_model() {
        let scene = [0.2, 0.6, 0.4];
        let a = [0.9, 0.85, 0.8];
        let t = 0.5;
        let hazy = [0, 1, 2].map(|c| scene[c] * t + a[c] * (1.0 - t));

        let image = RgbImage::uniform(hazy, 2, 2).unwrap();
        let transmission = TransmissionMap::from_grid(Grid::filled(2, 2, t))
            .into_floored(0.25)
            .unwrap();
        let recovered = recover_scene(&image, &AtmosphericLight::new(a), &transmission).unwrap();

        for px in recovered.as_slice() {
            for c in 0..3 {
                assert_relative_eq!(px[c], scene[c], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn rejects_mismatched_transmission() {
        let image = RgbImage::uniform([0.5; 3], 2, 2).unwrap();
        let transmission = TransmissionMap::filled(2, 3, 1.0).into_floored(0.1).unwrap();
        let light = AtmosphericLight::new([1.0; 3]);
        assert!(recover_scene(&image, &light, &transmission).is_err());
    }
}
