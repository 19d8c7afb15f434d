use num_traits::Zero;
use rayon::prelude::*;

use chubaca_image::{Image, ImageError};

/// Binarize a multi-channel image into a single channel mask.
///
/// A pixel is set to `max_value` when any of its channels is non-zero, otherwise to zero.
///
/// # Arguments
///
/// * `src` - The input image of an arbitrary number of channels and type.
/// * `dst` - The output mask with the same size as the input image.
/// * `max_value` - The value written for non-zero pixels.
///
/// # Examples
///
/// ```
/// use chubaca_image::{Image, ImageSize};
/// use chubaca_imgproc::threshold::binarize_non_zero;
///
/// let data = vec![0.0f32, 0.0, 0.5, 0.0, 0.0, 0.0];
/// let image = Image::<_, 3>::new(ImageSize { width: 2, height: 1 }, data).unwrap();
///
/// let mut mask = Image::<u8, 1>::from_size_val(image.size(), 0).unwrap();
/// binarize_non_zero(&image, &mut mask, 255).unwrap();
/// assert_eq!(mask.as_slice(), &[255, 0]);
/// ```
pub fn binarize_non_zero<T, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<u8, 1>,
    max_value: u8,
) -> Result<(), ImageError>
where
    T: Copy + Send + Sync + Zero,
{
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.width(),
            src.height(),
            dst.width(),
            dst.height(),
        ));
    }

    dst.as_slice_mut()
        .par_iter_mut()
        .zip(src.as_slice().par_chunks_exact(C))
        .for_each(|(out, px)| {
            *out = if px.iter().any(|v| !v.is_zero()) {
                max_value
            } else {
                0
            };
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chubaca_image::ImageSize;

    #[test]
    fn binarize_size_mismatch() -> Result<(), ImageError> {
        let src = Image::<f32, 3>::zeros(ImageSize {
            width: 2,
            height: 2,
        })?;
        let mut dst = Image::<u8, 1>::zeros(ImageSize {
            width: 3,
            height: 2,
        })?;
        assert!(binarize_non_zero(&src, &mut dst, 255).is_err());
        Ok(())
    }

    #[test]
    fn binarize_any_channel() -> Result<(), ImageError> {
        let src = Image::<f32, 3>::new(
            ImageSize {
                width: 3,
                height: 1,
            },
            vec![0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0],
        )?;
        let mut dst = Image::<u8, 1>::zeros(src.size())?;
        binarize_non_zero(&src, &mut dst, 255)?;
        assert_eq!(dst.as_slice(), &[255, 0, 255]);
        Ok(())
    }
}
