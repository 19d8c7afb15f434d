use chubaca_image::{Image, ImageError, ImageSize};

/// Pad an image with a constant value on every side.
///
/// # Arguments
///
/// * `src` - The input image.
/// * `pad` - The margin in pixels added to each side.
/// * `value` - The value written into the margin.
///
/// # Returns
///
/// A new image of size `(W + 2 * pad, H + 2 * pad)`.
pub fn constant_padding<T, const C: usize>(
    src: &Image<T, C>,
    pad: usize,
    value: T,
) -> Result<Image<T, C>, ImageError>
where
    T: Copy,
{
    let new_size = ImageSize {
        width: src.width() + 2 * pad,
        height: src.height() + 2 * pad,
    };
    let mut dst = Image::<T, C>::from_size_val(new_size, value)?;

    let src_stride = src.width() * C;
    let dst_stride = new_size.width * C;
    let src_data = src.as_slice();
    let dst_data = dst.as_slice_mut();

    for (y, src_row) in src_data.chunks_exact(src_stride).enumerate() {
        let offset = (y + pad) * dst_stride + pad * C;
        dst_data[offset..offset + src_stride].copy_from_slice(src_row);
    }

    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_padding_u8() -> Result<(), ImageError> {
        let src = Image::<u8, 1>::new(
            ImageSize {
                width: 2,
                height: 2,
            },
            vec![1, 2, 3, 4],
        )?;
        let dst = constant_padding(&src, 1, 0)?;
        assert_eq!(dst.width(), 4);
        assert_eq!(dst.height(), 4);
        #[rustfmt::skip]
        assert_eq!(
            dst.as_slice(),
            &[
                0, 0, 0, 0,
                0, 1, 2, 0,
                0, 3, 4, 0,
                0, 0, 0, 0,
            ]
        );
        Ok(())
    }

    #[test]
    fn constant_padding_zero_margin() -> Result<(), ImageError> {
        let src = Image::<u8, 1>::new([3, 1].into(), vec![7, 8, 9])?;
        let dst = constant_padding(&src, 0, 0)?;
        assert_eq!(dst, src);
        Ok(())
    }
}
