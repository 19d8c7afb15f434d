use rayon::prelude::*;

use chubaca_image::{Image, ImageError};

use super::kernels::sobel_kernel_1d;

/// Compute the 3x3 sobel derivatives of a single channel image.
///
/// Borders are handled by replicating the outermost pixels.
///
/// # Arguments
///
/// * `src` - The input image.
///
/// # Returns
///
/// The horizontal (`dx`) and vertical (`dy`) derivatives, with `dy` positive downwards.
pub fn sobel_3x3(src: &Image<u8, 1>) -> Result<(Image<i32, 1>, Image<i32, 1>), ImageError> {
    let (width, height) = (src.width(), src.height());
    if width == 0 || height == 0 {
        return Err(ImageError::EmptyImage(width, height));
    }

    let (derivative, smoothing) = sobel_kernel_1d();
    let data = src.as_slice();
    let clamp = |i: isize, len: usize| i.clamp(0, len as isize - 1) as usize;

    let mut dx = vec![0i32; width * height];
    let mut dy = vec![0i32; width * height];

    dx.par_chunks_exact_mut(width)
        .zip(dy.par_chunks_exact_mut(width))
        .enumerate()
        .for_each(|(y, (dx_row, dy_row))| {
            for x in 0..width {
                let mut gx = 0i32;
                let mut gy = 0i32;
                for (ky, (&d_y, &s_y)) in derivative.iter().zip(smoothing.iter()).enumerate() {
                    let yy = clamp(y as isize + ky as isize - 1, height);
                    for (kx, (&d_x, &s_x)) in derivative.iter().zip(smoothing.iter()).enumerate() {
                        let xx = clamp(x as isize + kx as isize - 1, width);
                        let v = data[yy * width + xx] as i32;
                        gx += v * d_x * s_y;
                        gy += v * s_x * d_y;
                    }
                }
                dx_row[x] = gx;
                dy_row[x] = gy;
            }
        });

    Ok((Image::new(src.size(), dx)?, Image::new(src.size(), dy)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chubaca_image::ImageSize;

    #[test]
    fn sobel_vertical_step() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let src = Image::<u8, 1>::new(
            ImageSize { width: 4, height: 3 },
            vec![
                0, 0, 10, 10,
                0, 0, 10, 10,
                0, 0, 10, 10,
            ],
        )?;
        let (dx, dy) = sobel_3x3(&src)?;
        assert_eq!(dx.as_slice()[4..8], [0, 40, 40, 0]);
        assert!(dy.as_slice().iter().all(|&v| v == 0));
        Ok(())
    }

    #[test]
    fn sobel_horizontal_step() -> Result<(), ImageError> {
        #[rustfmt::skip]
        let src = Image::<u8, 1>::new(
            ImageSize { width: 2, height: 3 },
            vec![
                0, 0,
                0, 0,
                5, 5,
            ],
        )?;
        let (dx, dy) = sobel_3x3(&src)?;
        assert!(dx.as_slice().iter().all(|&v| v == 0));
        assert_eq!(dy.as_slice(), &[0, 0, 20, 20, 20, 20]);
        Ok(())
    }
}
