use chubaca_image::{Image, ImageError};

use crate::filter::sobel_3x3;

// tan(22.5deg) in Q15 fixed point.
const TG22: i64 = 13573;
const SHIFT: u32 = 15;

#[derive(Clone, Copy, PartialEq)]
enum EdgeState {
    None,
    Weak,
    Strong,
}

/// Detect edges with the Canny algorithm.
///
/// Gradients come from a 3x3 sobel operator and the magnitude is the L1 norm `|dx| + |dy|`.
/// A pixel survives non-maximum suppression when its magnitude is a local maximum across the
/// quantized gradient direction; it is a candidate above `low_threshold` and a seed above
/// `high_threshold`. Candidates 8-connected to a seed are kept.
///
/// # Arguments
///
/// * `src` - The input grayscale image.
/// * `low_threshold` - The lower hysteresis threshold.
/// * `high_threshold` - The upper hysteresis threshold.
///
/// # Returns
///
/// A mask where edge pixels are 255 and the rest 0.
pub fn canny(
    src: &Image<u8, 1>,
    low_threshold: f64,
    high_threshold: f64,
) -> Result<Image<u8, 1>, ImageError> {
    let (width, height) = (src.width(), src.height());
    let (dx, dy) = sobel_3x3(src)?;
    let (dx, dy) = (dx.as_slice(), dy.as_slice());

    let (low, high) = if low_threshold > high_threshold {
        (high_threshold, low_threshold)
    } else {
        (low_threshold, high_threshold)
    };
    let low = low.floor() as i32;
    let high = high.floor() as i32;

    let magnitude: Vec<i32> = dx
        .iter()
        .zip(dy.iter())
        .map(|(gx, gy)| gx.abs() + gy.abs())
        .collect();
    let mag_at = |x: isize, y: isize| -> i32 {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0
        } else {
            magnitude[y as usize * width + x as usize]
        }
    };

    let mut state = vec![EdgeState::None; width * height];
    let mut stack = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }

            let (xs, ys) = (dx[idx] as i64, dy[idx] as i64);
            let ax = xs.abs();
            let ay = ys.abs() << SHIFT;
            let tg22x = ax * TG22;
            let (xi, yi) = (x as isize, y as isize);

            let is_max = if ay < tg22x {
                m > mag_at(xi - 1, yi) && m >= mag_at(xi + 1, yi)
            } else {
                let tg67x = tg22x + (ax << (SHIFT + 1));
                if ay > tg67x {
                    m > mag_at(xi, yi - 1) && m >= mag_at(xi, yi + 1)
                } else {
                    let s = if (xs ^ ys) < 0 { -1 } else { 1 };
                    m > mag_at(xi - s, yi - 1) && m > mag_at(xi + s, yi + 1)
                }
            };

            if !is_max {
                continue;
            }

            if m > high {
                state[idx] = EdgeState::Strong;
                stack.push(idx);
            } else {
                state[idx] = EdgeState::Weak;
            }
        }
    }

    // hysteresis: grow the seeds through 8-connected candidates
    while let Some(idx) = stack.pop() {
        let (x, y) = ((idx % width) as isize, (idx / width) as isize);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let nidx = ny as usize * width + nx as usize;
                if state[nidx] == EdgeState::Weak {
                    state[nidx] = EdgeState::Strong;
                    stack.push(nidx);
                }
            }
        }
    }

    let edges = state
        .iter()
        .map(|s| if *s == EdgeState::Strong { 255 } else { 0 })
        .collect();

    Image::new(src.size(), edges)
}
