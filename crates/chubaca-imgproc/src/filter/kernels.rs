/// Create a 3-tap sobel kernel pair.
///
/// # Returns
///
/// The derivative kernel and the smoothing kernel.
pub fn sobel_kernel_1d() -> ([i32; 3], [i32; 3]) {
    ([-1, 0, 1], [1, 2, 1])
}
