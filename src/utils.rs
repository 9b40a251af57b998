/// Cost form of a potential; a zero potential costs `+inf`.
pub fn potential_to_cost(potential: f64) -> f64 {
    if potential == 0.0 {
        f64::INFINITY
    } else {
        -potential.ln()
    }
}

/// Divides `values` by their sum in place and returns the sum.
///
/// Leaves `values` untouched when the sum is zero or not finite; callers decide
/// whether that is an error.
pub fn normalize(values: &mut [f64]) -> f64 {
    let norm: f64 = values.iter().sum();
    if norm > 0.0 && norm.is_finite() {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
    norm
}

/// Multiplies `values` element-wise by `factor`, then divides by the new maximum.
///
/// Keeps long running products of messages in range; the direction of the
/// vector is unchanged, so callers normalize at the end as usual. An all-zero
/// product is left at zero.
pub fn scaled_product(values: &mut [f64], factor: &[f64]) {
    for (v, f) in values.iter_mut().zip(factor) {
        *v *= f;
    }
    let max = values.iter().copied().fold(0.0, f64::max);
    if max > 0.0 && max.is_finite() {
        for v in values.iter_mut() {
            *v /= max;
        }
    }
}

/// Largest absolute element-wise difference, 0 for empty slices.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
