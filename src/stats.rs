use num_traits::ToPrimitive;

/// `q`-th percentile (0..=100) with linear interpolation between the closest
/// ranks, matching numpy's default. Values that do not convert to `f64` are
/// ignored. `None` for an empty input.
///
/// Runs in linear time using selection rather than a full sort.
pub fn percentile<T: ToPrimitive>(values: &[T], q: f64) -> Option<f64> {
    let mut v: Vec<f64> = values
        .iter()
        .filter_map(|x| x.to_f64())
        .filter(|x| !x.is_nan())
        .collect();
    if v.is_empty() {
        return None;
    }

    let q = q.clamp(0.0, 100.0);
    let rank = q / 100.0 * (v.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;

    let (_, lo_val, upper) = v.select_nth_unstable_by(lo, f64::total_cmp);
    let lo_val = *lo_val;
    if frac == 0.0 || upper.is_empty() {
        return Some(lo_val);
    }
    let hi_val = upper.iter().copied().fold(f64::INFINITY, f64::min);

    Some(lo_val + (hi_val - lo_val) * frac)
}
