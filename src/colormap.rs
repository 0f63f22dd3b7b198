use colorous::VIRIDIS;

/// Maps `t` in `[0, 1]` onto matplotlib's viridis colormap. Values outside the
/// range are clamped, NaN maps to the low end.
pub fn viridis(t: f64) -> [u8; 3] {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let color = VIRIDIS.eval_continuous(t);

    [color.r, color.g, color.b]
}
