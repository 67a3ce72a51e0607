// 📈 Horizontal bar chart layout
//
// Pure geometry: values in, bar lengths out. The PDF layer only draws what
// this module computes, so the scaling rules can be tested without a PDF.

/// A value farther than this many times the median magnitude is an outlier
pub const OUTLIER_FACTOR: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    /// Signed length in drawing units; negative bars extend left of zero
    pub length: f64,
    /// Bar was cut to the scale of the remaining bars
    pub truncated: bool,
}

impl Bar {
    pub fn is_positive(&self) -> bool {
        self.value >= 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarChartLayout {
    pub bars: Vec<Bar>,
    /// Magnitude mapped to the full half width
    pub scale_max: f64,
}

impl BarChartLayout {
    pub fn truncated(&self) -> Vec<&Bar> {
        self.bars.iter().filter(|b| b.truncated).collect()
    }
}

/// Lay out bars around a vertical zero line
///
/// # Arguments
/// * `items` - label/value pairs, drawn in the given order
/// * `half_width` - drawing width on either side of the zero line
/// * `truncate_outliers` - cut bars beyond `OUTLIER_FACTOR` × median magnitude
///   to the scale of the remaining bars
pub fn layout_bars(items: &[(String, f64)], half_width: f64, truncate_outliers: bool) -> BarChartLayout {
    let magnitudes: Vec<f64> = items.iter().map(|(_, v)| v.abs()).collect();
    let median_magnitude = median(&magnitudes);

    let is_outlier = |value: f64| {
        truncate_outliers
            && items.len() > 2
            && median_magnitude > 0.0
            && value.abs() > OUTLIER_FACTOR * median_magnitude
    };

    let scale_max = {
        let regular = items
            .iter()
            .map(|(_, v)| *v)
            .filter(|v| !is_outlier(*v))
            .map(f64::abs)
            .fold(0.0_f64, f64::max);
        if regular > 0.0 {
            regular
        } else {
            magnitudes.iter().copied().fold(0.0_f64, f64::max)
        }
    };

    let bars = items
        .iter()
        .map(|(label, value)| {
            let truncated = is_outlier(*value);
            let magnitude = if scale_max > 0.0 {
                (value.abs() / scale_max).min(1.0) * half_width
            } else {
                0.0
            };
            Bar {
                label: label.clone(),
                value: *value,
                length: magnitude.copysign(*value),
                truncated,
            }
        })
        .collect();

    BarChartLayout { bars, scale_max }
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Zig-zag marker across a truncated bar end, as (x, y) points
pub fn zigzag_points(x: f64, y_bottom: f64, height: f64, teeth: usize) -> Vec<(f64, f64)> {
    let teeth = teeth.max(1);
    let step = height / (teeth * 2) as f64;
    (0..=teeth * 2)
        .map(|i| {
            let dx = if i % 2 == 0 { -1.0 } else { 1.0 };
            (x + dx, y_bottom + step * i as f64)
        })
        .collect()
}
