use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;

use crate::drivers::buffer::PlotBuffer;
use crate::drivers::MonitorError;

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
    /// Plot log10 of the values. Pressures span many decades.
    pub log_scale: bool,
    /// Caption, axis labels and legend. These need a system font.
    pub annotate: bool,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, YELLOW, WHITE],
            log_scale: false,
            annotate: true,
        }
    }
}

/// Draw every visible series of the buffer against elapsed seconds.
/// In log scale non-positive values are skipped.
pub fn render_plot_png(buffer: &PlotBuffer, style: &PlotStyle) -> Result<Vec<u8>, MonitorError> {
    let traces: Vec<(String, Vec<(f64, f64)>)> = buffer
        .visible()
        .map(|series| {
            let points: Vec<(f64, f64)> = series
                .points()
                .filter_map(|&(t, v)| {
                    if style.log_scale {
                        (v > 0.0).then(|| (t, v.log10()))
                    } else {
                        Some((t, v))
                    }
                })
                .collect();
            (series.label().to_owned(), points)
        })
        .filter(|(_, points)| !points.is_empty())
        .collect();
    if traces.is_empty() {
        return Err(MonitorError::Plot("no enabled series has points".into()));
    }

    let (x_bounds, y_bounds) = bounds(traces.iter().flat_map(|(_, points)| points.iter()));
    let mut pixels = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut builder = ChartBuilder::on(&root);
        builder.margin(10);
        if style.annotate {
            let caption = if style.log_scale { "Pressure" } else { "Readings" };
            builder
                .caption(caption, ("sans-serif", 20).into_font().color(&WHITE))
                .set_label_area_size(LabelAreaPosition::Left, 55)
                .set_label_area_size(LabelAreaPosition::Bottom, 40);
        }
        let mut chart =
            builder.build_cartesian_2d(x_bounds.0..x_bounds.1, y_bounds.0..y_bounds.1)?;
        if style.annotate {
            let log_scale = style.log_scale;
            let y_label = move |y: &f64| {
                if log_scale {
                    format!("{:.0e}", 10f64.powf(*y))
                } else {
                    format!("{y:.2}")
                }
            };
            chart
                .configure_mesh()
                .light_line_style(&WHITE.mix(0.1))
                .label_style(("sans-serif", 12).into_font().color(&WHITE))
                .x_desc("Time (s)")
                .y_label_formatter(&y_label)
                .draw()?;
        }
        for (idx, (label, points)) in traces.iter().enumerate() {
            let color = style
                .palette
                .get(idx % style.palette.len().max(1))
                .copied()
                .unwrap_or(WHITE);
            let series = chart.draw_series(LineSeries::new(points.iter().copied(), &color))?;
            if style.annotate {
                series
                    .label(label.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
            }
        }
        if style.annotate {
            chart
                .configure_series_labels()
                .border_style(&WHITE.mix(0.2))
                .background_style(&style.background)
                .label_font(("sans-serif", 12).into_font().color(&WHITE))
                .draw()?;
        }
        root.present()?;
    }
    encode_png(&pixels, style.width, style.height)
}

fn bounds<'a>(points: impl Iterator<Item = &'a (f64, f64)>) -> ((f64, f64), (f64, f64)) {
    let mut x = (f64::INFINITY, f64::NEG_INFINITY);
    let mut y = (f64::INFINITY, f64::NEG_INFINITY);
    for &(t, v) in points {
        x = (x.0.min(t), x.1.max(t));
        y = (y.0.min(v), y.1.max(v));
    }
    (widen(x), widen(y))
}

// plotters needs a non-empty range
fn widen((lo, hi): (f64, f64)) -> (f64, f64) {
    if (hi - lo).abs() < f64::EPSILON {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo, hi)
    }
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, MonitorError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| MonitorError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
