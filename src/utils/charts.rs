//! SVG line charts for training curves
//!
//! Produces standalone SVG files; no plotting backend is needed to view them.

use std::fs;
use std::path::Path;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 500.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 80.0;
const MARGIN_LEFT: f64 = 80.0;

pub const COLOR_PRIMARY: &str = "#3498db";
pub const COLOR_SECONDARY: &str = "#e67e22";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// Max number of x tick labels before they start to overlap
const MAX_X_TICKS: usize = 20;

#[derive(Debug, Clone)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    pub points: Vec<DataPoint>,
    pub color: String,
}

impl DataSeries {
    /// Build a series from consecutive values, x starting at 1
    pub fn from_values(name: &str, values: &[f64], color: &str) -> Self {
        Self {
            name: name.to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, &y)| DataPoint { x: (i + 1) as f64, y })
                .collect(),
            color: color.to_string(),
        }
    }
}

/// Y axis scaling
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum YAxis {
    /// Fixed 0..100, labelled with a percent sign
    Percent,
    /// 0 up to 10% above the largest value
    Auto,
}

/// Generate a line chart SVG
pub fn generate_line_chart(
    title: &str,
    x_label: &str,
    y_label: &str,
    series: &[DataSeries],
    y_axis: YAxis,
    output_path: &Path,
) -> std::io::Result<()> {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let (x_min, x_max, _, data_y_max) = find_ranges(series);
    let (x_min, x_max) = if x_min.is_finite() && x_max > x_min {
        (x_min, x_max)
    } else if x_min.is_finite() {
        (x_min - 1.0, x_min + 1.0)
    } else {
        (0.0, 1.0)
    };
    let y_min = 0.0;
    let (y_max, unit) = match y_axis {
        YAxis::Percent => (100.0_f64.max(data_y_max), "%"),
        YAxis::Auto if data_y_max.is_finite() && data_y_max > 0.0 => (data_y_max * 1.1, ""),
        YAxis::Auto => (1.0, ""),
    };

    let to_x = |x: f64| MARGIN_LEFT + ((x - x_min) / (x_max - x_min)) * plot_width;
    let to_y = |y: f64| MARGIN_TOP + plot_height - ((y - y_min) / (y_max - y_min)) * plot_height;

    let mut svg = String::new();

    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0, COLOR_TEXT, escape_xml(title)
    ));

    for i in 0..=5 {
        let y = MARGIN_TOP + plot_height - (i as f64 / 5.0) * plot_height;
        let value = y_min + (i as f64 / 5.0) * (y_max - y_min);

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            MARGIN_LEFT, y, MARGIN_LEFT + plot_width, y, COLOR_GRID
        ));
        let label = match y_axis {
            YAxis::Percent => format!("{:.0}{}", value, unit),
            YAxis::Auto => format!("{:.2}", value),
        };
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            MARGIN_LEFT - 10.0, y + 4.0, COLOR_TEXT, label
        ));
    }

    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP + plot_height, MARGIN_LEFT + plot_width, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, MARGIN_TOP + plot_height, COLOR_AXIS
    ));

    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">{}</text>"#,
        MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 20.0, COLOR_TEXT, escape_xml(x_label)
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">{}</text>"#,
        CHART_HEIGHT / 2.0, COLOR_TEXT, CHART_HEIGHT / 2.0, escape_xml(y_label)
    ));

    for series_data in series {
        if series_data.points.is_empty() {
            continue;
        }

        // non-finite values (a diverged epoch) leave a gap in the line
        let mut path = String::new();
        let mut pen_down = false;
        for point in &series_data.points {
            if !point.y.is_finite() {
                pen_down = false;
                continue;
            }
            let command = match (pen_down, path.is_empty()) {
                (true, _) => " L",
                (false, true) => "M",
                (false, false) => " M",
            };
            path.push_str(&format!("{} {:.2} {:.2}", command, to_x(point.x), to_y(point.y)));
            pen_down = true;
        }
        if !path.is_empty() {
            svg.push_str(&format!(
                r#"<path d="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
                path, series_data.color
            ));
        }

        // dots only while the curve is short enough to read them
        if series_data.points.len() <= 50 {
            for point in series_data.points.iter().filter(|p| p.y.is_finite()) {
                svg.push_str(&format!(
                    r#"<circle cx="{:.2}" cy="{:.2}" r="3" fill="{}"/>"#,
                    to_x(point.x),
                    to_y(point.y),
                    series_data.color
                ));
            }
        }
    }

    if let Some(first) = series.iter().find(|s| !s.points.is_empty()) {
        let step = (first.points.len() + MAX_X_TICKS - 1) / MAX_X_TICKS;
        for point in first.points.iter().step_by(step.max(1)) {
            svg.push_str(&format!(
                r#"<text x="{:.2}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="11" fill="{}">{:.0}</text>"#,
                to_x(point.x), MARGIN_TOP + plot_height + 20.0, COLOR_TEXT, point.x
            ));
        }
    }

    let mut legend_y = MARGIN_TOP + 10.0;
    for series_data in series {
        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="15" height="15" fill="{}"/>"#,
            CHART_WIDTH - MARGIN_RIGHT - 120.0, legend_y, series_data.color
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            CHART_WIDTH - MARGIN_RIGHT - 100.0, legend_y + 12.0, COLOR_TEXT, escape_xml(&series_data.name)
        ));
        legend_y += 25.0;
    }

    svg.push_str("</svg>");

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, svg)
}

fn find_ranges(series: &[DataSeries]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for s in series {
        for p in s.points.iter().filter(|p| p.y.is_finite()) {
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }
    }

    (x_min, x_max, y_min, y_max)
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_chart_generation() {
        let series = vec![
            DataSeries::from_values("train", &[36.8, 61.8, 65.8], COLOR_PRIMARY),
            DataSeries::from_values("val", &[30.0, 55.0, 60.0], COLOR_SECONDARY),
        ];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.svg");
        generate_line_chart("Accuracy", "Epoch", "Accuracy", &series, YAxis::Percent, &path)
            .unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains(">train<"));
        assert!(svg.contains(">val<"));
    }

    #[test]
    fn test_single_point_chart_has_finite_coordinates() {
        let series = vec![DataSeries::from_values("loss", &[0.7], COLOR_PRIMARY)];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("single.svg");
        generate_line_chart("Loss", "Epoch", "Loss", &series, YAxis::Auto, &path).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(!svg.contains("NaN"));
        assert!(svg.contains("<circle"));
    }

    #[test]
    fn test_diverged_values_break_the_line() {
        let series = vec![DataSeries::from_values(
            "loss",
            &[0.9, 0.6, f64::NAN, f64::INFINITY, 0.5, 0.4],
            COLOR_PRIMARY,
        )];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diverged.svg");
        generate_line_chart("Loss", "Epoch", "Loss", &series, YAxis::Auto, &path).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(!svg.contains("NaN"));
        assert!(!svg.contains("inf"));
        let d = svg.split("<path d=\"").nth(1).unwrap().split('"').next().unwrap();
        assert_eq!(d.matches('M').count(), 2);
        assert_eq!(d.matches('L').count(), 2);
        assert_eq!(svg.matches("<circle").count(), 4);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a < b & c"), "a &lt; b &amp; c");
    }
}
