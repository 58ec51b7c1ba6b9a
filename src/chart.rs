//! Chart emission.
//!
//! A [`Chart`] is the backend-neutral description of what to draw: one bar
//! per issue plus the vertical range. [`HtmlFile`] renders it as a
//! standalone HTML page with inline SVG; hovering a bar shows its tooltip.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::derive::{bucket_start_days, DrawableIssue, CLOSED_COLOR, OPEN_COLORS};
use crate::models::IssueState;

const TEMPLATE: &str = include_str!("../resources/chart.html");

/// Vertical range used when there is nothing to draw.
pub const DEFAULT_Y_RANGE: (u64, u64) = (0, 1);

const WIDTH: f64 = 1200.0;
const HEIGHT: f64 = 720.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 20.0;
const MARGIN_BOTTOM: f64 = 40.0;
const FILL_OPACITY: f64 = 0.8;
const TICK_STEPS: [f64; 7] = [7.0, 30.0, 90.0, 180.0, 365.0, 730.0, 1825.0];

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub title: String,
    pub marks: Vec<DrawableIssue>,
    /// Lowest and highest issue number on the vertical axis.
    pub y_range: (u64, u64),
}

impl Chart {
    pub fn new(title: &str, marks: Vec<DrawableIssue>) -> Self {
        let y_range = y_range(&marks);
        Chart {
            title: title.to_string(),
            marks,
            y_range,
        }
    }
}

pub fn y_range(marks: &[DrawableIssue]) -> (u64, u64) {
    let lo = marks.iter().map(|m| m.number).min();
    let hi = marks.iter().map(|m| m.number).max();
    match (lo, hi) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => DEFAULT_Y_RANGE,
    }
}

pub trait ChartBackend {
    fn render(&self, chart: &Chart) -> Result<()>;
}

pub struct HtmlFile {
    pub path: PathBuf,
}

impl ChartBackend for HtmlFile {
    fn render(&self, chart: &Chart) -> Result<()> {
        let html = to_html(chart);
        fs::write(&self.path, html)
            .with_context(|| format!("Failed to write chart to {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), marks = chart.marks.len(), "chart written");
        Ok(())
    }
}

pub fn to_html(chart: &Chart) -> String {
    let open = chart
        .marks
        .iter()
        .filter(|m| m.state == IssueState::Open)
        .count();
    let pulls = chart
        .marks
        .iter()
        .filter(|m| m.pull_request_url.is_some())
        .count();
    let summary = format!(
        "{} issues ({} open, {} closed, {} pull requests), #{} to #{}",
        chart.marks.len(),
        open,
        chart.marks.len() - open,
        pulls,
        chart.y_range.0,
        chart.y_range.1
    );

    fill_template(
        TEMPLATE,
        &[
            ("title", html_escape::encode_text(&chart.title).into_owned()),
            ("summary", summary),
            ("legend", legend()),
            ("svg", svg(chart)),
        ],
    )
}

/// Substitute `{{key}}` placeholders in one pass, so substituted text is
/// never scanned again.
fn fill_template(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match values.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn legend() -> String {
    let mut legend = String::new();
    for (bucket, color) in OPEN_COLORS.iter().enumerate() {
        let start = bucket_start_days(bucket, OPEN_COLORS.len());
        let label = if bucket + 1 == OPEN_COLORS.len() {
            format!("open {:.0}+ days", start)
        } else {
            let next = bucket_start_days(bucket + 1, OPEN_COLORS.len());
            format!("open {:.0}-{:.0} days", start, next)
        };
        legend.push_str(&format!(
            "<span class=\"swatch\" style=\"background:{}\"></span>{}",
            color, label
        ));
    }
    legend.push_str(&format!(
        "<span class=\"swatch\" style=\"background:{}\"></span>closed",
        CLOSED_COLOR
    ));
    legend
}

struct Frame {
    x_lo: f64,
    x_hi: f64,
    y_top: f64,
    y_span: f64,
}

impl Frame {
    fn new(chart: &Chart) -> Self {
        let mut x_lo = chart
            .marks
            .iter()
            .map(|m| m.position_x - m.width / 2.0)
            .fold(f64::INFINITY, f64::min);
        let x_hi = chart
            .marks
            .iter()
            .map(|m| m.position_x + m.width / 2.0)
            .fold(0.0, f64::max);
        if !x_lo.is_finite() {
            x_lo = -30.0;
        }
        if x_hi - x_lo < 1.0 {
            x_lo = x_hi - 1.0;
        }

        let (lo, hi) = chart.y_range;
        Frame {
            x_lo,
            x_hi,
            y_top: hi as f64 + 0.5,
            y_span: (hi - lo) as f64 + 1.0,
        }
    }

    fn plot_width() -> f64 {
        WIDTH - MARGIN_LEFT - MARGIN_RIGHT
    }

    fn plot_height() -> f64 {
        HEIGHT - MARGIN_TOP - MARGIN_BOTTOM
    }

    fn x_scale(&self) -> f64 {
        Self::plot_width() / (self.x_hi - self.x_lo)
    }

    fn sx(&self, x: f64) -> f64 {
        MARGIN_LEFT + (x - self.x_lo) * self.x_scale()
    }

    fn sy(&self, y: f64) -> f64 {
        MARGIN_TOP + (self.y_top - y) / self.y_span * Self::plot_height()
    }

    fn row_height(&self) -> f64 {
        Self::plot_height() / self.y_span
    }
}

fn svg(chart: &Chart) -> String {
    let frame = Frame::new(chart);
    let mut svg = String::new();

    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n",
        w = WIDTH,
        h = HEIGHT
    ));

    for mark in &chart.marks {
        let x = frame.sx(mark.position_x - mark.width / 2.0);
        let width = (mark.width * frame.x_scale()).max(1.0);
        let y = frame.sy(mark.position_y + 0.5);
        let mut tooltip = format!(
            "number: #{}\ntitle: {}\nsince: {}",
            mark.number, mark.title, mark.tooltip_text
        );
        if let Some(url) = &mark.pull_request_url {
            tooltip.push_str(&format!("\npull_request: {}", url));
        }

        let rect = format!(
            "<rect class=\"issue\" data-number=\"{}\" x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\" fill-opacity=\"{}\"><title>{}</title></rect>",
            mark.number,
            x,
            y,
            width,
            frame.row_height(),
            mark.color,
            FILL_OPACITY,
            html_escape::encode_text(&tooltip)
        );
        match &mark.pull_request_url {
            Some(url) => svg.push_str(&format!(
                "<a href=\"{}\">{}</a>\n",
                html_escape::encode_double_quoted_attribute(url),
                rect
            )),
            None => {
                svg.push_str(&rect);
                svg.push('\n');
            }
        }
    }

    svg.push_str(&axes(chart, &frame));
    svg.push_str("</svg>");
    svg
}

fn axes(chart: &Chart, frame: &Frame) -> String {
    let mut out = String::new();
    let baseline = HEIGHT - MARGIN_BOTTOM;

    out.push_str(&format!(
        "<line x1=\"{l}\" y1=\"{b}\" x2=\"{r}\" y2=\"{b}\" stroke=\"#999\"/>\n",
        l = MARGIN_LEFT,
        r = WIDTH - MARGIN_RIGHT,
        b = baseline
    ));

    let span = frame.x_hi - frame.x_lo;
    let step = TICK_STEPS
        .iter()
        .copied()
        .find(|s| span / s <= 12.0)
        .unwrap_or(TICK_STEPS[TICK_STEPS.len() - 1]);
    let mut tick = (frame.x_hi / step).floor() * step;
    while tick >= frame.x_lo {
        let label = tick_label(tick);
        out.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\">{}</text>\n",
            frame.sx(tick),
            baseline + 16.0,
            label
        ));
        tick -= step;
    }

    let (lo, hi) = chart.y_range;
    let mut labels = vec![lo];
    if hi != lo {
        labels.push(hi);
    }
    for number in labels {
        out.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"end\" dominant-baseline=\"middle\">#{}</text>\n",
            MARGIN_LEFT - 6.0,
            frame.sy(number as f64),
            number
        ));
    }

    out
}

/// Axis label for a tick `days` relative to now.
fn tick_label(days: f64) -> String {
    if days == 0.0 {
        "now".to_string()
    } else if days > 0.0 {
        format!("in {:.0} days", days)
    } else {
        format!("{:.0} days ago", -days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mark(number: u64, title: &str) -> DrawableIssue {
        DrawableIssue {
            number,
            state: IssueState::Open,
            position_x: -10.0,
            position_y: number as f64,
            width: 8.0,
            color: OPEN_COLORS[0],
            title: title.to_string(),
            tooltip_text: "14 days ago".to_string(),
            pull_request_url: None,
        }
    }

    #[test]
    fn test_y_range() {
        assert_eq!(y_range(&[]), DEFAULT_Y_RANGE);
        assert_eq!(y_range(&[mark(7, "a")]), (7, 7));
        assert_eq!(y_range(&[mark(7, "a"), mark(2, "b"), mark(40, "c")]), (2, 40));
    }

    #[test]
    fn test_empty_chart_renders() {
        let html = to_html(&Chart::new("numba/numba", vec![]));
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>numba/numba</title>"));
        assert!(html.contains("0 issues"));
        assert_eq!(html.matches("class=\"issue\"").count(), 0);
        assert!(html.contains("</svg>"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_one_rect_per_mark() {
        let chart = Chart::new("numba/numba", vec![mark(1, "a"), mark(2, "b"), mark(3, "c")]);
        let html = to_html(&chart);
        assert_eq!(html.matches("<rect class=\"issue\"").count(), 3);
        assert!(html.contains("data-number=\"2\""));
        assert!(html.contains("since: 14 days ago"));
        assert!(html.contains("#1 to #3"));
    }

    #[test]
    fn test_single_mark_has_finite_geometry() {
        let html = to_html(&Chart::new("x/y", vec![mark(5, "only")]));
        assert!(!html.contains("NaN"));
        assert!(!html.contains("inf"));
    }

    #[test]
    fn test_tick_labels() {
        assert_eq!(tick_label(0.0), "now");
        assert_eq!(tick_label(-30.0), "30 days ago");
        assert_eq!(tick_label(7.0), "in 7 days");
    }

    #[test]
    fn test_future_issue_has_no_negative_ago_label() {
        let mut future = mark(3, "skewed clock");
        future.position_x = 10.0;
        future.width = 0.0;
        let html = to_html(&Chart::new("numba/numba", vec![mark(1, "a"), future]));
        assert!(html.contains(">in 7 days</text>"));
        assert!(!html.contains(">-"));
    }

    #[test]
    fn test_titles_are_escaped() {
        let chart = Chart::new(
            "<b>owner</b>/repo",
            vec![mark(1, "<script>alert(1)</script> & {{svg}}")],
        );
        let html = to_html(&chart);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("&amp; {{svg}}"));
        assert!(html.contains("&lt;b&gt;owner&lt;/b&gt;/repo"));
    }

    #[test]
    fn test_pull_request_marks_link_out() {
        let mut pr = mark(8, "Fix");
        pr.pull_request_url = Some("https://github.com/numba/numba/pull/8".to_string());
        let html = to_html(&Chart::new("numba/numba", vec![pr]));
        assert!(html.contains("<a href=\"https://github.com/numba/numba/pull/8\">"));
        assert!(html.contains("pull_request: https://github.com/numba/numba/pull/8"));
        assert!(html.contains("1 pull requests"));
    }

    #[test]
    fn test_fill_template_single_pass() {
        let out = fill_template(
            "a {{x}} b {{y}} {{unknown}} {{",
            &[("x", "{{y}}".to_string()), ("y", "Y".to_string())],
        );
        assert_eq!(out, "a {{y}} b Y {{unknown}} {{");
    }

    #[test]
    fn test_html_file_backend_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("numba.numba.html");
        let backend = HtmlFile { path: path.clone() };
        backend
            .render(&Chart::new("numba/numba", vec![mark(1, "a")]))
            .unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("data-number=\"1\""));
    }

    #[test]
    fn test_html_file_backend_error_propagates() {
        let dir = tempdir().unwrap();
        let backend = HtmlFile {
            path: dir.path().join("missing").join("chart.html"),
        };
        assert!(backend.render(&Chart::new("a/b", vec![])).is_err());
    }
}
