//! SVG builder: accumulates SVG elements and produces the final string.

// ═══════════════════════════════════════════════════════════════════════
// SvgBuilder
// ═══════════════════════════════════════════════════════════════════════

pub(super) struct SvgBuilder {
    elements: Vec<String>,
    /// Unscaled user-space size (viewBox)
    width: f64,
    height: f64,
    scale: f64,
    depth: usize,
}

impl SvgBuilder {
    pub(super) fn new(width: f64, height: f64, scale: f64) -> Self {
        Self {
            elements: Vec::new(),
            width,
            height,
            scale,
            depth: 0,
        }
    }

    /// Displayed width after scaling.
    pub(super) fn pixel_width(&self) -> f64 {
        self.width * self.scale
    }

    pub(super) fn pixel_height(&self) -> f64 {
        self.height * self.scale
    }

    pub(super) fn build(mut self) -> String {
        while self.depth > 0 {
            self.close_group();
        }
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {:.1} {:.1}" width="{:.1}" height="{:.1}" style="font-family: Arial, sans-serif;">"#,
            self.width,
            self.height,
            self.pixel_width(),
            self.pixel_height()
        );
        svg.push('\n');
        for el in &self.elements {
            svg.push_str("  ");
            svg.push_str(el);
            svg.push('\n');
        }
        svg.push_str("</svg>");
        svg
    }

    /// Open a `<g>` with the given attributes; closed by [`close_group`](Self::close_group).
    pub(super) fn open_group(&mut self, attrs: &[(&str, String)]) {
        let mut tag = String::from("<g");
        for (name, value) in attrs {
            tag.push_str(&format!(r#" {}="{}""#, name, escape(value)));
        }
        tag.push('>');
        self.elements.push(tag);
        self.depth += 1;
    }

    pub(super) fn close_group(&mut self) {
        if self.depth > 0 {
            self.elements.push("</g>".to_string());
            self.depth -= 1;
        }
    }

    pub(super) fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: &str, width: f64) {
        self.elements.push(format!(
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="{:.1}"/>"#,
            x1, y1, x2, y2, color, width
        ));
    }

    pub(super) fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) {
        self.elements.push(format!(
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"/>"#,
            x, y, w, h, fill
        ));
    }

    pub(super) fn circle(&mut self, cx: f64, cy: f64, r: f64, fill: &str) {
        self.elements.push(format!(
            r#"<circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="{}"/>"#,
            cx, cy, r, fill
        ));
    }

    pub(super) fn text(&mut self, x: f64, y: f64, content: &str, size: f64, weight: &str, fill: &str, anchor: &str) {
        self.elements.push(format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="{:.0}" font-weight="{}" fill="{}" text-anchor="{}">{}</text>"#,
            x,
            y,
            size,
            weight,
            fill,
            anchor,
            escape(content)
        ));
    }

    pub(super) fn path(&mut self, d: &str, fill: &str, stroke: &str, stroke_width: f64) {
        self.elements.push(format!(
            r#"<path d="{}" fill="{}" stroke="{}" stroke-width="{:.1}" stroke-linejoin="round"/>"#,
            d, fill, stroke, stroke_width
        ));
    }

    pub(super) fn ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, fill: &str, stroke: &str) {
        self.elements.push(format!(
            r#"<ellipse cx="{:.1}" cy="{:.1}" rx="{:.1}" ry="{:.1}" fill="{}" stroke="{}" stroke-width="1.4" transform="rotate(-20,{:.1},{:.1})"/>"#,
            cx, cy, rx, ry, fill, stroke, cx, cy
        ));
    }
}

pub(super) fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_size_with_unscaled_viewbox() {
        let mut svg = SvgBuilder::new(1000.0, 100.0, 0.8);
        svg.line(0.0, 0.0, 10.0, 0.0, "#000000", 1.0);
        let out = svg.build();
        assert!(out.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1000.0 100.0" width="800.0" height="80.0""#));
        assert!(out.ends_with("</svg>"));
    }

    #[test]
    fn text_and_attributes_are_escaped() {
        let mut svg = SvgBuilder::new(10.0, 10.0, 1.0);
        svg.open_group(&[("data-name", "A \"B\"".to_string())]);
        svg.text(0.0, 0.0, "Rock & <Roll>", 10.0, "normal", "#000000", "start");
        let out = svg.build();
        assert!(out.contains(r#"data-name="A &quot;B&quot;""#));
        assert!(out.contains("Rock &amp; &lt;Roll&gt;"));
        assert!(out.contains("</g>"), "unclosed groups are closed on build");
    }
}
