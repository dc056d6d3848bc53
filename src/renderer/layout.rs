//! Lays a CV out as a single SVG page, A4 wide and as tall as the content.

use crate::cv::{CvTemplate, ExportCvData};

pub const PAGE_WIDTH: f32 = 595.0;
pub const MIN_PAGE_HEIGHT: f32 = 842.0;

/// Average glyph advance as a fraction of the font size, used for wrapping.
const GLYPH_WIDTH_RATIO: f32 = 0.52;

struct Style {
    margin: f32,
    name_size: f32,
    heading_size: f32,
    body_size: f32,
    line_gap: f32,
    section_gap: f32,
    accent: &'static str,
    font_family: &'static str,
}

impl Style {
    fn for_template(template: CvTemplate) -> Self {
        match template {
            CvTemplate::Classic => Self {
                margin: 48.0,
                name_size: 26.0,
                heading_size: 14.0,
                body_size: 10.5,
                line_gap: 1.45,
                section_gap: 18.0,
                accent: "#1f4e79",
                font_family: "Georgia, 'DejaVu Serif', serif",
            },
            CvTemplate::Compact => Self {
                margin: 32.0,
                name_size: 20.0,
                heading_size: 12.0,
                body_size: 9.0,
                line_gap: 1.3,
                section_gap: 10.0,
                accent: "#2d6a4f",
                font_family: "Helvetica, Arial, 'DejaVu Sans', sans-serif",
            },
        }
    }

    fn content_width(&self) -> f32 {
        PAGE_WIDTH - 2.0 * self.margin
    }
}

struct Page {
    style: Style,
    y: f32,
    body: String,
}

impl Page {
    fn new(style: Style) -> Self {
        let y = style.margin;
        Self {
            style,
            y,
            body: String::new(),
        }
    }

    fn text(&mut self, content: &str, size: f32, weight: &str, fill: &str) {
        self.y += size;
        self.body.push_str(&format!(
            r#"<text x="{x}" y="{y:.1}" font-size="{size}" font-weight="{weight}" fill="{fill}">{text}</text>"#,
            x = self.style.margin,
            y = self.y,
            text = escape_xml(content),
        ));
        self.body.push('\n');
        self.y += size * (self.style.line_gap - 1.0);
    }

    fn paragraph(&mut self, content: &str) {
        let size = self.style.body_size;
        let max_chars = (self.style.content_width() / (size * GLYPH_WIDTH_RATIO)).floor() as usize;
        for line in wrap(content, max_chars) {
            self.text(&line, size, "normal", "#222222");
        }
    }

    fn heading(&mut self, title: &str) {
        self.y += self.style.section_gap;
        let size = self.style.heading_size;
        let accent = self.style.accent;
        self.text(&title.to_uppercase(), size, "bold", accent);
        self.body.push_str(&format!(
            r#"<line x1="{x1}" y1="{y:.1}" x2="{x2}" y2="{y:.1}" stroke="{accent}" stroke-width="0.8"/>"#,
            x1 = self.style.margin,
            x2 = PAGE_WIDTH - self.style.margin,
            y = self.y + 2.0,
        ));
        self.body.push('\n');
        self.y += 6.0;
    }

    fn finish(self) -> String {
        let height = (self.y + self.style.margin).max(MIN_PAGE_HEIGHT);
        format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h:.0}" viewBox="0 0 {w} {h:.0}" font-family="{font}">
<rect width="100%" height="100%" fill="#ffffff"/>
{body}</svg>"##,
            w = PAGE_WIDTH,
            h = height,
            font = escape_xml(self.style.font_family),
            body = self.body,
        )
    }
}

/// Renders the CV into a standalone SVG document.
pub fn render_svg(cv: &ExportCvData) -> String {
    let mut page = Page::new(Style::for_template(cv.template));
    let p = &cv.personal;

    let name_size = page.style.name_size;
    let accent = page.style.accent;
    page.text(p.full_name.trim(), name_size, "bold", accent);
    if let Some(headline) = non_blank(&p.headline) {
        let size = page.style.heading_size;
        page.text(headline, size, "normal", "#444444");
    }

    let contact: Vec<&str> = std::iter::once(p.email.trim())
        .chain(non_blank(&p.phone))
        .chain(non_blank(&p.location))
        .chain(non_blank(&p.website))
        .collect();
    page.paragraph(&contact.join("  |  "));

    if let Some(summary) = non_blank(&cv.summary) {
        page.heading("Profile");
        page.paragraph(summary);
    }

    if !cv.experience.is_empty() {
        page.heading("Experience");
        for entry in &cv.experience {
            let size = page.style.body_size + 1.0;
            page.text(
                &format!("{} — {}", entry.title.trim(), entry.company.trim()),
                size,
                "bold",
                "#111111",
            );
            if let Some(period) = period(&entry.start_date, &entry.end_date) {
                let size = page.style.body_size;
                page.text(&period, size, "normal", "#666666");
            }
            if let Some(description) = non_blank(&entry.description) {
                page.paragraph(description);
            }
            page.y += 4.0;
        }
    }

    if !cv.education.is_empty() {
        page.heading("Education");
        for entry in &cv.education {
            let line = match non_blank(&entry.degree) {
                Some(degree) => format!("{degree}, {}", entry.institution.trim()),
                None => entry.institution.trim().to_string(),
            };
            let size = page.style.body_size + 1.0;
            page.text(&line, size, "bold", "#111111");
            if let Some(period) = period(&entry.start_date, &entry.end_date) {
                let size = page.style.body_size;
                page.text(&period, size, "normal", "#666666");
            }
        }
    }

    if !cv.skills.is_empty() {
        page.heading("Skills");
        page.paragraph(&join_items(&cv.skills));
    }

    if !cv.languages.is_empty() {
        page.heading("Languages");
        page.paragraph(&join_items(&cv.languages));
    }

    page.finish()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn period(start: &Option<String>, end: &Option<String>) -> Option<String> {
    match (non_blank(start), non_blank(end)) {
        (Some(s), Some(e)) => Some(format!("{s} – {e}")),
        (Some(s), None) => Some(format!("{s} – present")),
        (None, Some(e)) => Some(e.to_string()),
        (None, None) => None,
    }
}

fn join_items(items: &[String]) -> String {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" · ")
}

/// Greedy word wrap on character counts. Words longer than a line are split.
pub(crate) fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for raw_line in text.lines() {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }

    lines
}

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // XML 1.0 forbids most control characters
            c if c.is_control() && c != '\t' => {}
            c => out.push(c),
        }
    }
    out
}
