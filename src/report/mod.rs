use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use std::path::Path;

use crate::types::{Attachment, Report};

pub mod csv;

const STYLE: &str = "body { font-family: sans-serif; font-size: 14px; } \
table { border-collapse: collapse; width: 90%; margin: 20px 0; font-size: 12px; } \
th, td { border: 1px solid #dddddd; text-align: left; padding: 4px; } \
th { background-color: #f2f2f2; font-weight: bold; } \
tr:nth-child(even) { background-color: #f9f9f9; } \
h2 { color: #D9534F; font-size: 20px; } \
h3 { margin-top: 25px; color: #333; }";

// `intro_html` is built by the jobs and inserted unescaped; everything else is escaped.
const TEMPLATE: &str = r#"<html><head><style>{{style}}</style></head>
<body>
<h2>{{heading}}</h2>
<p>{{{intro_html}}}</p>
{{#if summary}}<p><b>Summary of Alerts:</b></p>
<ul>
{{#each summary}}<li><b>{{this.name}}:</b> See attached file <code>{{this.attachment}}</code></li>
{{/each}}</ul>
{{/if}}{{#each sections}}<h3>{{this.title}}</h3>
<table>
<tr>{{#each this.headers}}<th>{{this}}</th>{{/each}}</tr>
{{#each this.rows}}<tr>{{#each this}}<td>{{this}}</td>{{/each}}</tr>
{{/each}}</table>
{{/each}}<br>
<div>Thanks,</div>
<div>{{sign_off}}</div>
</body></html>
"#;

/// One titled table of the alert email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportSection {
    pub fn new<T, F>(title: &str, headers: &[&str], items: &[T], cells: F) -> Self
    where
        F: Fn(&T) -> Vec<String>,
    {
        Self {
            title: title.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: items.iter().map(cells).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Entry of the attachment summary list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryItem {
    pub name: String,
    pub attachment: String,
}

/// Everything that goes into the HTML body of an alert email.
#[derive(Debug, Clone, Serialize)]
pub struct AlertDocument {
    pub heading: String,
    pub intro_html: String,
    pub summary: Vec<SummaryItem>,
    pub sections: Vec<ReportSection>,
    pub sign_off: String,
}

impl AlertDocument {
    pub fn new(heading: &str, intro_html: &str, sign_off: &str) -> Self {
        Self {
            heading: heading.to_string(),
            intro_html: intro_html.to_string(),
            summary: Vec::new(),
            sections: Vec::new(),
            sign_off: sign_off.to_string(),
        }
    }

    pub fn with_section(mut self, section: ReportSection) -> Self {
        self.sections.push(section);
        self
    }

    pub fn with_summary_item(mut self, name: &str, attachment: &str) -> Self {
        self.summary.push(SummaryItem {
            name: name.to_string(),
            attachment: attachment.to_string(),
        });
        self
    }

    /// Total number of alert rows across all sections.
    pub fn total_rows(&self) -> usize {
        self.sections.iter().map(|s| s.rows.len()).sum()
    }

    pub fn has_alerts(&self) -> bool {
        self.total_rows() > 0
    }
}

#[derive(Serialize)]
struct TemplateData<'a> {
    style: &'static str,
    heading: &'a str,
    intro_html: &'a str,
    summary: &'a [SummaryItem],
    sections: Vec<&'a ReportSection>,
    sign_off: &'a str,
}

pub struct Renderer<'a> {
    reg: Handlebars<'a>,
}

impl Renderer<'_> {
    pub fn new() -> Result<Self> {
        let mut reg = Handlebars::new();
        reg.set_strict_mode(true);
        reg.register_template_string("alert", TEMPLATE)
            .context("registering alert email template")?;
        Ok(Self { reg })
    }

    /// Render `doc`, leaving out sections without rows. `None` when no
    /// section has any.
    pub fn render(&self, doc: &AlertDocument) -> Result<Option<String>> {
        if !doc.has_alerts() {
            return Ok(None);
        }
        let data = TemplateData {
            style: STYLE,
            heading: &doc.heading,
            intro_html: &doc.intro_html,
            summary: &doc.summary,
            sections: doc.sections.iter().filter(|s| !s.is_empty()).collect(),
            sign_off: &doc.sign_off,
        };
        let html = self.reg.render("alert", &data).context("rendering alert email")?;
        Ok(Some(html))
    }
}

/// Build the email for `doc`, or `None` when there is nothing to report.
pub fn build_report(subject: &str, doc: &AlertDocument, attachments: Vec<Attachment>) -> Result<Option<Report>> {
    let renderer = Renderer::new()?;
    Ok(renderer.render(doc)?.map(|html_body| Report {
        subject: subject.to_string(),
        html_body,
        attachments,
    }))
}

impl Attachment {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { filename, bytes })
    }
}
