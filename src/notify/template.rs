//! Message bodies for roster notifications.

use std::fmt;
use std::str::FromStr;

use crate::roster::{EmployeeRecord, fields};

/// Which rendering a deployment sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFormat {
    #[default]
    Plain,
    Html,
}

impl FromStr for BodyFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(BodyFormat::Plain),
            "html" => Ok(BodyFormat::Html),
            other => Err(format!("unknown body format '{other}' (expected plain or html)")),
        }
    }
}

impl fmt::Display for BodyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyFormat::Plain => write!(f, "plain"),
            BodyFormat::Html => write!(f, "html"),
        }
    }
}

/// A rendered message body and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    pub format: BodyFormat,
    pub content: String,
}

/// Labelled detail lines, in display order.
const DETAILS: [(&str, &str); 6] = [
    ("Employee Code", fields::EMP_CODE),
    ("Area", fields::AREA),
    ("Location", fields::LOCATION),
    ("Pickup Time", fields::PICKUP_TIME),
    ("Contact Number", fields::CONTACT_NO),
    ("Process", fields::PROCESS),
];

const POLICY_FOOTER: &str = "Transport is provided only at the rostered pickup point and time. \
The cab will wait no longer than 5 minutes. Changes to your pickup address or shift must be \
requested through the transport desk at least 24 hours in advance.";

pub fn render(record: &EmployeeRecord, format: BodyFormat) -> RenderedBody {
    let content = match format {
        BodyFormat::Plain => render_plain(record),
        BodyFormat::Html => render_html(record),
    };
    RenderedBody { format, content }
}

pub fn render_plain(record: &EmployeeRecord) -> String {
    let mut body = format!(
        "Dear {},\n\nWe are pleased to share your updated transportation details:\n\n",
        record.field(fields::NAME)
    );
    for (label, column) in DETAILS {
        body.push_str(&format!("🔹 {label}: {}\n", record.field(column)));
    }
    body.push_str(
        "\nPlease ensure you are available at the designated pickup location on time. \
         If you have any questions or need further assistance, feel free to reach out.\n\n\
         Best regards,\nYour Admin Team",
    );
    body
}

pub fn render_html(record: &EmployeeRecord) -> String {
    let rows: String = DETAILS
        .iter()
        .map(|(label, column)| {
            format!(
                "<tr><td style=\"padding:4px 12px 4px 0\"><strong>{label}</strong></td><td>{}</td></tr>",
                escape_html(record.field(column))
            )
        })
        .collect();

    format!(
        "<html><body style=\"font-family:Arial,sans-serif\">\
<p>Dear {name},</p>\
<p>We are pleased to share your updated transportation details:</p>\
<table>{rows}</table>\
<p>Please ensure you are available at the designated pickup location on time. \
If you have any questions or need further assistance, feel free to reach out.</p>\
<p>Best regards,<br>Your Admin Team</p>\
<hr><p style=\"font-size:12px;color:#666\">{POLICY_FOOTER}</p>\
</body></html>",
        name = escape_html(record.field(fields::NAME)),
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
