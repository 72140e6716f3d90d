//! Template selection and rendering
//!
//! Templates are a closed set. A selector that names none of them renders
//! with [`Template::Plain`], so rendering never fails.

use std::{collections::BTreeMap, fmt::Debug};

use herald_common::internal;

use crate::record::DeliveryRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Template {
    #[default]
    Plain,
    Welcome,
    PasswordReset,
    Invitation,
    Reminder,
}

impl Template {
    pub const ALL: [Self; 5] = [
        Self::Plain,
        Self::Welcome,
        Self::PasswordReset,
        Self::Invitation,
        Self::Reminder,
    ];

    #[must_use]
    pub const fn selector(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Welcome => "welcome",
            Self::PasswordReset => "password-reset",
            Self::Invitation => "invitation",
            Self::Reminder => "reminder",
        }
    }

    /// Resolve a stored selector, falling back to [`Template::Plain`]
    #[must_use]
    pub fn resolve(selector: Option<&str>) -> Self {
        let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };

        Self::ALL
            .into_iter()
            .find(|template| template.selector().eq_ignore_ascii_case(selector))
            .unwrap_or_else(|| {
                internal!(
                    level = DEBUG,
                    "Unknown template {selector:?}, using the plain template"
                );
                Self::default()
            })
    }

    const fn heading(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::Welcome => Some("Welcome aboard"),
            Self::PasswordReset => Some("Reset your password"),
            Self::Invitation => Some("You have been invited"),
            Self::Reminder => Some("Reminder"),
        }
    }

    const fn action_label(self) -> Option<&'static str> {
        match self {
            Self::PasswordReset => Some("Reset password"),
            Self::Invitation => Some("Accept invitation"),
            Self::Welcome => Some("Get started"),
            Self::Plain | Self::Reminder => None,
        }
    }
}

/// Content ready to hand to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Turns a record into message content
pub trait Renderer: Send + Sync + Debug {
    fn render(&self, template: Template, record: &DeliveryRecord) -> RenderedMessage;
}

/// Built-in renderer
///
/// Replaces `{{name}}` placeholders in the subject and body with the record's
/// variables, plus `recipient_name`, `recipient` and `sender_name`, then wraps
/// the body in the template's layout. Unknown placeholders are left as-is.
/// If the variables carry an `action_url`, templates with a call to action
/// render it as a link.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRenderer;

impl Renderer for DefaultRenderer {
    fn render(&self, template: Template, record: &DeliveryRecord) -> RenderedMessage {
        let mut variables = record.variables.clone();
        variables
            .entry("recipient_name".to_string())
            .or_insert_with(|| record.recipient.display_name().to_string());
        variables
            .entry("recipient".to_string())
            .or_insert_with(|| record.recipient.address.clone());
        variables
            .entry("sender_name".to_string())
            .or_insert_with(|| record.sender.display_name().to_string());

        let subject = substitute(&record.subject, &variables);
        let body = substitute(&record.body, &variables);
        let action = template
            .action_label()
            .zip(variables.get("action_url"));

        let mut text = String::new();
        let mut html = String::new();

        if let Some(heading) = template.heading() {
            text.push_str(heading);
            text.push_str("\n\n");
            html.push_str(&format!("<h1>{}</h1>\n", escape_html(heading)));
        }

        text.push_str(&body);
        for paragraph in body.split("\n\n") {
            html.push_str(&format!(
                "<p>{}</p>\n",
                escape_html(paragraph).replace('\n', "<br>")
            ));
        }

        if let Some((label, url)) = action {
            text.push_str(&format!("\n\n{label}: {url}"));
            html.push_str(&format!(
                "<p><a href=\"{}\">{}</a></p>\n",
                escape_html(url),
                escape_html(label)
            ));
        }

        RenderedMessage {
            subject,
            text,
            html,
        }
    }
}

fn substitute(input: &str, variables: &BTreeMap<String, String>) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = after[..end].trim();
        match variables.get(key) {
            Some(value) => output.push_str(value),
            None => output.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    output.push_str(rest);
    output
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
