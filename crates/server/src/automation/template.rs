//! Template variable substitution for administrator-authored emails.
//!
//! Rule and campaign bodies are stored in the database with `{{key}}`
//! placeholders, so rendering has to happen at runtime. The engine is a
//! single left-to-right pass: placeholders with no matching variable are
//! replaced with the empty string rather than left verbatim, so raw
//! placeholder syntax never reaches a member's inbox, and substituted
//! values are never re-expanded.

use crate::config::AppConfig;
use crate::entity::user;
use serde::Deserialize;
use std::collections::HashMap;
use utoipa::ToSchema;

/// Optional per-trigger context passed through from the caller.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerContext {
    pub program_name: Option<String>,
    pub week_number: Option<String>,
}

/// Replace every `{{key}}` in `template` with `vars[key]`, or with the
/// empty string when the key is unknown. Pure and deterministic.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let key = after_open[..close].trim();
                if let Some(value) = vars.get(key) {
                    out.push_str(value);
                }
                rest = &after_open[close + 2..];
            }
            None => {
                // Unterminated placeholder, keep the tail as-is.
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Build the per-recipient variable map.
///
/// The tracking pixel is only present when a campaign id + recipient id
/// pair is supplied; trigger emails carry no pixel.
pub fn build_variables(
    user: &user::Model,
    context: &TriggerContext,
    config: &AppConfig,
    tracking: Option<(i32, i32)>,
) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("firstName".to_string(), user.first_name.clone());
    vars.insert("fullName".to_string(), user.full_name());
    vars.insert(
        "programName".to_string(),
        context
            .program_name
            .clone()
            .unwrap_or_else(|| config.default_program_name.clone()),
    );
    vars.insert(
        "weekNumber".to_string(),
        context.week_number.clone().unwrap_or_else(|| "1".to_string()),
    );
    vars.insert(
        "dashboardUrl".to_string(),
        format!("{}/dashboard", config.dashboard_url),
    );
    if let Some((campaign_id, recipient_id)) = tracking {
        vars.insert(
            "trackingPixel".to_string(),
            format!(
                r#"<img src="{}/api/track/open/{campaign_id}/{recipient_id}" width="1" height="1" alt="" />"#,
                config.dashboard_url
            ),
        );
    }
    vars
}

/// Derive the plain-text alternative body from rendered HTML: tags
/// stripped, the common entities decoded, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let mut stripped = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                // Tag boundaries act as separators so "<p>a</p><p>b</p>"
                // does not collapse into "ab".
                stripped.push(' ');
            }
            '>' => in_tag = false,
            c if !in_tag => stripped.push(c),
            _ => {}
        }
    }

    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
