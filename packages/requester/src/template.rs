//! Minimal template interpreter used for URL tokens.
//!
//! Three delimiter kinds are recognised, each configured as a regular
//! expression with a single capture group:
//!
//! - interpolate (`{name}` by default) substitutes a data value,
//! - escape (`<%- name %>`) substitutes an HTML-escaped data value,
//! - evaluate (`<% expr %>`) hands the expression to an [`Evaluator`]; it is
//!   only active when an evaluator is supplied.
//!
//! The delimiters are combined by alternation and the input is scanned left to
//! right. Literal text is copied unchanged. Expressions are data lookups,
//! optionally dotted (`owner.id`); missing and null values render as empty
//! strings.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::config::TemplateSettings;
use crate::error::Error;

/// Hook rendering an evaluate block from its expression and the data.
pub type Evaluator = Arc<dyn Fn(&str, &Map<String, Value>) -> String + Send + Sync>;

lazy_static! {
    static ref DEFAULT_TEMPLATE: Template = Template::compile(&TemplateSettings::default()).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Escape,
    Interpolate,
    Evaluate,
}

/// A compiled set of delimiters.
#[derive(Clone)]
pub struct Template {
    matcher: Option<Regex>,
    slots: Vec<Slot>,
    interpolate: Option<Regex>,
    evaluator: Option<Evaluator>,
    source: String,
}

fn compile_error(message: String, source: &str) -> Error {
    Error::TemplateCompile {
        message,
        source_text: source.to_string(),
    }
}

impl Template {
    pub fn compile(settings: &TemplateSettings) -> Result<Self, Error> {
        Self::build(settings, None)
    }

    /// Compile with evaluate blocks enabled.
    pub fn with_evaluator(settings: &TemplateSettings, evaluator: Evaluator) -> Result<Self, Error> {
        Self::build(settings, Some(evaluator))
    }

    fn build(settings: &TemplateSettings, evaluator: Option<Evaluator>) -> Result<Self, Error> {
        let evaluate = if evaluator.is_some() {
            settings.evaluate.as_deref()
        } else {
            None
        };

        // Order matters: `<%-` must win over `<%`.
        let candidates = [
            (Slot::Escape, settings.escape.as_deref()),
            (Slot::Interpolate, settings.interpolate.as_deref()),
            (Slot::Evaluate, evaluate),
        ];

        let enabled: Vec<(Slot, &str)> = candidates
            .iter()
            .filter_map(|(slot, pattern)| pattern.map(|p| (*slot, p)))
            .collect();

        let source = enabled
            .iter()
            .map(|(_, pattern)| format!("(?:{})", pattern))
            .collect::<Vec<_>>()
            .join("|");

        let mut interpolate = None;
        for (slot, pattern) in &enabled {
            let regex = Regex::new(pattern).map_err(|e| compile_error(e.to_string(), &source))?;
            if regex.captures_len() != 2 {
                return Err(compile_error(
                    format!(
                        "{:?} pattern {:?} must contain exactly one capture group",
                        slot, pattern
                    ),
                    &source,
                ));
            }
            if *slot == Slot::Interpolate {
                interpolate = Some(regex);
            }
        }

        let matcher = if enabled.is_empty() {
            None
        } else {
            Some(Regex::new(&source).map_err(|e| compile_error(e.to_string(), &source))?)
        };

        Ok(Self {
            matcher,
            slots: enabled.into_iter().map(|(slot, _)| slot).collect(),
            interpolate,
            evaluator,
            source,
        })
    }

    /// The combined pattern the matcher was built from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `text` contains at least one interpolation placeholder.
    pub fn has_placeholders(&self, text: &str) -> bool {
        self.interpolate
            .as_ref()
            .is_some_and(|regex| regex.is_match(text))
    }

    /// Names of every interpolation placeholder in `text`, in order.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        match &self.interpolate {
            Some(regex) => regex
                .captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn render(&self, text: &str, data: &Map<String, Value>) -> String {
        let Some(matcher) = &self.matcher else {
            return text.to_string();
        };

        let mut output = String::with_capacity(text.len());
        let mut index = 0;

        for caps in matcher.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            output.push_str(&text[index..whole.start()]);
            index = whole.end();

            let matched = self
                .slots
                .iter()
                .enumerate()
                .find_map(|(i, slot)| caps.get(i + 1).map(|expr| (*slot, expr.as_str())));

            match matched {
                Some((Slot::Interpolate, expr)) => output.push_str(&display(lookup(data, expr))),
                Some((Slot::Escape, expr)) => {
                    output.push_str(&escape_html(&display(lookup(data, expr))))
                }
                Some((Slot::Evaluate, expr)) => {
                    if let Some(evaluator) = &self.evaluator {
                        output.push_str(&evaluator(expr, data));
                    }
                }
                None => {}
            }
        }

        output.push_str(&text[index..]);
        output
    }
}

impl Default for Template {
    fn default() -> Self {
        DEFAULT_TEMPLATE.clone()
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("source", &self.source)
            .field("evaluate", &self.evaluator.is_some())
            .finish()
    }
}

/// Render `text` with the default delimiters.
pub fn render(text: &str, data: &Map<String, Value>) -> String {
    DEFAULT_TEMPLATE.render(text, data)
}

fn lookup<'a>(data: &'a Map<String, Value>, expr: &str) -> Option<&'a Value> {
    let expr = expr.trim();
    if let Some(value) = data.get(expr) {
        return Some(value);
    }

    let mut parts = expr.split('.');
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '`' => escaped.push_str("&#x60;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test data must be an object"),
        }
    }

    #[test]
    fn interpolates_values() {
        let rendered = render(
            "http://example.com/leagues/{id}",
            &data(json!({"id": 98765})),
        );
        assert_eq!(rendered, "http://example.com/leagues/98765");
    }

    #[test]
    fn missing_and_null_values_render_empty() {
        let rendered = render("/a/{missing}/b/{nothing}", &data(json!({"nothing": null})));
        assert_eq!(rendered, "/a//b/");
    }

    #[test]
    fn strings_are_copied_raw() {
        let rendered = render("/search/{q}", &data(json!({"q": "one%20two"})));
        assert_eq!(rendered, "/search/one%20two");
    }

    #[test]
    fn dotted_expressions_walk_objects_and_arrays() {
        let values = data(json!({"owner": {"id": 45678, "teams": ["a", "b"]}}));
        assert_eq!(render("{owner.id}/{owner.teams.1}", &values), "45678/b");
    }

    #[test]
    fn custom_interpolate_delimiter() {
        let settings = TemplateSettings {
            interpolate: Some(r":([A-Za-z_]+)".to_string()),
            ..TemplateSettings::default()
        };
        let template = Template::compile(&settings).unwrap();

        let rendered = template.render(
            "http://example.com/leagues/:id/teams",
            &data(json!({"id": 12345})),
        );
        assert_eq!(rendered, "http://example.com/leagues/12345/teams");
        assert_eq!(template.tokens("/leagues/:id/:team"), vec!["id", "team"]);
    }

    #[test]
    fn mustache_style_delimiter() {
        let settings = TemplateSettings {
            interpolate: Some(r"\{\{([\s\S]+?)\}\}".to_string()),
            ..TemplateSettings::default()
        };
        let template = Template::compile(&settings).unwrap();
        let rendered = template.render("/users/{{ name }}", &data(json!({"name": "ann"})));
        assert_eq!(rendered, "/users/ann");
    }

    #[test]
    fn escape_delimiter_html_escapes() {
        let rendered = render("<p><%- label %></p>", &data(json!({"label": "<b>\"R&D\"</b>"})));
        assert_eq!(rendered, "<p>&lt;b&gt;&quot;R&amp;D&quot;&lt;/b&gt;</p>");
    }

    #[test]
    fn evaluate_blocks_are_inert_without_an_evaluator() {
        let rendered = render("/a/<% id %>/{id}", &data(json!({"id": 1})));
        assert_eq!(rendered, "/a/<% id %>/1");
    }

    #[test]
    fn evaluate_blocks_use_the_evaluator() {
        let evaluator: Evaluator = Arc::new(|expr, data| {
            display(lookup(data, expr)).to_uppercase()
        });
        let template =
            Template::with_evaluator(&TemplateSettings::default(), evaluator).unwrap();

        let rendered = template.render("/<% name %>/<%- name %>", &data(json!({"name": "x&y"})));
        assert_eq!(rendered, "/X&Y/x&amp;y");
    }

    #[test]
    fn tokens_lists_placeholders() {
        let template = Template::default();
        assert!(template.has_placeholders("/league/{ id }/matchup"));
        assert!(!template.has_placeholders("/league/plain"));
        assert_eq!(
            template.tokens("/league/{leagueId}/matchup/{ id }/stats"),
            vec!["leagueId", "id"]
        );
    }

    #[test]
    fn invalid_pattern_reports_source() {
        let settings = TemplateSettings {
            interpolate: Some(r"\{(unclosed".to_string()),
            ..TemplateSettings::default()
        };

        match Template::compile(&settings) {
            Err(Error::TemplateCompile { source_text, .. }) => {
                assert!(source_text.contains(r"\{(unclosed"));
            }
            other => panic!("expected compile error, got {:?}", other),
        }
    }

    #[test]
    fn pattern_without_capture_group_is_rejected() {
        let settings = TemplateSettings {
            interpolate: Some(r"\{[a-z]+\}".to_string()),
            ..TemplateSettings::default()
        };
        assert!(matches!(
            Template::compile(&settings),
            Err(Error::TemplateCompile { .. })
        ));
    }

    #[test]
    fn text_without_delimiters_is_unchanged() {
        let settings = TemplateSettings {
            evaluate: None,
            interpolate: None,
            escape: None,
        };
        let template = Template::compile(&settings).unwrap();
        assert_eq!(template.render("/a/{id}", &Map::new()), "/a/{id}");
        assert!(template.tokens("/a/{id}").is_empty());
    }
}
