//! A small `{{ .Field }}` template renderer.
//!
//! Supported actions: field lookups (`.A.B`, `.Segments.Git.Branch`), string
//! literals, `if` / `else` / `end` with `not`, `eq` and `ne` conditions, and
//! `{{-` / `-}}` whitespace trimming.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template: unterminated action starting at byte {0}")]
    Unterminated(usize),

    #[error("template: unexpected {{{{ {0} }}}} without matching if")]
    Unbalanced(String),

    #[error("template: if without end")]
    UnclosedIf,

    #[error("template: unsupported action {{{{ {0} }}}}")]
    Invalid(String),
}

/// Records of executed segments, shared between segment tasks so templates can
/// reference each other through `.Segments.<Name>`.
#[derive(Debug, Clone, Default)]
pub struct SegmentData(Arc<DashMap<String, Value>>);

impl SegmentData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, record: Value) {
        self.0.insert(name.to_string(), record);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).map(|entry| entry.value().clone())
    }

    /// Expose the rendered text as `.Text` next to the provider fields.
    pub fn set_text(&self, name: &str, text: &str) {
        if let Some(mut entry) = self.0.get_mut(name) {
            if let Value::Object(map) = entry.value_mut() {
                map.insert("Text".to_string(), Value::String(text.to_string()));
            }
        }
    }

    pub fn remove(&self, name: &str) {
        self.0.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn clear(&self) {
        self.0.clear();
    }
}

/// Everything a template can see while rendering.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub record: &'a Value,
    pub globals: &'a Map<String, Value>,
    pub segments: Option<&'a SegmentData>,
}

impl<'a> Context<'a> {
    pub fn new(record: &'a Value, globals: &'a Map<String, Value>) -> Self {
        Self {
            record,
            globals,
            segments: None,
        }
    }

    pub fn with_segments(mut self, segments: &'a SegmentData) -> Self {
        self.segments = Some(segments);
        self
    }

    fn lookup(&self, path: &[String]) -> Value {
        let Some((first, rest)) = path.split_first() else {
            return self.record.clone();
        };

        if first == "Segments" {
            let Some((name, rest)) = rest.split_first() else {
                return Value::Null;
            };
            let record = self
                .segments
                .and_then(|segments| segments.get(name))
                .unwrap_or(Value::Null);
            return walk(&record, rest);
        }

        if let Some(value) = self.record.get(first) {
            return walk(value, rest);
        }

        match self.globals.get(first) {
            Some(value) => walk(value, rest),
            None => Value::Null,
        }
    }
}

fn walk(value: &Value, path: &[String]) -> Value {
    let mut current = value;
    for key in path {
        match current.get(key) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Field(Vec<String>),
    Literal(Value),
}

impl Operand {
    fn parse(token: &str) -> Result<Self, TemplateError> {
        if let Some(path) = token.strip_prefix('.') {
            if path.is_empty() {
                return Ok(Operand::Field(Vec::new()));
            }
            return Ok(Operand::Field(path.split('.').map(str::to_string).collect()));
        }

        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            return Ok(Operand::Literal(Value::String(token[1..token.len() - 1].to_string())));
        }

        match token {
            "true" => Ok(Operand::Literal(Value::Bool(true))),
            "false" => Ok(Operand::Literal(Value::Bool(false))),
            _ => token
                .parse::<i64>()
                .map(|n| Operand::Literal(Value::from(n)))
                .map_err(|_| TemplateError::Invalid(token.to_string())),
        }
    }

    fn eval(&self, ctx: &Context<'_>) -> Value {
        match self {
            Operand::Field(path) => ctx.lookup(path),
            Operand::Literal(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Truthy(Operand),
    Not(Operand),
    Eq(Operand, Operand),
    Ne(Operand, Operand),
}

impl Condition {
    fn parse(action: &str) -> Result<Self, TemplateError> {
        let tokens = split_arguments(action);
        let invalid = || TemplateError::Invalid(format!("if {}", action));

        match tokens.as_slice() {
            [operand] => Ok(Condition::Truthy(Operand::parse(operand)?)),
            [not, operand] if not == "not" => Ok(Condition::Not(Operand::parse(operand)?)),
            [op, left, right] if op == "eq" => {
                Ok(Condition::Eq(Operand::parse(left)?, Operand::parse(right)?))
            }
            [op, left, right] if op == "ne" => {
                Ok(Condition::Ne(Operand::parse(left)?, Operand::parse(right)?))
            }
            _ => Err(invalid()),
        }
    }

    fn eval(&self, ctx: &Context<'_>) -> bool {
        match self {
            Condition::Truthy(operand) => truthy(&operand.eval(ctx)),
            Condition::Not(operand) => !truthy(&operand.eval(ctx)),
            Condition::Eq(left, right) => loosely_equal(&left.eval(ctx), &right.eval(ctx)),
            Condition::Ne(left, right) => !loosely_equal(&left.eval(ctx), &right.eval(ctx)),
        }
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    left == right || display(left) == display(right)
}

/// Split on whitespace, keeping quoted strings together.
fn split_arguments(action: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in action.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Output(Operand),
    If {
        condition: Condition,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

enum Token {
    Text(String),
    Action(String),
}

fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut offset = 0;
    let mut trim_next = false;

    while let Some(start) = rest.find("{{") {
        let Some(length) = rest[start..].find("}}") else {
            return Err(TemplateError::Unterminated(offset + start));
        };

        let mut text = &rest[..start];
        if trim_next {
            text = text.trim_start();
        }

        let mut action = &rest[start + 2..start + length];
        if let Some(stripped) = action.strip_prefix('-') {
            text = text.trim_end();
            action = stripped;
        }
        trim_next = false;
        if let Some(stripped) = action.strip_suffix('-') {
            trim_next = true;
            action = stripped;
        }

        if !text.is_empty() {
            tokens.push(Token::Text(text.to_string()));
        }
        tokens.push(Token::Action(action.trim().to_string()));

        offset += start + length + 2;
        rest = &rest[start + length + 2..];
    }

    let text = if trim_next { rest.trim_start() } else { rest };
    if !text.is_empty() {
        tokens.push(Token::Text(text.to_string()));
    }

    Ok(tokens)
}

enum Terminator {
    Eof,
    Else,
    End,
}

fn parse_nodes(
    tokens: &mut std::vec::IntoIter<Token>,
) -> Result<(Vec<Node>, Terminator), TemplateError> {
    let mut nodes = Vec::new();

    while let Some(token) = tokens.next() {
        let action = match token {
            Token::Text(text) => {
                nodes.push(Node::Text(text));
                continue;
            }
            Token::Action(action) => action,
        };

        match action.as_str() {
            "end" => return Ok((nodes, Terminator::End)),
            "else" => return Ok((nodes, Terminator::Else)),
            _ => {}
        }

        if let Some(condition) = action.strip_prefix("if ") {
            let condition = Condition::parse(condition.trim())?;
            let (then, terminator) = parse_nodes(tokens)?;
            let otherwise = match terminator {
                Terminator::End => Vec::new(),
                Terminator::Else => match parse_nodes(tokens)? {
                    (otherwise, Terminator::End) => otherwise,
                    _ => return Err(TemplateError::UnclosedIf),
                },
                Terminator::Eof => return Err(TemplateError::UnclosedIf),
            };
            nodes.push(Node::If {
                condition,
                then,
                otherwise,
            });
            continue;
        }

        nodes.push(Node::Output(Operand::parse(&action)?));
    }

    Ok((nodes, Terminator::Eof))
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut tokens = tokenize(source)?.into_iter();

        match parse_nodes(&mut tokens)? {
            (nodes, Terminator::Eof) => Ok(Self { nodes }),
            (_, Terminator::End) => Err(TemplateError::Unbalanced("end".to_string())),
            (_, Terminator::Else) => Err(TemplateError::Unbalanced("else".to_string())),
        }
    }

    pub fn render(&self, ctx: &Context<'_>) -> String {
        let mut out = String::new();
        render_nodes(&self.nodes, ctx, &mut out);
        out
    }
}

fn render_nodes(nodes: &[Node], ctx: &Context<'_>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(operand) => out.push_str(&display(&operand.eval(ctx))),
            Node::If {
                condition,
                then,
                otherwise,
            } => {
                if condition.eval(ctx) {
                    render_nodes(then, ctx, out);
                } else {
                    render_nodes(otherwise, ctx, out);
                }
            }
        }
    }
}

pub fn render(source: &str, ctx: &Context<'_>) -> Result<String, TemplateError> {
    Ok(Template::parse(source)?.render(ctx))
}

/// How a list of templates is combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplatesLogic {
    #[default]
    FirstMatch,
    Join,
}

/// First template that renders to something other than whitespace, or `default`.
pub fn first_match(templates: &[String], ctx: &Context<'_>, default: &str) -> String {
    templates
        .iter()
        .filter_map(|source| render(source, ctx).ok())
        .find(|text| !text.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn resolve_list(templates: &[String], ctx: &Context<'_>, logic: TemplatesLogic) -> String {
    match logic {
        TemplatesLogic::FirstMatch => first_match(templates, ctx, ""),
        TemplatesLogic::Join => templates
            .iter()
            .filter_map(|source| render(source, ctx).ok())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn globals() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Shell".to_string(), json!("zsh"));
        map
    }

    #[test]
    fn test_fields_and_literals() {
        let record = json!({"Branch": "main", "Ahead": 2, "Upstream": {"Name": "origin"}});
        let globals = globals();
        let ctx = Context::new(&record, &globals);

        assert_eq!(render("{{ .Branch }} +{{ .Ahead }}", &ctx).unwrap(), "main +2");
        assert_eq!(render("{{ .Upstream.Name }}", &ctx).unwrap(), "origin");
        assert_eq!(render("{{ .Shell }}/{{ .Missing }}", &ctx).unwrap(), "zsh/");
        assert_eq!(render(r#"{{ "x" }}"#, &ctx).unwrap(), "x");
    }

    #[test]
    fn test_conditionals() {
        let record = json!({"Dirty": true, "Branch": "dev"});
        let globals = globals();
        let ctx = Context::new(&record, &globals);

        assert_eq!(render("{{ if .Dirty }}*{{ end }}", &ctx).unwrap(), "*");
        assert_eq!(render("{{ if not .Dirty }}clean{{ else }}dirty{{ end }}", &ctx).unwrap(), "dirty");
        assert_eq!(
            render(r#"{{ if eq .Branch "dev" }}{{ if .Dirty }}!{{ end }}d{{ end }}"#, &ctx).unwrap(),
            "!d"
        );
        assert_eq!(render(r#"{{ if ne .Branch "dev" }}x{{ end }}"#, &ctx).unwrap(), "");
    }

    #[test]
    fn test_trim_markers() {
        let record = json!({"A": "a"});
        let globals = Map::new();
        let ctx = Context::new(&record, &globals);
        assert_eq!(render("x  {{- .A -}}  y", &ctx).unwrap(), "xay");
    }

    #[test]
    fn test_segment_references() {
        let segments = SegmentData::new();
        segments.insert("Git", json!({"Branch": "main"}));
        segments.set_text("Git", "main*");

        let record = json!({});
        let globals = Map::new();
        let ctx = Context::new(&record, &globals).with_segments(&segments);

        assert_eq!(
            render("{{ .Segments.Git.Branch }} {{ .Segments.Git.Text }}{{ .Segments.Path.Text }}", &ctx).unwrap(),
            "main main*"
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(Template::parse("{{ .A"), Err(TemplateError::Unterminated(0)));
        assert_eq!(Template::parse("{{ if .A }}x"), Err(TemplateError::UnclosedIf));
        assert_eq!(Template::parse("x{{ end }}"), Err(TemplateError::Unbalanced("end".to_string())));
        assert!(matches!(Template::parse("{{ range .A }}"), Err(TemplateError::Invalid(_))));
    }

    #[test]
    fn test_first_match_and_join() {
        let record = json!({"Code": 1});
        let globals = Map::new();
        let ctx = Context::new(&record, &globals);
        let templates = vec![
            "{{ if eq .Code 0 }}green{{ end }}".to_string(),
            "{{ if .Code }}red{{ end }}".to_string(),
        ];

        assert_eq!(first_match(&templates, &ctx, "blue"), "red");
        assert_eq!(first_match(&templates[..1], &ctx, "blue"), "blue");
        assert_eq!(resolve_list(&templates, &ctx, TemplatesLogic::Join), "red");
    }
}
