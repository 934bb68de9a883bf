use crate::types::{AppError, Message, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A text template with `{name}` placeholders.
///
/// `{{` and `}}` render as literal braces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromptTemplate {
    template: String,
    #[serde(skip)]
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let segments = parse(&template)?;
        Ok(Self { template, segments })
    }

    /// The raw template text.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Placeholder names in order of first appearance.
    pub fn input_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Substitute every placeholder. Unused entries in `values` are ignored.
    pub fn format(&self, values: &HashMap<String, String>) -> Result<String> {
        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(name) => {
                    let value = values.get(name).ok_or_else(|| {
                        AppError::InvalidInput(format!("Missing template variable: {}", name))
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Format a template that has exactly one placeholder.
    pub fn format_single(&self, value: &str) -> Result<String> {
        let variables = self.input_variables();
        match variables.as_slice() {
            [name] => {
                let values = HashMap::from([(name.clone(), value.to_string())]);
                self.format(&values)
            }
            _ => Err(AppError::InvalidInput(format!(
                "Template expects {} variables, got a single value",
                variables.len()
            ))),
        }
    }
}

impl TryFrom<String> for PromptTemplate {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PromptTemplate> for String {
    fn from(value: PromptTemplate) -> Self {
        value.template
    }
}

impl std::fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.template)
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    name.push(next);
                }
                if !closed {
                    return Err(AppError::InvalidInput(format!(
                        "Unterminated placeholder in template: {{{}",
                        name
                    )));
                }
                let name = name.trim();
                if !is_valid_name(name) {
                    return Err(AppError::InvalidInput(format!(
                        "Invalid template variable name: {:?}",
                        name
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(name.to_string()));
            }
            '}' => {
                return Err(AppError::InvalidInput(
                    "Single '}' in template; use '}}' for a literal brace".to_string(),
                ));
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// A system/user template pair rendered into chat messages.
#[derive(Debug, Clone)]
pub struct ChatPromptTemplate {
    pub system: Option<PromptTemplate>,
    pub user: PromptTemplate,
}

impl ChatPromptTemplate {
    pub fn new(user: PromptTemplate) -> Self {
        Self { system: None, user }
    }

    pub fn with_system(mut self, system: PromptTemplate) -> Self {
        self.system = Some(system);
        self
    }

    /// Variables of both templates, system first, deduplicated.
    pub fn input_variables(&self) -> Vec<String> {
        let mut names = self
            .system
            .as_ref()
            .map(|s| s.input_variables())
            .unwrap_or_default();
        for name in self.user.input_variables() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn format_messages(&self, values: &HashMap<String, String>) -> Result<Vec<Message>> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.format(values)?));
        }
        messages.push(Message::user(self.user.format(values)?));
        Ok(messages)
    }
}
