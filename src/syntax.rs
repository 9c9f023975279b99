//! Command syntax templates: tokenizer, parser and serializer
//!
//! Template grammar:
//!
//! ```text
//! template := item*
//! item     := keyword | "<" name ">" | "<" name "...>" | "[" item+ "]"
//! ```
//!
//! `<name...>` takes the rest of the line and must come last. Optional
//! groups nest. Each template expands to a list of flat alternatives, the
//! variants with an optional group present coming first.
//!
//! A [`SyntaxCodec`] binds templates to a command's parameters and their
//! resolved domains, converting between command text and structured field
//! mappings.

use crate::error::SpecDefect;
use crate::resolve::{check_token, EffectiveDomain};
use crate::spec::{Command, ParamType, ParamValue, Parameter, SyntaxForm, Variant};
use indexmap::{IndexMap, IndexSet};

/// Template element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Keyword(String),
    Param { name: String, rest: bool },
    Optional(Vec<Token>),
}

/// Element of an expanded alternative
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Keyword(String),
    Param { name: String, rest: bool },
}

impl Atom {
    fn param_name(&self) -> Option<&str> {
        match self {
            Atom::Param { name, .. } => Some(name),
            Atom::Keyword(_) => None,
        }
    }
}

/// A parsed syntax template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub source: String,
    pub tokens: Vec<Token>,
    alternatives: Vec<Vec<Atom>>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, SpecDefect> {
        let invalid = |reason: &str| SpecDefect::InvalidTemplate {
            template: source.to_string(),
            reason: reason.to_string(),
        };

        let chars: Vec<char> = source.chars().collect();
        let mut pos = 0;
        let tokens = parse_items(&chars, &mut pos, 0).map_err(|r| invalid(&r))?;
        if tokens.is_empty() {
            return Err(invalid("template is empty"));
        }

        let alternatives = expand(&tokens);
        for alt in &alternatives {
            let rest_at = alt
                .iter()
                .position(|a| matches!(a, Atom::Param { rest: true, .. }));
            if rest_at.is_some_and(|i| i + 1 != alt.len()) {
                return Err(invalid("a <name...> placeholder must come last"));
            }
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
            alternatives,
        })
    }

    /// Flat alternatives, fullest first
    pub fn alternatives(&self) -> &[Vec<Atom>] {
        &self.alternatives
    }

    /// Every parameter named anywhere in the template
    pub fn parameters(&self) -> IndexSet<String> {
        let mut names = IndexSet::new();
        collect_params(&self.tokens, &mut names);
        names
    }
}

fn collect_params(tokens: &[Token], names: &mut IndexSet<String>) {
    for token in tokens {
        match token {
            Token::Param { name, .. } => {
                names.insert(name.clone());
            }
            Token::Optional(inner) => collect_params(inner, names),
            Token::Keyword(_) => {}
        }
    }
}

fn parse_items(chars: &[char], pos: &mut usize, depth: usize) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    while *pos < chars.len() {
        let c = chars[*pos];
        if c.is_whitespace() {
            *pos += 1;
        } else if c == '[' {
            *pos += 1;
            let inner = parse_items(chars, pos, depth + 1)?;
            if inner.is_empty() {
                return Err("empty optional group".into());
            }
            tokens.push(Token::Optional(inner));
        } else if c == ']' {
            if depth == 0 {
                return Err("unbalanced ']'".into());
            }
            *pos += 1;
            return Ok(tokens);
        } else if c == '<' {
            let start = *pos + 1;
            let end = chars[start..]
                .iter()
                .position(|c| *c == '>')
                .map(|i| start + i)
                .ok_or_else(|| "unclosed '<'".to_string())?;
            let raw: String = chars[start..end].iter().collect();
            let (name, rest) = match raw.strip_suffix("...") {
                Some(n) => (n.trim().to_string(), true),
                None => (raw.trim().to_string(), false),
            };
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(format!("bad placeholder '<{}>'", raw));
            }
            tokens.push(Token::Param { name, rest });
            *pos = end + 1;
        } else {
            let start = *pos;
            while *pos < chars.len() && !chars[*pos].is_whitespace() && !"[]<>".contains(chars[*pos])
            {
                *pos += 1;
            }
            if *pos == start {
                return Err(format!("unexpected '{}'", c));
            }
            tokens.push(Token::Keyword(chars[start..*pos].iter().collect()));
        }
    }
    if depth > 0 {
        return Err("unclosed '['".into());
    }
    Ok(tokens)
}

fn expand(tokens: &[Token]) -> Vec<Vec<Atom>> {
    let mut alts: Vec<Vec<Atom>> = vec![Vec::new()];
    for token in tokens {
        let options: Vec<Vec<Atom>> = match token {
            Token::Keyword(k) => vec![vec![Atom::Keyword(k.clone())]],
            Token::Param { name, rest } => vec![vec![Atom::Param {
                name: name.clone(),
                rest: *rest,
            }]],
            Token::Optional(inner) => {
                let mut with = expand(inner);
                with.push(Vec::new());
                with
            }
        };
        let mut next = Vec::with_capacity(alts.len() * options.len());
        for alt in &alts {
            for opt in &options {
                let mut combined = alt.clone();
                combined.extend(opt.iter().cloned());
                next.push(combined);
            }
        }
        alts = next;
    }
    alts
}

/// Compile every set and delete template of a command
pub fn compile_templates(command: &Command) -> Result<Vec<(SyntaxForm, Template)>, Vec<SpecDefect>> {
    let mut templates = Vec::new();
    let mut defects = Vec::new();
    for form in [SyntaxForm::Set, SyntaxForm::Delete] {
        for source in command.forms(form) {
            match Template::parse(source) {
                Ok(t) => {
                    for name in t.parameters() {
                        if !command.parameters.contains_key(&name) {
                            defects.push(SpecDefect::UnknownParameter {
                                parameter: name,
                                context: format!("syntax template '{}'", source),
                            });
                        }
                    }
                    templates.push((form, t));
                }
                Err(d) => defects.push(d),
            }
        }
    }
    if defects.is_empty() {
        Ok(templates)
    } else {
        Err(defects)
    }
}

/// Structured values produced by parsing one line
pub type Fields = IndexMap<String, ParamValue>;

/// Text <-> structured conversion for one command on one model
pub struct SyntaxCodec<'a> {
    command: &'a Command,
    templates: &'a [(SyntaxForm, Template)],
    domains: &'a IndexMap<String, EffectiveDomain>,
}

impl<'a> SyntaxCodec<'a> {
    /// `domains` holds the resolved domain of every parameter offered on the
    /// target model; parameters without one accept any token.
    pub fn new(
        command: &'a Command,
        templates: &'a [(SyntaxForm, Template)],
        domains: &'a IndexMap<String, EffectiveDomain>,
    ) -> Self {
        Self {
            command,
            templates,
            domains,
        }
    }

    /// Parse one command line into structured fields
    pub fn parse(&self, form: SyntaxForm, line: &str) -> Result<Fields, String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return Err("empty line".into());
        }

        for (_, template) in self.templates.iter().filter(|(f, _)| *f == form) {
            for alt in template.alternatives() {
                let mut bound = IndexMap::new();
                if self.bind(alt, 0, &words, 0, &mut bound) {
                    return Ok(self.to_fields(&bound, &template.parameters()));
                }
            }
        }
        Err(format!("no {} template matches '{}'", form_label(form), line))
    }

    fn bind(
        &self,
        alt: &[Atom],
        a: usize,
        words: &[&str],
        w: usize,
        bound: &mut IndexMap<String, String>,
    ) -> bool {
        let Some(atom) = alt.get(a) else {
            return w == words.len();
        };
        match atom {
            Atom::Keyword(kw) => {
                w < words.len()
                    && self.command.canonical_keyword(words[w]) == self.command.canonical_keyword(kw)
                    && self.bind(alt, a + 1, words, w + 1, bound)
            }
            Atom::Param { name, rest: true } => {
                if w >= words.len() {
                    return false;
                }
                let raw = words[w..].join(" ");
                if !self.accepts(name, &raw) {
                    return false;
                }
                bound.insert(name.clone(), raw);
                true
            }
            Atom::Param { name, rest: false } => {
                for width in self.widths(name, words, w) {
                    let raw = words[w..w + width].join(" ");
                    if !self.accepts(name, &raw) {
                        continue;
                    }
                    bound.insert(name.clone(), raw);
                    if self.bind(alt, a + 1, words, w + width, bound) {
                        return true;
                    }
                    bound.shift_remove(name);
                }
                false
            }
        }
    }

    /// Word counts a parameter may consume at `w`, widest first
    fn widths(&self, name: &str, words: &[&str], w: usize) -> Vec<usize> {
        if w >= words.len() {
            return Vec::new();
        }
        let mut widths = Vec::new();
        if let Some(param) = self.command.parameters.get(name) {
            let keyword_pair = param.variants.iter().any(|v| {
                v.takes_value() && v.keyword.as_deref() == Some(words[w]) && w + 1 < words.len()
            });
            if keyword_pair {
                widths.push(2);
            }
        }
        widths.push(1);
        widths
    }

    fn accepts(&self, name: &str, raw: &str) -> bool {
        match self.domains.get(name) {
            Some(domain) => domain.check(&typed_value(self.param_type(name), raw)).is_ok(),
            None => !raw.is_empty(),
        }
    }

    fn param_type(&self, name: &str) -> ParamType {
        self.command
            .parameters
            .get(name)
            .map(|p| p.typ)
            .unwrap_or_default()
    }

    /// Map bound tokens onto structured fields
    fn to_fields(&self, bound: &IndexMap<String, String>, in_template: &IndexSet<String>) -> Fields {
        let mut fields = Fields::new();
        let mut overrides: IndexMap<&str, &str> = IndexMap::new();

        for (name, param) in &self.command.parameters {
            if let Some(raw) = bound.get(name) {
                if let Some((variant, _)) = select_variant(param, raw) {
                    for (other, field) in &variant.terraform_fields {
                        overrides.insert(other.as_str(), field.as_str());
                    }
                }
            }
        }

        for (name, param) in &self.command.parameters {
            let field = overrides
                .get(name.as_str())
                .copied()
                .unwrap_or_else(|| param.field_name(name))
                .to_string();

            let Some(raw) = bound.get(name) else {
                if in_template.contains(name) {
                    if let Some(default) = &param.default {
                        fields.insert(field, structured_value(param, &default.to_string()));
                    }
                }
                continue;
            };

            match select_variant(param, raw) {
                Some((variant, inner)) => {
                    let own = variant.terraform_field.clone().unwrap_or(field);
                    if variant.terraform_value.is_empty() || variant.takes_value() {
                        fields.insert(own, typed_value(variant.typ, &inner));
                    }
                    for (k, v) in &variant.terraform_value {
                        fields.insert(k.clone(), v.clone());
                    }
                }
                None => {
                    fields.insert(field, structured_value(param, raw));
                }
            }
        }
        fields
    }

    /// Render structured fields as one command line
    ///
    /// Picks the renderable alternative with the fewest placeholders (then
    /// the fewest words), so parameters at their default are elided where
    /// the syntax allows.
    pub fn serialize(&self, form: SyntaxForm, fields: &Fields) -> Result<String, String> {
        let tokens = self.from_fields(fields);

        for (_, template) in self.templates.iter().filter(|(f, _)| *f == form) {
            let in_template = template.parameters();
            let mut alts: Vec<&Vec<Atom>> = template.alternatives().iter().collect();
            alts.sort_by_key(|alt| (alt.iter().filter(|a| a.param_name().is_some()).count(), alt.len()));

            for alt in alts {
                let present: IndexSet<&str> = alt.iter().filter_map(Atom::param_name).collect();
                let complete = present.iter().all(|p| tokens.contains_key(*p));
                let lossless = in_template
                    .iter()
                    .filter(|p| !present.contains(p.as_str()))
                    .all(|p| match tokens.get(p.as_str()) {
                        None => true,
                        Some(raw) => self.is_default(p, raw),
                    });
                if !complete || !lossless {
                    continue;
                }

                let words: Vec<String> = alt
                    .iter()
                    .map(|atom| match atom {
                        Atom::Keyword(k) => k.clone(),
                        Atom::Param { name, .. } => tokens.get(name).cloned().unwrap_or_default(),
                    })
                    .collect();
                return Ok(words.join(" "));
            }
        }
        Err(format!(
            "no {} template can render the given fields",
            form_label(form)
        ))
    }

    fn is_default(&self, name: &str, raw: &str) -> bool {
        self.command
            .parameters
            .get(name)
            .and_then(|p| p.default.as_ref())
            .is_some_and(|d| d.to_string() == raw)
    }

    /// Recover command tokens from structured fields
    fn from_fields(&self, fields: &Fields) -> IndexMap<String, String> {
        let mut tokens = IndexMap::new();
        let mut overrides: IndexMap<&str, &str> = IndexMap::new();

        for (name, param) in &self.command.parameters {
            if param.has_variants() {
                if let Some((variant, raw)) = variant_from_fields(name, param, fields) {
                    for (other, field) in &variant.terraform_fields {
                        overrides.insert(other.as_str(), field.as_str());
                    }
                    tokens.insert(name.clone(), raw);
                }
            }
        }

        for (name, param) in &self.command.parameters {
            if param.has_variants() {
                continue;
            }
            let field = overrides
                .get(name.as_str())
                .copied()
                .unwrap_or_else(|| param.field_name(name));
            let Some(value) = fields.get(field) else {
                continue;
            };
            let raw = param
                .enum_values
                .iter()
                .find(|e| e.terraform_value.as_ref().is_some_and(|t| t.same_as(value)))
                .map(|e| e.value.clone())
                .unwrap_or_else(|| command_token(param.typ, value));
            tokens.insert(name.clone(), raw);
        }
        tokens
    }
}

fn form_label(form: SyntaxForm) -> &'static str {
    match form {
        SyntaxForm::Set => "set",
        SyntaxForm::Delete => "delete",
    }
}

/// The variant a raw token belongs to, with the token's value part
fn select_variant<'p>(param: &'p Parameter, raw: &str) -> Option<(&'p Variant, String)> {
    for v in &param.variants {
        if let Some(fixed) = &v.value {
            if raw == fixed {
                return Some((v, raw.to_string()));
            }
            continue;
        }
        let inner = match &v.keyword {
            Some(kw) => match raw.strip_prefix(kw.as_str()) {
                Some(rest) if rest.starts_with(' ') => rest.trim_start(),
                _ => continue,
            },
            None => raw,
        };
        if check_token(v.typ, inner, v.pattern.as_deref(), v.range).is_ok() {
            return Some((v, inner.to_string()));
        }
    }
    None
}

/// Command token of a variant parameter recovered from structured fields
pub(crate) fn variant_token(name: &str, param: &Parameter, fields: &Fields) -> Option<String> {
    variant_from_fields(name, param, fields).map(|(_, raw)| raw)
}

/// The variant described by structured fields, with its command token
fn variant_from_fields<'p>(
    name: &str,
    param: &'p Parameter,
    fields: &Fields,
) -> Option<(&'p Variant, String)> {
    for v in &param.variants {
        let field = v
            .terraform_field
            .as_deref()
            .unwrap_or_else(|| param.field_name(name));
        let constants_match = v
            .terraform_value
            .iter()
            .all(|(k, expected)| fields.get(k).is_some_and(|actual| actual.same_as(expected)));
        if !constants_match {
            continue;
        }

        if let Some(fixed) = &v.value {
            let matches = if v.terraform_value.is_empty() {
                fields.get(field).is_some_and(|f| f.to_string() == *fixed)
            } else {
                true
            };
            if matches {
                return Some((v, fixed.clone()));
            }
            continue;
        }

        let Some(value) = fields.get(field) else {
            continue;
        };
        let inner = command_token(v.typ, value);
        if !v.terraform_value.is_empty()
            || check_token(v.typ, &inner, v.pattern.as_deref(), v.range).is_ok()
        {
            let raw = match &v.keyword {
                Some(kw) => format!("{} {}", kw, inner),
                None => inner,
            };
            return Some((v, raw));
        }
    }
    None
}

/// Structured value for a raw token of `param`
fn structured_value(param: &Parameter, raw: &str) -> ParamValue {
    if let Some(t) = param.enum_value(raw).and_then(|e| e.terraform_value.clone()) {
        return t;
    }
    typed_value(param.typ, raw)
}

/// Raw token as a typed value
pub fn typed_value(typ: ParamType, raw: &str) -> ParamValue {
    match typ {
        ParamType::Int => raw
            .parse()
            .map(ParamValue::Int)
            .unwrap_or_else(|_| ParamValue::Text(raw.to_string())),
        ParamType::Bool => match raw {
            "on" | "true" => ParamValue::Bool(true),
            "off" | "false" => ParamValue::Bool(false),
            _ => ParamValue::Text(raw.to_string()),
        },
        _ => ParamValue::Text(raw.to_string()),
    }
}

/// Command-line token for a structured value
fn command_token(typ: ParamType, value: &ParamValue) -> String {
    match (typ, value) {
        (ParamType::Bool, ParamValue::Bool(true)) => "on".into(),
        (ParamType::Bool, ParamValue::Bool(false)) => "off".into(),
        _ => value.to_string(),
    }
}
