//! Route sources and path templates.
//!
//! A route source has the shape `[METHOD ][=|~]/path-template`. The template
//! syntax is the familiar one:
//!
//! - `/users` - literal path
//! - `/users/:id` - named parameter
//! - `/users/:id?` - optional parameter
//! - `/files/:path+`, `/files/:path*` - repeating parameter (one or more, zero or more)
//! - `/posts/:id(\d+)` - parameter with a custom pattern
//! - `/archive/(\d{4})` - positional capture group, keyed `"0"`, `"1"`, ...
//! - `/assets/*` - glob, captured positionally
//! - `\:` escapes a special character

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, RouterError};
use crate::request::Params;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\\.)|([/.])?(?:(?::(\w+)(?:\(((?:\\.|[^\\()])+)\))?|\(((?:\\.|[^\\()])+)\))([+*?])?|(\*))",
    )
    .expect("path token regex is valid")
});

/// Upper bound on optional parameters expanded into example shapes.
const MAX_SHAPE_OPTIONALS: usize = 8;

/// HTTP method selector of a route source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    /// Matches every method, including ones registered later.
    All,
    /// A single upper-cased method token.
    Named(String),
}

impl RouteMethod {
    /// Bucket key used for wildcard routes.
    pub const ALL: &'static str = "ALL";

    /// Parses a method token; empty, `*` and `all` select every method.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if token.is_empty() || token == "*" || token.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Named(token.to_ascii_uppercase())
        }
    }

    /// The bucket key for this method.
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => Self::ALL,
            Self::Named(name) => name,
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the request path a pattern has to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The whole path (up to an optional trailing delimiter).
    Exact,
    /// A leading run of whole path segments.
    Prefix,
}

/// Name of a captured parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamName {
    /// `:name`
    Named(String),
    /// Unnamed group or glob, numbered from zero in template order.
    Index(usize),
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A parameter token of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParam {
    /// Parameter name.
    pub name: ParamName,
    /// Character introducing the parameter (`/`, `.` or empty).
    pub prefix: String,
    /// Character separating repeated values.
    pub delimiter: char,
    /// `?` or `*` modifier.
    pub optional: bool,
    /// `+` or `*` modifier.
    pub repeat: bool,
    /// The parameter shares its segment with following literal text.
    pub partial: bool,
    /// Bare `*` glob.
    pub asterisk: bool,
    /// Regex fragment a single value must match.
    pub pattern: String,
}

/// A lexical token of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathToken {
    /// Literal text.
    Literal(String),
    /// A capturing parameter.
    Param(PathParam),
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    template: String,
    tokens: Vec<PathToken>,
}

impl PathTemplate {
    /// Parses a template after checking its structure.
    ///
    /// ```
    /// use oxide_routes::PathTemplate;
    ///
    /// let template = PathTemplate::parse("/posts/:id/comments/:comment_id?").unwrap();
    /// assert_eq!(template.literal_prefix(), "/posts");
    /// assert_eq!(template.params().count(), 2);
    /// ```
    pub fn parse(template: &str) -> Result<Self> {
        validate_structure(template)?;

        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut index = 0;
        let mut positional = 0;

        for caps in TOKEN_RE.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            literal.push_str(&template[index..whole.start()]);
            index = whole.end();

            if let Some(escaped) = caps.get(1) {
                literal.push_str(&escaped.as_str()[1..]);
                continue;
            }

            let prefix = caps.get(2).map(|m| m.as_str());
            let name = caps.get(3).map(|m| m.as_str());
            let custom = caps.get(4).or_else(|| caps.get(5)).map(|m| m.as_str());
            let modifier = caps.get(6).map(|m| m.as_str());
            let asterisk = caps.get(7).is_some();
            let next = template[index..].chars().next();

            if !literal.is_empty() {
                tokens.push(PathToken::Literal(std::mem::take(&mut literal)));
            }

            let delimiter = prefix.and_then(|p| p.chars().next()).unwrap_or('/');
            let partial = match (prefix, next) {
                (Some(_), Some(next)) => next != delimiter,
                _ => false,
            };
            let pattern = match custom {
                Some(custom) => custom.to_string(),
                None if asterisk => ".*".to_string(),
                None => format!("[^{}]+?", regex::escape(&delimiter.to_string())),
            };
            let name = match name {
                Some(name) => ParamName::Named(name.to_string()),
                None => {
                    positional += 1;
                    ParamName::Index(positional - 1)
                }
            };

            tokens.push(PathToken::Param(PathParam {
                name,
                prefix: prefix.unwrap_or_default().to_string(),
                delimiter,
                optional: matches!(modifier, Some("?" | "*")),
                repeat: matches!(modifier, Some("+" | "*")),
                partial,
                asterisk,
                pattern,
            }));
        }

        literal.push_str(&template[index..]);
        if !literal.is_empty() {
            tokens.push(PathToken::Literal(literal));
        }

        Ok(Self {
            template: template.to_string(),
            tokens,
        })
    }

    /// The original template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Template tokens in order.
    pub fn tokens(&self) -> &[PathToken] {
        &self.tokens
    }

    /// Parameter tokens in order.
    pub fn params(&self) -> impl Iterator<Item = &PathParam> {
        self.tokens.iter().filter_map(|token| match token {
            PathToken::Param(param) => Some(param),
            PathToken::Literal(_) => None,
        })
    }

    /// Literal text before the first parameter, glob or group, without a
    /// trailing `/`. An empty result is the root, `/`.
    pub fn literal_prefix(&self) -> String {
        let mut prefix = String::new();
        for token in &self.tokens {
            match token {
                PathToken::Literal(text) => prefix.push_str(text),
                PathToken::Param(_) => break,
            }
        }
        let trimmed = prefix.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Compiles the template into an anchored matching pattern.
    pub fn to_pattern(
        &self,
        mode: MatchMode,
        sensitive: bool,
        strict: bool,
    ) -> Result<PathPattern> {
        let flags = if sensitive { "" } else { "(?i)" };
        let mut route = String::new();
        let mut groups = Vec::new();
        let mut validators = Vec::new();

        for token in &self.tokens {
            match token {
                PathToken::Literal(text) => route.push_str(&regex::escape(text)),
                PathToken::Param(param) => {
                    let prefix = regex::escape(&param.prefix);
                    let mut capture = format!("(?:{})", param.pattern);
                    if param.repeat {
                        capture = format!("{capture}(?:{prefix}{capture})*");
                    }
                    validators.push(Regex::new(&format!("{flags}^(?:{})$", param.pattern))?);
                    let group_name = format!("p{}", groups.len());
                    let group = format!("(?P<{group_name}>{capture})");
                    groups.push(group_name);

                    let piece = match (param.optional, param.partial) {
                        (true, false) => format!("(?:{prefix}{group})?"),
                        (true, true) => format!("{prefix}{group}?"),
                        (false, _) => format!("{prefix}{group}"),
                    };
                    route.push_str(&piece);
                }
            }
        }

        let ends_with_delimiter = route.ends_with('/');
        if !strict && ends_with_delimiter {
            route.pop();
        }
        match (mode, strict) {
            (MatchMode::Exact, false) => route.push_str("/?$"),
            (MatchMode::Exact, true) => route.push('$'),
            (MatchMode::Prefix, true) if ends_with_delimiter => {}
            (MatchMode::Prefix, _) => route.push_str("(?:/|$)"),
        }

        let regex = Regex::new(&format!("{flags}^{route}"))?;

        Ok(PathPattern {
            template: self.clone(),
            regex,
            groups,
            validators,
            sensitive,
        })
    }

    /// Representative shapes of the paths this template produces, one per
    /// combination of present and absent optional parameters.
    pub fn examples(&self) -> Vec<Vec<ShapePart>> {
        let optionals = self
            .params()
            .filter(|param| param.optional)
            .count()
            .min(MAX_SHAPE_OPTIONALS);

        (0..1u32 << optionals)
            .map(|mask| {
                let mut shape = Vec::new();
                let mut optional_index = 0;
                for token in &self.tokens {
                    match token {
                        PathToken::Literal(text) => push_literal(&mut shape, text),
                        PathToken::Param(param) => {
                            let present = if param.optional && optional_index < optionals {
                                optional_index += 1;
                                mask & (1 << (optional_index - 1)) != 0
                            } else {
                                true
                            };
                            if present {
                                push_literal(&mut shape, &param.prefix);
                                shape.push(if param.asterisk || param.repeat {
                                    ShapePart::Any
                                } else {
                                    ShapePart::Segment
                                });
                            } else if param.partial {
                                push_literal(&mut shape, &param.prefix);
                            }
                        }
                    }
                }
                shape
            })
            .collect()
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn push_literal(shape: &mut Vec<ShapePart>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(ShapePart::Literal(last)) = shape.last_mut() {
        last.push_str(text);
    } else {
        shape.push(ShapePart::Literal(text.to_string()));
    }
}

fn validate_structure(template: &str) -> Result<()> {
    if !template.starts_with('/') {
        return Err(RouterError::invalid_source(template, "path must start with `/`"));
    }
    if template.contains("//") {
        return Err(RouterError::invalid_source(template, "doubled `/` separator"));
    }
    if template.contains("()") {
        return Err(RouterError::invalid_source(template, "empty capture group"));
    }

    let mut depth = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => {
                let named = chars
                    .peek()
                    .is_some_and(|next| next.is_alphanumeric() || *next == '_');
                if !named {
                    return Err(RouterError::invalid_source(
                        template,
                        "parameter marker without a name",
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// One piece of an example path shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapePart {
    /// Literal text.
    Literal(String),
    /// One or more characters other than `/`.
    Segment,
    /// Anything, including `/`.
    Any,
}

/// Returns `true` if some path of `shape` starts with `prefix`.
///
/// With `extensible`, the shape also stands for every path that continues it
/// after a `/`, which is how prefix-matching routes behave.
pub fn shape_reaches(shape: &[ShapePart], prefix: &str, extensible: bool) -> bool {
    reaches(shape, prefix.as_bytes(), extensible)
}

fn reaches(shape: &[ShapePart], rest: &[u8], extensible: bool) -> bool {
    if rest.is_empty() {
        return true;
    }
    match shape.split_first() {
        None => rest == b"/" || (extensible && rest[0] == b'/'),
        Some((ShapePart::Literal(text), tail)) => {
            let text = text.as_bytes();
            if rest.len() <= text.len() {
                text.starts_with(rest)
            } else {
                rest.starts_with(text) && reaches(tail, &rest[text.len()..], extensible)
            }
        }
        Some((ShapePart::Segment, tail)) => {
            let run = rest.iter().take_while(|b| **b != b'/').count();
            run == rest.len() || (1..=run).any(|taken| reaches(tail, &rest[taken..], extensible))
        }
        Some((ShapePart::Any, _)) => true,
    }
}

/// A parsed route source: `[METHOD ][=|~]/path-template`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSource {
    /// Method selector.
    pub method: RouteMethod,
    /// Explicit `=` / `~` modifier, if any.
    pub mode: Option<MatchMode>,
    /// The path template.
    pub template: PathTemplate,
}

impl RouteSource {
    /// Parses a route source string.
    ///
    /// ```
    /// use oxide_routes::{MatchMode, RouteMethod, RouteSource};
    ///
    /// let source = RouteSource::parse("post =/users/:id").unwrap();
    /// assert_eq!(source.method, RouteMethod::Named("POST".to_string()));
    /// assert_eq!(source.mode, Some(MatchMode::Exact));
    /// assert_eq!(source.template.as_str(), "/users/:id");
    ///
    /// assert_eq!(RouteSource::parse("/users").unwrap().method, RouteMethod::All);
    /// assert!(RouteSource::parse("GET users").is_err());
    /// ```
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        let (method, rest) = if trimmed.starts_with(['/', '=', '~']) {
            (RouteMethod::All, trimmed)
        } else {
            match trimmed.split_once(char::is_whitespace) {
                Some((token, rest)) => (RouteMethod::parse(token), rest.trim_start()),
                None => (RouteMethod::All, trimmed),
            }
        };

        let (mode, path) = if let Some(path) = rest.strip_prefix('=') {
            (Some(MatchMode::Exact), path)
        } else if let Some(path) = rest.strip_prefix('~') {
            (Some(MatchMode::Prefix), path)
        } else {
            (None, rest)
        };

        let template = PathTemplate::parse(path).map_err(|err| match err {
            RouterError::InvalidSource { reason, .. } => {
                RouterError::invalid_source(source, reason)
            }
            other => other,
        })?;

        Ok(Self {
            method,
            mode,
            template,
        })
    }
}

/// A compiled path template, ready to match request paths.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: PathTemplate,
    regex: Regex,
    groups: Vec<String>,
    /// Whole-value matcher per parameter, in template order.
    validators: Vec<Regex>,
    sensitive: bool,
}

impl PathPattern {
    /// Compiles `template` with default options: exact, case-insensitive,
    /// trailing delimiter optional.
    ///
    /// ```
    /// use oxide_routes::PathPattern;
    ///
    /// let pattern = PathPattern::new("/posts/:id/comments/:comment_id").unwrap();
    /// let params = pattern.match_path("/posts/123/comments/456").unwrap();
    /// assert_eq!(params.get("id"), Some("123"));
    /// assert_eq!(params.get("comment_id"), Some("456"));
    /// ```
    pub fn new(template: &str) -> Result<Self> {
        PathTemplate::parse(template)?.to_pattern(MatchMode::Exact, false, false)
    }

    /// The template this pattern was compiled from.
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// The underlying regular expression.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Returns `true` if literals are compared case-sensitively.
    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Attempts to match a path, returning the decoded captures.
    pub fn match_path(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let mut params = Params::new();
        for (param, group) in self.template.params().zip(&self.groups) {
            if let Some(value) = caps.name(group) {
                params.insert(param.name.to_string(), decode_value(value.as_str()));
            }
        }
        Some(params)
    }

    /// Builds a path from parameter values.
    ///
    /// Values are percent-encoded; a repeating parameter takes its segments
    /// joined by the parameter's delimiter.
    ///
    /// ```
    /// use oxide_routes::{Params, PathPattern};
    ///
    /// let pattern = PathPattern::new("/files/:dir+/:name.:ext").unwrap();
    /// let params: Params = [("dir", "a/b"), ("name", "report"), ("ext", "pdf")]
    ///     .into_iter()
    ///     .collect();
    /// assert_eq!(pattern.reverse(&params).unwrap(), "/files/a/b/report.pdf");
    /// ```
    pub fn reverse(&self, params: &Params) -> Result<String> {
        let mut path = String::new();
        let mut validators = self.validators.iter();

        for token in self.template.tokens() {
            let (param, validator) = match token {
                PathToken::Literal(text) => {
                    path.push_str(text);
                    continue;
                }
                PathToken::Param(param) => match validators.next() {
                    Some(validator) => (param, validator),
                    None => return Err(RouterError::MissingParameter(param.name.to_string())),
                },
            };

            let name = param.name.to_string();
            let Some(value) = params.get(&name) else {
                if param.optional {
                    if param.partial {
                        path.push_str(&param.prefix);
                    }
                    continue;
                }
                return Err(RouterError::MissingParameter(name));
            };

            let segments: Vec<&str> = if param.repeat {
                value.split(param.delimiter).collect()
            } else {
                vec![value]
            };

            for (i, segment) in segments.iter().enumerate() {
                let encoded = if param.asterisk {
                    encode_glob(segment)
                } else {
                    urlencoding::encode(segment).into_owned()
                };
                if !validator.is_match(&encoded) {
                    return Err(RouterError::InvalidParameter {
                        name,
                        value: value.to_string(),
                    });
                }
                if i == 0 {
                    path.push_str(&param.prefix);
                } else {
                    path.push(param.delimiter);
                }
                path.push_str(&encoded);
            }
        }

        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }
}

fn decode_value(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |value| value.into_owned())
}

/// Globs keep `/` intact; only characters that would end the path are encoded.
fn encode_glob(value: &str) -> String {
    value
        .split('/')
        .map(|part| urlencoding::encode(part).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
