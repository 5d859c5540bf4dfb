//! The command pattern grammar.
//!
//! A pattern is a whitespace-separated list of tokens:
//!
//! - `word`: literal, matched case-insensitively
//! - `word~`: collapsible literal, input need only share a prefix
//! - `'two words'~`: quoted multi-word literal phrase
//! - `<name:type>`: required typed argument
//! - `<name:type?>`: optional argument; parse succeeds with the argument
//!   absent when missing or unparseable
//! - a type may carry a scope qualifier: `<item:item@inventory>`
//!
//! Parsing is deterministic: the same input against the same pattern always
//! yields the same argument map or the same failure reason.

use std::collections::BTreeMap;

use dusk_core::direction::Direction;

use crate::command::scope::{resolve_fragment, Scope};
use crate::world::{ObjectId, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Any non-room object.
    Object,
    Item,
    Mob,
    Direction,
    Number,
    Word,
    /// The remainder of the line, verbatim.
    Text,
}

impl ArgType {
    fn parse(spec: &str) -> Option<ArgType> {
        match spec {
            "object" => Some(ArgType::Object),
            "item" => Some(ArgType::Item),
            "mob" => Some(ArgType::Mob),
            "direction" => Some(ArgType::Direction),
            "number" => Some(ArgType::Number),
            "word" => Some(ArgType::Word),
            "text" => Some(ArgType::Text),
            _ => None,
        }
    }

    fn is_object_like(self) -> bool {
        matches!(self, ArgType::Object | ArgType::Item | ArgType::Mob)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternToken {
    Literal { words: Vec<String>, collapsible: bool },
    Argument { name: String, ty: ArgType, optional: bool, scope: Option<Scope> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub raw: String,
    pub tokens: Vec<PatternToken>,
}

/// A parsed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Object(ObjectId),
    Direction(Direction),
    Number(i64),
    Word(String),
    Text(String),
    /// Optional argument that was absent or unparseable.
    Absent,
}

/// Named arguments produced by a successful parse.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgMap(BTreeMap<String, ArgValue>);

impl ArgMap {
    pub fn insert(&mut self, name: &str, value: ArgValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn object(&self, name: &str) -> Option<ObjectId> {
        match self.0.get(name) {
            Some(ArgValue::Object(oid)) => Some(*oid),
            _ => None,
        }
    }

    pub fn direction(&self, name: &str) -> Option<Direction> {
        match self.0.get(name) {
            Some(ArgValue::Direction(dir)) => Some(*dir),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(ArgValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn word(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ArgValue::Word(w)) => Some(w),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(ArgValue::Text(t)) => Some(t),
            _ => None,
        }
    }
}

/// Why dispatch ran or did not run a command.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Matched(ArgMap),
    /// Structure did not match; reason is user-visible.
    Failed(String),
    /// Structure matched but a required name found nothing in scope.
    ScopeMiss,
}

fn word_matches(input: &str, literal: &str, collapsible: bool) -> bool {
    let input = input.to_lowercase();
    if input == literal {
        return true;
    }
    collapsible && !input.is_empty() && literal.starts_with(&input)
}

impl Pattern {
    /// Compile a pattern string. Fails on malformed tokens.
    pub fn compile(raw: &str) -> Result<Pattern, String> {
        let mut tokens = Vec::new();
        let mut rest = raw.trim();
        while !rest.is_empty() {
            if let Some(stripped) = rest.strip_prefix('\'') {
                let close = stripped
                    .find('\'')
                    .ok_or_else(|| format!("unterminated quote in pattern {:?}", raw))?;
                let phrase = &stripped[..close];
                let mut tail = &stripped[close + 1..];
                let collapsible = tail.starts_with('~');
                if collapsible {
                    tail = &tail[1..];
                }
                let words: Vec<String> =
                    phrase.split_whitespace().map(|w| w.to_lowercase()).collect();
                if words.is_empty() {
                    return Err(format!("empty quoted phrase in pattern {:?}", raw));
                }
                tokens.push(PatternToken::Literal { words, collapsible });
                rest = tail.trim_start();
                continue;
            }

            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let token = &rest[..end];
            rest = rest[end..].trim_start();

            if let Some(inner) = token.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
                let (name, spec) = inner
                    .split_once(':')
                    .ok_or_else(|| format!("argument without type in pattern {:?}", raw))?;
                let (spec, optional) = match spec.strip_suffix('?') {
                    Some(stripped) => (stripped, true),
                    None => (spec, false),
                };
                let (ty_spec, scope) = match spec.split_once('@') {
                    Some((ty, scope)) => (ty, Some(Scope::parse(scope).ok_or_else(|| {
                        format!("unknown scope {:?} in pattern {:?}", scope, raw)
                    })?)),
                    None => (spec, None),
                };
                let ty = ArgType::parse(ty_spec)
                    .ok_or_else(|| format!("unknown type {:?} in pattern {:?}", ty_spec, raw))?;
                tokens.push(PatternToken::Argument {
                    name: name.to_string(),
                    ty,
                    optional,
                    scope,
                });
            } else {
                let collapsible = token.ends_with('~');
                let word = token.trim_end_matches('~').to_lowercase();
                if word.is_empty() {
                    return Err(format!("empty literal in pattern {:?}", raw));
                }
                tokens.push(PatternToken::Literal { words: vec![word], collapsible });
            }
        }
        if tokens.is_empty() {
            return Err("empty pattern".to_string());
        }
        Ok(Pattern { raw: raw.to_string(), tokens })
    }

    /// First literal token, used for dispatch candidate collection.
    pub fn first_literal(&self) -> Option<(&[String], bool)> {
        match self.tokens.first() {
            Some(PatternToken::Literal { words, collapsible }) => {
                Some((words.as_slice(), *collapsible))
            }
            _ => None,
        }
    }

    /// Number of literal tokens; more literals rank as more specific.
    pub fn specificity(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t, PatternToken::Literal { .. }))
            .count()
    }

    /// Whether `token` can begin this pattern (exact, or prefix when the
    /// first literal is collapsible, or one of `aliases` exactly).
    pub fn answers_to(&self, token: &str, aliases: &[String]) -> bool {
        if aliases.iter().any(|a| a == &token.to_lowercase()) {
            return true;
        }
        match self.first_literal() {
            Some((words, collapsible)) => word_matches(token, &words[0], collapsible),
            None => false,
        }
    }

    /// Parse a full input line. When `alias_used` is set the first literal
    /// token is considered matched by the alias and only consumes one input
    /// token.
    pub fn parse(
        &self,
        world: &World,
        actor: ObjectId,
        input: &str,
        alias_used: bool,
    ) -> ParseOutcome {
        let words: Vec<String> = input.split_whitespace().map(|w| w.to_string()).collect();
        let mut args = ArgMap::default();
        let mut pos = 0usize;

        for (index, token) in self.tokens.iter().enumerate() {
            match token {
                PatternToken::Literal { words: lit_words, collapsible } => {
                    if index == 0 && alias_used {
                        if pos >= words.len() {
                            return ParseOutcome::Failed("What?".to_string());
                        }
                        pos += 1;
                        continue;
                    }
                    for lit in lit_words {
                        match words.get(pos) {
                            Some(word) if word_matches(word, lit, *collapsible) => pos += 1,
                            _ => {
                                return ParseOutcome::Failed(format!(
                                    "Expected \"{}\" here.",
                                    lit
                                ))
                            }
                        }
                    }
                }
                PatternToken::Argument { name, ty, optional, scope } => {
                    match self.parse_argument(
                        world, actor, &words, pos, index, *ty, *scope,
                    ) {
                        ArgStep::Value(value, consumed) => {
                            args.insert(name, value);
                            pos += consumed;
                        }
                        ArgStep::Missing => {
                            if *optional {
                                args.insert(name, ArgValue::Absent);
                            } else if ty.is_object_like() && pos < words.len() {
                                // A name was given; it just found nothing.
                                return ParseOutcome::ScopeMiss;
                            } else {
                                return ParseOutcome::Failed(format!(
                                    "Missing {} argument.",
                                    name
                                ));
                            }
                        }
                    }
                }
            }
        }

        if pos < words.len() {
            return ParseOutcome::Failed(format!(
                "I don't understand \"{}\".",
                words[pos..].join(" ")
            ));
        }
        ParseOutcome::Matched(args)
    }

    fn parse_argument(
        &self,
        world: &World,
        actor: ObjectId,
        words: &[String],
        pos: usize,
        token_index: usize,
        ty: ArgType,
        scope: Option<Scope>,
    ) -> ArgStep {
        if pos >= words.len() {
            return ArgStep::Missing;
        }
        match ty {
            ArgType::Text => {
                ArgStep::Value(ArgValue::Text(words[pos..].join(" ")), words.len() - pos)
            }
            ArgType::Number => match words[pos].parse::<i64>() {
                Ok(n) => ArgStep::Value(ArgValue::Number(n), 1),
                Err(_) => ArgStep::Missing,
            },
            ArgType::Word => ArgStep::Value(ArgValue::Word(words[pos].to_lowercase()), 1),
            ArgType::Direction => match Direction::parse(&words[pos]) {
                Some(dir) => ArgStep::Value(ArgValue::Direction(dir), 1),
                None => ArgStep::Missing,
            },
            ArgType::Object | ArgType::Item | ArgType::Mob => {
                match self.tokens.get(token_index + 1) {
                    Some(PatternToken::Argument { .. }) => {
                        // No anchor to stop at: bind greedily, backing off a
                        // token at a time so "look rusty sword" takes both
                        // words while "look east" leaves "east" for the next
                        // argument.
                        for end in (pos + 1..=words.len()).rev() {
                            if let Some(oid) =
                                resolve_fragment(world, actor, &words[pos..end], ty, scope)
                            {
                                return ArgStep::Value(ArgValue::Object(oid), end - pos);
                            }
                        }
                        ArgStep::Missing
                    }
                    _ => {
                        let end = self.fragment_end(words, pos, token_index);
                        if end <= pos {
                            return ArgStep::Missing;
                        }
                        match resolve_fragment(world, actor, &words[pos..end], ty, scope) {
                            Some(oid) => ArgStep::Value(ArgValue::Object(oid), end - pos),
                            None => ArgStep::Missing,
                        }
                    }
                }
            }
        }
    }

    /// How far an object-naming fragment extends: up to the next literal's
    /// first match, one token when another argument follows, or the rest of
    /// the line when this is the final token.
    fn fragment_end(&self, words: &[String], pos: usize, token_index: usize) -> usize {
        match self.tokens.get(token_index + 1) {
            Some(PatternToken::Literal { words: lit_words, collapsible }) => {
                for candidate in pos + 1..words.len() {
                    if word_matches(&words[candidate], &lit_words[0], *collapsible) {
                        return candidate;
                    }
                }
                // No anchor found; claim a single token so the literal can
                // fail with its own message.
                pos + 1
            }
            Some(PatternToken::Argument { .. }) => pos + 1,
            None => words.len(),
        }
    }
}

enum ArgStep {
    Value(ArgValue, usize),
    Missing,
}
