//! Key matchers for handler registrations.
//!
//! Glob syntax:
//! - `*` matches any run of characters, including separators
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` match one character from the class; `[^...]` negates
//! - `\x` matches `x` literally

use crate::tree::key::{normalize, Key};
use std::fmt;

/// Decides which operation keys a handler sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Every operation, including `Reset`.
    All,
    /// Keys whose text starts with the prefix.
    Prefix(String),
    /// The key itself and every key beneath it, segment-wise.
    Subtree(String),
    /// Keys matched in full by a glob pattern.
    Pattern(KeyPattern),
}

impl Matcher {
    pub fn prefix(prefix: impl AsRef<str>) -> Self {
        Matcher::Prefix(normalize(prefix.as_ref()).to_string())
    }

    pub fn pattern(pattern: impl AsRef<str>) -> Self {
        Matcher::Pattern(KeyPattern::compile(normalize(pattern.as_ref())))
    }

    /// Check a (separator-stripped) key against this matcher.
    ///
    /// Operations without a key only reach [`Matcher::All`].
    pub fn matches(&self, key: Option<&str>) -> bool {
        match (self, key) {
            (Matcher::All, _) => true,
            (_, None) => false,
            (Matcher::Prefix(prefix), Some(key)) => key.starts_with(prefix.as_str()),
            (Matcher::Subtree(base), Some(key)) => match key.strip_prefix(base.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
            (Matcher::Pattern(pattern), Some(key)) => pattern.matches(key),
        }
    }

    /// Rewrite this matcher to apply beneath `scope`.
    ///
    /// Used by cursors: a matcher registered on a cursor sees keys relative
    /// to the cursor, the pipeline sees absolute ones.
    pub fn scoped(self, scope: &Key) -> Matcher {
        if scope.is_root() {
            return self;
        }
        let base = scope.to_string();
        match self {
            Matcher::All => Matcher::Subtree(base),
            Matcher::Prefix(prefix) if prefix.is_empty() => Matcher::Subtree(base),
            Matcher::Prefix(prefix) => Matcher::Prefix(format!("{}/{}", base, prefix)),
            Matcher::Subtree(sub) => Matcher::Subtree(format!("{}/{}", base, sub)),
            Matcher::Pattern(pattern) => Matcher::Pattern(KeyPattern::compile(&format!(
                "{}/{}",
                escape(&base),
                pattern.source
            ))),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::All => f.write_str("*"),
            Matcher::Prefix(prefix) => write!(f, "{}...", prefix),
            Matcher::Subtree(base) => write!(f, "{}/**", base),
            Matcher::Pattern(pattern) => write!(f, "~{}", pattern.source),
        }
    }
}

/// Escape glob metacharacters so `text` matches only itself.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyOne,
    AnyRun,
    Class { negated: bool, ranges: Vec<(char, char)> },
}

/// A compiled glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    source: String,
    tokens: Vec<Token>,
}

impl KeyPattern {
    /// Compile a pattern. Every input compiles; an unterminated class takes
    /// the rest of the pattern.
    pub fn compile(source: &str) -> Self {
        let mut tokens = Vec::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    // Adjacent stars are equivalent to one.
                    if tokens.last() != Some(&Token::AnyRun) {
                        tokens.push(Token::AnyRun);
                    }
                }
                '?' => tokens.push(Token::AnyOne),
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        tokens.push(Token::Literal(escaped));
                    }
                }
                '[' => {
                    let negated = chars.peek() == Some(&'^');
                    if negated {
                        chars.next();
                    }
                    let mut ranges: Vec<(char, char)> = Vec::new();
                    while let Some(c) = chars.next() {
                        if c == ']' {
                            break;
                        }
                        if c == '-' && !ranges.is_empty() {
                            match chars.peek() {
                                Some(&end) if end != ']' => {
                                    chars.next();
                                    if let Some(last) = ranges.last_mut() {
                                        last.1 = end;
                                    }
                                    continue;
                                }
                                _ => {}
                            }
                        }
                        ranges.push((c, c));
                    }
                    tokens.push(Token::Class { negated, ranges });
                }
                c => tokens.push(Token::Literal(c)),
            }
        }

        Self {
            source: source.to_string(),
            tokens,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether the whole of `input` matches.
    pub fn matches(&self, input: &str) -> bool {
        let chars: Vec<char> = input.chars().collect();
        match_tokens(&self.tokens, &chars)
    }
}

impl Token {
    /// Check a single-character token against `c`.
    fn accepts(&self, c: char) -> bool {
        match self {
            Token::Literal(l) => *l == c,
            Token::AnyOne => true,
            Token::AnyRun => false,
            Token::Class { negated, ranges } => {
                ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi) != *negated
            }
        }
    }
}

/// Greedy match with a single backtrack point: on a mismatch, the most
/// recent `*` absorbs one more character. Runs in O(tokens * input).
fn match_tokens(tokens: &[Token], input: &[char]) -> bool {
    let mut t = 0;
    let mut i = 0;
    // Token after the last star, and the input position it resumes from.
    let mut star: Option<(usize, usize)> = None;

    while i < input.len() {
        match tokens.get(t) {
            Some(Token::AnyRun) => {
                t += 1;
                star = Some((t, i));
                continue;
            }
            Some(token) if token.accepts(input[i]) => {
                t += 1;
                i += 1;
                continue;
            }
            _ => {}
        }
        match star {
            Some((after, from)) => {
                t = after;
                i = from + 1;
                star = Some((after, i));
            }
            None => return false,
        }
    }

    tokens.iter().skip(t).all(|token| *token == Token::AnyRun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn glob_basics() {
        let p = KeyPattern::compile("users/*/name");
        assert!(p.matches("users/42/name"));
        assert!(p.matches("users/a/b/name"));
        assert!(!p.matches("users/42/email"));

        let p = KeyPattern::compile("item?");
        assert!(p.matches("item1"));
        assert!(!p.matches("item"));
        assert!(!p.matches("item12"));
    }

    #[test]
    fn glob_classes() {
        let p = KeyPattern::compile("v[0-9]");
        assert!(p.matches("v7"));
        assert!(!p.matches("vx"));

        let p = KeyPattern::compile("v[^0-9]");
        assert!(p.matches("vx"));
        assert!(!p.matches("v7"));

        let p = KeyPattern::compile("[abc]x");
        assert!(p.matches("bx"));
        assert!(!p.matches("dx"));
    }

    #[test]
    fn glob_escapes() {
        let p = KeyPattern::compile(r"a\*b");
        assert!(p.matches("a*b"));
        assert!(!p.matches("axb"));
    }

    #[test]
    fn matcher_dispatch() {
        assert!(Matcher::All.matches(None));
        assert!(Matcher::All.matches(Some("x")));
        assert!(!Matcher::prefix("foo").matches(None));
        assert!(Matcher::prefix("/foo").matches(Some("foo/bar")));
        assert!(!Matcher::prefix("foo").matches(Some("bar/foo")));
        assert!(Matcher::pattern("foo/*").matches(Some("foo/bar")));
        assert!(!Matcher::pattern("foo/*").matches(Some("foo")));
    }

    #[test]
    fn scoped_matchers() {
        let scope = Key::parse("app/state");
        assert_eq!(Matcher::All.scoped(&scope), Matcher::Subtree("app/state".into()));
        assert_eq!(Matcher::prefix("").scoped(&scope), Matcher::Subtree("app/state".into()));
        assert_eq!(
            Matcher::prefix("ui").scoped(&scope),
            Matcher::Prefix("app/state/ui".into())
        );
        let scoped = Matcher::pattern("*/open").scoped(&Key::parse("a*b"));
        assert!(scoped.matches(Some("a*b/menu/open")));
        assert!(!scoped.matches(Some("axb/menu/open")));
        assert_eq!(Matcher::All.scoped(&Key::root()), Matcher::All);
    }

    #[test]
    fn scoped_all_ignores_textual_siblings() {
        let scoped = Matcher::All.scoped(&Key::parse("a"));
        assert!(scoped.matches(Some("a")));
        assert!(scoped.matches(Some("a/x")));
        assert!(!scoped.matches(Some("ab/x")));
        assert!(!scoped.matches(Some("abc")));
        assert!(!scoped.matches(None));
    }

    #[test]
    fn many_stars_against_long_key() {
        let p = KeyPattern::compile("*a*a*a*a*a*a*a*a*b");
        let key = "a".repeat(4096);
        assert!(!p.matches(&key));
        assert!(p.matches(&format!("{}b", key)));

        let p = KeyPattern::compile("*/x?/*/[0-9]");
        assert!(p.matches("root/xy/deep/er/7"));
        assert!(!p.matches("root/xy/deep/er/q"));
    }

    proptest! {
        #[test]
        fn escaped_text_matches_itself(text in "[a-z*?\\[\\]/]{0,12}") {
            prop_assert!(KeyPattern::compile(&escape(&text)).matches(&text));
        }

        #[test]
        fn star_matches_everything(text in ".{0,16}") {
            prop_assert!(KeyPattern::compile("*").matches(&text));
        }
    }
}
