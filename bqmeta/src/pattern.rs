//! SQL `LIKE` style name filters used by metadata listings.
//!
//! `%` matches any run of characters, `_` matches exactly one and `\` escapes the next
//! character. A missing filter, an empty filter and `%` all match every name.

const ESCAPE: char = '\\';

/// Element of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(char),
    AnyChar,
    AnyRun,
}

/// A parsed name filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    /// Matches every name.
    Any,
    /// Matches one name exactly; the pattern had no unescaped wildcards.
    Exact(String),
    Like(Vec<Token>),
}

impl NamePattern {
    pub fn parse(pattern: Option<&str>) -> Self {
        let Some(pattern) = pattern else {
            return NamePattern::Any;
        };

        let mut tokens = Vec::with_capacity(pattern.len());
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            let token = match c {
                ESCAPE => Token::Literal(chars.next().unwrap_or(ESCAPE)),
                '%' => Token::AnyRun,
                '_' => Token::AnyChar,
                c => Token::Literal(c),
            };

            // Consecutive runs are equivalent to one.
            if token == Token::AnyRun && tokens.last() == Some(&Token::AnyRun) {
                continue;
            }
            tokens.push(token);
        }

        if tokens.is_empty() || tokens == [Token::AnyRun] {
            return NamePattern::Any;
        }

        if tokens.iter().all(|token| matches!(token, Token::Literal(_))) {
            let name = tokens
                .iter()
                .filter_map(|token| match token {
                    Token::Literal(c) => Some(*c),
                    _ => None,
                })
                .collect();
            return NamePattern::Exact(name);
        }

        NamePattern::Like(tokens)
    }

    /// Returns the name spelled by the pattern when it contains no `%`, reading every `_` as
    /// a literal underscore.
    ///
    /// The candidate always matches the pattern.
    pub fn literal_candidate(&self) -> Option<String> {
        match self {
            NamePattern::Any => None,
            NamePattern::Exact(name) => Some(name.clone()),
            NamePattern::Like(tokens) => tokens
                .iter()
                .map(|token| match token {
                    Token::Literal(c) => Some(*c),
                    Token::AnyChar => Some('_'),
                    Token::AnyRun => None,
                })
                .collect(),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NamePattern::Any => true,
            NamePattern::Exact(exact) => exact == name,
            NamePattern::Like(tokens) => like_matches(tokens, &name.chars().collect::<Vec<_>>()),
        }
    }
}

/// Greedy wildcard matching with backtracking to the most recent `%`.
fn like_matches(tokens: &[Token], name: &[char]) -> bool {
    let (mut t, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match tokens.get(t) {
            Some(Token::AnyRun) => {
                backtrack = Some((t, n));
                t += 1;
            }
            Some(Token::AnyChar) => {
                t += 1;
                n += 1;
            }
            Some(Token::Literal(c)) if *c == name[n] => {
                t += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((run_t, run_n)) => {
                    t = run_t + 1;
                    n = run_n + 1;
                    backtrack = Some((run_t, run_n + 1));
                }
                None => return false,
            },
        }
    }

    tokens[t..].iter().all(|token| *token == Token::AnyRun)
}
