//! Token-level syntax predicates over plugin source.
//!
//! Policy rules are expressed against a handful of named predicates
//! (`declares_const`, `defines_fn`, `imports`, `calls_qualified`, ...)
//! instead of parser node types, so the policy table survives a parser
//! swap. Rhai's own compiler still owns syntactic validity; this layer only
//! answers shape questions about source that already parses. It never
//! executes anything, so hostile input cannot escape analysis by raising or
//! looping.
//!
//! The scan is comment-aware, string-aware (including `` `template ${..}` ``
//! interpolation, whose embedded expressions are lexed as code) and tracks
//! brace depth so top-level declarations are distinguishable from nested
//! ones.

/// One scanned token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identifier or keyword
    Ident(String),
    /// String literal content (quotes stripped, escapes resolved verbatim)
    Str(String),
    /// Single punctuation character
    Punct(char),
    /// The `::` path separator
    PathSep,
}

/// A token plus the brace depth it occurred at (0 = module top level).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub token: Token,
    pub depth: u32,
}

/// One `import` statement found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStmt {
    pub path: String,
    pub alias: Option<String>,
    pub depth: u32,
}

/// Scanned view of one plugin source, ready for predicate queries.
#[derive(Debug, Clone)]
pub struct SourceIndex {
    lexemes: Vec<Lexeme>,
}

impl SourceIndex {
    /// Scan `source` into a token index. Never fails: unterminated strings
    /// and comments are tolerated (the real parser rejects them later).
    pub fn scan(source: &str) -> Self {
        let mut lexer = Lexer {
            src: source.chars().collect(),
            pos: 0,
            depth: 0,
            out: Vec::new(),
        };
        lexer.lex_block(false);
        Self { lexemes: lexer.out }
    }

    /// Count `const <name>` declarations at module top level.
    pub fn declares_const(&self, name: &str) -> usize {
        self.count_pairs("const", name, true)
    }

    /// Count `fn <name>` definitions.
    pub fn defines_fn(&self, name: &str) -> usize {
        self.count_pairs("fn", name, false)
    }

    fn count_pairs(&self, keyword: &str, name: &str, top_level_only: bool) -> usize {
        self.lexemes
            .windows(2)
            .filter(|w| {
                matches!(&w[0].token, Token::Ident(k) if k == keyword)
                    && matches!(&w[1].token, Token::Ident(n) if n == name)
                    && (!top_level_only || w[0].depth == 0)
            })
            .count()
    }

    /// Whether the identifier appears anywhere in the body.
    pub fn references(&self, name: &str) -> bool {
        self.lexemes
            .iter()
            .any(|l| matches!(&l.token, Token::Ident(i) if i == name))
    }

    /// All `import "<path>" [as <alias>]` statements.
    pub fn imports(&self) -> Vec<ImportStmt> {
        let mut found = Vec::new();
        let toks = &self.lexemes;
        for i in 0..toks.len() {
            let Token::Ident(kw) = &toks[i].token else {
                continue;
            };
            if kw != "import" {
                continue;
            }
            let Some(Lexeme {
                token: Token::Str(path),
                ..
            }) = toks.get(i + 1)
            else {
                continue;
            };
            let alias = match (toks.get(i + 2), toks.get(i + 3)) {
                (
                    Some(Lexeme {
                        token: Token::Ident(kw),
                        ..
                    }),
                    Some(Lexeme {
                        token: Token::Ident(name),
                        ..
                    }),
                ) if kw == "as" => Some(name.clone()),
                _ => None,
            };
            found.push(ImportStmt {
                path: path.clone(),
                alias,
                depth: toks[i].depth,
            });
        }
        found
    }

    /// All `<ns>::<name>` qualified references.
    pub fn qualified_pairs(&self) -> Vec<(&str, &str)> {
        self.lexemes
            .windows(3)
            .filter_map(|w| match (&w[0].token, &w[1].token, &w[2].token) {
                (Token::Ident(ns), Token::PathSep, Token::Ident(name)) => {
                    Some((ns.as_str(), name.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    /// Whether `<ns>::<name>` is referenced anywhere.
    pub fn calls_qualified(&self, ns: &str, name: &str) -> bool {
        self.qualified_pairs()
            .iter()
            .any(|(a, b)| *a == ns && *b == name)
    }

    /// Whether a bare (unqualified, non-method) call to `name` exists.
    pub fn calls_bare(&self, name: &str) -> bool {
        let toks = &self.lexemes;
        (0..toks.len()).any(|i| {
            let is_call = matches!(&toks[i].token, Token::Ident(n) if n == name)
                && matches!(toks.get(i + 1), Some(l) if l.token == Token::Punct('('));
            if !is_call {
                return false;
            }
            match i.checked_sub(1).and_then(|p| toks.get(p)) {
                Some(prev) => {
                    prev.token != Token::PathSep
                        && prev.token != Token::Punct('.')
                        && !matches!(&prev.token, Token::Ident(k) if k == "fn")
                }
                None => true,
            }
        })
    }

    /// All string literal contents, template segments included.
    pub fn string_literals(&self) -> impl Iterator<Item = &str> {
        self.lexemes.iter().filter_map(|l| match &l.token {
            Token::Str(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Whether the source carries a `try`/`catch` recovery block.
    pub fn uses_try_catch(&self) -> bool {
        self.references("try") && self.references("catch")
    }

    /// Whether `name` is indexed with `[` anywhere (`params["city"]`).
    pub fn raw_index_on(&self, name: &str) -> bool {
        self.lexemes.windows(2).any(|w| {
            matches!(&w[0].token, Token::Ident(n) if n == name)
                && w[1].token == Token::Punct('[')
        })
    }

    /// Whether access to `name` is guarded: an `in name` membership check
    /// or an elvis access `name?.`.
    pub fn guarded_access(&self, name: &str) -> bool {
        let membership = self.lexemes.windows(2).any(|w| {
            matches!(&w[0].token, Token::Ident(k) if k == "in")
                && matches!(&w[1].token, Token::Ident(n) if n == name)
        });
        let elvis = self.lexemes.windows(3).any(|w| {
            matches!(&w[0].token, Token::Ident(n) if n == name)
                && w[1].token == Token::Punct('?')
                && w[2].token == Token::Punct('.')
        });
        membership || elvis
    }

    /// Whether `fn <name>` has a non-empty body.
    pub fn fn_has_body(&self, name: &str) -> bool {
        let toks = &self.lexemes;
        for i in 0..toks.len() {
            let matches_def = matches!(&toks[i].token, Token::Ident(k) if k == "fn")
                && matches!(toks.get(i + 1), Some(l) if matches!(&l.token, Token::Ident(n) if n == name));
            if !matches_def {
                continue;
            }
            let Some(open) = (i + 2..toks.len()).find(|&j| toks[j].token == Token::Punct('{'))
            else {
                return false;
            };
            return !matches!(toks.get(open + 1), Some(l) if l.token == Token::Punct('}'));
        }
        false
    }
}

struct Lexer {
    src: Vec<char>,
    pos: usize,
    depth: u32,
    out: Vec<Lexeme>,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn push(&mut self, token: Token) {
        self.out.push(Lexeme {
            token,
            depth: self.depth,
        });
    }

    /// Lex until end of input, or (when `stop_on_unmatched_brace` is set)
    /// until the `}` that closes a template interpolation.
    fn lex_block(&mut self, stop_on_unmatched_brace: bool) {
        let mut local_open = 0usize;
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '/' && self.peek2() == Some('/') {
                self.skip_line_comment();
            } else if c == '/' && self.peek2() == Some('*') {
                self.skip_block_comment();
            } else if c == '"' || c == '\'' {
                self.lex_string(c);
            } else if c == '`' {
                self.lex_template();
            } else if c == ':' && self.peek2() == Some(':') {
                self.pos += 2;
                self.push(Token::PathSep);
            } else if c == '{' {
                self.push(Token::Punct('{'));
                self.pos += 1;
                self.depth += 1;
                local_open += 1;
            } else if c == '}' {
                if stop_on_unmatched_brace && local_open == 0 {
                    self.pos += 1;
                    return;
                }
                self.pos += 1;
                self.depth = self.depth.saturating_sub(1);
                local_open = local_open.saturating_sub(1);
                self.push(Token::Punct('}'));
            } else if c == '_' || c.is_alphabetic() {
                self.lex_ident();
            } else if c.is_ascii_digit() {
                self.skip_number();
            } else {
                self.pos += 1;
                self.push(Token::Punct(c));
            }
        }
    }

    fn lex_ident(&mut self) {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c == '_' || c.is_alphanumeric()) {
            self.pos += 1;
        }
        let ident: String = self.src[start..self.pos].iter().collect();
        self.push(Token::Ident(ident));
    }

    fn skip_number(&mut self) {
        while matches!(self.peek(), Some(c) if c == '_' || c.is_alphanumeric()) {
            self.pos += 1;
        }
        if self.peek() == Some('.') && matches!(self.peek2(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c == '_' || c.is_alphanumeric()) {
                self.pos += 1;
            }
        }
    }

    fn lex_string(&mut self, quote: char) {
        self.pos += 1;
        let mut acc = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\\' {
                if let Some(escaped) = self.peek() {
                    acc.push(escaped);
                    self.pos += 1;
                }
            } else if c == quote {
                break;
            } else {
                acc.push(c);
            }
        }
        self.push(Token::Str(acc));
    }

    fn lex_template(&mut self) {
        self.pos += 1;
        let mut acc = String::new();
        while let Some(c) = self.peek() {
            if c == '`' {
                self.pos += 1;
                break;
            }
            if c == '\\' {
                self.pos += 1;
                if let Some(escaped) = self.peek() {
                    acc.push(escaped);
                    self.pos += 1;
                }
                continue;
            }
            if c == '$' && self.peek2() == Some('{') {
                self.push(Token::Str(std::mem::take(&mut acc)));
                self.pos += 2;
                self.lex_block(true);
                continue;
            }
            acc.push(c);
            self.pos += 1;
        }
        self.push(Token::Str(acc));
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.pos += 2;
        let mut nesting = 1usize;
        while nesting > 0 {
            match (self.peek(), self.peek2()) {
                (Some('/'), Some('*')) => {
                    self.pos += 2;
                    nesting += 1;
                }
                (Some('*'), Some('/')) => {
                    self.pos += 2;
                    nesting -= 1;
                }
                (Some(_), _) => self.pos += 1,
                (None, _) => break,
            }
        }
    }
}
