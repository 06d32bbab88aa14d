use std::fmt;

/// A lexical or syntactic error with its position in the source file.
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, col: usize, message: impl Into<String>) -> Self {
        SyntaxError {
            line,
            col,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for SyntaxError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokKind {
    Ident,
    Int,
    Float,
    Str,
    Char,
    Package,
    Import,
    Func,
    Return,
    If,
    Else,
    For,
    Go,
    Defer,
    Var,
    Const,
    Type,
    Struct,
    Range,
    Map,
    Break,
    Continue,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBrack,
    RBrack,
    Comma,
    Semi,
    Colon,
    Dot,
    Define,
    Assign,
    /// Compound assignment (`+=`, `-=`, ...); the operator text is in `text`.
    OpAssign,
    Inc,
    Dec,
    /// Any other operator; the operator text is in `text`.
    Op,
    Eof,
}

/// One token plus the trivia the formatter must preserve: own-line comments
/// directly above it, a blank-line marker, and a trailing same-line comment
/// attached to the token it follows.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokKind,
    pub text: String,
    pub line: usize,
    pub col: usize,
    /// `//` comment lines on their own lines immediately above this token.
    pub comments: Vec<String>,
    /// Whether a blank line precedes this token (or its comment group).
    pub blank_before: bool,
    /// A `//` comment on the same line, after this token.
    pub trailing: Option<String>,
}

fn keyword_kind(word: &str) -> Option<TokKind> {
    Some(match word {
        "package" => TokKind::Package,
        "import" => TokKind::Import,
        "func" => TokKind::Func,
        "return" => TokKind::Return,
        "if" => TokKind::If,
        "else" => TokKind::Else,
        "for" => TokKind::For,
        "go" => TokKind::Go,
        "defer" => TokKind::Defer,
        "var" => TokKind::Var,
        "const" => TokKind::Const,
        "type" => TokKind::Type,
        "struct" => TokKind::Struct,
        "range" => TokKind::Range,
        "map" => TokKind::Map,
        "break" => TokKind::Break,
        "continue" => TokKind::Continue,
        _ => return None,
    })
}

/// Does Go's automatic semicolon insertion fire after a token of this kind?
fn inserts_semi(kind: TokKind) -> bool {
    matches!(
        kind,
        TokKind::Ident
            | TokKind::Int
            | TokKind::Float
            | TokKind::Str
            | TokKind::Char
            | TokKind::RParen
            | TokKind::RBrace
            | TokKind::RBrack
            | TokKind::Inc
            | TokKind::Dec
            | TokKind::Return
            | TokKind::Break
            | TokKind::Continue
    )
}

/// Scan `source` into a token stream with comment and blank-line trivia
/// attached, applying Go's semicolon insertion rule at line ends.
pub fn scan(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    col: usize,
    toks: Vec<Token>,
    pending_comments: Vec<String>,
    pending_blank: bool,
    /// Newlines seen since the last token or comment.
    newlines: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            line: 1,
            col: 1,
            toks: Vec::new(),
            pending_comments: Vec::new(),
            pending_blank: false,
            newlines: 0,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn last_kind(&self) -> Option<TokKind> {
        self.toks.last().map(|t| t.kind)
    }

    fn push(&mut self, kind: TokKind, text: impl Into<String>, line: usize, col: usize) {
        let comments = std::mem::take(&mut self.pending_comments);
        let blank_before = std::mem::take(&mut self.pending_blank);
        self.toks.push(Token {
            kind,
            text: text.into(),
            line,
            col,
            comments,
            blank_before,
            trailing: None,
        });
    }

    fn handle_newline(&mut self) {
        if self.newlines == 0
            && let Some(kind) = self.last_kind()
            && inserts_semi(kind)
        {
            let (line, col) = (self.line, self.col);
            self.push(TokKind::Semi, ";", line, col);
            self.newlines = 1;
            return;
        }
        self.newlines += 1;
        if self.newlines >= 2 {
            self.pending_blank = true;
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => {
                    self.handle_newline();
                    self.bump();
                }
                '/' => {
                    let (line, col) = (self.line, self.col);
                    self.bump();
                    match self.peek() {
                        Some('/') => {
                            // Line comment: on its own line it pends for the
                            // next token, on a code line it trails the last.
                            self.bump();
                            let mut text = String::from("//");
                            while let Some(c) = self.peek() {
                                if c == '\n' {
                                    break;
                                }
                                text.push(c);
                                self.bump();
                            }
                            let text = text.trim_end().to_string();
                            if self.newlines == 0 && !self.toks.is_empty() {
                                if let Some(last) = self.toks.last_mut() {
                                    last.trailing = Some(text);
                                }
                            } else {
                                self.pending_comments.push(text);
                                self.newlines = 0;
                            }
                        }
                        Some('=') => {
                            self.bump();
                            self.push(TokKind::OpAssign, "/=", line, col);
                            self.newlines = 0;
                        }
                        _ => {
                            self.push(TokKind::Op, "/", line, col);
                            self.newlines = 0;
                        }
                    }
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let (line, col) = (self.line, self.col);
                    let mut word = String::new();
                    while let Some(c) = self.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            word.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let kind = keyword_kind(&word).unwrap_or(TokKind::Ident);
                    self.push(kind, word, line, col);
                    self.newlines = 0;
                }
                c if c.is_ascii_digit() => {
                    let (line, col) = (self.line, self.col);
                    let mut num = String::new();
                    let mut is_float = false;
                    while let Some(c) = self.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            num.push(c);
                            self.bump();
                        } else if c == '.' {
                            // Lookahead would be needed to distinguish a
                            // method call on a literal; Go forbids that form
                            // without parens, so a dot always extends the
                            // number here.
                            is_float = true;
                            num.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let kind = if is_float { TokKind::Float } else { TokKind::Int };
                    self.push(kind, num, line, col);
                    self.newlines = 0;
                }
                '"' => {
                    let (line, col) = (self.line, self.col);
                    let mut text = String::from("\"");
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\\') => {
                                text.push('\\');
                                if let Some(esc) = self.bump() {
                                    text.push(esc);
                                }
                            }
                            Some('"') => {
                                text.push('"');
                                break;
                            }
                            Some('\n') | None => {
                                return Err(SyntaxError::new(
                                    line,
                                    col,
                                    "unterminated string literal",
                                ));
                            }
                            Some(c) => text.push(c),
                        }
                    }
                    self.push(TokKind::Str, text, line, col);
                    self.newlines = 0;
                }
                '`' => {
                    let (line, col) = (self.line, self.col);
                    let mut text = String::from("`");
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('`') => {
                                text.push('`');
                                break;
                            }
                            None => {
                                return Err(SyntaxError::new(
                                    line,
                                    col,
                                    "unterminated raw string literal",
                                ));
                            }
                            Some(c) => text.push(c),
                        }
                    }
                    self.push(TokKind::Str, text, line, col);
                    self.newlines = 0;
                }
                '\'' => {
                    let (line, col) = (self.line, self.col);
                    let mut text = String::from("'");
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\\') => {
                                text.push('\\');
                                if let Some(esc) = self.bump() {
                                    text.push(esc);
                                }
                            }
                            Some('\'') => {
                                text.push('\'');
                                break;
                            }
                            Some('\n') | None => {
                                return Err(SyntaxError::new(line, col, "unterminated rune literal"));
                            }
                            Some(c) => text.push(c),
                        }
                    }
                    self.push(TokKind::Char, text, line, col);
                    self.newlines = 0;
                }
                _ => {
                    self.scan_operator()?;
                }
            }
        }
        // Final semicolon for a file that does not end in a newline.
        if let Some(kind) = self.last_kind()
            && self.newlines == 0
            && inserts_semi(kind)
        {
            let (line, col) = (self.line, self.col);
            self.push(TokKind::Semi, ";", line, col);
        }
        let (line, col) = (self.line, self.col);
        self.push(TokKind::Eof, "", line, col);
        Ok(self.toks)
    }

    fn scan_operator(&mut self) -> Result<(), SyntaxError> {
        let (line, col) = (self.line, self.col);
        let c = self.bump().expect("caller peeked");
        let next = self.peek();
        let (kind, text): (TokKind, String) = match (c, next) {
            ('(', _) => (TokKind::LParen, "(".into()),
            (')', _) => (TokKind::RParen, ")".into()),
            ('{', _) => (TokKind::LBrace, "{".into()),
            ('}', _) => (TokKind::RBrace, "}".into()),
            ('[', _) => (TokKind::LBrack, "[".into()),
            (']', _) => (TokKind::RBrack, "]".into()),
            (',', _) => (TokKind::Comma, ",".into()),
            (';', _) => (TokKind::Semi, ";".into()),
            ('.', _) => (TokKind::Dot, ".".into()),
            (':', Some('=')) => {
                self.bump();
                (TokKind::Define, ":=".into())
            }
            (':', _) => (TokKind::Colon, ":".into()),
            ('=', Some('=')) => {
                self.bump();
                (TokKind::Op, "==".into())
            }
            ('=', _) => (TokKind::Assign, "=".into()),
            ('!', Some('=')) => {
                self.bump();
                (TokKind::Op, "!=".into())
            }
            ('!', _) => (TokKind::Op, "!".into()),
            ('<', Some('=')) => {
                self.bump();
                (TokKind::Op, "<=".into())
            }
            ('<', Some('-')) => {
                self.bump();
                (TokKind::Op, "<-".into())
            }
            ('<', _) => (TokKind::Op, "<".into()),
            ('>', Some('=')) => {
                self.bump();
                (TokKind::Op, ">=".into())
            }
            ('>', _) => (TokKind::Op, ">".into()),
            ('+', Some('+')) => {
                self.bump();
                (TokKind::Inc, "++".into())
            }
            ('+', Some('=')) => {
                self.bump();
                (TokKind::OpAssign, "+=".into())
            }
            ('+', _) => (TokKind::Op, "+".into()),
            ('-', Some('-')) => {
                self.bump();
                (TokKind::Dec, "--".into())
            }
            ('-', Some('=')) => {
                self.bump();
                (TokKind::OpAssign, "-=".into())
            }
            ('-', _) => (TokKind::Op, "-".into()),
            ('*', Some('=')) => {
                self.bump();
                (TokKind::OpAssign, "*=".into())
            }
            ('*', _) => (TokKind::Op, "*".into()),
            ('%', _) => (TokKind::Op, "%".into()),
            ('&', Some('&')) => {
                self.bump();
                (TokKind::Op, "&&".into())
            }
            ('&', _) => (TokKind::Op, "&".into()),
            ('|', Some('|')) => {
                self.bump();
                (TokKind::Op, "||".into())
            }
            ('|', _) => (TokKind::Op, "|".into()),
            ('^', _) => (TokKind::Op, "^".into()),
            _ => {
                return Err(SyntaxError::new(
                    line,
                    col,
                    format!("unexpected character '{c}'"),
                ));
            }
        };
        self.push(kind, text, line, col);
        self.newlines = 0;
        Ok(())
    }
}
