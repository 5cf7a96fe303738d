use crate::error::CalcError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// The input is exhausted.
    End,
    /// `;` or a newline. Statements never span separators.
    Separator,
    Number(f64),
    Name(String),
    /// `$name`: a function definition or call, depending on whether the
    /// name is already registered.
    Func(String),
    /// The raw text captured between `{` and `}`, never parsed here.
    Body(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Equal,
    LeftParen,
    RightParen,
    Comma,
    RightBrace,
}

/// Demand-driven lexer over an owned source string. The evaluator owns the
/// single current token; nothing is tokenized ahead of time, which is what
/// lets a function call swap in a different source mid-run.
pub struct Lexer {
    whole: String,
    byte: usize,
    peeked: Option<Result<Token, CalcError>>,
}

impl Lexer {
    pub fn new(input: impl Into<String>) -> Self {
        Lexer {
            whole: input.into(),
            byte: 0,
            peeked: None,
        }
    }

    /// Pulls the next token. An unrecognized character is reported as an
    /// error; the caller substitutes a separator to resynchronize at the
    /// next statement.
    pub fn next_token(&mut self) -> Result<Token, CalcError> {
        if let Some(peeked) = self.peeked.take() {
            return peeked;
        }
        self.scan()
    }

    /// Looks at the next token without consuming it.
    pub fn peek(&mut self) -> &Result<Token, CalcError> {
        if self.peeked.is_none() {
            let token = self.scan();
            self.peeked = Some(token);
        }
        self.peeked.as_ref().expect("peeked token")
    }

    fn scan(&mut self) -> Result<Token, CalcError> {
        loop {
            let rest = &self.whole[self.byte..];
            let mut chars = rest.chars();
            let Some(c) = chars.next() else {
                return Ok(Token::End);
            };
            self.byte += c.len_utf8();

            match c {
                ' ' | '\r' | '\t' => continue,
                '\n' | ';' => return Ok(Token::Separator),
                '+' => return Ok(Token::Plus),
                '-' => return Ok(Token::Minus),
                '*' => return Ok(Token::Star),
                '/' => return Ok(Token::Slash),
                '^' => return Ok(Token::Caret),
                '=' => return Ok(Token::Equal),
                '(' => return Ok(Token::LeftParen),
                ')' => return Ok(Token::RightParen),
                ',' => return Ok(Token::Comma),
                '}' => return Ok(Token::RightBrace),
                '0'..='9' | '.' => return self.number(c),
                '$' => return Ok(self.func_ref()),
                '{' => return Ok(self.body()),
                'a'..='z' | 'A'..='Z' => return Ok(Token::Name(self.ident(c))),
                c => return Err(CalcError::BadToken { token: c }),
            }
        }
    }

    /// Maximal run of letters, digits, and underscores starting at the
    /// already-consumed `first`.
    fn ident(&mut self, first: char) -> String {
        let start = self.byte - first.len_utf8();
        let rest = &self.whole[start..];
        let end = rest
            .find(|c: char| !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_'))
            .unwrap_or(rest.len());
        self.byte = start + end;
        rest[..end].to_string()
    }

    /// A `$` not followed by a letter ends the input outright instead of
    /// erroring. Longstanding quirk, kept as-is.
    fn func_ref(&mut self) -> Token {
        let mut chars = self.whole[self.byte..].chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {
                self.byte += c.len_utf8();
                Token::Func(self.ident(c))
            }
            _ => Token::End,
        }
    }

    /// Captures everything up to the first `}` as a literal string. No
    /// nesting, no escapes; a missing `}` captures to end of input.
    fn body(&mut self) -> Token {
        let rest = &self.whole[self.byte..];
        match rest.find('}') {
            Some(end) => {
                let body = rest[..end].to_string();
                self.byte += end + 1;
                Token::Body(body)
            }
            None => {
                let body = rest.to_string();
                self.byte = self.whole.len();
                Token::Body(body)
            }
        }
    }

    /// Standard float grammar: digits, at most one `.`, and an exponent
    /// only when digits actually follow it.
    fn number(&mut self, first: char) -> Result<Token, CalcError> {
        let start = self.byte - first.len_utf8();
        let rest = &self.whole[start..];
        let bytes = rest.as_bytes();
        let mut seen_dot = first == '.';
        let mut end = first.len_utf8();

        while end < bytes.len() {
            match bytes[end] {
                b'0'..=b'9' => end += 1,
                b'.' if !seen_dot => {
                    seen_dot = true;
                    end += 1;
                }
                _ => break,
            }
        }

        if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
            let mut exp = end + 1;
            if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
                exp += 1;
            }
            if exp < bytes.len() && bytes[exp].is_ascii_digit() {
                end = exp + 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
            }
        }

        let literal = &rest[..end];
        self.byte = start + end;
        match literal.parse() {
            Ok(n) => Ok(Token::Number(n)),
            // A lone `.` scans to a literal no float grammar accepts.
            Err(_) => Err(CalcError::BadToken { token: first }),
        }
    }
}
