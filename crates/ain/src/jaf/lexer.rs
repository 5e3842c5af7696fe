//! JAF lexer (spec §4.3): C-style tokens, wide (SJIS two-byte) identifiers
//! are accepted as-is since source is handled as UTF-8 throughout (spec §9
//! "Iconv" — conversion happens at the process boundary, not here), string
//! literals support backslash escapes and are implicitly concatenated when
//! adjacent.

use crate::error::Span;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    IntLit(i32),
    LongLit(i64),
    FloatLit(f32),
    StringLit(String),

    // keywords
    KwVoid,
    KwInt,
    KwLongInt,
    KwBool,
    KwFloat,
    KwString,
    KwStruct,
    KwInterface,
    KwEnum,
    KwFunctype,
    KwDelegate,
    KwThis,
    KwSuper,
    KwNull,
    KwNew,
    KwAssert,
    KwRef,
    KwConst,
    KwOverride,
    KwIf,
    KwElse,
    KwWhile,
    KwDo,
    KwFor,
    KwSwitch,
    KwCase,
    KwDefault,
    KwBreak,
    KwContinue,
    KwReturn,
    KwGoto,
    KwTrue,
    KwFalse,
    KwArray,

    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Colon,
    ColonColon,
    Question,
    Dot,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    Bang,
    Tilde,
    Plus,
    PlusPlus,
    Minus,
    MinusMinus,
    Star,
    Slash,
    Percent,
    Eq,
    EqEq,
    BangEq,
    Lt,
    Lte,
    Gt,
    Gte,
    LtLt,
    GtGt,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    RefEq,
    RefBangEq,
    LArrow,
    Eof,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    pub line: u32,
    file: crate::Str,
}

fn keyword(word: &str) -> Option<Tok> {
    use Tok::*;
    Some(match word {
        "void" => KwVoid,
        "int" => KwInt,
        "long_int" => KwLongInt,
        "bool" => KwBool,
        "float" => KwFloat,
        "string" => KwString,
        "struct" => KwStruct,
        "interface" => KwInterface,
        "enum" => KwEnum,
        "functype" => KwFunctype,
        "delegate" => KwDelegate,
        "this" => KwThis,
        "super" => KwSuper,
        "null" => KwNull,
        "new" => KwNew,
        "assert" => KwAssert,
        "ref" => KwRef,
        "const" => KwConst,
        "override" => KwOverride,
        "if" => KwIf,
        "else" => KwElse,
        "while" => KwWhile,
        "do" => KwDo,
        "for" => KwFor,
        "switch" => KwSwitch,
        "case" => KwCase,
        "default" => KwDefault,
        "break" => KwBreak,
        "continue" => KwContinue,
        "return" => KwReturn,
        "goto" => KwGoto,
        "true" => KwTrue,
        "false" => KwFalse,
        "array" => KwArray,
        _ => return None,
    })
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, file: impl Into<crate::Str>) -> Self {
        Lexer {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            file: file.into(),
        }
    }

    fn span(&self) -> Span {
        Span::new(self.file.clone(), self.line)
    }

    fn peek(&self) -> u8 {
        self.src.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, off: usize) -> u8 {
        self.src.get(self.pos + off).copied().unwrap_or(0)
    }

    fn bump(&mut self) -> u8 {
        let b = self.peek();
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        b
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while self.peek() != b'\n' && self.peek() != 0 {
                        self.bump();
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    self.bump();
                    self.bump();
                    loop {
                        if self.peek() == 0 {
                            return Err(Error::invalid_input("unterminated block comment"));
                        }
                        if self.peek() == b'*' && self.peek_at(1) == b'/' {
                            self.bump();
                            self.bump();
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn lex_string(&mut self) -> Result<String> {
        self.bump(); // opening quote
        let mut out = String::new();
        loop {
            match self.peek() {
                0 => return Err(Error::invalid_input("unterminated string literal")),
                b'"' => {
                    self.bump();
                    break;
                }
                b'\\' => {
                    self.bump();
                    let esc = self.bump();
                    out.push(match esc {
                        b'n' => '\n',
                        b't' => '\t',
                        b'r' => '\r',
                        b'0' => '\0',
                        b'\\' => '\\',
                        b'"' => '"',
                        other => other as char,
                    });
                }
                _ => {
                    // Pull a full UTF-8 scalar, not just one byte, so wide
                    // (SJIS-origin, UTF-8-in-memory) text round-trips.
                    let start = self.pos;
                    let b0 = self.bump();
                    let extra = utf8_extra_bytes(b0);
                    for _ in 0..extra {
                        self.bump();
                    }
                    out.push_str(std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("?"));
                }
            }
        }
        Ok(out)
    }

    fn next_raw(&mut self) -> Result<(Span, Tok)> {
        self.skip_trivia()?;
        let at = self.span();
        let c = self.peek();
        if c == 0 {
            return Ok((at, Tok::Eof));
        }
        if c.is_ascii_digit() {
            return Ok((at, self.lex_number()?));
        }
        if c == b'"' {
            let mut s = self.lex_string()?;
            // Implicit string literal concatenation (spec §4.3).
            loop {
                let save = self.pos;
                let save_line = self.line;
                self.skip_trivia()?;
                if self.peek() == b'"' {
                    s.push_str(&self.lex_string()?);
                } else {
                    self.pos = save;
                    self.line = save_line;
                    break;
                }
            }
            return Ok((at, Tok::StringLit(s)));
        }
        if c.is_ascii_alphabetic() || c == b'_' || c >= 0x80 {
            let start = self.pos;
            while {
                let b = self.peek();
                b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
            } {
                self.bump();
            }
            let word = std::str::from_utf8(&self.src[start..self.pos])
                .map_err(|e| Error::Utf8(e.utf8_error()))?
                .to_string();
            return Ok((at, keyword(&word).unwrap_or(Tok::Ident(word))));
        }

        macro_rules! two {
            ($second:expr, $if_match:expr, $otherwise:expr) => {{
                self.bump();
                if self.peek() == $second {
                    self.bump();
                    $if_match
                } else {
                    $otherwise
                }
            }};
        }

        let tok = match c {
            b'(' => {
                self.bump();
                Tok::LParen
            }
            b')' => {
                self.bump();
                Tok::RParen
            }
            b'{' => {
                self.bump();
                Tok::LBrace
            }
            b'}' => {
                self.bump();
                Tok::RBrace
            }
            b'[' => {
                self.bump();
                Tok::LBracket
            }
            b']' => {
                self.bump();
                Tok::RBracket
            }
            b';' => {
                self.bump();
                Tok::Semi
            }
            b',' => {
                self.bump();
                Tok::Comma
            }
            b':' => two!(b':', Tok::ColonColon, Tok::Colon),
            b'?' => {
                self.bump();
                Tok::Question
            }
            b'.' => {
                self.bump();
                Tok::Dot
            }
            b'~' => {
                self.bump();
                Tok::Tilde
            }
            b'^' => two!(b'=', Tok::CaretEq, Tok::Caret),
            b'&' => {
                self.bump();
                match self.peek() {
                    b'&' => {
                        self.bump();
                        Tok::AmpAmp
                    }
                    b'=' => {
                        self.bump();
                        Tok::AmpEq
                    }
                    _ => Tok::Amp,
                }
            }
            b'|' => {
                self.bump();
                match self.peek() {
                    b'|' => {
                        self.bump();
                        Tok::PipePipe
                    }
                    b'=' => {
                        self.bump();
                        Tok::PipeEq
                    }
                    _ => Tok::Pipe,
                }
            }
            b'!' => {
                self.bump();
                match self.peek() {
                    b'=' if self.peek_at(1) == b'=' => {
                        self.bump();
                        self.bump();
                        Tok::RefBangEq
                    }
                    b'=' => {
                        self.bump();
                        Tok::BangEq
                    }
                    _ => Tok::Bang,
                }
            }
            b'+' => {
                self.bump();
                match self.peek() {
                    b'+' => {
                        self.bump();
                        Tok::PlusPlus
                    }
                    b'=' => {
                        self.bump();
                        Tok::PlusEq
                    }
                    _ => Tok::Plus,
                }
            }
            b'-' => {
                self.bump();
                match self.peek() {
                    b'-' => {
                        self.bump();
                        Tok::MinusMinus
                    }
                    b'=' => {
                        self.bump();
                        Tok::MinusEq
                    }
                    _ => Tok::Minus,
                }
            }
            b'*' => two!(b'=', Tok::StarEq, Tok::Star),
            b'/' => two!(b'=', Tok::SlashEq, Tok::Slash),
            b'%' => two!(b'=', Tok::PercentEq, Tok::Percent),
            b'=' => {
                self.bump();
                match self.peek() {
                    b'=' if self.peek_at(1) == b'=' => {
                        self.bump();
                        self.bump();
                        Tok::RefEq
                    }
                    b'=' => {
                        self.bump();
                        Tok::EqEq
                    }
                    _ => Tok::Eq,
                }
            }
            b'<' => {
                self.bump();
                match self.peek() {
                    b'=' => {
                        self.bump();
                        Tok::Lte
                    }
                    b'<' => {
                        self.bump();
                        Tok::LtLt
                    }
                    b'-' => {
                        self.bump();
                        Tok::LArrow
                    }
                    _ => Tok::Lt,
                }
            }
            b'>' => {
                self.bump();
                match self.peek() {
                    b'=' => {
                        self.bump();
                        Tok::Gte
                    }
                    b'>' => {
                        self.bump();
                        Tok::GtGt
                    }
                    _ => Tok::Gt,
                }
            }
            other => {
                return Err(Error::invalid_input(format!("unexpected character '{}'", other as char)));
            }
        };
        Ok((at, tok))
    }

    pub fn tokenize(mut self) -> Result<Vec<(Span, Tok)>> {
        let mut out = Vec::new();
        loop {
            let (span, tok) = self.next_raw()?;
            let is_eof = tok == Tok::Eof;
            out.push((span, tok));
            if is_eof {
                break;
            }
        }
        Ok(out)
    }

    fn lex_number(&mut self) -> Result<Tok> {
        let start = self.pos;
        if self.peek() == b'0' && (self.peek_at(1) == b'x' || self.peek_at(1) == b'X') {
            self.bump();
            self.bump();
            while self.peek().is_ascii_hexdigit() {
                self.bump();
            }
            let text = std::str::from_utf8(&self.src[start + 2..self.pos]).unwrap();
            let v = i64::from_str_radix(text, 16).map_err(|_| Error::invalid_input("bad hex literal"))?;
            return Ok(Tok::IntLit(v as i32));
        }
        let mut is_float = false;
        while self.peek().is_ascii_digit() {
            self.bump();
        }
        if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
            is_float = true;
            self.bump();
            while self.peek().is_ascii_digit() {
                self.bump();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        if is_float {
            if self.peek() == b'f' || self.peek() == b'F' {
                self.bump();
            }
            return Ok(Tok::FloatLit(
                text.parse().map_err(|_| Error::invalid_input("bad float literal"))?,
            ));
        }
        if self.peek() == b'L' {
            self.bump();
            return Ok(Tok::LongLit(
                text.parse().map_err(|_| Error::invalid_input("bad integer literal"))?,
            ));
        }
        Ok(Tok::IntLit(
            text.parse().map_err(|_| Error::invalid_input("bad integer literal"))?,
        ))
    }
}

fn utf8_extra_bytes(b0: u8) -> usize {
    if b0 & 0xE0 == 0xC0 {
        1
    } else if b0 & 0xF0 == 0xE0 {
        2
    } else if b0 & 0xF8 == 0xF0 {
        3
    } else {
        0
    }
}
