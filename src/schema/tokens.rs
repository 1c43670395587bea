#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenKind {
    LBracket,
    RBracket,
    RightArrow,
    Identifier,
    Literal,
    Eof,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::RightArrow => ">",
            TokenKind::Identifier => "identifier",
            TokenKind::Literal => "literal",
            TokenKind::Eof => "EOF",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn eof() -> Self {
        Self::new(TokenKind::Eof, "")
    }
}

pub fn keyword(ident: &str) -> Option<TokenKind> {
    match ident {
        "int" | "str" => Some(TokenKind::Literal),
        _ => None,
    }
}
