use crate::error::Error;

use super::tokens::{keyword, Token, TokenKind};

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, Error> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        self.skip_whitespace();

        let Some(&c) = self.chars.peek() else {
            return Ok(Token::eof());
        };

        match c {
            '[' => {
                self.chars.next();
                Ok(Token::new(TokenKind::LBracket, "["))
            }
            ']' => {
                self.chars.next();
                Ok(Token::new(TokenKind::RBracket, "]"))
            }
            '>' => {
                self.chars.next();
                Ok(Token::new(TokenKind::RightArrow, ">"))
            }
            c if is_identifier_char(c) => Ok(self.read_identifier()),
            c => Err(Error::protocol(format!("unexpected token: {c}"))),
        }
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(&c) = self.chars.peek() {
            if !is_identifier_char(c) {
                break;
            }
            ident.push(c);
            self.chars.next();
        }
        let kind = keyword(&ident).unwrap_or(TokenKind::Identifier);
        Token::new(kind, ident)
    }

    fn skip_whitespace(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.chars.next();
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_flat_schema() {
        let tokens = Lexer::new("[ x > str ]").tokenize().unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::LBracket,
                TokenKind::Identifier,
                TokenKind::RightArrow,
                TokenKind::Literal,
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_unknown_character() {
        assert!(Lexer::new("[ x > $ ]").tokenize().is_err());
    }

    #[test]
    fn identifiers_allow_unicode_letters_and_underscore() {
        let tokens = Lexer::new("naïve_field").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].value, "naïve_field");
    }
}
