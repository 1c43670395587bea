use crate::error::Error;

use super::ast::{Literal, Node};
use super::lexer::Lexer;
use super::tokens::{Token, TokenKind};

/// `schema := '[' assignment* ']'`
/// `assignment := IDENT '>' rhs`
/// `rhs := LITERAL | schema`
pub struct Parser {
    tokens: std::vec::IntoIter<Token>,
    current: Token,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut tokens = tokens.into_iter();
        let current = tokens.next().unwrap_or_else(Token::eof);
        Self { tokens, current }
    }

    pub fn from_str(input: &str) -> Result<Self, Error> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self::new(tokens))
    }

    pub fn parse(&mut self) -> Result<Node, Error> {
        self.parse_schema()
    }

    fn parse_schema(&mut self) -> Result<Node, Error> {
        if self.current.kind != TokenKind::LBracket {
            return Err(Error::protocol(format!(
                "expected '[', got {}",
                self.current.kind.as_str()
            )));
        }
        self.advance();

        let mut body = Vec::new();
        while self.current.kind != TokenKind::Eof && self.current.kind != TokenKind::RBracket {
            body.push(self.parse_assignment()?);
        }

        if self.current.kind != TokenKind::RBracket {
            return Err(Error::protocol(format!(
                "expected ']', got {}",
                self.current.kind.as_str()
            )));
        }
        self.advance();

        Ok(Node::Schema(body))
    }

    fn parse_assignment(&mut self) -> Result<Node, Error> {
        if self.current.kind != TokenKind::Identifier {
            return Err(Error::protocol(format!(
                "expected identifier, got {}",
                self.current.kind.as_str()
            )));
        }
        let name = self.current.value.clone();
        self.advance();

        if self.current.kind != TokenKind::RightArrow {
            return Err(Error::protocol(format!(
                "expected '>', got {}",
                self.current.kind.as_str()
            )));
        }
        self.advance();

        let value = match self.current.kind {
            TokenKind::Literal => {
                let lit = Literal::from_keyword(&self.current.value)
                    .ok_or_else(|| Error::protocol(format!("unsupported literal: {}", self.current.value)))?;
                self.advance();
                Node::Literal(lit)
            }
            TokenKind::LBracket => self.parse_schema()?,
            _ => {
                return Err(Error::protocol(format!(
                    "expected literal or nested schema, got {}",
                    self.current.kind.as_str()
                )))
            }
        };

        Ok(Node::Assign {
            name,
            value: Box::new(value),
        })
    }

    fn advance(&mut self) {
        self.current = self.tokens.next().unwrap_or_else(Token::eof);
    }
}

pub fn parse(input: &str) -> Result<Node, Error> {
    Parser::from_str(input)?.parse()
}
