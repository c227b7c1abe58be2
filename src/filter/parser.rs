use super::FilterError;
use super::lexer::{Spanned, Token};

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Node {
    pub kind: NodeKind,
    pub pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum NodeKind {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Ident(String),
    Select(Box<Node>, String),
    Call {
        target: Option<Box<Node>>,
        function: String,
        args: Vec<Node>,
    },
    Not(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub(super) fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

pub(super) fn parse(tokens: Vec<Spanned>) -> Result<Node, FilterError> {
    let mut parser = Parser { tokens, index: 0 };
    let node = parser.or()?;
    let next = parser.peek();
    if next.token != Token::Eof {
        return Err(FilterError::new(
            format!("unexpected {:?}", next.token),
            next.pos,
        ));
    }
    Ok(node)
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Spanned {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Spanned {
        let spanned = self.peek().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        spanned
    }

    fn eat(&mut self, token: &Token) -> bool {
        if &self.peek().token == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<usize, FilterError> {
        let next = self.advance();
        if next.token == token {
            Ok(next.pos)
        } else {
            Err(FilterError::new(
                format!("expected {token:?}, found {:?}", next.token),
                next.pos,
            ))
        }
    }

    fn or(&mut self) -> Result<Node, FilterError> {
        let mut lhs = self.and()?;
        while self.peek().token == Token::OrOr {
            let pos = self.advance().pos;
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs, pos);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Node, FilterError> {
        let mut lhs = self.relation()?;
        while self.peek().token == Token::AndAnd {
            let pos = self.advance().pos;
            let rhs = self.relation()?;
            lhs = binary(BinaryOp::And, lhs, rhs, pos);
        }
        Ok(lhs)
    }

    fn relation(&mut self) -> Result<Node, FilterError> {
        let lhs = self.unary()?;
        let op = match self.peek().token {
            Token::EqEq => BinaryOp::Eq,
            Token::NotEq => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        let pos = self.advance().pos;
        let rhs = self.unary()?;
        Ok(binary(op, lhs, rhs, pos))
    }

    fn unary(&mut self) -> Result<Node, FilterError> {
        if self.peek().token == Token::Bang {
            let pos = self.advance().pos;
            let operand = self.unary()?;
            return Ok(Node {
                kind: NodeKind::Not(Box::new(operand)),
                pos,
            });
        }
        self.member()
    }

    fn member(&mut self) -> Result<Node, FilterError> {
        let mut node = self.primary()?;
        while self.eat(&Token::Dot) {
            let next = self.advance();
            let Token::Ident(name) = next.token else {
                return Err(FilterError::new("expected field or method name", next.pos));
            };
            if self.eat(&Token::LParen) {
                let args = self.args()?;
                node = Node {
                    kind: NodeKind::Call {
                        target: Some(Box::new(node)),
                        function: name,
                        args,
                    },
                    pos: next.pos,
                };
            } else {
                node = Node {
                    kind: NodeKind::Select(Box::new(node), name),
                    pos: next.pos,
                };
            }
        }
        Ok(node)
    }

    fn primary(&mut self) -> Result<Node, FilterError> {
        let next = self.advance();
        let kind = match next.token {
            Token::Int(value) => NodeKind::Int(value),
            Token::Str(value) => NodeKind::Str(value),
            Token::LParen => {
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                return Ok(inner);
            }
            Token::Ident(name) => {
                let keyword = match name.as_str() {
                    "true" => Some(NodeKind::Bool(true)),
                    "false" => Some(NodeKind::Bool(false)),
                    "null" => Some(NodeKind::Null),
                    _ => None,
                };
                match keyword {
                    Some(kind) => kind,
                    None if self.eat(&Token::LParen) => NodeKind::Call {
                        target: None,
                        function: name,
                        args: self.args()?,
                    },
                    None => NodeKind::Ident(name),
                }
            }
            other => {
                return Err(FilterError::new(format!("unexpected {other:?}"), next.pos));
            }
        };
        Ok(Node {
            kind,
            pos: next.pos,
        })
    }

    /// Parses call arguments after the opening parenthesis.
    fn args(&mut self) -> Result<Vec<Node>, FilterError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.or()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            return Ok(args);
        }
    }
}

fn binary(op: BinaryOp, lhs: Node, rhs: Node, pos: usize) -> Node {
    Node {
        kind: NodeKind::Binary(op, Box::new(lhs), Box::new(rhs)),
        pos,
    }
}
