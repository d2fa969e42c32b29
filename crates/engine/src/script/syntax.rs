//! Parser for the reference script language.
//!
//! ```text
//! script     = sep* (statement (sep+ statement)*)? sep*
//! statement  = "throw" list? | variable assign-op pipeline | pipeline
//! pipeline   = segment ("|" segment)*
//! segment    = word argument* | list
//! argument   = param value? | value
//! value      = unary ("," unary)*
//! list       = additive ("," additive)*
//! additive   = term (("+" | "-") term)*
//! term       = unary (("*" | "/") unary)*
//! unary      = "-" unary | primary
//! primary    = int | float | string | variable | word | "(" pipeline ")"
//! ```
//!
//! A segment that starts with a bareword is a command call. `$null`, `$true`
//! and `$false` are literals.

use super::lexer::{AssignOp, Spanned, Token, tokenize};
use crate::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyntaxError {
	pub message: String,
	pub line: u32,
	pub column: u32,
}

#[derive(Debug)]
pub(crate) struct Script {
	pub statements: Vec<Statement>,
}

#[derive(Debug)]
pub(crate) struct Statement {
	pub line: u32,
	pub column: u32,
	pub kind: StatementKind,
}

#[derive(Debug)]
pub(crate) enum StatementKind {
	Assign { name: String, op: AssignOp, value: PipelineExpr },
	Throw(Option<Expr>),
	Pipeline(PipelineExpr),
}

#[derive(Debug)]
pub(crate) struct PipelineExpr {
	pub segments: Vec<Segment>,
}

#[derive(Debug)]
pub(crate) enum Segment {
	Expr(Expr),
	Call(Call),
}

#[derive(Debug)]
pub(crate) struct Call {
	pub name: String,
	pub args: Vec<Arg>,
}

#[derive(Debug)]
pub(crate) enum Arg {
	Named(String, Option<Expr>),
	Positional(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
	Add,
	Sub,
	Mul,
	Div,
}

#[derive(Debug)]
pub(crate) enum Expr {
	Literal(Value),
	Variable(String),
	Binary(Box<Expr>, BinOp, Box<Expr>),
	Negate(Box<Expr>),
	List(Vec<Expr>),
	Sub(Box<PipelineExpr>),
}

pub(crate) fn parse(src: &str) -> Result<Script, SyntaxError> {
	let tokens = tokenize(src)?;
	Parser { tokens, pos: 0 }.script()
}

struct Parser {
	tokens: Vec<Spanned>,
	pos: usize,
}

impl Parser {
	fn peek(&self) -> &Token {
		&self.current().token
	}

	fn peek_at(&self, n: usize) -> &Token {
		self.tokens.get(self.pos + n).map_or(&Token::Eof, |s| &s.token)
	}

	fn current(&self) -> &Spanned {
		// The lexer always terminates the stream with Eof.
		&self.tokens[self.pos.min(self.tokens.len() - 1)]
	}

	fn advance(&mut self) -> Token {
		let token = self.current().token.clone();
		if self.pos < self.tokens.len() - 1 {
			self.pos += 1;
		}
		token
	}

	fn unexpected(&self) -> SyntaxError {
		let current = self.current();
		SyntaxError {
			message: format!("unexpected token '{}'", current.token.describe()),
			line: current.line,
			column: current.column,
		}
	}

	fn skip_separators(&mut self) {
		while matches!(self.peek(), Token::Separator) {
			self.advance();
		}
	}

	fn script(mut self) -> Result<Script, SyntaxError> {
		let mut statements = Vec::new();
		self.skip_separators();
		while !matches!(self.peek(), Token::Eof) {
			statements.push(self.statement()?);
			match self.peek() {
				Token::Separator => self.skip_separators(),
				Token::Eof => {}
				_ => return Err(self.unexpected()),
			}
		}
		Ok(Script { statements })
	}

	fn statement(&mut self) -> Result<Statement, SyntaxError> {
		let (line, column) = (self.current().line, self.current().column);
		let assign = match self.peek_at(1) {
			Token::Assign(op) => Some(*op),
			_ => None,
		};
		let kind = match (self.peek().clone(), assign) {
			(Token::Word(word), _) if word.eq_ignore_ascii_case("throw") => {
				self.advance();
				let value = if ends_statement(self.peek()) { None } else { Some(self.list()?) };
				StatementKind::Throw(value)
			}
			(Token::Variable(name), Some(op)) => {
				self.advance();
				self.advance();
				StatementKind::Assign {
					name,
					op,
					value: self.pipeline()?,
				}
			}
			_ => StatementKind::Pipeline(self.pipeline()?),
		};
		Ok(Statement { line, column, kind })
	}

	fn pipeline(&mut self) -> Result<PipelineExpr, SyntaxError> {
		let mut segments = vec![self.segment()?];
		while matches!(self.peek(), Token::Pipe) {
			self.advance();
			segments.push(self.segment()?);
		}
		Ok(PipelineExpr { segments })
	}

	fn segment(&mut self) -> Result<Segment, SyntaxError> {
		let Token::Word(name) = self.peek().clone() else {
			return self.list().map(Segment::Expr);
		};
		self.advance();
		let mut args = Vec::new();
		while !ends_segment(self.peek()) {
			if let Token::Param(param) = self.peek().clone() {
				self.advance();
				let value = if ends_segment(self.peek()) || matches!(self.peek(), Token::Param(_)) {
					None
				} else {
					Some(self.value()?)
				};
				args.push(Arg::Named(param, value));
			} else {
				args.push(Arg::Positional(self.value()?));
			}
		}
		Ok(Segment::Call(Call { name, args }))
	}

	fn value(&mut self) -> Result<Expr, SyntaxError> {
		self.comma_list(Self::unary)
	}

	fn list(&mut self) -> Result<Expr, SyntaxError> {
		self.comma_list(Self::additive)
	}

	fn comma_list(&mut self, item: fn(&mut Self) -> Result<Expr, SyntaxError>) -> Result<Expr, SyntaxError> {
		let first = item(self)?;
		if !matches!(self.peek(), Token::Comma) {
			return Ok(first);
		}
		let mut items = vec![first];
		while matches!(self.peek(), Token::Comma) {
			self.advance();
			items.push(item(self)?);
		}
		Ok(Expr::List(items))
	}

	fn additive(&mut self) -> Result<Expr, SyntaxError> {
		let mut lhs = self.term()?;
		loop {
			let op = match self.peek() {
				Token::Plus => BinOp::Add,
				Token::Minus => BinOp::Sub,
				_ => return Ok(lhs),
			};
			self.advance();
			lhs = Expr::Binary(Box::new(lhs), op, Box::new(self.term()?));
		}
	}

	fn term(&mut self) -> Result<Expr, SyntaxError> {
		let mut lhs = self.unary()?;
		loop {
			let op = match self.peek() {
				Token::Star => BinOp::Mul,
				Token::Slash => BinOp::Div,
				_ => return Ok(lhs),
			};
			self.advance();
			lhs = Expr::Binary(Box::new(lhs), op, Box::new(self.unary()?));
		}
	}

	fn unary(&mut self) -> Result<Expr, SyntaxError> {
		if matches!(self.peek(), Token::Minus) {
			self.advance();
			return Ok(Expr::Negate(Box::new(self.unary()?)));
		}
		self.primary()
	}

	fn primary(&mut self) -> Result<Expr, SyntaxError> {
		let expr = match self.peek().clone() {
			Token::Int(v) => Expr::Literal(Value::Int(v)),
			Token::Float(v) => Expr::Literal(Value::Float(v)),
			Token::Str(s) | Token::Word(s) => Expr::Literal(Value::String(s)),
			Token::Variable(name) => match name.to_ascii_lowercase().as_str() {
				"null" => Expr::Literal(Value::Null),
				"true" => Expr::Literal(Value::Bool(true)),
				"false" => Expr::Literal(Value::Bool(false)),
				_ => Expr::Variable(name),
			},
			Token::LParen => {
				self.advance();
				let inner = self.pipeline()?;
				if !matches!(self.peek(), Token::RParen) {
					return Err(self.unexpected());
				}
				Expr::Sub(Box::new(inner))
			}
			_ => return Err(self.unexpected()),
		};
		self.advance();
		Ok(expr)
	}
}

fn ends_statement(token: &Token) -> bool {
	matches!(token, Token::Separator | Token::Eof)
}

fn ends_segment(token: &Token) -> bool {
	matches!(token, Token::Separator | Token::Eof | Token::Pipe | Token::RParen)
}
