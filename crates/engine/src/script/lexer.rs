//! Tokenizer for the reference script language.

use super::syntax::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
	Variable(String),
	Int(i64),
	Float(f64),
	Str(String),
	/// Bareword: command name, path or unquoted argument. Backtick escapes are resolved.
	Word(String),
	/// `-Name` in command argument position.
	Param(String),
	Assign(AssignOp),
	Plus,
	Minus,
	Star,
	Slash,
	LParen,
	RParen,
	Pipe,
	Comma,
	/// Newline or `;`.
	Separator,
	Eof,
}

impl Token {
	/// Tokens after which `/` and `.` are operators rather than the start of a path.
	fn ends_value(&self) -> bool {
		matches!(self, Self::Variable(_) | Self::Int(_) | Self::Float(_) | Self::Str(_) | Self::RParen)
	}

	pub(crate) fn describe(&self) -> String {
		match self {
			Self::Variable(name) => format!("${name}"),
			Self::Int(v) => v.to_string(),
			Self::Float(v) => v.to_string(),
			Self::Str(s) => format!("'{s}'"),
			Self::Word(w) => w.clone(),
			Self::Param(p) => format!("-{p}"),
			Self::Assign(op) => op.as_str().to_string(),
			Self::Plus => "+".into(),
			Self::Minus => "-".into(),
			Self::Star => "*".into(),
			Self::Slash => "/".into(),
			Self::LParen => "(".into(),
			Self::RParen => ")".into(),
			Self::Pipe => "|".into(),
			Self::Comma => ",".into(),
			Self::Separator => "end of statement".into(),
			Self::Eof => "end of input".into(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
	Set,
	Add,
	Sub,
	Mul,
	Div,
}

impl AssignOp {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Set => "=",
			Self::Add => "+=",
			Self::Sub => "-=",
			Self::Mul => "*=",
			Self::Div => "/=",
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
	pub token: Token,
	pub line: u32,
	pub column: u32,
}

struct Lexer {
	chars: Vec<char>,
	pos: usize,
	line: u32,
	column: u32,
	tokens: Vec<Spanned>,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>, SyntaxError> {
	let mut lexer = Lexer {
		chars: src.chars().collect(),
		pos: 0,
		line: 1,
		column: 1,
		tokens: Vec::new(),
	};
	lexer.run()?;
	Ok(lexer.tokens)
}

impl Lexer {
	fn peek(&self) -> Option<char> {
		self.chars.get(self.pos).copied()
	}

	fn peek_at(&self, n: usize) -> Option<char> {
		self.chars.get(self.pos + n).copied()
	}

	fn bump(&mut self) -> Option<char> {
		let ch = self.peek()?;
		self.pos += 1;
		if ch == '\n' {
			self.line += 1;
			self.column = 1;
		} else {
			self.column += 1;
		}
		Some(ch)
	}

	fn after_value(&self) -> bool {
		self.tokens.last().is_some_and(|t| t.token.ends_value())
	}

	fn error(&self, message: impl Into<String>, line: u32, column: u32) -> SyntaxError {
		SyntaxError {
			message: message.into(),
			line,
			column,
		}
	}

	fn run(&mut self) -> Result<(), SyntaxError> {
		while let Some(ch) = self.peek() {
			let (line, column) = (self.line, self.column);
			let token = match ch {
				' ' | '\t' | '\r' => {
					self.bump();
					continue;
				}
				'#' => {
					while self.peek().is_some_and(|c| c != '\n') {
						self.bump();
					}
					continue;
				}
				'\n' | ';' => {
					self.bump();
					Token::Separator
				}
				'$' => {
					self.bump();
					let name = self.take_while(|c| c.is_alphanumeric() || c == '_');
					if name.is_empty() {
						return Err(self.error("variable name expected after '$'", line, column));
					}
					Token::Variable(name)
				}
				'0'..='9' => self.number(line, column)?,
				'\'' => self.single_quoted(line, column)?,
				'"' => self.double_quoted(line, column)?,
				'-' => {
					self.bump();
					match self.peek() {
						Some(c) if c.is_alphabetic() => Token::Param(self.take_while(|c| c.is_alphanumeric() || c == '_')),
						Some('=') => {
							self.bump();
							Token::Assign(AssignOp::Sub)
						}
						_ => Token::Minus,
					}
				}
				'+' => self.operator(Token::Plus, AssignOp::Add),
				'*' => self.operator(Token::Star, AssignOp::Mul),
				'/' if self.after_value() => self.operator(Token::Slash, AssignOp::Div),
				'=' => {
					self.bump();
					Token::Assign(AssignOp::Set)
				}
				'(' => {
					self.bump();
					Token::LParen
				}
				')' => {
					self.bump();
					Token::RParen
				}
				'|' => {
					self.bump();
					Token::Pipe
				}
				',' => {
					self.bump();
					Token::Comma
				}
				c if is_word_start(c) => Token::Word(self.word()),
				other => return Err(self.error(format!("unexpected character '{other}'"), line, column)),
			};
			self.tokens.push(Spanned { token, line, column });
		}
		self.tokens.push(Spanned {
			token: Token::Eof,
			line: self.line,
			column: self.column,
		});
		Ok(())
	}

	fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
		let mut out = String::new();
		while let Some(c) = self.peek().filter(|&c| pred(c)) {
			out.push(c);
			self.bump();
		}
		out
	}

	fn operator(&mut self, plain: Token, assign: AssignOp) -> Token {
		self.bump();
		if self.peek() == Some('=') {
			self.bump();
			Token::Assign(assign)
		} else {
			plain
		}
	}

	fn number(&mut self, line: u32, column: u32) -> Result<Token, SyntaxError> {
		let mut text = self.take_while(|c| c.is_ascii_digit());
		if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
			self.bump();
			text.push('.');
			text.push_str(&self.take_while(|c| c.is_ascii_digit()));
			return text
				.parse()
				.map(Token::Float)
				.map_err(|_| self.error(format!("invalid number '{text}'"), line, column));
		}
		text.parse()
			.map(Token::Int)
			.map_err(|_| self.error(format!("integer '{text}' is out of range"), line, column))
	}

	fn single_quoted(&mut self, line: u32, column: u32) -> Result<Token, SyntaxError> {
		self.bump();
		let mut out = String::new();
		loop {
			match self.bump() {
				Some('\'') if self.peek() == Some('\'') => {
					self.bump();
					out.push('\'');
				}
				Some('\'') => return Ok(Token::Str(out)),
				Some(c) => out.push(c),
				None => return Err(self.error("missing closing quote", line, column)),
			}
		}
	}

	fn double_quoted(&mut self, line: u32, column: u32) -> Result<Token, SyntaxError> {
		self.bump();
		let mut out = String::new();
		loop {
			match self.bump() {
				Some('"') => return Ok(Token::Str(out)),
				Some('`') => match self.bump() {
					Some('n') => out.push('\n'),
					Some('t') => out.push('\t'),
					Some(c) => out.push(c),
					None => break,
				},
				Some(c) => out.push(c),
				None => break,
			}
		}
		Err(self.error("missing closing quote", line, column))
	}

	fn word(&mut self) -> String {
		let mut out = String::new();
		while let Some(c) = self.peek() {
			match c {
				'`' => {
					self.bump();
					if let Some(escaped) = self.bump() {
						out.push(escaped);
					}
				}
				c if c.is_whitespace() || matches!(c, ';' | '|' | '(' | ')' | ',' | '\'' | '"') => break,
				c => {
					out.push(c);
					self.bump();
				}
			}
		}
		out
	}
}

fn is_word_start(c: char) -> bool {
	c.is_alphabetic() || matches!(c, '_' | '.' | '/' | '\\' | '~' | '`')
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn tokens(src: &str) -> Vec<Token> {
		tokenize(src).expect("tokenize").into_iter().map(|s| s.token).collect()
	}

	#[test]
	fn compound_assignment_and_division() {
		assert_eq!(
			tokens("$x+=200;$x=$x/100"),
			vec![
				Token::Variable("x".into()),
				Token::Assign(AssignOp::Add),
				Token::Int(200),
				Token::Separator,
				Token::Variable("x".into()),
				Token::Assign(AssignOp::Set),
				Token::Variable("x".into()),
				Token::Slash,
				Token::Int(100),
				Token::Eof,
			]
		);
	}

	#[test]
	fn params_and_negative_numbers() {
		assert_eq!(
			tokens("Start-Sleep -Milliseconds 5 -1"),
			vec![
				Token::Word("Start-Sleep".into()),
				Token::Param("Milliseconds".into()),
				Token::Int(5),
				Token::Minus,
				Token::Int(1),
				Token::Eof,
			]
		);
	}

	#[test]
	fn escaped_path_word_resolves_backticks() {
		assert_eq!(
			tokens("/tmp/a` `[1`]/s.ps1 -Flag"),
			vec![Token::Word("/tmp/a [1]/s.ps1".into()), Token::Param("Flag".into()), Token::Eof]
		);
	}

	#[test]
	fn strings_and_positions() {
		let spanned = tokenize("'it''s'\n  \"a`tb\"").expect("tokenize");
		assert_eq!(spanned[0].token, Token::Str("it's".into()));
		assert_eq!(spanned[1].token, Token::Separator);
		assert_eq!((spanned[2].line, spanned[2].column), (2, 3));
		assert_eq!(spanned[2].token, Token::Str("a\tb".into()));
	}

	#[test]
	fn unterminated_string_reports_start() {
		let err = tokenize("$x = 'oops").expect_err("should fail");
		assert_eq!((err.line, err.column), (1, 6));
	}
}
