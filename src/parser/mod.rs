// Command-language parser.
//
// Grammar, per line (statements separated by `;`):
//
// ```text
// statement : begin ( namelist )
//           | beginRO ( namelist )
//           | end ( namelist )
//           | R ( name , name )
//           | W ( name , name , [-] number )
//           | fail ( numberlist )
//           | recover ( numberlist )
//           | dump ( )  |  dump ( name )  |  dump ( number )
//           | quit
//           | <empty>
// ```
//
// A syntax error inside one statement produces a `Syntax error at '<tok>'`
// diagnostic and skips that statement only; the rest of the line and the
// rest of the input keep going.

pub mod lexer;

use crate::common::SiteId;
use lexer::{tokenize, Token, TokenKind};

/// What `dump` should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpTarget {
    All,
    Item(String),
    Site(SiteId),
}

/// One parsed workload command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Begin(Vec<String>),
    BeginRo(Vec<String>),
    End(Vec<String>),
    Read { txn: String, item: String },
    Write { txn: String, item: String, value: i64 },
    Fail(Vec<SiteId>),
    Recover(Vec<SiteId>),
    Dump(DumpTarget),
    Quit,
}

/// Result of parsing one input line: the commands in source order and the
/// diagnostics produced along the way.
#[derive(Debug, Default)]
pub struct ParsedLine {
    pub commands: Vec<Command>,
    pub diagnostics: Vec<String>,
}

/// Parses one input line.
pub fn parse_line(src: &str) -> ParsedLine {
    let (tokens, mut diagnostics) = tokenize(src);
    let mut commands = Vec::new();

    for statement in tokens.split(|t| t.kind == TokenKind::Semicolon) {
        if statement.is_empty() {
            continue;
        }
        match parse_statement(statement) {
            Ok(command) => commands.push(command),
            Err(diagnostic) => diagnostics.push(diagnostic),
        }
    }

    ParsedLine {
        commands,
        diagnostics,
    }
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&'a Token, String> {
        match self.bump() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(syntax_error(token)),
            None => Err(end_of_line()),
        }
    }
}

fn syntax_error(token: &Token) -> String {
    format!("Syntax error at '{token}'")
}

fn end_of_line() -> String {
    "Syntax error at 'end of line'".to_string()
}

fn parse_statement(tokens: &[Token]) -> Result<Command, String> {
    let mut cursor = Cursor::new(tokens);
    let head = cursor.bump().expect("statement is non-empty");

    let command = match head.kind {
        TokenKind::Quit => Command::Quit,
        TokenKind::Begin => Command::Begin(parse_name_list(&mut cursor)?),
        TokenKind::BeginRo => Command::BeginRo(parse_name_list(&mut cursor)?),
        TokenKind::End => Command::End(parse_name_list(&mut cursor)?),
        TokenKind::Read => {
            cursor.expect(TokenKind::LParen)?;
            let txn = cursor.expect(TokenKind::Name)?.text.clone();
            cursor.expect(TokenKind::Comma)?;
            let item = cursor.expect(TokenKind::Name)?.text.clone();
            cursor.expect(TokenKind::RParen)?;
            Command::Read { txn, item }
        }
        TokenKind::Write => {
            cursor.expect(TokenKind::LParen)?;
            let txn = cursor.expect(TokenKind::Name)?.text.clone();
            cursor.expect(TokenKind::Comma)?;
            let item = cursor.expect(TokenKind::Name)?.text.clone();
            cursor.expect(TokenKind::Comma)?;
            let value = parse_value(&mut cursor)?;
            cursor.expect(TokenKind::RParen)?;
            Command::Write { txn, item, value }
        }
        TokenKind::Fail => Command::Fail(parse_site_list(&mut cursor)?),
        TokenKind::Recover => Command::Recover(parse_site_list(&mut cursor)?),
        TokenKind::Dump => parse_dump(&mut cursor)?,
        _ => return Err(syntax_error(head)),
    };

    match cursor.peek() {
        None => Ok(command),
        Some(extra) => Err(syntax_error(extra)),
    }
}

fn parse_name_list(cursor: &mut Cursor<'_>) -> Result<Vec<String>, String> {
    cursor.expect(TokenKind::LParen)?;
    let mut names = vec![cursor.expect(TokenKind::Name)?.text.clone()];
    loop {
        match cursor.bump() {
            Some(token) if token.kind == TokenKind::Comma => {
                names.push(cursor.expect(TokenKind::Name)?.text.clone());
            }
            Some(token) if token.kind == TokenKind::RParen => return Ok(names),
            Some(token) => return Err(syntax_error(token)),
            None => return Err(end_of_line()),
        }
    }
}

fn parse_site_list(cursor: &mut Cursor<'_>) -> Result<Vec<SiteId>, String> {
    cursor.expect(TokenKind::LParen)?;
    let mut sites = vec![cursor.expect(TokenKind::Number)?.value as SiteId];
    loop {
        match cursor.bump() {
            Some(token) if token.kind == TokenKind::Comma => {
                sites.push(cursor.expect(TokenKind::Number)?.value as SiteId);
            }
            Some(token) if token.kind == TokenKind::RParen => return Ok(sites),
            Some(token) => return Err(syntax_error(token)),
            None => return Err(end_of_line()),
        }
    }
}

fn parse_value(cursor: &mut Cursor<'_>) -> Result<i64, String> {
    match cursor.bump() {
        Some(token) if token.kind == TokenKind::Minus => {
            let number = cursor.expect(TokenKind::Number)?;
            Ok(-number.value)
        }
        Some(token) if token.kind == TokenKind::Number => Ok(token.value),
        Some(token) => Err(syntax_error(token)),
        None => Err(end_of_line()),
    }
}

fn parse_dump(cursor: &mut Cursor<'_>) -> Result<Command, String> {
    cursor.expect(TokenKind::LParen)?;
    let target = match cursor.bump() {
        Some(token) if token.kind == TokenKind::RParen => return Ok(Command::Dump(DumpTarget::All)),
        Some(token) if token.kind == TokenKind::Name => DumpTarget::Item(token.text.clone()),
        Some(token) if token.kind == TokenKind::Number => {
            DumpTarget::Site(token.value as SiteId)
        }
        Some(token) => return Err(syntax_error(token)),
        None => return Err(end_of_line()),
    };
    cursor.expect(TokenKind::RParen)?;
    Ok(Command::Dump(target))
}
