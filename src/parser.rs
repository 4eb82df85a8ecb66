//! Parser for the `sai` fragment language.
//!
//! One fenced code block parses into a flat [`Program`] of statements.
//! The grammar is deliberately small: local and shared assignments,
//! expressions with the usual precedence ladder, `if`/`else`, handler
//! registration (`on message { ... }`) and capability imports
//! (`use name` / `use name from "source"`). Line comments start with `//`.

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while, take_while1},
    character::complete::{char, digit1, multispace1, satisfy},
    combinator::{eof, map, map_res, not, opt, recognize, value, verify},
    error::{context, convert_error, VerboseError},
    multi::{fold_many0, many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;

use crate::ast::{
    AssignTarget, BinaryOperator, Block, EventSelector, Expression, Literal, Program, Statement,
    UnaryOperator,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("syntax error: {0}")]
    Syntax(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Words that can never be identifiers.
const KEYWORDS: &[&str] = &[
    "let", "if", "else", "on", "use", "from", "true", "false", "null", "shared", "message",
];

/// Parses one code block into a [`Program`].
pub fn parse_program(input: &str) -> ParseResult<Program> {
    match program(input) {
        Ok((_, program)) => Ok(program),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(ParseError::Syntax(convert_error(input, e)))
        }
        Err(nom::Err::Incomplete(_)) => {
            Err(ParseError::Syntax("unexpected end of input".to_string()))
        }
    }
}

fn program(input: &str) -> PResult<Program> {
    map(
        terminated(statement_list, pair(ws, eof)),
        Program::new,
    )(input)
}

// Whitespace and line comments, zero or more.
fn ws(input: &str) -> PResult<()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(tag("//"), take_while(|c| c != '\n'))),
        ))),
    )(input)
}

fn statement_list(input: &str) -> PResult<Vec<Statement>> {
    many0(preceded(
        ws,
        terminated(statement, opt(preceded(ws, char(';')))),
    ))(input)
}

fn statement(input: &str) -> PResult<Statement> {
    alt((
        use_statement,
        on_statement,
        if_statement,
        let_statement,
        assignment,
        map(expression, Statement::Expression),
    ))(input)
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    terminated(
        tag(kw),
        not(satisfy(|c: char| c.is_ascii_alphanumeric() || c == '_')),
    )
}

fn identifier(input: &str) -> PResult<String> {
    map(
        verify(
            recognize(pair(
                satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
                take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
            )),
            |s: &str| !KEYWORDS.contains(&s),
        ),
        |s: &str| s.to_string(),
    )(input)
}

fn use_statement(input: &str) -> PResult<Statement> {
    context(
        "use",
        map(
            pair(
                preceded(pair(keyword("use"), ws), identifier),
                opt(preceded(
                    tuple((ws, keyword("from"), ws)),
                    string_literal,
                )),
            ),
            |(name, source)| Statement::Use { name, source },
        ),
    )(input)
}

fn on_statement(input: &str) -> PResult<Statement> {
    context(
        "on",
        map(
            pair(
                preceded(pair(keyword("on"), ws), event_selector),
                preceded(ws, block),
            ),
            |(selector, block)| Statement::On { selector, block },
        ),
    )(input)
}

fn event_selector(input: &str) -> PResult<EventSelector> {
    value(EventSelector::Message, keyword("message"))(input)
}

fn if_statement(input: &str) -> PResult<Statement> {
    context(
        "if",
        map(
            tuple((
                preceded(pair(keyword("if"), ws), expression),
                preceded(ws, block),
                opt(preceded(
                    tuple((ws, keyword("else"), ws)),
                    alt((
                        // else-if chains nest as a single-statement block
                        map(if_statement, |stmt| Block::new(vec![stmt])),
                        block,
                    )),
                )),
            )),
            |(condition, then_block, else_block)| Statement::If {
                condition,
                then_block,
                else_block,
            },
        ),
    )(input)
}

fn let_statement(input: &str) -> PResult<Statement> {
    context(
        "let",
        map(
            pair(
                preceded(pair(keyword("let"), ws), identifier),
                preceded(tuple((ws, assign_eq, ws)), expression),
            ),
            |(name, value)| Statement::Let { name, value },
        ),
    )(input)
}

fn assignment(input: &str) -> PResult<Statement> {
    map(
        pair(
            assign_target,
            preceded(tuple((ws, assign_eq, ws)), expression),
        ),
        |(target, value)| Statement::Assignment { target, value },
    )(input)
}

// A single `=`, rejecting the leading `=` of `==`.
fn assign_eq(input: &str) -> PResult<char> {
    terminated(char('='), not(char('=')))(input)
}

fn assign_target(input: &str) -> PResult<AssignTarget> {
    alt((
        map(
            preceded(pair(keyword("shared"), char('.')), identifier),
            AssignTarget::Shared,
        ),
        map(identifier, AssignTarget::Local),
    ))(input)
}

fn block(input: &str) -> PResult<Block> {
    map(
        delimited(char('{'), statement_list, preceded(ws, char('}'))),
        Block::new,
    )(input)
}

// Expression precedence ladder: || < && < comparison < additive < multiplicative < unary.
fn expression(input: &str) -> PResult<Expression> {
    or_expression(input)
}

fn binary_fold<'a>(
    operand: fn(&'a str) -> PResult<'a, Expression>,
    operator: fn(&'a str) -> PResult<'a, BinaryOperator>,
    input: &'a str,
) -> PResult<'a, Expression> {
    let (input, init) = operand(input)?;
    fold_many0(
        pair(preceded(ws, operator), preceded(ws, operand)),
        move || init.clone(),
        |left, (op, right)| Expression::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    )(input)
}

fn or_expression(input: &str) -> PResult<Expression> {
    binary_fold(and_expression, or_operator, input)
}

fn and_expression(input: &str) -> PResult<Expression> {
    binary_fold(comparison, and_operator, input)
}

fn comparison(input: &str) -> PResult<Expression> {
    binary_fold(additive, comparison_operator, input)
}

fn additive(input: &str) -> PResult<Expression> {
    binary_fold(multiplicative, additive_operator, input)
}

fn multiplicative(input: &str) -> PResult<Expression> {
    binary_fold(unary, multiplicative_operator, input)
}

fn or_operator(input: &str) -> PResult<BinaryOperator> {
    value(BinaryOperator::Or, tag("||"))(input)
}

fn and_operator(input: &str) -> PResult<BinaryOperator> {
    value(BinaryOperator::And, tag("&&"))(input)
}

fn comparison_operator(input: &str) -> PResult<BinaryOperator> {
    alt((
        value(BinaryOperator::Equal, tag("==")),
        value(BinaryOperator::NotEqual, tag("!=")),
        value(BinaryOperator::LessThanEqual, tag("<=")),
        value(BinaryOperator::GreaterThanEqual, tag(">=")),
        value(BinaryOperator::LessThan, tag("<")),
        value(BinaryOperator::GreaterThan, tag(">")),
    ))(input)
}

fn additive_operator(input: &str) -> PResult<BinaryOperator> {
    alt((
        value(BinaryOperator::Add, char('+')),
        value(BinaryOperator::Subtract, char('-')),
    ))(input)
}

fn multiplicative_operator(input: &str) -> PResult<BinaryOperator> {
    alt((
        value(BinaryOperator::Multiply, char('*')),
        value(BinaryOperator::Divide, char('/')),
    ))(input)
}

fn unary(input: &str) -> PResult<Expression> {
    alt((
        map(
            pair(
                alt((
                    value(UnaryOperator::Not, char('!')),
                    value(UnaryOperator::Negate, char('-')),
                )),
                preceded(ws, unary),
            ),
            |(op, expr)| Expression::UnaryOp {
                op,
                expr: Box::new(expr),
            },
        ),
        primary,
    ))(input)
}

fn primary(input: &str) -> PResult<Expression> {
    alt((
        map(literal, Expression::Literal),
        shared_access,
        function_call,
        map(identifier, Expression::Variable),
        list,
        parenthesized,
    ))(input)
}

fn shared_access(input: &str) -> PResult<Expression> {
    map(
        preceded(pair(keyword("shared"), char('.')), identifier),
        Expression::SharedAccess,
    )(input)
}

// No whitespace between the function name and the opening parenthesis,
// so a parenthesized expression on the next line is not taken as a call.
fn function_call(input: &str) -> PResult<Expression> {
    map(
        pair(
            identifier,
            delimited(
                char('('),
                separated_list0(preceded(ws, char(',')), preceded(ws, expression)),
                preceded(ws, char(')')),
            ),
        ),
        |(function, arguments)| Expression::FunctionCall {
            function,
            arguments,
        },
    )(input)
}

fn list(input: &str) -> PResult<Expression> {
    map(
        delimited(
            char('['),
            separated_list0(preceded(ws, char(',')), preceded(ws, expression)),
            preceded(ws, char(']')),
        ),
        Expression::List,
    )(input)
}

fn parenthesized(input: &str) -> PResult<Expression> {
    delimited(char('('), preceded(ws, expression), preceded(ws, char(')')))(input)
}

fn literal(input: &str) -> PResult<Literal> {
    alt((
        number,
        map(string_literal, Literal::String),
        value(Literal::Boolean(true), keyword("true")),
        value(Literal::Boolean(false), keyword("false")),
        value(Literal::Null, keyword("null")),
    ))(input)
}

fn number(input: &str) -> PResult<Literal> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |text: &str| -> Result<Literal, std::num::ParseIntError> {
            if text.contains('.') {
                // digit1 "." digit1 always parses as f64
                Ok(Literal::Float(text.parse::<f64>().unwrap_or(f64::NAN)))
            } else {
                Ok(Literal::Integer(text.parse::<i64>()?))
            }
        },
    )(input)
}

fn string_literal(input: &str) -> PResult<String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                take_while1(|c| c != '"' && c != '\\'),
                '\\',
                alt((
                    value("\"", char('"')),
                    value("\\", char('\\')),
                    value("\n", char('n')),
                    value("\t", char('t')),
                )),
            )),
            |s| s.unwrap_or_default(),
        ),
        char('"'),
    )(input)
}
