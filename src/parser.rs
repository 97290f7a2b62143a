//! 快速过滤表达式与构建器命令的语法分析器
//!
//! ## 解析流程图
//!
//! ```text
//! parse_command()
//!   ├─ 命令名 (Identifier)
//!   ├─ add / group / logic / rmgroup → parse_group_path()
//!   ├─ field / op / value / clear / rm → parse_condition_path()
//!   │                                     ├─ parse_operator()
//!   │                                     └─ parse_value()
//!   ├─ where → parse_filter()
//!   ├─ search → 剩余的原始输入
//!   └─ 其他 → 页码、排序、保存的过滤器名称
//!
//! parse_filter() (递归下降解析)
//!   └─ parse_or_expression()
//!        ├─ parse_and_expression()
//!        │    ├─ parse_primary_expression()
//!        │    │    ├─ "(" → 分组表达式 (递归调用parse_or_expression)
//!        │    │    └─ 字段 运算符 值 → parse_condition()
//!        │    │
//!        │    └─ 遇到AND时，继续解析右侧基础表达式
//!        │
//!        └─ 遇到OR时，继续解析右侧AND表达式
//! ```
//!
//! ## 语法优先级（从高到低）
//!
//! 1. **括号分组** `(expression)`
//! 2. **比较操作** `field = value`, `field ~ value`, `field between a..b`
//! 3. **AND操作** `expr1 AND expr2`
//! 4. **OR操作** `expr1 OR expr2`
//!
//! ## 运算符
//! - `=` equals, `~` contains, `^` startsWith, `$` endsWith
//! - `>` greaterThan, `<` lessThan
//! - `between a..b`（可省略一端）, `in (a, b, ...)`
//!
//! ## 字面值类型
//! - **字符串**: `"quoted string"` 或 `unquoted_identifier`
//! - **数字**: `123`, `-456`, `49.99`
//! - **日期**: `2024-03-01`
//! - **布尔**: `true`, `false`
//!
//! ## 解析示例
//!
//! ```text
//! email ~ gmail
//! city = "Lviv" AND isActive = true
//! (level = BEGINNER OR level = INTERMEDIATE) AND rating between 1200..1800
//! joinedAt between 2024-01-01..2024-06-30
//! plan in (MONTHLY, ANNUAL)
//! ```

use crate::builder::{ConditionPath, GroupPath};
use crate::lexer::Lexer;
use crate::model::{ConditionValue, DateRange, FilterCondition, FilterGroup, Logic, NumberRange, Operator, Scalar};
use crate::request::{Sort, SortDirection};
use crate::token::{Span, Token, TokenKind};
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

/// One line typed into the REPL
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `add [g]`
    Add(GroupPath),
    /// `field <c> <id>`
    Field(ConditionPath, String),
    /// `op <c> <operator>`
    Op(ConditionPath, Operator),
    /// `value <c> <value>`
    Value(ConditionPath, ConditionValue),
    /// `clear <c>`
    Clear(ConditionPath),
    /// `rm <c>`
    Remove(ConditionPath),
    /// `group [g] and|or`
    Group(GroupPath, Logic),
    /// `rmgroup <g>`
    RemoveGroup(GroupPath),
    /// `logic [g] and|or`
    Logic(GroupPath, Logic),
    /// `where <expr>`
    Where(FilterGroup),
    /// `search [text]`
    Search(String),
    Show,
    Compile,
    Sql,
    /// `page <n> [limit]`
    Page { page: u64, limit: Option<u64> },
    /// `sort [field [asc|desc]]`, no field clears the sort
    Sort(Option<Sort>),
    Save(String),
    Load(String),
    Delete(String),
    Saved,
    Fields,
    Reset,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: String, span: Option<Span>) -> Self {
        Self { message, span }
    }

    fn at_position(message: String, span: Span) -> Self {
        Self { message, span: Some(span) }
    }
}

/// Parsed expression node before it becomes a group
enum Node {
    Condition(FilterCondition),
    Group(FilterGroup),
}

impl Node {
    fn into_group(self) -> FilterGroup {
        match self {
            Node::Condition(condition) => FilterGroup::and().with_condition(condition),
            Node::Group(group) => group,
        }
    }
}

/// Combine nodes under one logic; nested groups with the same logic are flattened
fn combine(logic: Logic, nodes: Vec<Node>) -> Node {
    let mut group = FilterGroup::new(logic);
    for node in nodes {
        match node {
            Node::Condition(condition) => group.conditions.push(condition),
            Node::Group(child) if child.logic == logic => {
                group.conditions.extend(child.conditions);
                group.groups.extend(child.groups);
            }
            Node::Group(child) => group.groups.push(Arc::new(child)),
        }
    }
    Node::Group(group)
}

pub struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token<'a>],
    position: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: &'a [Token<'a>]) -> Self {
        Self {
            source,
            tokens,
            position: 0,
        }
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// 期望特定类型的 token 并推进，否则返回错误
    fn expect(&mut self, expected: TokenKind) -> Result<&'a Token<'a>, ParseError> {
        match self.peek() {
            Some(token) if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) => {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::at_position(
                format!("Expected {:?}, found {:?}", expected, token.kind),
                token.span,
            )),
            None => Err(ParseError::new(
                format!("Expected {:?}, but reached end of input", expected),
                None,
            )),
        }
    }

    /// 检查当前 token 是否匹配给定类型
    fn match_token(&self, kind: &TokenKind) -> bool {
        self.peek()
            .is_some_and(|token| std::mem::discriminant(&token.kind) == std::mem::discriminant(kind))
    }

    fn at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    /// 期望输入已经结束
    fn expect_end(&self) -> Result<(), ParseError> {
        match self.peek() {
            Some(token) => Err(ParseError::at_position(
                format!("Unexpected token: {:?}", token.kind),
                token.span,
            )),
            None => Ok(()),
        }
    }

    fn expect_identifier(&mut self) -> Result<(&'a str, Span), ParseError> {
        let token = self.expect(TokenKind::Identifier(""))?;
        match token.kind {
            TokenKind::Identifier(name) => Ok((name, token.span)),
            _ => unreachable!("expect() checked the token kind"),
        }
    }

    /// 解析整个输入为过滤器组；空输入是空的 AND 组
    pub fn parse_filter(&mut self) -> Result<FilterGroup, ParseError> {
        if self.at_end() {
            return Ok(FilterGroup::and());
        }
        let node = self.parse_or_expression()?;
        self.expect_end()?;
        Ok(node.into_group())
    }

    /// 解析OR表达式 (最低优先级)
    ///
    /// 语法: `and_expr (OR and_expr)*`
    fn parse_or_expression(&mut self) -> Result<Node, ParseError> {
        let mut nodes = vec![self.parse_and_expression()?];

        while self.match_token(&TokenKind::Or) {
            self.advance(); // 消费 OR
            nodes.push(self.parse_and_expression()?);
        }

        Ok(if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            combine(Logic::Or, nodes)
        })
    }

    /// 解析AND表达式
    ///
    /// 语法: `primary (AND primary)*`
    fn parse_and_expression(&mut self) -> Result<Node, ParseError> {
        let mut nodes = vec![self.parse_primary_expression()?];

        while self.match_token(&TokenKind::And) {
            self.advance(); // 消费 AND
            nodes.push(self.parse_primary_expression()?);
        }

        Ok(if nodes.len() == 1 {
            nodes.remove(0)
        } else {
            combine(Logic::And, nodes)
        })
    }

    /// 解析基础表达式 (最高优先级)
    fn parse_primary_expression(&mut self) -> Result<Node, ParseError> {
        if self.match_token(&TokenKind::LParen) {
            self.advance(); // 消费 (
            let node = self.parse_or_expression()?;
            self.expect(TokenKind::RParen)?;
            Ok(node)
        } else {
            self.parse_condition().map(Node::Condition)
        }
    }

    /// `field op value`
    fn parse_condition(&mut self) -> Result<FilterCondition, ParseError> {
        let (field, _) = self.expect_identifier()?;
        let operator = self.parse_operator()?;
        let value = self.parse_value()?;
        Ok(FilterCondition::new(field, operator, value))
    }

    /// 运算符符号、BETWEEN/IN 关键字，或运算符名称（不区分大小写）
    fn parse_operator(&mut self) -> Result<Operator, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new("Expected operator".to_string(), None));
        };
        match token.kind {
            TokenKind::Eq => Ok(Operator::Equals),
            TokenKind::Tilde => Ok(Operator::Contains),
            TokenKind::Caret => Ok(Operator::StartsWith),
            TokenKind::Dollar => Ok(Operator::EndsWith),
            TokenKind::Gt => Ok(Operator::GreaterThan),
            TokenKind::Lt => Ok(Operator::LessThan),
            TokenKind::Between => Ok(Operator::Between),
            TokenKind::In => Ok(Operator::In),
            TokenKind::Identifier(name) => Operator::ALL
                .into_iter()
                .find(|op| op.as_str().eq_ignore_ascii_case(name))
                .ok_or_else(|| ParseError::at_position(format!("Unknown operator '{}'", name), token.span)),
            _ => Err(ParseError::at_position(
                format!("Expected operator, found {:?}", token.kind),
                token.span,
            )),
        }
    }

    /// 值：标量、`a..b` 区间（可省略一端）或 `(a, b, ...)` 列表
    fn parse_value(&mut self) -> Result<ConditionValue, ParseError> {
        if self.match_token(&TokenKind::LParen) {
            self.advance(); // 消费 (
            let mut items = Vec::new();
            if !self.match_token(&TokenKind::RParen) {
                loop {
                    items.push(self.parse_scalar()?);
                    if self.match_token(&TokenKind::RParen) {
                        break;
                    }
                    self.expect(TokenKind::Comma)?;
                }
            }
            self.expect(TokenKind::RParen)?;
            return Ok(ConditionValue::List(items));
        }

        if let Some(token) = self.peek().filter(|t| t.kind == TokenKind::DotDot) {
            self.advance(); // 消费 ..
            let high = self.parse_scalar()?;
            return range_value(None, Some(high), token.span);
        }

        let low = self.parse_scalar()?;
        match self.peek() {
            Some(token) if token.kind == TokenKind::DotDot => {
                self.advance(); // 消费 ..
                let high = if self.at_scalar() { Some(self.parse_scalar()?) } else { None };
                range_value(Some(low), high, token.span)
            }
            _ => Ok(ConditionValue::Scalar(low)),
        }
    }

    fn at_scalar(&self) -> bool {
        self.peek().is_some_and(|token| {
            matches!(
                token.kind,
                TokenKind::String(_)
                    | TokenKind::Number(_)
                    | TokenKind::Date(_)
                    | TokenKind::True
                    | TokenKind::False
                    | TokenKind::Identifier(_)
            )
        })
    }

    fn parse_scalar(&mut self) -> Result<Scalar, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new("Expected literal value".to_string(), None));
        };
        match token.kind {
            TokenKind::String(s) => Ok(Scalar::text(s)),
            // 不带引号的字符串
            TokenKind::Identifier(s) => Ok(Scalar::text(s)),
            TokenKind::True => Ok(Scalar::Bool(true)),
            TokenKind::False => Ok(Scalar::Bool(false)),
            TokenKind::Number(raw) => parse_number(raw, token.span),
            TokenKind::Date(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Scalar::Date)
                .map_err(|e| ParseError::at_position(format!("Invalid date '{}': {}", raw, e), token.span)),
            _ => Err(ParseError::at_position(
                format!("Expected literal value, found {:?}", token.kind),
                token.span,
            )),
        }
    }

    /// `g0.g1`；`root` 或空表示根组
    fn parse_group_path(&mut self) -> Result<GroupPath, ParseError> {
        let (segments, span) = self.parse_path_segments()?;
        let mut indices = Vec::with_capacity(segments.len());
        for (kind, index) in segments {
            if kind != 'g' {
                return Err(ParseError::at_position(
                    "Expected a group path such as g0.g1".to_string(),
                    span,
                ));
            }
            indices.push(index);
        }
        Ok(GroupPath::new(indices))
    }

    /// `c2` 或 `g0.c2`
    fn parse_condition_path(&mut self) -> Result<ConditionPath, ParseError> {
        let (mut segments, span) = self.parse_path_segments()?;
        let invalid = || ParseError::at_position("Expected a condition path such as c0 or g0.c1".to_string(), span);

        let Some(('c', index)) = segments.pop() else {
            return Err(invalid());
        };
        let mut indices = Vec::with_capacity(segments.len());
        for (kind, group) in segments {
            if kind != 'g' {
                return Err(invalid());
            }
            indices.push(group);
        }
        Ok(GroupPath::new(indices).condition(index))
    }

    /// 以点分隔的 `g<n>` / `c<n>` 段
    fn parse_path_segments(&mut self) -> Result<(Vec<(char, usize)>, Span), ParseError> {
        let (first, first_span) = self.expect_identifier()?;
        if first.eq_ignore_ascii_case("root") {
            return Ok((Vec::new(), first_span));
        }

        let mut segments = vec![path_segment(first, first_span)?];
        let mut span = first_span;
        while self.match_token(&TokenKind::Dot) {
            self.advance(); // 消费 .
            let (name, segment_span) = self.expect_identifier()?;
            segments.push(path_segment(name, segment_span)?);
            span.end = segment_span.end;
        }
        Ok((segments, span))
    }

    fn parse_logic(&mut self) -> Result<Logic, ParseError> {
        match self.advance() {
            Some(token) if token.kind == TokenKind::And => Ok(Logic::And),
            Some(token) if token.kind == TokenKind::Or => Ok(Logic::Or),
            Some(token) => Err(ParseError::at_position(
                format!("Expected AND or OR, found {:?}", token.kind),
                token.span,
            )),
            None => Err(ParseError::new("Expected AND or OR".to_string(), None)),
        }
    }

    /// 可选的组路径后跟 AND/OR
    fn parse_group_logic(&mut self) -> Result<(GroupPath, Logic), ParseError> {
        let at = if self.match_token(&TokenKind::And) || self.match_token(&TokenKind::Or) {
            GroupPath::root()
        } else {
            self.parse_group_path()?
        };
        Ok((at, self.parse_logic()?))
    }

    fn parse_count(&mut self) -> Result<u64, ParseError> {
        let token = self.expect(TokenKind::Number(""))?;
        let TokenKind::Number(raw) = token.kind else {
            unreachable!("expect() checked the token kind")
        };
        raw.parse::<u64>()
            .map_err(|_| ParseError::at_position(format!("Expected a positive whole number, found '{}'", raw), token.span))
    }

    /// 保存的过滤器名称：标识符或字符串
    fn parse_name(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Some(Token { kind: TokenKind::Identifier(name) | TokenKind::String(name), .. }) => Ok(name.to_string()),
            Some(token) => Err(ParseError::at_position(
                format!("Expected a filter name, found {:?}", token.kind),
                token.span,
            )),
            None => Err(ParseError::new("Expected a filter name".to_string(), None)),
        }
    }

    /// 剩余的原始输入；单个带引号的字符串取其内容
    fn rest_of_input(&mut self) -> String {
        let rest = match self.tokens.get(self.position..) {
            Some([Token { kind: TokenKind::String(content), .. }]) => content.to_string(),
            Some([first, ..]) => self.source[first.span.start..].trim().to_string(),
            _ => String::new(),
        };
        self.position = self.tokens.len();
        rest
    }

    /// 解析一条 REPL 命令
    pub fn parse_command(&mut self) -> Result<Command, ParseError> {
        let (name, span) = match self.peek() {
            Some(_) => self.expect_identifier()?,
            None => return Err(ParseError::new("Empty command".to_string(), None)),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "add" => Command::Add(if self.at_end() { GroupPath::root() } else { self.parse_group_path()? }),
            "field" => {
                let at = self.parse_condition_path()?;
                let (field, _) = self.expect_identifier()?;
                Command::Field(at, field.to_string())
            }
            "op" => {
                let at = self.parse_condition_path()?;
                Command::Op(at, self.parse_operator()?)
            }
            "value" => {
                let at = self.parse_condition_path()?;
                Command::Value(at, self.parse_value()?)
            }
            "clear" => Command::Clear(self.parse_condition_path()?),
            "rm" => Command::Remove(self.parse_condition_path()?),
            "group" => {
                let (at, logic) = self.parse_group_logic()?;
                Command::Group(at, logic)
            }
            "rmgroup" => Command::RemoveGroup(self.parse_group_path()?),
            "logic" => {
                let (at, logic) = self.parse_group_logic()?;
                Command::Logic(at, logic)
            }
            "where" => Command::Where(self.parse_filter()?),
            "search" => Command::Search(self.rest_of_input()),
            "show" => Command::Show,
            "compile" => Command::Compile,
            "sql" => Command::Sql,
            "page" => {
                let page = self.parse_count()?;
                let limit = if self.at_end() { None } else { Some(self.parse_count()?) };
                Command::Page { page, limit }
            }
            "sort" => {
                if self.at_end() {
                    Command::Sort(None)
                } else {
                    let (field, _) = self.expect_identifier()?;
                    let direction = if self.at_end() {
                        SortDirection::Asc
                    } else {
                        let (raw, span) = self.expect_identifier()?;
                        SortDirection::from_name(raw).ok_or_else(|| {
                            ParseError::at_position(format!("Expected asc or desc, found '{}'", raw), span)
                        })?
                    };
                    Command::Sort(Some(Sort::new(field, direction)))
                }
            }
            "save" => Command::Save(self.parse_name()?),
            "load" => Command::Load(self.parse_name()?),
            "delete" => Command::Delete(self.parse_name()?),
            "saved" => Command::Saved,
            "fields" => Command::Fields,
            "reset" => Command::Reset,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => {
                return Err(ParseError::at_position(format!("Unknown command '{}'", other), span));
            }
        };

        self.expect_end()?;
        Ok(command)
    }
}

/// `g3` → ('g', 3)
fn path_segment(name: &str, span: Span) -> Result<(char, usize), ParseError> {
    let mut chars = name.chars();
    let kind = chars.next().map(|c| c.to_ascii_lowercase());
    match (kind, chars.as_str().parse::<usize>()) {
        (Some(kind @ ('g' | 'c')), Ok(index)) => Ok((kind, index)),
        _ => Err(ParseError::at_position(format!("Invalid path segment '{}'", name), span)),
    }
}

fn parse_number(raw: &str, span: Span) -> Result<Scalar, ParseError> {
    let invalid = || ParseError::at_position(format!("Invalid number '{}'", raw), span);
    if raw.contains('.') {
        raw.parse::<f64>().ok().and_then(Scalar::float).ok_or_else(invalid)
    } else {
        raw.parse::<i64>().map(Scalar::from).map_err(|_| invalid())
    }
}

/// 两端都是日期时为日期区间，否则为数值区间
fn range_value(low: Option<Scalar>, high: Option<Scalar>, span: Span) -> Result<ConditionValue, ParseError> {
    let is_date = |bound: &Option<Scalar>| bound.as_ref().map(|s| matches!(s, Scalar::Date(_)));
    let date = |bound: Option<Scalar>| match bound {
        Some(Scalar::Date(d)) => Some(d),
        _ => None,
    };

    let dates = match (is_date(&low), is_date(&high)) {
        (Some(true), Some(false)) | (Some(false), Some(true)) => {
            return Err(ParseError::at_position(
                "A range cannot mix dates with other values".to_string(),
                span,
            ));
        }
        (Some(true), _) | (_, Some(true)) => true,
        _ => false,
    };

    Ok(if dates {
        ConditionValue::DateRange(DateRange {
            start: date(low),
            end: date(high),
        })
    } else {
        ConditionValue::Range(NumberRange { min: low, max: high })
    })
}

/// 将表达式解析为过滤器组
pub fn parse_filter(input: &str) -> Result<FilterGroup, ParseError> {
    let tokens: Vec<_> = Lexer::new(input).collect();
    Parser::new(input, &tokens).parse_filter()
}

/// 解析一条 REPL 命令
pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    let tokens: Vec<_> = Lexer::new(input).collect();
    Parser::new(input, &tokens).parse_command()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_simple_condition() {
        let group = parse_filter(r#"city = "Lviv""#).unwrap();
        assert_eq!(
            group,
            FilterGroup::and().with_condition(FilterCondition::new("city", Operator::Equals, "Lviv"))
        );
    }

    #[test]
    fn test_empty_expression_is_empty_group() {
        assert!(parse_filter("   ").unwrap().is_empty());
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let group = parse_filter("a = 1 OR b = 2 AND c = 3").unwrap();
        let expected = FilterGroup::or()
            .with_condition(FilterCondition::new("a", Operator::Equals, 1))
            .with_group(
                FilterGroup::and()
                    .with_condition(FilterCondition::new("b", Operator::Equals, 2))
                    .with_condition(FilterCondition::new("c", Operator::Equals, 3)),
            );
        assert_eq!(group, expected);
    }

    #[test]
    fn test_grouped_expression() {
        let group = parse_filter("(level = BEGINNER or level = ADVANCED) and isActive = true").unwrap();
        let expected = FilterGroup::and()
            .with_condition(FilterCondition::new("isActive", Operator::Equals, true))
            .with_group(
                FilterGroup::or()
                    .with_condition(FilterCondition::new("level", Operator::Equals, "BEGINNER"))
                    .with_condition(FilterCondition::new("level", Operator::Equals, "ADVANCED")),
            );
        assert_eq!(group, expected);
    }

    #[test]
    fn test_same_logic_is_flattened() {
        let group = parse_filter("a = 1 AND (b = 2 AND c = 3)").unwrap();
        assert_eq!(group.conditions.len(), 3);
        assert!(group.groups.is_empty());
    }

    #[test]
    fn test_operator_symbols() {
        let group = parse_filter("email ~ gmail AND firstName ^ An AND lastName $ ko AND rating > 1500 AND price < 49.99")
            .unwrap();
        let operators: Vec<_> = group.conditions.iter().filter_map(|c| c.operator).collect();
        assert_eq!(
            operators,
            vec![
                Operator::Contains,
                Operator::StartsWith,
                Operator::EndsWith,
                Operator::GreaterThan,
                Operator::LessThan,
            ]
        );
        assert_eq!(group.conditions[4].value, Some(ConditionValue::Scalar(Scalar::float(49.99).unwrap())));
    }

    #[test]
    fn test_between_ranges() {
        let group = parse_filter("rating between 1200..1800").unwrap();
        assert_eq!(group.conditions[0].value, Some(ConditionValue::range(1200, 1800)));

        let group = parse_filter("joinedAt between 2024-01-01..2024-06-30").unwrap();
        assert_eq!(
            group.conditions[0].value,
            Some(ConditionValue::dates(date("2024-01-01"), date("2024-06-30")))
        );

        let group = parse_filter("rating between 1200..").unwrap();
        assert_eq!(
            group.conditions[0].value,
            Some(ConditionValue::Range(NumberRange {
                min: Some(Scalar::from(1200)),
                max: None,
            }))
        );

        let group = parse_filter("joinedAt between ..2024-06-30").unwrap();
        assert_eq!(
            group.conditions[0].value,
            Some(ConditionValue::DateRange(DateRange {
                start: None,
                end: Some(date("2024-06-30")),
            }))
        );
    }

    #[test]
    fn test_mixed_range_is_error() {
        let err = parse_filter("joinedAt between 2024-01-01..5").unwrap_err();
        assert!(err.message.contains("mix"));
    }

    #[test]
    fn test_in_list() {
        let group = parse_filter(r#"plan in (MONTHLY, "ANNUAL")"#).unwrap();
        assert_eq!(
            group.conditions[0],
            FilterCondition::new("plan", Operator::In, ConditionValue::list(["MONTHLY", "ANNUAL"]))
        );
    }

    #[test]
    fn test_in_list_trailing_comma_is_error() {
        assert!(parse_filter("plan in (MONTHLY,)").is_err());
    }

    #[test]
    fn test_errors_carry_span() {
        let err = parse_filter("city = ").unwrap_err();
        assert_eq!(err.span, None);

        let err = parse_filter("city & Lviv").unwrap_err();
        assert_eq!(err.span, Some(Span::new(5, 6)));

        let err = parse_filter("city = Lviv extra").unwrap_err();
        assert_eq!(err.span, Some(Span::new(12, 17)));

        assert!(parse_filter("joinedAt = 2024-13-01").is_err());
    }

    #[test]
    fn test_builder_commands() {
        assert_eq!(parse_command("add").unwrap(), Command::Add(GroupPath::root()));
        assert_eq!(parse_command("add g0.g1").unwrap(), Command::Add(GroupPath::new(vec![0, 1])));
        assert_eq!(
            parse_command("field g1.c0 email").unwrap(),
            Command::Field(GroupPath::new(vec![1]).condition(0), "email".to_string())
        );
        assert_eq!(
            parse_command("op c2 startsWith").unwrap(),
            Command::Op(GroupPath::root().condition(2), Operator::StartsWith)
        );
        assert_eq!(
            parse_command("op c0 in").unwrap(),
            Command::Op(GroupPath::root().condition(0), Operator::In)
        );
        assert_eq!(
            parse_command("value c0 10..20").unwrap(),
            Command::Value(GroupPath::root().condition(0), ConditionValue::range(10, 20))
        );
        assert_eq!(parse_command("clear c1").unwrap(), Command::Clear(GroupPath::root().condition(1)));
        assert_eq!(parse_command("rm g0.c1").unwrap(), Command::Remove(GroupPath::new(vec![0]).condition(1)));
        assert_eq!(parse_command("group or").unwrap(), Command::Group(GroupPath::root(), Logic::Or));
        assert_eq!(
            parse_command("logic g0 AND").unwrap(),
            Command::Logic(GroupPath::new(vec![0]), Logic::And)
        );
        assert_eq!(parse_command("rmgroup g2").unwrap(), Command::RemoveGroup(GroupPath::new(vec![2])));
    }

    #[test]
    fn test_list_view_commands() {
        assert_eq!(
            parse_command("page 3 50").unwrap(),
            Command::Page { page: 3, limit: Some(50) }
        );
        assert_eq!(parse_command("page 2").unwrap(), Command::Page { page: 2, limit: None });
        assert_eq!(
            parse_command("sort joinedAt desc").unwrap(),
            Command::Sort(Some(Sort::new("joinedAt", SortDirection::Desc)))
        );
        assert_eq!(parse_command("sort").unwrap(), Command::Sort(None));
        assert_eq!(parse_command(r#"save "active in Lviv""#).unwrap(), Command::Save("active in Lviv".to_string()));
        assert_eq!(parse_command("load trial-done").unwrap(), Command::Load("trial-done".to_string()));
        assert_eq!(parse_command("search chess club").unwrap(), Command::Search("chess club".to_string()));
        assert_eq!(parse_command(r#"search "o'neil""#).unwrap(), Command::Search("o'neil".to_string()));
        assert_eq!(parse_command("search").unwrap(), Command::Search(String::new()));
        assert_eq!(parse_command("QUIT").unwrap(), Command::Quit);
    }

    #[test]
    fn test_where_command() {
        let command = parse_command("where isActive = true AND city = Lviv").unwrap();
        let Command::Where(group) = command else {
            panic!("expected where command");
        };
        assert_eq!(group.conditions.len(), 2);
    }

    #[test]
    fn test_command_errors() {
        assert!(parse_command("").is_err());
        assert!(parse_command("frobnicate").unwrap_err().message.contains("Unknown command"));
        assert!(parse_command("op c0 matches").unwrap_err().message.contains("Unknown operator"));
        assert!(parse_command("rm g0").is_err());
        assert!(parse_command("rmgroup c0").is_err());
        assert!(parse_command("page -1").is_err());
        assert!(parse_command("show extra").is_err());
    }
}
