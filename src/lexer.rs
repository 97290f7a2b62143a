//! 快速过滤表达式与命令的词法分析器

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 返回下一个位置的字符，不推进位置
    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// 跳过空白字符
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn skip_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }

    /// 读取数字或日期字面量
    /// 注意：第一个字符（数字或负号）已经被调用者消费
    fn read_number(&mut self, start: usize) -> Token<'a> {
        self.skip_digits();

        // 四位数字后跟 '-' 和数字：日期 YYYY-MM-DD
        let digits = &self.input[start..self.position];
        if digits.len() == 4
            && digits.bytes().all(|b| b.is_ascii_digit())
            && self.peek() == Some('-')
            && self.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '-' {
                    self.bump();
                } else {
                    break;
                }
            }
            return self.token(TokenKind::Date(&self.input[start..self.position]), start);
        }

        // 小数部分；".." 是区间，不属于数字
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump(); // 消费 '.'
            self.skip_digits();
        }

        self.token(TokenKind::Number(&self.input[start..self.position]), start)
    }

    /// 读取双引号包围的字符串字面量
    /// 注意：开始的引号已经被调用者消费
    fn read_string(&mut self, start: usize) -> Token<'a> {
        let content_start = self.position;
        while let Some(c) = self.peek() {
            if c == '"' {
                break;
            }
            self.bump();
        }
        let content_end = self.position;
        if self.bump().is_none() {
            // 没有结束引号
            return self.token(TokenKind::Illegal, start);
        }

        self.token(TokenKind::String(&self.input[content_start..content_end]), start)
    }

    /// 读取标识符或关键字
    /// 标识符可以包含字母、数字、连字符和下划线
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        self.token(match_keyword(literal), start)
    }
}

fn match_keyword(s: &str) -> TokenKind {
    match s.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "between" => TokenKind::Between,
        "in" => TokenKind::In,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => TokenKind::Identifier(s),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let Some(c) = self.bump() else {
            return None; // 到达输入末尾
        };

        let token = match c {
            '=' => self.token(TokenKind::Eq, start),
            '~' => self.token(TokenKind::Tilde, start),
            '^' => self.token(TokenKind::Caret, start),
            '$' => self.token(TokenKind::Dollar, start),
            '>' => self.token(TokenKind::Gt, start),
            '<' => self.token(TokenKind::Lt, start),
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            ',' => self.token(TokenKind::Comma, start),
            '.' => {
                if self.peek() == Some('.') {
                    self.bump();
                    self.token(TokenKind::DotDot, start)
                } else {
                    self.token(TokenKind::Dot, start)
                }
            }
            '-' => {
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.read_number(start)
                } else {
                    self.token(TokenKind::Illegal, start)
                }
            }
            '"' => self.read_string(start),
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
            _ => self.token(TokenKind::Illegal, start),
        };
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(input).map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_condition() {
        let mut lexer = Lexer::new(r#"city = "Lviv""#);

        assert_eq!(lexer.next().unwrap().kind, TokenKind::Identifier("city"));
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Eq);
        let string = lexer.next().unwrap();
        assert_eq!(string.kind, TokenKind::String("Lviv"));
        assert_eq!(string.span, Span::new(7, 13));
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn test_all_operators_and_punctuation() {
        assert_eq!(
            kinds("= ~ ^ $ > < ( ) , . .."),
            vec![
                TokenKind::Eq, TokenKind::Tilde, TokenKind::Caret, TokenKind::Dollar,
                TokenKind::Gt, TokenKind::Lt, TokenKind::LParen, TokenKind::RParen,
                TokenKind::Comma, TokenKind::Dot, TokenKind::DotDot,
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("AND or Between IN TRUE false lessonsPerWeek trial_done my-filter"),
            vec![
                TokenKind::And, TokenKind::Or, TokenKind::Between, TokenKind::In,
                TokenKind::True, TokenKind::False,
                TokenKind::Identifier("lessonsPerWeek"),
                TokenKind::Identifier("trial_done"),
                TokenKind::Identifier("my-filter"),
            ]
        );
    }

    #[test]
    fn test_numbers_and_dates() {
        assert_eq!(
            kinds("12345 -7 49.99 2024-03-01"),
            vec![
                TokenKind::Number("12345"),
                TokenKind::Number("-7"),
                TokenKind::Number("49.99"),
                TokenKind::Date("2024-03-01"),
            ]
        );
    }

    #[test]
    fn test_ranges_are_not_decimals() {
        assert_eq!(
            kinds("1..5 1.5..2 2024-01-01..2024-02-01 ..10"),
            vec![
                TokenKind::Number("1"), TokenKind::DotDot, TokenKind::Number("5"),
                TokenKind::Number("1.5"), TokenKind::DotDot, TokenKind::Number("2"),
                TokenKind::Date("2024-01-01"), TokenKind::DotDot, TokenKind::Date("2024-02-01"),
                TokenKind::DotDot, TokenKind::Number("10"),
            ]
        );
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            kinds("g0.g1.c2"),
            vec![
                TokenKind::Identifier("g0"), TokenKind::Dot,
                TokenKind::Identifier("g1"), TokenKind::Dot,
                TokenKind::Identifier("c2"),
            ]
        );
    }

    #[test]
    fn test_complex_expression() {
        let input = r#"(city = "Kyiv" OR city ^ L) AND rating between 1200..1800"#;
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::LParen,
                TokenKind::Identifier("city"),
                TokenKind::Eq,
                TokenKind::String("Kyiv"),
                TokenKind::Or,
                TokenKind::Identifier("city"),
                TokenKind::Caret,
                TokenKind::Identifier("L"),
                TokenKind::RParen,
                TokenKind::And,
                TokenKind::Identifier("rating"),
                TokenKind::Between,
                TokenKind::Number("1200"),
                TokenKind::DotDot,
                TokenKind::Number("1800"),
            ]
        );
    }

    #[test]
    fn test_illegal_input() {
        assert_eq!(kinds("a & b"), vec![
            TokenKind::Identifier("a"),
            TokenKind::Illegal,
            TokenKind::Identifier("b"),
        ]);
        assert_eq!(kinds(r#""open"#), vec![TokenKind::Illegal]);
        assert_eq!(kinds("- 1"), vec![TokenKind::Illegal, TokenKind::Number("1")]);
    }
}
