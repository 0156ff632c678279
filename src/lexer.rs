//! 查询语言的词法分析器
//!
//! 同时服务于简易查询 (`show ... where ...`) 和类 SQL 文本中的 WHERE 子句。
//! 所有 token 都带有字节偏移的 [`Span`]，便于在编辑器中高亮错误位置。

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

    /// 跳过空白字符（包括换行）
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
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

    /// 读取数字字面量，允许小数点
    fn read_number(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        self.token(TokenKind::Number(literal), start)
    }

    /// 读取引号包围的字符串字面量
    /// 注意：开始的引号已经被调用者消费。单引号字符串中 `''` 表示一个引号。
    fn read_string(&mut self, start: usize, quote: char) -> Token<'a> {
        let content_start = self.position;
        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    if quote == '\'' && self.peek_next() == Some('\'') {
                        self.bump();
                        self.bump();
                        continue;
                    }
                    break;
                }
                Some(_) => {
                    self.bump();
                }
                // 未闭合的字符串
                None => return self.token(TokenKind::Illegal, start),
            }
        }
        let content_end = self.position;
        self.bump(); // 消费结束引号

        let content = &self.input[content_start..content_end];
        self.token(TokenKind::String(content), start)
    }

    /// 读取标识符或关键字
    /// 标识符可以包含字母、数字、连字符、下划线和点（例如 `T1.status`）
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];
        self.token(match_keyword(literal), start)
    }
}

/// 是否为保留关键字（大小写不敏感）
pub(crate) fn is_keyword(s: &str) -> bool {
    !matches!(match_keyword(s), TokenKind::Identifier(_))
}

fn match_keyword(s: &str) -> TokenKind {
    match s.to_ascii_lowercase().as_str() {
        "show" => TokenKind::Show,
        "where" => TokenKind::Where,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "is" => TokenKind::Is,
        "of" => TokenKind::Of,
        "contains" => TokenKind::Contains,
        "starts" => TokenKind::Starts,
        "ends" => TokenKind::Ends,
        "with" => TokenKind::With,
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
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            ',' => self.token(TokenKind::Comma, start),
            '*' => self.token(TokenKind::Star, start),
            ';' => self.token(TokenKind::Semicolon, start),
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    self.token(TokenKind::Lte, start)
                }
                Some('>') => {
                    self.bump();
                    self.token(TokenKind::NotEq, start)
                }
                _ => self.token(TokenKind::Lt, start),
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Gte, start)
                } else {
                    self.token(TokenKind::Gt, start)
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::NotEq, start)
                } else {
                    self.token(TokenKind::Illegal, start)
                }
            }
            '\'' | '"' => self.read_string(start, c),
            c if c.is_ascii_digit() => self.read_number(start),
            '-' if self.peek().is_some_and(|n| n.is_ascii_digit()) => self.read_number(start),
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
    fn test_simple_dsl() {
        let input = "show name where age > 30";
        let mut lexer = Lexer::new(input);

        assert_eq!(lexer.next().unwrap().kind, TokenKind::Show);
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Identifier("name"));
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Where);
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Identifier("age"));
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Gt);
        assert_eq!(lexer.next().unwrap().kind, TokenKind::Number("30"));
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn test_all_operators_and_punctuation() {
        let input = "!= <> = > < >= <= ( ) , * ;";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::NotEq, TokenKind::NotEq, TokenKind::Eq, TokenKind::Gt,
                TokenKind::Lt, TokenKind::Gte, TokenKind::Lte, TokenKind::LParen,
                TokenKind::RParen, TokenKind::Comma, TokenKind::Star, TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let input = "SHOW Where AND or nOt IS of CONTAINS starts ENDS with T1.first_name";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Show, TokenKind::Where, TokenKind::And, TokenKind::Or,
                TokenKind::Not, TokenKind::Is, TokenKind::Of, TokenKind::Contains,
                TokenKind::Starts, TokenKind::Ends, TokenKind::With,
                TokenKind::Identifier("T1.first_name"),
            ]
        );
    }

    #[test]
    fn test_strings_and_numbers() {
        let input = r#"'it''s' "double" 12.5 -3"#;
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::String("it''s"),
                TokenKind::String("double"),
                TokenKind::Number("12.5"),
                TokenKind::Number("-3"),
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_illegal() {
        let tokens: Vec<_> = Lexer::new("name = 'abc").collect();
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Illegal);
        assert_eq!(last.span, Span::new(7, 11));
    }

    #[test]
    fn test_spans_cover_newlines() {
        let tokens: Vec<_> = Lexer::new("show\n  status").collect();
        assert_eq!(tokens[1].span, Span::new(7, 13));
    }
}
