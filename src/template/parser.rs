use crate::error::ParseError;
use crate::template::ast::{FilterCall, Include, Node, Placeholder, Span, TemplateAst, TextNode};

/// 将模板源码解析为带字节区间的 AST
pub fn parse(source: &str) -> Result<TemplateAst, ParseError> {
    Parser::new(source).run()
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
    nodes: Vec<Node>,
    /// 尚未输出的普通文本及其起始偏移
    text: String,
    text_start: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            nodes: Vec::new(),
            text: String::new(),
            text_start: 0,
        }
    }

    fn run(mut self) -> Result<TemplateAst, ParseError> {
        while let Some(c) = self.peek() {
            let rest = &self.source[self.pos..];
            if rest.starts_with("{{") || rest.starts_with("}}") {
                // 转义：两个源字符输出一个字面字符，区间覆盖两者
                self.flush_text();
                let start = self.pos;
                self.pos += 2;
                self.nodes.push(Node::Text(TextNode {
                    value: c.to_string(),
                    span: Span::new(start, self.pos),
                }));
            } else if c == '{' {
                self.flush_text();
                let node = self.parse_tag()?;
                self.nodes.push(node);
            } else {
                if self.text.is_empty() {
                    self.text_start = self.pos;
                }
                self.text.push(c);
                self.pos += c.len_utf8();
            }
        }
        self.flush_text();

        Ok(TemplateAst { nodes: self.nodes })
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        self.nodes.push(Node::Text(TextNode {
            value: std::mem::take(&mut self.text),
            span: Span::new(self.text_start, self.pos),
        }));
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// 当前位于单个 `{`：占位符或 `{>` 引用
    fn parse_tag(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.pos += 1;

        if self.eat('>') {
            self.skip_whitespace();
            let name = self.read_path()?.join(".");
            self.skip_whitespace();
            if !self.eat('}') {
                return Err(ParseError::new(
                    format!("Expected '}}' to close include \"{name}\""),
                    self.pos,
                ));
            }
            return Ok(Node::Include(Include {
                name,
                span: Span::new(start, self.pos),
            }));
        }

        let path = self.read_path()?;
        let filters = self.read_filters()?;
        self.skip_whitespace();
        if !self.eat('}') {
            return Err(ParseError::new(
                format!("Expected '}}' to close placeholder \"{}\"", path.join(".")),
                self.pos,
            ));
        }

        Ok(Node::Placeholder(Placeholder {
            path,
            filters,
            span: Span::new(start, self.pos),
        }))
    }

    fn read_identifier(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if is_ident_start(c) => self.pos += c.len_utf8(),
            _ => return Err(ParseError::new("Expected identifier", self.pos)),
        }
        while let Some(c) = self.peek() {
            if !is_ident_continue(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        Ok(self.source[start..self.pos].to_string())
    }

    fn read_path(&mut self) -> Result<Vec<String>, ParseError> {
        let mut segments = vec![self.read_identifier()?];
        while self.eat('.') {
            segments.push(self.read_identifier()?);
        }
        Ok(segments)
    }

    fn read_filters(&mut self) -> Result<Vec<FilterCall>, ParseError> {
        let mut filters = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() != Some('|') {
                break;
            }
            let start = self.pos;
            self.pos += 1;
            self.skip_whitespace();
            let name = self.read_identifier()?;
            let mut end = self.pos;

            let after_name = self.pos;
            self.skip_whitespace();
            let args = if self.eat(':') {
                let args = self.read_args()?;
                end = self.pos;
                args
            } else {
                self.pos = after_name;
                Vec::new()
            };

            filters.push(FilterCall {
                name,
                args,
                span: Span::new(start, end),
            });
        }
        Ok(filters)
    }

    /// 逗号分隔的参数表，结束于 `|`、`}` 或输入末尾
    fn read_args(&mut self) -> Result<Vec<String>, ParseError> {
        let mut args = Vec::new();
        loop {
            let segment_start = self.pos;
            self.skip_whitespace();

            if let Some(quote @ ('\'' | '"')) = self.peek() {
                args.push(self.read_quoted(quote)?);
                self.skip_whitespace();
                match self.peek() {
                    Some(',') => {
                        self.pos += 1;
                        continue;
                    }
                    Some('|' | '}') | None => break,
                    Some(_) => {
                        return Err(ParseError::new(
                            "Expected ',' after quoted argument",
                            self.pos,
                        ));
                    }
                }
            }

            self.pos = segment_start;
            while let Some(c) = self.peek() {
                if matches!(c, ',' | '|' | '}') {
                    break;
                }
                self.pos += c.len_utf8();
            }
            args.push(self.source[segment_start..self.pos].trim().to_string());

            if !self.eat(',') {
                break;
            }
        }
        Ok(args)
    }

    fn read_quoted(&mut self, quote: char) -> Result<String, ParseError> {
        let start = self.pos;
        self.pos += quote.len_utf8();

        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::new("Unterminated string", start)),
                Some(c) if c == quote => return Ok(value),
                Some('\\') => {
                    let escape_pos = self.pos - 1;
                    match self.bump() {
                        None => {
                            return Err(ParseError::new(
                                "Unexpected end of input in escape sequence",
                                self.pos,
                            ));
                        }
                        Some(e) if e == quote || matches!(e, '\\' | ',' | ':') => value.push(e),
                        Some(e) => {
                            return Err(ParseError::new(
                                format!("Invalid escape sequence: \\{e}"),
                                escape_pos,
                            ));
                        }
                    }
                }
                Some(c) => value.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn placeholder(ast: &TemplateAst, index: usize) -> &Placeholder {
        match &ast.nodes[index] {
            Node::Placeholder(p) => p,
            other => panic!("expected placeholder, got {other:?}"),
        }
    }

    fn text_values(ast: &TemplateAst) -> Vec<&str> {
        ast.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.value.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plain_text_is_one_node() {
        let ast = parse("Hello, world!").unwrap();
        assert_eq!(
            ast.nodes,
            vec![Node::Text(TextNode {
                value: "Hello, world!".into(),
                span: Span::new(0, 13),
            })]
        );
    }

    #[test]
    fn empty_source_has_no_nodes() {
        assert!(parse("").unwrap().nodes.is_empty());
    }

    #[test]
    fn placeholder_with_path_and_filters() {
        let ast = parse("Hi {user.name|upper|pad:10,*,right}!").unwrap();
        assert_eq!(ast.nodes.len(), 3);

        let p = placeholder(&ast, 1);
        assert_eq!(p.path, vec!["user", "name"]);
        assert_eq!(p.key(), "user.name");
        assert_eq!(p.span, Span::new(3, 35));
        assert_eq!(p.filters.len(), 2);
        assert_eq!(p.filters[0].name, "upper");
        assert!(p.filters[0].args.is_empty());
        assert_eq!(p.filters[0].span, Span::new(13, 19));
        assert_eq!(p.filters[1].name, "pad");
        assert_eq!(p.filters[1].args, vec!["10", "*", "right"]);
    }

    #[test]
    fn escapes_emit_single_character_nodes_spanning_both_chars() {
        let ast = parse("a{{b}}c").unwrap();
        assert_eq!(
            ast.nodes,
            vec![
                Node::Text(TextNode { value: "a".into(), span: Span::new(0, 1) }),
                Node::Text(TextNode { value: "{".into(), span: Span::new(1, 3) }),
                Node::Text(TextNode { value: "b".into(), span: Span::new(3, 4) }),
                Node::Text(TextNode { value: "}".into(), span: Span::new(4, 6) }),
                Node::Text(TextNode { value: "c".into(), span: Span::new(6, 7) }),
            ]
        );
    }

    #[test]
    fn lone_closing_brace_is_text() {
        let ast = parse("a } b").unwrap();
        assert_eq!(text_values(&ast), vec!["a } b"]);
    }

    #[test]
    fn include_node() {
        let ast = parse("x{>  partials.footer }y").unwrap();
        assert_eq!(
            ast.nodes[1],
            Node::Include(Include {
                name: "partials.footer".into(),
                span: Span::new(1, 22),
            })
        );
    }

    #[test]
    fn spans_tile_the_source() {
        let source = "Dear {name|title}, {{ok}} {>sig} — {count|plural:'one',\"many\"}.";
        let ast = parse(source).unwrap();
        let mut cursor = 0;
        for node in &ast.nodes {
            let span = node.span();
            assert_eq!(span.start, cursor);
            assert!(span.end > span.start);
            cursor = span.end;
        }
        assert_eq!(cursor, source.len());
    }

    #[test]
    fn quoted_arguments_and_escapes() {
        let ast = parse(r#"{x|f:'a\,b', "c\"d" ,'e\:f\\','it\'s'}"#).unwrap();
        assert_eq!(
            placeholder(&ast, 0).filters[0].args,
            vec!["a,b", "c\"d", "e:f\\", "it's"]
        );
    }

    #[test]
    fn unquoted_arguments_are_trimmed_and_may_be_empty() {
        let ast = parse("{x|f: a , ,b,}").unwrap();
        assert_eq!(placeholder(&ast, 0).filters[0].args, vec!["a", "", "b", ""]);

        let ast = parse("{x|f:,a}").unwrap();
        assert_eq!(placeholder(&ast, 0).filters[0].args, vec!["", "a"]);
    }

    #[test]
    fn unquoted_argument_may_contain_colons() {
        let ast = parse("{at|date:%H:%M}").unwrap();
        assert_eq!(placeholder(&ast, 0).filters[0].args, vec!["%H:%M"]);
    }

    #[test]
    fn whitespace_around_pipes_is_allowed() {
        let ast = parse("{name | upper | truncate: 3 }").unwrap();
        let p = placeholder(&ast, 0);
        assert_eq!(p.filters[0].name, "upper");
        assert_eq!(p.filters[1].args, vec!["3"]);
    }

    #[test]
    fn missing_identifier_is_an_error() {
        let err = parse("Hello { name}").unwrap_err();
        assert_eq!(err, ParseError::new("Expected identifier", 7));

        let err = parse("{user.}").unwrap_err();
        assert_eq!(err.message, "Expected identifier");
        assert_eq!(err.pos, 6);

        let err = parse("trailing {").unwrap_err();
        assert_eq!(err.pos, 10);
    }

    #[test]
    fn unclosed_placeholder_names_the_path() {
        let err = parse("{user.name!}").unwrap_err();
        assert_eq!(err.message, "Expected '}' to close placeholder \"user.name\"");
        assert_eq!(err.pos, 10);
    }

    #[test]
    fn unclosed_include_names_the_template() {
        let err = parse("{> footer").unwrap_err();
        assert_eq!(err.message, "Expected '}' to close include \"footer\"");
    }

    #[test]
    fn unterminated_string_points_at_opening_quote() {
        let err = parse("{x|f:'abc}").unwrap_err();
        assert_eq!(err, ParseError::new("Unterminated string", 5));
    }

    #[test]
    fn invalid_escape_is_reported() {
        let err = parse(r"{x|f:'a\nb'}").unwrap_err();
        assert_eq!(err.message, r"Invalid escape sequence: \n");
        assert_eq!(err.pos, 7);

        // 单引号字符串里不能转义双引号
        let err = parse(r#"{x|f:'\"'}"#).unwrap_err();
        assert_eq!(err.message, "Invalid escape sequence: \\\"");
    }

    #[test]
    fn escape_at_end_of_input() {
        let err = parse(r"{x|f:'abc\").unwrap_err();
        assert_eq!(err.message, "Unexpected end of input in escape sequence");
        assert_eq!(err.pos, 10);
    }

    #[test]
    fn junk_after_quoted_argument() {
        let err = parse("{x|f:'a'b}").unwrap_err();
        assert_eq!(err.message, "Expected ',' after quoted argument");
    }

    #[test]
    fn identifiers_accept_underscore_dollar_and_unicode() {
        let ast = parse("{$ctx._private.prénom}").unwrap();
        assert_eq!(placeholder(&ast, 0).path, vec!["$ctx", "_private", "prénom"]);
    }
}
