use crate::error::{TemplateError, TemplateResult};
use crate::filters::{Filter, FilterRegistry};
use crate::options::{OnMissing, Options};
use crate::registry::TemplateRegistry;
use crate::template::ast::{Node, Placeholder, TemplateAst};
use crate::template::parser;
use std::fmt;

/// 编译期已解析为函数引用的过滤器调用
#[derive(Debug, Clone)]
pub(crate) struct ResolvedFilter {
    pub name: String,
    pub args: Vec<String>,
    pub filter: Filter,
}

#[derive(Debug, Clone)]
pub(crate) struct PlaceholderPart {
    pub path: Vec<String>,
    /// 预先拼好的 `a.b.c`，报错与 keep 策略直接使用
    pub key: String,
    pub filters: Vec<ResolvedFilter>,
}

#[derive(Debug, Clone)]
pub(crate) enum Part {
    Literal(String),
    Placeholder(PlaceholderPart),
}

#[derive(Debug, Clone)]
pub(crate) enum Body {
    /// 不含占位符的模板直接返回常量
    Constant(String),
    Parts(Vec<Part>),
}

/// 编译后的模板，创建后不可变，可在线程间共享
pub struct CompiledTemplate {
    pub(crate) body: Body,
    pub(crate) on_missing: OnMissing,
    /// 第一个异步过滤器及其所在占位符，同步渲染据此快速失败
    pub(crate) async_filter: Option<(String, String)>,
}

impl CompiledTemplate {
    fn from_parts(mut parts: Vec<Part>, on_missing: OnMissing) -> Self {
        let body = if parts.is_empty() {
            Body::Constant(String::new())
        } else if let [Part::Literal(text)] = parts.as_mut_slice() {
            Body::Constant(std::mem::take(text))
        } else {
            Body::Parts(parts)
        };

        let async_filter = match &body {
            Body::Parts(parts) => parts.iter().find_map(|part| match part {
                Part::Placeholder(p) => p
                    .filters
                    .iter()
                    .find(|f| f.filter.is_async())
                    .map(|f| (f.name.clone(), p.key.clone())),
                Part::Literal(_) => None,
            }),
            Body::Constant(_) => None,
        };

        Self {
            body,
            on_missing,
            async_filter,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.body, Body::Constant(_))
    }

    /// 是否含有只能在 `render_async` 中执行的过滤器
    pub fn requires_async(&self) -> bool {
        self.async_filter.is_some()
    }

    /// 按文档顺序列出占位符路径（包含展开后的子模板）
    pub fn placeholder_keys(&self) -> Vec<&str> {
        match &self.body {
            Body::Constant(_) => Vec::new(),
            Body::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Part::Placeholder(p) => Some(p.key.as_str()),
                    Part::Literal(_) => None,
                })
                .collect(),
        }
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("constant", &self.is_constant())
            .field("placeholders", &self.placeholder_keys())
            .field("on_missing", &self.on_missing)
            .finish()
    }
}

/// 编译所需的只读快照
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub filters: &'a FilterRegistry,
    pub templates: &'a TemplateRegistry,
    pub options: &'a Options,
}

/// 遍历一次 AST 生成渲染片段；引用的子模板在此展开
pub fn compile(ast: &TemplateAst, ctx: CompileContext<'_>) -> TemplateResult<CompiledTemplate> {
    let mut compiler = Compiler {
        ctx,
        stack: Vec::new(),
        parts: Vec::new(),
    };
    compiler.compile_nodes(&ast.nodes)?;

    Ok(CompiledTemplate::from_parts(
        compiler.parts,
        ctx.options.effective_on_missing(),
    ))
}

struct Compiler<'a> {
    ctx: CompileContext<'a>,
    /// 正在展开的子模板名称，用于检测循环引用
    stack: Vec<String>,
    parts: Vec<Part>,
}

impl<'a> Compiler<'a> {
    fn compile_nodes(&mut self, nodes: &[Node]) -> TemplateResult<()> {
        for node in nodes {
            match node {
                Node::Text(text) => self.push_literal(&text.value),
                Node::Placeholder(placeholder) => {
                    let part = self.compile_placeholder(placeholder)?;
                    self.parts.push(Part::Placeholder(part));
                }
                Node::Include(include) => self.compile_include(&include.name)?,
            }
        }
        Ok(())
    }

    /// 相邻字面文本合并为一段
    fn push_literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Part::Literal(last)) = self.parts.last_mut() {
            last.push_str(text);
        } else {
            self.parts.push(Part::Literal(text.to_string()));
        }
    }

    fn compile_placeholder(&self, placeholder: &Placeholder) -> TemplateResult<PlaceholderPart> {
        let key = placeholder.key();
        let filters = placeholder
            .filters
            .iter()
            .map(|call| {
                let filter = self.ctx.filters.get(&call.name).cloned().ok_or_else(|| {
                    TemplateError::UnknownFilter {
                        name: call.name.clone(),
                        placeholder: key.clone(),
                    }
                })?;
                Ok(ResolvedFilter {
                    name: call.name.clone(),
                    args: call.args.clone(),
                    filter,
                })
            })
            .collect::<TemplateResult<Vec<_>>>()?;

        Ok(PlaceholderPart {
            path: placeholder.path.clone(),
            key,
            filters,
        })
    }

    fn compile_include(&mut self, name: &str) -> TemplateResult<()> {
        if self.stack.iter().any(|active| active == name) {
            let mut chain = self.stack.clone();
            chain.push(name.to_string());
            return Err(TemplateError::CircularInclude { chain });
        }

        let templates = self.ctx.templates;
        let source = templates
            .get(name)
            .ok_or_else(|| TemplateError::UnknownTemplate {
                name: name.to_string(),
            })?;
        let ast = parser::parse(source)?;

        tracing::debug!(template = name, depth = self.stack.len() + 1, "展开子模板");
        self.stack.push(name.to_string());
        let result = self.compile_nodes(&ast.nodes);
        self.stack.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterMap;

    fn compile_with(source: &str, templates: &TemplateRegistry) -> TemplateResult<CompiledTemplate> {
        let options = Options::default();
        let filters = FilterRegistry::build(&options.locale, &FilterMap::new(), &options.filters);
        let ast = parser::parse(source)?;
        compile(
            &ast,
            CompileContext {
                filters: &filters,
                templates,
                options: &options,
            },
        )
    }

    fn literals(template: &CompiledTemplate) -> Vec<String> {
        match &template.body {
            Body::Constant(s) => vec![s.clone()],
            Body::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    Part::Literal(s) => s.clone(),
                    Part::Placeholder(p) => format!("<{}>", p.key),
                })
                .collect(),
        }
    }

    #[test]
    fn plain_text_and_escapes_become_a_constant() {
        let template = compile_with("a {{b}} c", &TemplateRegistry::new()).unwrap();
        assert!(template.is_constant());
        assert_eq!(literals(&template), vec!["a {b} c"]);
    }

    #[test]
    fn adjacent_literals_are_merged_around_placeholders() {
        let template = compile_with("x{{y{a}}}z", &TemplateRegistry::new()).unwrap();
        assert_eq!(literals(&template), vec!["x{y", "<a>", "}z"]);
    }

    #[test]
    fn filters_resolve_at_compile_time() {
        let err = compile_with("{a|upper|shout}", &TemplateRegistry::new()).unwrap_err();
        match err {
            TemplateError::UnknownFilter { name, placeholder } => {
                assert_eq!(name, "shout");
                assert_eq!(placeholder, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn includes_are_spliced_in_place() {
        let mut templates = TemplateRegistry::new();
        templates.register("sig", "-- {author}");
        let template = compile_with("Hi{> sig}!", &templates).unwrap();
        assert_eq!(literals(&template), vec!["Hi-- ", "<author>", "!"]);
        assert_eq!(template.placeholder_keys(), vec!["author"]);
    }

    #[test]
    fn same_include_twice_is_not_a_cycle() {
        let mut templates = TemplateRegistry::new();
        templates.register("dash", "-");
        let template = compile_with("{>dash}{>dash}", &templates).unwrap();
        assert_eq!(literals(&template), vec!["--"]);
    }

    #[test]
    fn circular_include_reports_chain() {
        let mut templates = TemplateRegistry::new();
        templates.register("a", "{> b}");
        templates.register("b", "{> a}");
        let err = compile_with("{> a}", &templates).unwrap_err();
        assert_eq!(err.to_string(), "Circular include: a -> b -> a");
    }

    #[test]
    fn self_include_is_circular() {
        let mut templates = TemplateRegistry::new();
        templates.register("loop", "x{> loop}");
        let err = compile_with("{> loop}", &templates).unwrap_err();
        assert!(matches!(err, TemplateError::CircularInclude { ref chain } if chain.len() == 2));
    }

    #[test]
    fn unknown_include_is_an_error() {
        let err = compile_with("{> nope}", &TemplateRegistry::new()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown template \"nope\"");
    }

    #[test]
    fn parse_errors_in_included_templates_propagate() {
        let mut templates = TemplateRegistry::new();
        templates.register("broken", "{oops");
        let err = compile_with("{> broken}", &templates).unwrap_err();
        assert!(matches!(err, TemplateError::Parse(_)));
    }

    #[test]
    fn async_filters_are_flagged() {
        let options = Options::default().filter(
            "later",
            Filter::asynchronous(|v, _| async move { Ok(v) }),
        );
        let filters = FilterRegistry::build(&options.locale, &FilterMap::new(), &options.filters);
        let ast = parser::parse("{a}{b|later}").unwrap();
        let template = compile(
            &ast,
            CompileContext {
                filters: &filters,
                templates: &TemplateRegistry::new(),
                options: &options,
            },
        )
        .unwrap();
        assert!(template.requires_async());
        assert_eq!(template.async_filter, Some(("later".to_string(), "b".to_string())));
    }
}
