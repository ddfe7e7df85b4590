//! 模板静态诊断：复用解析器与行列索引，对 AST 做只读检查。
//!
//! 诊断从不失败，所有问题都以 [`Diagnostic`] 的形式收集到 [`AnalysisReport`]。

pub mod heuristics;
pub mod suggest;

use crate::error::format_excerpt;
use crate::filters::FilterOrigin;
use crate::position::{LineIndex, Range};
use crate::registry::TemplateRegistry;
use crate::template::CompileContext;
use crate::template::ast::{FilterCall, Include, Placeholder, Span};
use crate::template::parse;
use crate::value::Value;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    ParseError,
    UnknownFilter,
    BadArgs,
    SuspiciousFilter,
    MissingKey,
    UnknownTemplate,
    CircularInclude,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::ParseError => "parse-error",
            DiagnosticCode::UnknownFilter => "unknown-filter",
            DiagnosticCode::BadArgs => "bad-args",
            DiagnosticCode::SuspiciousFilter => "suspicious-filter",
            DiagnosticCode::MissingKey => "missing-key",
            DiagnosticCode::UnknownTemplate => "unknown-template",
            DiagnosticCode::CircularInclude => "circular-include",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// 单条诊断；pos/line/column 为 range 起点的展开形式
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub severity: Severity,
    pub range: Range,
    pub pos: usize,
    pub line: usize,
    pub column: usize,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub messages: Vec<Diagnostic>,
}

impl AnalysisReport {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.messages.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// 可读报告，每条诊断附带源码片段
    pub fn render(&self, source: &str) -> String {
        self.messages
            .iter()
            .map(|d| {
                let kind = format!("{}[{}]", d.severity, d.code);
                format_excerpt(&kind, d.range.start, &d.message, d.hint.as_deref(), source)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// 对模板做静态检查；context 为可选的样例数据
pub fn analyze(source: &str, ctx: CompileContext<'_>, context: Option<&Value>) -> AnalysisReport {
    let mut analyzer = Analyzer {
        index: LineIndex::new(source),
        ctx,
        messages: Vec::new(),
    };

    match parse(source) {
        Ok(ast) => {
            for placeholder in ast.placeholders() {
                analyzer.check_placeholder(placeholder, context);
            }
            for include in ast.includes() {
                analyzer.check_include(include);
            }
        }
        Err(err) => analyzer.push(
            DiagnosticCode::ParseError,
            Severity::Error,
            Span::new(err.pos, err.pos),
            err.message,
            json!({}),
            None,
        ),
    }

    // 不同检查分批产生，最终按源码位置排序；同一位置保持产生顺序
    analyzer.messages.sort_by_key(|d| d.pos);
    tracing::debug!(diagnostics = analyzer.messages.len(), "模板诊断完成");
    AnalysisReport {
        messages: analyzer.messages,
    }
}

struct Analyzer<'a> {
    index: LineIndex<'a>,
    ctx: CompileContext<'a>,
    messages: Vec<Diagnostic>,
}

impl<'a> Analyzer<'a> {
    fn push(
        &mut self,
        code: DiagnosticCode,
        severity: Severity,
        span: Span,
        message: String,
        data: serde_json::Value,
        hint: Option<String>,
    ) {
        let range = self.index.range(span);
        self.messages.push(Diagnostic {
            code,
            message,
            severity,
            range,
            pos: span.start,
            line: range.start.line,
            column: range.start.column,
            data,
            hint,
        });
    }

    fn check_placeholder(&mut self, placeholder: &Placeholder, context: Option<&Value>) {
        for call in &placeholder.filters {
            match self.ctx.filters.origin(&call.name) {
                None => self.unknown_filter(call),
                Some(FilterOrigin::Builtin | FilterOrigin::Locale) => self.check_arity(call),
                Some(_) => {}
            }
        }

        if let Some(first) = placeholder.filters.first() {
            self.check_shape(placeholder, first, context);
        }

        if let Some(context) = context
            && self.ctx.options.reports_missing_keys()
            && context.lookup(&placeholder.path).is_none()
        {
            let path = placeholder.key();
            self.push(
                DiagnosticCode::MissingKey,
                Severity::Error,
                placeholder.span,
                format!("Missing key \"{path}\""),
                json!({ "path": path }),
                None,
            );
        }
    }

    fn unknown_filter(&mut self, call: &FilterCall) {
        let suggestions = suggest::suggest(&call.name, self.ctx.filters.names());
        let message = format!(
            "Unknown filter \"{}\"{}",
            call.name,
            suggest::did_you_mean(&suggestions)
        );
        self.push(
            DiagnosticCode::UnknownFilter,
            Severity::Error,
            call.span,
            message,
            json!({ "filter": call.name, "suggestions": suggestions }),
            None,
        );
    }

    fn check_arity(&mut self, call: &FilterCall) {
        let Some(arity) = heuristics::builtin_arity(&call.name) else {
            return;
        };
        let got = call.args.len();
        if arity.accepts(got) {
            return;
        }

        self.push(
            DiagnosticCode::BadArgs,
            Severity::Error,
            call.span,
            format!(
                "Filter \"{}\" expects {}, got {got}",
                call.name,
                arity.describe()
            ),
            json!({
                "filter": call.name,
                "expected": arity.expected(),
                "min": arity.min,
                "max": arity.max,
                "got": got,
            }),
            None,
        );
    }

    /// 只检查第一个过滤器：后续过滤器的输入取决于前一个的输出
    fn check_shape(&mut self, placeholder: &Placeholder, call: &FilterCall, context: Option<&Value>) {
        if !matches!(
            self.ctx.filters.origin(&call.name),
            Some(FilterOrigin::Builtin | FilterOrigin::Locale)
        ) {
            return;
        }
        let Some(expected) = heuristics::expected_shape(&call.name) else {
            return;
        };

        let actual = match context.and_then(|c| c.lookup(&placeholder.path)) {
            Some(value) => heuristics::shape_of_value(value),
            None => placeholder
                .path
                .last()
                .and_then(|segment| heuristics::shape_from_name(segment)),
        };
        let Some(actual) = actual else {
            return;
        };
        if actual == expected {
            return;
        }

        let path = placeholder.key();
        self.push(
            DiagnosticCode::SuspiciousFilter,
            Severity::Warning,
            call.span,
            format!(
                "Filter \"{}\" expects a {} but \"{path}\" looks like a {}",
                call.name,
                expected.as_str(),
                actual.as_str()
            ),
            json!({
                "filter": call.name,
                "path": path,
                "expected": expected.as_str(),
                "actual": actual.as_str(),
            }),
            None,
        );
    }

    fn check_include(&mut self, include: &Include) {
        let templates = self.ctx.templates;
        if !templates.has(&include.name) {
            let suggestions = suggest::suggest(&include.name, templates.list());
            self.push(
                DiagnosticCode::UnknownTemplate,
                Severity::Error,
                include.span,
                format!(
                    "Unknown template \"{}\"{}",
                    include.name,
                    suggest::did_you_mean(&suggestions)
                ),
                json!({ "name": include.name, "suggestions": suggestions }),
                None,
            );
            return;
        }

        if let Some(chain) = find_cycle(&include.name, templates) {
            let joined = chain.join(" -> ");
            self.push(
                DiagnosticCode::CircularInclude,
                Severity::Error,
                include.span,
                format!("Circular include: {joined}"),
                json!({ "chain": chain }),
                Some(format!("template \"{}\" eventually includes itself", include.name)),
            );
        }
    }
}

/// 从 name 出发沿已注册模板深度优先搜索，返回第一条回到栈内的引用链
fn find_cycle(name: &str, templates: &TemplateRegistry) -> Option<Vec<String>> {
    fn visit(
        name: &str,
        templates: &TemplateRegistry,
        stack: &mut Vec<String>,
        finished: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        if stack.iter().any(|active| active == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Some(chain);
        }
        if finished.contains(name) {
            return None;
        }
        // 未注册或无法解析的子模板由编译期报告
        let ast = parse(templates.get(name)?).ok()?;

        stack.push(name.to_string());
        for include in ast.includes() {
            if let Some(chain) = visit(&include.name, templates, stack, finished) {
                return Some(chain);
            }
        }
        stack.pop();
        finished.insert(name.to_string());
        None
    }

    visit(name, templates, &mut Vec::new(), &mut HashSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{Filter, FilterMap, FilterRegistry};
    use crate::options::{OnMissing, Options};
    use pretty_assertions::assert_eq;

    fn run(source: &str, options: &Options, templates: &TemplateRegistry, context: Option<&Value>) -> AnalysisReport {
        let filters = FilterRegistry::build(&options.locale, &FilterMap::new(), &options.filters);
        analyze(
            source,
            CompileContext {
                filters: &filters,
                templates,
                options,
            },
            context,
        )
    }

    fn simple(source: &str) -> AnalysisReport {
        run(source, &Options::default(), &TemplateRegistry::new(), None)
    }

    #[test]
    fn clean_template_has_no_messages() {
        let report = simple("Hello {name|upper} you have {n|plural:item,items}");
        assert!(report.is_empty(), "{report:?}");
        assert!(!report.has_errors());
    }

    #[test]
    fn parse_error_stops_analysis() {
        let report = simple("a\n{x|}");
        assert_eq!(report.len(), 1);
        let d = &report.messages[0];
        assert_eq!(d.code, DiagnosticCode::ParseError);
        assert_eq!(d.message, "Expected identifier");
        assert_eq!((d.line, d.column), (2, 4));
    }

    #[test]
    fn plural_with_one_argument_is_bad_args() {
        let report = simple("{n|plural:one}");
        let d = &report.messages[0];
        assert_eq!(d.code, DiagnosticCode::BadArgs);
        assert_eq!(d.data["expected"], json!(2));
        assert_eq!(d.data["got"], json!(1));
        assert_eq!(d.data["filter"], json!("plural"));
        assert_eq!(d.message, "Filter \"plural\" expects 2 arguments, got 1");
        assert_eq!(d.pos, 2);
    }

    #[test]
    fn range_arity_describes_bounds() {
        let report = simple("{t|truncate}");
        let d = &report.messages[0];
        assert_eq!(d.data["expected"], json!("1-2"));
        assert_eq!(d.data["min"], json!(1));
        assert_eq!(d.data["max"], json!(2));
    }

    #[test]
    fn overridden_builtins_skip_arity_checks() {
        let options = Options::default().filter("plural", Filter::sync(|v, _| Ok(v)));
        let report = run("{n|plural}", &options, &TemplateRegistry::new(), None);
        assert!(report.is_empty());
    }

    #[test]
    fn unknown_filter_suggests_close_names() {
        let report = simple("{x|upperr}");
        let d = &report.messages[0];
        assert_eq!(d.code, DiagnosticCode::UnknownFilter);
        assert_eq!(d.data["suggestions"], json!(["upper"]));
        assert_eq!(d.message, "Unknown filter \"upperr\". Did you mean \"upper\"?");
    }

    #[test]
    fn suspicious_filter_uses_field_names() {
        let report = simple("{user_name|number} {price|upper}");
        let codes: Vec<_> = report.warnings().map(|d| d.data["path"].clone()).collect();
        assert_eq!(codes, vec![json!("user_name"), json!("price")]);
        assert!(!report.has_errors());
    }

    #[test]
    fn suspicious_filter_prefers_sample_values() {
        let context = Value::from(json!({"price": "cheap"}));
        let report = run("{price|upper}", &Options::default(), &TemplateRegistry::new(), Some(&context));
        assert!(report.is_empty());
    }

    #[test]
    fn missing_keys_only_with_strict_policy_and_context() {
        let context = Value::from(json!({"a": 1}));
        let lax = run("{a}{b}", &Options::default(), &TemplateRegistry::new(), Some(&context));
        assert!(lax.is_empty());

        let strict = Options::default().on_missing(OnMissing::Error);
        let report = run("{a}{b}", &strict, &TemplateRegistry::new(), Some(&context));
        assert_eq!(report.len(), 1);
        assert_eq!(report.messages[0].code, DiagnosticCode::MissingKey);
        assert_eq!(report.messages[0].data, json!({"path": "b"}));

        let no_context = run("{a}{b}", &strict, &TemplateRegistry::new(), None);
        assert!(no_context.is_empty());
    }

    #[test]
    fn includes_are_checked() {
        let mut templates = TemplateRegistry::new();
        templates.register("footer", "bye");
        templates.register("a", "{> b}");
        templates.register("b", "{> a}");

        let report = run("{> footr}{> footer}{> a}", &Options::default(), &templates, None);
        let codes: Vec<_> = report.messages.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![DiagnosticCode::UnknownTemplate, DiagnosticCode::CircularInclude]
        );
        assert_eq!(report.messages[0].data["suggestions"], json!(["footer"]));
        assert_eq!(report.messages[1].data["chain"], json!(["a", "b", "a"]));
    }

    #[test]
    fn diagnostics_serialize_with_kebab_codes() {
        let report = simple("{x|upperr}");
        let json = serde_json::to_value(&report.messages[0]).unwrap();
        assert_eq!(json["code"], json!("unknown-filter"));
        assert_eq!(json["severity"], json!("error"));
        assert_eq!(json["range"]["start"], json!({"line": 1, "column": 3}));
        assert!(json.get("hint").is_none());
    }

    #[test]
    fn render_report_with_excerpts() {
        let source = "{n|plural:one}";
        let out = simple(source).render(source);
        assert!(out.starts_with("error[bad-args]\n  --> 1:3\n"));
        assert!(out.contains("> 1 | {n|plural:one}"));
    }
}
