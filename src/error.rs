use crate::position::{LineIndex, Position};
use crate::value::Value;
use thiserror::Error;

/// 语法错误，pos 为源码中的字节偏移
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at offset {pos})")]
pub struct ParseError {
    pub message: String,
    pub pos: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, pos: usize) -> Self {
        Self {
            message: message.into(),
            pos,
        }
    }

    /// 带源码上下文的完整报告，供命令行或日志输出
    pub fn render(&self, source: &str) -> String {
        let position = LineIndex::new(source).position(self.pos);
        format_excerpt("parse error", position, &self.message, None, source)
    }
}

/// 过滤器执行失败，保留输入值与参数便于排查
#[derive(Debug, Error)]
#[error("Filter \"{filter_name}\" failed in placeholder \"{{{placeholder}}}\": {source}")]
pub struct FilterExecutionError {
    pub filter_name: String,
    pub placeholder: String,
    pub input_value: Value,
    pub filter_args: Vec<String>,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Missing key \"{path}\"")]
    MissingKey { path: String },

    #[error("Unknown filter \"{name}\" in placeholder \"{{{placeholder}}}\"")]
    UnknownFilter { name: String, placeholder: String },

    #[error("Unknown template \"{name}\"")]
    UnknownTemplate { name: String },

    #[error("Circular include: {}", chain.join(" -> "))]
    CircularInclude { chain: Vec<String> },

    #[error(transparent)]
    FilterExecution(Box<FilterExecutionError>),

    #[error(
        "Filter \"{filter}\" in placeholder \"{{{placeholder}}}\" is asynchronous; render this template with render_async"
    )]
    AsyncFilterInSyncRender { filter: String, placeholder: String },

    #[error("Plugin \"{plugin}\" failed: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<FilterExecutionError> for TemplateError {
    fn from(err: FilterExecutionError) -> Self {
        Self::FilterExecution(Box::new(err))
    }
}

pub type TemplateResult<T> = Result<T, TemplateError>;

/// 拼装 `kind → line:col`、上下文行、错误信息和可选提示
pub(crate) fn format_excerpt(
    kind: &str,
    position: Position,
    message: &str,
    hint: Option<&str>,
    source: &str,
) -> String {
    let mut out = format!("{kind}\n  --> {}:{}\n\n", position.line, position.column);
    out.push_str(&build_error_context(source, position));
    out.push_str(&format!("  error: {message}"));
    if let Some(h) = hint {
        out.push_str(&format!("\n  hint: {h}"));
    }
    out
}

/// 出错行前两行到后一行，出错行下方用 ^ 标出列
fn build_error_context(source: &str, position: Position) -> String {
    let lines: Vec<&str> = source.split('\n').collect();
    let error_line = position.line;
    let start = error_line.saturating_sub(3);
    let end = (error_line + 1).min(lines.len());

    let mut ctx = String::new();
    let width = format!("{}", end).len();
    for i in start..end {
        let is_error_line = i + 1 == error_line;
        let marker = if is_error_line { ">" } else { " " };
        ctx.push_str(&format!(
            "  {} {:>width$} | {}\n",
            marker,
            i + 1,
            lines.get(i).unwrap_or(&""),
            width = width,
        ));
        if is_error_line {
            ctx.push_str(&format!(
                "    {:>width$} | {}^\n",
                "",
                " ".repeat(position.column.saturating_sub(1)),
                width = width,
            ));
        }
    }
    ctx
}
