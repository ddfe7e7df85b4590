//! 模板语言：解析 → AST → 编译为渲染片段。
//!
//! 语法只有三种元素：字面文本、`{path|filter:args}` 占位符、`{> name}` 子模板引用，
//! `{{` 与 `}}` 分别转义为 `{` 与 `}`。

pub mod ast;
pub mod compiler;
pub mod parser;
mod render;

pub use compiler::{CompileContext, CompiledTemplate, compile};
pub use parser::parse;
