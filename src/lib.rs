//! stencil：带过滤器链的字符串模板引擎。
//!
//! ```text
//! Hello {user.name|upper}, you have {count|plural:item,items} {> footer}
//! ```
//!
//! 模板先解析成带位置信息的 AST，再编译为预先解析好过滤器的 [`CompiledTemplate`]；
//! [`Engine`] 负责子模板注册表、插件与编译缓存，并提供静态诊断 [`Engine::analyze`]。

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod options;
pub mod plugin;
pub mod position;
pub mod registry;
pub mod template;
pub mod value;

pub use analyzer::{AnalysisReport, Diagnostic, DiagnosticCode, Severity};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{FilterExecutionError, ParseError, TemplateError, TemplateResult};
pub use filters::{Filter, FilterMap};
pub use options::{OnMissing, Options};
pub use plugin::{Plugin, PluginContext};
pub use position::{LineIndex, Position, Range};
pub use registry::TemplateRegistry;
pub use template::{CompiledTemplate, parse};
pub use value::Value;
