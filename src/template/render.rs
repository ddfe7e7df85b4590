use crate::error::{FilterExecutionError, TemplateError, TemplateResult};
use crate::filters::Filter;
use crate::options::OnMissing;
use crate::template::compiler::{Body, CompiledTemplate, Part, PlaceholderPart, ResolvedFilter};
use crate::value::Value;
use futures::future::join_all;

/// 路径解析结果：找到的值，或按缺失策略得到的替换文本
enum Resolved<'c> {
    Found(&'c Value),
    Substitute(String),
}

impl CompiledTemplate {
    /// 同步渲染；含异步过滤器的模板在读取上下文前即失败
    ///
    /// 过滤器报错与 `render_async` 一致，包装为 `TemplateError::FilterExecution`
    /// （`FilterExecutionError`，带过滤器名、占位符、输入值与参数），不会原样透传。
    pub fn render(&self, context: &Value) -> TemplateResult<String> {
        let parts = match &self.body {
            Body::Constant(text) => return Ok(text.clone()),
            Body::Parts(parts) => parts,
        };

        if let Some((filter, placeholder)) = &self.async_filter {
            return Err(TemplateError::AsyncFilterInSyncRender {
                filter: filter.clone(),
                placeholder: placeholder.clone(),
            });
        }

        let mut out = String::new();
        for part in parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Placeholder(placeholder) => {
                    out.push_str(&self.render_placeholder(placeholder, context)?)
                }
            }
        }
        Ok(out)
    }

    /// 异步渲染；各占位符的过滤器链并发执行，结果按文档顺序拼接
    pub async fn render_async(&self, context: &Value) -> TemplateResult<String> {
        let parts = match &self.body {
            Body::Constant(text) => return Ok(text.clone()),
            Body::Parts(parts) => parts,
        };

        let pending = parts.iter().filter_map(|part| match part {
            Part::Placeholder(placeholder) => {
                Some(self.render_placeholder_async(placeholder, context))
            }
            Part::Literal(_) => None,
        });
        let results = join_all(pending).await;
        tracing::trace!(placeholders = results.len(), "异步渲染完成");

        // 按文档顺序消费结果，第一个错误即为返回的错误
        let mut results = results.into_iter();
        let mut out = String::new();
        for part in parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Placeholder(_) => {
                    if let Some(rendered) = results.next() {
                        out.push_str(&rendered?);
                    }
                }
            }
        }
        Ok(out)
    }

    fn resolve<'c>(
        &self,
        placeholder: &PlaceholderPart,
        context: &'c Value,
    ) -> TemplateResult<Resolved<'c>> {
        if let Some(value) = context.lookup(&placeholder.path) {
            return Ok(Resolved::Found(value));
        }
        match &self.on_missing {
            OnMissing::Keep => Ok(Resolved::Substitute(format!("{{{}}}", placeholder.key))),
            OnMissing::Error => Err(TemplateError::MissingKey {
                path: placeholder.key.clone(),
            }),
            OnMissing::Callback(callback) => Ok(Resolved::Substitute(callback(&placeholder.key))),
        }
    }

    fn render_placeholder(
        &self,
        placeholder: &PlaceholderPart,
        context: &Value,
    ) -> TemplateResult<String> {
        // 缺失的键不再经过过滤器
        let mut value = match self.resolve(placeholder, context)? {
            Resolved::Found(value) => value.clone(),
            Resolved::Substitute(text) => return Ok(text),
        };

        for resolved in &placeholder.filters {
            let Filter::Sync(f) = &resolved.filter else {
                return Err(TemplateError::AsyncFilterInSyncRender {
                    filter: resolved.name.clone(),
                    placeholder: placeholder.key.clone(),
                });
            };
            value = match f(value.clone(), &resolved.args) {
                Ok(next) => next,
                Err(source) => return Err(filter_failure(resolved, placeholder, value, source)),
            };
        }
        Ok(value.to_string())
    }

    async fn render_placeholder_async(
        &self,
        placeholder: &PlaceholderPart,
        context: &Value,
    ) -> TemplateResult<String> {
        let mut value = match self.resolve(placeholder, context)? {
            Resolved::Found(value) => value.clone(),
            Resolved::Substitute(text) => return Ok(text),
        };

        for resolved in &placeholder.filters {
            value = match resolved.filter.apply(value.clone(), &resolved.args).await {
                Ok(next) => next,
                Err(source) => return Err(filter_failure(resolved, placeholder, value, source)),
            };
        }
        Ok(value.to_string())
    }
}

fn filter_failure(
    resolved: &ResolvedFilter,
    placeholder: &PlaceholderPart,
    input_value: Value,
    source: anyhow::Error,
) -> TemplateError {
    tracing::debug!(
        filter = %resolved.name,
        placeholder = %placeholder.key,
        input = input_value.kind(),
        "过滤器执行失败: {source:#}"
    );
    FilterExecutionError {
        filter_name: resolved.name.clone(),
        placeholder: placeholder.key.clone(),
        input_value,
        filter_args: resolved.args.clone(),
        source,
    }
    .into()
}
