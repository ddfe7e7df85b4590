use crate::value::Value;

/// 内置过滤器的参数个数约束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// None 表示不设上限
    pub max: Option<usize>,
}

impl Arity {
    const fn exact(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    const fn between(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }

    /// 固定个数时为数字，否则为描述字符串
    pub fn expected(&self) -> serde_json::Value {
        match self.max {
            Some(max) if max == self.min => serde_json::Value::from(max),
            Some(max) => serde_json::Value::from(format!("{}-{}", self.min, max)),
            None => serde_json::Value::from(format!("at least {}", self.min)),
        }
    }

    pub fn describe(&self) -> String {
        match self.max {
            Some(max) if max == self.min => plural_args(max),
            Some(max) => format!("{} to {} arguments", self.min, max),
            None => format!("at least {}", plural_args(self.min)),
        }
    }
}

fn plural_args(n: usize) -> String {
    if n == 1 {
        "1 argument".to_string()
    } else {
        format!("{n} arguments")
    }
}

/// 内置与区域化过滤器的参数约束；被覆盖的同名过滤器不适用
pub fn builtin_arity(name: &str) -> Option<Arity> {
    let arity = match name {
        "plural" | "replace" => Arity::exact(2),
        "default" => Arity::exact(1),
        "currency" | "date" => Arity::at_least(1),
        "slice" | "truncate" => Arity::between(1, 2),
        "pad" => Arity::between(1, 3),
        "join" | "number" | "percent" => Arity::between(0, 1),
        "upper" | "lower" | "trim" | "capitalize" | "slugify" | "json" => Arity::exact(0),
        _ => return None,
    };
    Some(arity)
}

/// 过滤器期望的输入形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Number,
    String,
}

impl Shape {
    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Number => "number",
            Shape::String => "string",
        }
    }
}

const NUMBER_KEYWORDS: &[&str] = &[
    "count", "total", "price", "amount", "qty", "quantity", "sum", "num", "age", "size",
    "percent", "rate", "score", "balance", "cost",
];

const STRING_KEYWORDS: &[&str] = &[
    "name",
    "title",
    "label",
    "id",
    "email",
    "description",
    "text",
    "message",
    "slug",
    "url",
    "city",
];

pub fn expected_shape(filter: &str) -> Option<Shape> {
    match filter {
        "number" | "currency" | "percent" | "plural" => Some(Shape::Number),
        "upper" | "lower" | "trim" | "slice" | "pad" | "truncate" | "replace" | "capitalize"
        | "slugify" => Some(Shape::String),
        _ => None,
    }
}

/// 样例上下文中的实际值
pub fn shape_of_value(value: &Value) -> Option<Shape> {
    match value {
        Value::Number(_) => Some(Shape::Number),
        Value::String(_) => Some(Shape::String),
        _ => None,
    }
}

/// 没有样例值时按字段名猜测，数字关键词优先
pub fn shape_from_name(segment: &str) -> Option<Shape> {
    let lowered = segment.to_lowercase();
    if NUMBER_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        Some(Shape::Number)
    } else if STRING_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        Some(Shape::String)
    } else {
        None
    }
}
